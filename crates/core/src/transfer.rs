//! Payment Transaction Builder
//!
//! Client-side helper producing the artifact a gated route expects: a signed
//! legacy transaction carrying one transfer (lamports or SPL), optionally
//! preceded by compute-budget instructions and an idempotent creation of the
//! destination token account.

use crate::{
    error::NetworkError,
    network::PaymentNetwork,
    types::{
        derive_associated_token_address, Route, ASSOCIATED_TOKEN_PROGRAM_ID, TOKEN_PROGRAM_ID,
    },
};
use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction, system_program,
    transaction::Transaction,
};

/// Caller-supplied priority parameters. Zero or `None` leaves the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityFee {
    pub compute_unit_limit: Option<u32>,
    pub compute_unit_price_micro_lamports: Option<u64>,
}

/// Builds the payment transaction for a route
#[derive(Debug, Clone)]
pub struct PaymentTransactionBuilder {
    route: Route,
    priority: PriorityFee,
    token_program: Pubkey,
    create_destination_account: bool,
}

impl PaymentTransactionBuilder {
    pub fn new(route: Route) -> Self {
        Self {
            route,
            priority: PriorityFee::default(),
            token_program: TOKEN_PROGRAM_ID,
            create_destination_account: false,
        }
    }

    /// Set compute-unit limit / price
    pub fn with_priority(mut self, priority: PriorityFee) -> Self {
        self.priority = priority;
        self
    }

    /// Use a different token program (e.g. Token-2022)
    pub fn with_token_program(mut self, token_program: Pubkey) -> Self {
        self.token_program = token_program;
        self
    }

    /// Prepend an idempotent create of the destination's token account
    pub fn with_destination_account_creation(mut self) -> Self {
        self.create_destination_account = true;
        self
    }

    /// Instructions for `payer`, in submission order
    pub fn instructions(&self, payer: &Pubkey) -> Vec<Instruction> {
        let mut instructions = Vec::with_capacity(4);

        if let Some(units) = self.priority.compute_unit_limit.filter(|u| *u > 0) {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(units));
        }
        if let Some(price) = self.priority.compute_unit_price_micro_lamports.filter(|p| *p > 0) {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_price(price));
        }

        match self.route.mint {
            None => {
                instructions.push(system_instruction::transfer(
                    payer,
                    &self.route.destination,
                    self.route.amount,
                ));
            }
            Some(mint) => {
                let source = derive_associated_token_address(payer, &mint, &self.token_program);
                let destination =
                    derive_associated_token_address(&self.route.destination, &mint, &self.token_program);

                if self.create_destination_account {
                    instructions.push(create_associated_token_account_idempotent(
                        payer,
                        &self.route.destination,
                        &mint,
                        &self.token_program,
                    ));
                }

                instructions.push(token_transfer_instruction(
                    &self.token_program,
                    &source,
                    &destination,
                    payer,
                    self.route.amount,
                ));
            }
        }

        instructions
    }

    /// Build and sign with `payer` as fee payer and transfer authority
    pub fn build(&self, payer: &Keypair, recent_blockhash: Hash) -> Transaction {
        Transaction::new_signed_with_payer(
            &self.instructions(&payer.pubkey()),
            Some(&payer.pubkey()),
            &[payer],
            recent_blockhash,
        )
    }

    /// Build against the network's latest blockhash
    pub async fn build_with_network(
        &self,
        network: &dyn PaymentNetwork,
        payer: &Keypair,
    ) -> Result<Transaction, NetworkError> {
        let blockhash = network.get_latest_blockhash().await?;
        Ok(self.build(payer, blockhash))
    }
}

/// Encode a signed transaction as the `x-payment` header value
pub fn encode_artifact(tx: &Transaction) -> Result<String, bincode::Error> {
    let bytes = bincode::serialize(tx)?;
    Ok(bs58::encode(bytes).into_string())
}

/// SPL Token `Transfer` (opcode 3)
pub fn token_transfer_instruction(
    token_program: &Pubkey,
    source: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    amount: u64,
) -> Instruction {
    let mut data = Vec::with_capacity(9);
    data.push(3);
    data.extend_from_slice(&amount.to_le_bytes());

    Instruction {
        program_id: *token_program,
        accounts: vec![
            AccountMeta::new(*source, false),
            AccountMeta::new(*destination, false),
            AccountMeta::new_readonly(*authority, true),
        ],
        data,
    }
}

/// SPL Token `TransferChecked` (opcode 12)
pub fn token_transfer_checked_instruction(
    token_program: &Pubkey,
    source: &Pubkey,
    mint: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    amount: u64,
    decimals: u8,
) -> Instruction {
    let mut data = Vec::with_capacity(10);
    data.push(12);
    data.extend_from_slice(&amount.to_le_bytes());
    data.push(decimals);

    Instruction {
        program_id: *token_program,
        accounts: vec![
            AccountMeta::new(*source, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new(*destination, false),
            AccountMeta::new_readonly(*authority, true),
        ],
        data,
    }
}

/// Associated Token Account `CreateIdempotent`
pub fn create_associated_token_account_idempotent(
    payer: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
) -> Instruction {
    let account = derive_associated_token_address(owner, mint, token_program);

    Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(account, false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(*token_program, false),
        ],
        data: vec![1],
    }
}
