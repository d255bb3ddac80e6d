//! Route Verifier
//!
//! Decodes a base58 signed transaction supplied by the client, verifies every
//! signature over the full message and matches one transfer instruction against
//! the route. The artifact is the only input trusted here: nothing about the
//! payment is taken from request metadata.
//!
//! Two instruction families are recognised:
//! - System program `Transfer` (lamports)
//! - SPL Token / Token-2022 `Transfer` (opcode 3) and `TransferChecked` (opcode 12)

use crate::{
    error::VerifyError,
    types::{
        derive_associated_token_address, DecodedTransfer, Route, TOKEN_2022_PROGRAM_ID,
        TOKEN_PROGRAM_ID,
    },
};
use ed25519_dalek::{Signature as Ed25519Signature, VerifyingKey};
use solana_sdk::{
    instruction::CompiledInstruction,
    packet::PACKET_DATA_SIZE,
    pubkey::Pubkey,
    sanitize::Sanitize,
    signature::Signature,
    system_instruction::SystemInstruction,
    system_program,
    transaction::Transaction,
};

/// SPL Token `Transfer` opcode; destination is account 1
const TOKEN_TRANSFER: u8 = 3;
/// SPL Token `TransferChecked` opcode; destination is account 2
const TOKEN_TRANSFER_CHECKED: u8 = 12;

/// Longest base58 text a packet-sized transaction can encode to.
/// Base58 decoding is quadratic, so longer input is refused before decoding.
pub const MAX_ARTIFACT_LEN: usize = PACKET_DATA_SIZE * 138 / 100 + 1;

/// Decode a base58 artifact into a structurally valid legacy transaction
pub fn decode_artifact(artifact: &str) -> Result<Transaction, VerifyError> {
    let artifact = artifact.trim();
    if artifact.len() > MAX_ARTIFACT_LEN {
        return Err(VerifyError::InvalidArtifact(format!(
            "{} characters exceeds packet size",
            artifact.len()
        )));
    }

    let bytes = bs58::decode(artifact)
        .into_vec()
        .map_err(|e| VerifyError::InvalidArtifact(format!("base58: {}", e)))?;

    if bytes.len() > PACKET_DATA_SIZE {
        return Err(VerifyError::InvalidArtifact(format!(
            "{} bytes exceeds packet size",
            bytes.len()
        )));
    }

    let tx: Transaction = bincode::deserialize(&bytes)
        .map_err(|e| VerifyError::InvalidArtifact(format!("transaction: {}", e)))?;

    tx.sanitize()
        .map_err(|e| VerifyError::InvalidArtifact(format!("sanitize: {:?}", e)))?;

    Ok(tx)
}

/// Fee payer signature, the idempotency key for the attempt
pub fn primary_signature(tx: &Transaction) -> Result<Signature, VerifyError> {
    match tx.signatures.first() {
        Some(signature) if *signature != Signature::default() => Ok(*signature),
        _ => Err(VerifyError::InvalidArtifact("transaction not signed".to_string())),
    }
}

/// Verify the artifact against the route, dispatching on `route.mint`
pub fn verify_payment(artifact: &str, route: &Route) -> Result<DecodedTransfer, VerifyError> {
    if route.mint.is_some() {
        verify_token_transfer(artifact, route)
    } else {
        verify_native_transfer(artifact, route)
    }
}

/// Validate a lamport transfer to `route.destination` of exactly `route.amount`
pub fn verify_native_transfer(
    artifact: &str,
    route: &Route,
) -> Result<DecodedTransfer, VerifyError> {
    let tx = decode_artifact(artifact)?;
    let signature = primary_signature(&tx)?;
    verify_signatures(&tx)?;

    let keys = &tx.message.account_keys;
    let signers = signer_keys(&tx);

    for ix in &tx.message.instructions {
        if *ix.program_id(keys) != system_program::id() {
            continue;
        }

        let lamports = match bincode::deserialize::<SystemInstruction>(&ix.data) {
            Ok(SystemInstruction::Transfer { lamports }) => lamports,
            _ => continue,
        };

        let (Some(from), Some(to)) = (account_at(keys, ix, 0), account_at(keys, ix, 1)) else {
            continue;
        };

        if to != route.destination || lamports != route.amount {
            continue;
        }

        // source must have signed, otherwise the "payer" is just a label
        if !signers.contains(&from) {
            continue;
        }

        return Ok(DecodedTransfer::new(
            signature,
            from,
            to,
            lamports,
            None,
            keys[0],
        ));
    }

    Err(VerifyError::ValidationFailure)
}

/// Validate an SPL transfer into the destination's associated token account
pub fn verify_token_transfer(
    artifact: &str,
    route: &Route,
) -> Result<DecodedTransfer, VerifyError> {
    let mint = route.mint.ok_or(VerifyError::ValidationFailure)?;

    let tx = decode_artifact(artifact)?;
    let signature = primary_signature(&tx)?;
    verify_signatures(&tx)?;

    let keys = &tx.message.account_keys;

    for ix in &tx.message.instructions {
        let program_id = ix.program_id(keys);
        if *program_id != TOKEN_PROGRAM_ID && *program_id != TOKEN_2022_PROGRAM_ID {
            continue;
        }

        let Some(dest_position) = token_destination_position(&ix.data) else {
            continue;
        };

        let (Some(source), Some(dest_ata)) = (
            account_at(keys, ix, 0),
            account_at(keys, ix, dest_position),
        ) else {
            continue;
        };

        let expected_ata = derive_associated_token_address(&route.destination, &mint, program_id);
        if dest_ata != expected_ata {
            continue;
        }

        let Some(amount) = token_amount(&ix.data) else {
            continue;
        };
        if amount != route.amount {
            continue;
        }

        return Ok(DecodedTransfer::new(
            signature,
            source,
            route.destination,
            amount,
            Some(mint),
            keys[0],
        ));
    }

    Err(VerifyError::ValidationFailure)
}

/// Every signature must verify against the full serialized message.
///
/// Partially signed transactions are rejected: an all-zero placeholder fails
/// verification like any forged signature.
fn verify_signatures(tx: &Transaction) -> Result<(), VerifyError> {
    let required = tx.message.header.num_required_signatures as usize;
    if required == 0 || tx.signatures.len() != required {
        return Err(VerifyError::ValidationFailure);
    }

    let message = tx.message_data();

    for (signature, signer) in tx.signatures.iter().zip(&tx.message.account_keys) {
        let key = VerifyingKey::from_bytes(&signer.to_bytes())
            .map_err(|_| VerifyError::ValidationFailure)?;
        let signature = Ed25519Signature::from_slice(signature.as_ref())
            .map_err(|_| VerifyError::ValidationFailure)?;

        key.verify_strict(&message, &signature)
            .map_err(|_| VerifyError::ValidationFailure)?;
    }

    Ok(())
}

fn signer_keys(tx: &Transaction) -> &[Pubkey] {
    let required = tx.message.header.num_required_signatures as usize;
    &tx.message.account_keys[..required.min(tx.message.account_keys.len())]
}

fn account_at(keys: &[Pubkey], ix: &CompiledInstruction, position: usize) -> Option<Pubkey> {
    let index = *ix.accounts.get(position)?;
    keys.get(index as usize).copied()
}

fn token_destination_position(data: &[u8]) -> Option<usize> {
    match data.first() {
        Some(&TOKEN_TRANSFER) if data.len() >= 9 => Some(1),
        Some(&TOKEN_TRANSFER_CHECKED) if data.len() >= 10 => Some(2),
        _ => None,
    }
}

/// Little-endian u64 at payload bytes 1..9 (shared by both encodings)
fn token_amount(data: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = data.get(1..9)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        tests::support::{encode, native_payment, token_payment},
        transfer::token_transfer_checked_instruction,
    };
    use solana_sdk::{
        hash::Hash,
        instruction::{AccountMeta, Instruction},
        message::Message,
        signature::{Keypair, Signer},
        system_instruction,
    };

    #[test]
    fn test_native_transfer_matches_route() {
        let payer = Keypair::new();
        let route = Route::native(Pubkey::new_unique(), 1_000_000);
        let tx = native_payment(&payer, &route.destination, route.amount);

        let decoded = verify_payment(&encode(&tx), &route).unwrap();
        assert_eq!(*decoded.from(), payer.pubkey());
        assert_eq!(*decoded.to(), route.destination);
        assert_eq!(decoded.amount(), route.amount);
        assert_eq!(*decoded.signer(), payer.pubkey());
        assert_eq!(*decoded.signature(), tx.signatures[0]);
        assert!(decoded.mint().is_none());
    }

    #[test]
    fn test_amount_mismatch_fails() {
        let payer = Keypair::new();
        let route = Route::native(Pubkey::new_unique(), 1_000_000);

        for amount in [route.amount - 1, route.amount + 1, 0, u64::MAX] {
            let tx = native_payment(&payer, &route.destination, amount);
            assert_eq!(
                verify_payment(&encode(&tx), &route),
                Err(VerifyError::ValidationFailure)
            );
        }
    }

    #[test]
    fn test_destination_mismatch_fails() {
        let payer = Keypair::new();
        let route = Route::native(Pubkey::new_unique(), 500);
        let tx = native_payment(&payer, &Pubkey::new_unique(), route.amount);

        assert_eq!(
            verify_payment(&encode(&tx), &route),
            Err(VerifyError::ValidationFailure)
        );
    }

    #[test]
    fn test_altered_message_fails() {
        let payer = Keypair::new();
        let route = Route::native(Pubkey::new_unique(), 500);

        // signed for 400 lamports, then rewritten to 500
        let mut tx = native_payment(&payer, &route.destination, 400);
        tx.message.instructions[0].data =
            bincode::serialize(&SystemInstruction::Transfer { lamports: 500 }).unwrap();

        assert_eq!(
            verify_payment(&encode(&tx), &route),
            Err(VerifyError::ValidationFailure)
        );
    }

    #[test]
    fn test_partial_signature_fails() {
        let payer = Keypair::new();
        let cosigner = Keypair::new();
        let route = Route::native(Pubkey::new_unique(), 500);

        let ix = system_instruction::transfer(&cosigner.pubkey(), &route.destination, route.amount);
        let message = Message::new(&[ix], Some(&payer.pubkey()));
        let mut tx = Transaction::new_unsigned(message);
        tx.partial_sign(&[&payer], Hash::new_unique());

        assert_eq!(
            verify_payment(&encode(&tx), &route),
            Err(VerifyError::ValidationFailure)
        );
    }

    #[test]
    fn test_unsigned_source_fails() {
        let payer = Keypair::new();
        let victim = Pubkey::new_unique();
        let route = Route::native(Pubkey::new_unique(), 500);

        // transfer "from" an account that never signed
        let ix = Instruction::new_with_bincode(
            system_program::id(),
            &SystemInstruction::Transfer {
                lamports: route.amount,
            },
            vec![
                AccountMeta::new(victim, false),
                AccountMeta::new(route.destination, false),
            ],
        );
        let tx = Transaction::new_signed_with_payer(
            &[ix],
            Some(&payer.pubkey()),
            &[&payer],
            Hash::new_unique(),
        );

        assert_eq!(
            verify_payment(&encode(&tx), &route),
            Err(VerifyError::ValidationFailure)
        );
    }

    #[test]
    fn test_garbage_artifact_is_invalid() {
        let route = Route::native(Pubkey::new_unique(), 1);

        assert!(matches!(
            verify_payment("0OIl", &route),
            Err(VerifyError::InvalidArtifact(_))
        ));
        assert!(matches!(
            verify_payment(&bs58::encode([1u8, 2, 3]).into_string(), &route),
            Err(VerifyError::InvalidArtifact(_))
        ));
        assert!(matches!(
            verify_payment(&bs58::encode(vec![0u8; PACKET_DATA_SIZE + 1]).into_string(), &route),
            Err(VerifyError::InvalidArtifact(_))
        ));
    }

    #[test]
    fn test_oversized_header_rejected_before_decoding() {
        let route = Route::native(Pubkey::new_unique(), 1);

        match verify_payment(&"z".repeat(64 * 1024), &route) {
            Err(VerifyError::InvalidArtifact(reason)) => {
                assert!(reason.contains("characters"), "{}", reason);
            }
            other => panic!("expected invalid artifact, got {:?}", other),
        }

        // a full packet of 0xff bytes is the longest encoding still admitted
        let longest = bs58::encode(vec![0xffu8; PACKET_DATA_SIZE]).into_string();
        assert!(longest.len() <= MAX_ARTIFACT_LEN);
        match verify_payment(&longest, &route) {
            Err(VerifyError::InvalidArtifact(reason)) => assert!(!reason.contains("characters")),
            other => panic!("expected invalid artifact, got {:?}", other),
        }
    }

    #[test]
    fn test_unsigned_transaction_is_invalid() {
        let payer = Pubkey::new_unique();
        let route = Route::native(Pubkey::new_unique(), 1);
        let ix = system_instruction::transfer(&payer, &route.destination, route.amount);
        let tx = Transaction::new_unsigned(Message::new(&[ix], Some(&payer)));

        assert!(matches!(
            verify_payment(&encode(&tx), &route),
            Err(VerifyError::InvalidArtifact(_))
        ));
    }

    #[test]
    fn test_token_transfer_matches_route() {
        let payer = Keypair::new();
        let route = Route::token(Pubkey::new_unique(), 2_500, Pubkey::new_unique());
        let tx = token_payment(&payer, &route);

        let decoded = verify_payment(&encode(&tx), &route).unwrap();
        let source = derive_associated_token_address(
            &payer.pubkey(),
            &route.mint.unwrap(),
            &TOKEN_PROGRAM_ID,
        );
        assert_eq!(*decoded.from(), source);
        assert_eq!(*decoded.to(), route.destination);
        assert_eq!(decoded.amount(), 2_500);
        assert_eq!(decoded.mint(), route.mint.as_ref());
        assert_eq!(*decoded.signer(), payer.pubkey());
    }

    #[test]
    fn test_token_transfer_checked_matches_route() {
        let payer = Keypair::new();
        let mint = Pubkey::new_unique();
        let route = Route::token(Pubkey::new_unique(), 7, mint);

        let source = derive_associated_token_address(&payer.pubkey(), &mint, &TOKEN_PROGRAM_ID);
        let dest = derive_associated_token_address(&route.destination, &mint, &TOKEN_PROGRAM_ID);
        let ix = token_transfer_checked_instruction(
            &TOKEN_PROGRAM_ID,
            &source,
            &mint,
            &dest,
            &payer.pubkey(),
            7,
            6,
        );
        let tx = Transaction::new_signed_with_payer(
            &[ix],
            Some(&payer.pubkey()),
            &[&payer],
            Hash::new_unique(),
        );

        let decoded = verify_payment(&encode(&tx), &route).unwrap();
        assert_eq!(*decoded.from(), source);
        assert_eq!(decoded.amount(), 7);
    }

    #[test]
    fn test_token_transfer_wrong_destination_or_amount_fails() {
        let payer = Keypair::new();
        let route = Route::token(Pubkey::new_unique(), 2_500, Pubkey::new_unique());

        let other_owner = Route {
            destination: Pubkey::new_unique(),
            ..route
        };
        let tx = token_payment(&payer, &other_owner);
        assert_eq!(
            verify_payment(&encode(&tx), &route),
            Err(VerifyError::ValidationFailure)
        );

        let underpaid = Route {
            amount: route.amount - 1,
            ..route
        };
        let tx = token_payment(&payer, &underpaid);
        assert_eq!(
            verify_payment(&encode(&tx), &route),
            Err(VerifyError::ValidationFailure)
        );

        let other_mint = Route {
            mint: Some(Pubkey::new_unique()),
            ..route
        };
        let tx = token_payment(&payer, &other_mint);
        assert_eq!(
            verify_payment(&encode(&tx), &route),
            Err(VerifyError::ValidationFailure)
        );
    }

    #[test]
    fn test_native_payment_does_not_satisfy_token_route() {
        let payer = Keypair::new();
        let route = Route::token(Pubkey::new_unique(), 100, Pubkey::new_unique());
        let tx = native_payment(&payer, &route.destination, route.amount);

        assert_eq!(
            verify_token_transfer(&encode(&tx), &route),
            Err(VerifyError::ValidationFailure)
        );
        assert_eq!(
            verify_token_transfer(&encode(&tx), &Route::native(route.destination, 100)),
            Err(VerifyError::ValidationFailure)
        );
    }
}
