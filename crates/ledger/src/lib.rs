//! z402 Ledger - storage backends for in-flight payment attempts
//!
//! - `MemoryLedger`: process-local, DashMap backed
//! - `SledLedger`: embedded sled database, survives restarts
//!
//! Both implement `z402_core::Ledger` with an atomic insert-if-absent.

pub mod memory;
pub mod sled_store;

pub use memory::MemoryLedger;
pub use sled_store::SledLedger;
