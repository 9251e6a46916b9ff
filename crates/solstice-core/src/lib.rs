//! # Solstice Core - Escrow, Emissions and Bribe Ledgers
//!
//! This crate contains the accounting core of the Solstice exchange. It provides:
//!
//! - The vote-escrow checkpoint ledger (decaying lock balances, slope-change
//!   schedule, historical balance and supply reconstruction)
//! - The lock lifecycle (create, extend, merge, split, permanent and bonus locks)
//! - The delegation ledger (historical per-delegate token-id snapshots)
//! - The emissions distributor (index-based pro-rata gauge accrual)
//! - The bribe ledger (per-epoch reward buckets with bounded catch-up)
//!
//! Token transfers, gauge contracts and the voter are collaborators reached
//! through the traits in [`interfaces`].
//!
//! ## Feature Flags
//!
//! - `client`: Enables serde/borsh serialization of the persisted value types

pub mod bank;
pub mod constants;
pub mod emissions;
pub mod epoch;
pub mod errors;
pub mod escrow;
pub mod interfaces;
pub mod journal;
pub mod math;
pub mod reentrancy;
pub mod rewards;
pub mod types;

// Re-export commonly used items
pub use bank::{MemoryTokenLedger, ReturnMode};
pub use constants::*;
pub use emissions::{EmissionsConfig, GaugeInfo, GaugeManager};
pub use errors::{LedgerError, LedgerResult};
pub use escrow::{
    DelegationCheckpoint, EscrowConfig, GlobalPoint, LockKind, LockedBalance, SplitResult, UserPoint,
    VotingEscrow,
};
pub use interfaces::{
    safe_approve, safe_transfer, safe_transfer_from, GaugeHooks, LockOwnership, TokenLedger, VoterHooks,
};
pub use journal::TransferJournal;
pub use rewards::{BalanceCheckpoint, RewardConfig, RewardKind, RewardLedger, SupplyCheckpoint};
pub use types::{Address, Env, TokenId};
