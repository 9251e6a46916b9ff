//! # Ledger Error Types
//!
//! Every failure the ledgers surface to a caller. A failing operation leaves
//! the ledger exactly as it was before the call.

use crate::types::{Address, TokenId};
use thiserror::Error;

/// Errors raised by the escrow, emissions and reward ledgers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub enum LedgerError {
    // ========================================================================
    // Amount and Time Errors
    // ========================================================================

    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Amount {0} exceeds the ledger capacity")]
    AmountTooLarge(u128),

    #[error("Lock {0} has expired")]
    LockExpired(TokenId),

    #[error("Lock {0} has not expired yet")]
    LockNotExpired(TokenId),

    #[error("Unlock time must be in the future")]
    LockDurationNotInFuture,

    #[error("Unlock time exceeds the maximum lock duration")]
    LockDurationTooLong,

    #[error("No lock found for id {0}")]
    NoLockFound(TokenId),

    #[error("Split amount must be strictly between zero and the lock amount")]
    SplitAmountOutOfRange,

    #[error("Block {requested} is in the future (now {now})")]
    FutureBlock { requested: u64, now: u64 },

    // ========================================================================
    // Lock State Errors
    // ========================================================================

    #[error("Lock {0} is permanent")]
    PermanentLock(TokenId),

    #[error("Lock {0} is not permanent")]
    NotPermanentLock(TokenId),

    #[error("Lock {0} is a bonus-permanent lock")]
    BonusPermanentLock(TokenId),

    #[error("Lock {0} is not a plain time-decaying lock")]
    NotNormalLock(TokenId),

    #[error("Lock {0} has voted this epoch")]
    AlreadyVoted(TokenId),

    #[error("Lock {0} is attached")]
    LockAttached(TokenId),

    #[error("Cannot merge a lock into itself")]
    SameLock,

    #[error("Locks {from} and {to} have incompatible kinds")]
    IncompatibleLocks { from: TokenId, to: TokenId },

    #[error("Splitting is not allowed for this owner")]
    SplitNotAllowed,

    // ========================================================================
    // Authorization Errors
    // ========================================================================

    #[error("Caller {0} is not approved or owner")]
    NotApprovedOrOwner(Address),

    #[error("Caller {0} is not the voter")]
    NotVoter(Address),

    #[error("Caller {0} is not the minter")]
    NotMinter(Address),

    #[error("Caller {0} is not governance")]
    NotGovernance(Address),

    #[error("Caller {0} is not the team")]
    NotTeam(Address),

    #[error("Caller {0} may not notify this reward")]
    NotAuthorizedNotifier(Address),

    #[error("Invalid recipient {0}")]
    InvalidRecipient(Address),

    // ========================================================================
    // Delegation Errors
    // ========================================================================

    #[error("Delegate {delegate} would hold {count} lock ids (max {max})")]
    TooManyDelegates { delegate: Address, count: usize, max: usize },

    // ========================================================================
    // Emissions and Reward Errors
    // ========================================================================

    #[error("Total voting weight for epoch {0} is zero")]
    ZeroTotalWeight(u64),

    #[error("Unknown gauge {0}")]
    UnknownGauge(Address),

    #[error("Pool {0} already has a gauge")]
    GaugeExists(Address),

    #[error("Gauge {0} is already alive")]
    GaugeAlive(Address),

    #[error("Gauge {0} is already killed")]
    GaugeKilled(Address),

    #[error("Reward token {0} is not whitelisted")]
    TokenNotWhitelisted(Address),

    #[error("Insufficient reward balance for {token}: need {needed}, have {available}")]
    InsufficientRewardBalance { token: Address, needed: u128, available: u128 },

    // ========================================================================
    // Collaborator and Execution Errors
    // ========================================================================

    #[error("Token transfer of {token} failed: {reason}")]
    TransferFailed { token: Address, reason: String },

    #[error("Collaborator call failed: {0}")]
    Collaborator(String),

    #[error("Reentrancy detected")]
    ReentrancyDetected,

    #[error("Math overflow")]
    MathOverflow,

    #[error("Division by zero")]
    DivisionByZero,
}

/// Result type using ledger errors
pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    /// Create a transfer failure for `token`
    pub fn transfer_failed(token: Address, reason: &str) -> Self {
        Self::TransferFailed {
            token,
            reason: reason.to_string(),
        }
    }

    /// Create a delegate capacity error
    pub fn too_many_delegates(delegate: Address, count: usize, max: usize) -> Self {
        Self::TooManyDelegates { delegate, count, max }
    }

    /// Whether the error is a caller-permission failure
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::NotApprovedOrOwner(_)
                | Self::NotVoter(_)
                | Self::NotMinter(_)
                | Self::NotGovernance(_)
                | Self::NotTeam(_)
                | Self::NotAuthorizedNotifier(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LedgerError::too_many_delegates(Address::from_low_u64(7), 1025, 1024);
        assert!(format!("{}", err).contains("would hold 1025 lock ids (max 1024)"));

        let err = LedgerError::LockExpired(3);
        assert_eq!(format!("{}", err), "Lock 3 has expired");
    }

    #[test]
    fn test_unauthorized_classification() {
        assert!(LedgerError::NotMinter(Address::ZERO).is_unauthorized());
        assert!(!LedgerError::ZeroAmount.is_unauthorized());
    }
}
