//! Reentrancy protection for the ledgers.
//! A state-based lock held for the whole of a mutating operation, so a
//! collaborator callback can never observe or mutate a half-written
//! checkpoint. The lock is released on every exit path, failures included.

use crate::errors::{LedgerError, LedgerResult};

// ============================================================================
// Reentrancy Status Types
// ============================================================================

/// Reentrancy guard status flags
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReentrancyStatus {
    /// Ledger is unlocked and ready for operations
    #[default]
    Unlocked = 0,
    /// Ledger is locked due to an ongoing operation
    Locked = 1,
}

impl TryFrom<u8> for ReentrancyStatus {
    type Error = LedgerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReentrancyStatus::Unlocked),
            1 => Ok(ReentrancyStatus::Locked),
            _ => Err(LedgerError::ReentrancyDetected),
        }
    }
}

// ============================================================================
// Reentrancy Guard Manager
// ============================================================================

/// Reentrancy guard manager
pub struct ReentrancyGuard;

impl ReentrancyGuard {
    /// Acquire lock for a ledger operation
    pub fn acquire(status: &mut ReentrancyStatus) -> LedgerResult<()> {
        match *status {
            ReentrancyStatus::Unlocked => {
                *status = ReentrancyStatus::Locked;
                Ok(())
            }
            ReentrancyStatus::Locked => Err(LedgerError::ReentrancyDetected),
        }
    }

    /// Release lock after the operation completes
    pub fn release(status: &mut ReentrancyStatus) {
        if *status == ReentrancyStatus::Unlocked {
            tracing::warn!("releasing an already unlocked ledger");
        }
        *status = ReentrancyStatus::Unlocked;
    }

    pub fn is_locked(status: &ReentrancyStatus) -> bool {
        *status != ReentrancyStatus::Unlocked
    }
}

/// Ledgers that serialize their mutating operations behind one guard
pub trait Guarded: Sized {
    fn guard_status(&mut self) -> &mut ReentrancyStatus;

    /// Run `operation` while holding the guard. The guard is released
    /// whether the operation succeeds or fails.
    fn non_reentrant<T>(
        &mut self,
        operation: impl FnOnce(&mut Self) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        ReentrancyGuard::acquire(self.guard_status())?;
        let result = operation(self);
        ReentrancyGuard::release(self.guard_status());
        result
    }
}

// ============================================================================
// Tests
// ============================================================================
