//! Escrowed lock positions

use crate::types::TokenId;

/// The three shapes a live lock can take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub enum LockKind {
    /// Balance decays linearly to zero at `end`
    TimeDecaying,
    /// Locked indefinitely, no decay
    Permanent,
    /// Permanent with the bonus ratio applied to its amount, no decay
    BonusPermanent,
}

/// Amount and unlock time of one lock.
///
/// `end` is zero for permanent and bonus-permanent locks. A zeroed lock is
/// the state of a withdrawn, merged-away or split-away position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "client", derive(borsh::BorshSerialize, borsh::BorshDeserialize))]
pub struct LockedBalance {
    pub amount: u128,
    pub end: u64,
    pub is_permanent: bool,
    pub is_sm_nft: bool,
}

impl LockedBalance {
    pub fn decaying(amount: u128, end: u64) -> Self {
        Self {
            amount,
            end,
            is_permanent: false,
            is_sm_nft: false,
        }
    }

    pub fn permanent(amount: u128) -> Self {
        Self {
            amount,
            end: 0,
            is_permanent: true,
            is_sm_nft: false,
        }
    }

    pub fn bonus_permanent(amount: u128) -> Self {
        Self {
            amount,
            end: 0,
            is_permanent: false,
            is_sm_nft: true,
        }
    }

    pub fn kind(&self) -> LockKind {
        if self.is_sm_nft {
            LockKind::BonusPermanent
        } else if self.is_permanent {
            LockKind::Permanent
        } else {
            LockKind::TimeDecaying
        }
    }

    /// Permanent and bonus-permanent locks never decay
    pub fn is_non_decaying(&self) -> bool {
        self.is_permanent || self.is_sm_nft
    }

    /// Time-decaying lock whose unlock time has passed
    pub fn is_expired(&self, now: u64) -> bool {
        !self.is_non_decaying() && self.end <= now
    }

    pub fn is_empty(&self) -> bool {
        self.amount == 0
    }
}

/// Outcome of a split: the remainder lock and the split-off lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitResult {
    pub remainder: TokenId,
    pub split: TokenId,
}
