//! Checkpoint records of the escrow ledger

/// Global decay state at one instant.
///
/// `bias` and `slope` only cover time-decaying locks; the non-decaying
/// balances are snapshotted next to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "client", derive(borsh::BorshSerialize, borsh::BorshDeserialize))]
pub struct GlobalPoint {
    pub bias: i128,
    pub slope: i128,
    pub ts: u64,
    pub blk: u64,
    pub permanent_lock_balance: u128,
    pub sm_nft_balance: u128,
    pub sm_nft_bonus_balance: u128,
}

impl GlobalPoint {
    /// Balance held by non-decaying locks at this point
    pub fn non_decaying_balance(&self) -> u128 {
        self.permanent_lock_balance
            .saturating_add(self.sm_nft_balance)
            .saturating_add(self.sm_nft_bonus_balance)
    }
}

/// Decay state of one lock at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "client", derive(borsh::BorshSerialize, borsh::BorshDeserialize))]
pub struct UserPoint {
    pub bias: i128,
    pub slope: i128,
    pub ts: u64,
    pub blk: u64,
    /// Amount of a permanent lock, zero otherwise
    pub permanent: u128,
    /// Amount (bonus included) of a bonus-permanent lock, zero otherwise
    pub sm_nft: u128,
}

impl UserPoint {
    /// Balance at `t`, decaying from this point for time-decaying locks
    pub fn balance_at(&self, t: u64) -> u128 {
        if self.permanent != 0 {
            return self.permanent;
        }
        if self.sm_nft != 0 {
            return self.sm_nft;
        }
        let elapsed = t.saturating_sub(self.ts) as i128;
        let bias = self.bias.saturating_sub(self.slope.saturating_mul(elapsed));
        crate::math::bias_to_balance(bias)
    }
}
