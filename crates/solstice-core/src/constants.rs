//! # Protocol Constants
//!
//! Fundamental constants shared by every ledger:
//! - Epoch length and lock duration bounds
//! - Fixed-point scales
//! - Iteration caps for catch-up loops and binary searches
//! - Capacity limits

// ============================================================================
// Time Constants
// ============================================================================

/// Seconds in one day
pub const DAY: u64 = 86_400;

/// Epoch length: one week. Every unlock time is aligned to it.
pub const WEEK: u64 = 7 * DAY;

/// Maximum lock duration (4 years)
pub const MAXTIME: u64 = 4 * 365 * DAY;

/// `MAXTIME` as the signed type used by the decay math
pub const IMAXTIME: i128 = MAXTIME as i128;

/// Offset from epoch start before which votes are not accepted
pub const VOTE_WINDOW: u64 = 3_600;

// ============================================================================
// Fixed-Point Constants
// ============================================================================

/// Scale of the emissions index and the block/time interpolation slope
pub const MULTIPLIER: u128 = 1_000_000_000_000_000_000;

/// Basis points denominator (10,000 = 100%)
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Bonus granted to bonus-permanent locks, in basis points (10%)
pub const SM_NFT_BONUS_BPS: u128 = 1_000;

/// Largest amount a single ledger may hold. Keeps every bias/slope product
/// inside `i128` even after the bonus is applied.
pub const MAX_LOCK_AMOUNT: u128 = (i128::MAX as u128) / 4;

// ============================================================================
// Iteration Caps
// ============================================================================

/// Weekly steps the global checkpoint walks before giving up on catching up
pub const MAX_CATCHUP_STEPS: usize = 255;

/// Iterations of the block-number binary search over global points
pub const MAX_BLOCK_SEARCH_STEPS: usize = 128;

/// Epochs a single reward claim may process
pub const MAX_REWARD_EPOCHS: u64 = 20;

// ============================================================================
// Capacity Limits
// ============================================================================

/// Maximum number of lock ids a single delegate may hold
pub const MAX_DELEGATES: usize = 1_024;
