//! # Epoch Time Helpers
//!
//! Pure conversions from a timestamp to the boundaries of the fixed-length
//! (one week) epoch that contains it.

use crate::constants::{VOTE_WINDOW, WEEK};

/// Start of the epoch containing `timestamp`
pub fn epoch_start(timestamp: u64) -> u64 {
    timestamp - (timestamp % WEEK)
}

/// Start of the epoch after the one containing `timestamp`
pub fn epoch_next(timestamp: u64) -> u64 {
    epoch_start(timestamp) + WEEK
}

/// First second in which votes are accepted
pub fn epoch_vote_start(timestamp: u64) -> u64 {
    epoch_start(timestamp) + VOTE_WINDOW
}

/// Last second in which votes are accepted
pub fn epoch_vote_end(timestamp: u64) -> u64 {
    epoch_next(timestamp) - VOTE_WINDOW
}

/// Start of the epoch that closed before the one containing `timestamp`.
/// Saturates to zero during the first epoch.
pub fn previous_epoch_start(timestamp: u64) -> u64 {
    epoch_start(timestamp).saturating_sub(WEEK)
}

/// Round an unlock time down to an epoch boundary
pub fn round_to_epoch(timestamp: u64) -> u64 {
    epoch_start(timestamp)
}
