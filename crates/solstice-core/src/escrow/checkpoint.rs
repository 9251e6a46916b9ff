//! # Decay Ledger
//!
//! Global and per-lock checkpoint histories plus the slope-change schedule.
//!
//! A time-decaying lock of `amount` ending at `end` contributes
//! `slope = amount / MAXTIME` and `bias = slope * (end - now)`. The global
//! point is advanced week by week, applying the deltas scheduled at each
//! week boundary, so that no per-lock iteration is ever needed.

use crate::constants::{IMAXTIME, MAX_BLOCK_SEARCH_STEPS, MAX_CATCHUP_STEPS, MULTIPLIER, WEEK};
use crate::epoch::epoch_start;
use crate::errors::{LedgerError, LedgerResult};
use crate::math::{clamp_non_negative, mul_div};
use crate::reentrancy::Guarded;
use crate::types::{Env, TokenId};

use super::{GlobalPoint, LockedBalance, UserPoint, VotingEscrow};

/// Decay slope and bias of `lock` at `now`; zero for non-decaying or
/// expired locks
fn decay_of(lock: &LockedBalance, now: u64) -> (i128, i128) {
    if lock.is_non_decaying() || lock.end <= now || lock.amount == 0 {
        return (0, 0);
    }
    // Amounts are bounded well inside i128
    let slope = lock.amount as i128 / IMAXTIME;
    let bias = slope * (lock.end - now) as i128;
    (slope, bias)
}

fn user_point_of(lock: &LockedBalance, env: &Env) -> UserPoint {
    let (slope, bias) = decay_of(lock, env.timestamp);
    UserPoint {
        bias,
        slope,
        ts: env.timestamp,
        blk: env.block,
        permanent: if lock.is_permanent { lock.amount } else { 0 },
        sm_nft: if lock.is_sm_nft { lock.amount } else { 0 },
    }
}

/// Decay `point` forward to `t`, applying every scheduled slope change on
/// the way, and add the non-decaying balances recorded at the point
fn supply_at(escrow: &VotingEscrow, point: &GlobalPoint, t: u64) -> u128 {
    let mut bias = point.bias;
    let mut slope = point.slope;
    let mut ts = point.ts;
    let mut t_i = epoch_start(ts);

    for _ in 0..MAX_CATCHUP_STEPS {
        t_i = t_i.saturating_add(WEEK);
        let mut d_slope = 0i128;
        if t_i > t {
            t_i = t;
        } else {
            d_slope = escrow.slope_changes(t_i);
        }
        bias -= slope * t_i.saturating_sub(ts) as i128;
        if t_i == t {
            break;
        }
        slope += d_slope;
        ts = t_i;
    }

    (clamp_non_negative(bias) as u128).saturating_add(point.non_decaying_balance())
}

/// Greatest index in `0..=max` whose block is at or before `block`
fn find_block_index(blocks: impl Fn(usize) -> u64, block: u64, max: usize) -> usize {
    let mut min = 0usize;
    let mut max = max;
    for _ in 0..MAX_BLOCK_SEARCH_STEPS {
        if min >= max {
            break;
        }
        let mid = (min + max + 1) / 2;
        if blocks(mid) <= block {
            min = mid;
        } else {
            max = mid - 1;
        }
    }
    min
}

/// Greatest index of `history` whose timestamp is at or before `t`.
/// Index 0 stands for "nothing recorded yet".
fn past_index<P>(history: &[P], ts_of: impl Fn(&P) -> u64, t: u64) -> usize {
    let latest = match history.len().checked_sub(1) {
        Some(0) | None => return 0,
        Some(latest) => latest,
    };
    if ts_of(&history[latest]) <= t {
        return latest;
    }
    if ts_of(&history[1]) > t {
        return 0;
    }

    let mut lower = 0usize;
    let mut upper = latest;
    while upper > lower {
        let center = upper - (upper - lower) / 2;
        // Equal timestamps keep searching right: the first point after
        // genesis is never collapsed into its successor
        if ts_of(&history[center]) <= t {
            lower = center;
        } else {
            upper = center - 1;
        }
    }
    lower
}

/// The parts of the escrow one lock update can touch. A checkpoint only
/// rewrites global points from the current epoch on, the last user point
/// of the lock and the slope changes at the lock's end dates.
#[derive(Debug, Clone)]
pub(crate) struct LockSnapshot {
    token_id: TokenId,
    lock: Option<LockedBalance>,
    supply: u128,
    permanent_lock_balance: u128,
    sm_nft_balance: u128,
    sm_nft_bonus_balance: u128,
    epoch: usize,
    point_tail: Vec<GlobalPoint>,
    /// Length and last entry of the lock's history, if it has one
    user_tail: Option<(usize, UserPoint)>,
    slope_changes: Vec<(u64, Option<i128>)>,
}

impl VotingEscrow {
    // ========================================================================
    // Checkpoint Writes
    // ========================================================================

    /// Capture what a checkpoint of `token_id` may overwrite, given the
    /// lock end dates involved
    pub(crate) fn snapshot_lock(&self, token_id: TokenId, ends: &[u64]) -> LockSnapshot {
        let user_tail = self.user_point_history.get(&token_id).and_then(|history| {
            history.last().map(|last| (history.len(), *last))
        });
        LockSnapshot {
            token_id,
            lock: self.locked.get(&token_id).copied(),
            supply: self.supply,
            permanent_lock_balance: self.permanent_lock_balance,
            sm_nft_balance: self.sm_nft_balance,
            sm_nft_bonus_balance: self.sm_nft_bonus_balance,
            epoch: self.epoch,
            point_tail: self.point_history[self.epoch..].to_vec(),
            user_tail,
            slope_changes: ends
                .iter()
                .map(|end| (*end, self.slope_changes.get(end).copied()))
                .collect(),
        }
    }

    /// Undo everything written since `snapshot` was taken
    pub(crate) fn restore_lock(&mut self, snapshot: LockSnapshot) {
        let token_id = snapshot.token_id;
        match snapshot.lock {
            Some(lock) => {
                self.locked.insert(token_id, lock);
            }
            None => {
                self.locked.remove(&token_id);
            }
        }
        self.supply = snapshot.supply;
        self.permanent_lock_balance = snapshot.permanent_lock_balance;
        self.sm_nft_balance = snapshot.sm_nft_balance;
        self.sm_nft_bonus_balance = snapshot.sm_nft_bonus_balance;

        self.epoch = snapshot.epoch;
        self.point_history.truncate(snapshot.epoch);
        self.point_history.extend(snapshot.point_tail);

        match snapshot.user_tail {
            Some((len, last)) => {
                if let Some(history) = self.user_point_history.get_mut(&token_id) {
                    history.truncate(len);
                    if let Some(point) = history.last_mut() {
                        *point = last;
                    }
                }
            }
            None => {
                self.user_point_history.remove(&token_id);
            }
        }

        for (end, value) in snapshot.slope_changes {
            match value {
                Some(value) => self.slope_changes.insert(end, value),
                None => self.slope_changes.remove(&end),
            };
        }
    }

    /// Record the transition of `token_id` from `old` to `new` at `env`.
    /// A `token_id` of zero only advances the global history.
    pub(crate) fn record_checkpoint(
        &mut self,
        env: &Env,
        token_id: TokenId,
        old: &LockedBalance,
        new: &LockedBalance,
    ) {
        let now = env.timestamp;
        let mut u_old = UserPoint::default();
        let mut u_new = UserPoint::default();
        let mut old_dslope = 0i128;
        let mut new_dslope = 0i128;

        if token_id != 0 {
            u_new = user_point_of(new, env);
            let (slope, bias) = decay_of(old, now);
            u_old.slope = slope;
            u_old.bias = bias;

            old_dslope = self.slope_changes(old.end);
            if new.end != 0 {
                new_dslope = if new.end == old.end {
                    old_dslope
                } else {
                    self.slope_changes(new.end)
                };
            }
        }

        let mut last_point = if self.epoch > 0 {
            self.point_history[self.epoch]
        } else {
            GlobalPoint {
                ts: now,
                blk: env.block,
                ..GlobalPoint::default()
            }
        };
        let initial = last_point;
        let block_slope = if now > last_point.ts {
            mul_div(
                MULTIPLIER,
                env.block.saturating_sub(last_point.blk) as u128,
                (now - last_point.ts) as u128,
            )
            .unwrap_or(u128::MAX)
        } else {
            0
        };

        // Walk the global point forward one week at a time
        let mut epoch = self.epoch;
        let mut last_checkpoint = last_point.ts;
        let mut t_i = epoch_start(last_checkpoint);
        let mut reached_now = false;
        for _ in 0..MAX_CATCHUP_STEPS {
            t_i = t_i.saturating_add(WEEK);
            let mut d_slope = 0i128;
            if t_i > now {
                t_i = now;
            } else {
                d_slope = self.slope_changes(t_i);
            }
            last_point.bias -= last_point.slope * t_i.saturating_sub(last_checkpoint) as i128;
            last_point.slope += d_slope;
            last_point.bias = clamp_non_negative(last_point.bias);
            last_point.slope = clamp_non_negative(last_point.slope);
            last_checkpoint = t_i;
            last_point.ts = t_i;
            let elapsed = t_i.saturating_sub(initial.ts) as u128;
            let blocks = mul_div(block_slope, elapsed, MULTIPLIER).unwrap_or(u128::MAX);
            last_point.blk = initial.blk.saturating_add(blocks.min(u64::MAX as u128) as u64);
            epoch += 1;
            if t_i == now {
                last_point.blk = env.block;
                reached_now = true;
                break;
            }
            self.write_global_point(epoch, last_point);
        }
        if !reached_now {
            tracing::warn!(
                "Checkpoint catch-up stopped at t={} after {} weekly steps (now {})",
                last_point.ts,
                MAX_CATCHUP_STEPS,
                now
            );
        }

        if token_id != 0 {
            last_point.slope = clamp_non_negative(last_point.slope + (u_new.slope - u_old.slope));
            last_point.bias = clamp_non_negative(last_point.bias + (u_new.bias - u_old.bias));
        }
        last_point.permanent_lock_balance = self.permanent_lock_balance;
        last_point.sm_nft_balance = self.sm_nft_balance;
        last_point.sm_nft_bonus_balance = self.sm_nft_bonus_balance;

        // Writes within one instant collapse into a single point
        if epoch != 1 && self.point_history[epoch - 1].ts == now {
            self.write_global_point(epoch - 1, last_point);
        } else {
            self.epoch = epoch;
            self.write_global_point(epoch, last_point);
        }

        if token_id != 0 {
            if old.end > now {
                old_dslope += u_old.slope;
                if new.end == old.end {
                    old_dslope -= u_new.slope;
                }
                self.slope_changes.insert(old.end, old_dslope);
            }
            if new.end > now && new.end > old.end {
                new_dslope -= u_new.slope;
                self.slope_changes.insert(new.end, new_dslope);
            }

            let history = self
                .user_point_history
                .entry(token_id)
                .or_insert_with(|| vec![UserPoint::default()]);
            let overwrite = history.len() > 1 && history.last().map_or(false, |p| p.ts == now);
            match history.last_mut() {
                Some(last) if overwrite => *last = u_new,
                _ => history.push(u_new),
            }
        }
    }

    fn write_global_point(&mut self, index: usize, point: GlobalPoint) {
        if index < self.point_history.len() {
            self.point_history[index] = point;
        } else {
            self.point_history.push(point);
        }
    }

    /// Advance the global history to `env` without touching any lock.
    /// Keeps the weekly catch-up window from growing stale.
    pub fn checkpoint(&mut self, env: &Env) -> LedgerResult<()> {
        self.non_reentrant(|escrow| {
            escrow.record_checkpoint(env, 0, &LockedBalance::default(), &LockedBalance::default());
            Ok(())
        })
    }

    // ========================================================================
    // Point-in-Time Queries
    // ========================================================================

    /// Index of the latest point of `token_id` at or before `t`
    pub fn get_past_user_point_index(&self, token_id: TokenId, t: u64) -> usize {
        match self.user_point_history.get(&token_id) {
            Some(history) => past_index(history, |p| p.ts, t),
            None => 0,
        }
    }

    /// Index of the latest global point at or before `t`
    pub fn get_past_global_point_index(&self, t: u64) -> usize {
        past_index(&self.point_history[..=self.epoch], |p| p.ts, t)
    }

    /// Voting power of `token_id` at `t`
    pub fn balance_at(&self, token_id: TokenId, t: u64) -> u128 {
        let index = self.get_past_user_point_index(token_id, t);
        if index == 0 {
            return 0;
        }
        self.user_point_history[&token_id][index].balance_at(t)
    }

    /// Voting power of `token_id` now; zero in the block it changed hands
    pub fn balance_of_nft(&self, env: &Env, token_id: TokenId) -> u128 {
        if self.ownership_change.get(&token_id) == Some(&env.block) {
            return 0;
        }
        self.balance_at(token_id, env.timestamp)
    }

    /// Total voting power at `t`
    pub fn total_supply_at(&self, t: u64) -> u128 {
        let index = self.get_past_global_point_index(t);
        if index == 0 {
            return 0;
        }
        supply_at(self, &self.point_history[index], t)
    }

    /// Estimated timestamp of `block`, interpolated between the global
    /// points around it (or the last point and `env`)
    fn block_time(&self, env: &Env, block: u64) -> (usize, u64) {
        let index = find_block_index(|i| self.point_history[i].blk, block, self.epoch);
        let point = &self.point_history[index];

        let (d_block, d_t) = if index < self.epoch {
            let next = &self.point_history[index + 1];
            (next.blk.saturating_sub(point.blk), next.ts.saturating_sub(point.ts))
        } else {
            (env.block.saturating_sub(point.blk), env.timestamp.saturating_sub(point.ts))
        };

        let mut time = point.ts;
        if d_block != 0 {
            let offset = mul_div(
                d_t as u128,
                block.saturating_sub(point.blk) as u128,
                d_block as u128,
            )
            .unwrap_or(0);
            time = time.saturating_add(offset.min(u64::MAX as u128) as u64);
        }
        (index, time)
    }

    /// Total voting power at `block`
    pub fn total_supply_at_block(&self, env: &Env, block: u64) -> LedgerResult<u128> {
        if block > env.block {
            return Err(LedgerError::FutureBlock {
                requested: block,
                now: env.block,
            });
        }
        let (index, time) = self.block_time(env, block);
        Ok(supply_at(self, &self.point_history[index], time))
    }

    /// Voting power of `token_id` at `block`
    pub fn balance_at_block(&self, env: &Env, token_id: TokenId, block: u64) -> LedgerResult<u128> {
        if block > env.block {
            return Err(LedgerError::FutureBlock {
                requested: block,
                now: env.block,
            });
        }
        let history = match self.user_point_history.get(&token_id) {
            Some(history) => history,
            None => return Ok(0),
        };
        let user_index = find_block_index(|i| history[i].blk, block, history.len() - 1);
        let (_, time) = self.block_time(env, block);
        Ok(history[user_index].balance_at(time))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::constants::{MAXTIME, WEEK};

    const DAY_SECS: u64 = crate::constants::DAY;

    #[test]
    fn test_two_week_lock_decays_to_zero() {
        let (mut escrow, mut bank) = setup();
        let id = escrow
            .create_lock(&at(1, START), &mut bank, 1_000_000_000, 2 * WEEK)
            .unwrap();

        let slope = 1_000_000_000i128 / MAXTIME as i128;
        let expected = (slope * (2 * WEEK) as i128) as u128;
        assert_eq!(escrow.balance_at(id, START), expected);
        assert_eq!(escrow.balance_at(id, START + WEEK), expected / 2);
        assert_eq!(escrow.balance_at(id, START + 2 * WEEK), 0);
        assert_eq!(escrow.total_supply_at(START), expected);
        assert_eq!(escrow.total_supply_at(START + 2 * WEEK), 0);
        assert_eq!(escrow.balance_at(id, START - 1), 0);
    }

    #[test]
    fn test_total_supply_sums_locks() {
        let (mut escrow, mut bank) = setup();
        let a = escrow
            .create_lock(&at(1, START), &mut bank, 500_000_000, WEEK)
            .unwrap();
        let b = escrow
            .create_lock(&at(2, START), &mut bank, 500_000_000, WEEK)
            .unwrap();
        let c = escrow
            .create_lock(&at(3, START + DAY_SECS), &mut bank, 700_000_000, 10 * WEEK)
            .unwrap();

        for t in [START, START + DAY_SECS, START + 3 * DAY_SECS, START + WEEK, START + 5 * WEEK] {
            let sum = escrow.balance_at(a, t) + escrow.balance_at(b, t) + escrow.balance_at(c, t);
            assert_eq!(escrow.total_supply_at(t), sum, "t = {}", t);
        }
    }

    #[test]
    fn test_checkpoint_idempotent_within_instant() {
        let (mut escrow, _) = setup();
        escrow.checkpoint(&at(9, START + 10)).unwrap();
        let epoch = escrow.epoch();
        escrow.checkpoint(&at(9, START + 10)).unwrap();
        assert_eq!(escrow.epoch(), epoch);
        assert_eq!(escrow.point_history(epoch).unwrap().ts, START + 10);
    }

    #[test]
    fn test_heartbeat_writes_weekly_points() {
        let (mut escrow, _) = setup();
        escrow.checkpoint(&at(9, START + 10)).unwrap();
        let before = escrow.epoch();
        escrow.checkpoint(&at(9, START + 3 * WEEK + 10)).unwrap();
        // Three week boundaries plus the point at now
        assert_eq!(escrow.epoch(), before + 4);
        assert_eq!(escrow.point_history(before + 1).unwrap().ts, START + WEEK);
        assert_eq!(escrow.point_history(before + 3).unwrap().ts, START + 3 * WEEK);
    }

    #[test]
    fn test_catch_up_stops_after_255_weeks() {
        let (mut escrow, mut bank) = setup();
        let id = escrow
            .create_lock(&at(1, START), &mut bank, 1_000_000_000, 4 * WEEK)
            .unwrap();
        let now = START + 300 * WEEK + 10;

        escrow.checkpoint(&at(9, now)).unwrap();
        let newest = *escrow.point_history(escrow.epoch()).unwrap();
        assert_eq!(newest.ts, START + 255 * WEEK);
        assert!(newest.ts < now);
        assert_eq!(escrow.total_supply_at(now), 0);
        assert_eq!(escrow.balance_at(id, now), 0);

        // The next call at the same instant resumes where the last stopped
        let epoch = escrow.epoch();
        escrow.checkpoint(&at(9, now)).unwrap();
        assert_eq!(escrow.epoch(), epoch + 46);
        assert_eq!(escrow.point_history(epoch + 1).unwrap().ts, START + 256 * WEEK);
        assert_eq!(escrow.point_history(escrow.epoch()).unwrap().ts, now);
        assert_eq!(escrow.total_supply_at(now), 0);
    }

    #[test]
    fn test_restore_lock_undoes_checkpoint() {
        let (mut escrow, mut bank) = setup();
        let id = escrow
            .create_lock(&at(1, START), &mut bank, 1_000_000_000, 4 * WEEK)
            .unwrap();
        let before = escrow.clone();
        let old = escrow.locked(id);

        let snapshot = escrow.snapshot_lock(id, &[old.end, old.end + WEEK]);
        let new = LockedBalance {
            amount: old.amount * 2,
            end: old.end + WEEK,
            ..old
        };
        escrow.supply += old.amount;
        escrow.locked.insert(id, new);
        escrow.record_checkpoint(&at(1, START + 2 * WEEK + 5), id, &old, &new);
        assert!(escrow.epoch() > before.epoch());
        escrow.restore_lock(snapshot);

        assert_eq!(escrow.locked(id), before.locked(id));
        assert_eq!(escrow.supply(), before.supply());
        assert_eq!(escrow.epoch(), before.epoch());
        assert_eq!(escrow.point_history, before.point_history);
        assert_eq!(escrow.user_point_history, before.user_point_history);
        assert_eq!(escrow.slope_changes, before.slope_changes);
    }

    #[test]
    fn test_slope_changes_schedule_expiry() {
        let (mut escrow, mut bank) = setup();
        let id = escrow
            .create_lock(&at(1, START), &mut bank, 1_000_000_000, 2 * WEEK)
            .unwrap();
        let lock = escrow.locked(id);
        let slope = 1_000_000_000i128 / MAXTIME as i128;
        assert_eq!(escrow.slope_changes(lock.end), -slope);
        assert_eq!(escrow.scheduled_slope_after(START), -slope);
    }

    #[test]
    fn test_user_history_collapses_same_instant() {
        let (mut escrow, mut bank) = setup();
        let mut voter = RecordingVoter::default();
        let id = escrow
            .create_lock(&at(1, START), &mut bank, 1_000_000, 2 * WEEK)
            .unwrap();
        escrow
            .increase_amount(&at(1, START), &mut bank, &mut voter, id, 1_000_000)
            .unwrap();
        assert_eq!(escrow.user_point_epoch(id), 1);
        escrow
            .increase_amount(&at(1, START + 1), &mut bank, &mut voter, id, 1_000_000)
            .unwrap();
        assert_eq!(escrow.user_point_epoch(id), 2);
    }

    #[test]
    fn test_supply_at_block_interpolates() {
        // One block per second keeps the interpolation exact
        let per_second = |t: u64| Env::new(addr(1), t, 100 + (t - START));
        let (mut escrow, mut bank) = setup();
        let id = escrow
            .create_lock(&per_second(START), &mut bank, 1_000_000_000, 8 * WEEK)
            .unwrap();
        let later = per_second(START + 2 * WEEK);
        escrow.checkpoint(&later).unwrap();

        let mid = per_second(START + WEEK);
        let by_block = escrow.total_supply_at_block(&later, mid.block).unwrap();
        assert_eq!(by_block, escrow.total_supply_at(START + WEEK));
        let user = escrow.balance_at_block(&later, id, mid.block).unwrap();
        assert_eq!(user, escrow.balance_at(id, START + WEEK));

        assert!(matches!(
            escrow.total_supply_at_block(&later, later.block + 1),
            Err(LedgerError::FutureBlock { .. })
        ));
    }

    #[test]
    fn test_past_index_search() {
        let history: Vec<u64> = vec![0, 10, 20, 30, 40];
        assert_eq!(past_index(&history, |t| *t, 5), 0);
        assert_eq!(past_index(&history, |t| *t, 10), 1);
        assert_eq!(past_index(&history, |t| *t, 25), 2);
        assert_eq!(past_index(&history, |t| *t, 30), 3);
        assert_eq!(past_index(&history, |t| *t, 99), 4);
        assert_eq!(past_index(&[0u64], |t| *t, 99), 0);
    }
}
