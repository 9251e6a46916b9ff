//! # Lock Lifecycle
//!
//! Every mutation validates first, then moves the underlying through the
//! token ledger, and only then writes the escrow state and its checkpoint.
//! A failed call leaves the escrow and the token balances untouched. Growing
//! a voted lock is the one write that can fail after the transfer (the
//! voter may reject the new weight), so it journals the transfer and keeps
//! a snapshot of the lock's checkpoint state to undo both.
//!
//! Bonus-permanent locks burn their underlying (it is sent to
//! [`Address::DEAD`]) and record `amount + bonus` as the lock amount.

use crate::constants::MAXTIME;
use crate::epoch::round_to_epoch;
use crate::errors::{LedgerError, LedgerResult};
use crate::interfaces::{safe_transfer, safe_transfer_from, LockOwnership, TokenLedger, VoterHooks};
use crate::journal::TransferJournal;
use crate::math::{ensure_lock_amount, sm_nft_bonus};
use crate::reentrancy::Guarded;
use crate::types::{Address, Env, TokenId};

use super::{LockKind, LockedBalance, SplitResult, VotingEscrow};

impl VotingEscrow {
    // ========================================================================
    // Validation Helpers
    // ========================================================================

    /// Owner of `token_id` if `spender` may manage it
    fn require_approved_or_owner(&self, spender: Address, token_id: TokenId) -> LedgerResult<Address> {
        let owner = self.owner_of(token_id);
        if owner.is_zero() {
            return Err(LedgerError::NoLockFound(token_id));
        }
        if !self.is_approved_or_owner(spender, token_id) {
            return Err(LedgerError::NotApprovedOrOwner(spender));
        }
        Ok(owner)
    }

    /// Live lock of `token_id`
    fn require_lock(&self, token_id: TokenId) -> LedgerResult<LockedBalance> {
        let lock = self.locked(token_id);
        if lock.is_empty() {
            return Err(LedgerError::NoLockFound(token_id));
        }
        Ok(lock)
    }

    /// Reject additions that would push the escrow past its capacity
    fn ensure_room_for(&self, additional: u128) -> LedgerResult<()> {
        let total = self
            .supply
            .saturating_add(self.sm_nft_balance)
            .saturating_add(self.sm_nft_bonus_balance)
            .saturating_add(additional);
        ensure_lock_amount(total).map(|_| ())
    }

    fn unlock_time(env: &Env, lock_duration: u64) -> LedgerResult<u64> {
        let unlock_time = round_to_epoch(env.timestamp.saturating_add(lock_duration));
        if unlock_time <= env.timestamp {
            return Err(LedgerError::LockDurationNotInFuture);
        }
        if unlock_time > env.timestamp.saturating_add(MAXTIME) {
            return Err(LedgerError::LockDurationTooLong);
        }
        Ok(unlock_time)
    }

    fn ensure_can_mint(&self, to: Address, count: usize) -> LedgerResult<()> {
        if to.is_zero() {
            return Err(LedgerError::InvalidRecipient(to));
        }
        self.delegation
            .ensure_capacity(self.delegation.delegates(to), count)
    }

    // ========================================================================
    // Mint and Burn
    // ========================================================================

    fn mint(&mut self, env: &Env, to: Address) -> LedgerResult<TokenId> {
        let token_id = self.token_id + 1;
        let dst = self.delegation.delegates(to);
        self.delegation
            .move_token_delegates(env.timestamp, Address::ZERO, dst, token_id)?;
        self.token_id = token_id;
        self.add_token_to(to, token_id);
        Ok(token_id)
    }

    fn burn(&mut self, env: &Env, token_id: TokenId) -> LedgerResult<()> {
        let owner = self.owner_of(token_id);
        let src = self.delegation.delegates(owner);
        self.delegation
            .move_token_delegates(env.timestamp, src, Address::ZERO, token_id)?;
        self.approvals.remove(&token_id);
        self.remove_token_from(owner, token_id);
        Ok(())
    }

    /// Replace the lock of `token_id` and checkpoint the transition
    fn write_lock(&mut self, env: &Env, token_id: TokenId, old: &LockedBalance, new: LockedBalance) {
        if new.is_empty() {
            self.locked.remove(&token_id);
        } else {
            self.locked.insert(token_id, new);
        }
        self.record_checkpoint(env, token_id, old, &new);
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Lock `value` for `lock_duration` (rounded down to a week) on behalf
    /// of the caller
    pub fn create_lock(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        value: u128,
        lock_duration: u64,
    ) -> LedgerResult<TokenId> {
        self.create_lock_for(env, bank, value, lock_duration, env.sender)
    }

    /// Lock `value` of the caller's tokens into a new lock owned by `to`
    pub fn create_lock_for(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        value: u128,
        lock_duration: u64,
        to: Address,
    ) -> LedgerResult<TokenId> {
        self.non_reentrant(|escrow| {
            if value == 0 {
                return Err(LedgerError::ZeroAmount);
            }
            escrow.ensure_room_for(value)?;
            let unlock_time = Self::unlock_time(env, lock_duration)?;
            escrow.ensure_can_mint(to, 1)?;

            safe_transfer_from(bank, escrow.token, escrow.address, env.sender, escrow.address, value)?;

            let token_id = escrow.mint(env, to)?;
            escrow.supply += value;
            let new = LockedBalance::decaying(value, unlock_time);
            escrow.write_lock(env, token_id, &LockedBalance::default(), new);

            tracing::info!(
                "Lock {} created for {}: amount={}, end={}",
                token_id,
                to,
                value,
                unlock_time
            );
            Ok(token_id)
        })
    }

    /// Burn `value` of the caller's tokens into a new bonus-permanent lock
    /// owned by `to`
    pub fn create_sm_nft_for(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        value: u128,
        to: Address,
    ) -> LedgerResult<TokenId> {
        self.non_reentrant(|escrow| {
            if value == 0 {
                return Err(LedgerError::ZeroAmount);
            }
            let bonus = sm_nft_bonus(value)?;
            escrow.ensure_room_for(value.saturating_add(bonus))?;
            escrow.ensure_can_mint(to, 1)?;

            safe_transfer_from(bank, escrow.token, escrow.address, env.sender, Address::DEAD, value)?;

            let token_id = escrow.mint(env, to)?;
            escrow.sm_nft_balance += value;
            escrow.sm_nft_bonus_balance += bonus;
            let new = LockedBalance::bonus_permanent(value + bonus);
            escrow.write_lock(env, token_id, &LockedBalance::default(), new);

            tracing::info!(
                "Bonus-permanent lock {} created for {}: burned={}, bonus={}",
                token_id,
                to,
                value,
                bonus
            );
            Ok(token_id)
        })
    }

    // ========================================================================
    // Deposits
    // ========================================================================

    /// Add `value` of the caller's tokens to the lock of `token_id`.
    /// Anyone may deposit for any live lock.
    pub fn deposit_for(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        voter: &mut dyn VoterHooks,
        token_id: TokenId,
        value: u128,
    ) -> LedgerResult<()> {
        self.non_reentrant(|escrow| escrow.increase_amount_for(env, bank, voter, token_id, value))
    }

    /// Add `value` to a lock the caller owns or is approved for
    pub fn increase_amount(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        voter: &mut dyn VoterHooks,
        token_id: TokenId,
        value: u128,
    ) -> LedgerResult<()> {
        self.non_reentrant(|escrow| {
            escrow.require_approved_or_owner(env.sender, token_id)?;
            escrow.increase_amount_for(env, bank, voter, token_id, value)
        })
    }

    fn increase_amount_for(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        voter: &mut dyn VoterHooks,
        token_id: TokenId,
        value: u128,
    ) -> LedgerResult<()> {
        if value == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let old = self.require_lock(token_id)?;
        if old.is_expired(env.timestamp) {
            return Err(LedgerError::LockExpired(token_id));
        }
        let kind = old.kind();
        let bonus = match kind {
            LockKind::BonusPermanent => sm_nft_bonus(value)?,
            _ => 0,
        };
        self.ensure_room_for(value.saturating_add(bonus))?;

        let destination = match kind {
            LockKind::BonusPermanent => Address::DEAD,
            _ => self.address,
        };
        // Lock state and transfer are undone if the voter rejects the new weight
        let snapshot = self.voted(token_id).then(|| self.snapshot_lock(token_id, &[old.end]));
        let mut journal = TransferJournal::new(bank);
        safe_transfer_from(&mut journal, self.token, self.address, env.sender, destination, value)?;

        match kind {
            LockKind::TimeDecaying => self.supply += value,
            LockKind::Permanent => {
                self.supply += value;
                self.permanent_lock_balance += value;
            }
            LockKind::BonusPermanent => {
                self.sm_nft_balance += value;
                self.sm_nft_bonus_balance += bonus;
            }
        }
        let new = LockedBalance {
            amount: old.amount + value + bonus,
            ..old
        };
        self.write_lock(env, token_id, &old, new);

        if let Some(snapshot) = snapshot {
            let balance = self.balance_at(token_id, env.timestamp);
            if let Err(err) = voter.poke(token_id, balance) {
                tracing::warn!("Voter rejected updated weight of lock {}: {}", token_id, err);
                self.restore_lock(snapshot);
                journal.rollback();
                return Err(err);
            }
        }

        tracing::debug!("Lock {} increased by {} (bonus {})", token_id, value, bonus);
        Ok(())
    }

    /// Extend the unlock time of a time-decaying lock to
    /// `now + lock_duration`, rounded down to a week
    pub fn increase_unlock_time(
        &mut self,
        env: &Env,
        token_id: TokenId,
        lock_duration: u64,
    ) -> LedgerResult<()> {
        self.non_reentrant(|escrow| {
            escrow.require_approved_or_owner(env.sender, token_id)?;
            let old = escrow.require_lock(token_id)?;
            match old.kind() {
                LockKind::Permanent => return Err(LedgerError::PermanentLock(token_id)),
                LockKind::BonusPermanent => return Err(LedgerError::BonusPermanentLock(token_id)),
                LockKind::TimeDecaying => {}
            }
            if old.is_expired(env.timestamp) {
                return Err(LedgerError::LockExpired(token_id));
            }
            let unlock_time = round_to_epoch(env.timestamp.saturating_add(lock_duration));
            if unlock_time <= old.end {
                return Err(LedgerError::LockDurationNotInFuture);
            }
            if unlock_time > env.timestamp.saturating_add(MAXTIME) {
                return Err(LedgerError::LockDurationTooLong);
            }

            let new = LockedBalance {
                end: unlock_time,
                ..old
            };
            escrow.write_lock(env, token_id, &old, new);
            tracing::debug!("Lock {} extended to {}", token_id, unlock_time);
            Ok(())
        })
    }

    // ========================================================================
    // Kind Transitions
    // ========================================================================

    /// Turn a live time-decaying lock into a bonus-permanent one, burning its
    /// underlying
    pub fn convert_to_sm_nft(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        token_id: TokenId,
    ) -> LedgerResult<()> {
        self.non_reentrant(|escrow| {
            escrow.require_approved_or_owner(env.sender, token_id)?;
            escrow.ensure_not_committed(token_id)?;
            let old = escrow.require_lock(token_id)?;
            if old.kind() != LockKind::TimeDecaying {
                return Err(LedgerError::NotNormalLock(token_id));
            }
            if old.is_expired(env.timestamp) {
                return Err(LedgerError::LockExpired(token_id));
            }
            let bonus = sm_nft_bonus(old.amount)?;
            escrow.ensure_room_for(bonus)?;

            safe_transfer(bank, escrow.token, escrow.address, Address::DEAD, old.amount)?;

            escrow.supply -= old.amount;
            escrow.sm_nft_balance += old.amount;
            escrow.sm_nft_bonus_balance += bonus;
            let new = LockedBalance::bonus_permanent(old.amount + bonus);
            escrow.write_lock(env, token_id, &old, new);

            tracing::info!(
                "Lock {} converted to bonus-permanent: burned={}, bonus={}",
                token_id,
                old.amount,
                bonus
            );
            Ok(())
        })
    }

    pub fn lock_permanent(&mut self, env: &Env, token_id: TokenId) -> LedgerResult<()> {
        self.non_reentrant(|escrow| {
            escrow.require_approved_or_owner(env.sender, token_id)?;
            let old = escrow.require_lock(token_id)?;
            match old.kind() {
                LockKind::Permanent => return Err(LedgerError::PermanentLock(token_id)),
                LockKind::BonusPermanent => return Err(LedgerError::BonusPermanentLock(token_id)),
                LockKind::TimeDecaying => {}
            }
            if old.is_expired(env.timestamp) {
                return Err(LedgerError::LockExpired(token_id));
            }

            escrow.permanent_lock_balance += old.amount;
            escrow.write_lock(env, token_id, &old, LockedBalance::permanent(old.amount));
            tracing::info!("Lock {} made permanent", token_id);
            Ok(())
        })
    }

    /// Return a permanent lock to decay, unlocking after the maximum duration
    pub fn unlock_permanent(&mut self, env: &Env, token_id: TokenId) -> LedgerResult<()> {
        self.non_reentrant(|escrow| {
            escrow.require_approved_or_owner(env.sender, token_id)?;
            if escrow.voted(token_id) {
                return Err(LedgerError::AlreadyVoted(token_id));
            }
            let old = escrow.require_lock(token_id)?;
            if old.kind() != LockKind::Permanent {
                return Err(LedgerError::NotPermanentLock(token_id));
            }

            let end = round_to_epoch(env.timestamp.saturating_add(MAXTIME));
            escrow.permanent_lock_balance -= old.amount;
            escrow.write_lock(env, token_id, &old, LockedBalance::decaying(old.amount, end));
            tracing::info!("Lock {} unlocked from permanent, ends {}", token_id, end);
            Ok(())
        })
    }

    // ========================================================================
    // Merge, Split and Withdraw
    // ========================================================================

    /// Fold the lock of `from` into `to`. Both locks must be of the same
    /// kind; time-decaying locks keep the later unlock time.
    pub fn merge(&mut self, env: &Env, from: TokenId, to: TokenId) -> LedgerResult<()> {
        self.non_reentrant(|escrow| {
            if from == to {
                return Err(LedgerError::SameLock);
            }
            escrow.ensure_not_committed(from)?;
            escrow.require_approved_or_owner(env.sender, from)?;
            escrow.require_approved_or_owner(env.sender, to)?;

            let old_from = escrow.require_lock(from)?;
            let old_to = escrow.require_lock(to)?;
            if old_to.is_expired(env.timestamp) {
                return Err(LedgerError::LockExpired(to));
            }
            if old_from.kind() != old_to.kind() {
                return Err(LedgerError::IncompatibleLocks { from, to });
            }

            let mut new_to = old_to;
            new_to.amount = old_to.amount + old_from.amount;
            if new_to.kind() == LockKind::TimeDecaying {
                new_to.end = old_from.end.max(old_to.end);
            }

            escrow.burn(env, from)?;
            escrow.write_lock(env, from, &old_from, LockedBalance::default());
            escrow.write_lock(env, to, &old_to, new_to);

            tracing::info!(
                "Lock {} merged into {}: amount={}",
                from,
                to,
                new_to.amount
            );
            Ok(())
        })
    }

    /// Split `amount` off the lock of `from` into a new lock. The source is
    /// destroyed and replaced by a remainder lock and the split lock, both
    /// inheriting its unlock time and kind. For bonus-permanent locks
    /// `amount` is the underlying part; the bonus is applied to it.
    pub fn split(&mut self, env: &Env, from: TokenId, amount: u128) -> LedgerResult<SplitResult> {
        self.non_reentrant(|escrow| {
            let owner = escrow.owner_of(from);
            if owner.is_zero() {
                return Err(LedgerError::NoLockFound(from));
            }
            if !escrow.can_split(owner) && !escrow.can_split(Address::ZERO) {
                return Err(LedgerError::SplitNotAllowed);
            }
            escrow.require_approved_or_owner(env.sender, from)?;
            escrow.ensure_not_committed(from)?;

            let old = escrow.require_lock(from)?;
            if old.is_expired(env.timestamp) {
                return Err(LedgerError::LockExpired(from));
            }
            if amount == 0 {
                return Err(LedgerError::ZeroAmount);
            }
            let split_amount = match old.kind() {
                LockKind::BonusPermanent => amount.saturating_add(sm_nft_bonus(amount)?),
                _ => amount,
            };
            if split_amount >= old.amount {
                return Err(LedgerError::SplitAmountOutOfRange);
            }
            // One lock burned, two minted
            escrow.ensure_can_mint(owner, 1)?;

            escrow.burn(env, from)?;
            escrow.write_lock(env, from, &old, LockedBalance::default());

            let remainder = escrow.mint(env, owner)?;
            let remainder_lock = LockedBalance {
                amount: old.amount - split_amount,
                ..old
            };
            escrow.write_lock(env, remainder, &LockedBalance::default(), remainder_lock);

            let split = escrow.mint(env, owner)?;
            let split_lock = LockedBalance {
                amount: split_amount,
                ..old
            };
            escrow.write_lock(env, split, &LockedBalance::default(), split_lock);

            tracing::info!(
                "Lock {} split into {} ({}) and {} ({})",
                from,
                remainder,
                remainder_lock.amount,
                split,
                split_amount
            );
            Ok(SplitResult { remainder, split })
        })
    }

    /// Destroy an expired time-decaying lock and return its underlying to
    /// the owner
    pub fn withdraw(&mut self, env: &Env, bank: &mut dyn TokenLedger, token_id: TokenId) -> LedgerResult<u128> {
        self.non_reentrant(|escrow| {
            let owner = escrow.require_approved_or_owner(env.sender, token_id)?;
            escrow.ensure_not_committed(token_id)?;
            let old = escrow.require_lock(token_id)?;
            match old.kind() {
                LockKind::Permanent => return Err(LedgerError::PermanentLock(token_id)),
                LockKind::BonusPermanent => return Err(LedgerError::BonusPermanentLock(token_id)),
                LockKind::TimeDecaying => {}
            }
            if env.timestamp < old.end {
                return Err(LedgerError::LockNotExpired(token_id));
            }

            safe_transfer(bank, escrow.token, escrow.address, owner, old.amount)?;

            escrow.burn(env, token_id)?;
            escrow.supply -= old.amount;
            escrow.write_lock(env, token_id, &old, LockedBalance::default());

            tracing::info!("Lock {} withdrawn: {} returned to {}", token_id, old.amount, owner);
            Ok(old.amount)
        })
    }
}
