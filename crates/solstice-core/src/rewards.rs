//! # Epoch Reward Ledger
//!
//! Bribe and fee rewards bucketed by epoch. Voting deposits are recorded as
//! per-lock balance checkpoints plus a supply checkpoint list, both
//! collapsed to one entry per epoch. A lock earns, for every closed epoch,
//! `balance * bucket / supply` with balance and supply read at the last
//! second of that epoch.
//!
//! Claims process at most [`MAX_REWARD_EPOCHS`] epochs; the `last_earn`
//! cursor remembers where the next claim resumes.

use std::collections::{HashMap, HashSet};

use crate::constants::{MAX_REWARD_EPOCHS, WEEK};
use crate::epoch::epoch_start;
use crate::errors::{LedgerError, LedgerResult};
use crate::interfaces::{safe_transfer, safe_transfer_from, LockOwnership, TokenLedger, VoterHooks};
use crate::journal::TransferJournal;
use crate::math::{add_u128, mul_div, sub_u128};
use crate::reentrancy::{Guarded, ReentrancyStatus};
use crate::types::{Address, Env, TokenId};

/// Who may fund a reward ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub enum RewardKind {
    /// Bribes: anyone may notify a voter-whitelisted token
    External,
    /// Trading fees: only the owning gauge may notify
    Internal,
}

/// Balance of one lock from `timestamp` on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "client", derive(borsh::BorshSerialize, borsh::BorshDeserialize))]
pub struct BalanceCheckpoint {
    pub timestamp: u64,
    pub balance_of: u128,
}

/// Total deposits from `timestamp` on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "client", derive(borsh::BorshSerialize, borsh::BorshDeserialize))]
pub struct SupplyCheckpoint {
    pub timestamp: u64,
    pub supply: u128,
}

/// Addresses a reward ledger is deployed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardConfig {
    /// Account holding the reward tokens in the token ledger
    pub address: Address,
    pub voter: Address,
    /// Gauge allowed to notify an internal ledger
    pub gauge: Address,
    pub kind: RewardKind,
}

/// Outcome of walking the closed epochs of one (token, lock) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Accrual {
    reward: u128,
    cursor: u64,
}

/// Index of the latest entry at or before `t`, with constant-time answers
/// past the newest and before the oldest entry
fn prior_index<C>(history: &[C], ts_of: impl Fn(&C) -> u64, t: u64) -> usize {
    let latest = match history.len().checked_sub(1) {
        Some(latest) => latest,
        None => return 0,
    };
    if ts_of(&history[latest]) <= t {
        return latest;
    }
    if ts_of(&history[0]) > t {
        return 0;
    }

    let mut lower = 0usize;
    let mut upper = latest;
    while upper > lower {
        let center = upper - (upper - lower) / 2;
        let ts = ts_of(&history[center]);
        if ts == t {
            return center;
        } else if ts < t {
            lower = center;
        } else {
            upper = center - 1;
        }
    }
    lower
}

#[derive(Debug, Clone)]
pub struct RewardLedger {
    address: Address,
    voter: Address,
    gauge: Address,
    kind: RewardKind,

    total_supply: u128,
    balance_of: HashMap<TokenId, u128>,
    /// (token, epoch start) -> amount
    token_rewards_per_epoch: HashMap<(Address, u64), u128>,
    /// (token, lock) -> resume point of the next claim
    last_earn: HashMap<(Address, TokenId), u64>,
    rewards: Vec<Address>,
    is_reward: HashSet<Address>,

    checkpoints: HashMap<TokenId, Vec<BalanceCheckpoint>>,
    supply_checkpoints: Vec<SupplyCheckpoint>,
    status: ReentrancyStatus,
}

impl RewardLedger {
    pub fn new(config: RewardConfig) -> Self {
        Self {
            address: config.address,
            voter: config.voter,
            gauge: config.gauge,
            kind: config.kind,
            total_supply: 0,
            balance_of: HashMap::new(),
            token_rewards_per_epoch: HashMap::new(),
            last_earn: HashMap::new(),
            rewards: Vec::new(),
            is_reward: HashSet::new(),
            checkpoints: HashMap::new(),
            supply_checkpoints: Vec::new(),
            status: ReentrancyStatus::Unlocked,
        }
    }

    // ========================================================================
    // State Views
    // ========================================================================

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn kind(&self) -> RewardKind {
        self.kind
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    pub fn balance_of(&self, token_id: TokenId) -> u128 {
        self.balance_of.get(&token_id).copied().unwrap_or(0)
    }

    pub fn rewards(&self) -> &[Address] {
        &self.rewards
    }

    pub fn rewards_list_length(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_reward(&self, token: Address) -> bool {
        self.is_reward.contains(&token)
    }

    pub fn token_rewards_per_epoch(&self, token: Address, epoch_start: u64) -> u128 {
        self.token_rewards_per_epoch
            .get(&(token, epoch_start))
            .copied()
            .unwrap_or(0)
    }

    pub fn last_earn(&self, token: Address, token_id: TokenId) -> u64 {
        self.last_earn.get(&(token, token_id)).copied().unwrap_or(0)
    }

    pub fn num_checkpoints(&self, token_id: TokenId) -> usize {
        self.checkpoints.get(&token_id).map_or(0, Vec::len)
    }

    pub fn checkpoint(&self, token_id: TokenId, index: usize) -> Option<&BalanceCheckpoint> {
        self.checkpoints.get(&token_id).and_then(|history| history.get(index))
    }

    pub fn supply_num_checkpoints(&self) -> usize {
        self.supply_checkpoints.len()
    }

    pub fn supply_checkpoint(&self, index: usize) -> Option<&SupplyCheckpoint> {
        self.supply_checkpoints.get(index)
    }

    pub fn prior_balance_index(&self, token_id: TokenId, timestamp: u64) -> usize {
        match self.checkpoints.get(&token_id) {
            Some(history) => prior_index(history, |cp| cp.timestamp, timestamp),
            None => 0,
        }
    }

    pub fn prior_supply_index(&self, timestamp: u64) -> usize {
        prior_index(&self.supply_checkpoints, |cp| cp.timestamp, timestamp)
    }

    fn supply_at(&self, timestamp: u64) -> u128 {
        self.supply_checkpoints
            .get(self.prior_supply_index(timestamp))
            .map_or(0, |cp| cp.supply)
    }

    // ========================================================================
    // Accrual
    // ========================================================================

    fn accrual(&self, token: Address, token_id: TokenId, now: u64) -> LedgerResult<Accrual> {
        let current_epoch = epoch_start(now);
        let history = match self.checkpoints.get(&token_id) {
            Some(history) if !history.is_empty() => history,
            _ => {
                return Ok(Accrual {
                    reward: 0,
                    cursor: current_epoch,
                })
            }
        };

        let mut cursor = epoch_start(self.last_earn(token, token_id));
        let first = &history[prior_index(history, |cp| cp.timestamp, cursor)];
        cursor = cursor.max(epoch_start(first.timestamp));

        let pending = current_epoch.saturating_sub(cursor) / WEEK;
        let mut reward = 0u128;
        for _ in 0..pending.min(MAX_REWARD_EPOCHS) {
            let epoch_end = cursor + WEEK - 1;
            let balance = history[prior_index(history, |cp| cp.timestamp, epoch_end)].balance_of;
            let supply = self.supply_at(epoch_end).max(1);
            let bucket = self.token_rewards_per_epoch(token, cursor);
            reward = add_u128(reward, mul_div(balance, bucket, supply)?)?;
            cursor += WEEK;
        }
        Ok(Accrual { reward, cursor })
    }

    /// Reward of `token_id` in `token` claimable at `now`, over at most
    /// [`MAX_REWARD_EPOCHS`] closed epochs
    pub fn earned(&self, token: Address, token_id: TokenId, now: u64) -> LedgerResult<u128> {
        self.accrual(token, token_id, now).map(|accrual| accrual.reward)
    }

    // ========================================================================
    // Voting Deposits
    // ========================================================================

    fn ensure_voter(&self, env: &Env) -> LedgerResult<()> {
        if env.sender != self.voter {
            return Err(LedgerError::NotVoter(env.sender));
        }
        Ok(())
    }

    /// Record `amount` of votes cast by `token_id`
    pub fn deposit(&mut self, env: &Env, amount: u128, token_id: TokenId) -> LedgerResult<()> {
        self.non_reentrant(|ledger| {
            ledger.ensure_voter(env)?;
            let total_supply = add_u128(ledger.total_supply, amount)?;
            let balance = add_u128(ledger.balance_of(token_id), amount)?;
            ledger.write_balances(env, token_id, balance, total_supply);
            tracing::debug!("Lock {} deposited {} votes", token_id, amount);
            Ok(())
        })
    }

    /// Remove `amount` of votes cast by `token_id`
    pub fn withdraw(&mut self, env: &Env, amount: u128, token_id: TokenId) -> LedgerResult<()> {
        self.non_reentrant(|ledger| {
            ledger.ensure_voter(env)?;
            let total_supply = sub_u128(ledger.total_supply, amount)?;
            let balance = sub_u128(ledger.balance_of(token_id), amount)?;
            ledger.write_balances(env, token_id, balance, total_supply);
            tracing::debug!("Lock {} withdrew {} votes", token_id, amount);
            Ok(())
        })
    }

    fn write_balances(&mut self, env: &Env, token_id: TokenId, balance: u128, total_supply: u128) {
        let now = env.timestamp;
        self.total_supply = total_supply;
        self.balance_of.insert(token_id, balance);

        // One checkpoint per epoch; later writes in the epoch replace it
        let history = self.checkpoints.entry(token_id).or_default();
        let same_epoch = history
            .last()
            .map_or(false, |cp| epoch_start(cp.timestamp) == epoch_start(now));
        let checkpoint = BalanceCheckpoint {
            timestamp: now,
            balance_of: balance,
        };
        match history.last_mut() {
            Some(last) if same_epoch => *last = checkpoint,
            _ => history.push(checkpoint),
        }

        let same_epoch = self
            .supply_checkpoints
            .last()
            .map_or(false, |cp| epoch_start(cp.timestamp) == epoch_start(now));
        let checkpoint = SupplyCheckpoint {
            timestamp: now,
            supply: total_supply,
        };
        match self.supply_checkpoints.last_mut() {
            Some(last) if same_epoch => *last = checkpoint,
            _ => self.supply_checkpoints.push(checkpoint),
        }
    }

    // ========================================================================
    // Funding and Claims
    // ========================================================================

    /// Add `amount` of `token` from the caller to the current epoch's bucket
    pub fn notify_reward_amount(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        voter: &dyn VoterHooks,
        token: Address,
        amount: u128,
    ) -> LedgerResult<()> {
        self.non_reentrant(|ledger| {
            match ledger.kind {
                RewardKind::Internal if env.sender != ledger.gauge => {
                    return Err(LedgerError::NotAuthorizedNotifier(env.sender));
                }
                RewardKind::External if !ledger.is_reward(token) && !voter.is_whitelisted_token(token) => {
                    return Err(LedgerError::TokenNotWhitelisted(token));
                }
                _ => {}
            }
            if amount == 0 {
                return Err(LedgerError::ZeroAmount);
            }
            let epoch = epoch_start(env.timestamp);
            let bucket = add_u128(ledger.token_rewards_per_epoch(token, epoch), amount)?;

            safe_transfer_from(bank, token, ledger.address, env.sender, ledger.address, amount)?;

            if ledger.is_reward.insert(token) {
                ledger.rewards.push(token);
            }
            ledger.token_rewards_per_epoch.insert((token, epoch), bucket);
            tracing::info!(
                "Reward {} of {} notified for epoch {} by {}",
                amount,
                token,
                epoch,
                env.sender
            );
            Ok(())
        })
    }

    /// Pay the owner of `token_id` everything earned in `tokens`. Callable by
    /// the owner, an approved account, or the voter.
    pub fn get_reward(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        locks: &dyn LockOwnership,
        token_id: TokenId,
        tokens: &[Address],
    ) -> LedgerResult<u128> {
        self.non_reentrant(|ledger| {
            if env.sender != ledger.voter && !locks.is_approved_or_owner(env.sender, token_id) {
                return Err(LedgerError::NotApprovedOrOwner(env.sender));
            }
            let owner = locks.owner_of(token_id);
            if owner.is_zero() {
                return Err(LedgerError::InvalidRecipient(owner));
            }

            // Every token is settled before any is paid
            let mut seen = HashSet::new();
            let mut accruals = Vec::with_capacity(tokens.len());
            for token in tokens {
                if !seen.insert(*token) {
                    continue;
                }
                let accrual = ledger.accrual(*token, token_id, env.timestamp)?;
                let available = bank.balance_of(*token, ledger.address);
                if available < accrual.reward {
                    return Err(LedgerError::InsufficientRewardBalance {
                        token: *token,
                        needed: accrual.reward,
                        available,
                    });
                }
                accruals.push((*token, accrual));
            }

            let mut journal = TransferJournal::new(bank);
            for (token, accrual) in &accruals {
                if accrual.reward == 0 {
                    continue;
                }
                if let Err(err) = safe_transfer(&mut journal, *token, ledger.address, owner, accrual.reward) {
                    journal.rollback();
                    return Err(err);
                }
            }

            let mut paid = 0u128;
            for (token, accrual) in accruals {
                ledger.last_earn.insert((token, token_id), accrual.cursor);
                paid = paid.saturating_add(accrual.reward);
                if accrual.reward > 0 {
                    tracing::info!(
                        "Lock {} claimed {} of {} (resumes at {})",
                        token_id,
                        accrual.reward,
                        token,
                        accrual.cursor
                    );
                }
            }
            Ok(paid)
        })
    }
}

impl Guarded for RewardLedger {
    fn guard_status(&mut self) -> &mut ReentrancyStatus {
        &mut self.status
    }
}
