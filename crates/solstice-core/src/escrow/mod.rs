//! # Voting Escrow
//!
//! Lock positions over the underlying token, represented as transferable
//! lock ids. Every lock mutation writes a checkpoint into the global and
//! per-lock decay histories, from which historical balances and total
//! supply are reconstructed.
//!
//! Submodules:
//! - `checkpoint`: the decay ledger and its point-in-time queries
//! - `lifecycle`: create, extend, merge, split, permanent and bonus locks
//! - `delegation`: per-delegate lock id history

pub mod checkpoint;
pub mod delegation;
pub mod lifecycle;
pub mod lock;
pub mod point;

pub use delegation::{DelegationCheckpoint, DelegationLedger};
pub use lock::{LockKind, LockedBalance, SplitResult};
pub use point::{GlobalPoint, UserPoint};

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::errors::{LedgerError, LedgerResult};
use crate::interfaces::LockOwnership;
use crate::reentrancy::{Guarded, ReentrancyStatus};
use crate::types::{Address, Env, TokenId};

/// Addresses an escrow is deployed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowConfig {
    /// Account holding the escrowed underlying in the token ledger
    pub address: Address,
    /// Underlying token
    pub token: Address,
    pub voter: Address,
    pub team: Address,
}

#[derive(Debug, Clone)]
pub struct VotingEscrow {
    pub(crate) address: Address,
    pub(crate) token: Address,
    pub(crate) voter: Address,
    pub(crate) team: Address,

    /// Last minted lock id; ids start at 1
    pub(crate) token_id: TokenId,
    /// Underlying held by time-decaying and permanent locks
    pub(crate) supply: u128,
    pub(crate) permanent_lock_balance: u128,
    /// Underlying burned into bonus-permanent locks
    pub(crate) sm_nft_balance: u128,
    /// Bonus credited on top of `sm_nft_balance`
    pub(crate) sm_nft_bonus_balance: u128,
    pub(crate) locked: HashMap<TokenId, LockedBalance>,

    // Decay ledger
    pub(crate) epoch: usize,
    pub(crate) point_history: Vec<GlobalPoint>,
    /// Index 0 of every history is an empty point
    pub(crate) user_point_history: HashMap<TokenId, Vec<UserPoint>>,
    pub(crate) slope_changes: BTreeMap<u64, i128>,

    // Ownership
    pub(crate) owners: HashMap<TokenId, Address>,
    pub(crate) owned_tokens: HashMap<Address, Vec<TokenId>>,
    pub(crate) approvals: HashMap<TokenId, Address>,
    /// (owner, operator)
    pub(crate) operators: HashSet<(Address, Address)>,
    /// Block of the last ownership change per lock
    pub(crate) ownership_change: HashMap<TokenId, u64>,

    // Voting flags, owned by the voter
    pub(crate) attachments: HashMap<TokenId, u64>,
    pub(crate) voted: HashSet<TokenId>,

    /// Accounts allowed to split; the zero address enables everyone
    pub(crate) can_split: HashSet<Address>,
    pub(crate) delegation: DelegationLedger,
    status: ReentrancyStatus,
}

impl VotingEscrow {
    /// Deploy an escrow with its genesis point at `env`
    pub fn new(config: EscrowConfig, env: &Env) -> Self {
        let genesis = GlobalPoint {
            ts: env.timestamp,
            blk: env.block,
            ..GlobalPoint::default()
        };

        tracing::info!(
            "Voting escrow {} deployed for token {} at t={}",
            config.address,
            config.token,
            env.timestamp
        );

        Self {
            address: config.address,
            token: config.token,
            voter: config.voter,
            team: config.team,
            token_id: 0,
            supply: 0,
            permanent_lock_balance: 0,
            sm_nft_balance: 0,
            sm_nft_bonus_balance: 0,
            locked: HashMap::new(),
            epoch: 0,
            point_history: vec![genesis],
            user_point_history: HashMap::new(),
            slope_changes: BTreeMap::new(),
            owners: HashMap::new(),
            owned_tokens: HashMap::new(),
            approvals: HashMap::new(),
            operators: HashSet::new(),
            ownership_change: HashMap::new(),
            attachments: HashMap::new(),
            voted: HashSet::new(),
            can_split: HashSet::new(),
            delegation: DelegationLedger::new(),
            status: ReentrancyStatus::Unlocked,
        }
    }

    // ========================================================================
    // State Views
    // ========================================================================

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn token(&self) -> Address {
        self.token
    }

    pub fn voter(&self) -> Address {
        self.voter
    }

    pub fn team(&self) -> Address {
        self.team
    }

    /// Number of lock ids minted so far
    pub fn token_id(&self) -> TokenId {
        self.token_id
    }

    pub fn supply(&self) -> u128 {
        self.supply
    }

    pub fn permanent_lock_balance(&self) -> u128 {
        self.permanent_lock_balance
    }

    pub fn sm_nft_balance(&self) -> u128 {
        self.sm_nft_balance
    }

    pub fn sm_nft_bonus_balance(&self) -> u128 {
        self.sm_nft_bonus_balance
    }

    /// Current lock of `token_id`; zeroed if it never existed or was destroyed
    pub fn locked(&self, token_id: TokenId) -> LockedBalance {
        self.locked.get(&token_id).copied().unwrap_or_default()
    }

    /// Index of the latest global point
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn point_history(&self, index: usize) -> Option<&GlobalPoint> {
        self.point_history.get(index)
    }

    /// Index of the latest point of `token_id`, zero if it has none
    pub fn user_point_epoch(&self, token_id: TokenId) -> usize {
        self.user_point_history
            .get(&token_id)
            .map_or(0, |history| history.len().saturating_sub(1))
    }

    pub fn user_point_history(&self, token_id: TokenId, index: usize) -> Option<&UserPoint> {
        self.user_point_history
            .get(&token_id)
            .and_then(|history| history.get(index))
    }

    /// Slope delta scheduled at `timestamp`
    pub fn slope_changes(&self, timestamp: u64) -> i128 {
        self.slope_changes.get(&timestamp).copied().unwrap_or(0)
    }

    /// Sum of every scheduled slope delta strictly after `timestamp`
    pub fn scheduled_slope_after(&self, timestamp: u64) -> i128 {
        self.slope_changes
            .range(timestamp.saturating_add(1)..)
            .map(|(_, delta)| *delta)
            .sum()
    }

    /// Number of locks held by `owner`
    pub fn balance_of(&self, owner: Address) -> usize {
        self.owned_tokens.get(&owner).map_or(0, Vec::len)
    }

    pub fn owned_tokens(&self, owner: Address) -> &[TokenId] {
        self.owned_tokens.get(&owner).map_or(&[], Vec::as_slice)
    }

    pub fn get_approved(&self, token_id: TokenId) -> Address {
        self.approvals.get(&token_id).copied().unwrap_or(Address::ZERO)
    }

    pub fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool {
        self.operators.contains(&(owner, operator))
    }

    pub fn attachments(&self, token_id: TokenId) -> u64 {
        self.attachments.get(&token_id).copied().unwrap_or(0)
    }

    pub fn voted(&self, token_id: TokenId) -> bool {
        self.voted.contains(&token_id)
    }

    pub fn can_split(&self, account: Address) -> bool {
        self.can_split.contains(&account)
    }

    pub fn delegation(&self) -> &DelegationLedger {
        &self.delegation
    }

    /// Every lock id currently holding a non-zero lock
    pub fn live_token_ids(&self) -> Vec<TokenId> {
        let mut ids: Vec<TokenId> = self
            .locked
            .iter()
            .filter(|(_, lock)| !lock.is_empty())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    // ========================================================================
    // Ownership
    // ========================================================================

    /// Approve `approved` to manage `token_id`. Callable by the owner or an
    /// operator of the owner.
    pub fn approve(&mut self, env: &Env, approved: Address, token_id: TokenId) -> LedgerResult<()> {
        let owner = self.owner_of(token_id);
        if owner.is_zero() {
            return Err(LedgerError::NoLockFound(token_id));
        }
        if approved == owner {
            return Err(LedgerError::InvalidRecipient(approved));
        }
        if env.sender != owner && !self.is_approved_for_all(owner, env.sender) {
            return Err(LedgerError::NotApprovedOrOwner(env.sender));
        }
        self.approvals.insert(token_id, approved);
        Ok(())
    }

    pub fn set_approval_for_all(
        &mut self,
        env: &Env,
        operator: Address,
        approved: bool,
    ) -> LedgerResult<()> {
        if operator == env.sender {
            return Err(LedgerError::InvalidRecipient(operator));
        }
        if approved {
            self.operators.insert((env.sender, operator));
        } else {
            self.operators.remove(&(env.sender, operator));
        }
        Ok(())
    }

    /// Move `token_id` from `from` to `to`. Attached or voted locks cannot
    /// change hands.
    pub fn transfer_from(
        &mut self,
        env: &Env,
        from: Address,
        to: Address,
        token_id: TokenId,
    ) -> LedgerResult<()> {
        self.non_reentrant(|escrow| {
            let owner = escrow.owner_of(token_id);
            if owner.is_zero() {
                return Err(LedgerError::NoLockFound(token_id));
            }
            if owner != from {
                return Err(LedgerError::NotApprovedOrOwner(from));
            }
            if to.is_zero() {
                return Err(LedgerError::InvalidRecipient(to));
            }
            if !escrow.is_approved_or_owner(env.sender, token_id) {
                return Err(LedgerError::NotApprovedOrOwner(env.sender));
            }
            escrow.ensure_not_committed(token_id)?;

            let src = escrow.delegation.delegates(from);
            let dst = escrow.delegation.delegates(to);
            escrow
                .delegation
                .move_token_delegates(env.timestamp, src, dst, token_id)?;

            escrow.approvals.remove(&token_id);
            escrow.remove_token_from(from, token_id);
            escrow.add_token_to(to, token_id);
            escrow.ownership_change.insert(token_id, env.block);

            tracing::debug!("Lock {} transferred from {} to {}", token_id, from, to);
            Ok(())
        })
    }

    pub(crate) fn add_token_to(&mut self, to: Address, token_id: TokenId) {
        self.owners.insert(token_id, to);
        self.owned_tokens.entry(to).or_default().push(token_id);
    }

    pub(crate) fn remove_token_from(&mut self, from: Address, token_id: TokenId) {
        self.owners.remove(&token_id);
        if let Some(tokens) = self.owned_tokens.get_mut(&from) {
            tokens.retain(|id| *id != token_id);
            if tokens.is_empty() {
                self.owned_tokens.remove(&from);
            }
        }
    }

    /// Fails if `token_id` is attached to or has voted in a gauge
    pub(crate) fn ensure_not_committed(&self, token_id: TokenId) -> LedgerResult<()> {
        if self.voted(token_id) {
            return Err(LedgerError::AlreadyVoted(token_id));
        }
        if self.attachments(token_id) != 0 {
            return Err(LedgerError::LockAttached(token_id));
        }
        Ok(())
    }

    // ========================================================================
    // Voter and Team Controls
    // ========================================================================

    fn ensure_voter(&self, env: &Env) -> LedgerResult<()> {
        if env.sender != self.voter {
            return Err(LedgerError::NotVoter(env.sender));
        }
        Ok(())
    }

    pub fn voting(&mut self, env: &Env, token_id: TokenId) -> LedgerResult<()> {
        self.ensure_voter(env)?;
        self.voted.insert(token_id);
        Ok(())
    }

    pub fn abstain(&mut self, env: &Env, token_id: TokenId) -> LedgerResult<()> {
        self.ensure_voter(env)?;
        self.voted.remove(&token_id);
        Ok(())
    }

    pub fn attach(&mut self, env: &Env, token_id: TokenId) -> LedgerResult<()> {
        self.ensure_voter(env)?;
        let count = self.attachments.entry(token_id).or_insert(0);
        *count = count.checked_add(1).ok_or(LedgerError::MathOverflow)?;
        Ok(())
    }

    pub fn detach(&mut self, env: &Env, token_id: TokenId) -> LedgerResult<()> {
        self.ensure_voter(env)?;
        let count = self.attachments(token_id);
        let remaining = count.checked_sub(1).ok_or(LedgerError::MathOverflow)?;
        if remaining == 0 {
            self.attachments.remove(&token_id);
        } else {
            self.attachments.insert(token_id, remaining);
        }
        Ok(())
    }

    /// Allow or forbid `account` to split locks. The zero address toggles
    /// splitting for everyone.
    pub fn toggle_split(&mut self, env: &Env, account: Address, allowed: bool) -> LedgerResult<()> {
        if env.sender != self.team {
            return Err(LedgerError::NotTeam(env.sender));
        }
        if allowed {
            self.can_split.insert(account);
        } else {
            self.can_split.remove(&account);
        }
        tracing::info!("Split permission for {} set to {}", account, allowed);
        Ok(())
    }

    pub fn set_team(&mut self, env: &Env, team: Address) -> LedgerResult<()> {
        if env.sender != self.team {
            return Err(LedgerError::NotTeam(env.sender));
        }
        if team.is_zero() {
            return Err(LedgerError::InvalidRecipient(team));
        }
        self.team = team;
        Ok(())
    }

    // ========================================================================
    // Delegation
    // ========================================================================

    /// Delegatee of `account`, defaulting to itself
    pub fn delegates(&self, account: Address) -> Address {
        self.delegation.delegates(account)
    }

    /// Delegate the votes of every lock the caller owns to `delegatee`
    pub fn delegate(&mut self, env: &Env, delegatee: Address) -> LedgerResult<()> {
        let delegatee = if delegatee.is_zero() { env.sender } else { delegatee };
        self.non_reentrant(|escrow| {
            let delegator = env.sender;
            let current = escrow.delegation.delegates(delegator);
            let owned = escrow.owned_tokens(delegator).to_vec();

            let owners = &escrow.owners;
            escrow.delegation.move_all_delegates(
                env.timestamp,
                delegator,
                current,
                delegatee,
                &owned,
                |id| owners.get(&id).copied().unwrap_or(Address::ZERO),
            )?;
            escrow.delegation.set_delegate(delegator, delegatee);

            tracing::debug!("{} delegated {} locks to {}", delegator, owned.len(), delegatee);
            Ok(())
        })
    }

    /// Current voting power delegated to `account`
    pub fn get_votes(&self, account: Address, now: u64) -> u128 {
        self.delegation
            .current_token_ids(account)
            .iter()
            .fold(0u128, |votes, id| votes.saturating_add(self.balance_at(*id, now)))
    }

    /// Voting power delegated to `account` at `timestamp`
    pub fn get_past_votes(&self, account: Address, timestamp: u64) -> u128 {
        self.delegation
            .token_ids_at(account, timestamp)
            .iter()
            .fold(0u128, |votes, id| votes.saturating_add(self.balance_at(*id, timestamp)))
    }

    pub fn get_past_votes_index(&self, account: Address, timestamp: u64) -> Option<usize> {
        self.delegation.past_votes_index(account, timestamp)
    }

    pub fn num_checkpoints(&self, account: Address) -> usize {
        self.delegation.num_checkpoints(account)
    }
}

impl LockOwnership for VotingEscrow {
    fn owner_of(&self, token_id: TokenId) -> Address {
        self.owners.get(&token_id).copied().unwrap_or(Address::ZERO)
    }

    fn is_approved_or_owner(&self, spender: Address, token_id: TokenId) -> bool {
        let owner = self.owner_of(token_id);
        if owner.is_zero() {
            return false;
        }
        owner == spender
            || self.get_approved(token_id) == spender
            || self.is_approved_for_all(owner, spender)
    }
}

impl Guarded for VotingEscrow {
    fn guard_status(&mut self) -> &mut ReentrancyStatus {
        &mut self.status
    }
}
