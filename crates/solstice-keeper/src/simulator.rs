//! # Replay Simulator
//!
//! Applies scenario events to an in-memory deployment: the voting escrow,
//! the emissions distributor, one bribe ledger per gauge and a token
//! ledger. The voter and the gauge contracts are played by
//! [`ScenarioVoter`] and [`ScenarioGauges`].
//!
//! Every event runs against a copy of the world that replaces the live one
//! only if the whole event succeeded, so an event touching several ledgers
//! (a vote, a batched distribution) is all-or-nothing.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use solstice_core::epoch::{epoch_start, epoch_vote_end, epoch_vote_start};
use solstice_core::math::mul_div;
use solstice_core::{
    safe_approve, safe_transfer_from, Address, EmissionsConfig, Env, EscrowConfig, GaugeHooks, GaugeManager,
    LedgerError, LedgerResult, LockKind, LockOwnership, MemoryTokenLedger, RewardConfig, RewardKind, RewardLedger,
    TokenId, TokenLedger, VoterHooks, VotingEscrow,
};

use crate::config::KeeperConfig;
use crate::error::{KeeperError, KeeperResult};
use crate::scenario::{Action, Event, PoolWeight, Scenario};

// ============================================================================
// Collaborators
// ============================================================================

/// Live vote of one lock
#[derive(Debug, Clone)]
struct CastVote {
    epoch: u64,
    /// (requested weight, gauge, weight actually cast)
    pools: Vec<(PoolWeight, Address, u128)>,
}

/// Voter stand-in: records per-epoch pool weights and the live vote of
/// every lock
#[derive(Debug, Clone, Default)]
pub struct ScenarioVoter {
    totals: HashMap<u64, u128>,
    pool_weights: HashMap<(u64, Address), u128>,
    whitelist: HashSet<Address>,
    votes: HashMap<TokenId, CastVote>,
    /// Locks whose balance changed while voted, re-cast after the event
    pending_pokes: Vec<(TokenId, u128)>,
}

impl ScenarioVoter {
    fn add_weight(&mut self, epoch: u64, pool: Address, weight: u128) -> LedgerResult<()> {
        let total = self.totals.entry(epoch).or_insert(0);
        *total = total.checked_add(weight).ok_or(LedgerError::MathOverflow)?;
        let pool_weight = self.pool_weights.entry((epoch, pool)).or_insert(0);
        *pool_weight = pool_weight.checked_add(weight).ok_or(LedgerError::MathOverflow)?;
        Ok(())
    }

    fn remove_weight(&mut self, epoch: u64, pool: Address, weight: u128) {
        if let Some(total) = self.totals.get_mut(&epoch) {
            *total = total.saturating_sub(weight);
        }
        if let Some(pool_weight) = self.pool_weights.get_mut(&(epoch, pool)) {
            *pool_weight = pool_weight.saturating_sub(weight);
        }
    }

    pub fn has_voted(&self, token_id: TokenId) -> bool {
        self.votes.contains_key(&token_id)
    }
}

impl VoterHooks for ScenarioVoter {
    fn poke(&mut self, token_id: TokenId, balance: u128) -> LedgerResult<()> {
        if self.votes.contains_key(&token_id) {
            self.pending_pokes.push((token_id, balance));
        }
        Ok(())
    }

    fn epoch_total_weight(&self, epoch_start: u64) -> u128 {
        self.totals.get(&epoch_start).copied().unwrap_or(0)
    }

    fn epoch_pool_weight(&self, epoch_start: u64, pool: Address) -> u128 {
        self.pool_weights.get(&(epoch_start, pool)).copied().unwrap_or(0)
    }

    fn is_whitelisted_token(&self, token: Address) -> bool {
        self.whitelist.contains(&token)
    }
}

/// Gauge stand-ins. Trading fees are not modelled; fee claims are counted.
#[derive(Debug, Clone, Default)]
pub struct ScenarioGauges {
    received: BTreeMap<Address, u128>,
    emergency: HashSet<Address>,
    fee_claims: BTreeMap<Address, u64>,
}

impl ScenarioGauges {
    pub fn received(&self, gauge: Address) -> u128 {
        self.received.get(&gauge).copied().unwrap_or(0)
    }

    pub fn fee_claims(&self, gauge: Address) -> u64 {
        self.fee_claims.get(&gauge).copied().unwrap_or(0)
    }
}

impl GaugeHooks for ScenarioGauges {
    fn notify_reward_amount(
        &mut self,
        bank: &mut dyn TokenLedger,
        distributor: Address,
        gauge: Address,
        token: Address,
        amount: u128,
    ) -> LedgerResult<()> {
        safe_transfer_from(bank, token, gauge, distributor, gauge, amount)?;
        *self.received.entry(gauge).or_insert(0) += amount;
        Ok(())
    }

    fn is_emergency(&self, gauge: Address) -> bool {
        self.emergency.contains(&gauge)
    }

    fn claim_fees(&mut self, _bank: &mut dyn TokenLedger, gauge: Address) -> LedgerResult<(u128, u128)> {
        *self.fee_claims.entry(gauge).or_insert(0) += 1;
        Ok((0, 0))
    }
}

// ============================================================================
// World
// ============================================================================

/// Every ledger of one deployment
#[derive(Debug, Clone)]
pub struct World {
    pub escrow: VotingEscrow,
    pub distributor: GaugeManager,
    /// Bribe ledger of each gauge
    pub bribes: BTreeMap<Address, RewardLedger>,
    pub bank: MemoryTokenLedger,
    pub voter: ScenarioVoter,
    pub gauges: ScenarioGauges,
}

impl World {
    fn bribe_mut(&mut self, gauge: Address) -> LedgerResult<&mut RewardLedger> {
        self.bribes.get_mut(&gauge).ok_or(LedgerError::UnknownGauge(gauge))
    }

    fn ensure_owner(&self, env: &Env, token_id: TokenId) -> LedgerResult<()> {
        if self.escrow.is_approved_or_owner(env.sender, token_id) {
            Ok(())
        } else {
            Err(LedgerError::NotApprovedOrOwner(env.sender))
        }
    }

    /// Split `balance` over `pools` by relative weight and record it in the
    /// voter, the bribe ledgers and the escrow
    fn cast_vote(
        &mut self,
        env: &Env,
        voter: Address,
        token_id: TokenId,
        pools: &[PoolWeight],
        balance: u128,
    ) -> LedgerResult<()> {
        let total = pools
            .iter()
            .try_fold(0u128, |acc, pool| acc.checked_add(pool.weight))
            .ok_or(LedgerError::MathOverflow)?;
        if total == 0 || balance == 0 {
            return Err(LedgerError::ZeroAmount);
        }

        let epoch = epoch_start(env.timestamp);
        let voter_env = env.with_sender(voter);
        let mut cast = Vec::with_capacity(pools.len());
        for pool in pools {
            let gauge = self
                .distributor
                .gauge_for_pool(pool.pool)
                .ok_or(LedgerError::UnknownGauge(pool.pool))?;
            if !self.distributor.is_alive(gauge) {
                return Err(LedgerError::GaugeKilled(gauge));
            }
            let share = mul_div(balance, pool.weight, total)?;
            if share == 0 {
                continue;
            }
            self.bribe_mut(gauge)?.deposit(&voter_env, share, token_id)?;
            self.voter.add_weight(epoch, pool.pool, share)?;
            cast.push((*pool, gauge, share));
        }

        self.voter.votes.insert(token_id, CastVote { epoch, pools: cast });
        self.escrow.voting(&voter_env, token_id)
    }

    /// Withdraw the live vote of `token_id`. Weight cast in an earlier epoch
    /// stays in that epoch's tally.
    fn reset_vote(&mut self, env: &Env, voter: Address, token_id: TokenId) -> LedgerResult<()> {
        let vote = match self.voter.votes.remove(&token_id) {
            Some(vote) => vote,
            None => return Ok(()),
        };
        let epoch = epoch_start(env.timestamp);
        let voter_env = env.with_sender(voter);
        for (pool, gauge, share) in &vote.pools {
            if vote.epoch == epoch {
                self.voter.remove_weight(epoch, pool.pool, *share);
            }
            self.bribe_mut(*gauge)?.withdraw(&voter_env, *share, token_id)?;
        }
        self.escrow.abstain(&voter_env, token_id)
    }

    fn vote(&mut self, env: &Env, voter: Address, token_id: TokenId, pools: &[PoolWeight]) -> LedgerResult<()> {
        self.ensure_owner(env, token_id)?;
        if env.timestamp < epoch_vote_start(env.timestamp) || env.timestamp > epoch_vote_end(env.timestamp) {
            return Err(LedgerError::Collaborator(format!(
                "vote at {} is outside the voting window",
                env.timestamp
            )));
        }
        self.reset_vote(env, voter, token_id)?;
        let balance = self.escrow.balance_of_nft(env, token_id);
        self.cast_vote(env, voter, token_id, pools, balance)
    }

    /// Re-cast the votes of locks whose balance changed during the event
    fn apply_pokes(&mut self, env: &Env, voter: Address) -> LedgerResult<()> {
        for (token_id, balance) in std::mem::take(&mut self.voter.pending_pokes) {
            let pools: Vec<PoolWeight> = match self.voter.votes.get(&token_id) {
                Some(vote) => vote.pools.iter().map(|(pool, _, _)| *pool).collect(),
                None => continue,
            };
            self.reset_vote(env, voter, token_id)?;
            self.cast_vote(env, voter, token_id, &pools, balance)?;
        }
        Ok(())
    }

    /// Apply one action at `env`
    pub fn apply(&mut self, config: &KeeperConfig, env: &Env, action: &Action) -> LedgerResult<()> {
        let voter = config.roles.voter;
        match action {
            Action::CreateLock { amount, duration } => {
                self.escrow.create_lock(env, &mut self.bank, *amount, *duration)?;
            }
            Action::CreateLockFor { amount, duration, to } => {
                self.escrow
                    .create_lock_for(env, &mut self.bank, *amount, *duration, *to)?;
            }
            Action::CreateBonusLock { amount, to } => {
                self.escrow.create_sm_nft_for(env, &mut self.bank, *amount, *to)?;
            }
            Action::DepositFor { token_id, amount } => {
                self.escrow
                    .deposit_for(env, &mut self.bank, &mut self.voter, *token_id, *amount)?;
                self.apply_pokes(env, voter)?;
            }
            Action::IncreaseAmount { token_id, amount } => {
                self.escrow
                    .increase_amount(env, &mut self.bank, &mut self.voter, *token_id, *amount)?;
                self.apply_pokes(env, voter)?;
            }
            Action::IncreaseUnlockTime { token_id, duration } => {
                self.escrow.increase_unlock_time(env, *token_id, *duration)?;
            }
            Action::ConvertToBonus { token_id } => {
                self.escrow.convert_to_sm_nft(env, &mut self.bank, *token_id)?;
            }
            Action::LockPermanent { token_id } => self.escrow.lock_permanent(env, *token_id)?,
            Action::UnlockPermanent { token_id } => self.escrow.unlock_permanent(env, *token_id)?,
            Action::Merge { from, to } => self.escrow.merge(env, *from, *to)?,
            Action::Split { token_id, amount } => {
                let result = self.escrow.split(env, *token_id, *amount)?;
                tracing::debug!("Split {} into {} and {}", token_id, result.remainder, result.split);
            }
            Action::Withdraw { token_id } => {
                self.escrow.withdraw(env, &mut self.bank, *token_id)?;
            }
            Action::Transfer { token_id, to } => {
                let owner = self.escrow.owner_of(*token_id);
                self.escrow.transfer_from(env, owner, *to, *token_id)?;
            }
            Action::Approve { token_id, approved } => self.escrow.approve(env, *approved, *token_id)?,
            Action::Delegate { delegatee } => self.escrow.delegate(env, *delegatee)?,
            Action::ToggleSplit { account, allowed } => self.escrow.toggle_split(env, *account, *allowed)?,
            Action::Checkpoint => self.escrow.checkpoint(env)?,

            Action::Vote { token_id, pools } => self.vote(env, voter, *token_id, pools)?,
            Action::Reset { token_id } => {
                self.ensure_owner(env, *token_id)?;
                self.reset_vote(env, voter, *token_id)?;
            }

            Action::NotifyEmissions { amount } => {
                self.distributor
                    .notify_reward_amount(env, &mut self.bank, &self.voter, *amount)?;
            }
            Action::UpdateGauges { gauges } => {
                self.distributor
                    .update_for(env, &mut self.bank, &self.voter, gauges)?;
            }
            Action::Distribute => {
                let length = self.distributor.length();
                let batch = config.distribution.batch_size.max(1);
                let mut start = 0;
                while start < length {
                    let finish = (start + batch).min(length);
                    let pushed = self.distributor.distribute_range(
                        env,
                        &mut self.bank,
                        &self.voter,
                        &mut self.gauges,
                        start,
                        finish,
                    )?;
                    tracing::debug!("Distributed {} to gauges {}..{}", pushed, start, finish);
                    start = finish;
                }
            }
            Action::DistributeGauges { gauges } => {
                self.distributor
                    .distribute_gauges(env, &mut self.bank, &self.voter, &mut self.gauges, gauges)?;
            }
            Action::KillGauge { gauge } => self.distributor.kill_gauge(env, &mut self.bank, *gauge)?,
            Action::ReviveGauge { gauge } => self.distributor.revive_gauge(env, &mut self.bank, *gauge)?,
            Action::SetEmergency { gauge, emergency } => {
                if env.sender != config.roles.governance {
                    return Err(LedgerError::NotGovernance(env.sender));
                }
                if *emergency {
                    self.gauges.emergency.insert(*gauge);
                } else {
                    self.gauges.emergency.remove(gauge);
                }
            }
            Action::DistributeFees { gauges } => {
                self.distributor
                    .distribute_fees(&mut self.bank, &mut self.gauges, gauges)?;
            }

            Action::NotifyBribe { gauge, token, amount } => {
                let ledger = self.bribes.get_mut(gauge).ok_or(LedgerError::UnknownGauge(*gauge))?;
                ledger.notify_reward_amount(env, &mut self.bank, &self.voter, *token, *amount)?;
            }
            Action::ClaimBribes { gauge, token_id, tokens } => {
                let ledger = self.bribes.get_mut(gauge).ok_or(LedgerError::UnknownGauge(*gauge))?;
                ledger.get_reward(env, &mut self.bank, &self.escrow, *token_id, tokens)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Simulator
// ============================================================================

/// An event the ledgers refused
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Rejection {
    pub index: usize,
    pub at: u64,
    pub action: String,
    pub error: String,
}

pub struct Simulator {
    config: KeeperConfig,
    name: String,
    world: World,
    timestamp: u64,
    block: u64,
    applied: usize,
    rejected: Vec<Rejection>,
    /// (token, account) pairs to report balances for
    tracked: Vec<(Address, Address)>,
}

impl Simulator {
    /// Deploy the ledgers, fund the scenario accounts and register its
    /// gauges at genesis
    pub fn new(config: KeeperConfig, scenario: &Scenario) -> KeeperResult<Self> {
        config.validate()?;
        scenario.validate()?;

        let genesis = Env::new(
            config.roles.governance,
            config.clock.genesis_timestamp,
            config.clock.genesis_block,
        );
        let escrow = VotingEscrow::new(
            EscrowConfig {
                address: config.contracts.escrow,
                token: config.tokens.underlying,
                voter: config.roles.voter,
                team: config.roles.team,
            },
            &genesis,
        );
        let mut distributor = GaugeManager::new(EmissionsConfig {
            address: config.contracts.distributor,
            reward_token: config.tokens.reward,
            minter: config.roles.minter,
            governance: config.roles.governance,
        });
        let mut bank = MemoryTokenLedger::new();
        let mut bribes = BTreeMap::new();

        for entry in &scenario.gauges {
            distributor.create_gauge(&genesis, &mut bank, entry.pool, entry.gauge)?;
            bribes.insert(
                entry.gauge,
                RewardLedger::new(RewardConfig {
                    address: entry.bribe,
                    voter: config.roles.voter,
                    gauge: entry.gauge,
                    kind: RewardKind::External,
                }),
            );
        }

        let mut spenders = vec![config.contracts.escrow, config.contracts.distributor];
        spenders.extend(scenario.gauges.iter().map(|entry| entry.bribe));

        let mut tracked = Vec::new();
        for funding in &scenario.funding {
            bank.mint(funding.token, funding.account, funding.amount)?;
            for spender in &spenders {
                safe_approve(&mut bank, funding.token, funding.account, *spender, u128::MAX)?;
            }
            if !tracked.contains(&(funding.token, funding.account)) {
                tracked.push((funding.token, funding.account));
            }
        }

        let voter = ScenarioVoter {
            whitelist: scenario.whitelist.iter().copied().collect(),
            ..ScenarioVoter::default()
        };

        tracing::info!(
            "Deployed scenario {} at {} with {} gauges and {} funded accounts",
            scenario.name,
            render_time(config.clock.genesis_timestamp),
            scenario.gauges.len(),
            tracked.len()
        );

        Ok(Self {
            timestamp: config.clock.genesis_timestamp,
            block: config.clock.genesis_block,
            name: scenario.name.clone(),
            world: World {
                escrow,
                distributor,
                bribes,
                bank,
                voter,
                gauges: ScenarioGauges::default(),
            },
            applied: 0,
            rejected: Vec::new(),
            tracked,
            config,
        })
    }

    /// Call environment of `sender` at scenario offset `at`
    pub fn env(&self, sender: Address, at: u64) -> Env {
        let clock = &self.config.clock;
        Env::new(
            sender,
            clock.genesis_timestamp + at,
            clock.genesis_block + at / clock.seconds_per_block,
        )
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn rejected(&self) -> &[Rejection] {
        &self.rejected
    }

    /// Apply one event atomically
    pub fn apply(&mut self, index: usize, event: &Event) -> KeeperResult<()> {
        let env = self.env(event.sender, event.at);
        if env.timestamp < self.timestamp {
            return Err(KeeperError::InvalidScenario(format!(
                "event {} at {} precedes the current clock {}",
                index, env.timestamp, self.timestamp
            )));
        }
        self.timestamp = env.timestamp;
        self.block = env.block;

        let mut next = self.world.clone();
        next.apply(&self.config, &env, &event.action)
            .map_err(|source| KeeperError::EventRejected {
                index,
                action: event.action.name().to_string(),
                source,
            })?;
        self.world = next;
        self.applied += 1;

        tracing::debug!(
            "Event {} {} by {} applied at {}",
            index,
            event.action.name(),
            event.sender,
            render_time(env.timestamp)
        );
        Ok(())
    }

    /// Apply every event in order. Rejected events are logged and recorded;
    /// anything else stops the replay.
    pub fn replay(&mut self, events: &[Event]) -> KeeperResult<()> {
        for (index, event) in events.iter().enumerate() {
            match self.apply(index, event) {
                Ok(()) => {}
                Err(KeeperError::EventRejected { index, action, source }) => {
                    tracing::warn!("Event {} ({}) rejected: {}", index, action, source);
                    self.rejected.push(Rejection {
                        index,
                        at: event.at,
                        action,
                        error: source.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        tracing::info!(
            "Replayed {} events: {} applied, {} rejected",
            events.len(),
            self.applied,
            self.rejected.len()
        );
        Ok(())
    }

    /// Snapshot of the ledgers at the current clock
    pub fn report(&self) -> Report {
        let world = &self.world;
        let escrow = &world.escrow;

        let locks = escrow
            .live_token_ids()
            .into_iter()
            .map(|token_id| {
                let lock = escrow.locked(token_id);
                LockReport {
                    token_id,
                    owner: escrow.owner_of(token_id),
                    kind: lock.kind(),
                    amount: lock.amount,
                    end: lock.end,
                    balance: escrow.balance_at(token_id, self.timestamp),
                    voted: escrow.voted(token_id),
                }
            })
            .collect();

        let gauges = world
            .distributor
            .gauges()
            .iter()
            .filter_map(|gauge| world.distributor.gauge_info(*gauge).map(|info| (*gauge, info)))
            .map(|(gauge, info)| GaugeReport {
                gauge,
                pool: info.pool,
                alive: info.is_alive,
                claimable: info.claimable,
                supply_index: info.supply_index,
                last_distribution: info.last_distribution,
                received: world.gauges.received(gauge),
                fee_claims: world.gauges.fee_claims(gauge),
            })
            .collect();

        let bribes = world
            .bribes
            .iter()
            .map(|(gauge, ledger)| BribeReport {
                gauge: *gauge,
                address: ledger.address(),
                total_supply: ledger.total_supply(),
                rewards: ledger.rewards().to_vec(),
            })
            .collect();

        let balances = self
            .tracked
            .iter()
            .map(|(token, account)| BalanceReport {
                token: *token,
                account: *account,
                amount: world.bank.balance_of(*token, *account),
            })
            .collect();

        Report {
            scenario: self.name.clone(),
            timestamp: self.timestamp,
            time: render_time(self.timestamp),
            block: self.block,
            events_applied: self.applied,
            rejected: self.rejected.clone(),
            escrow: EscrowReport {
                supply: escrow.supply(),
                voting_power: escrow.total_supply_at(self.timestamp),
                permanent_lock_balance: escrow.permanent_lock_balance(),
                sm_nft_balance: escrow.sm_nft_balance(),
                sm_nft_bonus_balance: escrow.sm_nft_bonus_balance(),
                epoch: escrow.epoch(),
                locks,
            },
            emissions_index: world.distributor.index(),
            gauges,
            bribes,
            balances,
        }
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub scenario: String,
    pub timestamp: u64,
    pub time: String,
    pub block: u64,
    pub events_applied: usize,
    pub rejected: Vec<Rejection>,
    pub escrow: EscrowReport,
    pub emissions_index: u128,
    pub gauges: Vec<GaugeReport>,
    pub bribes: Vec<BribeReport>,
    pub balances: Vec<BalanceReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EscrowReport {
    pub supply: u128,
    pub voting_power: u128,
    pub permanent_lock_balance: u128,
    pub sm_nft_balance: u128,
    pub sm_nft_bonus_balance: u128,
    pub epoch: usize,
    pub locks: Vec<LockReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LockReport {
    pub token_id: TokenId,
    pub owner: Address,
    pub kind: LockKind,
    pub amount: u128,
    pub end: u64,
    pub balance: u128,
    pub voted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GaugeReport {
    pub gauge: Address,
    pub pool: Address,
    pub alive: bool,
    pub claimable: u128,
    pub supply_index: u128,
    pub last_distribution: u64,
    pub received: u128,
    pub fee_claims: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BribeReport {
    pub gauge: Address,
    pub address: Address,
    pub total_supply: u128,
    pub rewards: Vec<Address>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceReport {
    pub token: Address,
    pub account: Address,
    pub amount: u128,
}

/// RFC 3339 rendering of a ledger timestamp
pub fn render_time(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| chrono::DateTime::<chrono::Utc>::from_timestamp(secs, 0))
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}
