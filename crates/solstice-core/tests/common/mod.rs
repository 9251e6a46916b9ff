//! Shared fixtures for the integration tests: an escrow world plus simple
//! voter and gauge collaborators.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use solstice_core::{
    safe_transfer_from, Address, EmissionsConfig, EscrowConfig, Env, GaugeHooks, GaugeManager, LedgerError, LedgerResult,
    LockOwnership, MemoryTokenLedger, RewardConfig, RewardKind, RewardLedger, TokenId, TokenLedger,
    VoterHooks, VotingEscrow, WEEK,
};

/// Epoch-aligned start of every scenario
pub const START: u64 = 2_500 * WEEK;

/// Users funded by [`escrow_world`]
pub const USERS: u64 = 4;

pub const FUNDING: u128 = 1_000_000_000_000_000_000_000_000;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64(n)
}

pub fn underlying() -> Address {
    addr(0xAAA)
}

pub fn escrow_config() -> EscrowConfig {
    EscrowConfig {
        address: addr(0xE5C),
        token: underlying(),
        voter: addr(0xB07),
        team: addr(0x7EA),
    }
}

/// Call environment of `sender` at `timestamp`, one block every second
pub fn env_at(sender: Address, timestamp: u64) -> Env {
    Env::new(sender, timestamp, 1_000 + timestamp.saturating_sub(START))
}

/// Escrow deployed at [`START`] with funded, approved users and splitting
/// enabled for everyone
pub fn escrow_world() -> (VotingEscrow, MemoryTokenLedger) {
    let config = escrow_config();
    let mut escrow = VotingEscrow::new(config, &env_at(addr(0xDE9), START));
    let mut bank = MemoryTokenLedger::new();
    for user in 1..=USERS {
        bank.mint(underlying(), addr(user), FUNDING).unwrap();
        bank.approve(underlying(), addr(user), config.address, u128::MAX)
            .unwrap();
    }
    escrow
        .toggle_split(&env_at(config.team, START), Address::ZERO, true)
        .unwrap();
    (escrow, bank)
}

/// Voter with explicit per-epoch weights
#[derive(Debug, Default, Clone)]
pub struct MockVoter {
    pub totals: HashMap<u64, u128>,
    pub pools: HashMap<(u64, Address), u128>,
    pub whitelist: HashSet<Address>,
    pub pokes: Vec<(TokenId, u128)>,
}

impl MockVoter {
    /// Record `weight` for `pool` in the epoch starting at `epoch`
    pub fn vote(&mut self, epoch: u64, pool: Address, weight: u128) {
        *self.pools.entry((epoch, pool)).or_insert(0) += weight;
        *self.totals.entry(epoch).or_insert(0) += weight;
    }
}

impl VoterHooks for MockVoter {
    fn poke(&mut self, token_id: TokenId, balance: u128) -> LedgerResult<()> {
        self.pokes.push((token_id, balance));
        Ok(())
    }

    fn epoch_total_weight(&self, epoch_start: u64) -> u128 {
        self.totals.get(&epoch_start).copied().unwrap_or(0)
    }

    fn epoch_pool_weight(&self, epoch_start: u64, pool: Address) -> u128 {
        self.pools.get(&(epoch_start, pool)).copied().unwrap_or(0)
    }

    fn is_whitelisted_token(&self, token: Address) -> bool {
        self.whitelist.contains(&token)
    }
}

/// Gauges that pull pushed emissions through their allowance
#[derive(Debug, Default, Clone)]
pub struct MockGauges {
    pub received: HashMap<Address, u128>,
    pub emergency: HashSet<Address>,
}

impl GaugeHooks for MockGauges {
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
        if self.emergency.contains(&gauge) {
            return Err(LedgerError::Collaborator(format!("gauge {} halted", gauge)));
        }
        Ok((0, 0))
    }
}

/// Lock `n` is owned by `addr(n)`
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectOwners;

impl LockOwnership for DirectOwners {
    fn owner_of(&self, token_id: TokenId) -> Address {
        addr(token_id)
    }

    fn is_approved_or_owner(&self, spender: Address, token_id: TokenId) -> bool {
        spender == addr(token_id)
    }
}

/// Sum of the balances of every lock id ever minted, at `t`
pub fn sum_of_balances(escrow: &VotingEscrow, t: u64) -> u128 {
    (1..=escrow.token_id())
        .map(|id| escrow.balance_at(id, t))
        .sum()
}

// ============================================================================
// Emissions and Bribe Fixtures
// ============================================================================

pub fn emission_token() -> Address {
    addr(0xBBB)
}

pub fn bribe_token() -> Address {
    addr(0xB81)
}

pub fn minter() -> Address {
    addr(0x1117)
}

pub fn governance() -> Address {
    addr(0x60F)
}

pub fn briber() -> Address {
    addr(0xB1E)
}

pub fn pool(n: u64) -> Address {
    addr(0x100 + n)
}

pub fn gauge(n: u64) -> Address {
    addr(0x200 + n)
}

pub fn emissions_config() -> EmissionsConfig {
    EmissionsConfig {
        address: addr(0xE41),
        reward_token: emission_token(),
        minter: minter(),
        governance: governance(),
    }
}

/// Distributor with `gauges` registered gauges and a funded minter
pub fn emissions_world(gauges: u64) -> (GaugeManager, MemoryTokenLedger) {
    let config = emissions_config();
    let mut manager = GaugeManager::new(config);
    let mut bank = MemoryTokenLedger::new();
    bank.mint(emission_token(), minter(), FUNDING).unwrap();
    bank.approve(emission_token(), minter(), config.address, u128::MAX)
        .unwrap();

    let env = env_at(governance(), START);
    for n in 0..gauges {
        manager.create_gauge(&env, &mut bank, pool(n), gauge(n)).unwrap();
    }
    (manager, bank)
}

pub fn bribe_config() -> RewardConfig {
    RewardConfig {
        address: addr(0xB1B),
        voter: escrow_config().voter,
        gauge: gauge(0),
        kind: RewardKind::External,
    }
}

/// External bribe ledger with a funded, approved briber
pub fn bribe_world(bank: &mut MemoryTokenLedger) -> RewardLedger {
    let config = bribe_config();
    bank.mint(bribe_token(), briber(), FUNDING).unwrap();
    bank.approve(bribe_token(), briber(), config.address, u128::MAX)
        .unwrap();
    RewardLedger::new(config)
}
