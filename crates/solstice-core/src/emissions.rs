//! # Emissions Distributor
//!
//! Index-based pro-rata accrual of emissions to gauges:
//!
//! 1. The minter notifies an amount; the global `index` grows by
//!    `amount * 1e18 / total_weight` of the voting epoch that just closed.
//! 2. A gauge's share of an index delta is `weight * delta / 1e18`, where
//!    `weight` is its pool's vote in that same epoch. The gauge's
//!    `supply_index` then catches up to `index`, so no delta is ever
//!    credited twice.
//! 3. Distribution pushes the accrued `claimable` to live gauges at most
//!    once per epoch. Killed gauges send their share back to the minter.
//!
//! Calls that move tokens more than once (multi-gauge accrual and
//! distribution, killing a gauge) run on a staged copy of the distributor
//! with journaled transfers, so a failure at any gauge commits nothing.

use std::collections::HashMap;

use crate::constants::MULTIPLIER;
use crate::epoch::{epoch_start, previous_epoch_start};
use crate::errors::{LedgerError, LedgerResult};
use crate::interfaces::{safe_approve, safe_transfer, safe_transfer_from, GaugeHooks, TokenLedger, VoterHooks};
use crate::journal::transact;
use crate::math::{add_u128, mul_div};
use crate::reentrancy::{Guarded, ReentrancyStatus};
use crate::types::{Address, Env};

/// Accrual state of one gauge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "client", derive(borsh::BorshSerialize, borsh::BorshDeserialize))]
pub struct GaugeInfo {
    pub pool: Address,
    /// Global index this gauge has been credited up to
    pub supply_index: u128,
    /// Accrued, not yet distributed
    pub claimable: u128,
    pub is_alive: bool,
    /// Epoch start of the last push to the gauge
    pub last_distribution: u64,
}

/// Addresses a distributor is deployed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmissionsConfig {
    /// Account holding undistributed emissions in the token ledger
    pub address: Address,
    pub reward_token: Address,
    pub minter: Address,
    pub governance: Address,
}

#[derive(Debug, Clone)]
pub struct GaugeManager {
    address: Address,
    reward_token: Address,
    minter: Address,
    governance: Address,
    index: u128,
    /// Registration order
    gauges: Vec<Address>,
    gauge_info: HashMap<Address, GaugeInfo>,
    pool_gauge: HashMap<Address, Address>,
    status: ReentrancyStatus,
}

impl GaugeManager {
    pub fn new(config: EmissionsConfig) -> Self {
        Self {
            address: config.address,
            reward_token: config.reward_token,
            minter: config.minter,
            governance: config.governance,
            index: 0,
            gauges: Vec::new(),
            gauge_info: HashMap::new(),
            pool_gauge: HashMap::new(),
            status: ReentrancyStatus::Unlocked,
        }
    }

    // ========================================================================
    // State Views
    // ========================================================================

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn reward_token(&self) -> Address {
        self.reward_token
    }

    pub fn minter(&self) -> Address {
        self.minter
    }

    pub fn index(&self) -> u128 {
        self.index
    }

    pub fn gauges(&self) -> &[Address] {
        &self.gauges
    }

    pub fn length(&self) -> usize {
        self.gauges.len()
    }

    pub fn gauge_info(&self, gauge: Address) -> Option<&GaugeInfo> {
        self.gauge_info.get(&gauge)
    }

    pub fn gauge_for_pool(&self, pool: Address) -> Option<Address> {
        self.pool_gauge.get(&pool).copied()
    }

    pub fn claimable(&self, gauge: Address) -> u128 {
        self.gauge_info.get(&gauge).map_or(0, |info| info.claimable)
    }

    pub fn is_alive(&self, gauge: Address) -> bool {
        self.gauge_info.get(&gauge).map_or(false, |info| info.is_alive)
    }

    fn info(&self, gauge: Address) -> LedgerResult<GaugeInfo> {
        self.gauge_info
            .get(&gauge)
            .copied()
            .ok_or(LedgerError::UnknownGauge(gauge))
    }

    fn ensure_governance(&self, env: &Env) -> LedgerResult<()> {
        if env.sender != self.governance {
            return Err(LedgerError::NotGovernance(env.sender));
        }
        Ok(())
    }

    fn ensure_known(&self, gauges: &[Address]) -> LedgerResult<()> {
        match gauges.iter().find(|gauge| !self.gauge_info.contains_key(gauge)) {
            Some(unknown) => Err(LedgerError::UnknownGauge(*unknown)),
            None => Ok(()),
        }
    }

    // ========================================================================
    // Gauge Registry
    // ========================================================================

    /// Register `gauge` for `pool`. It starts at the current index, so it
    /// earns nothing from emissions notified before it existed.
    pub fn create_gauge(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        pool: Address,
        gauge: Address,
    ) -> LedgerResult<()> {
        self.non_reentrant(|manager| {
            manager.ensure_governance(env)?;
            if manager.pool_gauge.contains_key(&pool) || manager.gauge_info.contains_key(&gauge) {
                return Err(LedgerError::GaugeExists(pool));
            }

            safe_approve(bank, manager.reward_token, manager.address, gauge, u128::MAX)?;

            manager.gauges.push(gauge);
            manager.pool_gauge.insert(pool, gauge);
            manager.gauge_info.insert(
                gauge,
                GaugeInfo {
                    pool,
                    supply_index: manager.index,
                    claimable: 0,
                    is_alive: true,
                    last_distribution: 0,
                },
            );
            tracing::info!("Gauge {} created for pool {}", gauge, pool);
            Ok(())
        })
    }

    /// Stop emissions to `gauge`. Pending claimable returns to the minter;
    /// the supply index keeps advancing while killed.
    pub fn kill_gauge(&mut self, env: &Env, bank: &mut dyn TokenLedger, gauge: Address) -> LedgerResult<()> {
        self.non_reentrant(|manager| {
            manager.ensure_governance(env)?;
            let mut info = manager.info(gauge)?;
            if !info.is_alive {
                return Err(LedgerError::GaugeKilled(gauge));
            }

            transact(manager, bank, |manager, bank| {
                if info.claimable > 0 {
                    safe_transfer(bank, manager.reward_token, manager.address, manager.minter, info.claimable)?;
                }
                safe_approve(bank, manager.reward_token, manager.address, gauge, 0)?;

                let returned = info.claimable;
                info.claimable = 0;
                info.is_alive = false;
                manager.gauge_info.insert(gauge, info);
                tracing::info!("Gauge {} killed, {} returned to minter", gauge, returned);
                Ok(())
            })
        })
    }

    pub fn revive_gauge(&mut self, env: &Env, bank: &mut dyn TokenLedger, gauge: Address) -> LedgerResult<()> {
        self.non_reentrant(|manager| {
            manager.ensure_governance(env)?;
            let mut info = manager.info(gauge)?;
            if info.is_alive {
                return Err(LedgerError::GaugeAlive(gauge));
            }

            safe_approve(bank, manager.reward_token, manager.address, gauge, u128::MAX)?;

            info.is_alive = true;
            manager.gauge_info.insert(gauge, info);
            tracing::info!("Gauge {} revived", gauge);
            Ok(())
        })
    }

    // ========================================================================
    // Accrual
    // ========================================================================

    /// Pull `amount` of emissions from the minter and spread it over the
    /// voting weight of the epoch that just closed
    pub fn notify_reward_amount(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        voter: &dyn VoterHooks,
        amount: u128,
    ) -> LedgerResult<()> {
        self.non_reentrant(|manager| {
            if env.sender != manager.minter {
                return Err(LedgerError::NotMinter(env.sender));
            }
            if amount == 0 {
                return Err(LedgerError::ZeroAmount);
            }
            let weight_epoch = previous_epoch_start(env.timestamp);
            let total_weight = voter.epoch_total_weight(weight_epoch);
            if total_weight == 0 {
                return Err(LedgerError::ZeroTotalWeight(weight_epoch));
            }
            let ratio = mul_div(amount, MULTIPLIER, total_weight)?;
            let index = add_u128(manager.index, ratio)?;

            safe_transfer_from(bank, manager.reward_token, manager.address, manager.minter, manager.address, amount)?;

            manager.index = index;
            tracing::info!(
                "Emissions notified: amount={}, total_weight={}, index={}",
                amount,
                total_weight,
                index
            );
            Ok(())
        })
    }

    /// Credit `gauge` with its share of the index delta since its last
    /// update. Zero-weight gauges only catch up their index.
    fn update_gauge(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        voter: &dyn VoterHooks,
        gauge: Address,
    ) -> LedgerResult<()> {
        let mut info = self.info(gauge)?;
        let weight = voter.epoch_pool_weight(previous_epoch_start(env.timestamp), info.pool);

        if weight > 0 {
            let delta = self.index - info.supply_index;
            if delta > 0 {
                let share = mul_div(weight, delta, MULTIPLIER)?;
                if info.is_alive {
                    info.claimable = add_u128(info.claimable, share)?;
                } else if share > 0 {
                    safe_transfer(bank, self.reward_token, self.address, self.minter, share)?;
                }
            }
        }
        info.supply_index = self.index;
        self.gauge_info.insert(gauge, info);
        Ok(())
    }

    /// Accrue without distributing
    pub fn update_for(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        voter: &dyn VoterHooks,
        gauges: &[Address],
    ) -> LedgerResult<()> {
        self.non_reentrant(|manager| {
            manager.ensure_known(gauges)?;
            transact(manager, bank, |staged, bank| {
                for gauge in gauges {
                    staged.update_gauge(env, bank, voter, *gauge)?;
                }
                Ok(())
            })
        })
    }

    // ========================================================================
    // Distribution
    // ========================================================================

    /// Accrue and push to one gauge, at most once per epoch. Returns the
    /// amount pushed.
    fn distribute_gauge(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        voter: &dyn VoterHooks,
        hooks: &mut dyn GaugeHooks,
        gauge: Address,
    ) -> LedgerResult<u128> {
        let current_epoch = epoch_start(env.timestamp);
        if self.info(gauge)?.last_distribution >= current_epoch {
            return Ok(0);
        }

        self.update_gauge(env, bank, voter, gauge)?;
        let mut info = self.info(gauge)?;
        let claimable = info.claimable;
        if claimable == 0 || !info.is_alive || hooks.is_emergency(gauge) {
            return Ok(0);
        }

        hooks.notify_reward_amount(bank, self.address, gauge, self.reward_token, claimable)?;

        info.claimable = 0;
        info.last_distribution = current_epoch;
        self.gauge_info.insert(gauge, info);
        tracing::info!("Distributed {} to gauge {}", claimable, gauge);
        Ok(claimable)
    }

    fn distribute_list(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        voter: &dyn VoterHooks,
        hooks: &mut dyn GaugeHooks,
        gauges: &[Address],
    ) -> LedgerResult<u128> {
        self.non_reentrant(|manager| {
            manager.ensure_known(gauges)?;
            transact(manager, bank, |staged, bank| {
                let mut total = 0u128;
                for gauge in gauges {
                    let pushed = staged.distribute_gauge(env, bank, voter, hooks, *gauge)?;
                    total = total.saturating_add(pushed);
                }
                Ok(total)
            })
        })
    }

    /// Distribute to one gauge
    pub fn distribute(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        voter: &dyn VoterHooks,
        hooks: &mut dyn GaugeHooks,
        gauge: Address,
    ) -> LedgerResult<u128> {
        self.distribute_list(env, bank, voter, hooks, &[gauge])
    }

    pub fn distribute_gauges(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        voter: &dyn VoterHooks,
        hooks: &mut dyn GaugeHooks,
        gauges: &[Address],
    ) -> LedgerResult<u128> {
        self.distribute_list(env, bank, voter, hooks, gauges)
    }

    /// Distribute to gauges `start..finish` in registration order
    pub fn distribute_range(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        voter: &dyn VoterHooks,
        hooks: &mut dyn GaugeHooks,
        start: usize,
        finish: usize,
    ) -> LedgerResult<u128> {
        let finish = finish.min(self.gauges.len());
        let gauges = self.gauges.get(start..finish).unwrap_or(&[]).to_vec();
        self.distribute_list(env, bank, voter, hooks, &gauges)
    }

    pub fn distribute_all(
        &mut self,
        env: &Env,
        bank: &mut dyn TokenLedger,
        voter: &dyn VoterHooks,
        hooks: &mut dyn GaugeHooks,
    ) -> LedgerResult<u128> {
        let gauges = self.gauges.clone();
        self.distribute_list(env, bank, voter, hooks, &gauges)
    }

    /// Have live gauges claim their trading fees into their fee rewards
    pub fn distribute_fees(
        &mut self,
        bank: &mut dyn TokenLedger,
        hooks: &mut dyn GaugeHooks,
        gauges: &[Address],
    ) -> LedgerResult<()> {
        self.non_reentrant(|manager| {
            manager.ensure_known(gauges)?;
            for gauge in gauges.iter().filter(|gauge| manager.is_alive(**gauge)) {
                let (fees0, fees1) = hooks.claim_fees(bank, *gauge)?;
                tracing::debug!("Gauge {} claimed fees ({}, {})", gauge, fees0, fees1);
            }
            Ok(())
        })
    }
}

impl Guarded for GaugeManager {
    fn guard_status(&mut self) -> &mut ReentrancyStatus {
        &mut self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::MemoryTokenLedger;
    use crate::constants::WEEK;
    use crate::types::TokenId;

    const NOW: u64 = 1_000 * WEEK + 100;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn config() -> EmissionsConfig {
        EmissionsConfig {
            address: addr(0xD15),
            reward_token: addr(0xE11),
            minter: addr(0x111),
            governance: addr(0x60F),
        }
    }

    /// Voter with fixed per-pool weights in every epoch
    #[derive(Default)]
    struct FixedVoter {
        weights: HashMap<Address, u128>,
    }

    impl VoterHooks for FixedVoter {
        fn poke(&mut self, _token_id: TokenId, _balance: u128) -> LedgerResult<()> {
            Ok(())
        }

        fn epoch_total_weight(&self, _epoch_start: u64) -> u128 {
            self.weights.values().sum()
        }

        fn epoch_pool_weight(&self, _epoch_start: u64, pool: Address) -> u128 {
            self.weights.get(&pool).copied().unwrap_or(0)
        }

        fn is_whitelisted_token(&self, _token: Address) -> bool {
            true
        }
    }

    /// Gauges that pull their rewards through the allowance
    #[derive(Default)]
    struct PullingGauges {
        received: HashMap<Address, u128>,
        emergency: Option<Address>,
        rejecting: Option<Address>,
    }

    impl GaugeHooks for PullingGauges {
        fn notify_reward_amount(
            &mut self,
            bank: &mut dyn TokenLedger,
            distributor: Address,
            gauge: Address,
            token: Address,
            amount: u128,
        ) -> LedgerResult<()> {
            if self.rejecting == Some(gauge) {
                return Err(LedgerError::Collaborator(format!("gauge {} rejected notify", gauge)));
            }
            safe_transfer_from(bank, token, gauge, distributor, gauge, amount)?;
            *self.received.entry(gauge).or_insert(0) += amount;
            Ok(())
        }

        fn is_emergency(&self, gauge: Address) -> bool {
            self.emergency == Some(gauge)
        }

        fn claim_fees(&mut self, _bank: &mut dyn TokenLedger, _gauge: Address) -> LedgerResult<(u128, u128)> {
            Ok((0, 0))
        }
    }

    fn governance() -> Env {
        Env::new(config().governance, NOW, 1)
    }

    fn minter() -> Env {
        Env::new(config().minter, NOW, 1)
    }

    fn setup(weights: &[(u64, u128)]) -> (GaugeManager, MemoryTokenLedger, FixedVoter) {
        let mut manager = GaugeManager::new(config());
        let mut bank = MemoryTokenLedger::new();
        let mut voter = FixedVoter::default();
        bank.mint(config().reward_token, config().minter, 1_000_000_000_000).unwrap();
        bank.approve(config().reward_token, config().minter, config().address, u128::MAX)
            .unwrap();
        for (pool, weight) in weights {
            voter.weights.insert(addr(*pool), *weight);
            manager
                .create_gauge(&governance(), &mut bank, addr(*pool), addr(*pool + 1_000))
                .unwrap();
        }
        (manager, bank, voter)
    }

    #[test]
    fn test_notify_then_distribute_single_gauge() {
        let (mut manager, mut bank, voter) = setup(&[(1, 100)]);
        let mut hooks = PullingGauges::default();
        let gauge = addr(1_001);

        manager
            .notify_reward_amount(&minter(), &mut bank, &voter, 1_000)
            .unwrap();
        assert_eq!(manager.index(), 1_000 * MULTIPLIER / 100);

        let anyone = Env::new(addr(77), NOW, 1);
        let pushed = manager.distribute(&anyone, &mut bank, &voter, &mut hooks, gauge).unwrap();
        assert_eq!(pushed, 1_000);
        assert_eq!(hooks.received[&gauge], 1_000);
        assert_eq!(bank.balance_of(config().reward_token, gauge), 1_000);
        assert_eq!(manager.claimable(gauge), 0);
    }

    #[test]
    fn test_pro_rata_shares_floor() {
        let (mut manager, mut bank, voter) = setup(&[(1, 1), (2, 2)]);
        let mut hooks = PullingGauges::default();
        manager
            .notify_reward_amount(&minter(), &mut bank, &voter, 1_000)
            .unwrap();
        manager
            .update_for(&minter(), &mut bank, &voter, &[addr(1_001), addr(1_002)])
            .unwrap();
        assert_eq!(manager.claimable(addr(1_001)), 333);
        assert_eq!(manager.claimable(addr(1_002)), 666);

        let total = manager
            .distribute_all(&minter(), &mut bank, &voter, &mut hooks)
            .unwrap();
        assert_eq!(total, 999);
    }

    #[test]
    fn test_second_distribute_in_epoch_is_noop() {
        let (mut manager, mut bank, voter) = setup(&[(1, 100)]);
        let mut hooks = PullingGauges::default();
        let gauge = addr(1_001);
        manager
            .notify_reward_amount(&minter(), &mut bank, &voter, 1_000)
            .unwrap();
        manager.distribute(&minter(), &mut bank, &voter, &mut hooks, gauge).unwrap();

        manager
            .notify_reward_amount(&minter(), &mut bank, &voter, 500)
            .unwrap();
        let pushed = manager.distribute(&minter(), &mut bank, &voter, &mut hooks, gauge).unwrap();
        assert_eq!(pushed, 0);
        assert_eq!(manager.claimable(gauge), 0);
        assert_eq!(hooks.received[&gauge], 1_000);

        // Next epoch picks up the second notify exactly once
        let next = Env::new(addr(77), NOW + WEEK, 2);
        let pushed = manager.distribute(&next, &mut bank, &voter, &mut hooks, gauge).unwrap();
        assert_eq!(pushed, 500);
    }

    #[test]
    fn test_notify_requires_minter_and_weight() {
        let (mut manager, mut bank, voter) = setup(&[]);
        let stranger = Env::new(addr(5), NOW, 1);
        assert_eq!(
            manager.notify_reward_amount(&stranger, &mut bank, &voter, 1),
            Err(LedgerError::NotMinter(addr(5)))
        );
        assert_eq!(
            manager.notify_reward_amount(&minter(), &mut bank, &voter, 1),
            Err(LedgerError::ZeroTotalWeight(previous_epoch_start(NOW)))
        );
        assert_eq!(manager.index(), 0);
    }

    #[test]
    fn test_zero_weight_gauge_only_advances_index() {
        let (mut manager, mut bank, mut voter) = setup(&[(1, 100), (2, 0)]);
        let mut hooks = PullingGauges::default();
        manager
            .notify_reward_amount(&minter(), &mut bank, &voter, 1_000)
            .unwrap();
        manager
            .distribute(&minter(), &mut bank, &voter, &mut hooks, addr(1_002))
            .unwrap();
        let info = manager.gauge_info(addr(1_002)).unwrap();
        assert_eq!(info.supply_index, manager.index());
        assert_eq!(info.claimable, 0);

        // Weight arriving later does not reach back to the old delta
        voter.weights.insert(addr(2), 100);
        manager
            .update_for(&minter(), &mut bank, &voter, &[addr(1_002)])
            .unwrap();
        assert_eq!(manager.claimable(addr(1_002)), 0);
    }

    #[test]
    fn test_kill_returns_claimable_and_revive() {
        let (mut manager, mut bank, voter) = setup(&[(1, 100)]);
        let mut hooks = PullingGauges::default();
        let gauge = addr(1_001);
        let token = config().reward_token;
        let minter_before = bank.balance_of(token, config().minter);

        manager
            .notify_reward_amount(&minter(), &mut bank, &voter, 1_000)
            .unwrap();
        manager.update_for(&minter(), &mut bank, &voter, &[gauge]).unwrap();
        manager.kill_gauge(&governance(), &mut bank, gauge).unwrap();
        assert_eq!(bank.balance_of(token, config().minter), minter_before);
        assert_eq!(bank.allowance(token, config().address, gauge), 0);
        assert_eq!(
            manager.kill_gauge(&governance(), &mut bank, gauge),
            Err(LedgerError::GaugeKilled(gauge))
        );

        // Shares accrued while killed go straight back to the minter
        manager
            .notify_reward_amount(&minter(), &mut bank, &voter, 400)
            .unwrap();
        manager.distribute(&minter(), &mut bank, &voter, &mut hooks, gauge).unwrap();
        assert_eq!(bank.balance_of(token, config().minter), minter_before);
        assert_eq!(manager.gauge_info(gauge).unwrap().supply_index, manager.index());

        manager.revive_gauge(&governance(), &mut bank, gauge).unwrap();
        assert!(manager.is_alive(gauge));
        assert_eq!(bank.allowance(token, config().address, gauge), u128::MAX);
        assert_eq!(manager.claimable(gauge), 0);
    }

    #[test]
    fn test_emergency_gauge_keeps_claimable() {
        let (mut manager, mut bank, voter) = setup(&[(1, 100)]);
        let gauge = addr(1_001);
        let mut hooks = PullingGauges {
            emergency: Some(gauge),
            ..PullingGauges::default()
        };
        manager
            .notify_reward_amount(&minter(), &mut bank, &voter, 1_000)
            .unwrap();
        let pushed = manager.distribute(&minter(), &mut bank, &voter, &mut hooks, gauge).unwrap();
        assert_eq!(pushed, 0);
        assert_eq!(manager.claimable(gauge), 1_000);
    }

    #[test]
    fn test_failed_gauge_reverts_whole_distribution() {
        let (mut manager, mut bank, voter) = setup(&[(1, 100), (2, 100), (3, 100)]);
        let (live, killed, rejecting) = (addr(1_001), addr(1_002), addr(1_003));
        let token = config().reward_token;
        let mut hooks = PullingGauges {
            rejecting: Some(rejecting),
            ..PullingGauges::default()
        };
        manager
            .notify_reward_amount(&minter(), &mut bank, &voter, 900)
            .unwrap();
        manager.kill_gauge(&governance(), &mut bank, killed).unwrap();

        let infos: Vec<Option<GaugeInfo>> = [live, killed, rejecting]
            .iter()
            .map(|gauge| manager.gauge_info(*gauge).copied())
            .collect();
        let minter_balance = bank.balance_of(token, config().minter);

        let result = manager.distribute_all(&minter(), &mut bank, &voter, &mut hooks);
        assert!(matches!(result, Err(LedgerError::Collaborator(_))));
        for (gauge, info) in [live, killed, rejecting].iter().zip(&infos) {
            assert_eq!(manager.gauge_info(*gauge).copied(), *info);
        }
        assert_eq!(bank.balance_of(token, live), 0);
        assert_eq!(bank.balance_of(token, config().address), 900);
        assert_eq!(bank.balance_of(token, config().minter), minter_balance);
        assert_eq!(bank.allowance(token, config().address, live), u128::MAX);

        // The same epoch can still distribute once the gauge accepts
        hooks.rejecting = None;
        let pushed = manager
            .distribute_all(&minter(), &mut bank, &voter, &mut hooks)
            .unwrap();
        assert_eq!(pushed, 600);
        assert_eq!(bank.balance_of(token, live), 300);
        assert_eq!(bank.balance_of(token, config().minter), minter_balance + 300);
    }

    #[test]
    fn test_governance_gates() {
        let (mut manager, mut bank, _) = setup(&[(1, 100)]);
        let stranger = Env::new(addr(5), NOW, 1);
        assert_eq!(
            manager.create_gauge(&stranger, &mut bank, addr(9), addr(10)),
            Err(LedgerError::NotGovernance(addr(5)))
        );
        assert_eq!(
            manager.create_gauge(&governance(), &mut bank, addr(1), addr(10)),
            Err(LedgerError::GaugeExists(addr(1)))
        );
        assert_eq!(
            manager.revive_gauge(&governance(), &mut bank, addr(1_001)),
            Err(LedgerError::GaugeAlive(addr(1_001)))
        );
    }
}
