//! End-to-end scenarios across the escrow, the distributor and the bribe
//! ledger.

mod common;

use common::*;
use solstice_core::{
    LedgerError, LockOwnership, TokenLedger, MAXTIME, MULTIPLIER, WEEK,
};

const TOKEN: u128 = 1_000_000_000_000_000_000;

// ============================================================================
// Escrow Scenarios
// ============================================================================

#[test]
fn test_two_week_lock_decays_to_zero() {
    let (mut escrow, mut bank) = escrow_world();
    let value = 1_000 * TOKEN;
    let id = escrow
        .create_lock(&env_at(addr(1), START), &mut bank, value, 2 * WEEK)
        .unwrap();

    let expected = value * (2 * WEEK) as u128 / MAXTIME as u128;
    let balance = escrow.balance_at(id, START);
    // Slope truncation loses less than one unit per second of duration
    assert!(balance <= expected);
    assert!(expected - balance <= (2 * WEEK) as u128);

    assert_eq!(escrow.balance_at(id, START + 2 * WEEK), 0);
    assert_eq!(escrow.total_supply_at(START + 2 * WEEK), 0);
    assert!(escrow.balance_at(id, START + WEEK) < balance);
}

#[test]
fn test_total_supply_of_two_equal_locks() {
    let (mut escrow, mut bank) = escrow_world();
    let a = escrow
        .create_lock(&env_at(addr(1), START), &mut bank, 500 * TOKEN, WEEK)
        .unwrap();
    let b = escrow
        .create_lock(&env_at(addr(2), START), &mut bank, 500 * TOKEN, WEEK)
        .unwrap();

    let sum = escrow.balance_at(a, START) + escrow.balance_at(b, START);
    assert!(sum > 0);
    assert_eq!(escrow.total_supply_at(START), sum);
    assert_eq!(escrow.total_supply_at(START + WEEK / 2), sum_of_balances(&escrow, START + WEEK / 2));
}

#[test]
fn test_heartbeat_collapses_within_one_instant() {
    let (mut escrow, mut bank) = escrow_world();
    escrow
        .create_lock(&env_at(addr(1), START), &mut bank, 10 * TOKEN, 10 * WEEK)
        .unwrap();

    let later = START + 3 * WEEK + 5;
    escrow.checkpoint(&env_at(addr(9), later)).unwrap();
    let epoch = escrow.epoch();
    escrow.checkpoint(&env_at(addr(9), later)).unwrap();
    assert_eq!(escrow.epoch(), epoch);
    assert_eq!(escrow.point_history(epoch).unwrap().ts, later);
}

#[test]
fn test_bonus_lock_counts_in_voting_power_not_supply() {
    let (mut escrow, mut bank) = escrow_world();
    let id = escrow
        .create_sm_nft_for(&env_at(addr(1), START), &mut bank, 100 * TOKEN, addr(1))
        .unwrap();

    assert_eq!(escrow.supply(), 0);
    assert_eq!(escrow.balance_at(id, START + 100 * WEEK), 110 * TOKEN);
    assert_eq!(escrow.total_supply_at(START + 100 * WEEK), 110 * TOKEN);
    assert_eq!(bank.balance_of(underlying(), solstice_core::Address::DEAD), 100 * TOKEN);
}

// ============================================================================
// Emissions Scenarios
// ============================================================================

#[test]
fn test_single_gauge_receives_whole_emission() {
    let (mut manager, mut bank) = emissions_world(1);
    let mut voter = MockVoter::default();
    let mut hooks = MockGauges::default();
    voter.vote(START, pool(0), 100);

    let now = START + WEEK + 1;
    manager
        .notify_reward_amount(&env_at(minter(), now), &mut bank, &voter, 1_000)
        .unwrap();
    assert_eq!(manager.index(), 1_000 * MULTIPLIER / 100);

    manager
        .update_for(&env_at(addr(9), now), &mut bank, &voter, &[gauge(0)])
        .unwrap();
    assert_eq!(manager.claimable(gauge(0)), 1_000);

    let pushed = manager
        .distribute(&env_at(addr(9), now), &mut bank, &voter, &mut hooks, gauge(0))
        .unwrap();
    assert_eq!(pushed, 1_000);
    assert_eq!(bank.balance_of(emission_token(), gauge(0)), 1_000);
}

#[test]
fn test_killed_gauge_share_returns_to_minter() {
    let (mut manager, mut bank) = emissions_world(2);
    let mut voter = MockVoter::default();
    let mut hooks = MockGauges::default();
    voter.vote(START, pool(0), 300);
    voter.vote(START, pool(1), 100);
    manager
        .kill_gauge(&env_at(governance(), START), &mut bank, gauge(1))
        .unwrap();

    let now = START + WEEK + 1;
    let before = bank.balance_of(emission_token(), minter());
    manager
        .notify_reward_amount(&env_at(minter(), now), &mut bank, &voter, 400)
        .unwrap();
    let pushed = manager
        .distribute_all(&env_at(addr(9), now), &mut bank, &voter, &mut hooks)
        .unwrap();

    assert_eq!(pushed, 300);
    assert_eq!(bank.balance_of(emission_token(), minter()), before - 300);
    assert_eq!(bank.balance_of(emission_token(), manager.address()), 0);
}

#[test]
fn test_notify_without_votes_is_rejected() {
    let (mut manager, mut bank) = emissions_world(1);
    let voter = MockVoter::default();
    let result = manager.notify_reward_amount(&env_at(minter(), START + WEEK), &mut bank, &voter, 10);
    assert!(matches!(result, Err(LedgerError::ZeroTotalWeight(_))));
    assert_eq!(manager.index(), 0);
}

// ============================================================================
// Bribe Scenarios
// ============================================================================

#[test]
fn test_bribe_share_is_floor_of_vote_share() {
    let mut bank = solstice_core::MemoryTokenLedger::new();
    let mut ledger = bribe_world(&mut bank);
    let mut voter = MockVoter::default();
    voter.whitelist.insert(bribe_token());
    let voter_env = env_at(bribe_config().voter, START + 10);

    ledger.deposit(&voter_env, 50, 1).unwrap();
    ledger.deposit(&voter_env, 50, 2).unwrap();
    ledger
        .notify_reward_amount(&env_at(briber(), START + 20), &mut bank, &voter, bribe_token(), 700)
        .unwrap();

    // Nothing is claimable until the epoch closes
    assert_eq!(ledger.earned(bribe_token(), 1, START + WEEK - 1).unwrap(), 0);
    assert_eq!(ledger.earned(bribe_token(), 1, START + WEEK).unwrap(), 350);

    let paid = ledger
        .get_reward(&env_at(addr(1), START + WEEK), &mut bank, &DirectOwners, 1, &[bribe_token()])
        .unwrap();
    assert_eq!(paid, 350);
    let again = ledger
        .get_reward(&env_at(addr(1), START + WEEK), &mut bank, &DirectOwners, 1, &[bribe_token()])
        .unwrap();
    assert_eq!(again, 0);
}

// ============================================================================
// Weekly Cycle
// ============================================================================

/// Locks vote with their escrow balance, emissions follow the votes and
/// bribes pay the lock owners through the escrow's ownership records
#[test]
fn test_weekly_cycle_across_ledgers() {
    let (mut escrow, mut bank) = escrow_world();
    let mut ledger = bribe_world(&mut bank);
    let (mut manager, mut emission_bank) = emissions_world(1);
    let mut voter = MockVoter::default();
    let mut hooks = MockGauges::default();
    voter.whitelist.insert(bribe_token());
    let voter_address = escrow_config().voter;

    let alice = escrow
        .create_lock(&env_at(addr(1), START), &mut bank, 300 * TOKEN, 104 * WEEK)
        .unwrap();
    let bob = escrow
        .create_lock(&env_at(addr(2), START), &mut bank, 100 * TOKEN, 104 * WEEK)
        .unwrap();

    // Both locks vote for pool 0 an hour into the epoch
    let vote_time = START + 3_600;
    let vote_env = env_at(voter_address, vote_time);
    for id in [alice, bob] {
        let weight = escrow.balance_of_nft(&vote_env, id);
        escrow.voting(&vote_env, id).unwrap();
        ledger.deposit(&vote_env, weight, id).unwrap();
        voter.vote(START, pool(0), weight);
    }
    assert!(matches!(
        escrow.merge(&env_at(addr(1), vote_time), alice, bob),
        Err(LedgerError::AlreadyVoted(_)) | Err(LedgerError::NotApprovedOrOwner(_))
    ));

    ledger
        .notify_reward_amount(&env_at(briber(), vote_time + 60), &mut bank, &voter, bribe_token(), 4_000)
        .unwrap();

    // Next epoch: emissions follow last epoch's votes, bribes become claimable
    let next = START + WEEK + 60;
    manager
        .notify_reward_amount(&env_at(minter(), next), &mut emission_bank, &voter, 1_000 * TOKEN)
        .unwrap();
    let pushed = manager
        .distribute_all(&env_at(addr(9), next), &mut emission_bank, &voter, &mut hooks)
        .unwrap();
    // Index truncation loses less than one unit per unit of total weight
    assert!(1_000 * TOKEN - pushed < 1_000);

    let alice_weight = ledger.balance_of(alice);
    let total = ledger.total_supply();
    let paid = ledger
        .get_reward(&env_at(addr(1), next), &mut bank, &escrow, alice, &[bribe_token()])
        .unwrap();
    assert_eq!(paid, alice_weight * 4_000 / total);
    assert_eq!(bank.balance_of(bribe_token(), escrow.owner_of(alice)), paid);

    // A stranger cannot claim for bob
    let stranger = ledger.get_reward(&env_at(addr(3), next), &mut bank, &escrow, bob, &[bribe_token()]);
    assert!(matches!(stranger, Err(LedgerError::NotApprovedOrOwner(_))));

    // Once bob abstains the lock can move again
    escrow.abstain(&env_at(voter_address, next), bob).unwrap();
    escrow
        .transfer_from(&env_at(addr(2), next), addr(2), addr(4), bob)
        .unwrap();
    assert_eq!(escrow.owner_of(bob), addr(4));
    assert_eq!(escrow.balance_of_nft(&env_at(addr(4), next), bob), 0);
    let paid_bob = ledger
        .get_reward(&env_at(addr(4), next), &mut bank, &escrow, bob, &[bribe_token()])
        .unwrap();
    assert_eq!(bank.balance_of(bribe_token(), addr(4)), paid_bob);
    assert!(paid + paid_bob <= 4_000);
}
