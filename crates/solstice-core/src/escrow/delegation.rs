//! # Delegation Ledger
//!
//! For every delegate, an ordered history of the full set of lock ids
//! delegated to it. Writes within one instant collapse into a single
//! checkpoint, so timestamps strictly increase along each history.

use std::collections::HashMap;

use crate::constants::MAX_DELEGATES;
use crate::errors::{LedgerError, LedgerResult};
use crate::types::{Address, TokenId};

/// Lock ids held by a delegate from `timestamp` on
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "client", derive(borsh::BorshSerialize, borsh::BorshDeserialize))]
pub struct DelegationCheckpoint {
    pub timestamp: u64,
    pub token_ids: Vec<TokenId>,
}

#[derive(Debug, Clone, Default)]
pub struct DelegationLedger {
    checkpoints: HashMap<Address, Vec<DelegationCheckpoint>>,
    /// Explicit delegatee per delegator; absent means self-delegation
    delegates: HashMap<Address, Address>,
}

impl DelegationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delegatee of `delegator`, defaulting to itself
    pub fn delegates(&self, delegator: Address) -> Address {
        match self.delegates.get(&delegator) {
            Some(current) if !current.is_zero() => *current,
            _ => delegator,
        }
    }

    /// Record `delegatee` for `delegator`, returning the previous delegatee
    pub(crate) fn set_delegate(&mut self, delegator: Address, delegatee: Address) -> Address {
        let previous = self.delegates(delegator);
        self.delegates.insert(delegator, delegatee);
        previous
    }

    pub fn num_checkpoints(&self, account: Address) -> usize {
        self.checkpoints.get(&account).map_or(0, Vec::len)
    }

    pub fn checkpoint(&self, account: Address, index: usize) -> Option<&DelegationCheckpoint> {
        self.checkpoints.get(&account).and_then(|history| history.get(index))
    }

    /// Lock ids currently delegated to `account`
    pub fn current_token_ids(&self, account: Address) -> &[TokenId] {
        self.checkpoints
            .get(&account)
            .and_then(|history| history.last())
            .map_or(&[], |cp| cp.token_ids.as_slice())
    }

    /// Index of the latest checkpoint of `account` at or before `timestamp`.
    /// `None` when the account had no checkpoint yet at that time.
    pub fn past_votes_index(&self, account: Address, timestamp: u64) -> Option<usize> {
        let history = self.checkpoints.get(&account)?;
        let last = history.len().checked_sub(1)?;

        // Most recent first, then the implicit empty set before the first write
        if history[last].timestamp <= timestamp {
            return Some(last);
        }
        if history[0].timestamp > timestamp {
            return None;
        }

        let mut lower = 0usize;
        let mut upper = last;
        while upper > lower {
            let center = upper - (upper - lower) / 2;
            let cp = &history[center];
            if cp.timestamp == timestamp {
                return Some(center);
            } else if cp.timestamp < timestamp {
                lower = center;
            } else {
                upper = center - 1;
            }
        }
        Some(lower)
    }

    /// Lock ids delegated to `account` at `timestamp`
    pub fn token_ids_at(&self, account: Address, timestamp: u64) -> &[TokenId] {
        match self.past_votes_index(account, timestamp) {
            Some(index) => &self.checkpoints[&account][index].token_ids,
            None => &[],
        }
    }

    /// Move one lock id from `src` to `dst` delegation
    pub fn move_token_delegates(
        &mut self,
        now: u64,
        src: Address,
        dst: Address,
        token_id: TokenId,
    ) -> LedgerResult<()> {
        if src == dst || token_id == 0 {
            return Ok(());
        }
        if !dst.is_zero() {
            self.ensure_capacity(dst, 1)?;
        }

        if !src.is_zero() {
            let remaining: Vec<TokenId> = self
                .current_token_ids(src)
                .iter()
                .copied()
                .filter(|id| *id != token_id)
                .collect();
            self.write_checkpoint(src, now, remaining);
        }
        if !dst.is_zero() {
            let mut extended = self.current_token_ids(dst).to_vec();
            extended.push(token_id);
            self.write_checkpoint(dst, now, extended);
        }
        Ok(())
    }

    /// Move every lock `owner` holds from `src` to `dst` delegation
    pub fn move_all_delegates(
        &mut self,
        now: u64,
        owner: Address,
        src: Address,
        dst: Address,
        owned: &[TokenId],
        owner_of: impl Fn(TokenId) -> Address,
    ) -> LedgerResult<()> {
        if src == dst {
            return Ok(());
        }
        if !dst.is_zero() {
            self.ensure_capacity(dst, owned.len())?;
        }

        if !src.is_zero() {
            // Only what the owner holds can be redelegated
            let remaining: Vec<TokenId> = self
                .current_token_ids(src)
                .iter()
                .copied()
                .filter(|id| owner_of(*id) != owner)
                .collect();
            self.write_checkpoint(src, now, remaining);
        }
        if !dst.is_zero() {
            let mut extended = self.current_token_ids(dst).to_vec();
            extended.extend_from_slice(owned);
            self.write_checkpoint(dst, now, extended);
        }
        Ok(())
    }

    pub(crate) fn ensure_capacity(&self, delegate: Address, incoming: usize) -> LedgerResult<()> {
        let count = self.current_token_ids(delegate).len() + incoming;
        if count > MAX_DELEGATES {
            return Err(LedgerError::too_many_delegates(delegate, count, MAX_DELEGATES));
        }
        Ok(())
    }

    /// Overwrite the checkpoint written at `now`, or append a new one
    fn write_checkpoint(&mut self, account: Address, now: u64, token_ids: Vec<TokenId>) {
        let history = self.checkpoints.entry(account).or_default();
        let overwrite = history.last().map_or(false, |cp| cp.timestamp == now);
        match history.last_mut() {
            Some(last) if overwrite => last.token_ids = token_ids,
            _ => history.push(DelegationCheckpoint {
                timestamp: now,
                token_ids,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[test]
    fn test_move_token_collapses_same_instant() {
        let mut ledger = DelegationLedger::new();
        ledger.move_token_delegates(100, Address::ZERO, addr(1), 1).unwrap();
        ledger.move_token_delegates(100, Address::ZERO, addr(1), 2).unwrap();
        assert_eq!(ledger.num_checkpoints(addr(1)), 1);
        assert_eq!(ledger.current_token_ids(addr(1)), &[1, 2]);

        ledger.move_token_delegates(200, addr(1), addr(2), 1).unwrap();
        assert_eq!(ledger.num_checkpoints(addr(1)), 2);
        assert_eq!(ledger.current_token_ids(addr(1)), &[2]);
        assert_eq!(ledger.current_token_ids(addr(2)), &[1]);
    }

    #[test]
    fn test_historical_lookup() {
        let mut ledger = DelegationLedger::new();
        ledger.move_token_delegates(100, Address::ZERO, addr(1), 1).unwrap();
        ledger.move_token_delegates(200, Address::ZERO, addr(1), 2).unwrap();
        ledger.move_token_delegates(300, addr(1), Address::ZERO, 1).unwrap();

        assert_eq!(ledger.past_votes_index(addr(1), 50), None);
        assert_eq!(ledger.token_ids_at(addr(1), 50), &[] as &[TokenId]);
        assert_eq!(ledger.token_ids_at(addr(1), 100), &[1]);
        assert_eq!(ledger.token_ids_at(addr(1), 250), &[1, 2]);
        assert_eq!(ledger.token_ids_at(addr(1), 1_000), &[2]);
    }

    #[test]
    fn test_move_all_only_moves_owned() {
        let mut ledger = DelegationLedger::new();
        ledger.move_token_delegates(100, Address::ZERO, addr(9), 1).unwrap();
        ledger.move_token_delegates(100, Address::ZERO, addr(9), 2).unwrap();
        ledger.move_token_delegates(100, Address::ZERO, addr(9), 3).unwrap();

        // addr(5) owns 1 and 3
        let owner_of = |id: TokenId| if id == 2 { addr(6) } else { addr(5) };
        ledger
            .move_all_delegates(200, addr(5), addr(9), addr(7), &[1, 3], owner_of)
            .unwrap();
        assert_eq!(ledger.current_token_ids(addr(9)), &[2]);
        assert_eq!(ledger.current_token_ids(addr(7)), &[1, 3]);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut ledger = DelegationLedger::new();
        for id in 1..=MAX_DELEGATES as TokenId {
            ledger.move_token_delegates(100, Address::ZERO, addr(1), id).unwrap();
        }
        let err = ledger
            .move_token_delegates(100, Address::ZERO, addr(1), 5_000)
            .unwrap_err();
        assert!(matches!(err, LedgerError::TooManyDelegates { .. }));
        assert_eq!(ledger.current_token_ids(addr(1)).len(), MAX_DELEGATES);
    }

    #[test]
    fn test_delegates_default_to_self() {
        let mut ledger = DelegationLedger::new();
        assert_eq!(ledger.delegates(addr(1)), addr(1));
        let previous = ledger.set_delegate(addr(1), addr(2));
        assert_eq!(previous, addr(1));
        assert_eq!(ledger.delegates(addr(1)), addr(2));
    }
}
