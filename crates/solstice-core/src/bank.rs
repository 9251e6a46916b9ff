//! # In-Memory Token Ledger
//!
//! A multi-token balance and allowance book implementing [`TokenLedger`].
//! Used by the keeper's replay simulator and by tests.

use std::collections::HashMap;

use crate::errors::{LedgerError, LedgerResult};
use crate::interfaces::{abi_false, abi_true, ReturnData, TokenLedger};
use crate::types::Address;

/// How a token reports success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnMode {
    /// Returns an ABI-encoded `true`
    #[default]
    Bool,
    /// Returns no data at all
    Empty,
    /// Returns `false` without moving funds
    AlwaysFalse,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTokenLedger {
    /// (token, account) -> balance
    balances: HashMap<(Address, Address), u128>,
    /// (token, owner, spender) -> allowance
    allowances: HashMap<(Address, Address, Address), u128>,
    total_supply: HashMap<Address, u128>,
    return_modes: HashMap<Address, ReturnMode>,
}

impl MemoryTokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit freshly minted `amount` of `token` to `to`
    pub fn mint(&mut self, token: Address, to: Address, amount: u128) -> LedgerResult<()> {
        let supply = self.total_supply.entry(token).or_insert(0);
        *supply = supply.checked_add(amount).ok_or(LedgerError::MathOverflow)?;
        let balance = self.balances.entry((token, to)).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(LedgerError::MathOverflow)?;
        Ok(())
    }

    pub fn total_supply(&self, token: Address) -> u128 {
        self.total_supply.get(&token).copied().unwrap_or(0)
    }

    pub fn set_return_mode(&mut self, token: Address, mode: ReturnMode) {
        self.return_modes.insert(token, mode);
    }

    fn return_mode(&self, token: Address) -> ReturnMode {
        self.return_modes.get(&token).copied().unwrap_or_default()
    }

    fn success_data(&self, token: Address) -> ReturnData {
        match self.return_mode(token) {
            ReturnMode::Empty => Vec::new(),
            _ => abi_true(),
        }
    }

    fn move_balance(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> LedgerResult<()> {
        let from_balance = self.balance_of(token, from);
        if from_balance < amount {
            return Err(LedgerError::transfer_failed(token, "insufficient balance"));
        }
        let to_balance = self.balance_of(token, to);
        if from != to {
            let credited = to_balance.checked_add(amount).ok_or(LedgerError::MathOverflow)?;
            self.balances.insert((token, from), from_balance - amount);
            self.balances.insert((token, to), credited);
        }
        Ok(())
    }
}

impl TokenLedger for MemoryTokenLedger {
    fn balance_of(&self, token: Address, account: Address) -> u128 {
        self.balances.get(&(token, account)).copied().unwrap_or(0)
    }

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> u128 {
        self.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> LedgerResult<ReturnData> {
        if self.return_mode(token) == ReturnMode::AlwaysFalse {
            return Ok(abi_false());
        }
        self.move_balance(token, from, to, amount)?;
        Ok(self.success_data(token))
    }

    fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> LedgerResult<ReturnData> {
        if self.return_mode(token) == ReturnMode::AlwaysFalse {
            return Ok(abi_false());
        }
        let allowance = self.allowance(token, from, spender);
        if spender != from && allowance < amount {
            return Err(LedgerError::transfer_failed(token, "insufficient allowance"));
        }
        self.move_balance(token, from, to, amount)?;
        if spender != from && allowance != u128::MAX {
            self.allowances
                .insert((token, from, spender), allowance - amount);
        }
        Ok(self.success_data(token))
    }

    fn approve(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: u128,
    ) -> LedgerResult<ReturnData> {
        self.allowances.insert((token, owner, spender), amount);
        Ok(self.success_data(token))
    }
}
