//! # Transfer Journal
//!
//! A [`TokenLedger`] wrapper that records every token movement it lets
//! through, so an operation that fails after moving tokens can hand them
//! back. Ledgers stage their own state on a copy and pair it with a
//! journal: on success the copy is swapped in and the journal dropped, on
//! failure the copy is discarded and the journal rolled back.

use tracing::error;

use crate::errors::LedgerResult;
use crate::interfaces::{is_success, safe_approve, safe_transfer, ReturnData, TokenLedger};
use crate::types::Address;

#[derive(Debug, Clone, Copy)]
enum Undo {
    Transfer {
        token: Address,
        from: Address,
        to: Address,
        amount: u128,
    },
    Allowance {
        token: Address,
        owner: Address,
        spender: Address,
        amount: u128,
    },
}

/// Records successful transfers and allowance changes made through it
pub struct TransferJournal<'a> {
    bank: &'a mut dyn TokenLedger,
    undo: Vec<Undo>,
}

impl<'a> TransferJournal<'a> {
    pub fn new(bank: &'a mut dyn TokenLedger) -> Self {
        Self { bank, undo: Vec::new() }
    }

    /// Number of recorded changes
    pub fn len(&self) -> usize {
        self.undo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo.is_empty()
    }

    /// Reverse every recorded change, newest first
    pub fn rollback(self) {
        let bank = self.bank;
        for entry in self.undo.into_iter().rev() {
            let result = match entry {
                Undo::Transfer { token, from, to, amount } => safe_transfer(bank, token, to, from, amount),
                Undo::Allowance { token, owner, spender, amount } => {
                    safe_approve(bank, token, owner, spender, amount)
                }
            };
            if let Err(err) = result {
                error!("Failed to reverse {:?}: {}", entry, err);
            }
        }
    }
}

impl TokenLedger for TransferJournal<'_> {
    fn balance_of(&self, token: Address, account: Address) -> u128 {
        self.bank.balance_of(token, account)
    }

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> u128 {
        self.bank.allowance(token, owner, spender)
    }

    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> LedgerResult<ReturnData> {
        let data = self.bank.transfer(token, from, to, amount)?;
        if is_success(&data) {
            self.undo.push(Undo::Transfer { token, from, to, amount });
        }
        Ok(data)
    }

    fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> LedgerResult<ReturnData> {
        let allowance = self.bank.allowance(token, from, spender);
        let data = self.bank.transfer_from(token, spender, from, to, amount)?;
        if is_success(&data) {
            if self.bank.allowance(token, from, spender) != allowance {
                self.undo.push(Undo::Allowance {
                    token,
                    owner: from,
                    spender,
                    amount: allowance,
                });
            }
            self.undo.push(Undo::Transfer { token, from, to, amount });
        }
        Ok(data)
    }

    fn approve(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: u128,
    ) -> LedgerResult<ReturnData> {
        let allowance = self.bank.allowance(token, owner, spender);
        let data = self.bank.approve(token, owner, spender, amount)?;
        if is_success(&data) {
            self.undo.push(Undo::Allowance {
                token,
                owner,
                spender,
                amount: allowance,
            });
        }
        Ok(data)
    }
}

/// Run `operation` against a copy of `state` with journaled transfers.
/// The copy replaces `state` only if the operation succeeds; otherwise
/// its transfers are reversed and `state` is left as it was.
pub fn transact<S: Clone, T>(
    state: &mut S,
    bank: &mut dyn TokenLedger,
    operation: impl FnOnce(&mut S, &mut dyn TokenLedger) -> LedgerResult<T>,
) -> LedgerResult<T> {
    let mut staged = state.clone();
    let mut journal = TransferJournal::new(bank);
    match operation(&mut staged, &mut journal) {
        Ok(value) => {
            *state = staged;
            Ok(value)
        }
        Err(err) => {
            journal.rollback();
            Err(err)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
