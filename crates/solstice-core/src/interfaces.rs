//! # Collaborator Interfaces
//!
//! Services the ledgers consume (token transfers, the voter, gauge
//! contracts) and the ownership view the escrow exposes to the reward
//! ledgers.

use crate::errors::{LedgerError, LedgerResult};
use crate::types::{Address, TokenId};

/// Raw data returned by a token call
pub type ReturnData = Vec<u8>;

/// ABI encoding of a boolean `true` return value
pub fn abi_true() -> ReturnData {
    let mut word = vec![0u8; 32];
    word[31] = 1;
    word
}

/// ABI encoding of a boolean `false` return value
pub fn abi_false() -> ReturnData {
    vec![0u8; 32]
}

/// Multi-token transfer service
pub trait TokenLedger {
    fn balance_of(&self, token: Address, account: Address) -> u128;

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> u128;

    /// Move `amount` of `token` from `from` (the caller) to `to`
    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> LedgerResult<ReturnData>;

    /// Move `amount` of `token` from `from` to `to` on behalf of `spender`
    fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> LedgerResult<ReturnData>;

    fn approve(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: u128,
    ) -> LedgerResult<ReturnData>;
}

/// A token call succeeded only if it returned nothing or exactly `true`
pub(crate) fn is_success(data: &ReturnData) -> bool {
    data.is_empty() || *data == abi_true()
}

fn check_return(token: Address, data: ReturnData) -> LedgerResult<()> {
    if is_success(&data) {
        Ok(())
    } else {
        Err(LedgerError::transfer_failed(token, "token returned false or malformed data"))
    }
}

/// Transfer with an explicit success check on the returned data
pub fn safe_transfer(
    bank: &mut dyn TokenLedger,
    token: Address,
    from: Address,
    to: Address,
    amount: u128,
) -> LedgerResult<()> {
    let data = bank.transfer(token, from, to, amount)?;
    check_return(token, data)
}

/// Allowance-based transfer with an explicit success check
pub fn safe_transfer_from(
    bank: &mut dyn TokenLedger,
    token: Address,
    spender: Address,
    from: Address,
    to: Address,
    amount: u128,
) -> LedgerResult<()> {
    let data = bank.transfer_from(token, spender, from, to, amount)?;
    check_return(token, data)
}

/// Approval with an explicit success check
pub fn safe_approve(
    bank: &mut dyn TokenLedger,
    token: Address,
    owner: Address,
    spender: Address,
    amount: u128,
) -> LedgerResult<()> {
    let data = bank.approve(token, owner, spender, amount)?;
    check_return(token, data)
}

/// Ownership view over escrowed locks
pub trait LockOwnership {
    /// Owner of `token_id`, or the zero address if it does not exist
    fn owner_of(&self, token_id: TokenId) -> Address;

    fn is_approved_or_owner(&self, spender: Address, token_id: TokenId) -> bool;
}

/// The external voter
pub trait VoterHooks {
    /// Re-assert an existing vote of `token_id` with its updated `balance`
    fn poke(&mut self, token_id: TokenId, balance: u128) -> LedgerResult<()>;

    /// Total weight cast in the epoch starting at `epoch_start`
    fn epoch_total_weight(&self, epoch_start: u64) -> u128;

    /// Weight cast for `pool` in the epoch starting at `epoch_start`
    fn epoch_pool_weight(&self, epoch_start: u64, pool: Address) -> u128;

    fn is_whitelisted_token(&self, token: Address) -> bool;
}

/// Gauge contracts reached by the emissions distributor
pub trait GaugeHooks {
    /// Hand `amount` of `token` to `gauge`. The gauge pulls the tokens from
    /// `distributor` using its allowance.
    fn notify_reward_amount(
        &mut self,
        bank: &mut dyn TokenLedger,
        distributor: Address,
        gauge: Address,
        token: Address,
        amount: u128,
    ) -> LedgerResult<()>;

    fn is_emergency(&self, gauge: Address) -> bool;

    /// Claim accrued trading fees of `gauge` into its fee reward ledger
    fn claim_fees(&mut self, bank: &mut dyn TokenLedger, gauge: Address) -> LedgerResult<(u128, u128)>;
}
