//! # Ledger Math
//!
//! Checked arithmetic, floor mul-div over a 256-bit intermediate and the
//! clamping helpers of the decay math.

use crate::constants::{BPS_DENOMINATOR, MAX_LOCK_AMOUNT, SM_NFT_BONUS_BPS};
use crate::errors::{LedgerError, LedgerResult};
use ethnum::U256;

/// Macro to generate checked arithmetic functions
macro_rules! checked_arith {
    ($fn_name:ident, $type:ty, $checked_method:ident, $error:expr) => {
        pub fn $fn_name(a: $type, b: $type) -> LedgerResult<$type> {
            a.$checked_method(b).ok_or($error)
        }
    };
}

checked_arith!(add_u128, u128, checked_add, LedgerError::MathOverflow);
checked_arith!(sub_u128, u128, checked_sub, LedgerError::MathOverflow);
checked_arith!(add_u64, u64, checked_add, LedgerError::MathOverflow);

/// `a * b / denominator`, rounded down, with a 256-bit intermediate product
pub fn mul_div(a: u128, b: u128, denominator: u128) -> LedgerResult<u128> {
    if denominator == 0 {
        return Err(LedgerError::DivisionByZero);
    }
    let result = U256::new(a) * U256::new(b) / U256::new(denominator);
    if result > U256::new(u128::MAX) {
        return Err(LedgerError::MathOverflow);
    }
    Ok(result.as_u128())
}

/// Bonus credited to a bonus-permanent lock for `amount` of underlying
pub fn sm_nft_bonus(amount: u128) -> LedgerResult<u128> {
    mul_div(amount, SM_NFT_BONUS_BPS, BPS_DENOMINATOR)
}

/// Reject amounts that would leave the decay math's `i128` range
pub fn ensure_lock_amount(amount: u128) -> LedgerResult<u128> {
    if amount > MAX_LOCK_AMOUNT {
        return Err(LedgerError::AmountTooLarge(amount));
    }
    Ok(amount)
}

/// Clamp a decayed bias or slope at zero
pub fn clamp_non_negative(value: i128) -> i128 {
    value.max(0)
}

/// Convert a clamped, non-negative bias into an unsigned balance
pub fn bias_to_balance(bias: i128) -> u128 {
    clamp_non_negative(bias) as u128
}
