//! Monetary units and money range rules.

pub type Amount = i64;

pub const COIN: Amount = 100_000_000;

/// No amount larger than this (in satoshi) is valid.
pub const MAX_MONEY: Amount = 21_000_000_000 * COIN;

pub fn money_range(value: Amount) -> bool {
    (0..=MAX_MONEY).contains(&value)
}

/// Adds two in-range amounts, failing when the total leaves the money range.
pub fn checked_add_money(total: Amount, value: Amount) -> Option<Amount> {
    if !money_range(value) {
        return None;
    }
    total.checked_add(value).filter(|sum| money_range(*sum))
}
