//! Wallet/bank balances and transfers for a single account record.
//!
//! Functions here operate on a record the caller already holds exclusively
//! (see `AccountStore::with_account`), so every operation is all-or-nothing:
//! the new balances are computed first and written only when every check passed.

use crate::economy::errors::EconomyError;
use crate::economy::types::{AccountRecord, Money, Pocket, TransferDirection};
use std::collections::BTreeMap;

/// Current balance; unknown currencies read as zero.
pub fn get_balance(record: &AccountRecord, currency: &str, pocket: Pocket) -> Money {
    record
        .pocket(pocket)
        .get(currency)
        .copied()
        .unwrap_or(Money::ZERO)
}

/// Non-zero wallet balances (the "moneybag" listing).
pub fn wallet_balances(record: &AccountRecord) -> BTreeMap<String, Money> {
    non_zero(record.pocket(Pocket::Wallet))
}

/// Non-zero bank balances.
pub fn bank_balances(record: &AccountRecord) -> BTreeMap<String, Money> {
    non_zero(record.pocket(Pocket::Bank))
}

fn non_zero(balances: &BTreeMap<String, Money>) -> BTreeMap<String, Money> {
    balances
        .iter()
        .filter(|(_, amount)| amount.is_positive())
        .map(|(currency, amount)| (currency.clone(), *amount))
        .collect()
}

/// Move `amount` between the two pockets of one currency.
pub fn transfer(
    record: &mut AccountRecord,
    currency: &str,
    amount: Money,
    direction: TransferDirection,
) -> Result<(), EconomyError> {
    require_positive(amount)?;
    let source = direction.source();
    let destination = direction.destination();

    let available = get_balance(record, currency, source);
    let new_source = available
        .checked_sub(amount)
        .filter(|remaining| !remaining.is_negative())
        .ok_or(EconomyError::InsufficientFunds {
            needed: amount,
            available,
        })?;
    let new_destination = get_balance(record, currency, destination)
        .checked_add(amount)
        .ok_or_else(|| EconomyError::InvalidAmount(format!("{} overflows balance", amount)))?;

    record
        .pocket_mut(source)
        .insert(currency.to_string(), new_source);
    record
        .pocket_mut(destination)
        .insert(currency.to_string(), new_destination);
    record.touch();
    Ok(())
}

/// Unconditional addition to one pocket.
pub fn credit(
    record: &mut AccountRecord,
    currency: &str,
    amount: Money,
    pocket: Pocket,
) -> Result<(), EconomyError> {
    require_positive(amount)?;
    let updated = get_balance(record, currency, pocket)
        .checked_add(amount)
        .ok_or_else(|| EconomyError::InvalidAmount(format!("{} overflows balance", amount)))?;
    record
        .pocket_mut(pocket)
        .insert(currency.to_string(), updated);
    record.touch();
    Ok(())
}

/// Removal from one pocket; never drives a balance below zero.
pub fn debit(
    record: &mut AccountRecord,
    currency: &str,
    amount: Money,
    pocket: Pocket,
) -> Result<(), EconomyError> {
    require_positive(amount)?;
    let available = get_balance(record, currency, pocket);
    let remaining = available
        .checked_sub(amount)
        .filter(|remaining| !remaining.is_negative())
        .ok_or(EconomyError::InsufficientFunds {
            needed: amount,
            available,
        })?;
    record
        .pocket_mut(pocket)
        .insert(currency.to_string(), remaining);
    record.touch();
    Ok(())
}

fn require_positive(amount: Money) -> Result<(), EconomyError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(EconomyError::InvalidAmount(format!(
            "amount must be positive, got {}",
            amount
        )))
    }
}
