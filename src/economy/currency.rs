/// Currency formatting and parsing for player-facing amounts
use super::errors::EconomyError;
use super::types::{Currency, Money, MINOR_DIGITS, MINOR_PER_MAJOR};

// ============================================================================
// Display Formatting
// ============================================================================

/// Format an amount with the currency's symbol, e.g. "12.34 G".
pub fn format_amount(amount: Money, currency: &Currency) -> String {
    if currency.symbol.is_empty() {
        format!("{} {}", amount, currency.display_name)
    } else {
        format!("{} {}", amount, currency.symbol)
    }
}

/// Format an amount with the long currency name, e.g. "12.34 Gold Coin".
pub fn format_amount_long(amount: Money, currency: &Currency) -> String {
    format!("{} {}", amount, currency.display_name)
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a decimal amount typed by a player or written in a catalog file.
///
/// Accepts "100", "12.5", "12.34" and an optional trailing currency symbol or
/// name. Extra fractional digits are truncated. Negative input parses; callers
/// reject non-positive amounts where the operation requires it.
pub fn parse_amount(input: &str) -> Result<Money, EconomyError> {
    let cleaned: String = input
        .trim()
        .trim_end_matches(|c: char| c.is_alphabetic() || c.is_whitespace())
        .trim()
        .to_string();
    if cleaned.is_empty() {
        return Err(EconomyError::InvalidAmount(input.trim().to_string()));
    }

    let invalid = || EconomyError::InvalidAmount(input.trim().to_string());
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };

    let minor_units = if let Some((whole_str, frac_str)) = digits.split_once('.') {
        if frac_str.contains('.') || !is_digits(frac_str) || !is_digits_or_empty(whole_str) {
            return Err(invalid());
        }
        let whole: i64 = if whole_str.is_empty() {
            0
        } else {
            whole_str.parse().map_err(|_| invalid())?
        };
        let width = MINOR_DIGITS as usize;
        let frac: i64 = if frac_str.len() > width {
            frac_str[..width].parse().map_err(|_| invalid())?
        } else {
            format!("{:0<width$}", frac_str, width = width)
                .parse()
                .map_err(|_| invalid())?
        };
        whole
            .checked_mul(MINOR_PER_MAJOR)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(invalid)?
    } else {
        if !is_digits(digits) {
            return Err(invalid());
        }
        let whole: i64 = digits.parse().map_err(|_| invalid())?;
        whole.checked_mul(MINOR_PER_MAJOR).ok_or_else(invalid)?
    };

    Ok(Money::from_minor(if negative {
        -minor_units
    } else {
        minor_units
    }))
}

/// Parse an amount that must be strictly positive.
pub fn parse_positive_amount(input: &str) -> Result<Money, EconomyError> {
    let amount = parse_amount(input)?;
    if !amount.is_positive() {
        return Err(EconomyError::InvalidAmount(input.trim().to_string()));
    }
    Ok(amount)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_digits_or_empty(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}
