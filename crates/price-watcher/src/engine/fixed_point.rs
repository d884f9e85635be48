//! Conversions between raw integer base units and scaled decimals.
//!
//! Raw amounts are carried as `BigUint` so that uint112 reserves and uint256
//! call results never truncate. Division happens in big-integer arithmetic and
//! only the final quotient is fitted into a `Decimal`.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use rust_decimal::Decimal;

use crate::types::{PriceWatcherError, Result};

/// Largest accepted exponent; a uint256 has 78 decimal digits.
pub const MAX_EXPONENT: i32 = 77;

/// Largest scale a `Decimal` can carry.
const MAX_SCALE: u32 = 28;

pub fn pow10(exponent: u32) -> BigUint {
    BigUint::from(10u32).pow(exponent)
}

fn check_exponent(exponent: i32) -> Result<u32> {
    if !(0..=MAX_EXPONENT).contains(&exponent) {
        return Err(PriceWatcherError::InvalidExponent(exponent));
    }
    Ok(exponent as u32)
}

/// Parse a decimal literal and scale it by `10^exponent`, rounding half-up to
/// the nearest base unit.
///
/// Accepts `[+]digits[.digits]` with either side of the dot optional (but not
/// both). Signs, exponents, and separators are rejected.
pub fn to_base_units(decimal: &str, exponent: i32) -> Result<BigUint> {
    let exp = check_exponent(exponent)? as usize;
    let invalid = || PriceWatcherError::InvalidDecimal(decimal.to_string());

    let trimmed = decimal.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(invalid());
    }

    let mut digits = String::with_capacity(int_part.len() + exp);
    digits.push_str(int_part);
    let round_up = if frac_part.len() <= exp {
        digits.push_str(frac_part);
        digits.extend(std::iter::repeat('0').take(exp - frac_part.len()));
        false
    } else {
        digits.push_str(&frac_part[..exp]);
        frac_part.as_bytes()[exp] >= b'5'
    };

    let mut units = if digits.is_empty() {
        BigUint::zero()
    } else {
        BigUint::parse_bytes(digits.as_bytes(), 10).ok_or_else(invalid)?
    };
    if round_up {
        units += 1u32;
    }
    Ok(units)
}

/// Same as [`to_base_units`] for a value that is already a `Decimal`.
pub fn decimal_to_base_units(value: Decimal, exponent: i32) -> Result<BigUint> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(PriceWatcherError::InvalidDecimal(value.to_string()));
    }
    to_base_units(&value.to_string(), exponent)
}

/// Scale a raw integer down by `10^exponent`.
pub fn to_decimal(amount: &BigUint, exponent: i32) -> Result<Decimal> {
    let exp = check_exponent(exponent)?;
    ratio_to_decimal(amount, &pow10(exp))
}

/// Exact `numerator / denominator`, keeping as many fractional digits as the
/// decimal mantissa allows (round half-up on the last kept digit).
pub fn ratio_to_decimal(numerator: &BigUint, denominator: &BigUint) -> Result<Decimal> {
    if denominator.is_zero() {
        return Err(PriceWatcherError::DivisionByZero);
    }
    let int_digits = {
        let whole = numerator / denominator;
        if whole.is_zero() { 0 } else { whole.to_string().len() as u32 }
    };
    // 96-bit mantissa holds at most 29 significant digits.
    let mut scale = MAX_SCALE.min(29u32.saturating_sub(int_digits));
    loop {
        let scaled = rounded_div(&(numerator * pow10(scale)), denominator);
        if let Some(mantissa) = scaled.to_i128() {
            if let Ok(value) = Decimal::try_from_i128_with_scale(mantissa, scale) {
                return Ok(value.normalize());
            }
        }
        if scale == 0 {
            return Err(PriceWatcherError::Overflow);
        }
        scale -= 1;
    }
}

fn rounded_div(numerator: &BigUint, denominator: &BigUint) -> BigUint {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder * 2u32 >= *denominator {
        quotient + 1u32
    } else {
        quotient
    }
}
