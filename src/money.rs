//! Conversions between integer minor units and API-facing decimals.
//!
//! All arithmetic in the crate happens on `i64` cents. Decimals only appear
//! when reading request bodies and rendering responses.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serializer;

use crate::errors::ServiceError;

/// Amount in minor currency units (cents).
pub type Cents = i64;

/// Basis points: hundredths of a percent. 10% is 1000.
pub type BasisPoints = i64;

pub const FULL_PERCENT_BPS: BasisPoints = 100 * 100;

/// Renders cents as a two-place decimal (`1999` -> `19.99`).
pub fn to_decimal(cents: Cents) -> Decimal {
    Decimal::new(cents, 2)
}

/// Converts a decimal amount to cents, rounding half away from zero.
pub fn from_decimal(amount: Decimal) -> Result<Cents, ServiceError> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|scaled| scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|rounded| rounded.to_i64())
        .ok_or_else(|| ServiceError::BadRequest(format!("amount {} is out of range", amount)))
}

/// Converts a percentage (`12.5`) to basis points (`1250`).
pub fn percent_to_bps(percent: Decimal) -> Result<BasisPoints, ServiceError> {
    from_decimal(percent)
}

pub fn bps_to_percent(bps: BasisPoints) -> Decimal {
    Decimal::new(bps, 2)
}

/// `amount * bps / 10000`, rounded half away from zero to whole cents.
pub fn apply_basis_points(amount: Cents, bps: BasisPoints) -> Cents {
    let numerator = i128::from(amount) * i128::from(bps);
    let denominator = i128::from(FULL_PERCENT_BPS);
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    let rounded = if remainder.abs() * 2 >= denominator {
        quotient + numerator.signum()
    } else {
        quotient
    };
    rounded.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// `unit * quantity` saturating at the numeric bounds.
pub fn line_total(unit: Cents, quantity: i32) -> Cents {
    unit.saturating_mul(i64::from(quantity))
}

/// `serialize_with` helper rendering a cents field as a decimal amount.
pub fn serialize_cents<S: Serializer>(cents: &Cents, serializer: S) -> Result<S::Ok, S::Error> {
    serde::Serialize::serialize(&to_decimal(*cents), serializer)
}

pub fn serialize_optional_cents<S: Serializer>(
    cents: &Option<Cents>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serde::Serialize::serialize(&cents.map(to_decimal), serializer)
}
