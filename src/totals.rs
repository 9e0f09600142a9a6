//! Line and document money arithmetic.
//!
//! Totals are never edited directly: services recompute them from the lines
//! on every quantity or price change.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::errors::ServiceError;

/// Money is kept to two decimal places.
pub const MONEY_SCALE: u32 = 2;

/// Largest quantity or amount a `decimal(16, 4)` column holds.
pub const MAX_AMOUNT: Decimal = dec!(999999999999.9999);

/// Rejects values the money and quantity columns cannot store.
pub fn ensure_storable(field: &str, value: Decimal) -> Result<(), ServiceError> {
    if value.abs() > MAX_AMOUNT {
        return Err(ServiceError::invalid_field(field, "out of range"));
    }
    Ok(())
}

fn gross_of(line: &LineAmounts) -> Result<Decimal, ServiceError> {
    line.quantity
        .checked_mul(line.unit_price)
        .map(round_money)
        .filter(|gross| *gross <= MAX_AMOUNT)
        .ok_or_else(|| ServiceError::invalid_field("quantity", "out of range"))
}

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Caller-supplied pricing of a single line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineAmounts {
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_amount: Decimal,
    /// Percent, 0 to 100.
    pub tax_rate: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineTotals {
    /// Quantity times unit price, before discount.
    pub gross: Decimal,
    pub discount_amount: Decimal,
    /// Gross minus discount.
    pub net: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DocumentTotals {
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub shipping_amount: Decimal,
    pub grand_total: Decimal,
}

pub fn validate_line(line: &LineAmounts) -> Result<(), ServiceError> {
    if line.quantity <= Decimal::ZERO {
        return Err(ServiceError::invalid_field(
            "quantity",
            "must be greater than zero",
        ));
    }
    ensure_storable("quantity", line.quantity)?;
    if line.unit_price.is_sign_negative() {
        return Err(ServiceError::invalid_field("unit_price", "must not be negative"));
    }
    ensure_storable("unit_price", line.unit_price)?;
    if line.discount_amount.is_sign_negative() {
        return Err(ServiceError::invalid_field(
            "discount_amount",
            "must not be negative",
        ));
    }
    if line.discount_amount > gross_of(line)? {
        return Err(ServiceError::invalid_field(
            "discount_amount",
            "must not exceed quantity times unit price",
        ));
    }
    if line.tax_rate.is_sign_negative() || line.tax_rate > Decimal::ONE_HUNDRED {
        return Err(ServiceError::invalid_field(
            "tax_rate",
            "must be between 0 and 100",
        ));
    }
    Ok(())
}

/// Validates and prices one line. Tax applies to the discounted amount.
pub fn compute_line(line: &LineAmounts) -> Result<LineTotals, ServiceError> {
    validate_line(line)?;

    let gross = gross_of(line)?;
    let discount_amount = round_money(line.discount_amount);
    let net = gross - discount_amount;
    let tax_amount = round_money(net * line.tax_rate / Decimal::ONE_HUNDRED);

    Ok(LineTotals {
        gross,
        discount_amount,
        net,
        tax_amount,
        line_total: net + tax_amount,
    })
}

pub fn compute_document<'a>(
    lines: impl IntoIterator<Item = &'a LineTotals>,
    shipping_amount: Decimal,
) -> Result<DocumentTotals, ServiceError> {
    if shipping_amount.is_sign_negative() {
        return Err(ServiceError::invalid_field(
            "shipping_amount",
            "must not be negative",
        ));
    }
    ensure_storable("shipping_amount", shipping_amount)?;

    let mut totals = lines
        .into_iter()
        .fold(DocumentTotals::default(), |mut acc, line| {
            acc.subtotal += line.gross;
            acc.discount_total += line.discount_amount;
            acc.tax_total += line.tax_amount;
            acc
        });
    totals.shipping_amount = round_money(shipping_amount);
    totals.grand_total =
        totals.subtotal - totals.discount_total + totals.tax_total + totals.shipping_amount;
    ensure_storable("grand_total", totals.grand_total)?;
    Ok(totals)
}
