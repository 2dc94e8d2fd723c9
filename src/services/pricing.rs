//! Deterministic price arithmetic shared by order placement and checkout.
//!
//! Two distinct formulas are in play and must stay distinct. A COD order is
//! charged the exact subtotal plus 2% tax floored once at the subtotal level.
//! The hosted checkout page instead folds the tax into every line, flooring
//! each taxed unit price to whole currency units before converting to minor
//! units. The two totals can disagree for the same cart; payment verification
//! records what the gateway actually charged, so both formulas must stay
//! byte-for-byte reproducible.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::errors::ServiceError;

/// Flat tax rate applied to every order.
pub const TAX_RATE: Decimal = dec!(0.02);

/// One order line as seen by the pricing rules.
#[derive(Debug, Clone, Copy)]
pub struct PricedLine {
    pub unit_price: Decimal,
    pub quantity: i32,
}

/// Exact subtotal of the given lines.
pub fn subtotal(lines: &[PricedLine]) -> Decimal {
    lines
        .iter()
        .map(|line| line.unit_price * Decimal::from(line.quantity))
        .sum()
}

/// Amount owed for an order: subtotal plus 2% tax, the tax floored to whole
/// currency units.
pub fn order_amount(lines: &[PricedLine]) -> Decimal {
    let sub = subtotal(lines);
    sub + (sub * TAX_RATE).floor()
}

/// Unit amount for one hosted-checkout line, in minor units: the unit price
/// with tax folded in, floored to whole currency units, times 100.
pub fn gateway_unit_amount(unit_price: Decimal) -> Result<i64, ServiceError> {
    let taxed = (unit_price * dec!(1.02)).floor();
    let whole_units = taxed.to_i64().ok_or_else(|| {
        ServiceError::InternalError(format!("Line amount out of range: {}", unit_price))
    })?;
    Ok(whole_units * 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: Decimal, quantity: i32) -> PricedLine {
        PricedLine {
            unit_price: price,
            quantity,
        }
    }

    #[test]
    fn small_tax_floors_to_zero() {
        // 20.00 subtotal carries 0.40 tax, which floors away entirely.
        let lines = [line(dec!(10.00), 2)];
        assert_eq!(order_amount(&lines), dec!(20.00));
    }

    #[test]
    fn whole_unit_tax_survives_the_floor() {
        // 50.00 subtotal carries exactly 1.00 tax.
        let lines = [line(dec!(12.50), 4)];
        assert_eq!(order_amount(&lines), dec!(51.00));
    }

    #[test]
    fn mixed_cart_subtotal_is_exact() {
        let lines = [line(dec!(99.99), 1), line(dec!(0.01), 1)];
        assert_eq!(subtotal(&lines), dec!(100.00));
        assert_eq!(order_amount(&lines), dec!(102.00));
    }

    #[test]
    fn gateway_amount_floors_per_line() {
        assert_eq!(gateway_unit_amount(dec!(10.00)).unwrap(), 1000);
        assert_eq!(gateway_unit_amount(dec!(12.50)).unwrap(), 1200);
        // Sub-unit prices floor to a zero-amount line.
        assert_eq!(gateway_unit_amount(dec!(0.50)).unwrap(), 0);
    }

    #[test]
    fn the_two_formulas_are_not_interchangeable() {
        let lines = [line(dec!(12.50), 4)];
        let cod_total_minor = (order_amount(&lines) * dec!(100))
            .to_i64()
            .unwrap();
        let gateway_total_minor = gateway_unit_amount(dec!(12.50)).unwrap() * 4;

        assert_eq!(cod_total_minor, 5100);
        assert_eq!(gateway_total_minor, 4800);
        assert_ne!(cod_total_minor, gateway_total_minor);
    }

    #[test]
    fn empty_cart_prices_to_zero() {
        assert_eq!(order_amount(&[]), Decimal::ZERO);
    }
}
