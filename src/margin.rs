//! Margin requirements for open positions.
//!
//! The initial margin ratio grows with how much of the market's depth a position
//! consumes: `|size| / skew_scale * initial_margin_ratio + minimum_initial_margin_ratio`.
//! Maintenance margin is that ratio scaled down by `maintenance_margin_scalar`.
//! Both add a flat `minimum_position_margin` per open position, so tiny positions
//! still cover the keeper cost of liquidating them.

use crate::fixed::{ArithmeticError, FixedPoint};
use crate::types::{Price, Quote, SignedSize};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginParams {
    pub initial_margin_ratio: Decimal,
    pub minimum_initial_margin_ratio: Decimal,
    pub maintenance_margin_scalar: Decimal,
    pub minimum_position_margin: Quote,
}

impl Default for MarginParams {
    fn default() -> Self {
        Self {
            initial_margin_ratio: dec!(2),
            minimum_initial_margin_ratio: dec!(0.01),
            maintenance_margin_scalar: dec!(0.5),
            minimum_position_margin: Quote::new(dec!(10)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarginRequirement {
    pub initial: Quote,
    pub maintenance: Quote,
}

impl MarginRequirement {
    pub fn checked_add(&self, other: &MarginRequirement) -> Result<Self, ArithmeticError> {
        Ok(Self {
            initial: self.initial.checked_add(other.initial)?,
            maintenance: self.maintenance.checked_add(other.maintenance)?,
        })
    }
}

pub fn notional_value(size: SignedSize, price: Price) -> Result<Quote, ArithmeticError> {
    Ok(Quote::new(size.abs().mul_fixed(price.value())?))
}

/// Initial and maintenance margin ratios (fractions of notional) for a size.
pub fn margin_ratios(
    size: SignedSize,
    skew_scale: Decimal,
    params: &MarginParams,
) -> Result<(Decimal, Decimal), ArithmeticError> {
    let impact_on_skew = if skew_scale.is_zero() {
        Decimal::ZERO
    } else {
        size.abs().div_fixed(skew_scale)?
    };
    let initial = impact_on_skew
        .mul_fixed(params.initial_margin_ratio)?
        .add_fixed(params.minimum_initial_margin_ratio)?;
    let maintenance = initial.mul_fixed(params.maintenance_margin_scalar)?;
    Ok((initial, maintenance))
}

/// Margin a position of `size` needs at `price`. A flat position needs nothing.
pub fn calculate_margin_requirement(
    size: SignedSize,
    price: Price,
    skew_scale: Decimal,
    params: &MarginParams,
) -> Result<MarginRequirement, ArithmeticError> {
    if size.is_zero() {
        return Ok(MarginRequirement::default());
    }

    let notional = notional_value(size, price)?;
    let (initial_ratio, maintenance_ratio) = margin_ratios(size, skew_scale, params)?;

    let initial = notional
        .checked_mul(initial_ratio)?
        .checked_add(params.minimum_position_margin)?;
    let maintenance = notional
        .checked_mul(maintenance_ratio)?
        .checked_add(params.minimum_position_margin)?;

    Ok(MarginRequirement { initial, maintenance })
}
