// 10.1: collateral types and how much margin they are worth. anything that isn't the
// settlement currency is valued at oracle price minus a size-dependent haircut, modelling
// the slippage of selling that amount through its own market.

use crate::fixed::{ArithmeticError, FixedPoint, UNIT};
use crate::types::{CollateralId, FeedId, Price, Quote};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralConfig {
    pub id: CollateralId,
    pub symbol: String,
    // None for the settlement currency
    pub feed_id: Option<FeedId>,
    // per-account cap on deposited amount
    pub max_collateral_amount: Decimal,
    // depth of the collateral's own market, used for the haircut
    pub skew_scale: Decimal,
    pub discount_scalar: Decimal,
    pub lower_limit_discount: Decimal,
    pub upper_limit_discount: Decimal,
}

impl CollateralConfig {
    pub fn usd() -> Self {
        Self {
            id: CollateralId::USD,
            symbol: "USD".to_string(),
            feed_id: None,
            max_collateral_amount: dec!(100_000_000),
            skew_scale: Decimal::ZERO,
            discount_scalar: Decimal::ZERO,
            lower_limit_discount: Decimal::ZERO,
            upper_limit_discount: Decimal::ZERO,
        }
    }

    pub fn eth(id: CollateralId, feed_id: FeedId) -> Self {
        Self {
            id,
            symbol: "ETH".to_string(),
            feed_id: Some(feed_id),
            max_collateral_amount: dec!(100_000),
            skew_scale: dec!(1_000_000),
            discount_scalar: dec!(1),
            lower_limit_discount: dec!(0.01),
            upper_limit_discount: dec!(0.05),
        }
    }

    pub fn discounted_price(&self, price: Price, amount: Decimal) -> Result<Decimal, ArithmeticError> {
        calculate_discounted_collateral_price(
            price,
            amount,
            self.skew_scale,
            self.discount_scalar,
            self.lower_limit_discount,
            self.upper_limit_discount,
        )
    }

    // settlement currency is worth its amount, everything else amount * discounted price
    pub fn value(&self, amount: Decimal, price: Option<Price>) -> Result<Quote, CollateralError> {
        if self.id.is_settlement_currency() {
            return Ok(Quote::new(amount));
        }
        let price = price.ok_or(CollateralError::MissingPrice(self.id))?;
        let discounted = self.discounted_price(price, amount)?;
        Ok(Quote::new(amount.mul_fixed(discounted)?))
    }
}

/// `price * (1 - clamp(amount * discount_scalar / skew_scale, min, max))`.
///
/// A zero `skew_scale` means no depth information and applies the minimum discount.
pub fn calculate_discounted_collateral_price(
    price: Price,
    amount: Decimal,
    skew_scale: Decimal,
    discount_scalar: Decimal,
    min_discount: Decimal,
    max_discount: Decimal,
) -> Result<Decimal, ArithmeticError> {
    let impact = if skew_scale.is_zero() {
        Decimal::ZERO
    } else {
        amount.abs().mul_fixed(discount_scalar)?.div_fixed(skew_scale)?
    };
    let discount = impact.clamp_fixed(min_discount, max_discount);
    price.value().mul_fixed(UNIT.sub_fixed(discount)?)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollateralError {
    #[error("No price available for collateral {0:?}")]
    MissingPrice(CollateralId),

    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),
}
