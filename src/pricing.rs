// 2.0: skew-adjusted pricing. the oracle price is moved by how lopsided the market is,
// so a trade that grows the skew pays for the imbalance it creates.

use crate::fixed::{ArithmeticError, FixedPoint};
use crate::types::Price;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// 2.1: skew / skew_scale. a zero scale is an unconfigured market and deviates nothing.
pub fn price_deviation(skew: Decimal, skew_scale: Decimal) -> Result<Decimal, ArithmeticError> {
    if skew_scale.is_zero() {
        return Ok(Decimal::ZERO);
    }
    skew.div_fixed(skew_scale)
}

// 2.2: oracle price moved by a given deviation: p + p * pd
pub fn adjusted_price(oracle_price: Price, deviation: Decimal) -> Result<Decimal, ArithmeticError> {
    let p = oracle_price.value();
    p.add_fixed(p.mul_fixed(deviation)?)
}

/// Average of the skew-adjusted prices before and after applying `size_delta`.
///
/// Returns the raw decimal: with extreme negative skew the result can reach zero
/// or below, and callers decide whether that is a usable [`Price`].
pub fn calculate_fill_price(
    skew: Decimal,
    skew_scale: Decimal,
    size_delta: Decimal,
    oracle_price: Price,
) -> Result<Decimal, ArithmeticError> {
    if skew_scale.is_zero() || size_delta.is_zero() {
        return Ok(oracle_price.value());
    }

    let pd_before = price_deviation(skew, skew_scale)?;
    let pd_after = price_deviation(skew.add_fixed(size_delta)?, skew_scale)?;

    let price_before = adjusted_price(oracle_price, pd_before)?;
    let price_after = adjusted_price(oracle_price, pd_after)?;

    price_before.add_fixed(price_after)?.div_fixed(dec!(2))
}

// 2.3: fill price vs the trader's limit. longs want to pay at most, shorts to receive at least.
pub fn acceptable_price_exceeded(size_delta: Decimal, fill_price: Decimal, acceptable_price: Price) -> bool {
    if size_delta > Decimal::ZERO {
        fill_price > acceptable_price.value()
    } else {
        fill_price < acceptable_price.value()
    }
}
