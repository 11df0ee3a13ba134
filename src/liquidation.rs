//! Liquidation throttling.
//!
//! An account below maintenance margin is flagged and its positions are unwound
//! against the market, not an insurance fund. Dumping a large position at once
//! would move the skew-adjusted price through the floor, so each market caps the
//! size it liquidates per trailing window. The cap is sized so the fees the window
//! can absorb (maker + taker over `skew_scale`) pay for the price impact.

use crate::fixed::{ArithmeticError, FixedPoint};
use crate::types::{Address, Price, Quote, SignedSize, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationParams {
    // fraction of liquidated notional paid to the flagging keeper
    pub flag_reward_ratio: Decimal,
    pub max_seconds_in_liquidation_window: i64,
    pub max_liquidation_limit_accumulation_multiplier: Decimal,
    // endorsed liquidator may skip the throttle while |pd| stays within this
    pub max_liquidation_pd: Option<Decimal>,
    pub endorsed_liquidator: Option<Address>,
}

impl Default for LiquidationParams {
    fn default() -> Self {
        Self {
            flag_reward_ratio: dec!(0.0001),
            max_seconds_in_liquidation_window: 30,
            max_liquidation_limit_accumulation_multiplier: dec!(1),
            max_liquidation_pd: None,
            endorsed_liquidator: None,
        }
    }
}

/// Size that may be liquidated per window, or `None` when the market is unthrottled.
///
/// `(maker_fee + taker_fee) * skew_scale * window_seconds * multiplier`. A config that
/// works out to zero capacity (no window, no multiplier, no fees, no scale) disables the
/// throttle rather than blocking liquidations forever.
pub fn max_liquidatable_per_window(
    maker_fee: Decimal,
    taker_fee: Decimal,
    skew_scale: Decimal,
    params: &LiquidationParams,
) -> Result<Option<Decimal>, ArithmeticError> {
    let max = maker_fee
        .add_fixed(taker_fee)?
        .mul_fixed(skew_scale)?
        .mul_fixed(Decimal::from(params.max_seconds_in_liquidation_window))?
        .mul_fixed(params.max_liquidation_limit_accumulation_multiplier)?;
    if max <= Decimal::ZERO {
        return Ok(None);
    }
    Ok(Some(max))
}

// 6.1: per-market accumulator. reset on read once the window has fully lapsed since the
// last liquidation, so any trailing window only ever sees one accumulation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationWindow {
    pub used: Decimal,
    pub last_update: Timestamp,
    pub window_start: Timestamp,
}

impl LiquidationWindow {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            used: Decimal::ZERO,
            last_update: timestamp,
            window_start: timestamp,
        }
    }

    pub fn is_lapsed(&self, now: Timestamp, window_seconds: i64) -> bool {
        now.elapsed_since(self.last_update) > window_seconds
    }

    // used capacity as seen at `now`
    pub fn used_at(&self, now: Timestamp, window_seconds: i64) -> Decimal {
        if self.is_lapsed(now, window_seconds) {
            Decimal::ZERO
        } else {
            self.used
        }
    }

    pub fn remaining(&self, max: Decimal, now: Timestamp, window_seconds: i64) -> Result<Decimal, ArithmeticError> {
        Ok(max.sub_fixed(self.used_at(now, window_seconds))?.max(Decimal::ZERO))
    }

    // 6.2: record a liquidated amount, resetting first if the window lapsed
    pub fn record(&mut self, amount: Decimal, now: Timestamp, window_seconds: i64) -> Result<(), ArithmeticError> {
        if self.is_lapsed(now, window_seconds) {
            self.used = Decimal::ZERO;
            self.window_start = now;
        }
        self.used = self.used.add_fixed(amount.abs())?;
        self.last_update = now;
        Ok(())
    }
}

/// Keeper calls needed to unwind `size` at `max` per window. Unthrottled takes one.
pub fn liquidation_iterations(size: SignedSize, max_per_window: Option<Decimal>) -> Result<Decimal, ArithmeticError> {
    if size.is_zero() {
        return Ok(Decimal::ZERO);
    }
    match max_per_window {
        Some(max) => size.abs().ceil_div_fixed(max),
        None => Ok(Decimal::ONE),
    }
}

pub fn can_bypass_throttle(liquidator: Address, params: &LiquidationParams, price_deviation: Decimal) -> bool {
    let endorsed = params.endorsed_liquidator == Some(liquidator);
    let within_pd = params
        .max_liquidation_pd
        .map_or(false, |max_pd| price_deviation.abs() <= max_pd);
    endorsed && within_pd
}

/// What actually gets closed this call: all of it, or what the window has left.
pub fn liquidation_amount(size: SignedSize, remaining: Option<Decimal>) -> Decimal {
    match remaining {
        Some(remaining) => size.abs().min(remaining),
        None => size.abs(),
    }
}

// proportional part of the flag reward
pub fn flag_reward(size: SignedSize, price: Price, params: &LiquidationParams) -> Result<Quote, ArithmeticError> {
    Ok(Quote::new(
        size.abs().mul_fixed(price.value())?.mul_fixed(params.flag_reward_ratio)?,
    ))
}
