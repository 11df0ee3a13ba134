//! Market configuration and state.
//!
//! A market is one synthetic asset traded against the pool. It has no order book:
//! every trade fills against the oracle price adjusted for the net skew.

use crate::fees::OrderFees;
use crate::fixed::{ArithmeticError, FixedPoint};
use crate::funding::{FundingParams, FundingState};
use crate::liquidation::{max_liquidatable_per_window, LiquidationParams, LiquidationWindow};
use crate::margin::MarginParams;
use crate::order::SettlementStrategy;
use crate::pricing::price_deviation;
use crate::types::{FeedId, MarketId, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Market parameters. Replaced wholesale by the admin, bumping `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    pub id: MarketId,
    /// Human-readable name (e.g., "ETH-PERP")
    pub name: String,
    pub feed_id: FeedId,
    /// Depth of the market: skew at which the price is moved by 100%.
    pub skew_scale: Decimal,
    pub fees: OrderFees,
    pub funding_params: FundingParams,
    pub margin_params: MarginParams,
    pub liquidation_params: LiquidationParams,
    /// Share of open notional that locks pool collateral.
    pub locked_oi_ratio: Decimal,
    /// Cap on open interest per side, in units.
    pub max_market_size: Decimal,
    pub settlement_strategy: SettlementStrategy,
    #[serde(default)]
    pub version: u64,
}

impl MarketConfig {
    pub fn eth_perp(id: MarketId, feed_id: FeedId) -> Self {
        Self {
            id,
            name: "ETH-PERP".to_string(),
            feed_id,
            skew_scale: dec!(1_000_000),
            fees: OrderFees::default(),
            funding_params: FundingParams::default(),
            margin_params: MarginParams::default(),
            liquidation_params: LiquidationParams::default(),
            locked_oi_ratio: dec!(0.5),
            max_market_size: dec!(100_000),
            settlement_strategy: SettlementStrategy::default(),
            version: 0,
        }
    }

    pub fn btc_perp(id: MarketId, feed_id: FeedId) -> Self {
        Self {
            name: "BTC-PERP".to_string(),
            skew_scale: dec!(35_000),
            max_market_size: dec!(5_000),
            ..Self::eth_perp(id, feed_id)
        }
    }

    pub fn validate(&self) -> Result<(), MarketError> {
        if self.skew_scale < Decimal::ZERO {
            return Err(MarketError::InvalidConfig("skew_scale must not be negative"));
        }
        if self.fees.maker_fee < Decimal::ZERO || self.fees.taker_fee < Decimal::ZERO {
            return Err(MarketError::InvalidConfig("fees must not be negative"));
        }
        if self.max_market_size < Decimal::ZERO {
            return Err(MarketError::InvalidConfig("max_market_size must not be negative"));
        }
        if self.liquidation_params.max_seconds_in_liquidation_window < 0 {
            return Err(MarketError::InvalidConfig("liquidation window must not be negative"));
        }
        let strategy = &self.settlement_strategy;
        if strategy.settlement_delay < 0 || strategy.settlement_window_duration < 0 {
            return Err(MarketError::InvalidConfig("settlement timings must not be negative"));
        }
        if strategy.price_window_min > strategy.price_window_max {
            return Err(MarketError::InvalidConfig("price window min exceeds max"));
        }
        Ok(())
    }
}

/// Mutable market state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketState {
    pub config: MarketConfig,
    /// Net long minus short size. Always the exact sum of open position sizes.
    pub skew: Decimal,
    /// Sum of absolute position sizes.
    pub size: Decimal,
    pub funding: FundingState,
    pub liquidation_window: LiquidationWindow,
}

impl MarketState {
    pub fn new(config: MarketConfig, timestamp: Timestamp) -> Self {
        Self {
            config,
            skew: Decimal::ZERO,
            size: Decimal::ZERO,
            funding: FundingState::new(timestamp),
            liquidation_window: LiquidationWindow::new(timestamp),
        }
    }

    pub fn id(&self) -> MarketId {
        self.config.id
    }

    pub fn long_open_interest(&self) -> Result<Decimal, ArithmeticError> {
        self.size.add_fixed(self.skew)?.div_fixed(dec!(2))
    }

    pub fn short_open_interest(&self) -> Result<Decimal, ArithmeticError> {
        self.size.sub_fixed(self.skew)?.div_fixed(dec!(2))
    }

    pub fn price_deviation(&self) -> Result<Decimal, ArithmeticError> {
        price_deviation(self.skew, self.config.skew_scale)
    }

    // 12.1: skew and size after a position moves from old_size to new_size
    pub fn projected(&self, old_size: Decimal, new_size: Decimal) -> Result<(Decimal, Decimal), ArithmeticError> {
        let skew = self.skew.sub_fixed(old_size)?.add_fixed(new_size)?;
        let size = self.size.sub_fixed(old_size.abs())?.add_fixed(new_size.abs())?;
        Ok((skew, size))
    }

    // growing one side past the cap is rejected; shrinking an oversized side is always fine
    pub fn check_max_market_size(&self, old_size: Decimal, new_size: Decimal) -> Result<(), MarketError> {
        let (skew, size) = self.projected(old_size, new_size)?;
        let long_after = size.add_fixed(skew)?.div_fixed(dec!(2))?;
        let short_after = size.sub_fixed(skew)?.div_fixed(dec!(2))?;
        let max = self.config.max_market_size;

        if long_after > max && long_after > self.long_open_interest()? {
            return Err(MarketError::MaxOpenInterestReached {
                market_id: self.id(),
                max,
                projected: long_after,
            });
        }
        if short_after > max && short_after > self.short_open_interest()? {
            return Err(MarketError::MaxOpenInterestReached {
                market_id: self.id(),
                max,
                projected: short_after,
            });
        }
        Ok(())
    }

    /// Liquidation capacity per window for this market, `None` when unthrottled.
    pub fn max_liquidatable_per_window(&self) -> Result<Option<Decimal>, ArithmeticError> {
        max_liquidatable_per_window(
            self.config.fees.maker_fee,
            self.config.fees.taker_fee,
            self.config.skew_scale,
            &self.config.liquidation_params,
        )
    }

    pub fn replace_config(&mut self, mut config: MarketConfig) {
        config.version = self.config.version + 1;
        self.config = config;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    #[error("Max open interest reached in {market_id:?}: max {max}, projected {projected}")]
    MaxOpenInterestReached {
        market_id: MarketId,
        max: Decimal,
        projected: Decimal,
    },

    #[error("Invalid market config: {0}")]
    InvalidConfig(&'static str),

    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn market() -> MarketState {
        let mut config = MarketConfig::eth_perp(MarketId(1), FeedId(1));
        config.max_market_size = dec!(100);
        MarketState::new(config, Timestamp::from_secs(0))
    }

    // the same projection settlement and liquidation commit
    fn resize(m: &mut MarketState, old_size: Decimal, new_size: Decimal) {
        let (skew, size) = m.projected(old_size, new_size).unwrap();
        m.skew = skew;
        m.size = size;
    }

    #[test]
    fn skew_and_size_follow_positions() {
        let mut m = market();
        resize(&mut m, dec!(0), dec!(30));
        resize(&mut m, dec!(0), dec!(-10));
        assert_eq!(m.skew, dec!(20));
        assert_eq!(m.size, dec!(40));
        assert_eq!(m.long_open_interest().unwrap(), dec!(30));
        assert_eq!(m.short_open_interest().unwrap(), dec!(10));

        // flip the long to a short
        resize(&mut m, dec!(30), dec!(-5));
        assert_eq!(m.skew, dec!(-15));
        assert_eq!(m.size, dec!(15));
    }

    #[test]
    fn max_market_size_per_side() {
        let mut m = market();
        resize(&mut m, dec!(0), dec!(90));
        assert!(m.check_max_market_size(dec!(0), dec!(10)).is_ok());
        assert!(matches!(
            m.check_max_market_size(dec!(0), dec!(11)),
            Err(MarketError::MaxOpenInterestReached { .. })
        ));
        // the other side has room
        assert!(m.check_max_market_size(dec!(0), dec!(-100)).is_ok());
    }

    #[test]
    fn shrinking_an_oversized_side_is_allowed() {
        let mut m = market();
        resize(&mut m, dec!(0), dec!(90));
        m.config.max_market_size = dec!(50);
        assert!(m.check_max_market_size(dec!(90), dec!(80)).is_ok());
    }

    #[test]
    fn replacing_config_bumps_version() {
        let mut m = market();
        let next = m.config.clone();
        m.replace_config(next);
        assert_eq!(m.config.version, 1);
    }

    #[test]
    fn presets_validate() {
        assert!(MarketConfig::eth_perp(MarketId(1), FeedId(1)).validate().is_ok());
        assert!(MarketConfig::btc_perp(MarketId(2), FeedId(2)).validate().is_ok());

        let mut bad = MarketConfig::eth_perp(MarketId(1), FeedId(1));
        bad.settlement_strategy.price_window_min = 10;
        bad.settlement_strategy.price_window_max = 5;
        assert!(bad.validate().is_err());
    }
}
