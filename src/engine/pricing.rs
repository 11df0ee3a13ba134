//! Prices, keeper costs and read-only market quotes.

use super::core::Engine;
use super::results::{EngineError, LiquidationCapacity};
use crate::fees::{calculate_order_fee, keeper_base_cost, keeper_reward, KeeperAction};
use crate::funding::funding_velocity;
use crate::ledger::CollateralLedger;
use crate::market::MarketState;
use crate::oracle::StalenessTolerance;
use crate::position::MarketSnapshot;
use crate::pricing::calculate_fill_price;
use crate::types::{MarketId, Price, Quote};
use rust_decimal::Decimal;

impl<L: CollateralLedger> Engine<L> {
    pub(super) fn market_price(&self, market: &MarketState, tolerance: StalenessTolerance) -> Result<Price, EngineError> {
        Ok(self.oracle.price(market.config.feed_id, tolerance, self.current_time)?.price)
    }

    /// Usd cost of the gas a keeper burns on `action` right now.
    pub fn keeper_cost(&self, action: KeeperAction) -> Result<Quote, EngineError> {
        let keeper = &self.global.keeper_costs;
        let eth_price = self
            .oracle
            .price(keeper.eth_feed_id, StalenessTolerance::Default, self.current_time)?
            .price;
        Ok(keeper_base_cost(
            keeper.base_fee_per_gas,
            keeper.gas_units.units(action),
            eth_price.value(),
        )?)
    }

    // bounded reward for one settlement, cancellation or flag
    pub(super) fn keeper_fee(&self, action: KeeperAction, buffer: Quote) -> Result<Quote, EngineError> {
        let cost = self.keeper_cost(action)?;
        Ok(keeper_reward(cost, buffer, &self.global.keeper_costs.rewards)?)
    }

    // funding value and interest index as they stand at the current time, at `price`
    pub(super) fn market_snapshot(&self, market: &MarketState, price: Price) -> Result<MarketSnapshot, EngineError> {
        let funding_value = market.funding.next_funding_value(
            market.skew,
            market.config.skew_scale,
            &market.config.funding_params,
            price,
            self.current_time,
        )?;
        Ok(MarketSnapshot {
            price,
            funding_value,
            interest_index: self.interest.current_index(self.current_time)?,
        })
    }

    /// Fill price a trade of `size_delta` would get at the current oracle price.
    pub fn quote_fill_price(&self, market_id: MarketId, size_delta: Decimal) -> Result<Decimal, EngineError> {
        let market = self.market(market_id)?;
        let price = self.market_price(market, StalenessTolerance::Default)?;
        Ok(calculate_fill_price(market.skew, market.config.skew_scale, size_delta, price)?)
    }

    /// Trade fee and settlement keeper fee for a prospective order.
    pub fn quote_order_fees(
        &self,
        market_id: MarketId,
        size_delta: Decimal,
        keeper_fee_buffer: Quote,
    ) -> Result<(Quote, Quote), EngineError> {
        let market = self.market(market_id)?;
        let fill_price = self.quote_fill_price(market_id, size_delta)?;
        let trade_fee = calculate_order_fee(market.skew, size_delta, fill_price, &market.config.fees)?;
        let keeper_fee = self.keeper_fee(KeeperAction::Settlement, keeper_fee_buffer)?;
        Ok((trade_fee, keeper_fee))
    }

    /// Daily funding rate right now.
    pub fn current_funding_rate(&self, market_id: MarketId) -> Result<Decimal, EngineError> {
        let market = self.market(market_id)?;
        Ok(market.funding.current_funding_rate(
            market.skew,
            market.config.skew_scale,
            &market.config.funding_params,
            self.current_time,
        )?)
    }

    pub fn current_funding_velocity(&self, market_id: MarketId) -> Result<Decimal, EngineError> {
        let market = self.market(market_id)?;
        Ok(funding_velocity(
            market.skew,
            market.config.skew_scale,
            &market.config.funding_params,
        )?)
    }

    pub fn liquidation_capacity(&self, market_id: MarketId) -> Result<LiquidationCapacity, EngineError> {
        let market = self.market(market_id)?;
        let window_seconds = market.config.liquidation_params.max_seconds_in_liquidation_window;
        let max = market.max_liquidatable_per_window()?;
        let window = &market.liquidation_window;
        let remaining = match max {
            Some(max) => Some(window.remaining(max, self.current_time, window_seconds)?),
            None => None,
        };
        Ok(LiquidationCapacity {
            market_id,
            max_per_window: max,
            used: window.used_at(self.current_time, window_seconds),
            remaining,
            window_start: window.window_start,
        })
    }
}
