//! Funding and utilization interest recomputation.
//!
//! Both accumulators must be brought up to the current time before any skew or
//! open interest change. The `*_after` helpers only compute; callers apply the
//! results once every check in their transition has passed.

use super::core::Engine;
use super::results::EngineError;
use crate::events::{EventPayload, FundingRecomputedEvent, InterestRecomputedEvent};
use crate::funding::FundingState;
use crate::ledger::CollateralLedger;
use crate::types::{MarketId, Price, Quote};
use crate::utilization::{locked_credit, utilization_ratio, InterestState};
use rust_decimal::Decimal;

/// A market as it will stand once a pending size change is applied.
#[derive(Debug, Clone, Copy)]
pub(super) struct ProjectedMarket {
    pub market_id: MarketId,
    pub price: Price,
    pub size: Decimal,
}

impl<L: CollateralLedger> Engine<L> {
    /// Pool credit locked by open interest across all markets, at the newest known
    /// price per market regardless of age.
    pub fn locked_credit_total(&self) -> Result<Quote, EngineError> {
        self.locked_credit_with(&[])
    }

    fn locked_credit_with(&self, projected: &[ProjectedMarket]) -> Result<Quote, EngineError> {
        let mut total = Quote::zero();
        for (market_id, market) in &self.markets {
            let (size, price) = match projected.iter().find(|p| p.market_id == *market_id) {
                Some(p) => (p.size, Some(p.price)),
                None => (market.size, self.oracle.latest(market.config.feed_id).map(|record| record.price)),
            };
            if size.is_zero() {
                continue;
            }
            let Some(price) = price else {
                continue;
            };
            let locked = locked_credit(size, price, market.config.locked_oi_ratio)?;
            total = total.checked_add(locked)?;
        }
        Ok(total)
    }

    pub(super) fn funding_after(&self, market_id: MarketId, price: Price) -> Result<FundingState, EngineError> {
        let market = self.market(market_id)?;
        Ok(market.funding.recompute(
            market.skew,
            market.config.skew_scale,
            &market.config.funding_params,
            price,
            self.current_time,
        )?)
    }

    // accrues at the old rate up to now, then prices the rate off the projected open interest
    pub(super) fn interest_after(&self, projected: &[ProjectedMarket]) -> Result<InterestState, EngineError> {
        let locked = self.locked_credit_with(projected)?;
        Ok(self.interest.recompute(
            locked,
            self.global.delegated_collateral,
            &self.global.utilization,
            self.current_time,
        )?)
    }

    pub(super) fn emit_recomputed(&mut self, market_id: MarketId) {
        let Some(market) = self.markets.get(&market_id) else {
            return;
        };
        let funding = FundingRecomputedEvent {
            market_id,
            skew: market.skew,
            funding_rate: market.funding.last_funding_rate,
            funding_value: market.funding.last_funding_value,
        };
        let interest = InterestRecomputedEvent {
            interest_rate: self.interest.interest_rate,
            accrued_index: self.interest.accrued_index,
        };
        tracing::debug!(
            market = market_id.0,
            rate = %funding.funding_rate,
            value = %funding.funding_value,
            interest_rate = %interest.interest_rate,
            "funding recomputed"
        );
        self.emit_event(EventPayload::FundingRecomputed(funding));
        self.emit_event(EventPayload::InterestRecomputed(interest));
    }

    /// Current utilization of delegated pool collateral, in [0, 1].
    pub fn current_utilization(&self) -> Result<Decimal, EngineError> {
        let locked = self.locked_credit_total()?;
        Ok(utilization_ratio(locked, self.global.delegated_collateral)?)
    }
}
