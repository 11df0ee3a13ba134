// 4.0: open position tracking. pnl = size * (price - entry) + funding - interest.
// positions are realized on every touch: settlement pays out the pnl so far and
// re-bases the position at the fill price, so there is no averaging of entries.

use crate::fixed::{ArithmeticError, FixedPoint};
use crate::funding::accrued_funding;
use crate::types::{MarketId, Price, Quote, Side, SignedSize, Timestamp};
use crate::utilization::accrued_interest;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub market_id: MarketId,
    pub size: SignedSize,
    // price of the latest interaction, not an average
    pub entry_price: Price,
    pub entry_funding_value: Decimal,
    pub entry_interest_index: Decimal,
    // market skew right after this position was last touched
    pub entry_skew: Decimal,
    pub updated_at: Timestamp,
}

/// Inputs a valuation needs from the market at one instant.
#[derive(Debug, Clone, Copy)]
pub struct MarketSnapshot {
    pub price: Price,
    pub funding_value: Decimal,
    pub interest_index: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionPnl {
    pub price_pnl: Quote,
    pub accrued_funding: Quote,
    pub accrued_interest: Quote,
    // price_pnl + accrued_funding - accrued_interest
    pub total: Quote,
}

impl Position {
    pub fn open(
        market_id: MarketId,
        size: SignedSize,
        entry_price: Price,
        snapshot: &MarketSnapshot,
        entry_skew: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            market_id,
            size,
            entry_price,
            entry_funding_value: snapshot.funding_value,
            entry_interest_index: snapshot.interest_index,
            entry_skew,
            updated_at: timestamp,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_zero()
    }

    pub fn side(&self) -> Option<Side> {
        self.size.side()
    }

    pub fn notional_value(&self, price: Price) -> Result<Quote, ArithmeticError> {
        Ok(Quote::new(self.size.abs().mul_fixed(price.value())?))
    }

    // 4.1: full breakdown at the given market snapshot
    pub fn pnl(&self, snapshot: &MarketSnapshot) -> Result<PositionPnl, ArithmeticError> {
        if self.is_empty() {
            return Ok(PositionPnl::default());
        }

        let price_pnl = calculate_price_pnl(self.size, self.entry_price, snapshot.price)?;
        let funding = accrued_funding(self.size, self.entry_funding_value, snapshot.funding_value)?;
        let interest = accrued_interest(
            self.size,
            self.entry_price,
            self.entry_interest_index,
            snapshot.interest_index,
        )?;

        let total = price_pnl.checked_add(funding)?.checked_sub(interest)?;
        Ok(PositionPnl {
            price_pnl,
            accrued_funding: funding,
            accrued_interest: interest,
            total,
        })
    }

    // 4.2: after the old pnl is paid out, start over at the fill price with new size
    pub fn rebase(
        &self,
        new_size: SignedSize,
        fill_price: Price,
        snapshot: &MarketSnapshot,
        skew_after: Decimal,
        timestamp: Timestamp,
    ) -> Position {
        Position::open(self.market_id, new_size, fill_price, snapshot, skew_after, timestamp)
    }
}

// 4.3: size * (price - entry)
pub fn calculate_price_pnl(size: SignedSize, entry_price: Price, price: Price) -> Result<Quote, ArithmeticError> {
    let move_per_unit = price.value().sub_fixed(entry_price.value())?;
    Ok(Quote::new(size.value().mul_fixed(move_per_unit)?))
}
