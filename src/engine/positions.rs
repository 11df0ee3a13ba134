//! Applying fills to accounts.
//!
//! A fill is always worked out on a copy of the account first. The copy is valued,
//! and only once it passes does the caller swap it in along with the market changes.

use super::core::Engine;
use super::funding::ProjectedMarket;
use super::results::EngineError;
use crate::account::{Account, AccountValuation};
use crate::ledger::CollateralLedger;
use crate::oracle::StalenessTolerance;
use crate::position::{MarketSnapshot, Position};
use crate::types::{AccountId, MarketId, Price, Quote, SignedSize};
use rust_decimal::Decimal;

/// An account after a hypothetical fill, plus the market numbers that go with it.
#[derive(Debug, Clone)]
pub(super) struct ProjectedFill {
    pub account: Account,
    pub old_size: SignedSize,
    pub new_size: SignedSize,
    pub realized_pnl: Quote,
    pub skew_after: Decimal,
    pub size_after: Decimal,
    pub snapshot: MarketSnapshot,
}

impl ProjectedFill {
    pub fn projected_market(&self, market_id: MarketId) -> ProjectedMarket {
        ProjectedMarket {
            market_id,
            price: self.snapshot.price,
            size: self.size_after,
        }
    }
}

impl<L: CollateralLedger> Engine<L> {
    /// Work out `account` after trading `size_delta` at `fill_price` and paying `fees`.
    ///
    /// The old position is realized at the fill price, then re-based there with the
    /// new size. Funding and interest entries are taken at `oracle_price` as of now.
    pub(super) fn project_fill(
        &self,
        account: &Account,
        market_id: MarketId,
        oracle_price: Price,
        fill_price: Price,
        size_delta: Decimal,
        fees: Quote,
    ) -> Result<ProjectedFill, EngineError> {
        let market = self.market(market_id)?;
        let snapshot = self.market_snapshot(market, oracle_price)?;

        let mut updated = account.clone();
        let existing = account.get_position(market_id);
        let old_size = existing.map(|p| p.size).unwrap_or_default();
        let new_size = old_size.checked_add(size_delta)?;

        let realized_pnl = match existing {
            Some(position) => {
                position
                    .pnl(&MarketSnapshot {
                        price: fill_price,
                        ..snapshot
                    })?
                    .total
            }
            None => Quote::zero(),
        };
        let (skew_after, size_after) = market.projected(old_size.value(), new_size.value())?;

        updated.charge(realized_pnl)?;
        updated.charge(fees.negate())?;
        updated.set_position(Position::open(
            market_id,
            new_size,
            fill_price,
            &snapshot,
            skew_after,
            self.current_time,
        ));

        Ok(ProjectedFill {
            account: updated,
            old_size,
            new_size,
            realized_pnl,
            skew_after,
            size_after,
            snapshot,
        })
    }

    /// Value a projected account and require it to cover its initial margin.
    pub(super) fn require_initial_margin(
        &self,
        account: &Account,
        price_override: Option<(MarketId, Price)>,
    ) -> Result<AccountValuation, EngineError> {
        let valuation = self.value_account(account, StalenessTolerance::Default, price_override)?;
        if valuation.available_margin < valuation.required_initial_margin {
            return Err(EngineError::InsufficientMargin {
                required: valuation.required_initial_margin,
                available: valuation.available_margin,
            });
        }
        Ok(valuation)
    }

    pub fn position(&self, account_id: AccountId, market_id: MarketId) -> Option<&Position> {
        self.accounts.get(&account_id)?.get_position(market_id)
    }
}
