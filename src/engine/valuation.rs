//! Account valuation: collateral, pnl and margin requirements from fresh prices.

use super::core::Engine;
use super::results::EngineError;
use crate::account::{Account, AccountValuation};
use crate::fixed::FixedPoint;
use crate::ledger::CollateralLedger;
use crate::liquidation::flag_reward;
use crate::margin::{calculate_margin_requirement, MarginRequirement};
use crate::oracle::StalenessTolerance;
use crate::position::PositionPnl;
use crate::types::{AccountId, MarketId, Price, Quote};

impl<L: CollateralLedger> Engine<L> {
    /// Discounted value of everything the account holds.
    pub(super) fn collateral_value(&self, account: &Account, tolerance: StalenessTolerance) -> Result<Quote, EngineError> {
        let mut total = Quote::zero();
        for (collateral_id, amount) in &account.collateral {
            let config = self
                .collaterals
                .get(collateral_id)
                .ok_or(EngineError::CollateralNotFound(*collateral_id))?;
            let price = match config.feed_id {
                Some(feed_id) => Some(self.oracle.price(feed_id, tolerance, self.current_time)?.price),
                None => None,
            };
            total = total.checked_add(config.value(*amount, price)?)?;
        }
        Ok(total)
    }

    /// Value `account` as if it were stored. Accounts under construction (projected
    /// trades, withdrawals) go through here before anything is mutated.
    pub(super) fn value_account(
        &self,
        account: &Account,
        tolerance: StalenessTolerance,
        price_override: Option<(MarketId, Price)>,
    ) -> Result<AccountValuation, EngineError> {
        let collateral_value = self.collateral_value(account, tolerance)?;

        let mut total_pnl = Quote::zero();
        let mut requirement = MarginRequirement::default();
        let mut flag_rewards = Quote::zero();

        for (market_id, position) in &account.positions {
            let market = self.market(*market_id)?;
            let price = match price_override {
                Some((id, price)) if id == *market_id => price,
                _ => self.market_price(market, tolerance)?,
            };
            let snapshot = self.market_snapshot(market, price)?;
            let pnl = position.pnl(&snapshot)?;
            total_pnl = total_pnl.checked_add(pnl.total)?;

            let config = &market.config;
            let position_req = calculate_margin_requirement(position.size, price, config.skew_scale, &config.margin_params)?;
            requirement = requirement.checked_add(&position_req)?;
            flag_rewards = flag_rewards.checked_add(flag_reward(position.size, price, &config.liquidation_params)?)?;
        }

        Ok(AccountValuation::new(
            collateral_value,
            total_pnl,
            account.debt,
            requirement,
            flag_rewards,
        )?)
    }

    pub fn account_valuation(&self, account_id: AccountId) -> Result<AccountValuation, EngineError> {
        let account = self.account(account_id)?;
        self.value_account(account, StalenessTolerance::Default, None)
    }

    /// Below maintenance margin on strictly fresh prices. Flagged accounts stay eligible.
    pub fn is_liquidatable(&self, account_id: AccountId) -> Result<bool, EngineError> {
        if self.flagged_accounts.contains(&account_id) {
            return Ok(true);
        }
        let account = self.account(account_id)?;
        if !account.has_open_positions() {
            return Ok(false);
        }
        Ok(self.value_account(account, StalenessTolerance::Strict, None)?.is_liquidatable())
    }

    /// No positions left and the discounted collateral doesn't cover the debt.
    pub fn is_margin_only_liquidatable(&self, account_id: AccountId) -> Result<bool, EngineError> {
        let account = self.account(account_id)?;
        if account.has_open_positions() || self.flagged_accounts.contains(&account_id) || !account.debt.is_positive() {
            return Ok(false);
        }
        let collateral = self.collateral_value(account, StalenessTolerance::Strict)?;
        Ok(collateral < account.debt)
    }

    pub fn position_pnl(&self, account_id: AccountId, market_id: MarketId) -> Result<PositionPnl, EngineError> {
        let account = self.account(account_id)?;
        let Some(position) = account.get_position(market_id) else {
            return Ok(PositionPnl::default());
        };
        let market = self.market(market_id)?;
        let price = self.market_price(market, StalenessTolerance::Default)?;
        let snapshot = self.market_snapshot(market, price)?;
        Ok(position.pnl(&snapshot)?)
    }

    /// Margin ratio of the account: available margin over maintenance requirement.
    /// None for an account with nothing open.
    pub fn margin_health(&self, account_id: AccountId) -> Result<Option<rust_decimal::Decimal>, EngineError> {
        let valuation = self.account_valuation(account_id)?;
        if valuation.required_maintenance_margin.is_zero() {
            return Ok(None);
        }
        Ok(Some(
            valuation
                .available_margin
                .value()
                .div_fixed(valuation.required_maintenance_margin.value())?,
        ))
    }
}
