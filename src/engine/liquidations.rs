//! Liquidation: flagging, throttled unwinding and margin-only seizure.
//!
//! The first eligible call that can close something flags the account. Flagging
//! seizes every collateral balance into the liquidity pool and clears the debt, so
//! the pool now owns the account's positions. Those are then closed against the
//! market, at most the window capacity per market per call, until nothing is left
//! open.

use super::core::Engine;
use super::funding::ProjectedMarket;
use super::results::{EngineError, FlaggedLiquidations, LiquidationResult, MarginOnlyLiquidationResult, PositionLiquidation};
use crate::account::Account;
use crate::events::{
    AccountFlaggedEvent, AccountLiquidatedEvent, CancelReason, EventPayload, MarginOnlyLiquidatedEvent,
    PositionLiquidatedEvent,
};
use crate::fees::{keeper_reward, liquidation_reward, KeeperAction};
use crate::funding::FundingState;
use crate::ledger::{CollateralLedger, Recipient};
use crate::liquidation::{can_bypass_throttle, liquidation_amount, liquidation_iterations, LiquidationWindow};
use crate::oracle::StalenessTolerance;
use crate::position::Position;
use crate::types::{AccountId, Address, CollateralId, MarketId, Price, Quote, SignedSize};
use crate::utilization::InterestState;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

// one market's share of an unwind, fully computed before anything is applied
#[derive(Debug, Clone)]
struct UnwindStep {
    market_id: MarketId,
    amount: Decimal,
    position: Position,
    price: Price,
    skew_after: Decimal,
    size_after: Decimal,
    funding: FundingState,
    window: Option<LiquidationWindow>,
    throttle_bypassed: bool,
}

#[derive(Debug, Clone, Default)]
struct UnwindPlan {
    steps: Vec<UnwindStep>,
    interest: Option<InterestState>,
}

impl<L: CollateralLedger> Engine<L> {
    /// Flag an under-margined account, or keep unwinding one already flagged.
    ///
    /// A call that finds no capacity left in any of the account's markets succeeds
    /// without changing anything and pays nothing. An account that isn't flagged yet
    /// stays unflagged until a window has room for it.
    pub fn liquidate(&mut self, keeper: Address, account_id: AccountId) -> Result<LiquidationResult, EngineError> {
        if self.flagged_accounts.contains(&account_id) {
            return self.continue_liquidation(keeper, account_id);
        }

        let account = self.account(account_id)?;
        if !account.has_open_positions() {
            return Err(EngineError::NotEligibleForLiquidation(account_id));
        }
        let valuation = self.value_account(account, StalenessTolerance::Strict, None)?;
        if !valuation.is_liquidatable() {
            return Err(EngineError::NotEligibleForLiquidation(account_id));
        }

        let plan = self.plan_unwind(keeper, account)?;
        if plan.steps.is_empty() {
            tracing::debug!(account = account_id.0, "no liquidation capacity left in window, flag deferred");
            return Ok(LiquidationResult::noop(account_id, keeper, false));
        }

        // 11.1: reward sized on how many calls the whole unwind will take
        let mut iterations = Decimal::ZERO;
        for (market_id, position) in &account.positions {
            let max = self.market(*market_id)?.max_liquidatable_per_window()?;
            iterations = iterations.max(liquidation_iterations(position.size, max)?);
        }
        let reward = liquidation_reward(
            self.keeper_cost(KeeperAction::Liquidation)?,
            iterations,
            self.keeper_cost(KeeperAction::Flag)?,
            valuation.flag_reward,
            &self.global.keeper_costs.rewards,
        )?;

        let mut flagged = account.clone();
        let seized = flagged.take_all_collateral();
        let debt_cleared = flagged.debt;
        flagged.debt = Quote::zero();
        let dropped_order = flagged.pending_order.take();

        for (collateral_id, amount) in &seized {
            self.ledger.credit(Recipient::LiquidityPool, *collateral_id, *amount)?;
        }
        self.ledger.credit(Recipient::Keeper(keeper), CollateralId::USD, reward.value())?;

        self.accounts.insert(account_id, flagged);
        self.flagged_accounts.insert(account_id);

        tracing::info!(
            account = account_id.0,
            keeper = keeper.0,
            available = %valuation.available_margin,
            maintenance = %valuation.required_maintenance_margin,
            %iterations,
            %reward,
            "account flagged for liquidation"
        );
        self.emit_event(EventPayload::AccountFlagged(AccountFlaggedEvent {
            account_id,
            keeper,
            seized: seized.into_iter().collect(),
            debt_cleared,
            available_margin: valuation.available_margin,
            required_maintenance_margin: valuation.required_maintenance_margin,
        }));
        if let Some(order) = dropped_order {
            self.finish_cancel(keeper, &order, CancelReason::Liquidated, Quote::zero());
        }

        Ok(self.apply_unwind(keeper, account_id, plan, reward, true))
    }

    fn continue_liquidation(&mut self, keeper: Address, account_id: AccountId) -> Result<LiquidationResult, EngineError> {
        let account = self.account(account_id)?;
        let plan = self.plan_unwind(keeper, account)?;
        if plan.steps.is_empty() {
            tracing::debug!(account = account_id.0, "no liquidation capacity left in window");
            return Ok(LiquidationResult::noop(account_id, keeper, !account.has_open_positions()));
        }

        let reward = liquidation_reward(
            self.keeper_cost(KeeperAction::Liquidation)?,
            Decimal::ONE,
            Quote::zero(),
            Quote::zero(),
            &self.global.keeper_costs.rewards,
        )?;
        self.ledger.credit(Recipient::Keeper(keeper), CollateralId::USD, reward.value())?;
        Ok(self.apply_unwind(keeper, account_id, plan, reward, false))
    }

    // 11.2: work out what every market can close this call, without touching state
    fn plan_unwind(&self, keeper: Address, account: &Account) -> Result<UnwindPlan, EngineError> {
        let now = self.current_time;
        let mut steps = Vec::new();

        for (market_id, position) in &account.positions {
            let market = self.market(*market_id)?;
            let price = self.market_price(market, StalenessTolerance::Strict)?;
            let params = &market.config.liquidation_params;
            let window_seconds = params.max_seconds_in_liquidation_window;

            let max = market.max_liquidatable_per_window()?;
            let throttle_bypassed = can_bypass_throttle(keeper, params, market.price_deviation()?);
            let remaining = match max {
                Some(max) if !throttle_bypassed => Some(market.liquidation_window.remaining(max, now, window_seconds)?),
                _ => None,
            };
            let amount = liquidation_amount(position.size, remaining);
            tracing::debug!(
                market = market_id.0,
                size = %position.size,
                ?max,
                ?remaining,
                %amount,
                throttle_bypassed,
                "liquidation capacity"
            );
            if amount.is_zero() {
                continue;
            }

            let delta = if position.size.is_long() { -amount } else { amount };
            let new_size: SignedSize = position.size.checked_add(delta)?;
            let (skew_after, size_after) = market.projected(position.size.value(), new_size.value())?;
            let snapshot = self.market_snapshot(market, price)?;

            // the window records bypassed amounts too
            let window = match max {
                Some(_) => {
                    let mut window = market.liquidation_window.clone();
                    window.record(amount, now, window_seconds)?;
                    Some(window)
                }
                None => None,
            };

            steps.push(UnwindStep {
                market_id: *market_id,
                amount,
                position: position.rebase(new_size, price, &snapshot, skew_after, now),
                price,
                skew_after,
                size_after,
                funding: self.funding_after(*market_id, price)?,
                window,
                throttle_bypassed,
            });
        }

        let interest = if steps.is_empty() {
            None
        } else {
            let projected: Vec<ProjectedMarket> = steps
                .iter()
                .map(|step| ProjectedMarket {
                    market_id: step.market_id,
                    price: step.price,
                    size: step.size_after,
                })
                .collect();
            Some(self.interest_after(&projected)?)
        };
        Ok(UnwindPlan { steps, interest })
    }

    fn apply_unwind(
        &mut self,
        keeper: Address,
        account_id: AccountId,
        plan: UnwindPlan,
        reward: Quote,
        flagged: bool,
    ) -> LiquidationResult {
        if let Some(interest) = plan.interest {
            self.interest = interest;
        }

        let mut positions = Vec::with_capacity(plan.steps.len());
        for step in plan.steps {
            if let Some(market) = self.markets.get_mut(&step.market_id) {
                market.funding = step.funding;
                market.skew = step.skew_after;
                market.size = step.size_after;
                if let Some(window) = step.window {
                    market.liquidation_window = window;
                }
            }
            let remaining_size = step.position.size.value();
            if let Some(account) = self.accounts.get_mut(&account_id) {
                account.set_position(step.position);
            }

            self.emit_recomputed(step.market_id);
            self.emit_event(EventPayload::PositionLiquidated(PositionLiquidatedEvent {
                account_id,
                market_id: step.market_id,
                amount_liquidated: step.amount,
                remaining_size,
                price: step.price,
                skew_after: step.skew_after,
                throttle_bypassed: step.throttle_bypassed,
            }));
            positions.push(PositionLiquidation {
                market_id: step.market_id,
                amount_liquidated: step.amount,
                remaining_size,
                price: step.price,
                throttle_bypassed: step.throttle_bypassed,
            });
        }

        let fully_liquidated = self
            .accounts
            .get(&account_id)
            .map_or(true, |account| !account.has_open_positions());
        if fully_liquidated {
            self.flagged_accounts.remove(&account_id);
        }

        tracing::info!(
            account = account_id.0,
            keeper = keeper.0,
            markets = positions.len(),
            %reward,
            fully_liquidated,
            "liquidation executed"
        );
        self.emit_event(EventPayload::AccountLiquidated(AccountLiquidatedEvent {
            account_id,
            keeper,
            reward,
            fully_liquidated,
        }));

        LiquidationResult {
            account_id,
            keeper,
            flagged,
            reward,
            positions,
            fully_liquidated,
        }
    }

    /// Keep unwinding up to `max_accounts` flagged accounts, lowest id first.
    ///
    /// Each account is its own liquidation. One that fails, a stale price in one of
    /// its markets say, is left untouched and reported while the rest still unwind.
    pub fn liquidate_flagged(&mut self, keeper: Address, max_accounts: usize) -> FlaggedLiquidations {
        let ids: Vec<AccountId> = self.flagged_accounts.iter().take(max_accounts).copied().collect();
        let mut sweep = FlaggedLiquidations::default();
        for account_id in ids {
            match self.continue_liquidation(keeper, account_id) {
                Ok(result) => sweep.liquidated.push(result),
                Err(err) => {
                    tracing::warn!(account = account_id.0, error = %err, "flagged account skipped");
                    sweep.skipped.push((account_id, err));
                }
            }
        }
        sweep
    }

    /// Seize the collateral of an account with no positions whose debt its collateral
    /// no longer covers.
    pub fn liquidate_margin_only(
        &mut self,
        keeper: Address,
        account_id: AccountId,
    ) -> Result<MarginOnlyLiquidationResult, EngineError> {
        if !self.is_margin_only_liquidatable(account_id)? {
            return Err(EngineError::NotEligibleForLiquidation(account_id));
        }
        let account = self.account(account_id)?;
        let seized_value = self.collateral_value(account, StalenessTolerance::Strict)?;
        let proportional = seized_value.checked_mul(self.global.margin_only_reward_ratio)?;
        let reward = keeper_reward(
            self.keeper_cost(KeeperAction::Flag)?,
            proportional,
            &self.global.keeper_costs.rewards,
        )?;

        let mut updated = account.clone();
        let seized: BTreeMap<CollateralId, Decimal> = updated.take_all_collateral();
        let debt_cleared = updated.debt;
        updated.debt = Quote::zero();
        let dropped_order = updated.pending_order.take();

        for (collateral_id, amount) in &seized {
            self.ledger.credit(Recipient::LiquidityPool, *collateral_id, *amount)?;
        }
        self.ledger.credit(Recipient::Keeper(keeper), CollateralId::USD, reward.value())?;
        self.accounts.insert(account_id, updated);

        tracing::info!(
            account = account_id.0,
            keeper = keeper.0,
            seized = %seized_value,
            debt = %debt_cleared,
            %reward,
            "margin-only liquidation"
        );
        self.emit_event(EventPayload::MarginOnlyLiquidated(MarginOnlyLiquidatedEvent {
            account_id,
            keeper,
            seized_value,
            debt_cleared,
            reward,
        }));
        if let Some(order) = dropped_order {
            self.finish_cancel(keeper, &order, CancelReason::Liquidated, Quote::zero());
        }

        Ok(MarginOnlyLiquidationResult {
            account_id,
            seized_value,
            debt_cleared,
            reward,
        })
    }
}
