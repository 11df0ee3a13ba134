//! Delayed order lifecycle: commit, settle, cancel.

use super::core::Engine;
use super::results::{CancelResult, CommitResult, EngineError, SettlementResult};
use crate::account::Account;
use crate::events::{
    CancelReason, EventPayload, HookFailedEvent, OrderCancelledEvent, OrderCommittedEvent, OrderSettledEvent,
};
use crate::fees::{calculate_order_fee, KeeperAction};
use crate::hooks::SettlementFill;
use crate::ledger::{CollateralLedger, Recipient};
use crate::market::MarketState;
use crate::oracle::{OracleError, PriceUpdateData, StalenessTolerance};
use crate::order::{OrderCommitment, OrderError, OrderStatus, PendingOrder};
use crate::pricing::{acceptable_price_exceeded, calculate_fill_price};
use crate::types::{AccountId, Address, CollateralId, MarketId, OrderId, Price, Quote};
use crate::utilization::InterestState;

// state a settlement touches, restored if a fatal hook rejects it
struct SettlementSnapshot {
    account: Account,
    market: MarketState,
    interest: InterestState,
}

impl<L: CollateralLedger> Engine<L> {
    /// Commit an order for later settlement by a keeper.
    pub fn commit_order(&mut self, caller: Address, commitment: OrderCommitment) -> Result<CommitResult, EngineError> {
        let account_id = commitment.account_id;
        let market_id = commitment.market_id;
        let size_delta = commitment.size_delta;

        let account = self.authorized_account(caller, account_id)?;
        let market = self.market(market_id)?;
        let strategy = market.config.settlement_strategy.clone();
        if strategy.disabled {
            return Err(EngineError::SettlementStrategyDisabled(market_id));
        }
        if size_delta.is_zero() {
            return Err(OrderError::NilOrder.into());
        }
        if account.pending_order.is_some() {
            return Err(EngineError::OrderAlreadyCommitted(account_id));
        }
        if self.flagged_accounts.contains(&account_id) {
            return Err(EngineError::PendingLiquidation(account_id));
        }

        let max_hooks = self.global.max_hooks_per_order;
        if commitment.hooks.len() > max_hooks {
            return Err(EngineError::MaxHooksExceeded { max: max_hooks });
        }
        if let Some(hook_id) = commitment.hooks.iter().find(|id| !self.hooks.contains(**id)) {
            return Err(EngineError::InvalidHook(*hook_id));
        }

        let max_positions = self.global.max_positions_per_account;
        let opens_new = account.get_position(market_id).is_none();
        if opens_new && account.open_position_count() >= max_positions {
            return Err(EngineError::MaxPositionsPerAccountReached { max: max_positions });
        }

        // 9.1: estimate the fill at the current price; the real one comes at settlement
        let price = self.market_price(market, StalenessTolerance::Default)?;
        let fill = calculate_fill_price(market.skew, market.config.skew_scale, size_delta, price)?;
        if acceptable_price_exceeded(size_delta, fill, commitment.acceptable_price) {
            return Err(OrderError::AcceptablePriceExceeded {
                fill_price: fill,
                acceptable_price: commitment.acceptable_price,
            }
            .into());
        }
        let fill_price = Price::new(fill).ok_or(EngineError::InvalidFillPrice(fill))?;

        let old_size = account.get_position(market_id).map(|p| p.size).unwrap_or_default();
        let new_size = old_size.checked_add(size_delta)?;
        market.check_max_market_size(old_size.value(), new_size.value())?;

        let trade_fee = calculate_order_fee(market.skew, size_delta, fill, &market.config.fees)?;
        let keeper_fee = self.keeper_fee(KeeperAction::Settlement, commitment.keeper_fee_buffer)?;

        if self.value_account(account, StalenessTolerance::Default, None)?.is_liquidatable() {
            return Err(EngineError::AccountLiquidatable(account_id));
        }

        let fees = trade_fee.checked_add(keeper_fee)?;
        let projected = self.project_fill(account, market_id, price, fill_price, size_delta, fees)?;
        self.require_initial_margin(&projected.account, None)?;

        let order_id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        let order = PendingOrder::from_commitment(order_id, commitment, strategy, self.current_time);
        let settlement_time = order.settlement_time();
        let expiration_time = order.expiration_time();
        let event = OrderCommittedEvent {
            order_id,
            account_id,
            market_id,
            size_delta,
            acceptable_price: order.acceptable_price,
            settlement_time,
            expiration_time,
            tracking_code: order.tracking_code.clone(),
        };

        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(EngineError::AccountNotFound(account_id))?;
        account.pending_order = Some(order);

        tracing::info!(
            order = order_id.0,
            account = account_id.0,
            market = market_id.0,
            %size_delta,
            estimated_fill = %fill,
            "order committed"
        );
        self.emit_event(EventPayload::OrderCommitted(event));

        Ok(CommitResult {
            order_id,
            settlement_time,
            expiration_time,
            estimated_fill_price: fill,
            estimated_trade_fee: trade_fee,
            estimated_keeper_fee: keeper_fee,
        })
    }

    /// Settle a pending order against a price published inside its window.
    pub fn settle_order(
        &mut self,
        keeper: Address,
        account_id: AccountId,
        price_data: PriceUpdateData,
    ) -> Result<SettlementResult, EngineError> {
        let account = self.account(account_id)?;
        let order = account
            .pending_order
            .clone()
            .ok_or(EngineError::NoPendingOrder(account_id))?;
        let market_id = order.market_id;
        let market = self.market(market_id)?;
        if price_data.feed_id != market.config.feed_id {
            return Err(OracleError::FeedMismatch {
                expected: market.config.feed_id,
                got: price_data.feed_id,
            }
            .into());
        }

        order.check_settlement_window(self.current_time)?;
        let record = price_data.decode()?;
        order.check_publish_time(record.publish_time)?;
        let price = record.price;

        let fill = calculate_fill_price(market.skew, market.config.skew_scale, order.size_delta, price)?;
        order.check_acceptable_price(fill)?;
        let fill_price = Price::new(fill).ok_or(EngineError::InvalidFillPrice(fill))?;

        let old_size = account.get_position(market_id).map(|p| p.size).unwrap_or_default();
        market.check_max_market_size(old_size.value(), old_size.checked_add(order.size_delta)?.value())?;

        let trade_fee = calculate_order_fee(market.skew, order.size_delta, fill, &market.config.fees)?;
        let keeper_fee = self.keeper_fee(KeeperAction::Settlement, order.keeper_fee_buffer)?;
        let fees = trade_fee.checked_add(keeper_fee)?;

        let mut projected = self.project_fill(account, market_id, price, fill_price, order.size_delta, fees)?;
        self.require_initial_margin(&projected.account, Some((market_id, price)))?;

        let funding = self.funding_after(market_id, price)?;
        let interest = self.interest_after(&[projected.projected_market(market_id)])?;

        // 9.2: everything checked. swap in the new state, keeping what it replaces
        let snapshot = SettlementSnapshot {
            account: account.clone(),
            market: market.clone(),
            interest: self.interest.clone(),
        };
        projected.account.pending_order = None;
        let new_size = projected.new_size;
        let realized_pnl = projected.realized_pnl;
        let skew_after = projected.skew_after;

        if let Some(market) = self.markets.get_mut(&market_id) {
            market.funding = funding;
            market.skew = projected.skew_after;
            market.size = projected.size_after;
        }
        self.interest = interest;
        self.accounts.insert(account_id, projected.account);

        let settlement_fill = SettlementFill {
            order_id: order.id,
            account_id,
            market_id,
            size_delta: order.size_delta,
            fill_price: fill_price.value(),
            new_size: new_size.value(),
            total_fees: fees,
            tracking_code: order.tracking_code.clone(),
        };
        let hook_failures = match self.hooks.run(&order.hooks, &settlement_fill) {
            Ok(failures) => failures,
            Err(failure) => {
                tracing::warn!(
                    order = order.id.0,
                    hook = failure.hook_id.0,
                    reason = %failure.reason,
                    "fatal settlement hook failed, reverting"
                );
                self.restore_settlement(account_id, market_id, snapshot);
                return Err(EngineError::SettlementHookFailed {
                    hook_id: failure.hook_id,
                    reason: failure.reason,
                });
            }
        };

        if let Err(e) = self.pay_settlement(keeper, trade_fee, keeper_fee) {
            self.restore_settlement(account_id, market_id, snapshot);
            return Err(e);
        }
        self.oracle.insert(record);

        tracing::info!(
            order = order.id.0,
            account = account_id.0,
            market = market_id.0,
            fill = %fill_price,
            new_size = %new_size,
            %trade_fee,
            %keeper_fee,
            "order settled"
        );
        self.emit_event(EventPayload::PriceUpdated(record));
        self.emit_recomputed(market_id);
        self.emit_event(EventPayload::OrderSettled(OrderSettledEvent {
            order_id: order.id,
            account_id,
            market_id,
            size_delta: order.size_delta,
            fill_price,
            new_size: new_size.value(),
            realized_pnl,
            trade_fee,
            keeper_fee,
            keeper,
            skew_after,
            tracking_code: order.tracking_code.clone(),
        }));
        for failure in &hook_failures {
            self.emit_event(EventPayload::HookFailed(HookFailedEvent {
                order_id: order.id,
                hook_id: failure.hook_id,
                reason: failure.reason.clone(),
            }));
        }

        Ok(SettlementResult {
            order_id: order.id,
            fill_price,
            new_size: new_size.value(),
            realized_pnl,
            trade_fee,
            keeper_fee,
            hook_failures,
        })
    }

    fn pay_settlement(&mut self, keeper: Address, trade_fee: Quote, keeper_fee: Quote) -> Result<(), EngineError> {
        self.ledger
            .credit(Recipient::FeeCollector, CollateralId::USD, trade_fee.value())?;
        self.ledger
            .credit(Recipient::Keeper(keeper), CollateralId::USD, keeper_fee.value())?;
        Ok(())
    }

    fn restore_settlement(&mut self, account_id: AccountId, market_id: MarketId, snapshot: SettlementSnapshot) {
        self.accounts.insert(account_id, snapshot.account);
        self.markets.insert(market_id, snapshot.market);
        self.interest = snapshot.interest;
    }

    /// Cancel a pending order. Expired orders go for free. Live ones only with a price
    /// published after the commitment that puts the fill past the acceptable price, in
    /// which case the keeper is paid out of the account.
    pub fn cancel_order(
        &mut self,
        keeper: Address,
        account_id: AccountId,
        price_data: Option<PriceUpdateData>,
    ) -> Result<CancelResult, EngineError> {
        let account = self.account(account_id)?;
        let order = account
            .pending_order
            .clone()
            .ok_or(EngineError::NoPendingOrder(account_id))?;

        if order.is_expired(self.current_time) {
            let mut updated = account.clone();
            updated.pending_order = None;
            self.accounts.insert(account_id, updated);
            return Ok(self.finish_cancel(keeper, &order, CancelReason::Expired, Quote::zero()));
        }

        let data = price_data.ok_or(EngineError::CancellationNotAllowed)?;
        let market = self.market(order.market_id)?;
        if data.feed_id != market.config.feed_id {
            return Err(OracleError::FeedMismatch {
                expected: market.config.feed_id,
                got: data.feed_id,
            }
            .into());
        }
        let record = data.decode()?;
        if record.publish_time <= order.commitment_time {
            return Err(OrderError::StalePriceData {
                publish_time: record.publish_time,
                earliest: order.commitment_time.plus_secs(1),
                latest: self.current_time,
            }
            .into());
        }

        let fill = calculate_fill_price(market.skew, market.config.skew_scale, order.size_delta, record.price)?;
        if !acceptable_price_exceeded(order.size_delta, fill, order.acceptable_price) {
            return Err(EngineError::CancellationNotAllowed);
        }

        let reward = self.keeper_fee(KeeperAction::Cancellation, Quote::zero())?;
        let mut updated = account.clone();
        updated.pending_order = None;
        updated.charge(reward.negate())?;

        self.ledger.credit(Recipient::Keeper(keeper), CollateralId::USD, reward.value())?;
        self.accounts.insert(account_id, updated);
        Ok(self.finish_cancel(keeper, &order, CancelReason::AcceptablePriceExceeded, reward))
    }

    pub(super) fn finish_cancel(&mut self, keeper: Address, order: &PendingOrder, reason: CancelReason, keeper_reward: Quote) -> CancelResult {
        tracing::info!(
            order = order.id.0,
            account = order.account_id.0,
            ?reason,
            reward = %keeper_reward,
            "order cancelled"
        );
        self.emit_event(EventPayload::OrderCancelled(OrderCancelledEvent {
            order_id: order.id,
            account_id: order.account_id,
            market_id: order.market_id,
            reason,
            keeper,
            keeper_reward,
        }));
        CancelResult {
            order_id: order.id,
            keeper_reward,
            expired: reason == CancelReason::Expired,
        }
    }

    pub fn pending_order(&self, account_id: AccountId) -> Option<&PendingOrder> {
        self.accounts.get(&account_id)?.pending_order.as_ref()
    }

    /// Lifecycle state of the account's current order. Settled and cancelled orders
    /// leave the account, so those only show up in the event log.
    pub fn order_status(&self, account_id: AccountId) -> Result<OrderStatus, EngineError> {
        let account = self.account(account_id)?;
        Ok(account
            .pending_order
            .as_ref()
            .map_or(OrderStatus::None, |order| order.status(self.current_time)))
    }
}
