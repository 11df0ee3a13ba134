//! Delayed orders.
//!
//! An order is committed now and settled later by a keeper, against a price
//! published after the commitment. This removes the trader's option to trade
//! on a price they already know. Timing rules live on [`SettlementStrategy`],
//! snapshotted into the order at commit so later config changes can't strand it.

use crate::pricing::acceptable_price_exceeded;
use crate::types::{AccountId, HookId, MarketId, OrderId, Price, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Timing rules for settling a committed order, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementStrategy {
    /// Minimum age before an order may settle.
    pub settlement_delay: i64,
    /// How long after `settlement_delay` the order stays settleable.
    pub settlement_window_duration: i64,
    /// Accepted publish times, as offsets from the settlement time.
    pub price_window_min: i64,
    pub price_window_max: i64,
    pub disabled: bool,
}

impl Default for SettlementStrategy {
    fn default() -> Self {
        Self {
            settlement_delay: 2,
            settlement_window_duration: 60,
            price_window_min: 0,
            price_window_max: 60,
            disabled: false,
        }
    }
}

/// What a trader asks for. Validated and snapshotted into a [`PendingOrder`] at commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCommitment {
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub size_delta: Decimal,
    pub acceptable_price: Price,
    pub keeper_fee_buffer: Quote,
    #[serde(default)]
    pub hooks: Vec<HookId>,
    #[serde(default)]
    pub tracking_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub id: OrderId,
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub size_delta: Decimal,
    pub acceptable_price: Price,
    pub commitment_time: Timestamp,
    pub keeper_fee_buffer: Quote,
    pub hooks: Vec<HookId>,
    pub tracking_code: Option<String>,
    pub strategy: SettlementStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    None,
    Pending,
    // past its window, waiting to be cancelled
    Expired,
    Settled,
    Cancelled,
}

impl PendingOrder {
    pub fn from_commitment(
        id: OrderId,
        commitment: OrderCommitment,
        strategy: SettlementStrategy,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            account_id: commitment.account_id,
            market_id: commitment.market_id,
            size_delta: commitment.size_delta,
            acceptable_price: commitment.acceptable_price,
            commitment_time: now,
            keeper_fee_buffer: commitment.keeper_fee_buffer,
            hooks: commitment.hooks,
            tracking_code: commitment.tracking_code,
            strategy,
        }
    }

    pub fn settlement_time(&self) -> Timestamp {
        self.commitment_time.plus_secs(self.strategy.settlement_delay)
    }

    pub fn expiration_time(&self) -> Timestamp {
        self.settlement_time().plus_secs(self.strategy.settlement_window_duration)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expiration_time()
    }

    pub fn status(&self, now: Timestamp) -> OrderStatus {
        if self.is_expired(now) {
            OrderStatus::Expired
        } else {
            OrderStatus::Pending
        }
    }

    // 2.4: settleable between settlement time and expiry, both inclusive
    pub fn check_settlement_window(&self, now: Timestamp) -> Result<(), OrderError> {
        let settlement_time = self.settlement_time();
        if now < settlement_time {
            return Err(OrderError::SettlementWindowNotOpen { now, settlement_time });
        }
        let expiration_time = self.expiration_time();
        if now > expiration_time {
            return Err(OrderError::OrderExpired { now, expiration_time });
        }
        Ok(())
    }

    pub fn check_publish_time(&self, publish_time: Timestamp) -> Result<(), OrderError> {
        let settlement_time = self.settlement_time();
        let earliest = settlement_time.plus_secs(self.strategy.price_window_min);
        let latest = settlement_time.plus_secs(self.strategy.price_window_max);
        if publish_time < earliest || publish_time > latest {
            return Err(OrderError::StalePriceData {
                publish_time,
                earliest,
                latest,
            });
        }
        Ok(())
    }

    pub fn check_acceptable_price(&self, fill_price: Decimal) -> Result<(), OrderError> {
        if acceptable_price_exceeded(self.size_delta, fill_price, self.acceptable_price) {
            return Err(OrderError::AcceptablePriceExceeded {
                fill_price,
                acceptable_price: self.acceptable_price,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("Order size delta is zero")]
    NilOrder,

    #[error("Settlement window not open: now {now}, opens at {settlement_time}")]
    SettlementWindowNotOpen { now: Timestamp, settlement_time: Timestamp },

    #[error("Order expired: now {now}, expired at {expiration_time}")]
    OrderExpired { now: Timestamp, expiration_time: Timestamp },

    #[error("Price published at {publish_time} outside [{earliest}, {latest}]")]
    StalePriceData {
        publish_time: Timestamp,
        earliest: Timestamp,
        latest: Timestamp,
    },

    #[error("Fill price {fill_price} exceeds acceptable price {acceptable_price}")]
    AcceptablePriceExceeded { fill_price: Decimal, acceptable_price: Price },
}
