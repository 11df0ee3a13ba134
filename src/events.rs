// 11.0: every state change produces an event. used for audit trails, keeper monitoring
// and indexing. the EventPayload enum lists all event types.

use crate::oracle::PriceRecord;
use crate::types::{AccountId, Address, CollateralId, HookId, MarketId, OrderId, Price, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Config events
    MarketCreated(MarketConfigEvent),
    MarketConfigUpdated(MarketConfigEvent),
    CollateralConfigured(CollateralConfiguredEvent),
    GlobalConfigUpdated(GlobalConfigUpdatedEvent),

    // Account events
    AccountCreated(AccountCreatedEvent),
    DelegateUpdated(DelegateUpdatedEvent),
    CollateralModified(CollateralModifiedEvent),
    DebtPaid(DebtPaidEvent),

    // Order events
    OrderCommitted(OrderCommittedEvent),
    OrderSettled(OrderSettledEvent),
    OrderCancelled(OrderCancelledEvent),
    HookFailed(HookFailedEvent),

    // Market data events
    PriceUpdated(PriceRecord),
    FundingRecomputed(FundingRecomputedEvent),
    InterestRecomputed(InterestRecomputedEvent),

    // Risk events
    AccountFlagged(AccountFlaggedEvent),
    PositionLiquidated(PositionLiquidatedEvent),
    AccountLiquidated(AccountLiquidatedEvent),
    MarginOnlyLiquidated(MarginOnlyLiquidatedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfigEvent {
    pub market_id: MarketId,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralConfiguredEvent {
    pub collateral_id: CollateralId,
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfigUpdatedEvent {
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCreatedEvent {
    pub account_id: AccountId,
    pub owner: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateUpdatedEvent {
    pub account_id: AccountId,
    pub delegate: Address,
    pub granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralModifiedEvent {
    pub account_id: AccountId,
    pub collateral_id: CollateralId,
    // positive deposit, negative withdrawal
    pub amount_delta: Decimal,
    pub new_balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtPaidEvent {
    pub account_id: AccountId,
    pub amount: Quote,
    pub remaining_debt: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCommittedEvent {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub size_delta: Decimal,
    pub acceptable_price: Price,
    pub settlement_time: Timestamp,
    pub expiration_time: Timestamp,
    pub tracking_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSettledEvent {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub size_delta: Decimal,
    pub fill_price: Price,
    pub new_size: Decimal,
    pub realized_pnl: Quote,
    pub trade_fee: Quote,
    pub keeper_fee: Quote,
    pub keeper: Address,
    pub skew_after: Decimal,
    pub tracking_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    Expired,
    AcceptablePriceExceeded,
    // dropped when the account was flagged or its collateral seized
    Liquidated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub reason: CancelReason,
    pub keeper: Address,
    pub keeper_reward: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookFailedEvent {
    pub order_id: OrderId,
    pub hook_id: HookId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingRecomputedEvent {
    pub market_id: MarketId,
    pub skew: Decimal,
    pub funding_rate: Decimal,
    pub funding_value: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestRecomputedEvent {
    pub interest_rate: Decimal,
    pub accrued_index: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountFlaggedEvent {
    pub account_id: AccountId,
    pub keeper: Address,
    pub seized: Vec<(CollateralId, Decimal)>,
    pub debt_cleared: Quote,
    pub available_margin: Quote,
    pub required_maintenance_margin: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLiquidatedEvent {
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub amount_liquidated: Decimal,
    pub remaining_size: Decimal,
    pub price: Price,
    pub skew_after: Decimal,
    pub throttle_bypassed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountLiquidatedEvent {
    pub account_id: AccountId,
    pub keeper: Address,
    pub reward: Quote,
    pub fully_liquidated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginOnlyLiquidatedEvent {
    pub account_id: AccountId,
    pub keeper: Address,
    pub seized_value: Quote,
    pub debt_cleared: Quote,
    pub reward: Quote,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn events_serialize_with_payload_tag() {
        let event = Event::new(
            EventId(3),
            Timestamp::from_secs(1000),
            EventPayload::PositionLiquidated(PositionLiquidatedEvent {
                account_id: AccountId(42),
                market_id: MarketId(1),
                amount_liquidated: dec!(100),
                remaining_size: dec!(50),
                price: Price::new_unchecked(dec!(1)),
                skew_after: dec!(50),
                throttle_bypassed: false,
            }),
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("PositionLiquidated"));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, EventId(3));
    }
}
