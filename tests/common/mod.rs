//! Shared fixtures for the integration tests.
//!
//! One thin market (`SYN`, 1000 units of depth, 100 units of liquidation capacity per
//! 10 second window) quoted off its own feed, plus an ETH feed the engine uses to price
//! keeper gas. Prices are whole numbers with exponent 0.

#![allow(dead_code)]

use perps_risk::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const ADMIN: Address = Address(0);
pub const KEEPER: Address = Address(900);
pub const ETH_FEED: FeedId = FeedId(0);
pub const SYN_FEED: FeedId = FeedId(1);
pub const SYN: MarketId = MarketId(1);
pub const ETH_COLLATERAL: CollateralId = CollateralId(1);

pub fn thin_market() -> MarketConfig {
    let mut config = MarketConfig::eth_perp(SYN, SYN_FEED);
    config.name = "SYN-PERP".to_string();
    config.skew_scale = dec!(1000);
    config.fees = OrderFees {
        maker_fee: dec!(0.004),
        taker_fee: dec!(0.006),
    };
    config.margin_params = MarginParams {
        initial_margin_ratio: dec!(0.01),
        minimum_initial_margin_ratio: dec!(0.01),
        maintenance_margin_scalar: dec!(0.5),
        minimum_position_margin: Quote::zero(),
    };
    config.liquidation_params.max_seconds_in_liquidation_window = 10;
    config.liquidation_params.max_liquidation_limit_accumulation_multiplier = dec!(1);
    config
}

pub fn price(feed_id: FeedId, whole: i64, publish_time: i64) -> PriceUpdateData {
    PriceUpdateData {
        feed_id,
        price: whole,
        confidence: 0,
        exponent: 0,
        publish_time: Timestamp::from_secs(publish_time),
    }
}

pub fn tick_with_eth(engine: &mut Engine, t: i64, eth_price: i64, syn_price: i64) {
    engine.set_time(Timestamp::from_secs(t));
    engine.update_price(&price(ETH_FEED, eth_price, t)).unwrap();
    engine.update_price(&price(SYN_FEED, syn_price, t)).unwrap();
}

/// Move the clock and publish both feeds at the new time, ETH at 2000.
pub fn tick(engine: &mut Engine, t: i64, syn_price: i64) {
    tick_with_eth(engine, t, 2000, syn_price);
}

pub fn new_engine() -> Engine {
    let mut engine = Engine::in_memory(EngineConfig::default(), GlobalConfig::default());
    engine.add_market(ADMIN, thin_market()).unwrap();
    tick(&mut engine, 0, 10);
    engine
}

pub fn fund_account(engine: &mut Engine, trader: Address, deposit: Decimal) -> AccountId {
    engine.ledger_mut().fund_wallet(trader, CollateralId::USD, deposit).unwrap();
    let account = engine.create_account(trader);
    engine
        .modify_collateral(trader, account, CollateralId::USD, deposit)
        .unwrap();
    account
}

/// Engine at t=0 with SYN at 10 and one funded account.
pub fn setup(trader: Address, deposit: Decimal) -> (Engine, AccountId) {
    let mut engine = new_engine();
    let account = fund_account(&mut engine, trader, deposit);
    (engine, account)
}

pub fn commitment(account_id: AccountId, size_delta: Decimal, acceptable: Decimal) -> OrderCommitment {
    OrderCommitment {
        account_id,
        market_id: SYN,
        size_delta,
        acceptable_price: Price::new_unchecked(acceptable),
        keeper_fee_buffer: Quote::zero(),
        hooks: vec![],
        tracking_code: None,
    }
}

/// Acceptable price that never blocks a fill in the given direction.
pub fn any_price(size_delta: Decimal) -> Decimal {
    if size_delta > Decimal::ZERO {
        dec!(1_000_000)
    } else {
        dec!(0.000001)
    }
}

/// Commit at the current time, wait out the two second delay and settle at `syn_price`.
pub fn trade(engine: &mut Engine, trader: Address, account: AccountId, size_delta: Decimal, syn_price: i64) -> SettlementResult {
    let now = engine.time().as_secs();
    engine
        .commit_order(trader, commitment(account, size_delta, any_price(size_delta)))
        .unwrap();
    tick(engine, now + 2, syn_price);
    engine
        .settle_order(KEEPER, account, price(SYN_FEED, syn_price, now + 2))
        .unwrap()
}

/// 150 long at 10.75 on 500 of collateral, settled at t=2.
pub fn leveraged_long(trader: Address) -> (Engine, AccountId) {
    let (mut engine, account) = setup(trader, dec!(500));
    engine
        .commit_order(trader, commitment(account, dec!(150), dec!(11)))
        .unwrap();
    tick(&mut engine, 2, 10);
    engine
        .settle_order(KEEPER, account, price(SYN_FEED, 10, 2))
        .unwrap();
    (engine, account)
}

pub fn liquidated_amount(result: &LiquidationResult) -> Decimal {
    result.positions.iter().map(|p| p.amount_liquidated).sum()
}

pub fn position_size(engine: &Engine, account: AccountId) -> Decimal {
    engine
        .position(account, SYN)
        .map_or(Decimal::ZERO, |p| p.size.value())
}
