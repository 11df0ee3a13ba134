//! Perps risk engine simulation.
//!
//! Walks the engine through a delayed order lifecycle, cancellations, and a throttled
//! liquidation of an account whose position the market can't absorb in one go.
//!
//! Every scenario starts from the engine settings in `PERPS_CONFIG` (default
//! `perps.toml`, defaults when missing, `PERPS_` env vars on top) with the SYN market
//! added or replaced. `RUST_LOG=perps_risk=debug` shows the engine's own logging.

use perps_risk::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

const KEEPER: Address = Address(900);
const SYN_FEED: FeedId = FeedId(1);
const SYN: MarketId = MarketId(1);

fn main() -> Result<(), EngineError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Perps Risk Engine Simulation");
    println!("Skew-priced market, delayed orders, throttled liquidation\n");

    let path = std::env::var("PERPS_CONFIG").unwrap_or_else(|_| "perps.toml".to_string());
    let settings = load_settings(&path)?;
    println!(
        "Settings from {path}: {} extra market(s), {} collateral(s), run started at {}\n",
        settings.markets.len(),
        settings.collaterals.len(),
        Timestamp::now().as_secs()
    );

    scenario_1_order_lifecycle(&settings)?;
    scenario_2_cancellations(&settings)?;
    scenario_3_liquidation_cascade(&settings)?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

// thin market: 1000 units of depth, 10s liquidation window, capacity 100 per window
fn thin_market() -> MarketConfig {
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

fn price(feed_id: FeedId, whole: i64, publish_time: i64) -> PriceUpdateData {
    PriceUpdateData {
        feed_id,
        price: whole,
        confidence: 0,
        exponent: 0,
        publish_time: Timestamp::from_secs(publish_time),
    }
}

// moves the clock and publishes both feeds at the new time
fn tick(engine: &mut Engine, t: i64, syn_price: i64) -> Result<(), EngineError> {
    let eth_feed = engine.global_config().keeper_costs.eth_feed_id;
    engine.set_time(Timestamp::from_secs(t));
    engine.update_price(&price(eth_feed, 2000, t))?;
    engine.update_price(&price(SYN_FEED, syn_price, t))?;
    Ok(())
}

fn setup(settings: &Settings, trader: Address, deposit: Decimal) -> Result<(Engine, AccountId), EngineError> {
    let mut engine = Engine::from_settings(settings.clone())?;
    let admin = settings.engine.admin;
    if engine.get_market(SYN).is_some() {
        engine.update_market_config(admin, thin_market())?;
    } else {
        engine.add_market(admin, thin_market())?;
    }
    engine.ledger_mut().fund_wallet(trader, CollateralId::USD, deposit)?;
    tick(&mut engine, 0, 10)?;

    let account = engine.create_account(trader);
    engine.modify_collateral(trader, account, CollateralId::USD, deposit)?;
    Ok((engine, account))
}

fn commitment(account_id: AccountId, size_delta: Decimal, acceptable: Decimal) -> OrderCommitment {
    OrderCommitment {
        account_id,
        market_id: SYN,
        size_delta,
        acceptable_price: Price::new_unchecked(acceptable),
        keeper_fee_buffer: Quote::zero(),
        hooks: vec![],
        tracking_code: Some("sim".to_string()),
    }
}

/// Commit, wait out the delay, settle, then close.
fn scenario_1_order_lifecycle(settings: &Settings) -> Result<(), EngineError> {
    println!("Scenario 1: Delayed Order Lifecycle\n");

    let alice = Address(1);
    let (mut engine, account) = setup(settings, alice, dec!(1000))?;

    let quote = engine.quote_fill_price(SYN, dec!(100))?;
    println!("  Alice deposits $1,000; oracle at $10, quoted fill for +100 is ${quote}");

    let committed = engine.commit_order(alice, commitment(account, dec!(100), dec!(11)))?;
    println!(
        "  Order {} committed, settleable from {} until {}",
        committed.order_id.0, committed.settlement_time, committed.expiration_time
    );

    tick(&mut engine, 2, 10)?;
    let settled = engine.settle_order(KEEPER, account, price(SYN_FEED, 10, 2))?;
    println!(
        "  Settled at ${}: size {}, trade fee ${}, keeper fee ${}",
        settled.fill_price, settled.new_size, settled.trade_fee, settled.keeper_fee
    );

    tick(&mut engine, 60, 12)?;
    let valuation = engine.account_valuation(account)?;
    println!(
        "  Oracle moves to $12: pnl ${}, available margin ${}",
        valuation.total_pnl, valuation.available_margin
    );

    engine.commit_order(alice, commitment(account, dec!(-100), dec!(11)))?;
    tick(&mut engine, 63, 12)?;
    let closed = engine.settle_order(KEEPER, account, price(SYN_FEED, 12, 63))?;
    let usd = engine
        .get_account(account)
        .map_or(Decimal::ZERO, |a| a.collateral_amount(CollateralId::USD));
    println!("  Closed at ${}: realized ${}, balance ${usd}\n", closed.fill_price, closed.realized_pnl);
    Ok(())
}

/// Expired orders cancel for free; a live one only once a newer price breaks its limit.
fn scenario_2_cancellations(settings: &Settings) -> Result<(), EngineError> {
    println!("Scenario 2: Cancellations\n");

    let bob = Address(2);
    let (mut engine, account) = setup(settings, bob, dec!(1000))?;

    engine.commit_order(bob, commitment(account, dec!(10), dec!(11)))?;
    tick(&mut engine, 100, 10)?;
    let expired = engine.cancel_order(KEEPER, account, None)?;
    println!("  Expired order cancelled, keeper reward ${}", expired.keeper_reward);

    engine.commit_order(bob, commitment(account, dec!(10), dec!(11)))?;
    tick(&mut engine, 101, 12)?;
    let cancelled = engine.cancel_order(KEEPER, account, Some(price(SYN_FEED, 12, 101)))?;
    println!(
        "  Price jumps to $12 past the $11 limit: cancelled, keeper paid ${} by the account\n",
        cancelled.keeper_reward
    );
    Ok(())
}

/// 150 long at ~$10.75 when the price collapses to $1. The market can only absorb
/// 100 units per 10 second window, so the unwind takes two windows.
fn scenario_3_liquidation_cascade(settings: &Settings) -> Result<(), EngineError> {
    println!("Scenario 3: Throttled Liquidation\n");

    let carol = Address(3);
    let (mut engine, account) = setup(settings, carol, dec!(500))?;

    engine.commit_order(carol, commitment(account, dec!(150), dec!(11)))?;
    tick(&mut engine, 2, 10)?;
    engine.settle_order(KEEPER, account, price(SYN_FEED, 10, 2))?;

    tick(&mut engine, 2, 1)?;
    let valuation = engine.account_valuation(account)?;
    println!(
        "  Price falls to $1: available ${}, maintenance ${}",
        valuation.available_margin, valuation.required_maintenance_margin
    );

    let first = engine.liquidate(KEEPER, account)?;
    print_liquidation("t=2", &first);

    let second = engine.liquidate(KEEPER, account)?;
    print_liquidation("t=2 again", &second);

    tick(&mut engine, 13, 1)?;
    let third = engine.liquidate(KEEPER, account)?;
    print_liquidation("t=13", &third);

    let pool = engine.ledger().credited(Recipient::LiquidityPool, CollateralId::USD);
    let market = engine.get_market(SYN).map_or(Decimal::ZERO, |m| m.skew);
    println!("  Pool received ${pool} of seized collateral, market skew back to {market}");
    Ok(())
}

fn print_liquidation(label: &str, result: &LiquidationResult) {
    let amount: Decimal = result.positions.iter().map(|p| p.amount_liquidated).sum();
    println!(
        "  Liquidate at {label}: closed {amount}, reward ${}, flagged {}, done {}",
        result.reward, result.flagged, result.fully_liquidated
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenarios_run_on_loaded_settings() {
        let mut settings = Settings::default();
        settings.engine.admin = Address(42);
        settings.global.keeper_costs.eth_feed_id = FeedId(7);
        settings.markets.push(MarketConfig::eth_perp(SYN, FeedId(3)));

        scenario_1_order_lifecycle(&settings).unwrap();
        scenario_2_cancellations(&settings).unwrap();
        scenario_3_liquidation_cascade(&settings).unwrap();
    }

    #[test]
    fn scenarios_run_on_defaults() {
        let settings = load_settings("does/not/exist.toml").unwrap();
        scenario_3_liquidation_cascade(&settings).unwrap();
    }
}
