//! Delayed order lifecycle tests.
//!
//! Commit, settle and cancel through the engine, including settlement hooks and the
//! serialized command surface keepers drive it with.

mod common;

use common::*;
use perps_risk::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug)]
struct RejectingHook;

impl SettlementHook for RejectingHook {
    fn on_settlement(&mut self, fill: &SettlementFill) -> Result<(), HookError> {
        Err(HookError::Rejected(format!("order {} refused", fill.order_id.0)))
    }
}

fn with_hook(fatal: bool) -> (Engine, AccountId) {
    let (mut engine, account) = setup(Address(1), dec!(1000));
    engine
        .register_hook(
            ADMIN,
            HookId(1),
            Box::new(RejectingHook),
            HookConfig { fatal_on_error: fatal },
        )
        .unwrap();
    let mut order = commitment(account, dec!(100), dec!(11));
    order.hooks = vec![HookId(1)];
    engine.commit_order(Address(1), order).unwrap();
    tick(&mut engine, 2, 10);
    (engine, account)
}

mod settlement {
    use super::*;

    #[test]
    fn settles_after_delay() {
        let trader = Address(1);
        let (mut engine, account) = setup(trader, dec!(1000));

        let committed = engine
            .commit_order(trader, commitment(account, dec!(100), dec!(11)))
            .unwrap();
        assert_eq!(committed.settlement_time, Timestamp::from_secs(2));
        assert_eq!(committed.expiration_time, Timestamp::from_secs(62));
        // average of 10 and 10 * (1 + 100 / 1000)
        assert_eq!(committed.estimated_fill_price, dec!(10.5));
        assert_eq!(engine.order_status(account).unwrap(), OrderStatus::Pending);

        tick(&mut engine, 2, 10);
        let settled = engine
            .settle_order(KEEPER, account, price(SYN_FEED, 10, 2))
            .unwrap();
        assert_eq!(settled.order_id, committed.order_id);
        assert_eq!(settled.fill_price.value(), dec!(10.5));
        assert_eq!(settled.new_size, dec!(100));
        assert_eq!(settled.trade_fee.value(), dec!(6.3));
        assert!(settled.realized_pnl.is_zero());

        assert_eq!(engine.order_status(account).unwrap(), OrderStatus::None);
        assert_eq!(position_size(&engine, account), dec!(100));
        assert_eq!(engine.get_market(SYN).unwrap().skew, dec!(100));
        assert_eq!(
            engine.ledger().credited(Recipient::FeeCollector, CollateralId::USD),
            dec!(6.3)
        );
        assert_eq!(
            engine.ledger().credited(Recipient::Keeper(KEEPER), CollateralId::USD),
            settled.keeper_fee.value()
        );

        let usd = engine.get_account(account).unwrap().collateral_amount(CollateralId::USD);
        assert_eq!(usd, dec!(1000) - dec!(6.3) - settled.keeper_fee.value());
        assert!(engine
            .events()
            .iter()
            .any(|e| matches!(e.payload, EventPayload::OrderSettled(_))));
    }

    #[test]
    fn too_early_is_rejected() {
        let trader = Address(1);
        let (mut engine, account) = setup(trader, dec!(1000));
        engine
            .commit_order(trader, commitment(account, dec!(100), dec!(11)))
            .unwrap();

        tick(&mut engine, 1, 10);
        let err = engine
            .settle_order(KEEPER, account, price(SYN_FEED, 10, 1))
            .unwrap_err();
        assert!(matches!(err, EngineError::Order(OrderError::SettlementWindowNotOpen { .. })));
        assert!(err.is_retryable());
    }

    /// The price must be published inside the order's own window, not just be fresh.
    #[test]
    fn price_outside_publish_window_is_rejected() {
        let trader = Address(1);
        let (mut engine, account) = setup(trader, dec!(1000));
        engine
            .commit_order(trader, commitment(account, dec!(100), dec!(11)))
            .unwrap();

        tick(&mut engine, 2, 10);
        let err = engine
            .settle_order(KEEPER, account, price(SYN_FEED, 10, 1))
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::Order(OrderError::StalePriceData {
                publish_time: Timestamp::from_secs(1),
                earliest: Timestamp::from_secs(2),
                latest: Timestamp::from_secs(62),
            })
        );
        assert!(engine.pending_order(account).is_some());
    }

    #[test]
    fn fill_past_acceptable_price_is_rejected() {
        let trader = Address(1);
        let (mut engine, account) = setup(trader, dec!(1000));
        engine
            .commit_order(trader, commitment(account, dec!(100), dec!(11)))
            .unwrap();

        tick(&mut engine, 2, 11);
        let err = engine
            .settle_order(KEEPER, account, price(SYN_FEED, 11, 2))
            .unwrap_err();
        assert!(matches!(err, EngineError::Order(OrderError::AcceptablePriceExceeded { .. })));
        assert!(engine.pending_order(account).is_some());
        assert_eq!(engine.get_market(SYN).unwrap().skew, Decimal::ZERO);
    }

    #[test]
    fn wrong_feed_is_rejected() {
        let trader = Address(1);
        let (mut engine, account) = setup(trader, dec!(1000));
        engine
            .commit_order(trader, commitment(account, dec!(100), dec!(11)))
            .unwrap();

        tick(&mut engine, 2, 10);
        let err = engine
            .settle_order(KEEPER, account, price(ETH_FEED, 10, 2))
            .unwrap_err();
        assert!(matches!(err, EngineError::Oracle(OracleError::FeedMismatch { .. })));
    }

    #[test]
    fn expired_order_cannot_settle() {
        let trader = Address(1);
        let (mut engine, account) = setup(trader, dec!(1000));
        engine
            .commit_order(trader, commitment(account, dec!(100), dec!(11)))
            .unwrap();

        tick(&mut engine, 63, 10);
        assert_eq!(engine.order_status(account).unwrap(), OrderStatus::Expired);
        let err = engine
            .settle_order(KEEPER, account, price(SYN_FEED, 10, 62))
            .unwrap_err();
        assert!(matches!(err, EngineError::Order(OrderError::OrderExpired { .. })));
    }

    /// Closing part of a position realizes its pnl at the fill and re-bases the rest there.
    #[test]
    fn reducing_realizes_pnl() {
        let trader = Address(1);
        let (mut engine, account) = setup(trader, dec!(1000));
        trade(&mut engine, trader, account, dec!(100), 10);

        tick(&mut engine, 30, 12);
        let reduced = trade(&mut engine, trader, account, dec!(-50), 12);
        assert!(reduced.realized_pnl.is_positive());
        assert_eq!(position_size(&engine, account), dec!(50));
        assert_eq!(
            engine.position(account, SYN).unwrap().entry_price,
            reduced.fill_price
        );
    }
}

mod commitment_checks {
    use super::*;

    #[test]
    fn one_order_at_a_time() {
        let trader = Address(1);
        let (mut engine, account) = setup(trader, dec!(1000));
        engine
            .commit_order(trader, commitment(account, dec!(10), dec!(11)))
            .unwrap();
        assert_eq!(
            engine
                .commit_order(trader, commitment(account, dec!(10), dec!(11)))
                .unwrap_err(),
            EngineError::OrderAlreadyCommitted(account)
        );
    }

    #[test]
    fn empty_order_is_rejected() {
        let trader = Address(1);
        let (mut engine, account) = setup(trader, dec!(1000));
        assert_eq!(
            engine
                .commit_order(trader, commitment(account, Decimal::ZERO, dec!(11)))
                .unwrap_err(),
            EngineError::Order(OrderError::NilOrder)
        );
    }

    #[test]
    fn only_owner_and_delegates_trade() {
        let trader = Address(1);
        let delegate = Address(2);
        let (mut engine, account) = setup(trader, dec!(1000));

        assert_eq!(
            engine
                .commit_order(delegate, commitment(account, dec!(10), dec!(11)))
                .unwrap_err(),
            EngineError::Unauthorized { caller: delegate }
        );
        assert_eq!(
            engine.set_delegate(delegate, account, delegate, true),
            Err(EngineError::Unauthorized { caller: delegate })
        );

        engine.set_delegate(trader, account, delegate, true).unwrap();
        engine
            .commit_order(delegate, commitment(account, dec!(10), dec!(11)))
            .unwrap();
    }

    #[test]
    fn estimate_past_acceptable_price_is_rejected() {
        let trader = Address(1);
        let (mut engine, account) = setup(trader, dec!(1000));
        let err = engine
            .commit_order(trader, commitment(account, dec!(100), dec!(10.2)))
            .unwrap_err();
        assert!(matches!(err, EngineError::Order(OrderError::AcceptablePriceExceeded { .. })));
    }

    #[test]
    fn market_size_cap_applies() {
        let trader = Address(1);
        let (mut engine, account) = setup(trader, dec!(1000));
        let mut config = thin_market();
        config.max_market_size = dec!(50);
        engine.update_market_config(ADMIN, config).unwrap();

        let err = engine
            .commit_order(trader, commitment(account, dec!(100), dec!(11)))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Market(MarketError::MaxOpenInterestReached { .. })
        ));
    }

    #[test]
    fn disabled_strategy_blocks_commits() {
        let trader = Address(1);
        let (mut engine, account) = setup(trader, dec!(1000));
        let mut config = thin_market();
        config.settlement_strategy.disabled = true;
        engine.update_market_config(ADMIN, config).unwrap();

        assert_eq!(
            engine
                .commit_order(trader, commitment(account, dec!(10), dec!(11)))
                .unwrap_err(),
            EngineError::SettlementStrategyDisabled(SYN)
        );
    }

    #[test]
    fn hooks_must_be_registered_and_few() {
        let trader = Address(1);
        let (mut engine, account) = setup(trader, dec!(1000));

        let mut order = commitment(account, dec!(10), dec!(11));
        order.hooks = vec![HookId(5)];
        assert_eq!(
            engine.commit_order(trader, order).unwrap_err(),
            EngineError::InvalidHook(HookId(5))
        );

        let mut order = commitment(account, dec!(10), dec!(11));
        order.hooks = vec![HookId(1), HookId(2), HookId(3), HookId(4)];
        assert_eq!(
            engine.commit_order(trader, order).unwrap_err(),
            EngineError::MaxHooksExceeded { max: 3 }
        );
    }
}

mod hooks {
    use super::*;

    /// A non-fatal hook failure is reported; the settlement stands.
    #[test]
    fn non_fatal_failure_is_reported() {
        let (mut engine, account) = with_hook(false);
        let settled = engine
            .settle_order(KEEPER, account, price(SYN_FEED, 10, 2))
            .unwrap();

        assert_eq!(settled.hook_failures.len(), 1);
        assert_eq!(settled.hook_failures[0].hook_id, HookId(1));
        assert_eq!(position_size(&engine, account), dec!(100));
        assert!(engine
            .events()
            .iter()
            .any(|e| matches!(e.payload, EventPayload::HookFailed(_))));
    }

    /// A fatal hook failure puts everything back as it was before the settlement.
    #[test]
    fn fatal_failure_reverts_settlement() {
        let (mut engine, account) = with_hook(true);
        let events_before = engine.events().len();
        let market_before = engine.get_market(SYN).unwrap().clone();

        let err = engine
            .settle_order(KEEPER, account, price(SYN_FEED, 10, 2))
            .unwrap_err();
        assert!(matches!(err, EngineError::SettlementHookFailed { hook_id: HookId(1), .. }));

        assert!(engine.pending_order(account).is_some());
        assert_eq!(position_size(&engine, account), Decimal::ZERO);
        assert_eq!(
            engine.get_account(account).unwrap().collateral_amount(CollateralId::USD),
            dec!(1000)
        );
        let market = engine.get_market(SYN).unwrap();
        assert_eq!(market.skew, market_before.skew);
        assert_eq!(market.size, market_before.size);
        assert_eq!(market.funding, market_before.funding);
        assert!(engine
            .ledger()
            .credited(Recipient::FeeCollector, CollateralId::USD)
            .is_zero());
        assert_eq!(engine.events().len(), events_before);
    }

    /// Hooks deregistered after commit are reported, not fatal.
    #[test]
    fn deregistered_hook_is_skipped() {
        let (mut engine, account) = with_hook(true);
        assert!(engine.deregister_hook(ADMIN, HookId(1)).unwrap());

        let settled = engine
            .settle_order(KEEPER, account, price(SYN_FEED, 10, 2))
            .unwrap();
        assert_eq!(settled.hook_failures.len(), 1);
        assert_eq!(position_size(&engine, account), dec!(100));
    }
}

mod cancellation {
    use super::*;

    #[test]
    fn expired_order_cancels_for_free() {
        let trader = Address(1);
        let (mut engine, account) = setup(trader, dec!(1000));
        engine
            .commit_order(trader, commitment(account, dec!(10), dec!(11)))
            .unwrap();

        tick(&mut engine, 100, 10);
        let cancelled = engine.cancel_order(KEEPER, account, None).unwrap();
        assert!(cancelled.expired);
        assert!(cancelled.keeper_reward.is_zero());
        assert!(engine.pending_order(account).is_none());
        assert_eq!(
            engine.get_account(account).unwrap().collateral_amount(CollateralId::USD),
            dec!(1000)
        );
    }

    #[test]
    fn live_order_needs_a_breaking_price() {
        let trader = Address(1);
        let (mut engine, account) = setup(trader, dec!(1000));
        engine
            .commit_order(trader, commitment(account, dec!(10), dec!(11)))
            .unwrap();
        tick(&mut engine, 1, 10);

        assert_eq!(
            engine.cancel_order(KEEPER, account, None).unwrap_err(),
            EngineError::CancellationNotAllowed
        );
        // fill still under the limit
        assert_eq!(
            engine
                .cancel_order(KEEPER, account, Some(price(SYN_FEED, 10, 1)))
                .unwrap_err(),
            EngineError::CancellationNotAllowed
        );
        // published no later than the commitment
        let err = engine
            .cancel_order(KEEPER, account, Some(price(SYN_FEED, 12, 0)))
            .unwrap_err();
        assert!(matches!(err, EngineError::Order(OrderError::StalePriceData { .. })));
        assert!(engine.pending_order(account).is_some());
    }

    /// The keeper that proves the order can no longer fill is paid by the account.
    #[test]
    fn breaking_price_pays_the_keeper() {
        let trader = Address(1);
        let (mut engine, account) = setup(trader, dec!(1000));
        engine
            .commit_order(trader, commitment(account, dec!(10), dec!(11)))
            .unwrap();
        tick(&mut engine, 1, 12);

        let cancelled = engine
            .cancel_order(KEEPER, account, Some(price(SYN_FEED, 12, 1)))
            .unwrap();
        assert!(!cancelled.expired);
        assert!(cancelled.keeper_reward.is_positive());
        assert_eq!(
            engine.ledger().credited(Recipient::Keeper(KEEPER), CollateralId::USD),
            cancelled.keeper_reward.value()
        );
        assert_eq!(
            engine.get_account(account).unwrap().collateral_amount(CollateralId::USD),
            dec!(1000) - cancelled.keeper_reward.value()
        );
        assert!(engine.pending_order(account).is_none());
    }

    #[test]
    fn nothing_to_cancel() {
        let (mut engine, account) = setup(Address(1), dec!(1000));
        assert_eq!(
            engine.cancel_order(KEEPER, account, None).unwrap_err(),
            EngineError::NoPendingOrder(account)
        );
    }
}

mod api {
    use super::*;

    #[test]
    fn json_commands_drive_the_lifecycle() {
        let (mut engine, account) = setup(Address(1), dec!(1000));

        let commit: EngineCommand = serde_json::from_str(&format!(
            r#"{{"type":"commit_order","caller":1,"commitment":{{"account_id":{},"market_id":1,"size_delta":"100","acceptable_price":"11","keeper_fee_buffer":"0"}}}}"#,
            account.0
        ))
        .unwrap();
        assert!(matches!(engine.execute(commit), ApiResponse::Committed(_)));

        tick(&mut engine, 2, 10);
        let settle = EngineCommand::SettleOrder {
            keeper: KEEPER,
            account_id: account,
            price_data: price(SYN_FEED, 10, 2),
        };
        let json = serde_json::to_string(&settle).unwrap();
        assert!(json.contains(r#""type":"settle_order""#));
        let ApiResponse::Settled(settled) = engine.execute(serde_json::from_str(&json).unwrap()) else {
            panic!("expected a settlement");
        };
        assert_eq!(settled.new_size, dec!(100));

        match engine.query(EngineQuery::OrderStatus { account_id: account }) {
            ApiResponse::OrderStatus(status) => assert_eq!(status, OrderStatus::None),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn errors_come_back_as_responses() {
        let (mut engine, account) = setup(Address(1), dec!(1000));

        let response = engine.execute(EngineCommand::CancelOrder {
            keeper: KEEPER,
            account_id: account,
            price_data: None,
        });
        let ApiResponse::Error(error) = response else {
            panic!("expected an error");
        };
        assert_eq!(error.code, ErrorCode::NoPendingOrder);
        assert_eq!(error.class, ErrorClass::NotFound);
        assert!(!error.retryable);

        let encoded = serde_json::to_value(ApiResponse::Error(error)).unwrap();
        assert_eq!(encoded["type"], "error");
        assert_eq!(encoded["data"]["code"], "no_pending_order");
    }

    #[test]
    fn queries_read_without_mutating() {
        let (engine, account) = setup(Address(1), dec!(1000));
        let events = engine.events().len();

        assert!(matches!(
            engine.query(EngineQuery::FillPrice { market_id: SYN, size_delta: dec!(100) }),
            ApiResponse::FillPrice(fill) if fill == dec!(10.5)
        ));
        assert!(matches!(
            engine.query(EngineQuery::IsLiquidatable { account_id: account }),
            ApiResponse::Liquidatable(false)
        ));
        assert!(engine
            .query(EngineQuery::Market { market_id: MarketId(77) })
            .is_error());
        assert_eq!(engine.events().len(), events);
    }
}
