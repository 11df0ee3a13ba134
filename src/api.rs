// 14.0 api.rs: serializable command/query surface over the engine. one command per
// keeper or trader entry point, responses carry either a result or a stable error code.

use crate::account::{Account, AccountValuation};
use crate::engine::{
    CancelResult, CommitResult, Engine, EngineError, ErrorClass, LiquidationCapacity, LiquidationResult,
    MarginOnlyLiquidationResult, SettlementResult,
};
use crate::events::Event;
use crate::ledger::CollateralLedger;
use crate::market::{MarketConfig, MarketState};
use crate::oracle::{OracleError, PriceRecord, PriceUpdateData};
use crate::order::{OrderCommitment, OrderError, OrderStatus};
use crate::types::{AccountId, Address, CollateralId, MarketId, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/** 14.1: state-changing requests */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineCommand {
    SetTime {
        timestamp: Timestamp,
    },
    AddMarket {
        caller: Address,
        config: MarketConfig,
    },
    UpdateMarketConfig {
        caller: Address,
        config: MarketConfig,
    },
    UpdatePrice {
        data: PriceUpdateData,
    },
    CreateAccount {
        owner: Address,
    },
    SetDelegate {
        caller: Address,
        account_id: AccountId,
        delegate: Address,
        granted: bool,
    },
    ModifyCollateral {
        caller: Address,
        account_id: AccountId,
        collateral_id: CollateralId,
        amount_delta: Decimal,
    },
    PayDebt {
        caller: Address,
        account_id: AccountId,
        amount: Quote,
    },
    CommitOrder {
        caller: Address,
        commitment: OrderCommitment,
    },
    SettleOrder {
        keeper: Address,
        account_id: AccountId,
        price_data: PriceUpdateData,
    },
    CancelOrder {
        keeper: Address,
        account_id: AccountId,
        #[serde(default)]
        price_data: Option<PriceUpdateData>,
    },
    Liquidate {
        keeper: Address,
        account_id: AccountId,
    },
    LiquidateFlagged {
        keeper: Address,
        max_accounts: usize,
    },
    LiquidateMarginOnly {
        keeper: Address,
        account_id: AccountId,
    },
}

/** 14.2: read-only requests */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineQuery {
    Account { account_id: AccountId },
    Valuation { account_id: AccountId },
    OrderStatus { account_id: AccountId },
    IsLiquidatable { account_id: AccountId },
    Market { market_id: MarketId },
    FillPrice { market_id: MarketId, size_delta: Decimal },
    OrderFees {
        market_id: MarketId,
        size_delta: Decimal,
        #[serde(default)]
        keeper_fee_buffer: Quote,
    },
    Funding { market_id: MarketId },
    LiquidationCapacity { market_id: MarketId },
    Utilization,
    RecentEvents { count: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ApiResponse {
    Ok,
    Version(u64),
    Market(MarketId),
    Price(PriceRecord),
    AccountCreated(AccountId),
    CollateralBalance(Decimal),
    RemainingDebt(Quote),
    Committed(CommitResult),
    Settled(SettlementResult),
    Cancelled(CancelResult),
    Liquidated(LiquidationResult),
    LiquidatedMany {
        liquidated: Vec<LiquidationResult>,
        skipped: Vec<SkippedAccount>,
    },
    MarginOnlyLiquidated(MarginOnlyLiquidationResult),
    Account(Box<Account>),
    Valuation(AccountValuation),
    OrderStatus(OrderStatus),
    Liquidatable(bool),
    MarketState(Box<MarketState>),
    FillPrice(Decimal),
    OrderFees { trade_fee: Quote, keeper_fee: Quote },
    Funding { rate: Decimal, velocity: Decimal },
    LiquidationCapacity(LiquidationCapacity),
    Utilization(Decimal),
    Events(Vec<Event>),
    Error(ApiError),
}

impl ApiResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, ApiResponse::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub class: ErrorClass,
    pub message: String,
    pub retryable: bool,
}

/// A flagged account a sweep couldn't touch, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedAccount {
    pub account_id: AccountId,
    pub error: ApiError,
}

impl From<&EngineError> for ApiError {
    fn from(err: &EngineError) -> Self {
        Self {
            code: ErrorCode::from(err),
            class: err.class(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// Stable error identifiers for clients. Never renumbered or renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MarketNotFound,
    MarketAlreadyExists,
    AccountNotFound,
    CollateralNotFound,
    NoPendingOrder,
    Unauthorized,
    OrderAlreadyCommitted,
    PendingOrderExists,
    AccountLiquidatable,
    PendingLiquidation,
    InsufficientMargin,
    MaxPositionsPerAccountReached,
    MaxHooksExceeded,
    InvalidHook,
    SettlementHookFailed,
    SettlementStrategyDisabled,
    InvalidFillPrice,
    CancellationNotAllowed,
    NotEligibleForLiquidation,
    MaxCollateralExceeded,
    InvalidAmount,
    NilOrder,
    SettlementWindowNotOpen,
    OrderExpired,
    StalePriceData,
    AcceptablePriceExceeded,
    PriceNotFound,
    StalePrice,
    InvalidPrice,
    FeedMismatch,
    AccountError,
    MaxOpenInterestReached,
    InvalidConfig,
    LedgerError,
    CollateralPriceMissing,
    Arithmetic,
}

impl From<&EngineError> for ErrorCode {
    fn from(err: &EngineError) -> Self {
        use crate::market::MarketError;
        match err {
            EngineError::MarketNotFound(_) => ErrorCode::MarketNotFound,
            EngineError::MarketAlreadyExists(_) => ErrorCode::MarketAlreadyExists,
            EngineError::AccountNotFound(_) => ErrorCode::AccountNotFound,
            EngineError::CollateralNotFound(_) => ErrorCode::CollateralNotFound,
            EngineError::NoPendingOrder(_) => ErrorCode::NoPendingOrder,
            EngineError::Unauthorized { .. } => ErrorCode::Unauthorized,
            EngineError::OrderAlreadyCommitted(_) => ErrorCode::OrderAlreadyCommitted,
            EngineError::PendingOrderExists(_) => ErrorCode::PendingOrderExists,
            EngineError::AccountLiquidatable(_) => ErrorCode::AccountLiquidatable,
            EngineError::PendingLiquidation(_) => ErrorCode::PendingLiquidation,
            EngineError::InsufficientMargin { .. } => ErrorCode::InsufficientMargin,
            EngineError::MaxPositionsPerAccountReached { .. } => ErrorCode::MaxPositionsPerAccountReached,
            EngineError::MaxHooksExceeded { .. } => ErrorCode::MaxHooksExceeded,
            EngineError::InvalidHook(_) => ErrorCode::InvalidHook,
            EngineError::SettlementHookFailed { .. } => ErrorCode::SettlementHookFailed,
            EngineError::SettlementStrategyDisabled(_) => ErrorCode::SettlementStrategyDisabled,
            EngineError::InvalidFillPrice(_) => ErrorCode::InvalidFillPrice,
            EngineError::CancellationNotAllowed => ErrorCode::CancellationNotAllowed,
            EngineError::NotEligibleForLiquidation(_) => ErrorCode::NotEligibleForLiquidation,
            EngineError::MaxCollateralExceeded { .. } => ErrorCode::MaxCollateralExceeded,
            EngineError::InvalidAmount(_) => ErrorCode::InvalidAmount,

            EngineError::Order(order) => match order {
                OrderError::NilOrder => ErrorCode::NilOrder,
                OrderError::SettlementWindowNotOpen { .. } => ErrorCode::SettlementWindowNotOpen,
                OrderError::OrderExpired { .. } => ErrorCode::OrderExpired,
                OrderError::StalePriceData { .. } => ErrorCode::StalePriceData,
                OrderError::AcceptablePriceExceeded { .. } => ErrorCode::AcceptablePriceExceeded,
            },
            EngineError::Oracle(oracle) => match oracle {
                OracleError::PriceNotFound(_) => ErrorCode::PriceNotFound,
                OracleError::StalePrice { .. } => ErrorCode::StalePrice,
                OracleError::InvalidPrice(_) => ErrorCode::InvalidPrice,
                OracleError::FeedMismatch { .. } => ErrorCode::FeedMismatch,
            },
            EngineError::Market(MarketError::MaxOpenInterestReached { .. }) => ErrorCode::MaxOpenInterestReached,
            EngineError::Market(MarketError::InvalidConfig(_)) | EngineError::Config(_) => ErrorCode::InvalidConfig,
            EngineError::Collateral(crate::collateral::CollateralError::MissingPrice(_)) => {
                ErrorCode::CollateralPriceMissing
            }
            EngineError::Account(_) if err.class() != ErrorClass::Arithmetic => ErrorCode::AccountError,
            EngineError::Ledger(_) if err.class() != ErrorClass::Arithmetic => ErrorCode::LedgerError,
            _ => ErrorCode::Arithmetic,
        }
    }
}

fn respond<T>(result: Result<T, EngineError>, wrap: impl FnOnce(T) -> ApiResponse) -> ApiResponse {
    match result {
        Ok(value) => wrap(value),
        Err(err) => ApiResponse::Error(ApiError::from(&err)),
    }
}

impl<L: CollateralLedger> Engine<L> {
    /** 14.3: run one command. errors come back as ApiResponse::Error, never as a panic */
    pub fn execute(&mut self, command: EngineCommand) -> ApiResponse {
        match command {
            EngineCommand::SetTime { timestamp } => {
                self.set_time(timestamp);
                ApiResponse::Ok
            }
            EngineCommand::AddMarket { caller, config } => respond(self.add_market(caller, config), ApiResponse::Market),
            EngineCommand::UpdateMarketConfig { caller, config } => {
                respond(self.update_market_config(caller, config), ApiResponse::Version)
            }
            EngineCommand::UpdatePrice { data } => respond(self.update_price(&data), ApiResponse::Price),
            EngineCommand::CreateAccount { owner } => ApiResponse::AccountCreated(self.create_account(owner)),
            EngineCommand::SetDelegate {
                caller,
                account_id,
                delegate,
                granted,
            } => respond(self.set_delegate(caller, account_id, delegate, granted), |_| ApiResponse::Ok),
            EngineCommand::ModifyCollateral {
                caller,
                account_id,
                collateral_id,
                amount_delta,
            } => respond(
                self.modify_collateral(caller, account_id, collateral_id, amount_delta),
                ApiResponse::CollateralBalance,
            ),
            EngineCommand::PayDebt {
                caller,
                account_id,
                amount,
            } => respond(self.pay_debt(caller, account_id, amount), ApiResponse::RemainingDebt),
            EngineCommand::CommitOrder { caller, commitment } => {
                respond(self.commit_order(caller, commitment), ApiResponse::Committed)
            }
            EngineCommand::SettleOrder {
                keeper,
                account_id,
                price_data,
            } => respond(self.settle_order(keeper, account_id, price_data), ApiResponse::Settled),
            EngineCommand::CancelOrder {
                keeper,
                account_id,
                price_data,
            } => respond(self.cancel_order(keeper, account_id, price_data), ApiResponse::Cancelled),
            EngineCommand::Liquidate { keeper, account_id } => {
                respond(self.liquidate(keeper, account_id), ApiResponse::Liquidated)
            }
            EngineCommand::LiquidateFlagged { keeper, max_accounts } => {
                let sweep = self.liquidate_flagged(keeper, max_accounts);
                ApiResponse::LiquidatedMany {
                    liquidated: sweep.liquidated,
                    skipped: sweep
                        .skipped
                        .iter()
                        .map(|(account_id, err)| SkippedAccount {
                            account_id: *account_id,
                            error: ApiError::from(err),
                        })
                        .collect(),
                }
            }
            EngineCommand::LiquidateMarginOnly { keeper, account_id } => respond(
                self.liquidate_margin_only(keeper, account_id),
                ApiResponse::MarginOnlyLiquidated,
            ),
        }
    }

    pub fn query(&self, query: EngineQuery) -> ApiResponse {
        match query {
            EngineQuery::Account { account_id } => respond(
                self.get_account(account_id)
                    .cloned()
                    .ok_or(EngineError::AccountNotFound(account_id)),
                |account| ApiResponse::Account(Box::new(account)),
            ),
            EngineQuery::Valuation { account_id } => {
                respond(self.account_valuation(account_id), ApiResponse::Valuation)
            }
            EngineQuery::OrderStatus { account_id } => respond(self.order_status(account_id), ApiResponse::OrderStatus),
            EngineQuery::IsLiquidatable { account_id } => {
                respond(self.is_liquidatable(account_id), ApiResponse::Liquidatable)
            }
            EngineQuery::Market { market_id } => respond(
                self.get_market(market_id)
                    .cloned()
                    .ok_or(EngineError::MarketNotFound(market_id)),
                |market| ApiResponse::MarketState(Box::new(market)),
            ),
            EngineQuery::FillPrice { market_id, size_delta } => {
                respond(self.quote_fill_price(market_id, size_delta), ApiResponse::FillPrice)
            }
            EngineQuery::OrderFees {
                market_id,
                size_delta,
                keeper_fee_buffer,
            } => respond(
                self.quote_order_fees(market_id, size_delta, keeper_fee_buffer),
                |(trade_fee, keeper_fee)| ApiResponse::OrderFees { trade_fee, keeper_fee },
            ),
            EngineQuery::Funding { market_id } => respond(
                self.current_funding_rate(market_id)
                    .and_then(|rate| Ok((rate, self.current_funding_velocity(market_id)?))),
                |(rate, velocity)| ApiResponse::Funding { rate, velocity },
            ),
            EngineQuery::LiquidationCapacity { market_id } => {
                respond(self.liquidation_capacity(market_id), ApiResponse::LiquidationCapacity)
            }
            EngineQuery::Utilization => respond(self.current_utilization(), ApiResponse::Utilization),
            EngineQuery::RecentEvents { count } => ApiResponse::Events(self.recent_events(count).to_vec()),
        }
    }
}
