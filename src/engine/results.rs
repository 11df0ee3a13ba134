// 8.0.2: result types and errors for engine operations.

use crate::account::AccountError;
use crate::collateral::CollateralError;
use crate::config::ConfigError;
use crate::fixed::ArithmeticError;
use crate::hooks::HookFailure;
use crate::ledger::LedgerError;
use crate::market::MarketError;
use crate::oracle::OracleError;
use crate::order::OrderError;
use crate::types::{AccountId, Address, CollateralId, HookId, MarketId, OrderId, Price, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResult {
    pub order_id: OrderId,
    pub settlement_time: Timestamp,
    pub expiration_time: Timestamp,
    pub estimated_fill_price: Decimal,
    pub estimated_trade_fee: Quote,
    pub estimated_keeper_fee: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementResult {
    pub order_id: OrderId,
    pub fill_price: Price,
    pub new_size: Decimal,
    pub realized_pnl: Quote,
    pub trade_fee: Quote,
    pub keeper_fee: Quote,
    pub hook_failures: Vec<HookFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResult {
    pub order_id: OrderId,
    pub keeper_reward: Quote,
    pub expired: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLiquidation {
    pub market_id: MarketId,
    pub amount_liquidated: Decimal,
    pub remaining_size: Decimal,
    pub price: Price,
    pub throttle_bypassed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationResult {
    pub account_id: AccountId,
    pub keeper: Address,
    // true when this call flagged the account
    pub flagged: bool,
    pub reward: Quote,
    pub positions: Vec<PositionLiquidation>,
    pub fully_liquidated: bool,
}

impl LiquidationResult {
    pub(super) fn noop(account_id: AccountId, keeper: Address, fully_liquidated: bool) -> Self {
        Self {
            account_id,
            keeper,
            flagged: false,
            reward: Quote::zero(),
            positions: Vec::new(),
            fully_liquidated,
        }
    }

    // nothing moved, nothing paid
    pub fn is_noop(&self) -> bool {
        !self.flagged && self.positions.is_empty()
    }
}

/// One sweep over flagged accounts. Every account is settled on its own: a failed one
/// is left exactly as it was and listed in `skipped`.
#[derive(Debug, Clone, Default)]
pub struct FlaggedLiquidations {
    pub liquidated: Vec<LiquidationResult>,
    pub skipped: Vec<(AccountId, EngineError)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginOnlyLiquidationResult {
    pub account_id: AccountId,
    pub seized_value: Quote,
    pub debt_cleared: Quote,
    pub reward: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationCapacity {
    pub market_id: MarketId,
    // None when the market is unthrottled
    pub max_per_window: Option<Decimal>,
    pub used: Decimal,
    pub remaining: Option<Decimal>,
    pub window_start: Timestamp,
}

/// Broad retry semantics of an error, for callers that only need to know what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    // retry later with fresher data or after a delay
    Staleness,
    // a configuration or overflow bug, not caller error
    Arithmetic,
    Authorization,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Market {0:?} not found")]
    MarketNotFound(MarketId),

    #[error("Market {0:?} already exists")]
    MarketAlreadyExists(MarketId),

    #[error("Account {0:?} not found")]
    AccountNotFound(AccountId),

    #[error("Collateral {0:?} not configured")]
    CollateralNotFound(CollateralId),

    #[error("No pending order for account {0:?}")]
    NoPendingOrder(AccountId),

    #[error("{caller:?} is not authorized")]
    Unauthorized { caller: Address },

    #[error("Account {0:?} already has a pending order")]
    OrderAlreadyCommitted(AccountId),

    #[error("Account {0:?} has a pending order")]
    PendingOrderExists(AccountId),

    #[error("Account {0:?} is liquidatable")]
    AccountLiquidatable(AccountId),

    #[error("Account {0:?} is flagged for liquidation")]
    PendingLiquidation(AccountId),

    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: Quote, available: Quote },

    #[error("Max positions per account reached: {max}")]
    MaxPositionsPerAccountReached { max: usize },

    #[error("Too many hooks: max {max}")]
    MaxHooksExceeded { max: usize },

    #[error("Hook {0:?} is not registered")]
    InvalidHook(HookId),

    #[error("Settlement hook {hook_id:?} failed: {reason}")]
    SettlementHookFailed { hook_id: HookId, reason: String },

    #[error("Settlement strategy disabled for market {0:?}")]
    SettlementStrategyDisabled(MarketId),

    #[error("Fill price {0} is not a valid price")]
    InvalidFillPrice(Decimal),

    #[error("Order is neither expired nor priced outside its acceptable price")]
    CancellationNotAllowed,

    #[error("Account {0:?} is not eligible for liquidation")]
    NotEligibleForLiquidation(AccountId),

    #[error("Collateral {collateral_id:?} cap exceeded: max {max}, requested {requested}")]
    MaxCollateralExceeded {
        collateral_id: CollateralId,
        max: Decimal,
        requested: Decimal,
    },

    #[error("Amount must be non-zero and positive where required: {0}")]
    InvalidAmount(Decimal),

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Market error: {0}")]
    Market(#[from] MarketError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Collateral error: {0}")]
    Collateral(#[from] CollateralError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::MarketNotFound(_)
            | EngineError::AccountNotFound(_)
            | EngineError::CollateralNotFound(_)
            | EngineError::NoPendingOrder(_) => ErrorClass::NotFound,

            EngineError::Unauthorized { .. } => ErrorClass::Authorization,

            EngineError::Order(OrderError::SettlementWindowNotOpen { .. })
            | EngineError::Order(OrderError::StalePriceData { .. })
            | EngineError::Oracle(OracleError::StalePrice { .. })
            | EngineError::Oracle(OracleError::PriceNotFound(_)) => ErrorClass::Staleness,

            EngineError::Arithmetic(_)
            | EngineError::Account(AccountError::Arithmetic(_))
            | EngineError::Market(MarketError::Arithmetic(_))
            | EngineError::Ledger(LedgerError::Arithmetic(_))
            | EngineError::Collateral(CollateralError::Arithmetic(_)) => ErrorClass::Arithmetic,

            EngineError::Collateral(CollateralError::MissingPrice(_)) => ErrorClass::Staleness,

            _ => ErrorClass::Validation,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Staleness
    }
}
