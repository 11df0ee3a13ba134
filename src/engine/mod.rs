// 8.0: core risk engine. coordinates order commitment and settlement, collateral,
// valuation, funding and interest accrual, and liquidations.
// deterministic: time and prices are explicit inputs, no background work.

mod collateral;
mod config;
mod core;
mod funding;
mod liquidations;
mod orders;
mod positions;
mod pricing;
mod results;
mod valuation;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{
    CancelResult, CommitResult, EngineError, ErrorClass, FlaggedLiquidations, LiquidationCapacity, LiquidationResult,
    MarginOnlyLiquidationResult, PositionLiquidation, SettlementResult,
};
