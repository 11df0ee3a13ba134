// perps-risk: perpetual futures risk and settlement engine.
// skew-priced fills against a shared pool, keeper-settled delayed orders, cross margin
// over multi-asset collateral, throttled liquidation.
// all computation is deterministic; time and prices are explicit inputs.
//
// file map (search X.0 for structs, X.1+ for logic):
//   0.x  fixed.rs: checked 18-digit decimal math
//   1.x  types.rs: primitives: MarketId, AccountId, Price, Quote, SignedSize, Timestamp
//   2.x  pricing.rs: price deviation, skew-adjusted fill price
//   2.4  order.rs: delayed orders, settlement strategy, order timing checks
//   3.x  fees.rs: maker/taker trade fee, keeper rewards
//   4.x  position.rs: position struct, pnl, re-basing
//   4.5  utilization.rs: pool utilization interest
//   5.x  funding.rs: velocity-driven funding rate and accumulator
//   6.x  liquidation.rs: window capacity, iterations, throttle bypass
//   7.x  config.rs: global config, presets, file/env loader
//   8.x  engine/: orders, collateral, valuation, funding, liquidations
//   9.x  oracle.rs: price decoding and staleness
//   9.1  ledger.rs: token custody seam
//   9.2  hooks.rs: settlement hooks
//   10.x account.rs, collateral.rs: accounts, debt, collateral valuation
//   11.x events.rs: state transition events for audit
//   12.x market.rs: market config + runtime state
//   13.x margin.rs: initial and maintenance requirements
//   14.x api.rs: command/query surface

// math and pricing
pub mod fees;
pub mod fixed;
pub mod funding;
pub mod margin;
pub mod pricing;
pub mod types;
pub mod utilization;

// accounts, markets and orders
pub mod account;
pub mod collateral;
pub mod liquidation;
pub mod market;
pub mod order;
pub mod position;

// engine and its seams
pub mod api;
pub mod config;
pub mod engine;
pub mod events;
pub mod hooks;
pub mod ledger;
pub mod oracle;

// re exports for convenience
pub use account::*;
pub use collateral::*;
pub use engine::*;
pub use events::*;
pub use fees::*;
pub use fixed::*;
pub use funding::*;
pub use hooks::*;
pub use ledger::*;
pub use liquidation::*;
pub use margin::*;
pub use market::*;
pub use oracle::*;
pub use order::*;
pub use position::*;
pub use pricing::*;
pub use types::*;
pub use utilization::*;
pub use api::{ApiError, ApiResponse, EngineCommand, EngineQuery, ErrorCode, SkippedAccount};
pub use config::{load_settings, ConfigError, GlobalConfig, KeeperCostConfig, Settings};
