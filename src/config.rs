// 7.0 config.rs: engine-wide settings. keeper economics, price staleness, utilization,
// per-account limits. per-market params live on MarketConfig, per-collateral on
// CollateralConfig.
// 7.1 Settings + load_settings: the whole startup config from a TOML file and PERPS_ env vars.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::collateral::CollateralConfig;
use crate::engine::EngineConfig;
use crate::fees::{KeeperGasUnits, KeeperRewardParams};
use crate::market::MarketConfig;
use crate::oracle::StalenessConfig;
use crate::types::{FeedId, Quote};
use crate::utilization::UtilizationParams;

/** 7.2: what a keeper's transaction costs and how it gets paid back */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperCostConfig {
    // base fee per gas in wei
    pub base_fee_per_gas: Decimal,
    // feed used to convert gas cost to usd
    pub eth_feed_id: FeedId,
    pub gas_units: KeeperGasUnits,
    pub rewards: KeeperRewardParams,
}

impl Default for KeeperCostConfig {
    fn default() -> Self {
        Self {
            base_fee_per_gas: dec!(1_000_000_000), // 1 gwei
            eth_feed_id: FeedId(0),
            gas_units: KeeperGasUnits::default(),
            rewards: KeeperRewardParams::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub keeper_costs: KeeperCostConfig,
    pub staleness: StalenessConfig,
    pub utilization: UtilizationParams,
    // pool collateral backing open interest
    pub delegated_collateral: Quote,
    pub max_positions_per_account: usize,
    pub max_hooks_per_order: usize,
    // share of seized collateral value paid for a margin-only liquidation
    pub margin_only_reward_ratio: Decimal,
    #[serde(default)]
    pub version: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            keeper_costs: KeeperCostConfig::default(),
            staleness: StalenessConfig::default(),
            utilization: UtilizationParams::default(),
            delegated_collateral: Quote::new(dec!(10_000_000)),
            max_positions_per_account: 10,
            max_hooks_per_order: 3,
            margin_only_reward_ratio: dec!(0.001),
            version: 0,
        }
    }
}

impl GlobalConfig {
    // looser staleness and cheaper gas for test deployments
    pub fn testnet() -> Self {
        let mut config = Self::default();
        config.keeper_costs.base_fee_per_gas = dec!(100_000_000); // 0.1 gwei
        config.staleness.default_max_age_secs = 300;
        config.staleness.strict_max_age_secs = 30;
        config.max_positions_per_account = 20;
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rewards = &self.keeper_costs.rewards;
        if rewards.min_keeper_reward_usd > rewards.max_keeper_reward_usd {
            return Err(ConfigError::Invalid("min keeper reward exceeds max".to_string()));
        }
        if rewards.profit_margin_percent < Decimal::ZERO || rewards.profit_margin_usd < Decimal::ZERO {
            return Err(ConfigError::Invalid("keeper profit margins must not be negative".to_string()));
        }
        if self.staleness.strict_max_age_secs > self.staleness.default_max_age_secs {
            return Err(ConfigError::Invalid("strict staleness must not exceed default".to_string()));
        }
        let bp = self.utilization.gradient_breakpoint;
        if bp < Decimal::ZERO || bp > Decimal::ONE {
            return Err(ConfigError::Invalid("utilization breakpoint must be in [0, 1]".to_string()));
        }
        if self.delegated_collateral.is_negative() {
            return Err(ConfigError::Invalid("delegated collateral must not be negative".to_string()));
        }
        if self.max_positions_per_account == 0 {
            return Err(ConfigError::Invalid("max positions per account must be positive".to_string()));
        }
        Ok(())
    }
}

/// Everything needed to start an engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub engine: EngineConfig,
    pub global: GlobalConfig,
    #[serde(default)]
    pub collaterals: Vec<CollateralConfig>,
    #[serde(default)]
    pub markets: Vec<MarketConfig>,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.global.validate()?;
        for market in &self.markets {
            market
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("market {}: {e}", market.name)))?;
        }
        Ok(())
    }
}

/// Defaults, overlaid with `path` if it exists, overlaid with `PERPS_` env vars
/// (`__` separates nesting, e.g. `PERPS_GLOBAL__MAX_HOOKS_PER_ORDER=5`).
pub fn load_settings(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path.as_ref()))
        .merge(Env::prefixed("PERPS_").split("__"))
        .extract()
        .map_err(|e| ConfigError::Load(e.to_string()))?;
    settings.validate()?;
    Ok(settings)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to load config: {0}")]
    Load(String),
}
