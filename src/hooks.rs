//! Settlement hooks.
//!
//! Orders can name hooks to run once their fill has been applied, for example to
//! chain a follow-up action or notify an integrator. A hook registered as fatal
//! reverts the whole settlement when it fails; a non-fatal one is logged and reported.

use crate::types::{AccountId, HookId, MarketId, OrderId, Quote};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// What a hook sees of a settled order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementFill {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub market_id: MarketId,
    pub size_delta: Decimal,
    pub fill_price: Decimal,
    pub new_size: Decimal,
    pub total_fees: Quote,
    pub tracking_code: Option<String>,
}

pub trait SettlementHook: Debug + Send {
    fn on_settlement(&mut self, fill: &SettlementFill) -> Result<(), HookError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookConfig {
    pub fatal_on_error: bool,
}

#[derive(Debug)]
struct RegisteredHook {
    hook: Box<dyn SettlementHook>,
    config: HookConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookFailure {
    pub hook_id: HookId,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct HookRegistry {
    hooks: BTreeMap<HookId, RegisteredHook>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook_id: HookId, hook: Box<dyn SettlementHook>, config: HookConfig) {
        self.hooks.insert(hook_id, RegisteredHook { hook, config });
    }

    pub fn deregister(&mut self, hook_id: HookId) -> bool {
        self.hooks.remove(&hook_id).is_some()
    }

    pub fn contains(&self, hook_id: HookId) -> bool {
        self.hooks.contains_key(&hook_id)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run hooks in the order listed. Stops at the first fatal failure; non-fatal
    /// failures are collected and returned.
    pub fn run(&mut self, hook_ids: &[HookId], fill: &SettlementFill) -> Result<Vec<HookFailure>, HookFailure> {
        let mut failures = Vec::new();
        for hook_id in hook_ids {
            let Some(registered) = self.hooks.get_mut(hook_id) else {
                // deregistered after commit
                failures.push(HookFailure {
                    hook_id: *hook_id,
                    reason: "hook no longer registered".to_string(),
                });
                continue;
            };

            if let Err(e) = registered.hook.on_settlement(fill) {
                let failure = HookFailure {
                    hook_id: *hook_id,
                    reason: e.to_string(),
                };
                if registered.config.fatal_on_error {
                    return Err(failure);
                }
                tracing::warn!(hook = hook_id.0, order = fill.order_id.0, reason = %failure.reason, "settlement hook failed");
                failures.push(failure);
            }
        }
        Ok(failures)
    }
}

/// Hook that keeps every fill it sees.
#[derive(Debug, Clone, Default)]
pub struct RecordingHook {
    pub fills: Vec<SettlementFill>,
}

impl SettlementHook for RecordingHook {
    fn on_settlement(&mut self, fill: &SettlementFill) -> Result<(), HookError> {
        self.fills.push(fill.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    #[error("hook rejected settlement: {0}")]
    Rejected(String),
}
