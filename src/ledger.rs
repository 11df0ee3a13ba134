// Collateral ledger: where tokens actually move. the engine only does bookkeeping on
// accounts; deposits, withdrawals and payouts go through this trait so token custody
// can live in whatever system hosts the engine.

use crate::fixed::{ArithmeticError, FixedPoint};
use crate::types::{Address, CollateralId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Who a payout goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Recipient {
    Keeper(Address),
    FeeCollector,
    LiquidityPool,
}

pub trait CollateralLedger: Debug {
    // pull tokens from an external wallet into engine custody
    fn transfer_in(&mut self, from: Address, collateral_id: CollateralId, amount: Decimal) -> Result<(), LedgerError>;

    // push tokens from engine custody to an external wallet
    fn transfer_out(&mut self, to: Address, collateral_id: CollateralId, amount: Decimal) -> Result<(), LedgerError>;

    // pay a recipient out of engine custody, topped up by the pool when short
    fn credit(&mut self, recipient: Recipient, collateral_id: CollateralId, amount: Decimal) -> Result<(), LedgerError>;
}

/// Ledger kept in memory: external wallets, engine custody and accumulated payouts.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    wallets: BTreeMap<(Address, CollateralId), Decimal>,
    held: BTreeMap<CollateralId, Decimal>,
    credits: BTreeMap<(Recipient, CollateralId), Decimal>,
    // paid out beyond what custody held
    pool_drawn: BTreeMap<CollateralId, Decimal>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fund_wallet(&mut self, owner: Address, collateral_id: CollateralId, amount: Decimal) -> Result<(), LedgerError> {
        add_to(&mut self.wallets, (owner, collateral_id), amount)
    }

    pub fn wallet_balance(&self, owner: Address, collateral_id: CollateralId) -> Decimal {
        self.wallets.get(&(owner, collateral_id)).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn held(&self, collateral_id: CollateralId) -> Decimal {
        self.held.get(&collateral_id).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn credited(&self, recipient: Recipient, collateral_id: CollateralId) -> Decimal {
        self.credits.get(&(recipient, collateral_id)).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn pool_drawn(&self, collateral_id: CollateralId) -> Decimal {
        self.pool_drawn.get(&collateral_id).copied().unwrap_or(Decimal::ZERO)
    }
}

fn add_to<K: Ord>(map: &mut BTreeMap<K, Decimal>, key: K, amount: Decimal) -> Result<(), LedgerError> {
    let entry = map.entry(key).or_insert(Decimal::ZERO);
    *entry = entry.add_fixed(amount)?;
    Ok(())
}

fn take_from<K: Ord + Copy>(map: &mut BTreeMap<K, Decimal>, key: K, amount: Decimal) -> Result<(), LedgerError> {
    let available = map.get(&key).copied().unwrap_or(Decimal::ZERO);
    if available < amount {
        return Err(LedgerError::InsufficientFunds { requested: amount, available });
    }
    map.insert(key, available.sub_fixed(amount)?);
    Ok(())
}

impl CollateralLedger for InMemoryLedger {
    fn transfer_in(&mut self, from: Address, collateral_id: CollateralId, amount: Decimal) -> Result<(), LedgerError> {
        take_from(&mut self.wallets, (from, collateral_id), amount)?;
        add_to(&mut self.held, collateral_id, amount)
    }

    fn transfer_out(&mut self, to: Address, collateral_id: CollateralId, amount: Decimal) -> Result<(), LedgerError> {
        take_from(&mut self.held, collateral_id, amount)?;
        add_to(&mut self.wallets, (to, collateral_id), amount)
    }

    fn credit(&mut self, recipient: Recipient, collateral_id: CollateralId, amount: Decimal) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Ok(());
        }
        let from_custody = self.held(collateral_id).min(amount);
        take_from(&mut self.held, collateral_id, from_custody)?;
        let shortfall = amount.sub_fixed(from_custody)?;
        if shortfall > Decimal::ZERO {
            add_to(&mut self.pool_drawn, collateral_id, shortfall)?;
        }
        add_to(&mut self.credits, (recipient, collateral_id), amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Decimal, available: Decimal },

    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),
}
