//! Accounts: collateral balances, debt, open positions and the single pending order.
//!
//! Margin is cross: every position draws on the same pool of discounted collateral.
//! Realized losses and fees come out of settlement-currency collateral first and
//! whatever it can't cover becomes debt; realized gains repay debt before they
//! are credited.

use crate::fixed::{ArithmeticError, FixedPoint};
use crate::margin::MarginRequirement;
use crate::order::PendingOrder;
use crate::position::Position;
use crate::types::{AccountId, Address, CollateralId, MarketId, Quote, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: Address,
    // may trade and withdraw on the owner's behalf
    pub delegates: BTreeSet<Address>,
    pub collateral: BTreeMap<CollateralId, Decimal>,
    pub debt: Quote,
    pub positions: BTreeMap<MarketId, Position>,
    pub pending_order: Option<PendingOrder>,
    pub created_at: Timestamp,
}

impl Account {
    pub fn new(id: AccountId, owner: Address, timestamp: Timestamp) -> Self {
        Self {
            id,
            owner,
            delegates: BTreeSet::new(),
            collateral: BTreeMap::new(),
            debt: Quote::zero(),
            positions: BTreeMap::new(),
            pending_order: None,
            created_at: timestamp,
        }
    }

    pub fn is_authorized(&self, caller: Address) -> bool {
        caller == self.owner || self.delegates.contains(&caller)
    }

    pub fn collateral_amount(&self, collateral_id: CollateralId) -> Decimal {
        self.collateral.get(&collateral_id).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn deposit_collateral(&mut self, collateral_id: CollateralId, amount: Decimal) -> Result<(), AccountError> {
        let balance = self.collateral_amount(collateral_id).add_fixed(amount)?;
        self.collateral.insert(collateral_id, balance);
        Ok(())
    }

    pub fn withdraw_collateral(&mut self, collateral_id: CollateralId, amount: Decimal) -> Result<(), AccountError> {
        let available = self.collateral_amount(collateral_id);
        if amount > available {
            return Err(AccountError::InsufficientCollateral {
                collateral_id,
                requested: amount,
                available,
            });
        }
        let remaining = available.sub_fixed(amount)?;
        if remaining.is_zero() {
            self.collateral.remove(&collateral_id);
        } else {
            self.collateral.insert(collateral_id, remaining);
        }
        Ok(())
    }

    // 10.1: realize a signed amount against settlement currency and debt
    pub fn charge(&mut self, amount: Quote) -> Result<(), AccountError> {
        if amount.is_zero() {
            return Ok(());
        }

        if amount.is_positive() {
            let repaid = amount.min(self.debt);
            self.debt = self.debt.checked_sub(repaid)?;
            let credit = amount.checked_sub(repaid)?;
            if credit.is_positive() {
                self.deposit_collateral(CollateralId::USD, credit.value())?;
            }
            return Ok(());
        }

        let loss = amount.abs();
        let usd = Quote::new(self.collateral_amount(CollateralId::USD));
        let taken = loss.min(usd);
        if taken.is_positive() {
            self.withdraw_collateral(CollateralId::USD, taken.value())?;
        }
        let shortfall = loss.checked_sub(taken)?;
        self.debt = self.debt.checked_add(shortfall)?;
        Ok(())
    }

    // 10.2: repay debt from settlement-currency collateral
    pub fn pay_debt(&mut self, amount: Quote) -> Result<(), AccountError> {
        if amount > self.debt {
            return Err(AccountError::OverpaidDebt {
                amount,
                debt: self.debt,
            });
        }
        self.withdraw_collateral(CollateralId::USD, amount.value())?;
        self.debt = self.debt.checked_sub(amount)?;
        Ok(())
    }

    pub fn get_position(&self, market_id: MarketId) -> Option<&Position> {
        self.positions.get(&market_id)
    }

    // flat positions are removed, never stored
    pub fn set_position(&mut self, position: Position) {
        if position.is_empty() {
            self.positions.remove(&position.market_id);
        } else {
            self.positions.insert(position.market_id, position);
        }
    }

    pub fn has_open_positions(&self) -> bool {
        !self.positions.is_empty()
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    // seize everything: returns what was held so the caller can move it
    pub fn take_all_collateral(&mut self) -> BTreeMap<CollateralId, Decimal> {
        std::mem::take(&mut self.collateral)
    }
}

/// Margin snapshot of an account at one instant, from fresh prices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountValuation {
    // sum of discounted collateral values
    pub collateral_value: Quote,
    pub total_pnl: Quote,
    pub debt: Quote,
    // collateral_value + total_pnl - debt
    pub available_margin: Quote,
    pub required_initial_margin: Quote,
    pub required_maintenance_margin: Quote,
    // sum of flag_reward_ratio * notional, before keeper costs and bounds
    pub flag_reward: Quote,
}

impl AccountValuation {
    pub fn new(
        collateral_value: Quote,
        total_pnl: Quote,
        debt: Quote,
        requirement: MarginRequirement,
        flag_reward: Quote,
    ) -> Result<Self, ArithmeticError> {
        let available_margin = collateral_value.checked_add(total_pnl)?.checked_sub(debt)?;
        Ok(Self {
            collateral_value,
            total_pnl,
            debt,
            available_margin,
            required_initial_margin: requirement.initial,
            required_maintenance_margin: requirement.maintenance,
            flag_reward,
        })
    }

    pub fn is_liquidatable(&self) -> bool {
        self.available_margin < self.required_maintenance_margin
    }

    // margin left over initial requirements, negative when under
    pub fn free_margin(&self) -> Result<Quote, ArithmeticError> {
        self.available_margin.checked_sub(self.required_initial_margin)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("Insufficient collateral {collateral_id:?}: requested {requested}, available {available}")]
    InsufficientCollateral {
        collateral_id: CollateralId,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Payment {amount} exceeds debt {debt}")]
    OverpaidDebt { amount: Quote, debt: Quote },

    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),
}
