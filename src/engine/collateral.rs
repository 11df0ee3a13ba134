//! Collateral deposits, withdrawals and debt repayment.

use super::core::Engine;
use super::results::EngineError;
use crate::events::{CollateralModifiedEvent, DebtPaidEvent, EventPayload};
use crate::ledger::CollateralLedger;
use crate::types::{AccountId, Address, CollateralId, Quote};
use rust_decimal::Decimal;

impl<L: CollateralLedger> Engine<L> {
    /// Deposit (positive) or withdraw (negative) collateral. Returns the new balance.
    pub fn modify_collateral(
        &mut self,
        caller: Address,
        account_id: AccountId,
        collateral_id: CollateralId,
        amount_delta: Decimal,
    ) -> Result<Decimal, EngineError> {
        if amount_delta.is_zero() {
            return Err(EngineError::InvalidAmount(amount_delta));
        }
        let account = self.authorized_account(caller, account_id)?;
        let config = self
            .collaterals
            .get(&collateral_id)
            .ok_or(EngineError::CollateralNotFound(collateral_id))?;
        if self.flagged_accounts.contains(&account_id) {
            return Err(EngineError::PendingLiquidation(account_id));
        }

        let mut updated = account.clone();
        if amount_delta > Decimal::ZERO {
            updated.deposit_collateral(collateral_id, amount_delta)?;
            let requested = updated.collateral_amount(collateral_id);
            if requested > config.max_collateral_amount {
                return Err(EngineError::MaxCollateralExceeded {
                    collateral_id,
                    max: config.max_collateral_amount,
                    requested,
                });
            }
            self.ledger.transfer_in(caller, collateral_id, amount_delta)?;
        } else {
            if account.pending_order.is_some() {
                return Err(EngineError::PendingOrderExists(account_id));
            }
            let amount = amount_delta.abs();
            updated.withdraw_collateral(collateral_id, amount)?;

            if let Err(e) = self.require_initial_margin(&updated, None) {
                tracing::warn!(
                    account = account_id.0,
                    collateral = collateral_id.0,
                    %amount,
                    error = %e,
                    "withdrawal rejected"
                );
                return Err(e);
            }
            self.ledger.transfer_out(caller, collateral_id, amount)?;
        }

        let new_balance = updated.collateral_amount(collateral_id);
        self.accounts.insert(account_id, updated);

        tracing::info!(
            account = account_id.0,
            collateral = collateral_id.0,
            delta = %amount_delta,
            balance = %new_balance,
            "collateral modified"
        );
        self.emit_event(EventPayload::CollateralModified(CollateralModifiedEvent {
            account_id,
            collateral_id,
            amount_delta,
            new_balance,
        }));
        Ok(new_balance)
    }

    /// Repay debt out of the account's settlement-currency collateral. Returns what is left owing.
    pub fn pay_debt(&mut self, caller: Address, account_id: AccountId, amount: Quote) -> Result<Quote, EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount(amount.value()));
        }
        let mut updated = self.authorized_account(caller, account_id)?.clone();
        updated.pay_debt(amount)?;
        let remaining_debt = updated.debt;
        self.accounts.insert(account_id, updated);

        self.emit_event(EventPayload::DebtPaid(DebtPaidEvent {
            account_id,
            amount,
            remaining_debt,
        }));
        Ok(remaining_debt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;
    use crate::engine::EngineConfig;
    use crate::ledger::InMemoryLedger;
    use rust_decimal_macros::dec;

    const OWNER: Address = Address(10);

    fn engine_with_account() -> (Engine, AccountId) {
        let mut engine = Engine::in_memory(EngineConfig::default(), GlobalConfig::default());
        engine
            .ledger_mut()
            .fund_wallet(OWNER, CollateralId::USD, dec!(1_000))
            .unwrap();
        let id = engine.create_account(OWNER);
        (engine, id)
    }

    #[test]
    fn deposit_and_withdraw_move_tokens() {
        let (mut engine, id) = engine_with_account();
        assert_eq!(engine.modify_collateral(OWNER, id, CollateralId::USD, dec!(600)), Ok(dec!(600)));
        assert_eq!(engine.ledger().held(CollateralId::USD), dec!(600));
        assert_eq!(engine.ledger().wallet_balance(OWNER, CollateralId::USD), dec!(400));

        assert_eq!(engine.modify_collateral(OWNER, id, CollateralId::USD, dec!(-100)), Ok(dec!(500)));
        assert_eq!(engine.ledger().wallet_balance(OWNER, CollateralId::USD), dec!(500));
    }

    #[test]
    fn zero_and_unknown_collateral_rejected() {
        let (mut engine, id) = engine_with_account();
        assert_eq!(
            engine.modify_collateral(OWNER, id, CollateralId::USD, dec!(0)),
            Err(EngineError::InvalidAmount(dec!(0)))
        );
        assert_eq!(
            engine.modify_collateral(OWNER, id, CollateralId(9), dec!(1)),
            Err(EngineError::CollateralNotFound(CollateralId(9)))
        );
    }

    #[test]
    fn strangers_cannot_withdraw() {
        let (mut engine, id) = engine_with_account();
        engine.modify_collateral(OWNER, id, CollateralId::USD, dec!(100)).unwrap();
        assert_eq!(
            engine.modify_collateral(Address(66), id, CollateralId::USD, dec!(-100)),
            Err(EngineError::Unauthorized { caller: Address(66) })
        );
    }

    #[test]
    fn deposit_cap_enforced() {
        let (mut engine, id) = engine_with_account();
        let mut usd = crate::collateral::CollateralConfig::usd();
        usd.max_collateral_amount = dec!(500);
        engine.set_collateral_config(Address(0), usd).unwrap();
        engine.modify_collateral(OWNER, id, CollateralId::USD, dec!(400)).unwrap();
        assert!(matches!(
            engine.modify_collateral(OWNER, id, CollateralId::USD, dec!(200)),
            Err(EngineError::MaxCollateralExceeded { .. })
        ));
        // nothing moved on the rejected deposit
        assert_eq!(engine.ledger().held(CollateralId::USD), dec!(400));
    }

    #[test]
    fn debt_repaid_from_usd() {
        let (mut engine, id) = engine_with_account();
        engine.modify_collateral(OWNER, id, CollateralId::USD, dec!(300)).unwrap();
        engine.accounts.get_mut(&id).unwrap().debt = Quote::new(dec!(120));

        assert_eq!(engine.pay_debt(OWNER, id, Quote::new(dec!(100))), Ok(Quote::new(dec!(20))));
        assert_eq!(engine.get_account(id).unwrap().collateral_amount(CollateralId::USD), dec!(200));
        assert!(engine.pay_debt(OWNER, id, Quote::new(dec!(50))).is_err());
        assert_eq!(
            engine.pay_debt(OWNER, id, Quote::zero()),
            Err(EngineError::InvalidAmount(dec!(0)))
        );
    }

    #[test]
    fn ledger_rejects_unfunded_deposit() {
        let mut engine: Engine<InMemoryLedger> = Engine::in_memory(EngineConfig::default(), GlobalConfig::default());
        let id = engine.create_account(OWNER);
        assert!(matches!(
            engine.modify_collateral(OWNER, id, CollateralId::USD, dec!(1)),
            Err(EngineError::Ledger(_))
        ));
        assert_eq!(engine.get_account(id).unwrap().collateral_amount(CollateralId::USD), dec!(0));
    }
}
