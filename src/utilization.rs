// 4.5: utilization interest. open interest locks the liquidity pool's delegated
// collateral; the more of it is locked, the higher the annual rate every open position
// pays. same last-touched + accumulator shape as funding: the rate is fixed between
// touches, the index accrues linearly, positions pay the index delta since entry.

use crate::fixed::{ArithmeticError, FixedPoint, UNIT};
use crate::types::{Price, Quote, SignedSize, Timestamp, SECONDS_PER_YEAR};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

const HUNDRED: Decimal = dec!(100);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtilizationParams {
    // slope below the breakpoint
    pub low_utilization_gradient: Decimal,
    // utilization where the slope changes, in [0, 1]
    pub gradient_breakpoint: Decimal,
    // slope above the breakpoint
    pub high_utilization_gradient: Decimal,
}

impl Default for UtilizationParams {
    fn default() -> Self {
        Self {
            low_utilization_gradient: dec!(0.0001),
            gradient_breakpoint: dec!(0.8),
            high_utilization_gradient: dec!(0.01),
        }
    }
}

// 4.5.1: locked / delegated, capped at one. nothing delegated with something locked is
// fully utilized; nothing locked is zero.
pub fn utilization_ratio(locked_credit: Quote, delegated_collateral: Quote) -> Result<Decimal, ArithmeticError> {
    if locked_credit.value() <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    if delegated_collateral.value() <= Decimal::ZERO {
        return Ok(UNIT);
    }
    Ok(locked_credit
        .value()
        .div_fixed(delegated_collateral.value())?
        .min(UNIT))
}

// 4.5.2: annual rate in percent, piecewise linear in utilization
pub fn utilization_rate(utilization: Decimal, params: &UtilizationParams) -> Result<Decimal, ArithmeticError> {
    let bp = params.gradient_breakpoint;
    if utilization < bp {
        return params.low_utilization_gradient.mul_fixed(utilization)?.mul_fixed(HUNDRED);
    }
    let below = params.low_utilization_gradient.mul_fixed(bp)?.mul_fixed(HUNDRED)?;
    let above = params
        .high_utilization_gradient
        .mul_fixed(utilization.sub_fixed(bp)?)?
        .mul_fixed(HUNDRED)?;
    below.add_fixed(above)
}

// locked credit one market contributes: open size * price * locked oi ratio
pub fn locked_credit(open_size: Decimal, price: Price, locked_oi_ratio: Decimal) -> Result<Quote, ArithmeticError> {
    Ok(Quote::new(
        open_size.abs().mul_fixed(price.value())?.mul_fixed(locked_oi_ratio)?,
    ))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterestState {
    // annual percent as of last_update
    pub interest_rate: Decimal,
    pub accrued_index: Decimal,
    pub last_update: Timestamp,
}

impl InterestState {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            interest_rate: Decimal::ZERO,
            accrued_index: Decimal::ZERO,
            last_update: timestamp,
        }
    }

    pub fn current_index(&self, now: Timestamp) -> Result<Decimal, ArithmeticError> {
        let elapsed = Decimal::from(now.elapsed_since(self.last_update));
        let year_fraction = elapsed.div_fixed(Decimal::from(SECONDS_PER_YEAR))?;
        let growth = self.interest_rate.div_fixed(HUNDRED)?.mul_fixed(year_fraction)?;
        self.accrued_index.add_fixed(growth)
    }

    // 4.5.3: accrue at the old rate up to now, then reprice from the new utilization.
    // called before any open interest changes.
    pub fn recompute(
        &self,
        locked: Quote,
        delegated: Quote,
        params: &UtilizationParams,
        now: Timestamp,
    ) -> Result<InterestState, ArithmeticError> {
        let accrued_index = self.current_index(now)?;
        let utilization = utilization_ratio(locked, delegated)?;
        Ok(InterestState {
            interest_rate: utilization_rate(utilization, params)?,
            accrued_index,
            last_update: now,
        })
    }
}

// 4.5.4: what a position owes for the index movement since it was entered
pub fn accrued_interest(
    size: SignedSize,
    entry_price: Price,
    entry_index: Decimal,
    current_index: Decimal,
) -> Result<Quote, ArithmeticError> {
    let delta = current_index.sub_fixed(entry_index)?;
    Ok(Quote::new(
        size.abs().mul_fixed(entry_price.value())?.mul_fixed(delta)?,
    ))
}
