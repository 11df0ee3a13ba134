// 5.0: velocity-based funding. the rate is not set, it drifts: skew pushes it at a velocity
// proportional to skew / skew_scale, and funding owed is the time-integral of rate * price.
// 5.0 has the params/state structs. 5.1+ has the accrual math.

use crate::fixed::{ArithmeticError, FixedPoint};
use crate::pricing::price_deviation;
use crate::types::{Price, Quote, SignedSize, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingParams {
    // daily rate change at full skew (|skew| >= skew_scale).
    pub max_funding_velocity: Decimal,
}

impl Default for FundingParams {
    fn default() -> Self {
        Self {
            max_funding_velocity: dec!(9),
        }
    }
}

// last-touched snapshot. everything between last_update and now is derived on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingState {
    // daily rate as of last_update
    pub last_funding_rate: Decimal,
    // cumulative funding per unit of size as of last_update
    pub last_funding_value: Decimal,
    pub last_update: Timestamp,
}

impl FundingState {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            last_funding_rate: Decimal::ZERO,
            last_funding_value: Decimal::ZERO,
            last_update: timestamp,
        }
    }

    // 5.1: rate now = last rate + velocity * days elapsed
    pub fn current_funding_rate(
        &self,
        skew: Decimal,
        skew_scale: Decimal,
        params: &FundingParams,
        now: Timestamp,
    ) -> Result<Decimal, ArithmeticError> {
        let velocity = funding_velocity(skew, skew_scale, params)?;
        let elapsed_days = now.elapsed_days(self.last_update);
        self.last_funding_rate.add_fixed(velocity.mul_fixed(elapsed_days)?)
    }

    // 5.2: funding accrued per unit since last_update. trapezoid of the linear rate,
    // negated because funding flows against the skew.
    pub fn unrecorded_funding(
        &self,
        skew: Decimal,
        skew_scale: Decimal,
        params: &FundingParams,
        price: Price,
        now: Timestamp,
    ) -> Result<Decimal, ArithmeticError> {
        let rate_now = self.current_funding_rate(skew, skew_scale, params, now)?;
        let avg_rate = self.last_funding_rate.add_fixed(rate_now)?.div_fixed(dec!(2))?;
        let elapsed_days = now.elapsed_days(self.last_update);
        Ok(-avg_rate.mul_fixed(elapsed_days)?.mul_fixed(price.value())?)
    }

    pub fn next_funding_value(
        &self,
        skew: Decimal,
        skew_scale: Decimal,
        params: &FundingParams,
        price: Price,
        now: Timestamp,
    ) -> Result<Decimal, ArithmeticError> {
        let unrecorded = self.unrecorded_funding(skew, skew_scale, params, price, now)?;
        self.last_funding_value.add_fixed(unrecorded)
    }

    // 5.3: fold the accrual into the snapshot. must run before skew changes, because the
    // skew since last_update is what drove the velocity.
    pub fn recompute(
        &self,
        skew: Decimal,
        skew_scale: Decimal,
        params: &FundingParams,
        price: Price,
        now: Timestamp,
    ) -> Result<FundingState, ArithmeticError> {
        Ok(FundingState {
            last_funding_rate: self.current_funding_rate(skew, skew_scale, params, now)?,
            last_funding_value: self.next_funding_value(skew, skew_scale, params, price, now)?,
            last_update: now,
        })
    }
}

// velocity = clamp(skew / skew_scale, -1, 1) * max velocity
pub fn funding_velocity(
    skew: Decimal,
    skew_scale: Decimal,
    params: &FundingParams,
) -> Result<Decimal, ArithmeticError> {
    let proportional_skew = price_deviation(skew, skew_scale)?.clamp_fixed(dec!(-1), dec!(1));
    proportional_skew.mul_fixed(params.max_funding_velocity)
}

// 5.4: what a position is owed (positive) or owes (negative). size * (value now - value at entry)
pub fn accrued_funding(
    size: SignedSize,
    entry_funding_value: Decimal,
    current_funding_value: Decimal,
) -> Result<Quote, ArithmeticError> {
    let delta = current_funding_value.sub_fixed(entry_funding_value)?;
    Ok(Quote::new(size.value().mul_fixed(delta)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SECONDS_PER_DAY;
    use rust_decimal_macros::dec;

    fn params() -> FundingParams {
        FundingParams {
            max_funding_velocity: dec!(1),
        }
    }

    #[test]
    fn velocity_is_clamped_to_max() {
        let p = params();
        assert_eq!(funding_velocity(dec!(500), dec!(1000), &p).unwrap(), dec!(0.5));
        assert_eq!(funding_velocity(dec!(5000), dec!(1000), &p).unwrap(), dec!(1));
        assert_eq!(funding_velocity(dec!(-5000), dec!(1000), &p).unwrap(), dec!(-1));
        assert_eq!(funding_velocity(dec!(5000), dec!(0), &p).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn rate_drifts_linearly_with_time() {
        let state = FundingState::new(Timestamp::from_secs(0));
        let one_day = Timestamp::from_secs(SECONDS_PER_DAY);

        let rate = state.current_funding_rate(dec!(100), dec!(1000), &params(), one_day).unwrap();
        assert_eq!(rate, dec!(0.1));
    }

    #[test]
    fn long_skew_makes_longs_pay() {
        let state = FundingState::new(Timestamp::from_secs(0));
        let one_day = Timestamp::from_secs(SECONDS_PER_DAY);
        let price = Price::new_unchecked(dec!(100));

        // rate goes 0 -> 0.1 over the day, average 0.05, value moves -0.05 * 100
        let next = state.next_funding_value(dec!(100), dec!(1000), &params(), price, one_day).unwrap();
        assert_eq!(next, dec!(-5));

        let long_funding = accrued_funding(SignedSize::new(dec!(2)), dec!(0), next).unwrap();
        let short_funding = accrued_funding(SignedSize::new(dec!(-2)), dec!(0), next).unwrap();
        assert_eq!(long_funding.value(), dec!(-10));
        assert_eq!(short_funding.value(), dec!(10));
    }

    #[test]
    fn recompute_moves_snapshot_forward() {
        let state = FundingState::new(Timestamp::from_secs(0));
        let half_day = Timestamp::from_secs(SECONDS_PER_DAY / 2);
        let price = Price::new_unchecked(dec!(10));

        let next = state.recompute(dec!(-1000), dec!(1000), &params(), price, half_day).unwrap();
        assert_eq!(next.last_update, half_day);
        assert_eq!(next.last_funding_rate, dec!(-0.5));
        // avg rate -0.25 over half a day, negated: +0.125 per unit at price 10
        assert_eq!(next.last_funding_value, dec!(1.25));

        // nothing left unrecorded at the same instant
        let again = next.unrecorded_funding(dec!(-1000), dec!(1000), &params(), price, half_day).unwrap();
        assert_eq!(again, Decimal::ZERO);
    }

    #[test]
    fn zero_velocity_accrues_nothing() {
        let state = FundingState::new(Timestamp::from_secs(0));
        let p = FundingParams {
            max_funding_velocity: Decimal::ZERO,
        };
        let later = Timestamp::from_secs(10 * SECONDS_PER_DAY);
        let next = state
            .next_funding_value(dec!(150), dec!(1000), &p, Price::new_unchecked(dec!(10)), later)
            .unwrap();
        assert_eq!(next, Decimal::ZERO);
    }
}
