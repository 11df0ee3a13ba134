//! Trade fees and keeper compensation.
//!
//! Trade fees split a size delta into a maker part (moves skew toward zero) and a
//! taker part (moves it away), each charged at its own rate against the notional at
//! fill price. Keeper rewards reimburse the gas a keeper spends on an action plus a
//! profit margin, always bounded to `[min_keeper_reward_usd, max_keeper_reward_usd]`.

use crate::fixed::{same_side, ArithmeticError, FixedPoint, UNIT};
use crate::types::Quote;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Maker/taker rates for one market, as fractions of notional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFees {
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
}

impl Default for OrderFees {
    fn default() -> Self {
        Self {
            maker_fee: dec!(0.0002),
            taker_fee: dec!(0.0006),
        }
    }
}

/// How much of a size delta counts as maker and how much as taker. Always sums to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub maker_ratio: Decimal,
    pub taker_ratio: Decimal,
}

pub fn fee_split(skew: Decimal, size_delta: Decimal) -> Result<FeeSplit, ArithmeticError> {
    let skew_after = skew.add_fixed(size_delta)?;

    if same_side(skew_after, skew) {
        // one side only. growing the skew (or starting it from zero) is taking.
        let taking = same_side(size_delta, skew);
        return Ok(if taking {
            FeeSplit { maker_ratio: Decimal::ZERO, taker_ratio: UNIT }
        } else {
            FeeSplit { maker_ratio: UNIT, taker_ratio: Decimal::ZERO }
        });
    }

    // crossed zero: the part that brought skew to zero was maker, the overshoot taker
    let taker_ratio = skew_after.div_fixed(size_delta)?.abs().clamp_fixed(Decimal::ZERO, UNIT);
    let maker_ratio = UNIT.sub_fixed(taker_ratio)?;
    Ok(FeeSplit { maker_ratio, taker_ratio })
}

/// Fee for moving `skew` by `size_delta` at `fill_price`.
pub fn calculate_order_fee(
    skew: Decimal,
    size_delta: Decimal,
    fill_price: Decimal,
    fees: &OrderFees,
) -> Result<Quote, ArithmeticError> {
    let notional = size_delta.abs().mul_fixed(fill_price)?;
    let split = fee_split(skew, size_delta)?;

    let taker = notional.mul_fixed(split.taker_ratio)?.mul_fixed(fees.taker_fee)?;
    let maker = notional.mul_fixed(split.maker_ratio)?.mul_fixed(fees.maker_fee)?;
    Ok(Quote::new(taker.add_fixed(maker)?))
}

/// Keeper reward bounds and margin over raw gas cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperRewardParams {
    // fraction on top of cost (0.3 = cost * 1.3)
    pub profit_margin_percent: Decimal,
    // flat usd on top of cost
    pub profit_margin_usd: Decimal,
    pub min_keeper_reward_usd: Quote,
    pub max_keeper_reward_usd: Quote,
}

impl Default for KeeperRewardParams {
    fn default() -> Self {
        Self {
            profit_margin_percent: dec!(0.3),
            profit_margin_usd: dec!(1),
            min_keeper_reward_usd: Quote::new(dec!(1)),
            max_keeper_reward_usd: Quote::new(dec!(100)),
        }
    }
}

/// Gas units per keeper action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperGasUnits {
    pub settlement: Decimal,
    pub cancellation: Decimal,
    pub flag: Decimal,
    pub liquidation: Decimal,
}

impl Default for KeeperGasUnits {
    fn default() -> Self {
        Self {
            settlement: dec!(300_000),
            cancellation: dec!(150_000),
            flag: dec!(400_000),
            liquidation: dec!(250_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeeperAction {
    Settlement,
    Cancellation,
    Flag,
    Liquidation,
}

impl KeeperGasUnits {
    pub fn units(&self, action: KeeperAction) -> Decimal {
        match action {
            KeeperAction::Settlement => self.settlement,
            KeeperAction::Cancellation => self.cancellation,
            KeeperAction::Flag => self.flag,
            KeeperAction::Liquidation => self.liquidation,
        }
    }
}

const WEI_PER_ETH: Decimal = dec!(1_000_000_000_000_000_000);

// 3.1: raw usd cost of spending gas_units at base_fee_per_gas (wei) with eth at eth_price
pub fn keeper_base_cost(
    base_fee_per_gas: Decimal,
    gas_units: Decimal,
    eth_price: Decimal,
) -> Result<Quote, ArithmeticError> {
    let wei = base_fee_per_gas.mul_fixed(gas_units)?;
    Ok(Quote::new(wei.mul_fixed(eth_price)?.div_fixed(WEI_PER_ETH)?))
}

// cost plus the larger of the two margins, unbounded
fn with_profit_margin(cost: Quote, params: &KeeperRewardParams) -> Result<Quote, ArithmeticError> {
    let by_percent = cost.value().mul_fixed(UNIT.add_fixed(params.profit_margin_percent)?)?;
    let by_usd = cost.value().add_fixed(params.profit_margin_usd)?;
    Ok(Quote::new(by_percent.max(by_usd)))
}

fn bounded(reward: Quote, params: &KeeperRewardParams) -> Quote {
    reward
        .max(params.min_keeper_reward_usd)
        .min(params.max_keeper_reward_usd)
}

/// Reward for a single settlement, cancellation or flag. `buffer` is the
/// order's keeper-fee buffer for settlement and zero otherwise.
pub fn keeper_reward(
    cost: Quote,
    buffer: Quote,
    params: &KeeperRewardParams,
) -> Result<Quote, ArithmeticError> {
    let reward = with_profit_margin(cost, params)?.checked_add(buffer)?;
    Ok(bounded(reward, params))
}

/// Reward for a liquidation that will take `iterations` keeper calls to unwind,
/// plus a component proportional to the size being liquidated.
pub fn liquidation_reward(
    cost_per_iteration: Quote,
    iterations: Decimal,
    fixed_cost: Quote,
    proportional: Quote,
    params: &KeeperRewardParams,
) -> Result<Quote, ArithmeticError> {
    let total_cost = cost_per_iteration.checked_mul(iterations)?.checked_add(fixed_cost)?;
    let reward = with_profit_margin(total_cost, params)?.checked_add(proportional)?;
    Ok(bounded(reward, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fees() -> OrderFees {
        OrderFees {
            maker_fee: dec!(0.002),
            taker_fee: dec!(0.008),
        }
    }

    #[test]
    fn growing_skew_is_all_taker() {
        let split = fee_split(dec!(100), dec!(50)).unwrap();
        assert_eq!(split.taker_ratio, dec!(1));
        assert_eq!(split.maker_ratio, dec!(0));

        let fee = calculate_order_fee(dec!(100), dec!(50), dec!(10), &fees()).unwrap();
        assert_eq!(fee.value(), dec!(4)); // 500 * 0.008
    }

    #[test]
    fn opening_from_zero_skew_is_taker() {
        let split = fee_split(dec!(0), dec!(-5)).unwrap();
        assert_eq!(split.taker_ratio, dec!(1));
    }

    #[test]
    fn shrinking_skew_is_all_maker() {
        let split = fee_split(dec!(100), dec!(-50)).unwrap();
        assert_eq!(split.maker_ratio, dec!(1));

        let fee = calculate_order_fee(dec!(100), dec!(-50), dec!(10), &fees()).unwrap();
        assert_eq!(fee.value(), dec!(1)); // 500 * 0.002
    }

    #[test]
    fn crossing_zero_splits_the_fee() {
        // skew 100, sell 400: 100 brings it to zero (maker), 300 overshoots (taker)
        let split = fee_split(dec!(100), dec!(-400)).unwrap();
        assert_eq!(split.taker_ratio, dec!(0.75));
        assert_eq!(split.maker_ratio, dec!(0.25));

        // notional 4000: 3000 * 0.008 + 1000 * 0.002
        let fee = calculate_order_fee(dec!(100), dec!(-400), dec!(10), &fees()).unwrap();
        assert_eq!(fee.value(), dec!(26));
    }

    #[test]
    fn landing_exactly_on_zero_is_maker() {
        let split = fee_split(dec!(100), dec!(-100)).unwrap();
        assert_eq!(split.maker_ratio, dec!(1));
    }

    #[test]
    fn base_cost_converts_wei_to_usd() {
        // 10 gwei * 500k gas = 0.005 eth at 2000 = 10 usd
        let cost = keeper_base_cost(dec!(10_000_000_000), dec!(500_000), dec!(2000)).unwrap();
        assert_eq!(cost.value(), dec!(10));
    }

    #[test]
    fn reward_takes_the_larger_margin() {
        let params = KeeperRewardParams::default();
        // 10 * 1.3 = 13 beats 10 + 1
        assert_eq!(keeper_reward(Quote::new(dec!(10)), Quote::zero(), &params).unwrap().value(), dec!(13));
        // 2 + 1 = 3 beats 2 * 1.3
        assert_eq!(keeper_reward(Quote::new(dec!(2)), Quote::zero(), &params).unwrap().value(), dec!(3));
    }

    #[test]
    fn reward_is_bounded() {
        let params = KeeperRewardParams::default();
        assert_eq!(keeper_reward(Quote::zero(), Quote::zero(), &params).unwrap().value(), dec!(1));
        assert_eq!(
            keeper_reward(Quote::new(dec!(500)), Quote::zero(), &params).unwrap().value(),
            dec!(100)
        );
        // buffer counts before the cap
        assert_eq!(
            keeper_reward(Quote::new(dec!(10)), Quote::new(dec!(5)), &params).unwrap().value(),
            dec!(18)
        );
    }

    #[test]
    fn liquidation_reward_scales_with_iterations() {
        let params = KeeperRewardParams::default();
        let one = liquidation_reward(Quote::new(dec!(5)), dec!(1), Quote::zero(), Quote::zero(), &params).unwrap();
        let three = liquidation_reward(Quote::new(dec!(5)), dec!(3), Quote::zero(), Quote::zero(), &params).unwrap();
        assert_eq!(one.value(), dec!(6.5));
        assert_eq!(three.value(), dec!(19.5));

        let capped = liquidation_reward(
            Quote::new(dec!(5)),
            dec!(3),
            Quote::new(dec!(2)),
            Quote::new(dec!(1000)),
            &params,
        )
        .unwrap();
        assert_eq!(capped.value(), dec!(100));
    }
}
