//! Fixed-point decimal arithmetic.
//!
//! Every monetary and ratio value in the engine is a signed decimal carried at
//! 18 fractional digits. Products and quotients are truncated toward zero back
//! to that scale, so a computation never credits more than it can account for.
//! The only operation that rounds up is [`FixedPoint::ceil_div_fixed`], used
//! where under-counting would under-collect (liquidation iteration counts).
//!
//! Overflow and division by zero surface as [`ArithmeticError`] instead of a
//! panic, and abort whatever transition was computing them.

use rust_decimal::RoundingStrategy;
use rust_decimal::Decimal;

/// Number of fractional digits every value is truncated to.
pub const SCALE: u32 = 18;

/// 1.0 at full scale.
pub const UNIT: Decimal = Decimal::ONE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ArithmeticError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("fixed-point overflow")]
    Overflow,
}

/// Checked 18-decimal operations on [`Decimal`].
///
/// `abs`, `min` and `max` are exact on `Decimal` already and are used directly.
pub trait FixedPoint: Sized + Copy {
    /// Truncate toward zero to [`SCALE`] digits.
    fn truncated(self) -> Decimal;

    fn add_fixed(self, rhs: Decimal) -> Result<Decimal, ArithmeticError>;

    fn sub_fixed(self, rhs: Decimal) -> Result<Decimal, ArithmeticError>;

    fn mul_fixed(self, rhs: Decimal) -> Result<Decimal, ArithmeticError>;

    fn div_fixed(self, rhs: Decimal) -> Result<Decimal, ArithmeticError>;

    /// `ceil(self / rhs)` as a whole number.
    fn ceil_div_fixed(self, rhs: Decimal) -> Result<Decimal, ArithmeticError>;

    fn clamp_fixed(self, lower: Decimal, upper: Decimal) -> Decimal;
}

impl FixedPoint for Decimal {
    fn truncated(self) -> Decimal {
        self.round_dp_with_strategy(SCALE, RoundingStrategy::ToZero)
    }

    fn add_fixed(self, rhs: Decimal) -> Result<Decimal, ArithmeticError> {
        self.checked_add(rhs)
            .map(FixedPoint::truncated)
            .ok_or(ArithmeticError::Overflow)
    }

    fn sub_fixed(self, rhs: Decimal) -> Result<Decimal, ArithmeticError> {
        self.checked_sub(rhs)
            .map(FixedPoint::truncated)
            .ok_or(ArithmeticError::Overflow)
    }

    fn mul_fixed(self, rhs: Decimal) -> Result<Decimal, ArithmeticError> {
        self.checked_mul(rhs)
            .map(FixedPoint::truncated)
            .ok_or(ArithmeticError::Overflow)
    }

    fn div_fixed(self, rhs: Decimal) -> Result<Decimal, ArithmeticError> {
        if rhs.is_zero() {
            return Err(ArithmeticError::DivisionByZero);
        }
        self.checked_div(rhs)
            .map(FixedPoint::truncated)
            .ok_or(ArithmeticError::Overflow)
    }

    fn ceil_div_fixed(self, rhs: Decimal) -> Result<Decimal, ArithmeticError> {
        if rhs.is_zero() {
            return Err(ArithmeticError::DivisionByZero);
        }
        self.checked_div(rhs)
            .map(|q| q.ceil())
            .ok_or(ArithmeticError::Overflow)
    }

    fn clamp_fixed(self, lower: Decimal, upper: Decimal) -> Decimal {
        self.max(lower).min(upper)
    }
}

/// True when `a` and `b` do not point in opposite directions. Zero sits on both sides.
pub fn same_side(a: Decimal, b: Decimal) -> bool {
    a.is_zero() || b.is_zero() || a.is_sign_positive() == b.is_sign_positive()
}
