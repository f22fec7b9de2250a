//! Algebraic scalar abstraction for the integration engine.
//!
//! Everything downstream is generic over [`Scalar`], so the same engine code
//! integrates over plain `f64` or over [`Dual`] numbers that carry a
//! derivative slot through the whole trajectory.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

pub mod dual;

pub use dual::Dual;

/// A field element the engine can integrate over.
///
/// The capability set is deliberately small: ring/field arithmetic through
/// the std `ops` traits, construction from a real literal, a real
/// projection for comparisons and norms, and the elementary functions the
/// right-hand sides and error estimates need.
pub trait Scalar:
    Copy
    + Debug
    + PartialEq
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + 'static
{
    /// Builds a constant scalar from a real literal.
    fn from_f64(value: f64) -> Self;

    /// Real projection, used for all ordering decisions and error norms.
    fn real(self) -> f64;

    fn abs(self) -> Self;

    fn sqrt(self) -> Self;

    fn sin(self) -> Self;

    fn cos(self) -> Self;

    fn powi(self, n: i32) -> Self;

    /// Multiplication by a real constant.
    fn scale(self, factor: f64) -> Self {
        self * Self::from_f64(factor)
    }

    fn zero() -> Self {
        Self::from_f64(0.0)
    }

    fn one() -> Self {
        Self::from_f64(1.0)
    }

    /// Whichever operand has the larger real projection.
    fn max_real(self, other: Self) -> Self {
        if self.real() >= other.real() { self } else { other }
    }

    /// Whichever operand has the smaller real projection.
    fn min_real(self, other: Self) -> Self {
        if self.real() <= other.real() { self } else { other }
    }
}

impl Scalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn real(self) -> f64 {
        self
    }

    fn abs(self) -> Self {
        num_traits::Float::abs(self)
    }

    fn sqrt(self) -> Self {
        num_traits::Float::sqrt(self)
    }

    fn sin(self) -> Self {
        num_traits::Float::sin(self)
    }

    fn cos(self) -> Self {
        num_traits::Float::cos(self)
    }

    fn powi(self, n: i32) -> Self {
        num_traits::Float::powi(self, n)
    }

    fn scale(self, factor: f64) -> Self {
        self * factor
    }
}
