//! First-order forward-mode dual numbers.
//!
//! A [`Dual`] carries a value and one derivative slot. Integrating with
//! `Dual` state propagates d/dp of the trajectory alongside the trajectory
//! itself, without any change to engine code.

use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::Scalar;

/// `re + eps·ε` with `ε² = 0`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Dual {
    /// Value part.
    pub re: f64,
    /// Derivative part.
    pub eps: f64,
}

impl Dual {
    pub fn new(re: f64, eps: f64) -> Self {
        Self { re, eps }
    }

    /// A constant: derivative part zero.
    pub fn constant(re: f64) -> Self {
        Self { re, eps: 0.0 }
    }

    /// The differentiation variable: derivative part one.
    pub fn variable(re: f64) -> Self {
        Self { re, eps: 1.0 }
    }
}

impl Add for Dual {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::new(self.re * rhs.re, self.re * rhs.eps + self.eps * rhs.re)
    }
}

impl Div for Dual {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        Self::new(
            self.re / rhs.re,
            (self.eps * rhs.re - self.re * rhs.eps) / (rhs.re * rhs.re),
        )
    }
}

impl Neg for Dual {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.re, -self.eps)
    }
}

impl AddAssign for Dual {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Dual {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Dual {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl Scalar for Dual {
    fn from_f64(value: f64) -> Self {
        Self::constant(value)
    }

    fn real(self) -> f64 {
        self.re
    }

    fn abs(self) -> Self {
        if self.re < 0.0 { -self } else { self }
    }

    fn sqrt(self) -> Self {
        let root = self.re.sqrt();
        Self::new(root, self.eps / (2.0 * root))
    }

    fn sin(self) -> Self {
        Self::new(self.re.sin(), self.eps * self.re.cos())
    }

    fn cos(self) -> Self {
        Self::new(self.re.cos(), -self.eps * self.re.sin())
    }

    fn powi(self, n: i32) -> Self {
        Self::new(
            self.re.powi(n),
            self.eps * f64::from(n) * self.re.powi(n - 1),
        )
    }

    fn scale(self, factor: f64) -> Self {
        Self::new(self.re * factor, self.eps * factor)
    }
}
