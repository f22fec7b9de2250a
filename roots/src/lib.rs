//! Bracketing univariate root finders.
//!
//! Event location hands these a sign change bracketed by two samples and
//! expects the crossing back to a prescribed absolute accuracy. Two finders
//! are provided: plain [`Bisection`] and the Illinois-damped [`RegulaFalsi`].

use std::error::Error as StdError;

use scalar::Scalar;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RootError {
    #[error("no sign change across [{lo}, {hi}]: g({lo}) = {g_lo}, g({hi}) = {g_hi}")]
    NoBracket {
        lo: f64,
        hi: f64,
        g_lo: f64,
        g_hi: f64,
    },

    #[error("root not located within {max} iterations")]
    MaxIterationsExceeded { max: usize },

    #[error("non-finite residual {residual} at x = {x}")]
    NonFiniteResidual { x: f64, residual: f64 },

    #[error("sign function evaluation failed")]
    Callback(#[source] Box<dyn StdError + Send + Sync>),
}

/// A validated sign-change interval: `g_lo` and `g_hi` have opposite signs
/// (or one of them is exactly zero).
#[derive(Clone, Copy, Debug)]
pub struct Bracket<S: Scalar> {
    pub lo: S,
    pub g_lo: S,
    pub hi: S,
    pub g_hi: S,
}

impl<S: Scalar> Bracket<S> {
    pub fn new(lo: S, g_lo: S, hi: S, g_hi: S) -> Result<Self, RootError> {
        if !g_lo.real().is_finite() {
            return Err(RootError::NonFiniteResidual {
                x: lo.real(),
                residual: g_lo.real(),
            });
        }
        if !g_hi.real().is_finite() {
            return Err(RootError::NonFiniteResidual {
                x: hi.real(),
                residual: g_hi.real(),
            });
        }
        if g_lo.real() * g_hi.real() > 0.0 {
            return Err(RootError::NoBracket {
                lo: lo.real(),
                hi: hi.real(),
                g_lo: g_lo.real(),
                g_hi: g_hi.real(),
            });
        }
        Ok(Self { lo, g_lo, hi, g_hi })
    }

    fn width(&self) -> f64 {
        (self.hi.real() - self.lo.real()).abs()
    }

    /// The endpoint whose residual is exactly zero, if any.
    fn zero_endpoint(&self) -> Option<S> {
        if self.g_lo.real() == 0.0 {
            Some(self.lo)
        } else if self.g_hi.real() == 0.0 {
            Some(self.hi)
        } else {
            None
        }
    }
}

/// A bracketing univariate solver with a fixed absolute accuracy on the
/// abscissa.
pub trait RootFinder<S: Scalar> {
    fn absolute_accuracy(&self) -> f64;

    /// Locates the root inside `bracket` to the finder's absolute accuracy.
    fn solve<F>(&self, f: F, bracket: Bracket<S>, max_iterations: usize) -> Result<S, RootError>
    where
        F: FnMut(S) -> Result<S, RootError>;
}

#[derive(Clone, Copy, Debug)]
pub struct Bisection {
    accuracy: f64,
}

impl Default for Bisection {
    fn default() -> Self {
        Self { accuracy: 1e-10 }
    }
}

impl Bisection {
    pub fn new(accuracy: f64) -> Self {
        Self { accuracy }
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }
}

impl<S: Scalar> RootFinder<S> for Bisection {
    fn absolute_accuracy(&self) -> f64 {
        self.accuracy
    }

    fn solve<F>(
        &self,
        mut f: F,
        bracket: Bracket<S>,
        max_iterations: usize,
    ) -> Result<S, RootError>
    where
        F: FnMut(S) -> Result<S, RootError>,
    {
        if let Some(x) = bracket.zero_endpoint() {
            return Ok(x);
        }
        let mut b = bracket;
        for _ in 0..max_iterations {
            if b.width() <= self.accuracy {
                return Ok((b.lo + b.hi).scale(0.5));
            }
            let mid = (b.lo + b.hi).scale(0.5);
            let g_mid = f(mid)?;
            if !g_mid.real().is_finite() {
                return Err(RootError::NonFiniteResidual {
                    x: mid.real(),
                    residual: g_mid.real(),
                });
            }
            if g_mid.real() == 0.0 {
                return Ok(mid);
            }
            if g_mid.real() * b.g_lo.real() < 0.0 {
                b.hi = mid;
                b.g_hi = g_mid;
            } else {
                b.lo = mid;
                b.g_lo = g_mid;
            }
        }
        Err(RootError::MaxIterationsExceeded {
            max: max_iterations,
        })
    }
}

/// False position with the Illinois modification, which halves the retained
/// endpoint's residual whenever the same side is kept twice in a row and so
/// avoids the classic one-sided stall.
#[derive(Clone, Copy, Debug)]
pub struct RegulaFalsi {
    accuracy: f64,
}

impl Default for RegulaFalsi {
    fn default() -> Self {
        Self { accuracy: 1e-10 }
    }
}

impl RegulaFalsi {
    pub fn new(accuracy: f64) -> Self {
        Self { accuracy }
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }
}

impl<S: Scalar> RootFinder<S> for RegulaFalsi {
    fn absolute_accuracy(&self) -> f64 {
        self.accuracy
    }

    fn solve<F>(
        &self,
        mut f: F,
        bracket: Bracket<S>,
        max_iterations: usize,
    ) -> Result<S, RootError>
    where
        F: FnMut(S) -> Result<S, RootError>,
    {
        if let Some(x) = bracket.zero_endpoint() {
            return Ok(x);
        }
        let mut b = bracket;
        let mut kept_lo = 0_u32;
        let mut kept_hi = 0_u32;
        for _ in 0..max_iterations {
            if b.width() <= self.accuracy {
                return Ok((b.lo + b.hi).scale(0.5));
            }
            // secant point, weighted by the (possibly damped) residuals
            let denominator = b.g_hi - b.g_lo;
            let mut x = b.hi - b.g_hi * (b.hi - b.lo) / denominator;
            // fall back to the midpoint when the secant lands on or outside
            // the bracket, so the interval always shrinks
            let (inner, outer) = (
                b.lo.real().min(b.hi.real()),
                b.lo.real().max(b.hi.real()),
            );
            if x.real() <= inner || x.real() >= outer {
                x = (b.lo + b.hi).scale(0.5);
            }
            let g_x = f(x)?;
            if !g_x.real().is_finite() {
                return Err(RootError::NonFiniteResidual {
                    x: x.real(),
                    residual: g_x.real(),
                });
            }
            if g_x.real() == 0.0 {
                return Ok(x);
            }
            if g_x.real() * b.g_lo.real() < 0.0 {
                b.hi = x;
                b.g_hi = g_x;
                kept_lo += 1;
                kept_hi = 0;
                if kept_lo >= 2 {
                    b.g_lo = b.g_lo.scale(0.5);
                }
            } else {
                b.lo = x;
                b.g_lo = g_x;
                kept_hi += 1;
                kept_lo = 0;
                if kept_hi >= 2 {
                    b.g_hi = b.g_hi.scale(0.5);
                }
            }
        }
        Err(RootError::MaxIterationsExceeded {
            max: max_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    fn cosine(x: f64) -> Result<f64, RootError> {
        Ok(x.cos())
    }

    #[test]
    fn test_bisection_locates_cosine_root() {
        let bracket = Bracket::new(1.0, 1.0_f64.cos(), 2.0, 2.0_f64.cos()).unwrap();
        let root = RootFinder::<f64>::solve(&Bisection::new(1e-12), cosine, bracket, 100).unwrap();
        assert_abs_diff_eq!(root, FRAC_PI_2, epsilon = 1e-11);
    }

    #[test]
    fn test_regula_falsi_locates_cosine_root() {
        let bracket = Bracket::new(1.0, 1.0_f64.cos(), 2.0, 2.0_f64.cos()).unwrap();
        let root =
            RootFinder::<f64>::solve(&RegulaFalsi::new(1e-12), cosine, bracket, 100).unwrap();
        assert_abs_diff_eq!(root, FRAC_PI_2, epsilon = 1e-11);
    }

    #[test]
    fn test_zero_endpoint_is_returned_immediately() {
        let bracket = Bracket::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let root = RootFinder::<f64>::solve(
            &Bisection::default(),
            |_| panic!("must not evaluate"),
            bracket,
            100,
        )
        .unwrap();
        assert_eq!(root, 0.0);
    }

    #[test]
    fn test_rejects_bracket_without_sign_change() {
        let result = Bracket::new(0.0, 1.0, 1.0, 2.0);
        assert!(matches!(result, Err(RootError::NoBracket { .. })));
    }

    #[test]
    fn test_iteration_cap() {
        let bracket = Bracket::new(0.0, -1.0, 1.0e9, 1.0).unwrap();
        let result = RootFinder::<f64>::solve(
            &Bisection::new(1e-15),
            |x| Ok(if x < 1.0e9 - 1.0 { -1.0 } else { 1.0 }),
            bracket,
            5,
        );
        assert!(matches!(
            result,
            Err(RootError::MaxIterationsExceeded { max: 5 })
        ));
    }
}
