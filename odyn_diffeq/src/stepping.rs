//! Step-size control for the embedded Runge-Kutta stepper.

use serde::{Deserialize, Serialize};

/// Step-size policy handed to the stepper.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum StepControl {
    Fixed(FixedStepControl),
    Adaptive(AdaptiveStepControl),
}

/// Fixed step size; the error estimate is ignored.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FixedStepControl {
    pub dt: f64,
}

impl FixedStepControl {
    pub fn new(dt: f64) -> Self {
        Self { dt }
    }
}

/// Classic embedded-pair controller: the normalized error estimate is
/// mapped to a growth factor `safety * error^(-1/order)`, clamped so a
/// single step never grows or shrinks too violently.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AdaptiveStepControl {
    pub rel_tol: f64,
    pub abs_tol: f64,
    safety: f64,
    min_growth: f64,
    max_growth: f64,
    pub min_step: Option<f64>,
    pub max_step: Option<f64>,
    pub init_step: Option<f64>,
}

impl Default for AdaptiveStepControl {
    fn default() -> Self {
        Self {
            rel_tol: 1e-3,
            abs_tol: 1e-6,
            safety: 0.9,
            min_growth: 0.2,
            max_growth: 5.0,
            min_step: None,
            max_step: None,
            init_step: None,
        }
    }
}

impl AdaptiveStepControl {
    pub fn with_tolerances(mut self, rel_tol: f64, abs_tol: f64) -> Self {
        self.rel_tol = rel_tol;
        self.abs_tol = abs_tol;
        self
    }

    pub fn with_step_bounds(mut self, min_step: f64, max_step: f64) -> Self {
        self.min_step = Some(min_step);
        self.max_step = Some(max_step);
        self
    }

    pub fn with_initial_step(mut self, init_step: f64) -> Self {
        self.init_step = Some(init_step);
        self
    }

    /// Magnitude of the first step for an integration spanning `span`.
    pub(crate) fn initial_step(&self, span: f64) -> f64 {
        let step = self.init_step.unwrap_or(1e-2 * span.abs());
        self.clamp_magnitude(step)
    }

    /// Next step magnitude after a step of magnitude `h` produced the
    /// normalized error `error` (acceptance threshold 1.0).
    pub(crate) fn next_step(&self, h: f64, error: f64, order: usize) -> f64 {
        // divide-by-zero protection on very clean steps
        const TINY: f64 = 1e-14;
        let exponent = -1.0 / order as f64;
        let factor = (self.safety * error.max(TINY).powf(exponent))
            .clamp(self.min_growth, self.max_growth);
        self.clamp_magnitude(h * factor)
    }

    fn clamp_magnitude(&self, h: f64) -> f64 {
        let mut h = h;
        if let Some(max) = self.max_step {
            h = h.min(max);
        }
        if let Some(min) = self.min_step {
            h = h.max(min);
        }
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_growth_is_clamped() {
        let control = AdaptiveStepControl::default();
        // error far below tolerance must not blow the step up past max_growth
        let grown = control.next_step(1.0, 1e-12, 5);
        assert_abs_diff_eq!(grown, 5.0, epsilon = 1e-12);
        // error far above tolerance must not collapse past min_growth
        let shrunk = control.next_step(1.0, 1e9, 5);
        assert_abs_diff_eq!(shrunk, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_marginal_error_shrinks_by_safety() {
        let control = AdaptiveStepControl::default();
        assert_abs_diff_eq!(control.next_step(1.0, 1.0, 5), 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_step_bounds_are_honoured() {
        let control = AdaptiveStepControl::default().with_step_bounds(0.5, 2.0);
        assert_abs_diff_eq!(control.next_step(1.0, 1e-12, 5), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(control.next_step(1.0, 1e9, 5), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_initial_step_defaults_to_a_fraction_of_the_span() {
        let control = AdaptiveStepControl::default();
        assert_abs_diff_eq!(control.initial_step(100.0), 1.0, epsilon = 1e-12);
        let explicit = control.with_initial_step(0.25);
        assert_abs_diff_eq!(explicit.initial_step(100.0), 0.25, epsilon = 1e-12);
    }
}
