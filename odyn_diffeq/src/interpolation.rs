//! Dense output over one accepted step.
//!
//! The interpolator owns the step's endpoint states and derivatives and
//! evaluates a cubic Hermite interpolant at any interior time. Restriction
//! to a sub-interval only moves the soft boundaries handed to callers; the
//! underlying interpolant always spans the full accepted step, so repeated
//! restriction never degrades accuracy.

use scalar::Scalar;

use crate::state::{OdeState, OdeStateAndDerivative};

#[derive(Clone, Debug)]
pub struct StepInterpolator<S: Scalar> {
    forward: bool,
    global_previous: OdeStateAndDerivative<S>,
    global_current: OdeStateAndDerivative<S>,
    soft_previous: OdeStateAndDerivative<S>,
    soft_current: OdeStateAndDerivative<S>,
}

impl<S: Scalar> StepInterpolator<S> {
    pub(crate) fn new(
        forward: bool,
        previous: OdeStateAndDerivative<S>,
        current: OdeStateAndDerivative<S>,
    ) -> Self {
        Self {
            forward,
            soft_previous: previous.clone(),
            soft_current: current.clone(),
            global_previous: previous,
            global_current: current,
        }
    }

    /// A copy of this interpolator covering `[previous, current]` only.
    /// The new bounds must lie inside the accepted step.
    pub fn restrict(
        &self,
        previous: OdeStateAndDerivative<S>,
        current: OdeStateAndDerivative<S>,
    ) -> Self {
        Self {
            forward: self.forward,
            global_previous: self.global_previous.clone(),
            global_current: self.global_current.clone(),
            soft_previous: previous,
            soft_current: current,
        }
    }

    pub fn is_forward(&self) -> bool {
        self.forward
    }

    /// Start of the (possibly restricted) interval.
    pub fn previous_state(&self) -> &OdeStateAndDerivative<S> {
        &self.soft_previous
    }

    /// End of the (possibly restricted) interval.
    pub fn current_state(&self) -> &OdeStateAndDerivative<S> {
        &self.soft_current
    }

    /// Evaluates state and derivative at `time`.
    pub fn interpolated_state(&self, time: S) -> OdeStateAndDerivative<S> {
        let t0 = self.global_previous.time();
        let t1 = self.global_current.time();
        let h = t1 - t0;
        if h.real().abs() == 0.0 {
            return self.global_current.clone();
        }
        let theta = (time - t0) / h;

        // Hermite basis and its derivative with respect to theta
        let theta2 = theta * theta;
        let theta3 = theta2 * theta;
        let h00 = theta3.scale(2.0) - theta2.scale(3.0) + S::one();
        let h10 = theta3 - theta2.scale(2.0) + theta;
        let h01 = theta3.scale(-2.0) + theta2.scale(3.0);
        let h11 = theta3 - theta2;
        let d00 = (theta2 - theta).scale(6.0) / h;
        let d10 = theta2.scale(3.0) - theta.scale(4.0) + S::one();
        let d01 = -d00;
        let d11 = theta2.scale(3.0) - theta.scale(2.0);

        let blend = |y0: &[S], f0: &[S], y1: &[S], f1: &[S]| -> (Vec<S>, Vec<S>) {
            let mut y = Vec::with_capacity(y0.len());
            let mut y_dot = Vec::with_capacity(y0.len());
            for i in 0..y0.len() {
                y.push(h00 * y0[i] + h10 * h * f0[i] + h01 * y1[i] + h11 * h * f1[i]);
                y_dot.push(d00 * y0[i] + d10 * f0[i] + d01 * y1[i] + d11 * f1[i]);
            }
            (y, y_dot)
        };

        let (primary, primary_dot) = blend(
            self.global_previous.primary(),
            self.global_previous.primary_derivative(),
            self.global_current.primary(),
            self.global_current.primary_derivative(),
        );
        let mut state = OdeState::new(time, primary);
        let mut secondary_derivative =
            Vec::with_capacity(self.global_previous.state().number_of_secondary());
        for index in 1..=self.global_previous.state().number_of_secondary() {
            let (block, block_dot) = blend(
                self.global_previous.secondary(index),
                self.global_previous.secondary_derivative(index),
                self.global_current.secondary(index),
                self.global_current.secondary_derivative(index),
            );
            state = state.with_secondary(block);
            secondary_derivative.push(block_dot);
        }
        OdeStateAndDerivative::new(state, primary_dot, secondary_derivative)
    }
}
