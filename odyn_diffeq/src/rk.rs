//! Embedded Runge-Kutta stepper driving the acceptance loop.

use log::{debug, warn};
use scalar::Scalar;

use crate::error::OdeError;
use crate::integrator::{AcceptOutcome, IntegratorCore};
use crate::interpolation::StepInterpolator;
use crate::ode::ExpandableOde;
use crate::state::{OdeState, OdeStateAndDerivative};
use crate::stepping::{AdaptiveStepControl, FixedStepControl, StepControl};
use crate::tableau::ButcherTableau;
use crate::util::ulp;

/// Step magnitude below which an adaptive integration is considered stuck
/// even when no explicit floor was configured.
const EMERGENCY_MIN_STEP: f64 = 1e-12;

/// Dormand-Prince 5(4) with adaptive steps.
pub type DormandPrince45<S> = EmbeddedRungeKutta<S, 5, 7>;

/// Classical fixed-step 4th-order Runge-Kutta.
pub type ClassicalRk4<S> = EmbeddedRungeKutta<S, 4, 4>;

/// An explicit Runge-Kutta integrator built from a Butcher tableau.
///
/// The stepper proposes steps, runs the embedded error estimate over the
/// primary block, and hands every accepted step to the acceptance loop for
/// event processing and handler delivery.
pub struct EmbeddedRungeKutta<S: Scalar, const ORDER: usize, const STAGES: usize> {
    core: IntegratorCore<S>,
    tableau: ButcherTableau<ORDER, STAGES>,
    control: StepControl,
}

impl<S: Scalar> DormandPrince45<S> {
    pub fn dormand_prince45(control: AdaptiveStepControl) -> Self {
        Self::new(
            ButcherTableau::DORMAND_PRINCE45,
            StepControl::Adaptive(control),
        )
    }
}

impl<S: Scalar> ClassicalRk4<S> {
    pub fn rk4(dt: f64) -> Self {
        Self::new(
            ButcherTableau::RK4,
            StepControl::Fixed(FixedStepControl::new(dt)),
        )
    }
}

impl<S: Scalar, const ORDER: usize, const STAGES: usize> EmbeddedRungeKutta<S, ORDER, STAGES> {
    pub fn new(tableau: ButcherTableau<ORDER, STAGES>, control: StepControl) -> Self {
        Self {
            core: IntegratorCore::default(),
            tableau,
            control,
        }
    }

    /// The scaffolding shared by all steppers: handlers, detectors,
    /// evaluation counter, trajectory accessors.
    pub fn core(&self) -> &IntegratorCore<S> {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut IntegratorCore<S> {
        &mut self.core
    }

    /// Integrates `ode` from `initial` until the target time, a stop event,
    /// or an error.
    pub fn integrate(
        &mut self,
        ode: &mut ExpandableOde<S>,
        initial: OdeState<S>,
        t_target: S,
    ) -> Result<OdeStateAndDerivative<S>, OdeError> {
        let t0 = initial.time();
        let span = (t_target - t0).real();
        let floor = 1000.0 * ulp(t0.real().abs().max(t_target.real().abs()));
        if span.abs() < floor {
            return Err(OdeError::IntervalTooSmall {
                interval: span.abs(),
                min: floor,
            });
        }
        let total = ode.mapper().total_dimension();
        if initial.total_dimension() != total {
            return Err(OdeError::DimensionMismatch {
                expected: total,
                actual: initial.total_dimension(),
            });
        }
        let forward = span >= 0.0;

        self.core.evaluations.reset();
        ode.init(&initial, t_target)?;
        let y0 = initial.complete();
        let y_dot0 = self.core.compute_derivatives(ode, t0, &y0)?;
        let mut step_start = ode.mapper().map_state_and_derivative(t0, &y0, &y_dot0)?;
        for event_state in &mut self.core.event_states {
            event_state.init(&initial, t_target)?;
        }
        for handler in &self.core.step_handlers {
            handler.borrow_mut().init(&step_start, t_target);
        }
        self.core.state_initialized = false;
        self.core.step_start = Some(step_start.clone());

        let mut magnitude = match &self.control {
            StepControl::Fixed(fixed) => fixed.dt.abs(),
            StepControl::Adaptive(control) => control.initial_step(span),
        };

        loop {
            self.core.is_last_step = false;
            self.core.reset_occurred = false;
            if let StepControl::Fixed(fixed) = &self.control {
                magnitude = fixed.dt.abs();
            }
            let t = step_start.time();
            let remaining = (t_target - t).real();
            // never overshoot the target
            if magnitude >= remaining.abs() {
                magnitude = remaining.abs();
            }
            let mut h = if forward { magnitude } else { -magnitude };

            // trial steps until the error controller accepts one
            let (y_new, end_derivative) = loop {
                let (y_trial, error, end_k) = self.take_step(ode, &step_start, h)?;
                match &self.control {
                    StepControl::Fixed(_) => break (y_trial, end_k),
                    StepControl::Adaptive(control) => {
                        let next = control.next_step(h.abs(), error, ORDER);
                        if error <= 1.0 {
                            magnitude = next;
                            break (y_trial, end_k);
                        }
                        debug!(
                            "step rejected at t = {} (error {:.3e}), retrying with {:.3e}",
                            t.real(),
                            error,
                            next
                        );
                        let floor = control.min_step.unwrap_or(EMERGENCY_MIN_STEP);
                        if h.abs() <= floor {
                            warn!("step size floor reached at t = {}", t.real());
                            return Err(OdeError::MinStepUnderflow {
                                step: h.abs(),
                                min: floor,
                                t: t.real(),
                            });
                        }
                        h = if forward { next } else { -next };
                    }
                }
            };

            let t_new = t + S::from_f64(h);
            let end_derivative = match end_derivative {
                Some(derivative) => derivative,
                None => self.core.compute_derivatives(ode, t_new, &y_new)?,
            };
            let current = ode
                .mapper()
                .map_state_and_derivative(t_new, &y_new, &end_derivative)?;
            self.core.step_size = Some(S::from_f64(h));

            let interpolator = StepInterpolator::new(forward, step_start.clone(), current);
            match self.core.accept_step(interpolator, ode, t_target)? {
                AcceptOutcome::Stopped(final_state) => {
                    self.core.step_start = Some(final_state.clone());
                    return Ok(final_state);
                }
                AcceptOutcome::Reset(new_start) => {
                    // the in-flight step is discarded; restart from the
                    // replacement state with fresh derivatives
                    step_start = new_start;
                    self.core.step_start = Some(step_start.clone());
                }
                AcceptOutcome::Completed(step_end) => {
                    step_start = step_end;
                    self.core.step_start = Some(step_start.clone());
                    if self.core.is_last_step {
                        return Ok(step_start);
                    }
                }
            }
        }
    }

    /// One trial step of size `h` from `start`.
    ///
    /// Returns the end state, the normalized error estimate, and, for FSAL
    /// schemes, the already-computed derivative at the end point.
    fn take_step(
        &mut self,
        ode: &mut ExpandableOde<S>,
        start: &OdeStateAndDerivative<S>,
        h: f64,
    ) -> Result<(Vec<S>, f64, Option<Vec<S>>), OdeError> {
        let t = start.time();
        let y = start.complete();
        let mut k: Vec<Vec<S>> = Vec::with_capacity(STAGES);
        // the first stage is the derivative at the step start, which the
        // previous step (or the integration setup) already computed
        k.push(start.complete_derivative());
        for s in 1..STAGES {
            let mut y_stage = y.clone();
            for (i, ki) in k.iter().enumerate() {
                let a = self.tableau.a[s][i];
                if a != 0.0 {
                    for (slot, value) in y_stage.iter_mut().zip(ki) {
                        *slot += value.scale(a * h);
                    }
                }
            }
            let t_stage = t + S::from_f64(self.tableau.c[s] * h);
            let ki = self.core.compute_derivatives(ode, t_stage, &y_stage)?;
            k.push(ki);
        }

        let mut y_new = y.clone();
        for (s, ki) in k.iter().enumerate() {
            let b = self.tableau.b[s];
            if b != 0.0 {
                for (slot, value) in y_new.iter_mut().zip(ki) {
                    *slot += value.scale(b * h);
                }
            }
        }

        let error = match (&self.control, self.tableau.b_tilde) {
            (StepControl::Adaptive(control), Some(b_tilde)) => {
                // weighted RMS of the embedded difference over the primary
                // block only; secondaries ride along outside error control
                let primary_dimension = ode.mapper().dimension(0)?;
                let mut sum = 0.0;
                for i in 0..primary_dimension {
                    let mut delta = S::zero();
                    for (s, ki) in k.iter().enumerate() {
                        let weight = self.tableau.b[s] - b_tilde[s];
                        if weight != 0.0 {
                            delta += ki[i].scale(weight * h);
                        }
                    }
                    let scale = control.abs_tol
                        + control.rel_tol * y[i].real().abs().max(y_new[i].real().abs());
                    let ratio = delta.real() / scale;
                    sum += ratio * ratio;
                }
                (sum / primary_dimension as f64).sqrt()
            }
            _ => 0.0,
        };

        // FSAL: the last stage was evaluated at the end point
        let end_derivative = if self.tableau.fsal {
            k.pop()
        } else {
            None
        };
        Ok((y_new, error, end_derivative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use approx::assert_abs_diff_eq;
    use scalar::Dual;

    use crate::error::DynError;
    use crate::events::{Action, EventDetector};
    use crate::handlers::MemoryRecorder;
    use crate::ode::{OrdinaryOde, SecondaryOde};
    use crate::state::OdeState;

    struct ConstantRates {
        rates: Vec<f64>,
    }

    impl OrdinaryOde<f64> for ConstantRates {
        fn dimension(&self) -> usize {
            self.rates.len()
        }

        fn derivatives(&mut self, _t: f64, _y: &[f64], y_dot: &mut [f64]) -> Result<(), DynError> {
            y_dot.copy_from_slice(&self.rates);
            Ok(())
        }
    }

    struct Harmonic;

    impl OrdinaryOde<f64> for Harmonic {
        fn dimension(&self) -> usize {
            2
        }

        fn derivatives(&mut self, _t: f64, y: &[f64], y_dot: &mut [f64]) -> Result<(), DynError> {
            y_dot[0] = y[1];
            y_dot[1] = -y[0];
            Ok(())
        }
    }

    struct ConstantSecondary {
        dimension: usize,
        rate: f64,
    }

    impl SecondaryOde<f64> for ConstantSecondary {
        fn dimension(&self) -> usize {
            self.dimension
        }

        fn derivatives(
            &mut self,
            _t: f64,
            _primary: &[f64],
            _primary_dot: &mut [f64],
            _secondary: &[f64],
            secondary_dot: &mut [f64],
        ) -> Result<(), DynError> {
            secondary_dot.fill(self.rate);
            Ok(())
        }
    }

    fn tight_control() -> AdaptiveStepControl {
        AdaptiveStepControl::default().with_tolerances(1e-14, 1e-14)
    }

    #[test]
    fn test_linear_primary_only() {
        let mut ode = ExpandableOde::new(ConstantRates {
            rates: vec![0.0, 1.0, 2.0],
        });
        let mut integrator = DormandPrince45::dormand_prince45(AdaptiveStepControl::default());
        let initial = OdeState::new(10.0, vec![0.0, 1.0, 2.0]);
        let final_state = integrator.integrate(&mut ode, initial, 100.0).unwrap();
        assert_abs_diff_eq!(final_state.time(), 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(final_state.primary()[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(final_state.primary()[1], 91.0, epsilon = 1e-9);
        assert_abs_diff_eq!(final_state.primary()[2], 182.0, epsilon = 1e-9);
        let evaluations = integrator.core().evaluations();
        assert!(evaluations > 0 && evaluations < 1000);
    }

    #[test]
    fn test_harmonic_with_linear_secondary() {
        let mut ode = ExpandableOde::new(Harmonic);
        ode.add_secondary(ConstantSecondary {
            dimension: 1,
            rate: -1.0,
        });
        let mut integrator = DormandPrince45::dormand_prince45(tight_control());
        let initial = OdeState::new(0.0, vec![0.0, 1.0]).with_secondary(vec![1.0]);
        let final_state = integrator.integrate(&mut ode, initial, 10.0).unwrap();
        assert_abs_diff_eq!(final_state.primary()[0], 10.0_f64.sin(), epsilon = 1e-11);
        assert_abs_diff_eq!(final_state.primary()[1], 10.0_f64.cos(), epsilon = 1e-11);
        assert_abs_diff_eq!(final_state.secondary(1)[0], 1.0 - 10.0, epsilon = 1e-11);
    }

    struct StopAt {
        target: f64,
    }

    impl EventDetector<f64> for StopAt {
        fn g(&mut self, state: &OdeState<f64>) -> Result<f64, DynError> {
            Ok(state.time() - self.target)
        }

        fn event_occurred(&mut self, _state: &OdeState<f64>, _increasing: bool) -> Action {
            Action::Stop
        }
    }

    #[test]
    fn test_stop_event_halts_at_the_root() {
        let mut ode = ExpandableOde::new(ConstantRates { rates: vec![1.0] });
        let mut integrator = DormandPrince45::dormand_prince45(AdaptiveStepControl::default());
        integrator
            .core_mut()
            .add_event_detector(Rc::new(RefCell::new(StopAt { target: 50.0 })));
        let initial = OdeState::new(10.0, vec![0.0]);
        let final_state = integrator.integrate(&mut ode, initial, 1.0e6).unwrap();
        // the stop point sits half a solver accuracy past the root
        assert_abs_diff_eq!(final_state.time(), 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(final_state.primary()[0], 40.0, epsilon = 1e-9);
    }

    /// Shared scratchpad for the cascade scenario: each handler flips the
    /// sign of the *other* detector's g, once.
    struct CascadeShared {
        log: Vec<(char, f64)>,
        sign_a: f64,
        sign_b: f64,
        a_has_flipped: bool,
        b_has_flipped: bool,
    }

    struct CascadeDetector {
        name: char,
        offset: f64,
        shared: Rc<RefCell<CascadeShared>>,
    }

    impl EventDetector<f64> for CascadeDetector {
        fn g(&mut self, state: &OdeState<f64>) -> Result<f64, DynError> {
            let shared = self.shared.borrow();
            let sign = if self.name == 'a' {
                shared.sign_a
            } else {
                shared.sign_b
            };
            Ok(sign * (state.time() - self.offset))
        }

        fn event_occurred(&mut self, state: &OdeState<f64>, _increasing: bool) -> Action {
            let mut shared = self.shared.borrow_mut();
            shared.log.push((self.name, state.time()));
            if self.name == 'a' && !shared.a_has_flipped {
                shared.a_has_flipped = true;
                shared.sign_b = -shared.sign_b;
                return Action::ResetEvents;
            }
            if self.name == 'b' && !shared.b_has_flipped {
                shared.b_has_flipped = true;
                shared.sign_a = -shared.sign_a;
                return Action::ResetEvents;
            }
            Action::Continue
        }
    }

    #[test]
    fn test_cascading_handlers_stay_chronological() {
        let shared = Rc::new(RefCell::new(CascadeShared {
            log: Vec::new(),
            sign_a: 1.0,
            sign_b: -1.0,
            a_has_flipped: false,
            b_has_flipped: false,
        }));
        let mut ode = ExpandableOde::new(ConstantRates { rates: vec![1.0] });
        let mut integrator = DormandPrince45::dormand_prince45(AdaptiveStepControl::default());
        integrator
            .core_mut()
            .add_event_detector(Rc::new(RefCell::new(CascadeDetector {
                name: 'a',
                offset: 3.0,
                shared: shared.clone(),
            })));
        integrator
            .core_mut()
            .add_event_detector(Rc::new(RefCell::new(CascadeDetector {
                name: 'b',
                offset: 6.0,
                shared: shared.clone(),
            })));
        let final_state = integrator
            .integrate(&mut ode, OdeState::new(0.0, vec![0.0]), 10.0)
            .unwrap();
        assert_abs_diff_eq!(final_state.time(), 10.0, epsilon = 1e-9);

        let shared = shared.borrow();
        let log = &shared.log;
        // a fires at 3 and flips b's sign, which makes b fire immediately
        // after; b's flip of a makes a fire once more; b's original root
        // at 6 closes the sequence
        let names: Vec<char> = log.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!['a', 'b', 'a', 'b']);
        for window in log.windows(2) {
            assert!(window[1].1 >= window[0].1, "events out of order: {log:?}");
        }
        assert_abs_diff_eq!(log[0].1, 3.0, epsilon = 1e-8);
        assert_abs_diff_eq!(log[1].1, 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(log[2].1, 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(log[3].1, 6.0, epsilon = 1e-8);
    }

    #[test]
    fn test_interval_too_small_fails_before_any_callback() {
        let called = Rc::new(RefCell::new(false));

        struct Spy {
            called: Rc<RefCell<bool>>,
        }

        impl OrdinaryOde<f64> for Spy {
            fn dimension(&self) -> usize {
                1
            }

            fn derivatives(
                &mut self,
                _t: f64,
                _y: &[f64],
                _y_dot: &mut [f64],
            ) -> Result<(), DynError> {
                *self.called.borrow_mut() = true;
                Ok(())
            }
        }

        let mut ode = ExpandableOde::new(Spy {
            called: called.clone(),
        });
        let mut integrator = DormandPrince45::dormand_prince45(AdaptiveStepControl::default());
        let result = integrator.integrate(&mut ode, OdeState::new(5.0, vec![0.0]), 5.0);
        assert!(matches!(result, Err(OdeError::IntervalTooSmall { .. })));
        assert!(!*called.borrow());
    }

    struct MarkAt {
        offset: f64,
        log: Rc<RefCell<Vec<(usize, f64)>>>,
        id: usize,
    }

    impl EventDetector<f64> for MarkAt {
        fn g(&mut self, state: &OdeState<f64>) -> Result<f64, DynError> {
            Ok(state.time() - self.offset)
        }

        fn event_occurred(&mut self, state: &OdeState<f64>, _increasing: bool) -> Action {
            self.log.borrow_mut().push((self.id, state.time()));
            Action::Continue
        }
    }

    #[test]
    fn test_events_fire_in_chronological_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut ode = ExpandableOde::new(ConstantRates { rates: vec![1.0] });
        let mut integrator = DormandPrince45::dormand_prince45(AdaptiveStepControl::default());
        // registered out of chronological order on purpose
        for (id, offset) in [(0, 7.0), (1, 2.0), (2, 5.0)] {
            integrator
                .core_mut()
                .add_event_detector(Rc::new(RefCell::new(MarkAt {
                    offset,
                    log: log.clone(),
                    id,
                })));
        }
        integrator
            .integrate(&mut ode, OdeState::new(0.0, vec![0.0]), 10.0)
            .unwrap();
        let fired: Vec<usize> = log.borrow().iter().map(|(id, _)| *id).collect();
        assert_eq!(fired, vec![1, 2, 0]);
        for window in log.borrow().windows(2) {
            assert!(window[1].1 >= window[0].1);
        }
    }

    #[test]
    fn test_simultaneous_events_fire_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut ode = ExpandableOde::new(ConstantRates { rates: vec![1.0] });
        let mut integrator = DormandPrince45::dormand_prince45(AdaptiveStepControl::default());
        for id in 0..3 {
            integrator
                .core_mut()
                .add_event_detector(Rc::new(RefCell::new(MarkAt {
                    offset: 4.0,
                    log: log.clone(),
                    id,
                })));
        }
        integrator
            .integrate(&mut ode, OdeState::new(0.0, vec![0.0]), 10.0)
            .unwrap();
        let fired: Vec<usize> = log.borrow().iter().map(|(id, _)| *id).collect();
        assert_eq!(fired, vec![0, 1, 2]);
    }

    struct BounceAtCeiling {
        bounces: Rc<RefCell<Vec<f64>>>,
    }

    impl EventDetector<f64> for BounceAtCeiling {
        fn g(&mut self, state: &OdeState<f64>) -> Result<f64, DynError> {
            Ok(state.primary()[0] - 1.0)
        }

        fn event_occurred(&mut self, state: &OdeState<f64>, _increasing: bool) -> Action {
            self.bounces.borrow_mut().push(state.time());
            Action::ResetState
        }

        fn reset_state(&mut self, state: &OdeState<f64>) -> OdeState<f64> {
            OdeState::new(state.time(), vec![0.0])
        }
    }

    #[test]
    fn test_reset_state_restarts_the_stepper() {
        let bounces = Rc::new(RefCell::new(Vec::new()));
        let mut ode = ExpandableOde::new(ConstantRates { rates: vec![1.0] });
        let mut integrator = DormandPrince45::dormand_prince45(AdaptiveStepControl::default());
        integrator
            .core_mut()
            .add_event_detector(Rc::new(RefCell::new(BounceAtCeiling {
                bounces: bounces.clone(),
            })));
        let final_state = integrator
            .integrate(&mut ode, OdeState::new(0.0, vec![0.0]), 3.5)
            .unwrap();
        let bounces = bounces.borrow();
        assert_eq!(bounces.len(), 3);
        assert_abs_diff_eq!(bounces[0], 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(bounces[1], 2.0, epsilon = 1e-8);
        assert_abs_diff_eq!(bounces[2], 3.0, epsilon = 1e-8);
        assert_abs_diff_eq!(final_state.primary()[0], 0.5, epsilon = 1e-7);
    }

    struct SharedRateOde {
        rate: Rc<RefCell<f64>>,
    }

    impl OrdinaryOde<f64> for SharedRateOde {
        fn dimension(&self) -> usize {
            1
        }

        fn derivatives(&mut self, _t: f64, _y: &[f64], y_dot: &mut [f64]) -> Result<(), DynError> {
            y_dot[0] = *self.rate.borrow();
            Ok(())
        }
    }

    struct FlipRateAt {
        target: f64,
        rate: Rc<RefCell<f64>>,
    }

    impl EventDetector<f64> for FlipRateAt {
        fn g(&mut self, state: &OdeState<f64>) -> Result<f64, DynError> {
            Ok(state.time() - self.target)
        }

        fn event_occurred(&mut self, _state: &OdeState<f64>, _increasing: bool) -> Action {
            let mut rate = self.rate.borrow_mut();
            *rate = -*rate;
            Action::ResetDerivatives
        }
    }

    #[test]
    fn test_reset_derivatives_picks_up_model_changes() {
        let rate = Rc::new(RefCell::new(1.0));
        let mut ode = ExpandableOde::new(SharedRateOde { rate: rate.clone() });
        let mut integrator = DormandPrince45::dormand_prince45(AdaptiveStepControl::default());
        integrator
            .core_mut()
            .add_event_detector(Rc::new(RefCell::new(FlipRateAt {
                target: 5.0,
                rate: rate.clone(),
            })));
        let final_state = integrator
            .integrate(&mut ode, OdeState::new(0.0, vec![0.0]), 10.0)
            .unwrap();
        // up for five units, down for five
        assert_abs_diff_eq!(final_state.primary()[0], 0.0, epsilon = 1e-7);
    }

    #[test]
    fn test_two_runs_are_identical() {
        let run = || {
            let recorder = Rc::new(RefCell::new(MemoryRecorder::default()));
            let mut ode = ExpandableOde::new(Harmonic);
            let mut integrator =
                DormandPrince45::dormand_prince45(AdaptiveStepControl::default());
            integrator.core_mut().add_step_handler(recorder.clone());
            let final_state = integrator
                .integrate(&mut ode, OdeState::new(0.0, vec![0.0, 1.0]), 10.0)
                .unwrap();
            let recorder = recorder.borrow();
            (
                final_state.primary().to_vec(),
                recorder.t.clone(),
                recorder.y.clone(),
            )
        };
        let first = run();
        let second = run();
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
        assert_eq!(first.2, second.2);
    }

    #[test]
    fn test_evaluation_limit_is_enforced() {
        let mut ode = ExpandableOde::new(Harmonic);
        let mut integrator = DormandPrince45::dormand_prince45(tight_control());
        integrator.core_mut().set_max_evaluations(Some(50));
        let result = integrator.integrate(&mut ode, OdeState::new(0.0, vec![0.0, 1.0]), 10.0);
        assert!(matches!(
            result,
            Err(OdeError::EvaluationLimitExceeded { max: 50 })
        ));
        assert!(integrator.core().evaluations() <= 50);
    }

    struct Exponential;

    impl OrdinaryOde<Dual> for Exponential {
        fn dimension(&self) -> usize {
            1
        }

        fn derivatives(
            &mut self,
            _t: Dual,
            y: &[Dual],
            y_dot: &mut [Dual],
        ) -> Result<(), DynError> {
            y_dot[0] = y[0];
            Ok(())
        }
    }

    #[test]
    fn test_dual_scalar_propagates_sensitivities() {
        let mut ode = ExpandableOde::new(Exponential);
        let mut integrator = DormandPrince45::<Dual>::dormand_prince45(
            AdaptiveStepControl::default().with_tolerances(1e-12, 1e-12),
        );
        let initial = OdeState::new(Dual::constant(0.0), vec![Dual::variable(1.0)]);
        let final_state = integrator
            .integrate(&mut ode, initial, Dual::constant(1.0))
            .unwrap();
        let y = final_state.primary()[0];
        // y(1) = e, and d y(1) / d y0 = e as well
        assert_abs_diff_eq!(y.re, std::f64::consts::E, epsilon = 1e-9);
        assert_abs_diff_eq!(y.eps, std::f64::consts::E, epsilon = 1e-9);
    }

    #[test]
    fn test_backward_integration() {
        let mut ode = ExpandableOde::new(ConstantRates { rates: vec![1.0] });
        let mut integrator = DormandPrince45::dormand_prince45(AdaptiveStepControl::default());
        let final_state = integrator
            .integrate(&mut ode, OdeState::new(0.0, vec![2.0]), -5.0)
            .unwrap();
        assert_abs_diff_eq!(final_state.time(), -5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(final_state.primary()[0], -3.0, epsilon = 1e-9);
        let step = integrator.core().current_signed_stepsize().unwrap();
        assert!(step < 0.0);
    }

    #[test]
    fn test_fixed_step_rk4() {
        let mut ode = ExpandableOde::new(ConstantRates {
            rates: vec![0.0, 1.0, 2.0],
        });
        let mut integrator = ClassicalRk4::rk4(0.5);
        let initial = OdeState::new(10.0, vec![0.0, 1.0, 2.0]);
        let final_state = integrator.integrate(&mut ode, initial, 100.0).unwrap();
        assert_abs_diff_eq!(final_state.time(), 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(final_state.primary()[1], 91.0, epsilon = 1e-9);
        assert_abs_diff_eq!(final_state.primary()[2], 182.0, epsilon = 1e-9);
    }

    #[test]
    fn test_step_start_tracks_the_trajectory() {
        let mut ode = ExpandableOde::new(ConstantRates { rates: vec![1.0] });
        let mut integrator = DormandPrince45::dormand_prince45(AdaptiveStepControl::default());
        assert!(integrator.core().step_start().is_none());
        let final_state = integrator
            .integrate(&mut ode, OdeState::new(0.0, vec![0.0]), 10.0)
            .unwrap();
        let step_start = integrator.core().step_start().unwrap();
        assert_eq!(step_start.time(), final_state.time());
    }
}
