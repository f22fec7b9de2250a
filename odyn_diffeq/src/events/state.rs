//! Per-detector sign tracking, bracketing, and root location.

use std::cell::RefCell;
use std::rc::Rc;

use log::trace;
use roots::{Bracket, RootError, RootFinder};
use scalar::Scalar;

use crate::error::OdeError;
use crate::events::{Action, EventDetector, EventOccurrence};
use crate::interpolation::StepInterpolator;
use crate::state::{OdeState, OdeStateAndDerivative};
use crate::util::ulp;

/// A located root waiting to be dispatched.
#[derive(Clone, Copy, Debug)]
struct PendingEvent<S: Scalar> {
    time: S,
    /// Crossing direction of `g` along the integration direction.
    increasing: bool,
}

/// Wraps one detector and tracks its sign across and within steps.
///
/// Between steps the stored sign matches `g` at the last confirmed time
/// `t0`; during a step at most one root is pending.
pub(crate) struct EventState<S: Scalar> {
    detector: Rc<RefCell<dyn EventDetector<S>>>,
    t0: S,
    g0: S,
    g0_positive: bool,
    forward: bool,
    pending: Option<PendingEvent<S>>,
}

impl<S: Scalar> EventState<S> {
    pub(crate) fn new(detector: Rc<RefCell<dyn EventDetector<S>>>) -> Self {
        Self {
            detector,
            t0: S::zero(),
            g0: S::zero(),
            g0_positive: true,
            forward: true,
            pending: None,
        }
    }

    pub(crate) fn detector(&self) -> Rc<RefCell<dyn EventDetector<S>>> {
        Rc::clone(&self.detector)
    }

    pub(crate) fn pending_time(&self) -> Option<S> {
        self.pending.map(|p| p.time)
    }

    fn g(&self, state: &OdeState<S>) -> Result<S, OdeError> {
        self.detector.borrow_mut().g(state).map_err(OdeError::user)
    }

    fn accuracy(&self) -> f64 {
        self.detector.borrow().solver().accuracy()
    }

    fn max_check(&self) -> f64 {
        self.detector.borrow().max_check_interval()
    }

    /// `a` strictly after `b` along the integration direction.
    fn strictly_after(&self, a: S, b: S) -> bool {
        if self.forward {
            a.real() > b.real()
        } else {
            a.real() < b.real()
        }
    }

    /// Samples `g` at the start of the integration and records the sign.
    pub(crate) fn init(&mut self, initial: &OdeState<S>, target: S) -> Result<(), OdeError> {
        self.detector.borrow_mut().init(initial, target);
        self.forward = target.real() >= initial.time().real();
        self.t0 = initial.time();
        self.g0 = self.g(initial)?;
        self.g0_positive = self.g0.real() >= 0.0;
        self.pending = None;
        Ok(())
    }

    /// Seeds the sign state against the first accepted step.
    ///
    /// A `g` that is exactly zero at the step start is not an event; the
    /// sample point is nudged into the step by a resolution-dependent
    /// amount so the seed sign is unambiguous.
    pub(crate) fn reinitialize_begin(
        &mut self,
        interpolator: &StepInterpolator<S>,
    ) -> Result<(), OdeError> {
        let s0 = interpolator.previous_state();
        self.t0 = s0.time();
        self.g0 = self.g(s0.state())?;
        if self.g0.real() == 0.0 {
            let t1 = interpolator.current_state().time();
            let span = (t1 - self.t0).real().abs();
            let sub = span / subdivisions(span, self.max_check()) as f64;
            let eps = (0.5 * self.accuracy().max(ulp(self.t0.real()))).min(0.5 * sub);
            let shifted = self.t0 + S::from_f64(if self.forward { eps } else { -eps });
            self.g0 = self.g(interpolator.interpolated_state(shifted).state())?;
        }
        self.g0_positive = self.g0.real() >= 0.0;
        Ok(())
    }

    /// Scans `[t0, current]` in sub-intervals no longer than the detector's
    /// max-check interval; on the first sign change, locates the root and
    /// records it as pending. Returns whether a root is pending.
    pub(crate) fn evaluate_step(
        &mut self,
        interpolator: &StepInterpolator<S>,
    ) -> Result<bool, OdeError> {
        let t1 = interpolator.current_state().time();
        let span = (t1 - self.t0).real();
        if span.abs() < self.accuracy() {
            return Ok(false);
        }
        let n = subdivisions(span.abs(), self.max_check());
        let h = (t1 - self.t0).scale(1.0 / n as f64);
        let mut ta = self.t0;
        let mut ga = self.g0;
        for i in 0..n {
            let tb = if i == n - 1 {
                t1
            } else {
                self.t0 + h.scale((i + 1) as f64)
            };
            let gb = self.g(interpolator.interpolated_state(tb).state())?;
            if self.g0_positive != (gb.real() >= 0.0) {
                let increasing = gb.real() >= ga.real();
                self.find_root(interpolator, ta, ga, tb, gb, increasing)?;
                return Ok(true);
            }
            ta = tb;
            ga = gb;
        }
        self.pending = None;
        Ok(false)
    }

    /// Moves the confirmed point up to `state` if the sign is unchanged.
    ///
    /// Returns true when advancing instead reveals a changed root strictly
    /// between the old confirmed point and `state` — the signature of some
    /// other event's handler having moved this detector's `g` mid-step. A
    /// root identical to the already-pending one does not count, which
    /// keeps the requeue protocol terminating.
    pub(crate) fn try_advance(
        &mut self,
        state: &OdeStateAndDerivative<S>,
        interpolator: &StepInterpolator<S>,
    ) -> Result<bool, OdeError> {
        let t = state.time();
        if let Some(p) = self.pending {
            if !self.strictly_after(p.time, t) {
                // that root is at or before `t` and still waiting to be
                // dispatched; hold position
                return Ok(false);
            }
        }
        let g = self.g(state.state())?;
        if (g.real() >= 0.0) == self.g0_positive {
            self.t0 = t;
            self.g0 = g;
            return Ok(false);
        }
        // the sign flipped somewhere in (t0, t)
        let previous = self.pending;
        let increasing = g.real() >= self.g0.real();
        self.find_root(interpolator, self.t0, self.g0, t, g, increasing)?;
        match (previous, self.pending) {
            (None, Some(_)) => Ok(true),
            (Some(p), Some(q)) => Ok((q.time.real() - p.time.real()).abs() > self.accuracy()),
            _ => Ok(false),
        }
    }

    /// Invokes the handler at the located event point.
    pub(crate) fn do_event(
        &mut self,
        state: &OdeStateAndDerivative<S>,
    ) -> Result<EventOccurrence<S>, OdeError> {
        let pending = match self.pending.take() {
            Some(p) => p,
            None => unreachable!("do_event without a pending event"),
        };
        let increasing = pending.increasing == self.forward;
        let action = self
            .detector
            .borrow_mut()
            .event_occurred(state.state(), increasing);
        trace!(
            "event at t = {} (increasing: {}) -> {:?}",
            state.time().real(),
            increasing,
            action
        );
        let new_state = if action == Action::ResetState {
            self.detector.borrow_mut().reset_state(state.state())
        } else {
            state.state().clone()
        };
        // advance the sign tracking past the event
        self.t0 = state.time();
        if action == Action::ResetState {
            // the state jumped; only a fresh sample can tell the sign
            self.g0 = self.g(&new_state)?;
            self.g0_positive = self.g0.real() >= 0.0;
        } else {
            // the state is continuous through the event, so just past the
            // root the sign follows the crossing direction; a raw re-sample
            // would read roundoff noise around zero
            self.g0 = self.g(state.state())?;
            self.g0_positive = pending.increasing;
        }
        let nudge = 0.5 * self.accuracy();
        let stop_time = state.time() + S::from_f64(if self.forward { nudge } else { -nudge });
        Ok(EventOccurrence {
            action,
            state: new_state,
            stop_time,
        })
    }

    fn find_root(
        &mut self,
        interpolator: &StepInterpolator<S>,
        ta: S,
        ga: S,
        tb: S,
        gb: S,
        increasing: bool,
    ) -> Result<(), OdeError> {
        let solver = self.detector.borrow().solver();
        let max_iterations = self.detector.borrow().max_iterations();
        // a zero residual at the bracket start belongs to an event already
        // dispatched there; shift the start inside the interval so the
        // solver cannot hand that point straight back
        let (ta, ga) = if ga.real() == 0.0 {
            let eps = 0.5 * solver.accuracy();
            let shifted = ta + S::from_f64(if self.forward { eps } else { -eps });
            let g_shifted = self.g(interpolator.interpolated_state(shifted).state())?;
            if g_shifted.real() != 0.0 && (g_shifted.real() >= 0.0) != (gb.real() >= 0.0) {
                (shifted, g_shifted)
            } else {
                // the crossing lies within the nudge itself
                self.pending = Some(PendingEvent {
                    time: shifted,
                    increasing,
                });
                return Ok(());
            }
        } else {
            (ta, ga)
        };
        let bracket = Bracket::new(ta, ga, tb, gb)?;
        let detector = Rc::clone(&self.detector);
        let result = solver.solve(
            |t| {
                detector
                    .borrow_mut()
                    .g(interpolator.interpolated_state(t).state())
                    .map_err(RootError::Callback)
            },
            bracket,
            max_iterations,
        );
        let root = match result {
            Ok(root) => root,
            Err(RootError::Callback(err)) => return Err(OdeError::UserCallback(err)),
            Err(err) => return Err(OdeError::RootNotBracketed(err)),
        };
        trace!(
            "root of g bracketed in [{}, {}] located at {}",
            ta.real(),
            tb.real(),
            root.real()
        );
        self.pending = Some(PendingEvent {
            time: root,
            increasing,
        });
        Ok(())
    }
}

/// Number of sign-sample sub-intervals a span of `span` needs to honour a
/// max-check interval of `max_check`.
fn subdivisions(span: f64, max_check: f64) -> usize {
    ((span / max_check).ceil() as usize).max(1)
}
