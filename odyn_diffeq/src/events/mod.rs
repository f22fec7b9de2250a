//! Event detection along the trajectory.
//!
//! A detector exposes a continuous sign function `g` whose zeroes mark
//! events. The engine samples `g` over every accepted step, brackets sign
//! changes, locates the crossing with a univariate solver, and invokes the
//! detector's handler at the event point. The handler's [`Action`] tells
//! the engine how to proceed.

use roots::RegulaFalsi;
use scalar::Scalar;
use serde::{Deserialize, Serialize};

use crate::error::DynError;
use crate::state::OdeState;

pub(crate) mod state;

/// Largest interval the engine may leave between sign samples by default:
/// one sample per step.
pub const DEFAULT_MAX_CHECK: f64 = f64::INFINITY;

/// Default cap on root-location iterations per sign change.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Handler directive returned from [`EventDetector::event_occurred`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Keep integrating; the same detector may fire again later in the step.
    Continue,
    /// Terminate the integration just past the event.
    Stop,
    /// Replace the state with the detector's `reset_state` and restart the
    /// stepper from there.
    ResetState,
    /// Keep the state but recompute its derivatives and restart the stepper.
    ResetDerivatives,
    /// Re-run event detection on the remainder of the step; use after the
    /// handler changed some other detector's sign function.
    ResetEvents,
}

/// A user event: sign function, location policy, and handler.
pub trait EventDetector<S: Scalar> {
    /// Called once at the start of each integration.
    fn init(&mut self, _initial: &OdeState<S>, _target: S) {}

    /// The switching function. Continuous; zero at the event.
    fn g(&mut self, state: &OdeState<S>) -> Result<S, DynError>;

    /// Upper bound on the time between two sign samples inside a step.
    fn max_check_interval(&self) -> f64 {
        DEFAULT_MAX_CHECK
    }

    fn max_iterations(&self) -> usize {
        DEFAULT_MAX_ITERATIONS
    }

    /// The bracketing solver used to pin down the crossing; its absolute
    /// accuracy is the event-time tolerance.
    fn solver(&self) -> RegulaFalsi {
        RegulaFalsi::default()
    }

    /// The handler, invoked at the located event point. `increasing` is the
    /// crossing direction of `g` in physical time.
    fn event_occurred(&mut self, state: &OdeState<S>, increasing: bool) -> Action;

    /// Replacement state for [`Action::ResetState`]; the default keeps the
    /// state unchanged.
    fn reset_state(&mut self, state: &OdeState<S>) -> OdeState<S> {
        state.clone()
    }
}

/// What came out of dispatching one event.
pub(crate) struct EventOccurrence<S: Scalar> {
    pub(crate) action: Action,
    /// The state to continue from: the event state, or the handler's
    /// replacement after [`Action::ResetState`].
    pub(crate) state: OdeState<S>,
    /// Termination point for [`Action::Stop`], half a solver accuracy past
    /// the root so a restarted integration does not re-trigger it.
    pub(crate) stop_time: S,
}
