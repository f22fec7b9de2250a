//! Integrator scaffolding and the step-acceptance loop.
//!
//! The acceptance loop is where integration, event detection, root
//! location, state resets, and step-handler callbacks meet. Events are
//! dispatched in chronological order through a priority queue; after every
//! partial advance to an event point, every other detector is given the
//! chance to report an earlier root before the handler fires, so the
//! delivered sequence stays chronological even when handlers mutate other
//! detectors' sign functions mid-step.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use log::debug;
use scalar::Scalar;

use crate::error::OdeError;
use crate::events::state::EventState;
use crate::events::{Action, EventDetector};
use crate::handlers::StepHandler;
use crate::interpolation::StepInterpolator;
use crate::ode::ExpandableOde;
use crate::state::OdeStateAndDerivative;
use crate::util::ulp;

/// Counts derivative evaluations against an optional cap.
#[derive(Clone, Copy, Debug, Default)]
pub struct Incrementor {
    count: usize,
    max: Option<usize>,
}

impl Incrementor {
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    pub(crate) fn set_max(&mut self, max: Option<usize>) {
        self.max = max;
    }

    pub(crate) fn reset(&mut self) {
        self.count = 0;
    }

    pub(crate) fn increment(&mut self) -> Result<(), OdeError> {
        if let Some(max) = self.max {
            if self.count >= max {
                return Err(OdeError::EvaluationLimitExceeded { max });
            }
        }
        self.count += 1;
        Ok(())
    }
}

/// How an accepted step ended.
pub(crate) enum AcceptOutcome<S: Scalar> {
    /// The step ran through; continue from its end.
    Completed(OdeStateAndDerivative<S>),
    /// A stop event fired; this is the final state.
    Stopped(OdeStateAndDerivative<S>),
    /// A handler reset the state; the stepper must discard its in-flight
    /// step and restart from here.
    Reset(OdeStateAndDerivative<S>),
}

/// Chronological queue entry: `key` is the event time folded by the
/// integration direction, `order` the detector's registration index which
/// breaks ties.
#[derive(Clone, Copy, Debug)]
struct QueueEntry {
    key: f64,
    order: usize,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the chronologically first
        // event pops first, registration order breaking ties
        other
            .key
            .total_cmp(&self.key)
            .then_with(|| other.order.cmp(&self.order))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn remove_entry(queue: &mut BinaryHeap<QueueEntry>, order: usize) {
    let entries: Vec<QueueEntry> = queue.drain().filter(|e| e.order != order).collect();
    *queue = entries.into();
}

/// Owns the mutable trajectory state and drives the acceptance loop.
pub struct IntegratorCore<S: Scalar> {
    pub(crate) step_handlers: Vec<Rc<RefCell<dyn StepHandler<S>>>>,
    pub(crate) event_states: Vec<EventState<S>>,
    pub(crate) evaluations: Incrementor,
    pub(crate) step_start: Option<OdeStateAndDerivative<S>>,
    pub(crate) step_size: Option<S>,
    pub(crate) is_last_step: bool,
    pub(crate) reset_occurred: bool,
    pub(crate) state_initialized: bool,
}

impl<S: Scalar> Default for IntegratorCore<S> {
    fn default() -> Self {
        Self {
            step_handlers: Vec::new(),
            event_states: Vec::new(),
            evaluations: Incrementor::default(),
            step_start: None,
            step_size: None,
            is_last_step: false,
            reset_occurred: false,
            state_initialized: false,
        }
    }
}

impl<S: Scalar> IntegratorCore<S> {
    pub fn add_step_handler(&mut self, handler: Rc<RefCell<dyn StepHandler<S>>>) {
        self.step_handlers.push(handler);
    }

    pub fn clear_step_handlers(&mut self) {
        self.step_handlers.clear();
    }

    pub fn add_event_detector(&mut self, detector: Rc<RefCell<dyn EventDetector<S>>>) {
        self.event_states.push(EventState::new(detector));
    }

    pub fn clear_event_detectors(&mut self) {
        self.event_states.clear();
    }

    /// Snapshot of the registered detectors; the internal list cannot be
    /// modified through it.
    pub fn event_detectors(&self) -> Vec<Rc<RefCell<dyn EventDetector<S>>>> {
        self.event_states.iter().map(EventState::detector).collect()
    }

    /// `None` means unbounded.
    pub fn set_max_evaluations(&mut self, max: Option<usize>) {
        self.evaluations.set_max(max);
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.count()
    }

    pub fn max_evaluations(&self) -> Option<usize> {
        self.evaluations.max()
    }

    /// Start of the step being integrated, once the first derivatives are
    /// known.
    pub fn step_start(&self) -> Option<&OdeStateAndDerivative<S>> {
        self.step_start.as_ref()
    }

    /// Signed step size of the current step; negative when integrating
    /// backward.
    pub fn current_signed_stepsize(&self) -> Option<S> {
        self.step_size
    }

    /// Evaluates the composite right-hand side, counting against the cap.
    pub(crate) fn compute_derivatives(
        &mut self,
        ode: &mut ExpandableOde<S>,
        t: S,
        y: &[S],
    ) -> Result<Vec<S>, OdeError> {
        self.evaluations.increment()?;
        ode.compute_derivatives(t, y)
    }

    /// Runs one accepted step through event detection and handler delivery.
    pub(crate) fn accept_step(
        &mut self,
        interpolator: StepInterpolator<S>,
        ode: &mut ExpandableOde<S>,
        t_end: S,
    ) -> Result<AcceptOutcome<S>, OdeError> {
        let forward = interpolator.is_forward();
        let sigma = if forward { 1.0 } else { -1.0 };
        let mut interp = interpolator;

        // the very first accepted step seeds every detector's sign state
        if !self.state_initialized {
            for event_state in &mut self.event_states {
                event_state.reinitialize_begin(&interp)?;
            }
            self.state_initialized = true;
        }

        'outer: loop {
            // detection pass over the (possibly restricted) interval
            let mut queue = BinaryHeap::new();
            for (order, event_state) in self.event_states.iter_mut().enumerate() {
                if event_state.evaluate_step(&interp)? {
                    if let Some(t_event) = event_state.pending_time() {
                        queue.push(QueueEntry {
                            key: sigma * t_event.real(),
                            order,
                        });
                    }
                }
            }

            loop {
                while let Some(entry) = queue.pop() {
                    // revalidate against the state machine; an entry whose
                    // root moved since it was queued gets re-keyed
                    let Some(t_event) = self.event_states[entry.order].pending_time() else {
                        continue;
                    };
                    let key = sigma * t_event.real();
                    if key != entry.key {
                        queue.push(QueueEntry {
                            key,
                            order: entry.order,
                        });
                        continue;
                    }

                    let event_state_value = interp.interpolated_state(t_event);
                    let restricted =
                        interp.restrict(interp.previous_state().clone(), event_state_value.clone());

                    // before the handler fires, every other detector gets a
                    // chance to report an earlier root under the partial
                    // advance to the event point
                    let mut requeued = false;
                    for other in 0..self.event_states.len() {
                        if other == entry.order {
                            continue;
                        }
                        if self.event_states[other].try_advance(&event_state_value, &interp)? {
                            if let Some(t_other) = self.event_states[other].pending_time() {
                                remove_entry(&mut queue, other);
                                queue.push(QueueEntry {
                                    key: sigma * t_other.real(),
                                    order: other,
                                });
                            }
                            queue.push(QueueEntry {
                                key,
                                order: entry.order,
                            });
                            requeued = true;
                            break;
                        }
                    }
                    if requeued {
                        continue;
                    }

                    // handlers see the part of the step up to the event
                    for handler in &self.step_handlers {
                        handler
                            .borrow_mut()
                            .handle_step(&restricted)
                            .map_err(OdeError::user)?;
                    }

                    let occurrence = self.event_states[entry.order].do_event(&event_state_value)?;
                    match occurrence.action {
                        Action::Stop => {
                            self.is_last_step = true;
                            let stop_state = interp.interpolated_state(occurrence.stop_time);
                            let last_part =
                                interp.restrict(event_state_value, stop_state.clone());
                            for handler in &self.step_handlers {
                                let mut handler = handler.borrow_mut();
                                handler.handle_step(&last_part).map_err(OdeError::user)?;
                                handler.finish(&stop_state);
                            }
                            debug!("stop event at t = {}", stop_state.time().real());
                            return Ok(AcceptOutcome::Stopped(stop_state));
                        }
                        Action::ResetState | Action::ResetDerivatives => {
                            let t_reset = occurrence.state.time();
                            let y = occurrence.state.complete();
                            let y_dot = self.compute_derivatives(ode, t_reset, &y)?;
                            let new_start =
                                ode.mapper().map_state_and_derivative(t_reset, &y, &y_dot)?;
                            self.reset_occurred = true;
                            debug!("state reset at t = {}", t_reset.real());
                            return Ok(AcceptOutcome::Reset(new_start));
                        }
                        Action::ResetEvents => {
                            interp = interp
                                .restrict(event_state_value, interp.current_state().clone());
                            continue 'outer;
                        }
                        Action::Continue => {
                            interp = interp
                                .restrict(event_state_value, interp.current_state().clone());
                            // only the detector that fired may cross again
                            // in the remainder; everyone else was advanced
                            if self.event_states[entry.order].evaluate_step(&interp)? {
                                if let Some(t_next) =
                                    self.event_states[entry.order].pending_time()
                                {
                                    queue.push(QueueEntry {
                                        key: sigma * t_next.real(),
                                        order: entry.order,
                                    });
                                }
                            }
                        }
                    }
                }

                // queue drained: one more sweep catches sign changes the
                // handlers induced between the last event and the step end
                let current = interp.current_state().clone();
                let mut found = false;
                for (order, event_state) in self.event_states.iter_mut().enumerate() {
                    if event_state.try_advance(&current, &interp)? {
                        if let Some(t_event) = event_state.pending_time() {
                            queue.push(QueueEntry {
                                key: sigma * t_event.real(),
                                order,
                            });
                            found = true;
                        }
                    }
                }
                if !found {
                    break;
                }
            }

            // end of step
            let current = interp.current_state().clone();
            if (current.time() - t_end).real().abs() <= ulp(t_end.real()) {
                self.is_last_step = true;
            }
            for handler in &self.step_handlers {
                let mut handler = handler.borrow_mut();
                handler.handle_step(&interp).map_err(OdeError::user)?;
                if self.is_last_step {
                    handler.finish(&current);
                }
            }
            return Ok(AcceptOutcome::Completed(current));
        }
    }
}
