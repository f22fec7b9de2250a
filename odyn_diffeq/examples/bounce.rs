use std::cell::RefCell;
use std::rc::Rc;

use odyn_diffeq::error::DynError;
use odyn_diffeq::events::{Action, EventDetector};
use odyn_diffeq::ode::{ExpandableOde, OrdinaryOde};
use odyn_diffeq::rk::DormandPrince45;
use odyn_diffeq::state::OdeState;
use odyn_diffeq::stepping::AdaptiveStepControl;

/// A ball under gravity: y = (height, velocity).
struct FallingBall;

impl OrdinaryOde<f64> for FallingBall {
    fn dimension(&self) -> usize {
        2
    }

    fn derivatives(&mut self, _t: f64, y: &[f64], y_dot: &mut [f64]) -> Result<(), DynError> {
        y_dot[0] = y[1];
        y_dot[1] = -9.81;
        Ok(())
    }
}

/// Fires when the ball hits the floor and reflects its velocity.
struct Floor {
    restitution: f64,
}

impl EventDetector<f64> for Floor {
    fn g(&mut self, state: &OdeState<f64>) -> Result<f64, DynError> {
        Ok(state.primary()[0])
    }

    fn event_occurred(&mut self, state: &OdeState<f64>, _increasing: bool) -> Action {
        println!(
            "bounce at t = {:.6}, impact speed {:.4}",
            state.time(),
            state.primary()[1].abs()
        );
        Action::ResetState
    }

    fn reset_state(&mut self, state: &OdeState<f64>) -> OdeState<f64> {
        OdeState::new(
            state.time(),
            vec![0.0, -self.restitution * state.primary()[1]],
        )
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut ode = ExpandableOde::new(FallingBall);
    let mut integrator =
        DormandPrince45::dormand_prince45(AdaptiveStepControl::default().with_tolerances(
            1e-10, 1e-10,
        ));
    integrator
        .core_mut()
        .add_event_detector(Rc::new(RefCell::new(Floor { restitution: 0.8 })));

    let final_state = integrator.integrate(&mut ode, OdeState::new(0.0, vec![2.0, 0.0]), 5.0)?;
    println!(
        "at t = {:.3}: height {:.4}, velocity {:.4}",
        final_state.time(),
        final_state.primary()[0],
        final_state.primary()[1]
    );
    Ok(())
}
