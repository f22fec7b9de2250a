use std::cell::RefCell;
use std::rc::Rc;

use odyn_diffeq::error::DynError;
use odyn_diffeq::handlers::MemoryRecorder;
use odyn_diffeq::ode::{ExpandableOde, OrdinaryOde};
use odyn_diffeq::rk::DormandPrince45;
use odyn_diffeq::state::OdeState;
use odyn_diffeq::stepping::AdaptiveStepControl;

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

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut ode = ExpandableOde::new(Harmonic);
    let recorder = Rc::new(RefCell::new(MemoryRecorder::default()));

    let mut integrator = DormandPrince45::dormand_prince45(
        AdaptiveStepControl::default().with_tolerances(1e-10, 1e-10),
    );
    integrator.core_mut().add_step_handler(recorder.clone());

    let final_state = integrator.integrate(&mut ode, OdeState::new(0.0, vec![0.0, 1.0]), 10.0)?;

    let recorder = recorder.borrow();
    for i in 0..recorder.len() {
        println!(
            "{:10.6}     {:10.6}     {:10.6}",
            recorder.t[i], recorder.y[i][0], recorder.y[i][1]
        );
    }
    println!(
        "final error vs sin/cos: {:.3e}",
        (final_state.primary()[0] - 10.0_f64.sin()).abs()
    );
    Ok(())
}
