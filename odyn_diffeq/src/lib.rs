//! Adaptive integration of ordinary differential equations with event
//! location.
//!
//! The engine advances a composite ODE — one primary system plus any
//! number of secondary systems sharing the integration — with an embedded
//! Runge-Kutta stepper, delivers dense-output interpolators to step
//! handlers, and locates user-defined events to a prescribed tolerance.
//! Event handlers can stop the integration, reset the state or its
//! derivatives, or ask for all events to be re-examined; the acceptance
//! loop keeps the delivered event sequence chronological even when a
//! handler mutates another detector's sign function mid-step.
//!
//! Everything is generic over [`scalar::Scalar`], so the same code
//! integrates plain `f64` trajectories or [`scalar::Dual`] trajectories
//! carrying sensitivities.
//!
//! ```
//! use odyn_diffeq::ode::{ExpandableOde, OrdinaryOde};
//! use odyn_diffeq::rk::DormandPrince45;
//! use odyn_diffeq::state::OdeState;
//! use odyn_diffeq::stepping::AdaptiveStepControl;
//!
//! struct Decay;
//!
//! impl OrdinaryOde<f64> for Decay {
//!     fn dimension(&self) -> usize {
//!         1
//!     }
//!
//!     fn derivatives(
//!         &mut self,
//!         _t: f64,
//!         y: &[f64],
//!         y_dot: &mut [f64],
//!     ) -> Result<(), odyn_diffeq::error::DynError> {
//!         y_dot[0] = -y[0];
//!         Ok(())
//!     }
//! }
//!
//! let mut ode = ExpandableOde::new(Decay);
//! let mut integrator = DormandPrince45::dormand_prince45(
//!     AdaptiveStepControl::default().with_tolerances(1e-10, 1e-10),
//! );
//! let final_state = integrator
//!     .integrate(&mut ode, OdeState::new(0.0, vec![1.0]), 1.0)
//!     .unwrap();
//! assert!((final_state.primary()[0] - (-1.0_f64).exp()).abs() < 1e-8);
//! ```

pub mod error;
pub mod events;
pub mod handlers;
pub mod integrator;
pub mod interpolation;
pub mod mapper;
pub mod ode;
pub mod rk;
pub mod state;
pub mod stepping;
pub mod tableau;

mod util;

pub use error::{DynError, OdeError};
pub use events::{Action, EventDetector};
pub use handlers::{CsvRecorder, MemoryRecorder, StepHandler};
pub use integrator::{Incrementor, IntegratorCore};
pub use interpolation::StepInterpolator;
pub use mapper::EquationsMapper;
pub use ode::{ExpandableOde, OrdinaryOde, SecondaryOde};
pub use rk::{ClassicalRk4, DormandPrince45, EmbeddedRungeKutta};
pub use state::{OdeState, OdeStateAndDerivative};
pub use stepping::{AdaptiveStepControl, FixedStepControl, StepControl};
pub use tableau::ButcherTableau;
