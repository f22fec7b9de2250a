use std::error::Error as StdError;

use roots::RootError;
use thiserror::Error;

/// Failure type user callbacks report; the engine propagates it unchanged.
pub type DynError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
pub enum OdeError {
    #[error("integration interval too small: |tf - t0| = {interval:e} is below the {min:e} floor")]
    IntervalTooSmall { interval: f64, min: f64 },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("equation index {index} out of range [0, {max}]")]
    OutOfRange { index: usize, max: usize },

    #[error("maximum number of derivative evaluations ({max}) exceeded")]
    EvaluationLimitExceeded { max: usize },

    #[error("event root location failed")]
    RootNotBracketed(#[from] RootError),

    #[error("step size {step:e} fell below the {min:e} floor at t = {t} with the error still above tolerance")]
    MinStepUnderflow { step: f64, min: f64, t: f64 },

    #[error("user callback failed")]
    UserCallback(#[source] DynError),
}

impl OdeError {
    pub(crate) fn user(err: DynError) -> Self {
        Self::UserCallback(err)
    }
}
