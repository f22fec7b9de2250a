//! Step handlers: callbacks that observe every accepted step.
//!
//! Handlers receive the step's dense-output interpolator and may sample it
//! at any interior time. Two ready-made handlers are provided: an
//! in-memory recorder and a csv stream.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use csv::Writer;
use scalar::Scalar;

use crate::error::DynError;
use crate::interpolation::StepInterpolator;
use crate::state::OdeStateAndDerivative;

pub trait StepHandler<S: Scalar> {
    /// Called once at the start of each integration.
    fn init(&mut self, _initial: &OdeStateAndDerivative<S>, _target: S) {}

    /// Called for every accepted step (or part of a step, when an event
    /// split it).
    fn handle_step(&mut self, interpolator: &StepInterpolator<S>) -> Result<(), DynError>;

    /// Called once after the last step or a stopping event.
    fn finish(&mut self, _final_state: &OdeStateAndDerivative<S>) {}
}

/// Records `(t, y)` at the end of every accepted step in a preallocated,
/// doubling buffer that is trimmed when the integration finishes.
#[derive(Debug)]
pub struct MemoryRecorder {
    pub t: Vec<f64>,
    pub y: Vec<Vec<f64>>,
    len: usize,
}

impl Default for MemoryRecorder {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl MemoryRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            t: vec![0.0; capacity.max(1)],
            y: vec![Vec::new(); capacity.max(1)],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn insert(&mut self, t: f64, y: Vec<f64>) {
        if self.len == self.t.len() {
            self.extend();
        }
        self.t[self.len] = t;
        self.y[self.len] = y;
        self.len += 1;
    }

    // doubles the buffers when capacity is reached
    fn extend(&mut self) {
        let capacity = self.t.len();
        self.t.extend(vec![0.0; capacity]);
        self.y.extend(vec![Vec::new(); capacity]);
    }

    fn truncate(&mut self) {
        self.t.truncate(self.len);
        self.y.truncate(self.len);
    }
}

impl<S: Scalar> StepHandler<S> for MemoryRecorder {
    fn init(&mut self, initial: &OdeStateAndDerivative<S>, _target: S) {
        self.len = 0;
        let y = initial.complete().iter().map(|v| v.real()).collect();
        self.insert(initial.time().real(), y);
    }

    fn handle_step(&mut self, interpolator: &StepInterpolator<S>) -> Result<(), DynError> {
        let current = interpolator.current_state();
        let y = current.complete().iter().map(|v| v.real()).collect();
        self.insert(current.time().real(), y);
        Ok(())
    }

    fn finish(&mut self, _final_state: &OdeStateAndDerivative<S>) {
        self.truncate();
    }
}

/// Streams the end state of every accepted step to a csv file, through the
/// real projection of the scalar.
pub struct CsvRecorder {
    writer: Writer<BufWriter<File>>,
    header_written: bool,
}

impl CsvRecorder {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, DynError> {
        let file = File::create(path)?;
        Ok(Self {
            writer: Writer::from_writer(BufWriter::new(file)),
            header_written: false,
        })
    }

    fn write_row<S: Scalar>(&mut self, state: &OdeStateAndDerivative<S>) -> Result<(), DynError> {
        if !self.header_written {
            let mut header = vec!["t".to_string()];
            header.extend((0..state.total_dimension()).map(|i| format!("y{i}")));
            self.writer.write_record(&header)?;
            self.header_written = true;
        }
        let mut row = vec![state.time().real().to_string()];
        row.extend(state.complete().iter().map(|v| v.real().to_string()));
        self.writer.write_record(&row)?;
        Ok(())
    }
}

impl<S: Scalar> StepHandler<S> for CsvRecorder {
    fn init(&mut self, initial: &OdeStateAndDerivative<S>, _target: S) {
        let _ = self.write_row(initial);
    }

    fn handle_step(&mut self, interpolator: &StepInterpolator<S>) -> Result<(), DynError> {
        self.write_row(interpolator.current_state())
    }

    fn finish(&mut self, _final_state: &OdeStateAndDerivative<S>) {
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::OdeState;

    fn sample(t: f64) -> OdeStateAndDerivative<f64> {
        OdeStateAndDerivative::new(OdeState::new(t, vec![t, -t]), vec![1.0, -1.0], Vec::new())
    }

    #[test]
    fn test_memory_recorder_grows_and_truncates() {
        let mut recorder = MemoryRecorder::new(2);
        StepHandler::<f64>::init(&mut recorder, &sample(0.0), 10.0);
        for i in 1..=5 {
            let interpolator =
                StepInterpolator::new(true, sample(f64::from(i) - 1.0), sample(f64::from(i)));
            StepHandler::<f64>::handle_step(&mut recorder, &interpolator).unwrap();
        }
        StepHandler::<f64>::finish(&mut recorder, &sample(5.0));
        assert_eq!(recorder.len(), 6);
        assert_eq!(recorder.t.len(), 6);
        assert_eq!(recorder.t, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(recorder.y[3], vec![3.0, -3.0]);
    }

    #[test]
    fn test_memory_recorder_resets_on_init() {
        let mut recorder = MemoryRecorder::new(4);
        StepHandler::<f64>::init(&mut recorder, &sample(0.0), 1.0);
        StepHandler::<f64>::init(&mut recorder, &sample(2.0), 3.0);
        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.t[0], 2.0);
    }
}
