//! Block bookkeeping for the concatenated state vector.

use scalar::Scalar;

use crate::error::OdeError;
use crate::state::{OdeState, OdeStateAndDerivative};

/// Knows each equation block's offset and width inside the complete vector.
///
/// Index 0 is the primary block; secondaries are numbered from 1 in
/// registration order. The mapper is append-only for the lifetime of its
/// composite ODE.
#[derive(Clone, Debug)]
pub struct EquationsMapper {
    /// Block boundaries: block `i` spans `start[i]..start[i + 1]`.
    start: Vec<usize>,
}

impl EquationsMapper {
    pub(crate) fn new(primary_dimension: usize) -> Self {
        Self {
            start: vec![0, primary_dimension],
        }
    }

    /// Registers one more block and returns its index, which equals the
    /// number of secondary equations after insertion.
    pub(crate) fn add_equation(&mut self, dimension: usize) -> usize {
        let total = self.total_dimension();
        self.start.push(total + dimension);
        self.number_of_equations() - 1
    }

    /// Number of registered equations, primary included.
    pub fn number_of_equations(&self) -> usize {
        self.start.len() - 1
    }

    pub fn total_dimension(&self) -> usize {
        *self.start.last().unwrap()
    }

    /// Width of block `index`.
    pub fn dimension(&self, index: usize) -> Result<usize, OdeError> {
        self.check_index(index)?;
        Ok(self.start[index + 1] - self.start[index])
    }

    /// Copies block `index` out of a complete vector.
    pub fn extract<S: Scalar>(&self, index: usize, complete: &[S]) -> Result<Vec<S>, OdeError> {
        self.check_index(index)?;
        self.check_complete(complete.len())?;
        Ok(complete[self.start[index]..self.start[index + 1]].to_vec())
    }

    /// Writes `block` into a complete vector at the index's offset.
    pub fn insert<S: Scalar>(
        &self,
        index: usize,
        block: &[S],
        complete: &mut [S],
    ) -> Result<(), OdeError> {
        self.check_index(index)?;
        self.check_complete(complete.len())?;
        let width = self.start[index + 1] - self.start[index];
        if block.len() != width {
            return Err(OdeError::DimensionMismatch {
                expected: width,
                actual: block.len(),
            });
        }
        complete[self.start[index]..self.start[index + 1]].copy_from_slice(block);
        Ok(())
    }

    /// Builds a block-structured state-and-derivative from complete vectors.
    pub fn map_state_and_derivative<S: Scalar>(
        &self,
        time: S,
        y: &[S],
        y_dot: &[S],
    ) -> Result<OdeStateAndDerivative<S>, OdeError> {
        self.check_complete(y.len())?;
        self.check_complete(y_dot.len())?;
        let mut state = OdeState::new(time, self.extract(0, y)?);
        let mut secondary_derivative = Vec::with_capacity(self.number_of_equations() - 1);
        for index in 1..self.number_of_equations() {
            state = state.with_secondary(self.extract(index, y)?);
            secondary_derivative.push(self.extract(index, y_dot)?);
        }
        Ok(OdeStateAndDerivative::new(
            state,
            self.extract(0, y_dot)?,
            secondary_derivative,
        ))
    }

    fn check_index(&self, index: usize) -> Result<(), OdeError> {
        if index >= self.number_of_equations() {
            return Err(OdeError::OutOfRange {
                index,
                max: self.number_of_equations() - 1,
            });
        }
        Ok(())
    }

    fn check_complete(&self, len: usize) -> Result<(), OdeError> {
        if len != self.total_dimension() {
            return Err(OdeError::DimensionMismatch {
                expected: self.total_dimension(),
                actual: len,
            });
        }
        Ok(())
    }
}
