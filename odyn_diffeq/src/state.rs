//! Trajectory state values.
//!
//! A state is a time plus a primary block and zero or more secondary blocks.
//! The block layout inside the flat complete vector is owned by the
//! [`EquationsMapper`](crate::mapper::EquationsMapper); states themselves
//! only know their blocks. Both types are immutable once built.

use scalar::Scalar;

/// `(t, y)` split into the primary block and the ordered secondary blocks.
#[derive(Clone, Debug, PartialEq)]
pub struct OdeState<S: Scalar> {
    time: S,
    primary: Vec<S>,
    secondary: Vec<Vec<S>>,
}

impl<S: Scalar> OdeState<S> {
    pub fn new(time: S, primary: Vec<S>) -> Self {
        Self {
            time,
            primary,
            secondary: Vec::new(),
        }
    }

    /// Appends one secondary block; registration order is significant and
    /// must match the order the equations were added to the composite ODE.
    pub fn with_secondary(mut self, block: Vec<S>) -> Self {
        self.secondary.push(block);
        self
    }

    pub fn time(&self) -> S {
        self.time
    }

    pub fn primary(&self) -> &[S] {
        &self.primary
    }

    /// Secondary block `index`, 1-based as in the mapper.
    pub fn secondary(&self, index: usize) -> &[S] {
        &self.secondary[index - 1]
    }

    pub fn number_of_secondary(&self) -> usize {
        self.secondary.len()
    }

    pub fn primary_dimension(&self) -> usize {
        self.primary.len()
    }

    pub fn total_dimension(&self) -> usize {
        self.primary.len() + self.secondary.iter().map(Vec::len).sum::<usize>()
    }

    /// Concatenation of all blocks, primary first.
    pub fn complete(&self) -> Vec<S> {
        let mut complete = Vec::with_capacity(self.total_dimension());
        complete.extend_from_slice(&self.primary);
        for block in &self.secondary {
            complete.extend_from_slice(block);
        }
        complete
    }
}

/// A state together with its derivative, block for block.
#[derive(Clone, Debug, PartialEq)]
pub struct OdeStateAndDerivative<S: Scalar> {
    state: OdeState<S>,
    primary_derivative: Vec<S>,
    secondary_derivative: Vec<Vec<S>>,
}

impl<S: Scalar> OdeStateAndDerivative<S> {
    pub(crate) fn new(
        state: OdeState<S>,
        primary_derivative: Vec<S>,
        secondary_derivative: Vec<Vec<S>>,
    ) -> Self {
        Self {
            state,
            primary_derivative,
            secondary_derivative,
        }
    }

    pub fn time(&self) -> S {
        self.state.time()
    }

    pub fn state(&self) -> &OdeState<S> {
        &self.state
    }

    pub fn primary(&self) -> &[S] {
        self.state.primary()
    }

    pub fn secondary(&self, index: usize) -> &[S] {
        self.state.secondary(index)
    }

    pub fn primary_derivative(&self) -> &[S] {
        &self.primary_derivative
    }

    /// Derivative of secondary block `index`, 1-based as in the mapper.
    pub fn secondary_derivative(&self, index: usize) -> &[S] {
        &self.secondary_derivative[index - 1]
    }

    pub fn total_dimension(&self) -> usize {
        self.state.total_dimension()
    }

    pub fn complete(&self) -> Vec<S> {
        self.state.complete()
    }

    /// Concatenation of all derivative blocks, primary first.
    pub fn complete_derivative(&self) -> Vec<S> {
        let mut complete = Vec::with_capacity(self.state.total_dimension());
        complete.extend_from_slice(&self.primary_derivative);
        for block in &self.secondary_derivative {
            complete.extend_from_slice(block);
        }
        complete
    }
}
