//! The composite right-hand side: one primary system plus an ordered list
//! of secondary systems sharing the same integration.

use scalar::Scalar;

use crate::error::{DynError, OdeError};
use crate::mapper::EquationsMapper;
use crate::state::OdeState;

/// The primary system. Its local error governs step-size control.
pub trait OrdinaryOde<S: Scalar> {
    fn dimension(&self) -> usize;

    /// Called once at the start of each integration.
    fn init(&mut self, _t0: S, _y0: &[S], _t_final: S) -> Result<(), DynError> {
        Ok(())
    }

    /// Computes the derivative at `(t, y)`, storing it in `y_dot`.
    fn derivatives(&mut self, t: S, y: &[S], y_dot: &mut [S]) -> Result<(), DynError>;
}

/// An auxiliary system that rides along without affecting error control.
///
/// `primary_dot` is mutable on purpose: a secondary may overwrite the
/// primary derivative (co-state coupling), and the composite inserts the
/// primary block last so such overrides land in the complete derivative.
pub trait SecondaryOde<S: Scalar> {
    fn dimension(&self) -> usize;

    fn init(
        &mut self,
        _t0: S,
        _primary0: &[S],
        _secondary0: &[S],
        _t_final: S,
    ) -> Result<(), DynError> {
        Ok(())
    }

    fn derivatives(
        &mut self,
        t: S,
        primary: &[S],
        primary_dot: &mut [S],
        secondary: &[S],
        secondary_dot: &mut [S],
    ) -> Result<(), DynError>;
}

/// The expandable composite ODE. Secondary equations are registered before
/// `integrate` and numbered from 1 in registration order; the mapper is
/// owned here and reflects every registered equation.
pub struct ExpandableOde<S: Scalar> {
    primary: Box<dyn OrdinaryOde<S>>,
    secondary: Vec<Box<dyn SecondaryOde<S>>>,
    mapper: EquationsMapper,
}

impl<S: Scalar> ExpandableOde<S> {
    pub fn new(primary: impl OrdinaryOde<S> + 'static) -> Self {
        let mapper = EquationsMapper::new(primary.dimension());
        Self {
            primary: Box::new(primary),
            secondary: Vec::new(),
            mapper,
        }
    }

    /// Registers a secondary equation and returns its index (the count of
    /// secondaries after insertion).
    pub fn add_secondary(&mut self, equation: impl SecondaryOde<S> + 'static) -> usize {
        let index = self.mapper.add_equation(equation.dimension());
        self.secondary.push(Box::new(equation));
        index
    }

    pub fn mapper(&self) -> &EquationsMapper {
        &self.mapper
    }

    /// Initializes the primary equation, then each secondary in order.
    pub fn init(&mut self, initial: &OdeState<S>, t_final: S) -> Result<(), OdeError> {
        let t0 = initial.time();
        self.primary
            .init(t0, initial.primary(), t_final)
            .map_err(OdeError::user)?;
        for (k, equation) in self.secondary.iter_mut().enumerate() {
            equation
                .init(t0, initial.primary(), initial.secondary(k + 1), t_final)
                .map_err(OdeError::user)?;
        }
        Ok(())
    }

    /// Computes the complete derivative at `(t, y)`.
    ///
    /// The primary derivative is computed first and handed to each
    /// secondary, then inserted into the complete vector last so secondary
    /// overrides of the primary block take effect.
    pub fn compute_derivatives(&mut self, t: S, y: &[S]) -> Result<Vec<S>, OdeError> {
        let total = self.mapper.total_dimension();
        if y.len() != total {
            return Err(OdeError::DimensionMismatch {
                expected: total,
                actual: y.len(),
            });
        }
        let mut y_dot = vec![S::zero(); total];
        let primary = self.mapper.extract(0, y)?;
        let mut primary_dot = vec![S::zero(); primary.len()];
        self.primary
            .derivatives(t, &primary, &mut primary_dot)
            .map_err(OdeError::user)?;
        for (k, equation) in self.secondary.iter_mut().enumerate() {
            let index = k + 1;
            let block = self.mapper.extract(index, y)?;
            let mut block_dot = vec![S::zero(); block.len()];
            equation
                .derivatives(t, &primary, &mut primary_dot, &block, &mut block_dot)
                .map_err(OdeError::user)?;
            self.mapper.insert(index, &block_dot, &mut y_dot)?;
        }
        self.mapper.insert(0, &primary_dot, &mut y_dot)?;
        Ok(y_dot)
    }
}
