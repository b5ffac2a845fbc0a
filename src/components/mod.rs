//! Structural components of a dynamic linear model.
//!
//! Each component contributes one block of the latent state: an evaluation
//! vector, a transition matrix, a prior and a discount vector. The builder
//! concatenates the blocks into the global state-space model.

mod autoreg;
mod dynamic;
mod long_season;
mod seasonality;
mod trend;

pub use autoreg::AutoReg;
pub use dynamic::Dynamic;
pub use long_season::LongSeason;
pub use seasonality::Seasonality;
pub use trend::Trend;

use crate::error::{DlmError, Result};
use crate::linalg::is_symmetric;
use nalgebra::{DMatrix, DVector};

/// Default discount factor for new components.
pub const DEFAULT_DISCOUNT: f64 = 0.99;

/// Default scale of the prior covariance (`w · I`).
pub const DEFAULT_PRIOR_SCALE: f64 = 100.0;

/// How a component's evaluation evolves over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// Evaluation and transition never change.
    Static,
    /// Evaluation is an externally supplied feature row per step.
    Dynamic,
    /// Evaluation is derived by the component itself per step.
    Automatic,
}

/// Validate a discount factor, returning it unchanged when it lies in (0, 1].
pub fn validate_discount(discount: f64) -> Result<f64> {
    if discount > 0.0 && discount <= 1.0 {
        Ok(discount)
    } else {
        Err(DlmError::InvalidDiscount(discount))
    }
}

/// Matrices and settings shared by every component variant.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    name: String,
    discount: Vec<f64>,
    evaluation: DVector<f64>,
    transition: DMatrix<f64>,
    mean_prior: DVector<f64>,
    cov_prior: DMatrix<f64>,
}

impl Block {
    /// Placeholder block of dimension `d`; the owning variant fills in the matrices.
    pub(crate) fn new(name: &str, d: usize, discount: f64) -> Result<Self> {
        if d == 0 {
            return Err(DlmError::InvalidParameter(format!(
                "component '{}' must have positive dimension",
                name
            )));
        }
        let discount = validate_discount(discount)?;
        Ok(Self {
            name: name.to_string(),
            discount: vec![discount; d],
            evaluation: DVector::zeros(d),
            transition: DMatrix::identity(d, d),
            mean_prior: DVector::zeros(d),
            cov_prior: DMatrix::identity(d, d),
        })
    }
}

/// Common interface of all components.
///
/// Implementors provide the `create_*` constructors and access to their
/// [`Block`]; everything else has a default implementation.
pub trait StateComponent {
    fn block(&self) -> &Block;

    fn block_mut(&mut self) -> &mut Block;

    fn kind(&self) -> ComponentKind;

    /// Evaluation vector at absolute time index `step`.
    fn create_evaluation(&self, step: usize) -> Result<DVector<f64>>;

    fn create_transition(&self) -> DMatrix<f64>;

    fn create_mean_prior(&self) -> DVector<f64>;

    fn create_cov_prior(&self) -> DMatrix<f64>;

    fn name(&self) -> &str {
        &self.block().name
    }

    fn dimension(&self) -> usize {
        self.block().discount.len()
    }

    fn discount(&self) -> &[f64] {
        &self.block().discount
    }

    /// Current evaluation vector.
    fn evaluation(&self) -> &DVector<f64> {
        &self.block().evaluation
    }

    fn transition(&self) -> &DMatrix<f64> {
        &self.block().transition
    }

    fn mean_prior(&self) -> &DVector<f64> {
        &self.block().mean_prior
    }

    fn cov_prior(&self) -> &DMatrix<f64> {
        &self.block().cov_prior
    }

    fn is_time_varying(&self) -> bool {
        self.kind() != ComponentKind::Static
    }

    /// Replace every entry of the discount vector with `discount`.
    fn set_discount(&mut self, discount: f64) -> Result<()> {
        let discount = validate_discount(discount)?;
        self.block_mut().discount.fill(discount);
        Ok(())
    }

    /// Replace the discount vector with one value per latent dimension.
    fn set_discounts(&mut self, discounts: &[f64]) -> Result<()> {
        if discounts.len() != self.dimension() {
            return Err(DlmError::DimensionMismatch(format!(
                "component '{}' has dimension {} but {} discounts were given",
                self.name(),
                self.dimension(),
                discounts.len()
            )));
        }
        for &d in discounts {
            validate_discount(d)?;
        }
        self.block_mut().discount = discounts.to_vec();
        Ok(())
    }

    /// Advance the stored evaluation to `step`.
    fn update_evaluation(&mut self, step: usize) -> Result<()> {
        let evaluation = self.create_evaluation(step)?;
        self.set_evaluation(evaluation)
    }

    /// Overwrite the stored evaluation (used to inject out-of-sample features).
    fn set_evaluation(&mut self, evaluation: DVector<f64>) -> Result<()> {
        if evaluation.len() != self.dimension() {
            return Err(DlmError::DimensionMismatch(format!(
                "component '{}' expects {} features, got {}",
                self.name(),
                self.dimension(),
                evaluation.len()
            )));
        }
        self.block_mut().evaluation = evaluation;
        Ok(())
    }

    /// Validate that the block matrices agree with the dimension and that the
    /// prior covariance is symmetric.
    fn check_dimensions(&self) -> Result<()> {
        let d = self.dimension();
        let block = self.block();
        let name = &block.name;

        if block.evaluation.len() != d {
            return Err(DlmError::DimensionMismatch(format!(
                "component '{}': evaluation has length {}, expected {}",
                name,
                block.evaluation.len(),
                d
            )));
        }
        if block.transition.shape() != (d, d) {
            return Err(DlmError::DimensionMismatch(format!(
                "component '{}': transition is {:?}, expected ({}, {})",
                name,
                block.transition.shape(),
                d,
                d
            )));
        }
        if block.mean_prior.len() != d {
            return Err(DlmError::DimensionMismatch(format!(
                "component '{}': mean prior has length {}, expected {}",
                name,
                block.mean_prior.len(),
                d
            )));
        }
        if block.cov_prior.shape() != (d, d) {
            return Err(DlmError::DimensionMismatch(format!(
                "component '{}': covariance prior is {:?}, expected ({}, {})",
                name,
                block.cov_prior.shape(),
                d,
                d
            )));
        }
        if !is_symmetric(&block.cov_prior) {
            return Err(DlmError::DimensionMismatch(format!(
                "component '{}': covariance prior is not symmetric",
                name
            )));
        }
        if block.cov_prior.diagonal().iter().any(|&v| v < 0.0 || !v.is_finite()) {
            return Err(DlmError::InvalidParameter(format!(
                "component '{}': covariance prior must have a non-negative finite diagonal",
                name
            )));
        }
        Ok(())
    }

    fn with_name(mut self, name: &str) -> Self
    where
        Self: Sized,
    {
        self.block_mut().name = name.to_string();
        self
    }

    /// Use a custom prior mean instead of zeros.
    fn with_mean_prior(mut self, mean: DVector<f64>) -> Self
    where
        Self: Sized,
    {
        self.block_mut().mean_prior = mean;
        self
    }

    /// Use a custom prior covariance instead of `w · I`.
    fn with_cov_prior(mut self, cov: DMatrix<f64>) -> Self
    where
        Self: Sized,
    {
        self.block_mut().cov_prior = cov;
        self
    }

    /// Per-dimension discounts instead of one shared value.
    fn with_discounts(mut self, discounts: &[f64]) -> Result<Self>
    where
        Self: Sized,
    {
        self.set_discounts(discounts)?;
        Ok(self)
    }
}

/// Components whose evaluation is backed by a per-step data sequence that
/// moves with the observed series.
pub trait TimeVarying: StateComponent {
    /// One time step worth of backing data.
    type Datum;

    /// Number of time steps of backing data.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn append_new_data(&mut self, data: Vec<Self::Datum>) -> Result<()>;

    /// Remove the data at index `date`; later steps shift down by one.
    fn popout(&mut self, date: usize) -> Result<()>;

    fn alter(&mut self, date: usize, datum: Self::Datum) -> Result<()>;
}

/// Fill a component's block from its `create_*` constructors.
pub(crate) fn assemble<C: StateComponent>(component: &mut C) -> Result<()> {
    let evaluation = component.create_evaluation(0)?;
    let transition = component.create_transition();
    let mean_prior = component.create_mean_prior();
    let cov_prior = component.create_cov_prior();

    let block = component.block_mut();
    block.evaluation = evaluation;
    block.transition = transition;
    block.mean_prior = mean_prior;
    block.cov_prior = cov_prior;
    Ok(())
}

/// Tagged union of every component variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Trend(Trend),
    Seasonality(Seasonality),
    Dynamic(Dynamic),
    AutoReg(AutoReg),
    LongSeason(LongSeason),
}

macro_rules! dispatch {
    ($self:expr, $c:ident => $body:expr) => {
        match $self {
            Component::Trend($c) => $body,
            Component::Seasonality($c) => $body,
            Component::Dynamic($c) => $body,
            Component::AutoReg($c) => $body,
            Component::LongSeason($c) => $body,
        }
    };
}

impl StateComponent for Component {
    fn block(&self) -> &Block {
        dispatch!(self, c => c.block())
    }

    fn block_mut(&mut self) -> &mut Block {
        dispatch!(self, c => c.block_mut())
    }

    fn kind(&self) -> ComponentKind {
        dispatch!(self, c => c.kind())
    }

    fn create_evaluation(&self, step: usize) -> Result<DVector<f64>> {
        dispatch!(self, c => c.create_evaluation(step))
    }

    fn create_transition(&self) -> DMatrix<f64> {
        dispatch!(self, c => c.create_transition())
    }

    fn create_mean_prior(&self) -> DVector<f64> {
        dispatch!(self, c => c.create_mean_prior())
    }

    fn create_cov_prior(&self) -> DMatrix<f64> {
        dispatch!(self, c => c.create_cov_prior())
    }
}

impl Component {
    pub fn as_dynamic_mut(&mut self) -> Option<&mut Dynamic> {
        match self {
            Component::Dynamic(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_autoreg(&self) -> Option<&AutoReg> {
        match self {
            Component::AutoReg(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_autoreg_mut(&mut self) -> Option<&mut AutoReg> {
        match self {
            Component::AutoReg(c) => Some(c),
            _ => None,
        }
    }
}

impl From<Trend> for Component {
    fn from(c: Trend) -> Self {
        Component::Trend(c)
    }
}

impl From<Seasonality> for Component {
    fn from(c: Seasonality) -> Self {
        Component::Seasonality(c)
    }
}

impl From<Dynamic> for Component {
    fn from(c: Dynamic) -> Self {
        Component::Dynamic(c)
    }
}

impl From<AutoReg> for Component {
    fn from(c: AutoReg) -> Self {
        Component::AutoReg(c)
    }
}

impl From<LongSeason> for Component {
    fn from(c: LongSeason) -> Self {
        Component::LongSeason(c)
    }
}
