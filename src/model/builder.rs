//! Assembles components into a single block-diagonal state-space model.

use super::StateSpaceModel;
use crate::components::{validate_discount, Component, ComponentKind, StateComponent};
use crate::error::{DlmError, Result};
use crate::linalg::{block_diag, concat};
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;
use std::ops::Range;
use tracing::debug;

/// Prior captured at initialization, restored whenever filtering restarts.
#[derive(Debug, Clone, PartialEq)]
struct Prior {
    state: DVector<f64>,
    sys_var: DMatrix<f64>,
    noise_var: f64,
}

/// Registry of components and the model assembled from them.
///
/// Components are laid out static first, then dynamic, then automatic, each
/// group in insertion order. [`ModelBuilder::index`] maps a component name to
/// its slice of the global state.
///
/// # Example
/// ```
/// use anofox_dlm::components::{Seasonality, Trend};
/// use anofox_dlm::model::ModelBuilder;
///
/// let mut builder = ModelBuilder::new();
/// builder.add(Trend::new(1, 0.98).unwrap()).unwrap();
/// builder.add(Seasonality::new(7, 0.99).unwrap()).unwrap();
/// builder.initialize(1.0).unwrap();
///
/// assert_eq!(builder.dimension(), 9);
/// assert_eq!(builder.index("seasonality"), Some(2..9));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    static_components: Vec<Component>,
    dynamic_components: Vec<Component>,
    automatic_components: Vec<Component>,
    index: HashMap<String, Range<usize>>,
    discount: Vec<f64>,
    prior: Option<Prior>,
    model: Option<StateSpaceModel>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn group_mut(&mut self, kind: ComponentKind) -> &mut Vec<Component> {
        match kind {
            ComponentKind::Static => &mut self.static_components,
            ComponentKind::Dynamic => &mut self.dynamic_components,
            ComponentKind::Automatic => &mut self.automatic_components,
        }
    }

    fn invalidate(&mut self) {
        self.model = None;
        self.prior = None;
        self.index.clear();
        self.discount.clear();
    }

    /// Register a component. Names must be unique across all groups.
    pub fn add(&mut self, component: impl Into<Component>) -> Result<()> {
        let component = component.into();
        if self.get(component.name()).is_some() {
            return Err(DlmError::NameCollision(component.name().to_string()));
        }
        component.check_dimensions()?;

        debug!(name = component.name(), kind = ?component.kind(), "adding component");
        self.group_mut(component.kind()).push(component);
        self.invalidate();
        Ok(())
    }

    /// Remove and return a component.
    pub fn delete(&mut self, name: &str) -> Result<Component> {
        for kind in [
            ComponentKind::Static,
            ComponentKind::Dynamic,
            ComponentKind::Automatic,
        ] {
            let group = self.group_mut(kind);
            if let Some(pos) = group.iter().position(|c| c.name() == name) {
                let removed = group.remove(pos);
                self.invalidate();
                return Ok(removed);
            }
        }
        Err(DlmError::NotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Component> {
        self.components().find(|c| c.name() == name)
    }

    /// Mutable access to a component. Call [`ModelBuilder::update_evaluation`]
    /// afterwards so the global evaluation picks up any change.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Component> {
        self.components_mut().find(|c| c.name() == name)
    }

    /// All components in layout order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.static_components
            .iter()
            .chain(self.dynamic_components.iter())
            .chain(self.automatic_components.iter())
    }

    pub fn components_mut(&mut self) -> impl Iterator<Item = &mut Component> {
        self.static_components
            .iter_mut()
            .chain(self.dynamic_components.iter_mut())
            .chain(self.automatic_components.iter_mut())
    }

    /// Dynamic and automatic components, in layout order.
    pub fn time_varying(&self) -> impl Iterator<Item = &Component> {
        self.dynamic_components
            .iter()
            .chain(self.automatic_components.iter())
    }

    pub fn time_varying_mut(&mut self) -> impl Iterator<Item = &mut Component> {
        self.dynamic_components
            .iter_mut()
            .chain(self.automatic_components.iter_mut())
    }

    pub fn has_time_varying(&self) -> bool {
        !self.dynamic_components.is_empty() || !self.automatic_components.is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        self.model.is_some()
    }

    /// Slice of the global state that belongs to `name`.
    pub fn index(&self, name: &str) -> Option<Range<usize>> {
        self.index.get(name).cloned()
    }

    /// Total latent dimension.
    pub fn dimension(&self) -> usize {
        self.components().map(|c| c.dimension()).sum()
    }

    /// Concatenated discount vector in layout order (empty before initialization).
    pub fn discount(&self) -> &[f64] {
        &self.discount
    }

    /// Index ranges of every component in layout order.
    pub fn blocks(&self) -> Vec<Range<usize>> {
        self.components()
            .filter_map(|c| self.index.get(c.name()).cloned())
            .collect()
    }

    pub fn model(&self) -> Result<&StateSpaceModel> {
        self.model.as_ref().ok_or(DlmError::NotInitialized)
    }

    pub fn model_mut(&mut self) -> Result<&mut StateSpaceModel> {
        self.model.as_mut().ok_or(DlmError::NotInitialized)
    }

    /// Assemble the global model from the registered components.
    pub fn initialize(&mut self, prior_noise_var: f64) -> Result<()> {
        if self.static_components.is_empty() {
            return Err(DlmError::EmptyModel);
        }

        let mut index = HashMap::new();
        let mut offset = 0;
        for c in self.components() {
            let d = c.dimension();
            index.insert(c.name().to_string(), offset..offset + d);
            offset += d;
        }

        let transitions: Vec<&DMatrix<f64>> = self.components().map(|c| c.transition()).collect();
        let covs: Vec<&DMatrix<f64>> = self.components().map(|c| c.cov_prior()).collect();
        let evaluations: Vec<&DVector<f64>> = self.components().map(|c| c.evaluation()).collect();
        let means: Vec<&DVector<f64>> = self.components().map(|c| c.mean_prior()).collect();

        let transition = block_diag(&transitions);
        let sys_var = block_diag(&covs);
        let evaluation = concat(&evaluations);
        let state = concat(&means);
        let discount: Vec<f64> = self
            .components()
            .flat_map(|c| c.discount().iter().copied())
            .collect();

        let model = StateSpaceModel::new(transition, evaluation, state.clone(), sys_var.clone(), prior_noise_var)?;

        debug!(dimension = offset, prior_noise_var, "model initialized");
        self.index = index;
        self.discount = discount;
        self.prior = Some(Prior {
            state,
            sys_var,
            noise_var: prior_noise_var,
        });
        self.model = Some(model);
        Ok(())
    }

    /// Restore the committed estimate to the initialization prior (`df = 1`).
    pub fn reset_to_prior(&mut self) -> Result<()> {
        let prior = self.prior.clone().ok_or(DlmError::NotInitialized)?;
        let model = self.model_mut()?;
        model.load(prior.state, prior.sys_var, prior.noise_var, 1.0);
        Ok(())
    }

    /// Check that every time-varying component can produce an evaluation at `step`.
    pub fn ensure_evaluations(&self, step: usize) -> Result<()> {
        for c in self.time_varying() {
            c.create_evaluation(step)?;
        }
        Ok(())
    }

    /// Advance every time-varying component to `step` and splice the new
    /// evaluations into the global evaluation vector.
    pub fn update_evaluation(&mut self, step: usize) -> Result<()> {
        if !self.has_time_varying() {
            return Err(DlmError::InvalidParameter(
                "model has no dynamic or automatic components".into(),
            ));
        }
        let rows = self
            .time_varying()
            .map(|c| Ok((c.name().to_string(), c.create_evaluation(step)?)))
            .collect::<Result<Vec<_>>>()?;
        for (name, row) in rows {
            self.set_component_evaluation(&name, row)?;
        }
        Ok(())
    }

    /// Overwrite one component's evaluation and its slice of the global evaluation.
    pub fn set_component_evaluation(&mut self, name: &str, row: DVector<f64>) -> Result<()> {
        let range = self.index(name).ok_or(DlmError::NotInitialized)?;
        let component = self
            .get_mut(name)
            .ok_or_else(|| DlmError::NotFound(name.to_string()))?;
        component.set_evaluation(row.clone())?;

        let model = self.model_mut()?;
        model.evaluation.rows_mut(range.start, range.len()).copy_from(&row);
        Ok(())
    }

    /// Change one component's discount and its slice of the global discount vector.
    pub fn set_discount(&mut self, name: &str, discount: f64) -> Result<()> {
        let component = self
            .get_mut(name)
            .ok_or_else(|| DlmError::NotFound(name.to_string()))?;
        component.set_discount(discount)?;
        if let Some(range) = self.index(name) {
            self.discount[range].fill(discount);
        }
        Ok(())
    }

    /// Replace the global discount vector, one value per latent dimension,
    /// and push each slice down to its component.
    pub fn set_discounts(&mut self, discount: &[f64]) -> Result<()> {
        if !self.is_initialized() {
            return Err(DlmError::NotInitialized);
        }
        if discount.len() != self.discount.len() {
            return Err(DlmError::DimensionMismatch(format!(
                "model has dimension {} but {} discounts were given",
                self.discount.len(),
                discount.len()
            )));
        }
        for &d in discount {
            validate_discount(d)?;
        }

        let ranges: Vec<(String, Range<usize>)> = self
            .components()
            .filter_map(|c| self.index(c.name()).map(|r| (c.name().to_string(), r)))
            .collect();
        for (name, range) in ranges {
            if let Some(component) = self.get_mut(&name) {
                component.set_discounts(&discount[range])?;
            }
        }
        self.discount = discount.to_vec();
        Ok(())
    }
}
