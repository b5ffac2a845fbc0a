//! Online data mutation: append, pop and alter.
//!
//! Every operator keeps the series, the components' backing data and the
//! result store aligned, and retracts the filtered watermark to the last
//! step that is still valid.

use super::Dlm;
use crate::components::{Component, Dynamic, TimeVarying};
use crate::error::{DlmError, Result};
use tracing::debug;

impl Dlm {
    fn dynamic_mut(&mut self, name: &str) -> Result<&mut Dynamic> {
        self.builder
            .get_mut(name)
            .ok_or_else(|| DlmError::NotFound(name.to_string()))?
            .as_dynamic_mut()
            .ok_or_else(|| {
                DlmError::InvalidParameter(format!("component '{}' is not a dynamic regression", name))
            })
    }

    /// Append observations. Autoregressive components follow the series;
    /// dynamic components need matching rows via [`Dlm::append_features`].
    ///
    /// NaN and the configured sentinel are stored as missing.
    pub fn append(&mut self, values: Vec<Option<f64>>) -> Result<()> {
        let values: Vec<Option<f64>> = values.into_iter().map(|v| self.config.clean(v)).collect();
        let k = values.len();
        for component in self.builder.time_varying_mut() {
            if let Some(ar) = component.as_autoreg_mut() {
                ar.append_new_data(values.clone())?;
            }
        }
        self.data.extend(values);
        self.result.extend(k);
        debug!(appended = k, n = self.data.len(), "observations appended");
        Ok(())
    }

    /// Append feature rows to a dynamic regression component.
    pub fn append_features(&mut self, name: &str, rows: Vec<Vec<f64>>) -> Result<()> {
        self.dynamic_mut(name)?.append_new_data(rows)
    }

    /// Remove the observation at `date`; later steps shift down by one.
    pub fn popout(&mut self, date: usize) -> Result<()> {
        self.check_date(date)?;
        let remaining = self.data.len() - 1;
        if let Some(degree) = self
            .builder
            .time_varying()
            .filter_map(Component::as_autoreg)
            .map(|ar| ar.degree())
            .find(|&d| d > remaining)
        {
            return Err(DlmError::DegreeExceedsData {
                degree,
                len: remaining,
            });
        }

        for component in self.builder.time_varying_mut() {
            match component {
                Component::AutoReg(ar) => ar.popout(date)?,
                Component::Dynamic(dynamic) if date < dynamic.len() => dynamic.popout(date)?,
                _ => {}
            }
        }
        self.data.remove(date);
        self.result.retract_from(date);
        self.result.remove(date);
        debug!(date, n = self.data.len(), "observation removed");
        Ok(())
    }

    /// Overwrite the observation at `date`. NaN and the sentinel become missing.
    pub fn alter(&mut self, date: usize, value: Option<f64>) -> Result<()> {
        self.check_date(date)?;
        let value = self.config.clean(value);
        for component in self.builder.time_varying_mut() {
            if let Some(ar) = component.as_autoreg_mut() {
                ar.alter(date, value)?;
            }
        }
        self.data[date] = value;
        self.result.retract_from(date);
        debug!(date, "observation altered");
        Ok(())
    }

    /// Overwrite one feature row of a dynamic regression component.
    pub fn alter_features(&mut self, name: &str, date: usize, row: Vec<f64>) -> Result<()> {
        self.dynamic_mut(name)?.alter(date, row)?;
        self.result.retract_from(date);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{AutoReg, StateComponent, Trend};
    use crate::core::DlmConfig;
    use crate::filter::Watermark;

    fn fitted(n: usize) -> Dlm {
        let mut dlm = Dlm::new((0..n).map(|i| Some(i as f64)).collect());
        dlm.add(Trend::new(1, 0.95).unwrap()).unwrap();
        dlm.add(
            Dynamic::new((0..n).map(|i| vec![(i * i) as f64]).collect(), 0.95).unwrap(),
        )
        .unwrap();
        dlm.fit().unwrap();
        dlm
    }

    #[test]
    fn append_keeps_watermark() {
        let mut dlm = fitted(5);
        dlm.append(vec![Some(5.0), None]).unwrap();
        assert_eq!(dlm.len(), 7);
        assert_eq!(dlm.result().len(), 7);
        assert_eq!(dlm.result().filtered_steps(), Some(Watermark::new(0, 4)));
        // Smoothed results stay valid as well.
        assert!(dlm.result().smoothed_steps().is_some());
    }

    #[test]
    fn popout_retracts_and_shifts() {
        let mut dlm = fitted(6);
        dlm.popout(3).unwrap();
        assert_eq!(dlm.len(), 5);
        assert_eq!(dlm.data()[3], Some(4.0));
        assert_eq!(dlm.result().filtered_steps(), Some(Watermark::new(0, 2)));
        assert!(dlm.result().smoothed_steps().is_none());

        let features = dlm.builder().get("dynamic").map(|c| c.dimension());
        assert_eq!(features, Some(1));

        dlm.popout(0).unwrap();
        assert!(dlm.result().filtered_steps().is_none());
        assert!(dlm.popout(10).is_err());
    }

    #[test]
    fn popout_checks_autoregressive_degree() {
        let mut dlm = Dlm::new(vec![Some(1.0), Some(2.0)]);
        dlm.add(Trend::new(0, 0.9).unwrap()).unwrap();
        dlm.add(AutoReg::new(2, 0.9).unwrap()).unwrap();
        assert_eq!(
            dlm.popout(0),
            Err(DlmError::DegreeExceedsData { degree: 2, len: 1 })
        );
        assert_eq!(dlm.len(), 2);
    }

    #[test]
    fn alter_retracts_from_date() {
        let mut dlm = fitted(6);
        dlm.alter(4, None).unwrap();
        assert_eq!(dlm.data()[4], None);
        assert_eq!(dlm.result().filtered_steps(), Some(Watermark::new(0, 3)));

        dlm.alter_features("dynamic", 2, vec![0.5]).unwrap();
        assert_eq!(dlm.result().filtered_steps(), Some(Watermark::new(0, 1)));
        assert!(dlm.alter_features("trend", 2, vec![0.5]).is_err());
        assert!(dlm.alter_features("dynamic", 2, vec![0.5, 1.0]).is_err());
        assert!(dlm.alter(6, Some(1.0)).is_err());
    }

    #[test]
    fn missing_markers_are_normalised_on_entry() {
        let mut dlm = Dlm::from_values_with_config(
            &[1.0, 2.0, 3.0, 4.0],
            DlmConfig::new().with_missing_sentinel(-999.0),
        );
        dlm.add(Trend::new(1, 0.95).unwrap()).unwrap();
        dlm.add(AutoReg::new(1, 0.95).unwrap()).unwrap();
        dlm.fit_forward_filter().unwrap();

        dlm.append(vec![Some(f64::NAN), Some(-999.0), Some(7.0)]).unwrap();
        assert_eq!(&dlm.data()[4..], &[None, None, Some(7.0)]);
        dlm.alter(1, Some(f64::NAN)).unwrap();
        dlm.alter(2, Some(-999.0)).unwrap();
        assert_eq!(dlm.data()[1], None);
        assert_eq!(dlm.data()[2], None);

        let ar = dlm.builder().get("ar1").and_then(|c| c.as_autoreg()).unwrap();
        assert_eq!(ar.data(), dlm.data());

        dlm.fit_forward_filter().unwrap();
        assert!(dlm.mse().unwrap().is_finite());
        let means = dlm.access().mean(crate::dlm::FilterType::ForwardFilter).unwrap();
        assert!(means.iter().all(|m| m.is_finite()));
    }

    #[test]
    fn refilter_after_append_with_features() {
        let mut dlm = fitted(5);
        dlm.append(vec![Some(5.0)]).unwrap();
        dlm.append_features("dynamic", vec![vec![25.0]]).unwrap();
        dlm.fit_forward_filter().unwrap();
        assert_eq!(dlm.result().filtered_steps(), Some(Watermark::new(0, 5)));
    }
}
