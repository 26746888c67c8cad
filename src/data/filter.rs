use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

use super::model::{ObservationTable, TypeSelector};

// ---------------------------------------------------------------------------
// Filter predicate: measurement type and temperature window
// ---------------------------------------------------------------------------

/// Restricts the observation table to one query's rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservationFilter {
    pub measurement_type: TypeSelector,
    /// Centre of the temperature window, Kelvin.
    pub temperature: f64,
    /// Half-width of the temperature window, Kelvin.
    pub tolerance: f64,
}

impl Default for ObservationFilter {
    fn default() -> Self {
        Self {
            measurement_type: TypeSelector::All,
            temperature: 303.0,
            tolerance: 10.0,
        }
    }
}

impl ObservationFilter {
    pub fn new(measurement_type: TypeSelector, temperature: f64, tolerance: f64) -> Self {
        Self {
            measurement_type,
            temperature,
            tolerance,
        }
    }

    /// Both window parameters finite, tolerance non-negative.
    pub fn validate(&self) -> EngineResult<()> {
        if !self.temperature.is_finite() {
            return Err(EngineError::InvalidFilter(format!(
                "temperature must be finite, got {}",
                self.temperature
            )));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(EngineError::InvalidFilter(format!(
                "tolerance must be finite and non-negative, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// Closed interval `[T - Δ, T + Δ]`.
    pub fn admits_temperature(&self, t: f64) -> bool {
        t >= self.temperature - self.tolerance && t <= self.temperature + self.tolerance
    }
}

/// Return indices of observations passing the filter, in table order.
///
/// An empty result is not an error.
pub fn filtered_indices(
    table: &ObservationTable,
    filter: &ObservationFilter,
) -> EngineResult<Vec<usize>> {
    filter.validate()?;

    let rows: Vec<usize> = table
        .observations()
        .iter()
        .enumerate()
        .filter(|(_, obs)| {
            filter.measurement_type.matches(obs.measurement_type)
                && filter.admits_temperature(obs.temperature)
        })
        .map(|(i, _)| i)
        .collect();

    log::debug!(
        "filter {:?} @ {} ± {} K kept {}/{} observations",
        filter.measurement_type,
        filter.temperature,
        filter.tolerance,
        rows.len(),
        table.len()
    );
    Ok(rows)
}

/// Narrow already-filtered rows to a single adsorbate.
pub fn rows_for_adsorbate(table: &ObservationTable, rows: &[usize], adsorbate: &str) -> Vec<usize> {
    rows.iter()
        .copied()
        .filter(|&i| {
            table
                .get(i)
                .is_some_and(|obs| obs.adsorbate == adsorbate)
        })
        .collect()
}

/// Isotherm identifiers recorded for one material and adsorbate under a filter,
/// in table order. Observations without an identifier are skipped.
pub fn isotherm_ids(
    table: &ObservationTable,
    filter: &ObservationFilter,
    adsorbate: &str,
    material: &str,
) -> EngineResult<Vec<String>> {
    let rows = filtered_indices(table, filter)?;
    Ok(rows
        .into_iter()
        .filter_map(|i| table.get(i))
        .filter(|obs| obs.adsorbate == adsorbate && obs.material == material)
        .filter_map(|obs| obs.isotherm.clone())
        .collect())
}
