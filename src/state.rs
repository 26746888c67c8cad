use std::sync::Arc;

use serde::Serialize;

use crate::aggregate::{compare, ComparisonTable, SelectionParams};
use crate::data::filter::isotherm_ids;
use crate::data::model::{ObservationTable, TypeSelector};
use crate::error::EngineResult;
use crate::kpi::{self, KpiParams, MaterialErrors, MaterialKpi, Side};
use crate::stats::ReducerConfig;
use crate::worker::SelectionWorker;

// ---------------------------------------------------------------------------
// Explorer state
// ---------------------------------------------------------------------------

/// Everything a front end shows about one selected material.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialDetail {
    pub material: String,
    pub errors: MaterialErrors,
    /// `(pressure, uptake)` of the aggregated isotherm per gas.
    pub median_x: Vec<(f64, f64)>,
    pub median_y: Vec<(f64, f64)>,
    /// Identifiers of the individual isotherms per gas.
    pub isotherms_x: Vec<String>,
    pub isotherms_y: Vec<String>,
}

/// The explorer session state, independent of rendering.
///
/// Selection setters only stage values; [`ExplorerState::refresh`] commits
/// them. Pressure setters recompute the metrics from the cached comparison.
pub struct ExplorerState {
    /// Loaded dataset, shared with background workers.
    pub store: Arc<ObservationTable>,

    /// Staged selection (adsorbate pair, type, temperature window).
    pub selection: SelectionParams,

    /// Statistics policy.
    pub reducer: ReducerConfig,

    /// Pressures of the uptake and working-capacity views.
    pub kpi_params: KpiParams,

    /// Selection the cached comparison was computed for.
    pub committed: Option<SelectionParams>,

    /// Generation and selection handed to the background worker, not yet
    /// delivered.
    requested: Option<(u64, SelectionParams)>,

    /// Comparison table of the last committed selection.
    pub comparison: Option<ComparisonTable>,

    /// Metrics of `comparison` at `kpi_params` (cached).
    pub kpis: Vec<MaterialKpi>,

    /// Status / error message for the front end.
    pub status_message: Option<String>,

    /// Whether a background recomputation is in flight.
    pub loading: bool,
}

impl ExplorerState {
    pub fn new(store: Arc<ObservationTable>) -> Self {
        Self {
            store,
            selection: SelectionParams::default(),
            reducer: ReducerConfig::default(),
            kpi_params: KpiParams::default(),
            committed: None,
            requested: None,
            comparison: None,
            kpis: Vec::new(),
            status_message: None,
            loading: false,
        }
    }

    pub fn set_adsorbates(&mut self, x: &str, y: &str) {
        self.selection.adsorbate_x = x.to_string();
        self.selection.adsorbate_y = y.to_string();
    }

    pub fn set_temperature(&mut self, temperature: f64, tolerance: f64) {
        self.selection.filter.temperature = temperature;
        self.selection.filter.tolerance = tolerance;
    }

    pub fn set_measurement_type(&mut self, selector: TypeSelector) {
        self.selection.filter.measurement_type = selector;
    }

    /// Whether staged selection values differ from the committed ones.
    pub fn is_stale(&self) -> bool {
        self.committed.as_ref() != Some(&self.selection)
    }

    /// Recompute the comparison for the staged selection on this thread.
    ///
    /// A background request still in flight is abandoned; its result is
    /// discarded when it arrives.
    pub fn refresh(&mut self) -> EngineResult<()> {
        self.requested = None;
        let result = compare(&self.store, &self.selection, &self.reducer);
        self.apply(self.selection.clone(), result)
    }

    /// Hand the staged selection to a background worker.
    pub fn request_refresh(&mut self, worker: &mut SelectionWorker) -> std::io::Result<u64> {
        let generation = worker.request(self.selection.clone(), self.reducer)?;
        self.requested = Some((generation, self.selection.clone()));
        self.loading = true;
        Ok(generation)
    }

    /// Collect a finished background result, if any. Returns whether the
    /// state changed.
    pub fn poll_refresh(&mut self, worker: &mut SelectionWorker) -> EngineResult<bool> {
        let generation = worker.pending_generation();
        match worker.poll() {
            Some(result) => match self.requested.take() {
                Some((requested, selection)) if Some(requested) == generation => {
                    self.apply(selection, result)?;
                    Ok(true)
                }
                _ => {
                    log::debug!("discarding background result superseded by refresh");
                    self.loading = false;
                    Ok(false)
                }
            },
            None => {
                self.loading = worker.is_pending();
                if !self.loading {
                    self.requested = None;
                }
                Ok(false)
            }
        }
    }

    fn apply(
        &mut self,
        selection: SelectionParams,
        result: EngineResult<ComparisonTable>,
    ) -> EngineResult<()> {
        self.loading = false;
        let table = match result {
            Ok(t) => t,
            Err(e) => {
                self.status_message = Some(e.to_string());
                return Err(e);
            }
        };
        let (kpis, kpi_error) = match kpi::compute(&table, &self.kpi_params) {
            Ok(k) => (k, None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };
        self.status_message = if table.is_empty() {
            Some(format!(
                "no materials with data for both {} and {}",
                selection.adsorbate_x, selection.adsorbate_y
            ))
        } else {
            kpi_error
        };
        self.kpis = kpis;
        self.comparison = Some(table);
        self.committed = Some(selection);
        Ok(())
    }

    /// Move the uptake view to another pressure.
    pub fn set_uptake_pressure(&mut self, pressure: f64) -> EngineResult<()> {
        let mut params = self.kpi_params;
        params.uptake_pressure = pressure;
        self.set_kpi_params(params)
    }

    /// Move the working-capacity view to another pressure range.
    pub fn set_working_range(&mut self, p1: f64, p2: f64) -> EngineResult<()> {
        let mut params = self.kpi_params;
        params.working_range = (p1, p2);
        self.set_kpi_params(params)
    }

    fn set_kpi_params(&mut self, params: KpiParams) -> EngineResult<()> {
        if let Some(table) = &self.comparison {
            self.kpis = kpi::compute(table, &params)?;
        }
        self.kpi_params = params;
        Ok(())
    }

    /// Upper end for the pressure controls of the current comparison.
    pub fn pressure_limit(&self) -> Option<f64> {
        self.comparison.as_ref().and_then(kpi::pressure_limit)
    }

    /// Error bars, aggregated isotherms and isotherm identifiers of one
    /// material of the committed comparison.
    pub fn detail(&self, material: &str) -> EngineResult<Option<MaterialDetail>> {
        let (Some(table), Some(selection)) = (&self.comparison, &self.committed) else {
            return Ok(None);
        };
        let Some(errors) = kpi::error_bars(table, material, &self.kpi_params)? else {
            return Ok(None);
        };
        let filter = &selection.filter;
        Ok(Some(MaterialDetail {
            material: material.to_string(),
            errors,
            median_x: kpi::median_isotherm(table, material, Side::X),
            median_y: kpi::median_isotherm(table, material, Side::Y),
            isotherms_x: isotherm_ids(&self.store, filter, &selection.adsorbate_x, material)?,
            isotherms_y: isotherm_ids(&self.store, filter, &selection.adsorbate_y, material)?,
        }))
    }
}
