//! TOML configuration file support.
//!
//! Every field is optional; CLI flags override the file, the file overrides
//! built-in defaults.
//!
//! ```toml
//! # rusty-isotherm.toml
//! [selection]
//! g1 = "carbon dioxide"
//! g2 = "nitrogen"
//! temperature = 298
//! tolerance = 5
//! measurement_type = "experimental"
//!
//! [statistics]
//! outlier_policy = "discard-outliers"
//! center = "median"
//!
//! [kpi]
//! uptake_pressure = 1.0
//! working_range = [0.5, 10.0]
//!
//! [schema]
//! henry_column = "kH"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::aggregate::SelectionParams;
use crate::data::loader::LoadOptions;
use crate::data::model::TypeSelector;
use crate::kpi::KpiParams;
use crate::stats::{CenterStatistic, OutlierPolicy, ReducerConfig};

/// Root configuration structure for rusty-isotherm.toml files.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub statistics: StatisticsConfig,
    #[serde(default)]
    pub kpi: KpiConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
}

/// Default query.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionConfig {
    pub g1: Option<String>,
    pub g2: Option<String>,
    /// Kelvin.
    pub temperature: Option<f64>,
    /// Kelvin.
    pub tolerance: Option<f64>,
    pub measurement_type: Option<TypeSelector>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatisticsConfig {
    pub outlier_policy: Option<OutlierPolicy>,
    pub center: Option<CenterStatistic>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KpiConfig {
    /// Bar.
    pub uptake_pressure: Option<f64>,
    /// Bar.
    pub working_range: Option<(f64, f64)>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    pub henry_column: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    pub fn selection_params(&self) -> SelectionParams {
        let mut params = SelectionParams::default();
        let s = &self.selection;
        if let Some(g1) = &s.g1 {
            params.adsorbate_x = g1.clone();
        }
        if let Some(g2) = &s.g2 {
            params.adsorbate_y = g2.clone();
        }
        if let Some(t) = s.temperature {
            params.filter.temperature = t;
        }
        if let Some(tol) = s.tolerance {
            params.filter.tolerance = tol;
        }
        if let Some(kind) = s.measurement_type {
            params.filter.measurement_type = kind;
        }
        params
    }

    pub fn reducer_config(&self) -> ReducerConfig {
        let defaults = ReducerConfig::default();
        ReducerConfig {
            outlier_policy: self
                .statistics
                .outlier_policy
                .unwrap_or(defaults.outlier_policy),
            center: self.statistics.center.unwrap_or(defaults.center),
        }
    }

    pub fn kpi_params(&self) -> KpiParams {
        let defaults = KpiParams::default();
        KpiParams {
            uptake_pressure: self.kpi.uptake_pressure.unwrap_or(defaults.uptake_pressure),
            working_range: self.kpi.working_range.unwrap_or(defaults.working_range),
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        let mut options = LoadOptions::default();
        if let Some(name) = &self.schema.henry_column {
            options.henry_column = name.clone();
        }
        options
    }
}
