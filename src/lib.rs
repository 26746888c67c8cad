//! Per-material isotherm aggregation: filter observations, reduce each
//! (material, adsorbate) group to `(count, center, spread)`, join two gases
//! side by side and derive separation metrics from the result.

pub mod aggregate;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod kpi;
pub mod state;
pub mod stats;
pub mod worker;

pub use aggregate::{compare, ComparisonTable, SelectionParams};
pub use data::filter::ObservationFilter;
pub use data::model::{MeasurementType, Observation, ObservationTable, Schema, TypeSelector};
pub use error::{EngineError, EngineResult};
pub use stats::{CenterStatistic, OutlierPolicy, ReducerConfig, Stat};
