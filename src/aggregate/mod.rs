/// Aggregation pipeline: filter → group by material → join two adsorbates.
///
/// ```text
///   ObservationTable
///        │  filter (type, T ± Δ)
///        ▼
///   row indices ──┬── adsorbate x ──▶ group_by ──┐
///                 └── adsorbate y ──▶ group_by ──┴─▶ join ──▶ ComparisonTable
/// ```
pub mod group;
pub mod join;

use serde::{Deserialize, Serialize};

use crate::data::filter::{filtered_indices, rows_for_adsorbate, ObservationFilter};
use crate::data::model::ObservationTable;
use crate::error::EngineResult;
use crate::stats::ReducerConfig;

pub use group::{group_by, AggregateRow, AggregateTable};
pub use join::{join, ComparisonRow, ComparisonTable, JoinDiagnostics};

/// Everything that selects one comparison table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionParams {
    pub adsorbate_x: String,
    pub adsorbate_y: String,
    #[serde(flatten)]
    pub filter: ObservationFilter,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self {
            adsorbate_x: "propane".into(),
            adsorbate_y: "propene".into(),
            filter: ObservationFilter::default(),
        }
    }
}

/// Build the comparison table for a selection over every schema column.
pub fn compare(
    table: &ObservationTable,
    params: &SelectionParams,
    config: &ReducerConfig,
) -> EngineResult<ComparisonTable> {
    let columns = table.schema().names();
    compare_columns(table, params, &columns, config)
}

/// Build the comparison table for a selection over the named columns.
pub fn compare_columns<S: AsRef<str>>(
    table: &ObservationTable,
    params: &SelectionParams,
    columns: &[S],
    config: &ReducerConfig,
) -> EngineResult<ComparisonTable> {
    let rows = filtered_indices(table, &params.filter)?;

    let rows_x = rows_for_adsorbate(table, &rows, &params.adsorbate_x);
    let rows_y = rows_for_adsorbate(table, &rows, &params.adsorbate_y);

    let agg_x = group_by(table, &rows_x, columns, config)?;
    let agg_y = group_by(table, &rows_y, columns, config)?;

    let joined = join(&agg_x, &agg_y)?.with_adsorbates(&params.adsorbate_x, &params.adsorbate_y);

    let dropped = joined.diagnostics().dropped();
    if dropped > 0 {
        log::info!(
            "{} / {}: {} materials compared, {} present for one gas only",
            params.adsorbate_x,
            params.adsorbate_y,
            joined.len(),
            dropped
        );
    }
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{MeasurementType, Observation, Schema, TypeSelector};

    fn obs(m: &str, a: &str, kind: MeasurementType, t: f64, kh: f64) -> Observation {
        Observation {
            material: m.into(),
            adsorbate: a.into(),
            measurement_type: kind,
            temperature: t,
            isotherm: None,
            values: vec![kh],
        }
    }

    fn table() -> ObservationTable {
        use MeasurementType::*;
        ObservationTable::new(
            Schema::classify(["kH"], "kH"),
            vec![
                obs("M1", "CO2", Experimental, 303.0, 1.0),
                obs("M2", "CO2", Simulated, 298.0, 2.0),
                obs("M2", "N2", Experimental, 303.0, 0.2),
                obs("M3", "N2", Experimental, 303.0, 0.3),
                obs("M2", "N2", Simulated, 400.0, 9.0),
            ],
        )
        .unwrap()
    }

    fn params(selector: TypeSelector) -> SelectionParams {
        SelectionParams {
            adsorbate_x: "CO2".into(),
            adsorbate_y: "N2".into(),
            filter: ObservationFilter::new(selector, 303.0, 10.0),
        }
    }

    #[test]
    fn compares_shared_materials() {
        let t = table();
        let cmp = compare(&t, &params(TypeSelector::All), &ReducerConfig::default()).unwrap();
        assert_eq!(cmp.materials().collect::<Vec<_>>(), vec!["M2"]);
        let row = cmp.row("M2").unwrap();
        assert_eq!(row.x[0].center, 2.0);
        assert_eq!(row.y[0].center, 0.2);
        assert_eq!(cmp.diagnostics().only_x, vec!["M1"]);
        assert_eq!(cmp.diagnostics().only_y, vec!["M3"]);
    }

    #[test]
    fn empty_selection_is_empty_table() {
        let t = table();
        let cmp = compare(&t, &params(TypeSelector::Simulated), &ReducerConfig::default()).unwrap();
        assert!(cmp.is_empty());
        assert_eq!(cmp.adsorbate_x, "CO2");
        assert_eq!(cmp.adsorbate_y, "N2");
        assert_eq!(cmp.schema().names(), ["kH"]);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let t = table();
        let p = params(TypeSelector::All);
        let a = compare(&t, &p, &ReducerConfig::default()).unwrap();
        let b = compare(&t, &p, &ReducerConfig::default()).unwrap();
        assert_eq!(a, b);
    }
}
