//! Separation metrics derived from a [`ComparisonTable`].
//!
//! Henry's constants are stored as `ln K_H`, so selectivity is
//! `exp(K_y - K_x)`. A pressure of 0 bar stands for zero uptake and needs no
//! column.

use serde::{Deserialize, Serialize};

use crate::aggregate::{ComparisonRow, ComparisonTable};
use crate::error::{EngineError, EngineResult};
use crate::stats::Stat;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KpiParams {
    /// Pressure of the uptake plot, bar.
    pub uptake_pressure: f64,
    /// `(p1, p2)` of the working-capacity plot, bar.
    pub working_range: (f64, f64),
}

impl Default for KpiParams {
    fn default() -> Self {
        Self {
            uptake_pressure: 0.5,
            working_range: (0.5, 5.0),
        }
    }
}

/// A metric evaluated for both gases.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Pair {
    pub x: f64,
    pub y: f64,
    pub n_x: usize,
    pub n_y: usize,
}

impl Pair {
    pub fn n(&self) -> usize {
        self.n_x + self.n_y
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialKpi {
    pub material: String,
    pub selectivity: f64,
    pub psa_api: f64,
    pub henry: Pair,
    pub uptake: Pair,
    pub working_capacity: Pair,
}

/// A point and its half-widths, collapsed to the origin when undefined.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ErrorBar {
    pub x: f64,
    pub y: f64,
    pub err_x: f64,
    pub err_y: f64,
}

impl ErrorBar {
    fn new(x: f64, y: f64, err_x: f64, err_y: f64) -> Self {
        if x.is_nan() || y.is_nan() {
            ErrorBar::default()
        } else {
            ErrorBar { x, y, err_x, err_y }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialErrors {
    pub material: String,
    pub henry: ErrorBar,
    pub uptake: ErrorBar,
    pub working_capacity: ErrorBar,
}

/// Which gas of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    X,
    Y,
}

/// Column positions a set of [`KpiParams`] resolves to.
#[derive(Debug, Clone, Copy)]
struct Columns {
    henry: usize,
    uptake: Option<usize>,
    p1: Option<usize>,
    p2: Option<usize>,
}

fn pressure_column(table: &ComparisonTable, pressure: f64) -> EngineResult<Option<usize>> {
    if !pressure.is_finite() || pressure < 0.0 {
        return Err(EngineError::UnknownPressure(pressure));
    }
    if pressure == 0.0 {
        return Ok(None);
    }
    table
        .schema()
        .loading_at(pressure)
        .map(Some)
        .ok_or(EngineError::UnknownPressure(pressure))
}

impl Columns {
    fn resolve(table: &ComparisonTable, params: &KpiParams) -> EngineResult<Self> {
        let henry = table
            .schema()
            .henry()
            .ok_or_else(|| EngineError::missing("Henry's constant"))?;
        Ok(Columns {
            henry,
            uptake: pressure_column(table, params.uptake_pressure)?,
            p1: pressure_column(table, params.working_range.0)?,
            p2: pressure_column(table, params.working_range.1)?,
        })
    }
}

fn stats(row: &ComparisonRow, side: Side) -> &[Stat] {
    match side {
        Side::X => &row.x,
        Side::Y => &row.y,
    }
}

/// Center at an optional column; the zero-pressure column contributes 0.
fn center(stats: &[Stat], col: Option<usize>) -> f64 {
    col.map_or(0.0, |c| stats[c].center)
}

fn count(stats: &[Stat], col: Option<usize>) -> usize {
    col.map_or(0, |c| stats[c].count)
}

fn spread(stats: &[Stat], col: Option<usize>) -> f64 {
    col.map_or(0.0, |c| stats[c].spread)
}

fn row_kpi(row: &ComparisonRow, cols: &Columns) -> MaterialKpi {
    let (sx, sy) = (&row.x[..], &row.y[..]);

    let henry = Pair {
        x: sx[cols.henry].center,
        y: sy[cols.henry].center,
        n_x: sx[cols.henry].count,
        n_y: sy[cols.henry].count,
    };
    let uptake = Pair {
        x: center(sx, cols.uptake),
        y: center(sy, cols.uptake),
        n_x: count(sx, cols.uptake),
        n_y: count(sy, cols.uptake),
    };
    let working_capacity = Pair {
        x: center(sx, cols.p2) - center(sx, cols.p1),
        y: center(sy, cols.p2) - center(sy, cols.p1),
        n_x: count(sx, cols.p1).max(count(sx, cols.p2)),
        n_y: count(sy, cols.p1).max(count(sy, cols.p2)),
    };

    let selectivity = (henry.y - henry.x).exp();
    let psa_api = (working_capacity.y / working_capacity.x) * selectivity;

    MaterialKpi {
        material: row.material.clone(),
        selectivity,
        psa_api,
        henry,
        uptake,
        working_capacity,
    }
}

/// Separation metrics for every material of the comparison, in table order.
pub fn compute(table: &ComparisonTable, params: &KpiParams) -> EngineResult<Vec<MaterialKpi>> {
    let cols = Columns::resolve(table, params)?;
    Ok(table.rows().iter().map(|r| row_kpi(r, &cols)).collect())
}

/// Error bars of one material, `None` when it is not in the comparison.
pub fn error_bars(
    table: &ComparisonTable,
    material: &str,
    params: &KpiParams,
) -> EngineResult<Option<MaterialErrors>> {
    let cols = Columns::resolve(table, params)?;
    let Some(row) = table.row(material) else {
        return Ok(None);
    };
    let kpi = row_kpi(row, &cols);
    let (sx, sy) = (&row.x[..], &row.y[..]);

    let wc_err = |s: &[Stat]| spread(s, cols.p1) + spread(s, cols.p2);

    Ok(Some(MaterialErrors {
        material: row.material.clone(),
        henry: ErrorBar::new(
            kpi.henry.x,
            kpi.henry.y,
            sx[cols.henry].spread,
            sy[cols.henry].spread,
        ),
        uptake: if cols.uptake.is_none() {
            ErrorBar::default()
        } else {
            ErrorBar::new(
                kpi.uptake.x,
                kpi.uptake.y,
                spread(sx, cols.uptake),
                spread(sy, cols.uptake),
            )
        },
        working_capacity: ErrorBar::new(
            kpi.working_capacity.x,
            kpi.working_capacity.y,
            wc_err(sx),
            wc_err(sy),
        ),
    }))
}

/// `(pressure, center)` of one material and gas over every loading column,
/// ascending in pressure, missing centers skipped.
pub fn median_isotherm(table: &ComparisonTable, material: &str, side: Side) -> Vec<(f64, f64)> {
    let Some(row) = table.row(material) else {
        return Vec::new();
    };
    let s = stats(row, side);
    table
        .schema()
        .loading_columns()
        .into_iter()
        .map(|(p, c)| (p, s[c].center))
        .filter(|(_, v)| !v.is_nan())
        .collect()
}

/// Highest loading pressure at which both gases have data somewhere in the
/// comparison.
pub fn pressure_limit(table: &ComparisonTable) -> Option<f64> {
    let has_data = |c: usize, side: Side| {
        table
            .rows()
            .iter()
            .any(|r| !stats(r, side)[c].center.is_nan())
    };
    table
        .schema()
        .loading_columns()
        .into_iter()
        .rev()
        .find(|&(_, c)| has_data(c, Side::X) && has_data(c, Side::Y))
        .map(|(p, _)| p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{join, AggregateRow, AggregateTable};
    use crate::data::model::Schema;
    use approx::assert_relative_eq;

    const NAN: f64 = f64::NAN;

    fn stat(count: usize, center: f64, spread: f64) -> Stat {
        Stat {
            count,
            center,
            spread,
        }
    }

    /// Columns: kH, 0.5 bar, 5 bar, 10 bar.
    fn comparison() -> ComparisonTable {
        let schema = Schema::classify(["kH", "0.5", "5", "10"], "kH");
        let x = AggregateTable::new(
            schema.clone(),
            vec![
                AggregateRow {
                    material: "M1".into(),
                    adsorbate: "propane".into(),
                    stats: vec![
                        stat(3, 1.0, 0.1),
                        stat(2, 1.0, 0.2),
                        stat(4, 3.0, 0.3),
                        stat(0, NAN, 0.0),
                    ],
                },
                AggregateRow {
                    material: "M2".into(),
                    adsorbate: "propane".into(),
                    stats: vec![
                        stat(1, NAN, 0.0),
                        stat(1, 0.5, 0.0),
                        stat(1, 0.9, 0.0),
                        stat(1, 1.2, 0.0),
                    ],
                },
            ],
        )
        .unwrap();
        let y = AggregateTable::new(
            schema,
            vec![
                AggregateRow {
                    material: "M1".into(),
                    adsorbate: "propene".into(),
                    stats: vec![
                        stat(2, 2.0, 0.4),
                        stat(1, 2.0, 0.5),
                        stat(5, 6.0, 0.6),
                        stat(0, NAN, 0.0),
                    ],
                },
                AggregateRow {
                    material: "M2".into(),
                    adsorbate: "propene".into(),
                    stats: vec![
                        stat(1, 0.3, 0.0),
                        stat(1, 0.6, 0.0),
                        stat(1, 1.0, 0.0),
                        stat(0, NAN, 0.0),
                    ],
                },
            ],
        )
        .unwrap();
        join(&x, &y).unwrap()
    }

    #[test]
    fn henry_selectivity_and_psa() {
        let table = comparison();
        let kpis = compute(&table, &KpiParams::default()).unwrap();
        let m1 = &kpis[0];
        assert_eq!(m1.material, "M1");
        assert_relative_eq!(m1.selectivity, 1.0f64.exp());
        assert_eq!(m1.henry.n(), 5);
        // W_x = 3 - 1, W_y = 6 - 2
        assert_eq!(m1.working_capacity.x, 2.0);
        assert_eq!(m1.working_capacity.y, 4.0);
        assert_eq!(m1.working_capacity.n_x, 4);
        assert_eq!(m1.working_capacity.n_y, 5);
        assert_relative_eq!(m1.psa_api, 2.0 * 1.0f64.exp());
        assert_eq!(m1.uptake.x, 1.0);
        assert_eq!(m1.uptake.y, 2.0);
        assert!(kpis[1].selectivity.is_nan());
    }

    #[test]
    fn zero_pressure_means_zero_uptake() {
        let table = comparison();
        let params = KpiParams {
            uptake_pressure: 0.0,
            working_range: (0.0, 5.0),
        };
        let kpis = compute(&table, &params).unwrap();
        assert_eq!(kpis[0].uptake, Pair::default());
        assert_eq!(kpis[0].working_capacity.x, 3.0);
        assert_eq!(kpis[0].working_capacity.n_x, 4);
    }

    #[test]
    fn unknown_pressure_is_an_error() {
        let table = comparison();
        let params = KpiParams {
            uptake_pressure: 2.5,
            ..KpiParams::default()
        };
        assert_eq!(
            compute(&table, &params).unwrap_err(),
            EngineError::UnknownPressure(2.5)
        );
    }

    #[test]
    fn error_bars_sum_working_capacity_spreads() {
        let table = comparison();
        let errs = error_bars(&table, "M1", &KpiParams::default())
            .unwrap()
            .unwrap();
        assert_eq!(errs.henry, ErrorBar { x: 1.0, y: 2.0, err_x: 0.1, err_y: 0.4 });
        assert_relative_eq!(errs.working_capacity.err_x, 0.5);
        assert_relative_eq!(errs.working_capacity.err_y, 1.1);
        assert_eq!(errs.uptake.err_x, 0.2);
    }

    #[test]
    fn error_bars_collapse_on_missing_center() {
        let table = comparison();
        let errs = error_bars(&table, "M2", &KpiParams::default())
            .unwrap()
            .unwrap();
        assert_eq!(errs.henry, ErrorBar::default());
        assert!(error_bars(&table, "M9", &KpiParams::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn median_isotherm_skips_missing() {
        let table = comparison();
        assert_eq!(
            median_isotherm(&table, "M1", Side::X),
            vec![(0.5, 1.0), (5.0, 3.0)]
        );
        assert_eq!(
            median_isotherm(&table, "M2", Side::X),
            vec![(0.5, 0.5), (5.0, 0.9), (10.0, 1.2)]
        );
        assert!(median_isotherm(&table, "nope", Side::Y).is_empty());
    }

    #[test]
    fn pressure_limit_needs_both_gases() {
        // 10 bar only has propane data
        assert_eq!(pressure_limit(&comparison()), Some(5.0));
    }
}
