use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::data::model::Schema;
use crate::error::{EngineError, EngineResult};
use crate::stats::Stat;

use super::group::{serialize_schema, stat_headers, AggregateRow, AggregateTable};

/// Column suffix of the first adsorbate.
pub const SUFFIX_X: &str = "_x";
/// Column suffix of the second adsorbate.
pub const SUFFIX_Y: &str = "_y";

/// One material with aggregates for both gases side by side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub material: String,
    pub x: Vec<Stat>,
    pub y: Vec<Stat>,
}

/// Materials excluded by the inner join.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JoinDiagnostics {
    pub only_x: Vec<String>,
    pub only_y: Vec<String>,
}

impl JoinDiagnostics {
    pub fn dropped(&self) -> usize {
        self.only_x.len() + self.only_y.len()
    }
}

/// Row-per-material comparison of two adsorbates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonTable {
    pub adsorbate_x: String,
    pub adsorbate_y: String,
    #[serde(serialize_with = "serialize_schema")]
    schema: Schema,
    rows: Vec<ComparisonRow>,
    diagnostics: JoinDiagnostics,
}

impl ComparisonTable {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[ComparisonRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn diagnostics(&self) -> &JoinDiagnostics {
        &self.diagnostics
    }

    pub fn row(&self, material: &str) -> Option<&ComparisonRow> {
        self.rows.iter().find(|r| r.material == material)
    }

    pub fn materials(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.material.as_str())
    }

    /// `material` followed by every `_x` stat header, then every `_y` one.
    pub fn headers(&self) -> Vec<String> {
        let mut out = vec!["material".to_string()];
        out.extend(stat_headers(&self.schema, SUFFIX_X));
        out.extend(stat_headers(&self.schema, SUFFIX_Y));
        out
    }

    /// Relabel the gases; an empty input table carries no adsorbate name.
    pub(crate) fn with_adsorbates(mut self, x: &str, y: &str) -> Self {
        self.adsorbate_x = x.to_string();
        self.adsorbate_y = y.to_string();
        self
    }
}

fn keyed(table: &AggregateTable) -> EngineResult<HashMap<&str, &AggregateRow>> {
    let mut map = HashMap::with_capacity(table.len());
    for row in table.rows() {
        if map.insert(row.material.as_str(), row).is_some() {
            return Err(EngineError::DuplicateKey {
                material: row.material.clone(),
            });
        }
    }
    Ok(map)
}

/// Inner join of two single-adsorbate aggregate tables on material.
///
/// Output follows the row order of `x`. Both inputs must aggregate the same
/// set of columns; `y` stats are reordered to match `x`.
pub fn join(x: &AggregateTable, y: &AggregateTable) -> EngineResult<ComparisonTable> {
    let (xs, ys) = (x.schema(), y.schema());
    if let Some(missing) = xs
        .columns()
        .iter()
        .find(|c| ys.index_of(&c.name).is_none())
        .or_else(|| ys.columns().iter().find(|c| xs.index_of(&c.name).is_none()))
    {
        return Err(EngineError::missing(missing.name.clone()));
    }
    // same set, possibly different order: map y's stats onto x's column order
    let y_order: Vec<usize> = xs
        .columns()
        .iter()
        .filter_map(|c| ys.index_of(&c.name))
        .collect();

    let x_keyed = keyed(x)?;
    let y_keyed = keyed(y)?;

    let mut rows = Vec::new();
    let mut diagnostics = JoinDiagnostics::default();
    for row in x.rows() {
        match y_keyed.get(row.material.as_str()) {
            Some(other) => rows.push(ComparisonRow {
                material: row.material.clone(),
                x: row.stats.clone(),
                y: y_order.iter().map(|&i| other.stats[i]).collect(),
            }),
            None => diagnostics.only_x.push(row.material.clone()),
        }
    }
    let in_x: HashSet<&str> = x_keyed.keys().copied().collect();
    diagnostics.only_y = y
        .rows()
        .iter()
        .filter(|r| !in_x.contains(r.material.as_str()))
        .map(|r| r.material.clone())
        .collect();

    let adsorbate_of = |t: &AggregateTable| {
        t.rows()
            .first()
            .map(|r| r.adsorbate.clone())
            .unwrap_or_default()
    };

    if diagnostics.dropped() > 0 {
        log::debug!(
            "join dropped {} materials ({} without a match in y, {} without a match in x)",
            diagnostics.dropped(),
            diagnostics.only_x.len(),
            diagnostics.only_y.len()
        );
    }

    Ok(ComparisonTable {
        adsorbate_x: adsorbate_of(x),
        adsorbate_y: adsorbate_of(y),
        schema: xs.clone(),
        rows,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(v: f64) -> Stat {
        Stat {
            count: 1,
            center: v,
            spread: 0.0,
        }
    }

    fn table(adsorbate: &str, rows: &[(&str, f64)]) -> AggregateTable {
        AggregateTable::new(
            Schema::classify(["kH"], "kH"),
            rows.iter()
                .map(|(m, v)| AggregateRow {
                    material: m.to_string(),
                    adsorbate: adsorbate.into(),
                    stats: vec![stat(*v)],
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn inner_join_keeps_shared_materials() {
        let a = table("CO2", &[("M1", 1.0), ("M2", 2.0)]);
        let b = table("N2", &[("M2", 20.0), ("M3", 30.0)]);
        let joined = join(&a, &b).unwrap();
        assert_eq!(joined.materials().collect::<Vec<_>>(), vec!["M2"]);
        let row = joined.row("M2").unwrap();
        assert_eq!(row.x[0].center, 2.0);
        assert_eq!(row.y[0].center, 20.0);
        assert_eq!(joined.diagnostics().only_x, vec!["M1"]);
        assert_eq!(joined.diagnostics().only_y, vec!["M3"]);
        assert_eq!(joined.diagnostics().dropped(), 2);
        assert_eq!(joined.adsorbate_x, "CO2");
        assert_eq!(joined.adsorbate_y, "N2");
    }

    #[test]
    fn order_follows_first_table() {
        let a = table("CO2", &[("M3", 1.0), ("M1", 1.0), ("M2", 1.0)]);
        let b = table("N2", &[("M1", 1.0), ("M2", 1.0), ("M3", 1.0)]);
        let joined = join(&a, &b).unwrap();
        assert_eq!(joined.materials().collect::<Vec<_>>(), vec!["M3", "M1", "M2"]);
    }

    #[test]
    fn duplicate_material_is_rejected() {
        let a = table("CO2", &[("M1", 1.0), ("M1", 2.0)]);
        let b = table("N2", &[("M1", 1.0)]);
        assert_eq!(
            join(&a, &b).unwrap_err(),
            EngineError::DuplicateKey {
                material: "M1".into()
            }
        );
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let a = table("CO2", &[("M1", 1.0)]);
        let b = AggregateTable::new(Schema::classify(["1"], "kH"), Vec::new()).unwrap();
        assert!(matches!(
            join(&a, &b),
            Err(EngineError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn headers_are_suffixed() {
        let a = table("CO2", &[("M1", 1.0)]);
        let joined = join(&a, &a.clone()).unwrap();
        assert_eq!(
            joined.headers(),
            vec![
                "material",
                "kH_x_count",
                "kH_x_center",
                "kH_x_spread",
                "kH_y_count",
                "kH_y_center",
                "kH_y_spread",
            ]
        );
    }
}
