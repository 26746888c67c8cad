use std::collections::HashMap;

use serde::Serialize;

use crate::data::model::{ObservationTable, Schema};
use crate::error::{EngineError, EngineResult};
use crate::stats::{reduce, ReducerConfig, Stat};

/// One (material, adsorbate) group with a [`Stat`] per aggregated column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub material: String,
    pub adsorbate: String,
    pub stats: Vec<Stat>,
}

/// Output of the group-by driver.
///
/// Rows appear in first-seen order of their group in the input rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateTable {
    #[serde(serialize_with = "serialize_schema")]
    schema: Schema,
    rows: Vec<AggregateRow>,
}

impl AggregateTable {
    /// Every row must carry one stat per schema column.
    pub fn new(schema: Schema, rows: Vec<AggregateRow>) -> EngineResult<Self> {
        if let Some((row, r)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.stats.len() != schema.len())
        {
            return Err(EngineError::RaggedRow {
                row,
                expected: schema.len(),
                found: r.stats.len(),
            });
        }
        Ok(Self { schema, rows })
    }

    /// Aggregated measurement columns, in stat order.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[AggregateRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, material: &str, adsorbate: &str) -> Option<&AggregateRow> {
        self.rows
            .iter()
            .find(|r| r.material == material && r.adsorbate == adsorbate)
    }

    /// The rows of a single adsorbate, keyed by material.
    pub fn for_adsorbate(&self, adsorbate: &str) -> AggregateTable {
        AggregateTable {
            schema: self.schema.clone(),
            rows: self
                .rows
                .iter()
                .filter(|r| r.adsorbate == adsorbate)
                .cloned()
                .collect(),
        }
    }

    /// Flattened `{col}_count`, `{col}_center`, `{col}_spread` headers.
    pub fn stat_headers(&self) -> Vec<String> {
        stat_headers(&self.schema, "")
    }
}

pub(crate) fn serialize_schema<S: serde::Serializer>(
    schema: &Schema,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(schema.columns().iter().map(|c| c.name.as_str()))
}

pub(crate) fn stat_headers(schema: &Schema, suffix: &str) -> Vec<String> {
    schema
        .columns()
        .iter()
        .map(|c| &c.name)
        .flat_map(|c| {
            [
                format!("{c}{suffix}_count"),
                format!("{c}{suffix}_center"),
                format!("{c}{suffix}_spread"),
            ]
        })
        .collect()
}

/// Reduce every (material, adsorbate) group of `rows` across `columns`.
///
/// Every requested column must exist in the table schema. A group is emitted
/// as soon as it owns any row, even if some columns reduce to [`Stat::EMPTY`].
pub fn group_by<S: AsRef<str>>(
    table: &ObservationTable,
    rows: &[usize],
    columns: &[S],
    config: &ReducerConfig,
) -> EngineResult<AggregateTable> {
    let schema = table.schema();
    let col_idx = columns
        .iter()
        .map(|c| schema.require(c.as_ref()))
        .collect::<EngineResult<Vec<usize>>>()?;

    // group key -> position in `groups`, first-seen order kept by the Vec
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut groups: Vec<(&str, &str, Vec<usize>)> = Vec::new();

    for (row, obs) in rows.iter().filter_map(|&r| table.get(r).map(|o| (r, o))) {
        let key = (obs.material.as_str(), obs.adsorbate.as_str());
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push((key.0, key.1, Vec::new()));
            groups.len() - 1
        });
        groups[slot].2.push(row);
    }

    let mut buffer = Vec::new();
    let out_rows = groups
        .into_iter()
        .map(|(material, adsorbate, members)| {
            let stats = col_idx
                .iter()
                .map(|&c| {
                    buffer.clear();
                    buffer.extend(
                        members
                            .iter()
                            .filter_map(|&r| table.get(r))
                            .map(|obs| obs.values[c]),
                    );
                    reduce(&buffer, config)
                })
                .collect();
            AggregateRow {
                material: material.to_string(),
                adsorbate: adsorbate.to_string(),
                stats,
            }
        })
        .collect::<Vec<_>>();

    log::debug!(
        "grouped {} rows into {} groups over {} columns",
        rows.len(),
        out_rows.len(),
        col_idx.len()
    );

    Ok(AggregateTable {
        schema: schema.select(&col_idx),
        rows: out_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{MeasurementType, Observation, Schema};

    fn obs(material: &str, adsorbate: &str, kh: f64, load: f64) -> Observation {
        Observation {
            material: material.into(),
            adsorbate: adsorbate.into(),
            measurement_type: MeasurementType::Experimental,
            temperature: 303.0,
            isotherm: None,
            values: vec![kh, load],
        }
    }

    fn table() -> ObservationTable {
        ObservationTable::new(
            Schema::classify(["kH", "1"], "kH"),
            vec![
                obs("MOF-B", "propane", 1.0, f64::NAN),
                obs("MOF-A", "propane", 2.0, 0.5),
                obs("MOF-B", "propane", 3.0, f64::NAN),
                obs("MOF-B", "propene", 10.0, 1.5),
            ],
        )
        .unwrap()
    }

    #[test]
    fn groups_in_first_seen_order() {
        let t = table();
        let agg = group_by(&t, &[0, 1, 2, 3], &["kH", "1"], &ReducerConfig::default()).unwrap();
        let keys: Vec<(&str, &str)> = agg
            .rows()
            .iter()
            .map(|r| (r.material.as_str(), r.adsorbate.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![("MOF-B", "propane"), ("MOF-A", "propane"), ("MOF-B", "propene")]
        );
    }

    #[test]
    fn empty_column_keeps_row() {
        let t = table();
        let agg = group_by(&t, &[0, 1, 2, 3], &["kH", "1"], &ReducerConfig::default()).unwrap();
        let row = agg.get("MOF-B", "propane").unwrap();
        assert_eq!(row.stats[0].count, 2);
        assert_eq!(row.stats[0].center, 2.0);
        assert!(row.stats[1].is_empty());
        assert!(row.stats[1].center.is_nan());
    }

    #[test]
    fn unknown_column_fails_fast() {
        let t = table();
        let err = group_by(&t, &[0], &["kH", "5"], &ReducerConfig::default()).unwrap_err();
        assert_eq!(err, EngineError::SchemaMismatch { column: "5".into() });
    }

    #[test]
    fn empty_rows_give_empty_table() {
        let t = table();
        let agg = group_by::<&str>(&t, &[], &["kH"], &ReducerConfig::default()).unwrap();
        assert!(agg.is_empty());
        assert_eq!(agg.schema().names(), ["kH"]);
    }

    #[test]
    fn headers_are_flattened() {
        let t = table();
        let agg = group_by(&t, &[1], &["kH"], &ReducerConfig::default()).unwrap();
        assert_eq!(agg.stat_headers(), vec!["kH_count", "kH_center", "kH_spread"]);
    }

    #[test]
    fn adsorbate_subset() {
        let t = table();
        let agg = group_by(&t, &[0, 1, 2, 3], &["kH"], &ReducerConfig::default()).unwrap();
        let propene = agg.for_adsorbate("propene");
        assert_eq!(propene.len(), 1);
        assert_eq!(propene.rows()[0].stats[0].center, 10.0);
    }

    #[test]
    fn ragged_stats_are_rejected() {
        let row = AggregateRow {
            material: "M1".into(),
            adsorbate: "CO2".into(),
            stats: vec![Stat::EMPTY],
        };
        let schema = Schema::classify(["kH", "1"], "kH");
        let err = AggregateTable::new(schema, vec![row]).unwrap_err();
        assert_eq!(
            err,
            EngineError::RaggedRow {
                row: 0,
                expected: 2,
                found: 1
            }
        );
    }
}
