use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Key columns every observation table must carry.
pub const MATERIAL_COLUMN: &str = "material";
pub const ADSORBATE_COLUMN: &str = "adsorbate";
pub const TYPE_COLUMN: &str = "measurement_type";
pub const TEMPERATURE_COLUMN: &str = "temperature";
/// Optional per-observation isotherm identifier.
pub const ISOTHERM_COLUMN: &str = "isotherm";

/// Name of the Henry's constant column unless configured otherwise.
pub const DEFAULT_HENRY_COLUMN: &str = "kH";

pub const KEY_COLUMNS: [&str; 5] = [
    MATERIAL_COLUMN,
    ADSORBATE_COLUMN,
    TYPE_COLUMN,
    TEMPERATURE_COLUMN,
    ISOTHERM_COLUMN,
];

/// Two pressures closer than this address the same loading column.
const PRESSURE_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Measurement type
// ---------------------------------------------------------------------------

/// Provenance of a single isotherm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementType {
    #[serde(alias = "exp")]
    Experimental,
    #[serde(alias = "sim")]
    Simulated,
}

impl FromStr for MeasurementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exp" | "experimental" => Ok(MeasurementType::Experimental),
            "sim" | "simulated" => Ok(MeasurementType::Simulated),
            other => Err(format!("unknown measurement type '{other}'")),
        }
    }
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementType::Experimental => write!(f, "experimental"),
            MeasurementType::Simulated => write!(f, "simulated"),
        }
    }
}

/// Which measurement types a query admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeSelector {
    #[default]
    All,
    #[serde(alias = "exp")]
    Experimental,
    #[serde(alias = "sim")]
    Simulated,
}

impl TypeSelector {
    pub fn matches(self, kind: MeasurementType) -> bool {
        match self {
            TypeSelector::All => true,
            TypeSelector::Experimental => kind == MeasurementType::Experimental,
            TypeSelector::Simulated => kind == MeasurementType::Simulated,
        }
    }
}

impl FromStr for TypeSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(TypeSelector::All),
            "exp" | "experimental" => Ok(TypeSelector::Experimental),
            "sim" | "simulated" => Ok(TypeSelector::Simulated),
            other => Err(format!("unknown measurement type selector '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Schema – the numeric measurement columns, enumerated once at load time
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnKind {
    /// ln of the Henry's constant.
    Henry,
    /// Uptake at a fixed pressure, in bar.
    Loading { pressure: f64 },
    /// Any other numeric column.
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasureColumn {
    pub name: String,
    pub kind: ColumnKind,
}

/// Ordered list of numeric measurement columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    columns: Vec<MeasureColumn>,
}

impl Schema {
    /// Classify column headers: `henry_column` is the Henry column, a header
    /// that parses as a number is a loading column at that pressure.
    pub fn classify<I, S>(names: I, henry_column: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                let kind = if name == henry_column {
                    ColumnKind::Henry
                } else {
                    match name.trim().parse::<f64>() {
                        Ok(p) if p.is_finite() && p >= 0.0 => ColumnKind::Loading { pressure: p },
                        _ => ColumnKind::Other,
                    }
                };
                MeasureColumn { name, kind }
            })
            .collect();
        Schema { columns }
    }

    pub fn columns(&self) -> &[MeasureColumn] {
        &self.columns
    }

    /// The sub-schema of the given column indices, in the given order.
    pub fn select(&self, indices: &[usize]) -> Schema {
        Schema {
            columns: indices
                .iter()
                .filter_map(|&i| self.columns.get(i).cloned())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Like [`Schema::index_of`] but a missing column is a schema mismatch.
    pub fn require(&self, name: &str) -> EngineResult<usize> {
        self.index_of(name).ok_or_else(|| EngineError::missing(name))
    }

    pub fn henry(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.kind == ColumnKind::Henry)
    }

    pub fn loading_at(&self, pressure: f64) -> Option<usize> {
        self.columns.iter().position(|c| match c.kind {
            ColumnKind::Loading { pressure: p } => (p - pressure).abs() < PRESSURE_EPSILON,
            _ => false,
        })
    }

    /// `(pressure, column index)` of every loading column, ascending in pressure.
    pub fn loading_columns(&self) -> Vec<(f64, usize)> {
        let mut out: Vec<(f64, usize)> = self
            .columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| match c.kind {
                ColumnKind::Loading { pressure } => Some((pressure, i)),
                _ => None,
            })
            .collect();
        out.sort_by(|a, b| a.0.total_cmp(&b.0));
        out
    }
}

// ---------------------------------------------------------------------------
// Observation – one row of the source table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub material: String,
    pub adsorbate: String,
    pub measurement_type: MeasurementType,
    /// Kelvin.
    pub temperature: f64,
    pub isotherm: Option<String>,
    /// One value per schema column; NaN marks a missing measurement.
    pub values: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ObservationTable – the loaded store
// ---------------------------------------------------------------------------

/// The full observation dataset. Built once and shared read-only.
#[derive(Debug, Clone)]
pub struct ObservationTable {
    schema: Schema,
    observations: Vec<Observation>,
    /// Distinct materials, first-seen order.
    materials: Vec<String>,
    /// Distinct adsorbates, first-seen order.
    adsorbates: Vec<String>,
}

impl ObservationTable {
    pub fn new(schema: Schema, observations: Vec<Observation>) -> EngineResult<Self> {
        let mut materials = Vec::new();
        let mut adsorbates = Vec::new();
        let mut seen_mat = HashSet::new();
        let mut seen_ads = HashSet::new();

        for (row, obs) in observations.iter().enumerate() {
            if obs.values.len() != schema.len() {
                return Err(EngineError::RaggedRow {
                    row,
                    expected: schema.len(),
                    found: obs.values.len(),
                });
            }
            if seen_mat.insert(obs.material.as_str()) {
                materials.push(obs.material.clone());
            }
            if seen_ads.insert(obs.adsorbate.as_str()) {
                adsorbates.push(obs.adsorbate.clone());
            }
        }

        Ok(ObservationTable {
            schema,
            observations,
            materials,
            adsorbates,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn get(&self, row: usize) -> Option<&Observation> {
        self.observations.get(row)
    }

    pub fn materials(&self) -> &[String] {
        &self.materials
    }

    pub fn adsorbates(&self) -> &[String] {
        &self.adsorbates
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_detects_henry_and_pressures() {
        let schema = Schema::classify(["kH", "0.5", "1", "bet_area"], DEFAULT_HENRY_COLUMN);
        assert_eq!(schema.henry(), Some(0));
        assert_eq!(schema.loading_at(0.5), Some(1));
        assert_eq!(schema.loading_at(1.0), Some(2));
        assert_eq!(schema.loading_at(2.0), None);
        assert_eq!(schema.columns()[3].kind, ColumnKind::Other);
    }

    #[test]
    fn loading_columns_sorted_by_pressure() {
        let schema = Schema::classify(["5", "kH", "0.5", "1"], "kH");
        let pressures: Vec<f64> = schema.loading_columns().iter().map(|(p, _)| *p).collect();
        assert_eq!(pressures, vec![0.5, 1.0, 5.0]);
    }

    #[test]
    fn require_reports_missing_column() {
        let schema = Schema::classify(["kH"], "kH");
        assert_eq!(
            schema.require("0.5"),
            Err(EngineError::SchemaMismatch {
                column: "0.5".into()
            })
        );
    }

    #[test]
    fn measurement_type_aliases() {
        assert_eq!(
            "exp".parse::<MeasurementType>(),
            Ok(MeasurementType::Experimental)
        );
        assert_eq!(
            "Simulated".parse::<MeasurementType>(),
            Ok(MeasurementType::Simulated)
        );
        assert!("guess".parse::<MeasurementType>().is_err());
        assert_eq!("ALL".parse::<TypeSelector>(), Ok(TypeSelector::All));
    }

    #[test]
    fn table_tracks_first_seen_order() {
        let schema = Schema::classify(["kH"], "kH");
        let obs = |m: &str, a: &str| Observation {
            material: m.into(),
            adsorbate: a.into(),
            measurement_type: MeasurementType::Experimental,
            temperature: 303.0,
            isotherm: None,
            values: vec![1.0],
        };
        let table = ObservationTable::new(
            schema,
            vec![obs("Z", "propene"), obs("A", "propane"), obs("Z", "propane")],
        )
        .unwrap();
        assert_eq!(table.materials(), ["Z", "A"]);
        assert_eq!(table.adsorbates(), ["propene", "propane"]);
    }

    #[test]
    fn ragged_row_rejected() {
        let schema = Schema::classify(["kH", "1"], "kH");
        let obs = Observation {
            material: "M".into(),
            adsorbate: "CO2".into(),
            measurement_type: MeasurementType::Simulated,
            temperature: 298.0,
            isotherm: None,
            values: vec![1.0],
        };
        let err = ObservationTable::new(schema, vec![obs]).unwrap_err();
        assert!(matches!(err, EngineError::RaggedRow { row: 0, .. }));
    }
}
