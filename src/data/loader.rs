use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, AsArray, Float32Array, Float64Array, Int32Array, Int64Array, LargeStringArray,
    StringArray,
};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use crate::error::EngineError;

use super::model::{
    MeasurementType, Observation, ObservationTable, Schema, ADSORBATE_COLUMN,
    DEFAULT_HENRY_COLUMN, ISOTHERM_COLUMN, KEY_COLUMNS, MATERIAL_COLUMN, TEMPERATURE_COLUMN,
    TYPE_COLUMN,
};

/// How measurement columns are classified while loading.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub henry_column: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            henry_column: DEFAULT_HENRY_COLUMN.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load an observation table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – flat columns, one observation per row (recommended)
/// * `.json`    – `[{ "material": ..., "adsorbate": ..., "kH": ..., "0.5": ... }, ...]`
/// * `.csv`     – header row, empty cells are missing values
pub fn load_file(path: &Path, options: &LoadOptions) -> Result<ObservationTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path, options),
        "json" => load_json(path, options),
        "csv" => load_csv(path, options),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    log::info!(
        "loaded {} observations ({} materials, {} adsorbates, {} measurement columns) from {}",
        table.len(),
        table.materials().len(),
        table.adsorbates().len(),
        table.schema().len(),
        path.display()
    );
    Ok(table)
}

fn is_key(name: &str) -> bool {
    KEY_COLUMNS.contains(&name)
}

fn parse_type(s: &str, row: usize) -> Result<MeasurementType> {
    s.parse::<MeasurementType>()
        .map_err(|e| anyhow::anyhow!("Row {row}: {e}"))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   {
///     "material": "HKUST-1",
///     "adsorbate": "propane",
///     "measurement_type": "exp",
///     "temperature": 303.0,
///     "isotherm": "10.1021-abc.1",
///     "kH": 2.31,
///     "0.5": 4.1,
///     "1": null
///   },
///   ...
/// ]
/// ```
///
/// Measurement columns are the union of non-key keys over all records, in
/// first-seen order; a record without a key has a missing value there.
pub fn load_json_str(text: &str, options: &LoadOptions) -> Result<ObservationTable> {
    let root: JsonValue = serde_json::from_str(text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut names: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for rec in records {
        if let Some(obj) = rec.as_object() {
            for key in obj.keys().filter(|k| !is_key(k)) {
                if !positions.contains_key(key) {
                    positions.insert(key.clone(), names.len());
                    names.push(key.clone());
                }
            }
        }
    }

    let mut observations = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let material = json_string(obj.get(MATERIAL_COLUMN), i, MATERIAL_COLUMN)?;
        let adsorbate = json_string(obj.get(ADSORBATE_COLUMN), i, ADSORBATE_COLUMN)?;
        let kind = json_string(obj.get(TYPE_COLUMN), i, TYPE_COLUMN)?;
        let temperature = obj
            .get(TEMPERATURE_COLUMN)
            .ok_or_else(|| EngineError::missing(TEMPERATURE_COLUMN))?
            .as_f64()
            .with_context(|| format!("Row {i}: '{TEMPERATURE_COLUMN}' is not a number"))?;
        let isotherm = match obj.get(ISOTHERM_COLUMN) {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };

        let mut values = vec![f64::NAN; names.len()];
        for (key, val) in obj.iter().filter(|(k, _)| !is_key(k)) {
            let slot = positions[key.as_str()];
            values[slot] = match val {
                JsonValue::Null => f64::NAN,
                v => v
                    .as_f64()
                    .with_context(|| format!("Row {i}, '{key}': not a number"))?,
            };
        }

        observations.push(Observation {
            material,
            adsorbate,
            measurement_type: parse_type(&kind, i)?,
            temperature,
            isotherm,
            values,
        });
    }

    let schema = Schema::classify(names, &options.henry_column);
    Ok(ObservationTable::new(schema, observations)?)
}

fn load_json(path: &Path, options: &LoadOptions) -> Result<ObservationTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    load_json_str(&text, options)
}

fn json_string(val: Option<&JsonValue>, row: usize, col: &str) -> Result<String> {
    match val {
        None => Err(EngineError::missing(col).into()),
        Some(JsonValue::String(s)) => Ok(s.clone()),
        Some(JsonValue::Number(n)) => Ok(n.to_string()),
        Some(_) => bail!("Row {row}: '{col}' is not a string"),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names.
/// Key columns are located by name; every other column is numeric and an
/// empty cell is a missing value.
pub fn load_csv_reader<R: std::io::Read>(
    reader: R,
    options: &LoadOptions,
) -> Result<ObservationTable> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let find = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| EngineError::missing(name).into())
    };
    let material_idx = find(MATERIAL_COLUMN)?;
    let adsorbate_idx = find(ADSORBATE_COLUMN)?;
    let type_idx = find(TYPE_COLUMN)?;
    let temp_idx = find(TEMPERATURE_COLUMN)?;
    let iso_idx = headers.iter().position(|h| h == ISOTHERM_COLUMN);

    let value_cols: Vec<usize> = (0..headers.len())
        .filter(|&i| !is_key(&headers[i]))
        .collect();

    let mut observations = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let cell = |i: usize| record.get(i).unwrap_or("").trim();

        let temperature = cell(temp_idx)
            .parse::<f64>()
            .with_context(|| format!("CSV row {row_no}: bad temperature '{}'", cell(temp_idx)))?;

        let values = value_cols
            .iter()
            .map(|&i| parse_cell(cell(i), row_no, &headers[i]))
            .collect::<Result<Vec<f64>>>()?;

        observations.push(Observation {
            material: cell(material_idx).to_string(),
            adsorbate: cell(adsorbate_idx).to_string(),
            measurement_type: parse_type(cell(type_idx), row_no)?,
            temperature,
            isotherm: iso_idx
                .map(|i| cell(i).to_string())
                .filter(|s| !s.is_empty()),
            values,
        });
    }

    let schema = Schema::classify(
        value_cols.iter().map(|&i| headers[i].clone()),
        &options.henry_column,
    );
    Ok(ObservationTable::new(schema, observations)?)
}

fn load_csv(path: &Path, options: &LoadOptions) -> Result<ObservationTable> {
    let file = std::fs::File::open(path).context("opening CSV")?;
    load_csv_reader(file, options)
}

fn parse_cell(s: &str, row: usize, col: &str) -> Result<f64> {
    if s.is_empty() {
        return Ok(f64::NAN);
    }
    s.parse::<f64>()
        .with_context(|| format!("Row {row}, {col}: '{s}' is not a number"))
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file containing one observation per row.
///
/// Expected schema:
/// - `material`, `adsorbate`, `measurement_type`: Utf8 / LargeUtf8
/// - `temperature`: any float or integer type
/// - `isotherm` (optional): Utf8 / LargeUtf8
/// - Any other column: float or integer measurement, nulls are missing values
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path, options: &LoadOptions) -> Result<ObservationTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;

    let arrow_schema = builder.schema().clone();
    let locate = |name: &str| -> Result<usize> {
        arrow_schema
            .index_of(name)
            .map_err(|_| EngineError::missing(name).into())
    };
    let material_idx = locate(MATERIAL_COLUMN)?;
    let adsorbate_idx = locate(ADSORBATE_COLUMN)?;
    let type_idx = locate(TYPE_COLUMN)?;
    let temp_idx = locate(TEMPERATURE_COLUMN)?;
    let iso_idx = arrow_schema.index_of(ISOTHERM_COLUMN).ok();

    // Measurement columns: everything except the key columns
    let value_cols: Vec<(usize, String)> = arrow_schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| !is_key(f.name()))
        .map(|(i, f)| (i, f.name().clone()))
        .collect();

    let reader = builder.build().context("building parquet reader")?;
    let mut observations = Vec::new();
    let mut row_base = 0usize;

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let n_rows = batch.num_rows();

        for row in 0..n_rows {
            let global = row_base + row;
            let material = extract_string(batch.column(material_idx), row)
                .with_context(|| format!("Row {global}: failed to read '{MATERIAL_COLUMN}'"))?;
            let adsorbate = extract_string(batch.column(adsorbate_idx), row)
                .with_context(|| format!("Row {global}: failed to read '{ADSORBATE_COLUMN}'"))?;
            let kind = extract_string(batch.column(type_idx), row)
                .with_context(|| format!("Row {global}: failed to read '{TYPE_COLUMN}'"))?;
            let temperature = extract_f64(batch.column(temp_idx), row)
                .with_context(|| format!("Row {global}: failed to read '{TEMPERATURE_COLUMN}'"))?;
            let isotherm = match iso_idx {
                Some(i) if !batch.column(i).is_null(row) => {
                    Some(extract_string(batch.column(i), row)?)
                }
                _ => None,
            };

            let values = value_cols
                .iter()
                .map(|(i, name)| {
                    extract_f64(batch.column(*i), row)
                        .with_context(|| format!("Row {global}: failed to read '{name}'"))
                })
                .collect::<Result<Vec<f64>>>()?;

            observations.push(Observation {
                material,
                adsorbate,
                measurement_type: parse_type(&kind, global)?,
                temperature,
                isotherm,
                values,
            });
        }
        row_base += n_rows;
    }

    let schema = Schema::classify(
        value_cols.into_iter().map(|(_, name)| name),
        &options.henry_column,
    );
    Ok(ObservationTable::new(schema, observations)?)
}

// -- Parquet / Arrow helpers --

/// Extract a string cell from a Utf8 or LargeUtf8 column.
fn extract_string(col: &Arc<dyn Array>, row: usize) -> Result<String> {
    if col.is_null(row) {
        bail!("null value in key column");
    }
    match col.data_type() {
        DataType::Utf8 => {
            let arr = col
                .as_any()
                .downcast_ref::<StringArray>()
                .context("expected StringArray")?;
            Ok(arr.value(row).to_string())
        }
        DataType::LargeUtf8 => {
            let arr = col
                .as_any()
                .downcast_ref::<LargeStringArray>()
                .context("expected LargeStringArray")?;
            Ok(arr.value(row).to_string())
        }
        DataType::Utf8View => Ok(col.as_string_view().value(row).to_string()),
        other => bail!("Expected string column, got {other:?}"),
    }
}

/// Extract a numeric cell as `f64`; nulls become NaN.
fn extract_f64(col: &Arc<dyn Array>, row: usize) -> Result<f64> {
    if col.is_null(row) {
        return Ok(f64::NAN);
    }
    let any = col.as_any();
    let value = match col.data_type() {
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .context("expected Float64Array")?
            .value(row),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()
            .context("expected Float32Array")?
            .value(row) as f64,
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .context("expected Int64Array")?
            .value(row) as f64,
        DataType::Int32 => any
            .downcast_ref::<Int32Array>()
            .context("expected Int32Array")?
            .value(row) as f64,
        other => bail!("Expected numeric column, got {other:?}"),
    };
    Ok(value)
}
