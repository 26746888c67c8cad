//! CSV and JSON writers for comparison and KPI tables.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::aggregate::ComparisonTable;
use crate::kpi::{MaterialKpi, Pair};
use crate::stats::Stat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Csv,
    Json,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Format::Csv),
            "json" => Ok(Format::Json),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Csv => write!(f, "csv"),
            Format::Json => write!(f, "json"),
        }
    }
}

/// Header row of [`write_kpis_csv`].
pub const KPI_HEADERS: [&str; 12] = [
    "material",
    "selectivity",
    "psa_api",
    "henry_x",
    "henry_y",
    "henry_n",
    "uptake_x",
    "uptake_y",
    "uptake_n",
    "working_capacity_x",
    "working_capacity_y",
    "working_capacity_n",
];

/// NaN becomes an empty cell.
fn cell(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

fn push_stats(record: &mut Vec<String>, stats: &[Stat]) {
    for s in stats {
        record.push(s.count.to_string());
        record.push(cell(s.center));
        record.push(cell(s.spread));
    }
}

fn push_pair(record: &mut Vec<String>, pair: &Pair) {
    record.push(cell(pair.x));
    record.push(cell(pair.y));
    record.push(pair.n().to_string());
}

pub fn write_comparison_csv<W: Write>(table: &ComparisonTable, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(table.headers())
        .context("Failed to write CSV header")?;

    for row in table.rows() {
        let mut record = Vec::with_capacity(1 + 6 * table.schema().len());
        record.push(row.material.clone());
        push_stats(&mut record, &row.x);
        push_stats(&mut record, &row.y);
        wtr.write_record(&record)
            .with_context(|| format!("Failed to write CSV row for {}", row.material))?;
    }
    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}

pub fn write_kpis_csv<W: Write>(kpis: &[MaterialKpi], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(KPI_HEADERS)
        .context("Failed to write CSV header")?;

    for k in kpis {
        let mut record = Vec::with_capacity(KPI_HEADERS.len());
        record.push(k.material.clone());
        record.push(cell(k.selectivity));
        record.push(cell(k.psa_api));
        push_pair(&mut record, &k.henry);
        push_pair(&mut record, &k.uptake);
        push_pair(&mut record, &k.working_capacity);
        wtr.write_record(&record)
            .with_context(|| format!("Failed to write CSV row for {}", k.material))?;
    }
    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}

/// Pretty-printed JSON; serde_json writes non-finite floats as `null`.
pub fn write_json<T: Serialize + ?Sized, W: Write>(value: &T, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value).context("Failed to serialise JSON")?;
    writeln!(writer).context("Failed to write JSON output")?;
    Ok(())
}

pub fn write_comparison<W: Write>(
    table: &ComparisonTable,
    format: Format,
    writer: W,
) -> Result<()> {
    match format {
        Format::Csv => write_comparison_csv(table, writer),
        Format::Json => write_json(table, writer),
    }
}

pub fn write_kpis<W: Write>(kpis: &[MaterialKpi], format: Format, writer: W) -> Result<()> {
    match format {
        Format::Csv => write_kpis_csv(kpis, writer),
        Format::Json => write_json(kpis, writer),
    }
}
