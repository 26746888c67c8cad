//! Writes a deterministic synthetic isotherm dataset to parquet.
//!
//! ```bash
//! cargo run --bin generate_sample -- sample_isotherms.parquet
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

const PRESSURES: [&str; 6] = ["0.1", "0.5", "1", "2.5", "5", "10"];
const TEMPERATURES: [f64; 4] = [298.0, 303.0, 308.0, 323.0];

/// Langmuir uptake, mol/kg.
fn langmuir(p: f64, q_max: f64, b: f64) -> f64 {
    q_max * b * p / (1.0 + b * p)
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

#[derive(Default)]
struct Rows {
    material: Vec<String>,
    adsorbate: Vec<String>,
    measurement_type: Vec<String>,
    temperature: Vec<f64>,
    isotherm: Vec<String>,
    henry: Vec<Option<f64>>,
    loadings: Vec<Vec<Option<f64>>>,
}

impl Rows {
    fn new() -> Self {
        Rows {
            loadings: vec![Vec::new(); PRESSURES.len()],
            ..Default::default()
        }
    }

    fn len(&self) -> usize {
        self.material.len()
    }
}

fn main() -> Result<()> {
    let output_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "sample_isotherms.parquet".to_string());
    let pressures: Vec<f64> = PRESSURES
        .iter()
        .map(|p| p.parse::<f64>())
        .collect::<Result<_, _>>()
        .context("pressure header is not a number")?;

    let mut rng = SimpleRng::new(42);
    let mut rows = Rows::new();

    for m in 0..12 {
        let material = format!("MOF-{:03}", m + 1);
        // (adsorbate, q_max, b at 303 K)
        let gases = [
            ("propane", rng.uniform(2.0, 6.0), rng.uniform(0.5, 4.0)),
            ("propene", rng.uniform(2.0, 6.0), rng.uniform(0.5, 8.0)),
        ];

        for (g, &(adsorbate, q_max, b_ref)) in gases.iter().enumerate() {
            // a few materials were never measured with propene
            if g == 1 && m % 5 == 4 {
                continue;
            }
            for (kind, prefix, replicates) in [("exp", "E", 2), ("sim", "S", 1)] {
                for &t in &TEMPERATURES {
                    for r in 0..replicates {
                        let b = b_ref * (-(t - 303.0) / 40.0).exp();
                        let noise = if kind == "exp" { 0.05 } else { 0.02 };
                        // occasional gross outlier in experimental data
                        let scale = if kind == "exp" && rng.next_f64() < 0.03 {
                            10.0
                        } else {
                            1.0
                        };

                        rows.material.push(material.clone());
                        rows.adsorbate.push(adsorbate.to_string());
                        rows.measurement_type.push(kind.to_string());
                        rows.temperature.push(t);
                        rows.isotherm
                            .push(format!("{prefix}{m:02}{g}{}{r}", t as i64));
                        rows.henry.push(Some(
                            (q_max * b).ln() + rng.gauss(0.0, noise),
                        ));
                        for (col, &p) in pressures.iter().enumerate() {
                            // simulations stop at 5 bar
                            let value = if kind == "sim" && p > 5.0 {
                                None
                            } else {
                                let q = langmuir(p, q_max, b) * scale;
                                Some((q * (1.0 + rng.gauss(0.0, noise))).max(0.0))
                            };
                            rows.loadings[col].push(value);
                        }
                    }
                }
            }
        }
    }

    let mut fields = vec![
        Field::new("material", DataType::Utf8, false),
        Field::new("adsorbate", DataType::Utf8, false),
        Field::new("measurement_type", DataType::Utf8, false),
        Field::new("temperature", DataType::Float64, false),
        Field::new("isotherm", DataType::Utf8, false),
        Field::new("kH", DataType::Float64, true),
    ];
    fields.extend(PRESSURES.iter().map(|p| Field::new(*p, DataType::Float64, true)));
    let schema = Arc::new(Schema::new(fields));

    let n = rows.len();
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(rows.material)),
        Arc::new(StringArray::from(rows.adsorbate)),
        Arc::new(StringArray::from(rows.measurement_type)),
        Arc::new(Float64Array::from(rows.temperature)),
        Arc::new(StringArray::from(rows.isotherm)),
        Arc::new(Float64Array::from(rows.henry)),
    ];
    columns.extend(
        rows.loadings
            .into_iter()
            .map(|col| Arc::new(Float64Array::from(col)) as ArrayRef),
    );

    let batch =
        RecordBatch::try_new(schema.clone(), columns).context("Failed to create RecordBatch")?;

    // Write Parquet
    let file = std::fs::File::create(&output_path)
        .with_context(|| format!("Failed to create {output_path}"))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("Failed to create writer")?;
    writer.write(&batch).context("Failed to write batch")?;
    writer.close().context("Failed to close writer")?;

    println!(
        "Wrote {n} observations ({} loading pressures each) to {output_path}",
        PRESSURES.len()
    );
    Ok(())
}
