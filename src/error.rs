/// Structural failures raised by the aggregation engine.
///
/// Data-shape problems (missing values, empty groups, materials present for
/// only one gas) are never errors; they are absorbed by the reducer and the
/// joiner. Only a table that cannot satisfy the requested query fails.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// A required key column or a requested measurement column is absent.
    #[error("schema mismatch: column '{column}' not present")]
    SchemaMismatch { column: String },

    /// An observation whose value vector does not match the schema width.
    #[error("row {row} has {found} measurement values, schema has {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Temperature window parameters outside their domain.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A join input holds more than one row for the same material.
    #[error("join input is not keyed by material: '{material}' appears more than once")]
    DuplicateKey { material: String },

    /// A non-zero pressure with no matching loading column.
    #[error("no loading column recorded at {0} bar")]
    UnknownPressure(f64),
}

impl EngineError {
    pub(crate) fn missing(column: impl Into<String>) -> Self {
        EngineError::SchemaMismatch {
            column: column.into(),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
