//! Data layer: core types, loading, and filtering.
//!
//! Architecture:
//! ```text
//!  .parquet / .json / .csv
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader  │  parse file → ObservationTable
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────────────┐
//!   │ ObservationTable │  Vec<Observation>, Schema, material/adsorbate index
//!   └──────────────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  filter  │  measurement type + temperature window → row indices
//!   └──────────┘
//! ```

pub mod filter;
pub mod loader;
pub mod model;
