//! Data layer: records, ingestion, serialization and cohorts.
//!
//! Architecture:
//! ```text
//!  spectrometer .txt + power meter .csv
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  parse + calibrate → SpectrumRecord
//!   └──────────┘
//!        │
//!        ▼
//!   ┌────────────────┐
//!   │ SpectrumRecord  │  traces, axes, reference/noise, metadata, log
//!   └────────────────┘
//!        │                         ▲
//!        ▼                         │
//!   ┌──────────┐            ┌──────────┐
//!   │  cohort   │            │  schema   │  versioned JSON round trip
//!   └──────────┘            └──────────┘
//! ```

pub mod cohort;
pub mod loader;
pub mod model;
pub mod schema;
