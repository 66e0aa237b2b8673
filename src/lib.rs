//! Raman spectrum calibration, preprocessing and limit-of-detection analysis.
//!
//! A measurement is a spectrometer trace table plus an optional laser power
//! log. [`ingest`] turns it into a calibrated [`SpectrumRecord`]; the
//! preprocessing stages and derived operations return new records, each
//! appending a line to the record's processing log; [`estimate_lod`] regresses
//! one spectral bin against concentration across a cohort.
//!
//! ```text
//!  ingest ──► run_standard_preprocessing ──► apply_baseline_removal
//!                                                  │
//!                  subtract / find_local_max / rescale
//!                                                  │
//!                                            estimate_lod
//! ```

pub mod analysis;
pub mod color;
pub mod data;
pub mod error;
pub mod processing;

pub use analysis::lod::{estimate_lod, linregress, LinearFit, LodEstimate};
pub use analysis::ops::{find_local_max, rescale, subtract, Peak, SelectedPoint};
pub use color::generate_palette;
pub use data::cohort::Cohort;
pub use data::loader::{ingest, ingest_path, pair_uploads, Calibration, IngestOptions, UploadPair};
pub use data::model::{
    mean_and_std, MetadataRow, MetadataValue, SpectrumMetadata, SpectrumRecord,
};
pub use data::schema::{from_json, to_json, SCHEMA_VERSION};
pub use error::{Error, Result};
pub use processing::baseline::{BaselineFit, BaselineParams};
pub use processing::pipeline::{
    apply_baseline_removal, run_standard_preprocessing, PipelineConfig,
};
