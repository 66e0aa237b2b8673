//! Operations on reduced spectra: comparison, peak search and detection limits.

pub mod lod;
pub mod ops;
