//! Preprocessing: trace-level numerics and the record-level stages built on them.
//!
//! ```text
//!  power normalize → cosmic ray filter → smooth → (baseline removal)
//! ```

pub mod baseline;
pub mod filters;
pub mod pipeline;
pub mod polyfit;
