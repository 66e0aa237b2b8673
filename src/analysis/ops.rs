use serde::{Deserialize, Serialize};

use crate::data::model::SpectrumRecord;
use crate::error::{Error, Result};

/// A point picked on a plot; `x` is a Raman shift in cm⁻¹.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectedPoint {
    pub x: f64,
    pub y: f64,
}

impl SelectedPoint {
    pub fn at_shift(x: f64) -> Self {
        Self { x, y: 0.0 }
    }
}

/// A reference value and the Raman shift of the bin it was found for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub raman_shift: f64,
    pub value: f64,
}

/// `record - other`, with noise added in quadrature.
pub fn subtract(record: &SpectrumRecord, other: &SpectrumRecord) -> Result<SpectrumRecord> {
    if record.n_bins() != other.n_bins() {
        return Err(Error::Shape(format!(
            "cannot subtract {} ({} bins) from {} ({} bins)",
            other.display_name(),
            other.n_bins(),
            record.display_name(),
            record.n_bins()
        )));
    }
    let reference = record
        .reference()
        .iter()
        .zip(other.reference())
        .map(|(a, b)| a - b)
        .collect();
    let noise = record
        .noise()
        .iter()
        .zip(other.noise())
        .map(|(a, b)| a.hypot(*b))
        .collect();

    let mut out = record.with_reduced(reference, noise)?;
    out.push_log(format!("- Applied subtraction of {}", other.display_name()));
    Ok(out)
}

/// Largest reference value near `point`.
///
/// The center bin is the one whose Raman shift is nearest `point.x`. With
/// `radius == 0` its own value is returned; otherwise the maximum over
/// `[center - radius, center + radius)`, clamped to the spectrum. The
/// returned index is always the center, not the position of the maximum.
pub fn find_local_max(
    record: &SpectrumRecord,
    point: SelectedPoint,
    radius: usize,
) -> Result<(Peak, usize)> {
    let center = record
        .nearest_bin(point.x)
        .ok_or_else(|| Error::MissingData(format!("{} has no bins", record.display_name())))?;
    let reference = record.reference();

    let value = if radius == 0 {
        reference[center]
    } else {
        let lo = center.saturating_sub(radius);
        let hi = (center + radius).min(reference.len());
        reference[lo..hi]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    };

    Ok((
        Peak {
            raman_shift: record.raman_shift()[center],
            value,
        },
        center,
    ))
}

/// Scale reference and noise by `weight / peak.value`.
pub fn rescale(record: &SpectrumRecord, peak: Peak, weight: f64) -> Result<SpectrumRecord> {
    if peak.value == 0.0 || !peak.value.is_finite() || !weight.is_finite() {
        return Err(Error::InvalidParameter(format!(
            "cannot rescale by {weight} / {}",
            peak.value
        )));
    }
    let factor = weight / peak.value;
    let reference = record.reference().iter().map(|v| v * factor).collect();
    let noise = record.noise().iter().map(|v| v * factor).collect();

    let mut out = record.with_reduced(reference, noise)?;
    out.push_log(format!(
        "- Normalized to peak ({:.2}, {:.2}) (x{weight:.5})",
        peak.raman_shift, peak.value
    ));
    Ok(out)
}
