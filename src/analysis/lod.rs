//! Limit of detection from a concentration series.
//!
//! The signal at one spectral bin is regressed against concentration. The
//! detection limit is the concentration at which the fitted line reaches
//! three mean noise levels above the weakest observed signal.

use log::info;
use serde::{Deserialize, Serialize};

use super::ops::{find_local_max, SelectedPoint};
use crate::data::model::SpectrumRecord;
use crate::error::{Error, Result};

/// Ordinary least-squares line `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Pearson correlation coefficient.
    pub r_value: f64,
}

impl LinearFit {
    pub fn r_squared(&self) -> f64 {
        self.r_value * self.r_value
    }
}

/// Fit `y` against `x`. Fails when `x` has no spread.
pub fn linregress(x: &[f64], y: &[f64]) -> Result<LinearFit> {
    if x.len() != y.len() {
        return Err(Error::Shape(format!(
            "{} concentrations for {} signals",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 2 {
        return Err(Error::DegenerateFit(format!(
            "a line needs at least two points, got {}",
            x.len()
        )));
    }
    let n = x.len() as f64;
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx == 0.0 {
        return Err(Error::DegenerateFit("all concentrations are equal".into()));
    }

    let slope = sxy / sxx;
    let r_value = if syy == 0.0 {
        0.0
    } else {
        (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
    };
    Ok(LinearFit {
        slope,
        intercept: y_mean - slope * x_mean,
        r_value,
    })
}

// ---------------------------------------------------------------------------
// LOD estimate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodEstimate {
    /// Raman shift (cm⁻¹) of the analysed bin.
    pub raman_shift: f64,
    pub bin_index: usize,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    /// Detection limit, in the unit of the concentrations.
    pub lod: f64,
    pub mean_noise: f64,
    pub min_reference: f64,
    pub max_reference: f64,
    /// Per-record points, in cohort order.
    pub concentrations: Vec<f64>,
    pub references: Vec<f64>,
    pub noise: Vec<f64>,
}

impl LodEstimate {
    /// Text lines for the analysis log.
    pub fn summary(&self) -> Vec<String> {
        vec![
            format!(
                "LOD Concentration for {:.2} Raman Peak is {:.4} ppm",
                self.raman_shift, self.lod
            ),
            format!("y = {:.5} * x + {:.5}", self.slope, self.intercept),
            format!("r-squared = {}", self.r_squared),
        ]
    }

    /// Endpoints of the fitted line over the observed concentration range.
    pub fn fit_line(&self) -> [(f64, f64); 2] {
        let lo = self.concentrations.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = self.concentrations.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        [
            (lo, self.slope * lo + self.intercept),
            (hi, self.slope * hi + self.intercept),
        ]
    }
}

/// Regress `reference[bin]` against concentration across `cohort`.
///
/// The bin is the one nearest `point.x` in the first record. The weakest
/// observed signal stands in for the blank, so the cohort should include its
/// lowest-concentration sample.
pub fn estimate_lod(cohort: &[SpectrumRecord], point: SelectedPoint) -> Result<LodEstimate> {
    let first = cohort
        .first()
        .ok_or_else(|| Error::DegenerateFit("empty cohort".into()))?;
    let (peak, bin) = find_local_max(first, point, 0)?;

    let mut concentrations = Vec::with_capacity(cohort.len());
    let mut references = Vec::with_capacity(cohort.len());
    let mut noise = Vec::with_capacity(cohort.len());
    for record in cohort {
        let c = record.metadata.concentration.as_f64().ok_or_else(|| Error::Type {
            record: record.display_name().to_string(),
            value: record.metadata.concentration.to_string(),
        })?;
        if bin >= record.n_bins() {
            return Err(Error::Shape(format!(
                "{} has {} bins, bin {bin} requested",
                record.display_name(),
                record.n_bins()
            )));
        }
        concentrations.push(c);
        references.push(record.reference()[bin]);
        noise.push(record.noise()[bin]);
    }

    let fit = linregress(&concentrations, &references)?;

    let c_min = concentrations.iter().copied().fold(f64::INFINITY, f64::min);
    let c_max = concentrations.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let signal_scale = references.iter().fold(0.0_f64, |m, r| m.max(r.abs()));
    if fit.slope.abs() * (c_max - c_min) <= 1e-12 * signal_scale || !fit.slope.is_finite() {
        return Err(Error::DegenerateFit(format!(
            "slope {} at {:.2} cm-1 does not separate the concentrations",
            fit.slope, peak.raman_shift
        )));
    }

    let mean_noise = noise.iter().sum::<f64>() / noise.len() as f64;
    let min_reference = references.iter().copied().fold(f64::INFINITY, f64::min);
    let max_reference = references.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let lod = (3.0 * mean_noise + min_reference - fit.intercept) / fit.slope;

    info!(
        "LOD at {:.2} cm-1: {lod:.4} (slope {:.5}, r2 {:.3})",
        peak.raman_shift,
        fit.slope,
        fit.r_squared()
    );

    Ok(LodEstimate {
        raman_shift: peak.raman_shift,
        bin_index: bin,
        slope: fit.slope,
        intercept: fit.intercept,
        r_squared: fit.r_squared(),
        lod,
        mean_noise,
        min_reference,
        max_reference,
        concentrations,
        references,
        noise,
    })
}
