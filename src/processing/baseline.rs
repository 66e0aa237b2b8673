//! Iterative modified-polynomial ("Lieber") baseline removal.
//!
//! Each pass fits a polynomial to the working signal and clips the signal to
//! the fit, so Raman peaks sink out of the estimate while the broad
//! fluorescence background remains. The last fit is the baseline.

use log::debug;

use super::polyfit::{polyfit, polyval, unit_axis};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineParams {
    pub degree: usize,
    pub max_iter: usize,
    /// Relative change of the clipped signal below which iteration stops.
    pub tolerance: f64,
}

impl Default for BaselineParams {
    fn default() -> Self {
        Self {
            degree: 6,
            max_iter: 200,
            tolerance: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BaselineFit {
    pub baseline: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Estimate the baseline of `y` sampled at `x`.
pub fn modpoly(x: &[f64], y: &[f64], params: &BaselineParams) -> Result<BaselineFit> {
    if params.max_iter == 0 {
        return Err(Error::InvalidParameter(
            "baseline removal needs at least one iteration".into(),
        ));
    }

    let mut working = y.to_vec();
    let mut baseline = Vec::new();
    let mut iterations = 0;
    let mut converged = false;

    while iterations < params.max_iter {
        let coeffs = polyfit(x, &working, params.degree)?;
        baseline = x.iter().map(|&xi| polyval(&coeffs, xi)).collect::<Vec<f64>>();
        iterations += 1;

        let mut delta = 0.0;
        let mut norm = 0.0;
        for (w, &b) in working.iter_mut().zip(&baseline) {
            norm += *w * *w;
            if b < *w {
                delta += (*w - b) * (*w - b);
                *w = b;
            }
        }
        let change = if norm > 0.0 { (delta / norm).sqrt() } else { 0.0 };
        if change < params.tolerance {
            converged = true;
            break;
        }
    }

    Ok(BaselineFit {
        baseline,
        iterations,
        converged,
    })
}

/// Subtract the ModPoly baseline from one trace.
///
/// With a `cutoff` wavelength only bins at or above it take part in the fit
/// and are corrected; the rest pass through unchanged.
pub fn remove_baseline(
    trace: &[f64],
    wavelength: &[f64],
    params: &BaselineParams,
    cutoff: Option<f64>,
) -> Result<(Vec<f64>, BaselineFit)> {
    if trace.len() != wavelength.len() {
        return Err(Error::Shape(format!(
            "trace has {} bins, wavelength axis has {}",
            trace.len(),
            wavelength.len()
        )));
    }
    let selected: Vec<usize> = match cutoff {
        Some(limit) => (0..trace.len()).filter(|&i| wavelength[i] >= limit).collect(),
        None => (0..trace.len()).collect(),
    };
    if selected.len() <= params.degree {
        return Err(Error::InvalidParameter(format!(
            "{} bins above the cutoff cannot support a degree {} baseline",
            selected.len(),
            params.degree
        )));
    }

    // Map the fitted index span onto [-1, 1].
    let first = selected[0];
    let span = selected[selected.len() - 1] - first;
    let axis = unit_axis(span + 1);
    let x: Vec<f64> = selected.iter().map(|&i| axis[i - first]).collect();
    let y: Vec<f64> = selected.iter().map(|&i| trace[i]).collect();
    let fit = modpoly(&x, &y, params)?;
    debug!(
        "baseline: {} bins, {} iterations, converged={}",
        selected.len(),
        fit.iterations,
        fit.converged
    );

    let mut corrected = trace.to_vec();
    for (&i, &b) in selected.iter().zip(&fit.baseline) {
        corrected[i] -= b;
    }
    Ok((corrected, fit))
}
