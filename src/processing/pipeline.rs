use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::baseline::{self, BaselineParams};
use super::filters;
use crate::data::model::SpectrumRecord;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Parameters of the preprocessing stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub median_kernel: usize,
    pub savgol_window: usize,
    pub savgol_degree: usize,
    pub baseline_degree: usize,
    pub baseline_max_iter: usize,
    pub baseline_tolerance: f64,
    pub baseline_cutoff_wavelength: Option<f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let baseline = BaselineParams::default();
        Self {
            median_kernel: 3,
            savgol_window: 11,
            savgol_degree: 0,
            baseline_degree: baseline.degree,
            baseline_max_iter: baseline.max_iter,
            baseline_tolerance: baseline.tolerance,
            baseline_cutoff_wavelength: None,
        }
    }
}

impl PipelineConfig {
    /// Read a configuration from JSON; missing keys take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn baseline_params(&self) -> BaselineParams {
        BaselineParams {
            degree: self.baseline_degree,
            max_iter: self.baseline_max_iter,
            tolerance: self.baseline_tolerance,
        }
    }
}

// ---------------------------------------------------------------------------
// Stages
//
// Every stage takes a record by reference and returns a new one. The input
// is never modified, so a failing stage leaves the caller's record as it was.
// ---------------------------------------------------------------------------

/// Divide each trace by its laser power weight.
///
/// Without explicit `weights`, repeat `i` is weighted by
/// `avg_power[i] / max(avg_power)`.
pub fn power_normalize(
    record: &SpectrumRecord,
    weights: Option<&[f64]>,
) -> Result<SpectrumRecord> {
    let weights = match weights {
        Some(w) => {
            if w.len() != record.n_traces() {
                return Err(Error::InvalidParameter(format!(
                    "{} weights for {} traces",
                    w.len(),
                    record.n_traces()
                )));
            }
            w.to_vec()
        }
        None => {
            let power = record.avg_power().ok_or_else(|| {
                Error::MissingData(format!(
                    "{} has no laser power readings",
                    record.display_name()
                ))
            })?;
            let max = power.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if !(max > 0.0) {
                return Err(Error::InvalidParameter(format!(
                    "{}: maximum laser power is {max}",
                    record.display_name()
                )));
            }
            power.iter().map(|p| p / max).collect()
        }
    };
    if let Some((i, w)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| **w == 0.0 || !w.is_finite())
    {
        return Err(Error::InvalidParameter(format!("power weight {i} is {w}")));
    }

    let traces: Vec<Vec<f64>> = record
        .traces()
        .iter()
        .zip(&weights)
        .map(|(trace, w)| trace.iter().map(|v| v / w).collect())
        .collect();
    let mut out = record.with_traces(traces)?;
    debug!("{}: power weights {weights:?}", record.display_name());
    out.push_log("- Applied power normalization");
    Ok(out)
}

/// Median filter across repeats, bin by bin.
///
/// Edges are zero-padded, so with fewer repeats than `kernel` the output is
/// pulled towards zero: one repeat becomes all zeros, two become their
/// per-bin minimum.
pub fn cosmic_ray_filter(record: &SpectrumRecord, kernel: usize) -> Result<SpectrumRecord> {
    if record.n_traces() < kernel {
        warn!(
            "{}: cosmic ray filter with kernel {kernel} over only {} repeats; zero padding dominates",
            record.display_name(),
            record.n_traces()
        );
    }
    let traces = filters::cosmic_ray_filter(record.traces(), kernel)?;
    let mut out = record.with_traces(traces)?;
    out.push_log(format!("- Applied cosmic ray median filter (kernel {kernel})"));
    Ok(out)
}

/// Savitzky–Golay smoothing of every trace.
pub fn smooth(record: &SpectrumRecord, window: usize, degree: usize) -> Result<SpectrumRecord> {
    let traces = record
        .traces()
        .iter()
        .map(|t| filters::savgol_filter(t, window, degree))
        .collect::<Result<Vec<_>>>()?;
    let mut out = record.with_traces(traces)?;
    out.push_log(format!(
        "- Applied Savitzky-Golay smoothing (window {window}, degree {degree})"
    ));
    Ok(out)
}

/// Subtract a ModPoly baseline from every trace.
pub fn remove_baseline(
    record: &SpectrumRecord,
    params: &BaselineParams,
    cutoff_wavelength: Option<f64>,
) -> Result<SpectrumRecord> {
    let mut traces = Vec::with_capacity(record.n_traces());
    for (i, trace) in record.traces().iter().enumerate() {
        let (corrected, fit) =
            baseline::remove_baseline(trace, record.wavelength(), params, cutoff_wavelength)?;
        if !fit.converged {
            warn!(
                "{}: baseline of trace {i} stopped at the {}-iteration cap",
                record.display_name(),
                params.max_iter
            );
        }
        traces.push(corrected);
    }

    let mut out = record.with_traces(traces)?;
    let mut entry = format!(
        "- Applied Lieber baseline fit (degree {}, max {} iterations",
        params.degree, params.max_iter
    );
    if let Some(cutoff) = cutoff_wavelength {
        entry.push_str(&format!(", from {cutoff} nm"));
    }
    entry.push(')');
    out.push_log(entry);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Standard routine
// ---------------------------------------------------------------------------

/// Power normalisation, cosmic ray filter and smoothing, in that order.
///
/// Records without power readings skip normalisation; the skip is logged.
pub fn run_standard_preprocessing(
    record: &SpectrumRecord,
    config: &PipelineConfig,
) -> Result<SpectrumRecord> {
    let normalized = match power_normalize(record, None) {
        Ok(r) => r,
        Err(Error::MissingData(reason)) => {
            warn!("skipping power normalization: {reason}");
            let mut r = record.clone();
            r.push_log("- Skipped power normalization (no power data)");
            r
        }
        Err(e) => return Err(e),
    };
    let filtered = cosmic_ray_filter(&normalized, config.median_kernel)?;
    let smoothed = smooth(&filtered, config.savgol_window, config.savgol_degree)?;
    info!(
        "{}: preprocessed {} traces",
        record.display_name(),
        record.n_traces()
    );
    Ok(smoothed)
}

/// Baseline removal with an explicit degree and iteration cap and the
/// default convergence tolerance.
pub fn apply_baseline_removal(
    record: &SpectrumRecord,
    degree: usize,
    max_iter: usize,
    cutoff_wavelength: Option<f64>,
) -> Result<SpectrumRecord> {
    let params = BaselineParams {
        degree,
        max_iter,
        ..BaselineParams::default()
    };
    remove_baseline(record, &params, cutoff_wavelength)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::data::model::tests::{metadata, record};

    fn powered(traces: Vec<Vec<f64>>, power: Vec<f64>) -> SpectrumRecord {
        let n = traces[0].len();
        let axis: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let wl = axis.iter().map(|x| 850.0 + x).collect();
        SpectrumRecord::new(traces, wl, axis, Some(power), metadata("p")).unwrap()
    }

    #[test]
    fn default_weights_scale_to_strongest_repeat() {
        let r = powered(vec![vec![2.0, 4.0], vec![2.0, 4.0]], vec![0.5, 1.0]);
        let out = power_normalize(&r, None).unwrap();
        assert_eq!(out.traces()[0], vec![4.0, 8.0]);
        assert_eq!(out.traces()[1], vec![2.0, 4.0]);
        assert_eq!(out.reference(), &[3.0, 6.0]);
        assert_eq!(out.log_entries().last().unwrap(), "- Applied power normalization");
        // input untouched
        assert_eq!(r.traces()[0], vec![2.0, 4.0]);
    }

    #[test]
    fn explicit_weights_are_used_verbatim() {
        let r = record(vec![vec![3.0], vec![3.0]]);
        let out = power_normalize(&r, Some(&[1.0, 3.0])).unwrap();
        assert_eq!(out.reference(), &[2.0]);
        assert!(power_normalize(&r, Some(&[1.0, 0.0])).is_err());
        assert!(power_normalize(&r, Some(&[1.0])).is_err());
    }

    #[test]
    fn missing_power_is_reported() {
        let r = record(vec![vec![3.0]]);
        assert!(matches!(power_normalize(&r, None), Err(Error::MissingData(_))));
    }

    #[test]
    fn standard_routine_without_power_skips_normalization() {
        let r = record(vec![vec![1.0; 20], vec![2.0; 20], vec![3.0; 20]]);
        let out = run_standard_preprocessing(&r, &PipelineConfig::default()).unwrap();
        let log = out.log_entries();
        assert!(log.iter().any(|l| l.contains("Skipped power normalization")));
        assert!(log.last().unwrap().contains("Savitzky-Golay"));
        // medfilt across [1, 2, 3] with zero padding gives [1, 2, 2]
        assert_relative_eq!(out.reference()[10], 5.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn few_repeats_follow_zero_padding() {
        let one = cosmic_ray_filter(&record(vec![vec![100.0; 4]]), 3).unwrap();
        assert_eq!(one.reference(), &[0.0; 4]);

        let two = cosmic_ray_filter(&record(vec![vec![5.0, 9.0], vec![7.0, 2.0]]), 3).unwrap();
        assert_eq!(two.traces()[0], vec![5.0, 2.0]);
        assert_eq!(two.traces()[1], vec![5.0, 2.0]);
        assert!(two.log_entries().last().unwrap().contains("kernel 3"));
    }

    #[test]
    fn failing_stage_leaves_no_trace() {
        let r = record(vec![vec![1.0; 5]]);
        let err = smooth(&r, 11, 0);
        assert!(err.is_err());
        assert_eq!(r.log_entries().len(), 5);
    }

    #[test]
    fn baseline_stage_logs_cutoff() {
        let r = record(vec![vec![4.0; 30], vec![6.0; 30]]);
        let out = apply_baseline_removal(&r, 2, 50, Some(860.0)).unwrap();
        assert!(out.log_entries().last().unwrap().contains("from 860 nm"));
        assert_relative_eq!(out.reference()[29], 0.0, epsilon = 1e-9);
        assert_eq!(out.reference()[0], 5.0);
    }

    #[test]
    fn config_reads_partial_json() {
        let config = PipelineConfig::from_json(r#"{"savgol_window": 7}"#).unwrap();
        assert_eq!(config.savgol_window, 7);
        assert_eq!(config.median_kernel, 3);
    }
}
