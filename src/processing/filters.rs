//! Median and Savitzky–Golay filters.
//!
//! The median filter runs down each spectral bin across repeats to knock out
//! cosmic-ray hits; Savitzky–Golay runs along each trace.

use super::polyfit::{polyfit, polyval, solve_linear_system, unit_axis};
use crate::error::{Error, Result};

fn check_odd_kernel(kernel: usize, what: &str) -> Result<()> {
    if kernel == 0 || kernel % 2 == 0 {
        return Err(Error::InvalidParameter(format!(
            "{what} must be odd and positive, got {kernel}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Median filter
// ---------------------------------------------------------------------------

/// Centered median filter; samples beyond either end count as zero.
pub fn median_filter(values: &[f64], kernel: usize) -> Result<Vec<f64>> {
    check_odd_kernel(kernel, "median kernel")?;
    let half = kernel / 2;
    let n = values.len();
    let mut window = Vec::with_capacity(kernel);

    Ok((0..n)
        .map(|i| {
            window.clear();
            window.extend((0..kernel).map(|k| {
                (i + k)
                    .checked_sub(half)
                    .and_then(|j| values.get(j))
                    .copied()
                    .unwrap_or(0.0)
            }));
            window.sort_by(f64::total_cmp);
            window[half]
        })
        .collect())
}

/// Median-filter every spectral bin across the repeat axis.
pub fn cosmic_ray_filter(traces: &[Vec<f64>], kernel: usize) -> Result<Vec<Vec<f64>>> {
    check_odd_kernel(kernel, "median kernel")?;
    let n_bins = traces.first().map_or(0, Vec::len);
    if let Some((i, t)) = traces.iter().enumerate().find(|(_, t)| t.len() != n_bins) {
        return Err(Error::Shape(format!(
            "trace {i} has {} bins, trace 0 has {n_bins}",
            t.len()
        )));
    }
    let mut out = traces.to_vec();
    let mut column = Vec::with_capacity(traces.len());

    for bin in 0..n_bins {
        column.clear();
        column.extend(traces.iter().map(|t| t[bin]));
        for (trace, v) in out.iter_mut().zip(median_filter(&column, kernel)?) {
            trace[bin] = v;
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Savitzky–Golay
// ---------------------------------------------------------------------------

/// Smoothing coefficients for a centered window of odd length `window`.
pub fn savgol_coefficients(window: usize, degree: usize) -> Result<Vec<f64>> {
    check_odd_kernel(window, "Savitzky-Golay window")?;
    if degree >= window {
        return Err(Error::InvalidParameter(format!(
            "polynomial degree {degree} must be below window {window}"
        )));
    }
    let half = (window / 2) as f64;
    let order = degree + 1;
    let positions: Vec<f64> = (0..window).map(|i| i as f64 - half).collect();

    // The smoothed value is the fitted constant term, i.e. row 0 of (J^T J)^-1 J^T.
    let mut jtj = vec![0.0; order * order];
    for &x in &positions {
        for row in 0..order {
            for col in 0..order {
                jtj[row * order + col] += x.powi((row + col) as i32);
            }
        }
    }
    let mut e0 = vec![0.0; order];
    e0[0] = 1.0;
    let z = solve_linear_system(&mut jtj, &mut e0, order)?;

    Ok(positions.iter().map(|&x| polyval(&z, x)).collect())
}

/// Savitzky–Golay smoothing. The first and last half-windows are taken from
/// a polynomial fitted to the first and last full window.
pub fn savgol_filter(data: &[f64], window: usize, degree: usize) -> Result<Vec<f64>> {
    let coeffs = savgol_coefficients(window, degree)?;
    let n = data.len();
    if n < window {
        return Err(Error::InvalidParameter(format!(
            "Savitzky-Golay window {window} exceeds trace length {n}"
        )));
    }
    let half = window / 2;
    let mut out = vec![0.0; n];

    for i in half..n - half {
        out[i] = coeffs
            .iter()
            .zip(&data[i - half..=i + half])
            .map(|(c, v)| c * v)
            .sum();
    }

    let x = unit_axis(window);
    let head = polyfit(&x, &data[..window], degree)?;
    let tail = polyfit(&x, &data[n - window..], degree)?;
    for k in 0..half {
        out[k] = polyval(&head, x[k]);
        out[n - half + k] = polyval(&tail, x[window - half + k]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn median_filter_zero_pads_edges() {
        let out = median_filter(&[5.0, 1.0, 9.0, 2.0], 3).unwrap();
        assert_eq!(out, vec![1.0, 5.0, 2.0, 2.0]);
    }

    #[test]
    fn even_kernel_is_rejected() {
        assert!(median_filter(&[1.0], 2).is_err());
        assert!(savgol_coefficients(4, 0).is_err());
    }

    #[test]
    fn spike_in_one_repeat_is_removed() {
        let traces = vec![
            vec![10.0, 10.0],
            vec![11.0, 900.0],
            vec![12.0, 12.0],
            vec![11.0, 11.0],
        ];
        let out = cosmic_ray_filter(&traces, 3).unwrap();
        assert!(out.iter().all(|t| t[1] <= 12.0));
        assert_eq!(out[1][0], 11.0);
    }

    #[test]
    fn ragged_repeats_are_a_shape_error() {
        let traces = vec![vec![1.0, 2.0], vec![1.0], vec![1.0, 2.0]];
        assert!(matches!(cosmic_ray_filter(&traces, 3), Err(Error::Shape(_))));
    }

    #[test]
    fn degree_zero_is_a_moving_average() {
        let coeffs = savgol_coefficients(11, 0).unwrap();
        for c in coeffs {
            assert_abs_diff_eq!(c, 1.0 / 11.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn quadratic_coefficients_match_tabulated_values() {
        let coeffs = savgol_coefficients(5, 2).unwrap();
        let expected = [-3.0, 12.0, 17.0, 12.0, -3.0].map(|v| v / 35.0);
        for (c, e) in coeffs.iter().zip(expected) {
            assert_abs_diff_eq!(*c, e, epsilon = 1e-12);
        }
    }

    #[test]
    fn smoothing_preserves_a_line_at_degree_one() {
        let data: Vec<f64> = (0..30).map(|i| 3.0 * i as f64 - 7.0).collect();
        let out = savgol_filter(&data, 7, 1).unwrap();
        for (o, d) in out.iter().zip(&data) {
            assert_abs_diff_eq!(o, d, epsilon = 1e-9);
        }
    }

    #[test]
    fn degree_zero_edges_use_window_mean() {
        let data: Vec<f64> = (0..20).map(f64::from).collect();
        let out = savgol_filter(&data, 11, 0).unwrap();
        assert_abs_diff_eq!(out[0], 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[10], 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[19], 14.0, epsilon = 1e-12);
    }

    #[test]
    fn short_trace_is_rejected() {
        assert!(savgol_filter(&[1.0; 5], 11, 0).is_err());
    }
}
