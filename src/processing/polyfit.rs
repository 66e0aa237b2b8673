use crate::error::{Error, Result};

/// Least-squares polynomial fit of `y` against `x`.
///
/// Returns coefficients in ascending order of power, `c[0] + c[1] x + ...`.
/// Callers should map `x` into `[-1, 1]` first (see [`unit_axis`]) to keep
/// the normal equations well conditioned at higher degrees.
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Result<Vec<f64>> {
    if x.len() != y.len() {
        return Err(Error::Shape(format!(
            "polyfit: {} abscissae, {} ordinates",
            x.len(),
            y.len()
        )));
    }
    let order = degree + 1;
    if x.len() < order {
        return Err(Error::InvalidParameter(format!(
            "degree {degree} fit needs at least {order} points, got {}",
            x.len()
        )));
    }

    // Normal equations: (X^T X) c = X^T y with X the Vandermonde matrix.
    let mut xtx = vec![0.0_f64; order * order];
    let mut xty = vec![0.0_f64; order];
    let mut x_pow = vec![1.0_f64; order];

    for (&xi, &yi) in x.iter().zip(y) {
        for j in 1..order {
            x_pow[j] = x_pow[j - 1] * xi;
        }
        for row in 0..order {
            for col in 0..order {
                xtx[row * order + col] += x_pow[row] * x_pow[col];
            }
            xty[row] += x_pow[row] * yi;
        }
    }

    solve_linear_system(&mut xtx, &mut xty, order)
}

/// Evaluate ascending-order coefficients at `x` (Horner).
pub fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// `n` evenly spaced points spanning `[-1, 1]`.
pub fn unit_axis(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|i| 2.0 * i as f64 / (n - 1) as f64 - 1.0)
            .collect(),
    }
}

/// Solve `a x = b` for an `n x n` row-major `a` by Gaussian elimination
/// with partial pivoting. `a` and `b` are overwritten.
pub fn solve_linear_system(a: &mut [f64], b: &mut [f64], n: usize) -> Result<Vec<f64>> {
    let scale = a.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(f64::MIN_POSITIVE);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[i * n + col].abs().total_cmp(&a[j * n + col].abs()))
            .unwrap_or(col);
        if a[pivot_row * n + col].abs() <= scale * 1e-14 {
            return Err(Error::InvalidParameter(
                "singular system in polynomial fit".into(),
            ));
        }
        if pivot_row != col {
            for k in 0..n {
                a.swap(col * n + k, pivot_row * n + k);
            }
            b.swap(col, pivot_row);
        }

        for row in (col + 1)..n {
            let factor = a[row * n + col] / a[col * n + col];
            for k in col..n {
                a[row * n + k] -= factor * a[col * n + k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row * n + k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row * n + row];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn recovers_exact_polynomial() {
        let x = unit_axis(50);
        let truth = [0.5, -1.0, 2.0, 0.0, 0.0, 0.0, 3.0];
        let y: Vec<f64> = x.iter().map(|&xi| polyval(&truth, xi)).collect();
        let fit = polyfit(&x, &y, 6).unwrap();
        for (c, t) in fit.iter().zip(&truth) {
            assert_abs_diff_eq!(c, t, epsilon = 1e-8);
        }
    }

    #[test]
    fn degree_zero_is_the_mean() {
        let fit = polyfit(&[0.0, 1.0, 2.0], &[1.0, 2.0, 6.0], 0).unwrap();
        assert_abs_diff_eq!(fit[0], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn too_few_points_is_rejected() {
        assert!(polyfit(&[0.0, 1.0], &[0.0, 1.0], 2).is_err());
    }

    #[test]
    fn repeated_abscissae_are_singular() {
        assert!(polyfit(&[1.0, 1.0, 1.0], &[0.0, 1.0, 2.0], 1).is_err());
    }

    #[test]
    fn unit_axis_endpoints() {
        let x = unit_axis(5);
        assert_eq!(x, vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
    }
}
