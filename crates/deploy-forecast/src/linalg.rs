//! Small numeric helpers shared by the fitted methods.

use crate::ForecastError;
use nalgebra::{DMatrix, DVector};

/// Arithmetic mean; finite whenever every input is finite.
pub(crate) fn mean(xs: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let sum: f64 = xs.iter().sum();
    if sum.is_finite() {
        return sum / n;
    }
    // the plain sum overflowed: average in units of the largest magnitude
    let scale = xs.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
    scale * (xs.iter().map(|x| x / scale).sum::<f64>() / n)
}

/// Sample standard deviation (n-1 denominator); 0 for fewer than two points.
pub(crate) fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let ss: f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
    (ss / (xs.len() - 1) as f64).sqrt()
}

/// Minimum-norm least-squares solution of `A x = y`, where `A[i][j] = design(i, j)`.
pub(crate) fn least_squares(
    cols: usize,
    y: &[f64],
    design: impl Fn(usize, usize) -> f64,
) -> Result<Vec<f64>, ForecastError> {
    let a = DMatrix::from_fn(y.len(), cols, |i, j| design(i, j));
    let b = DVector::from_column_slice(y);
    let x = a
        .svd(true, true)
        .solve(&b, 1e-12)
        .map_err(|e| ForecastError::Degenerate(e.to_string()))?;
    Ok(x.iter().copied().collect())
}

/// Evaluate `coeffs[0] + coeffs[1] x + ...`.
pub(crate) fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_std_uses_bessel_correction() {
        assert_eq!(sample_std(&[4.0]), 0.0);
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((sample_std(&xs) - 2.138089935).abs() < 1e-6);
    }

    #[test]
    fn mean_of_huge_values_stays_finite() {
        assert_eq!(mean(&[1.7e308, 1.7e308]), 1.7e308);
        assert_eq!(mean(&[1.7e308, -1.7e308, 1.0e308]), 1.0e308 / 3.0);
        assert_eq!(mean(&[2.0, 4.0]), 3.0);
    }

    #[test]
    fn fits_a_line() {
        let y = [1.0, 3.0, 5.0, 7.0];
        let c = least_squares(2, &y, |i, j| (i as f64).powi(j as i32)).unwrap();
        assert!((c[0] - 1.0).abs() < 1e-9);
        assert!((c[1] - 2.0).abs() < 1e-9);
        assert!((polyval(&c, 4.0) - 9.0).abs() < 1e-9);
    }
}
