//! Autoregressive, volatility and polynomial fits.

use crate::linalg::{least_squares, mean, polyval};
use crate::{ForecastError, ForecastMethod, ForecastParams, Forecaster};
use tracing::debug;

const PHI_LIMIT: f64 = 0.999;

/// AR(1) with mean, fitted by Yule-Walker. Forecasts `steps` ahead and adds
/// `std_dev` forecast standard errors.
#[derive(Clone, Copy, Debug, Default)]
pub struct Arma;

/// Fitted AR(1) parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Ar1 {
    pub mu: f64,
    pub phi: f64,
    pub sigma2: f64,
}

pub(crate) fn fit_ar1(data: &[f64]) -> Ar1 {
    let n = data.len() as f64;
    let mu = mean(data);
    let g0 = data.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / n;
    let g1 = data
        .windows(2)
        .map(|w| (w[0] - mu) * (w[1] - mu))
        .sum::<f64>()
        / n;
    let phi = if g0 > 0.0 {
        (g1 / g0).clamp(-PHI_LIMIT, PHI_LIMIT)
    } else {
        0.0
    };
    Ar1 {
        mu,
        phi,
        sigma2: g0 * (1.0 - phi * phi),
    }
}

impl Forecaster for Arma {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::Arma
    }

    fn min_history(&self, _params: &ForecastParams) -> usize {
        2
    }

    fn predict(&self, data: &[f64], params: &ForecastParams) -> Result<f64, ForecastError> {
        let fit = fit_ar1(data);
        let h = params.horizon();
        let last = data[data.len() - 1];
        let point = fit.mu + fit.phi.powi(h as i32) * (last - fit.mu);
        debug!(mu = fit.mu, phi = fit.phi, point, "arma fit");
        if params.std_dev == 0.0 {
            return Ok(point);
        }
        let var: f64 = (0..h).map(|i| fit.phi.powi(2 * i as i32)).sum::<f64>() * fit.sigma2;
        Ok(point + params.std_dev * var.sqrt())
    }
}

/// Constant mean with ARCH(1) conditional variance. Returns the mean shifted
/// by `std_dev` times the forecast volatility `steps` ahead.
#[derive(Clone, Copy, Debug, Default)]
pub struct Arch;

impl Forecaster for Arch {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::Arch
    }

    fn min_history(&self, _params: &ForecastParams) -> usize {
        3
    }

    fn predict(&self, data: &[f64], params: &ForecastParams) -> Result<f64, ForecastError> {
        let mu = mean(data);
        if params.std_dev == 0.0 {
            return Ok(mu);
        }
        let e2: Vec<f64> = data.iter().map(|x| (x - mu).powi(2)).collect();
        let unconditional = mean(&e2);
        // e2[t] = omega + alpha * e2[t-1]
        let y = &e2[1..];
        let coeffs = least_squares(2, y, |i, j| if j == 0 { 1.0 } else { e2[i] })?;
        let alpha = coeffs[1].clamp(0.0, PHI_LIMIT);
        let mut omega = coeffs[0];
        if !(omega.is_finite() && omega > 0.0) {
            omega = unconditional * (1.0 - alpha);
        }
        let mut var = omega + alpha * e2[e2.len() - 1];
        for _ in 1..params.horizon() {
            var = omega + alpha * var;
        }
        debug!(mu, omega, alpha, var, "arch fit");
        Ok(mu + params.std_dev * var.max(0.0).sqrt())
    }
}

/// Least-squares polynomial of `degree` over the window, evaluated one index
/// past its end.
#[derive(Clone, Copy, Debug, Default)]
pub struct Polynomial;

impl Forecaster for Polynomial {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::Polynomial
    }

    fn min_history(&self, params: &ForecastParams) -> usize {
        params.degree + 1
    }

    fn predict(&self, data: &[f64], params: &ForecastParams) -> Result<f64, ForecastError> {
        let n = data.len();
        // indices scaled to [0, 1] to keep the Vandermonde system well conditioned
        let scale = (n.max(2) - 1) as f64;
        let coeffs = least_squares(params.degree + 1, data, |i, j| {
            (i as f64 / scale).powi(j as i32)
        })?;
        Ok(polyval(&coeffs, n as f64 / scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(steps: usize, std_dev: f64, degree: usize) -> ForecastParams {
        ForecastParams {
            steps,
            back_steps: 0,
            std_dev,
            degree,
        }
    }

    #[test]
    fn ar1_recovers_mean_reversion() {
        let data = [6.0, 7.0, 8.0, 9.0, 10.0];
        let fit = fit_ar1(&data);
        assert_eq!(fit.mu, 8.0);
        assert!((fit.phi - 0.4).abs() < 1e-12);
        let one = Arma.predict(&data, &p(1, 0.0, 1)).unwrap();
        let five = Arma.predict(&data, &p(5, 0.0, 1)).unwrap();
        assert!((one - 8.8).abs() < 1e-9);
        assert!(five > 8.0 && five < one);
    }

    #[test]
    fn arma_std_dev_widens_with_horizon() {
        let data = [1.0, 3.0, 2.0, 4.0, 3.0, 5.0];
        let base = Arma.predict(&data, &p(3, 0.0, 1)).unwrap();
        let one_step = Arma.predict(&data, &p(1, 0.0, 1)).unwrap();
        let up1 = Arma.predict(&data, &p(1, 1.0, 1)).unwrap() - one_step;
        let up3 = Arma.predict(&data, &p(3, 1.0, 1)).unwrap() - base;
        assert!(up1 > 0.0);
        assert!(up3 >= up1 - 1e-12);
    }

    #[test]
    fn arch_is_mean_without_adjustment() {
        let data = [1.0, 5.0, 2.0, 8.0, 3.0];
        assert_eq!(Arch.predict(&data, &p(1, 0.0, 1)).unwrap(), 3.8);
        let up = Arch.predict(&data, &p(1, 1.0, 1)).unwrap();
        let down = Arch.predict(&data, &p(1, -1.0, 1)).unwrap();
        assert!(up > 3.8 && down < 3.8);
        assert!(((up - 3.8) - (3.8 - down)).abs() < 1e-9);
    }

    #[test]
    fn polynomial_extrapolates() {
        let line: Vec<f64> = (0..6).map(|i| 2.0 * i as f64 + 1.0).collect();
        assert!((Polynomial.predict(&line, &p(1, 0.0, 1)).unwrap() - 13.0).abs() < 1e-9);
        let square: Vec<f64> = (0..6).map(|i| (i * i) as f64).collect();
        assert!((Polynomial.predict(&square, &p(1, 0.0, 2)).unwrap() - 36.0).abs() < 1e-6);
        let flat = [4.0, 6.0];
        assert!((Polynomial.predict(&flat, &p(1, 0.0, 0)).unwrap() - 5.0).abs() < 1e-9);
    }
}
