use crate::{ForecastError, ForecastMethod, ForecastParams, Forecaster};

/// Cyclic lookup: the value exactly one period (`degree`) before the next step.
/// Always reads the full history.
#[derive(Clone, Copy, Debug, Default)]
pub struct StepwiseSeasonal;

impl Forecaster for StepwiseSeasonal {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::StepwiseSeasonal
    }

    fn min_history(&self, params: &ForecastParams) -> usize {
        params.degree.max(1)
    }

    fn windowed(&self) -> bool {
        false
    }

    fn validate(&self, params: &ForecastParams) -> Result<(), ForecastError> {
        if params.degree == 0 {
            return Err(ForecastError::InvalidParameter {
                method: ForecastMethod::StepwiseSeasonal,
                reason: "period must be at least 1",
            });
        }
        Ok(())
    }

    fn predict(&self, data: &[f64], params: &ForecastParams) -> Result<f64, ForecastError> {
        self.validate(params)?;
        Ok(data[data.len() - params.degree])
    }
}
