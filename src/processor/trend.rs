use anyhow::{Result, anyhow};
use ndarray::Array1;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::linear_regression::{LinearRegression, LinearRegressionParameters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Increasing,
    Decreasing,
}

impl TrendDirection {
    pub fn label(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "📈 Increasing",
            TrendDirection::Decreasing => "📉 Decreasing",
        }
    }
}

/// Yearly aggregates in chronological order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct YearlySeries {
    points: Vec<(i32, f64)>,
}

impl YearlySeries {
    pub fn new(mut points: Vec<(i32, f64)>) -> Self {
        points.sort_by_key(|(year, _)| *year);
        Self { points }
    }

    pub fn points(&self) -> &[(i32, f64)] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn year_range(&self) -> Option<(i32, i32)> {
        Some((self.points.first()?.0, self.points.last()?.0))
    }

    /// Increasing only when the last value is strictly above the first; a
    /// flat series reads as decreasing.
    pub fn direction(&self) -> Option<TrendDirection> {
        let first = self.points.first()?.1;
        let last = self.points.last()?.1;
        Some(if last > first {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        })
    }

    /// Least-squares line of value on year, evaluated at the year after the
    /// last one. A single point extrapolates flat.
    pub fn predict_next(&self) -> Result<Option<(i32, f64)>> {
        let Some(&(first_year, _)) = self.points.first() else {
            return Ok(None);
        };
        let Some(&(last_year, last_value)) = self.points.last() else {
            return Ok(None);
        };
        let next_year = last_year + 1;

        if self.points.len() == 1 {
            return Ok(Some((next_year, last_value)));
        }

        // Centered years keep the normal equations well conditioned.
        let x: Vec<Vec<f64>> = self
            .points
            .iter()
            .map(|(year, _)| vec![(year - first_year) as f64])
            .collect();
        let y: Vec<f64> = self.points.iter().map(|(_, value)| *value).collect();

        let model: LinearRegression<f64, f64, DenseMatrix<f64>, Vec<f64>> =
            LinearRegression::fit(
                &DenseMatrix::from_2d_vec(&x),
                &y,
                LinearRegressionParameters::default(),
            )
            .map_err(|e| anyhow!("Linear fit failed: {}", e))?;

        let prediction = model
            .predict(&DenseMatrix::from_2d_vec(&vec![vec![
                (next_year - first_year) as f64,
            ]]))
            .map_err(|e| anyhow!("Prediction failed: {}", e))?;

        Ok(prediction.first().map(|value| (next_year, *value)))
    }
}

/// Pearson correlation. `None` when either side has zero variance or the
/// inputs are too short.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }

    let x = Array1::from(xs.to_vec());
    let y = Array1::from(ys.to_vec());
    let dx = &x - x.mean()?;
    let dy = &y - y.mean()?;

    let sxx = dx.dot(&dx);
    let syy = dy.dot(&dy);
    if sxx <= f64::EPSILON || syy <= f64::EPSILON {
        return None;
    }

    Some(dx.dot(&dy) / (sxx * syy).sqrt())
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
