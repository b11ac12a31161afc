//! # Per-axis quadratic motion model
//!
//! Least-squares constant-acceleration fit of position against time for one
//! sky axis. This is a screening-quality fit, not orbit determination: the
//! linking engine only needs position predictions good to the configured
//! error thresholds.
//!
//! A duplicate or insufficiently distinct set of timestamps is a
//! [`DaylinkError::DegenerateFit`], never a propagated NaN.

use nalgebra::{DMatrix, DVector};

use crate::constants::MJD;
use crate::daylink_errors::DaylinkError;

/// Fitted state at the reference epoch: position, velocity and acceleration
/// along one sky axis, in degrees, deg/day and deg/day².
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraticFit {
    pub position: f64,
    pub velocity: f64,
    pub acceleration: f64,
    pub reference_epoch: MJD,
}

impl QuadraticFit {
    /// Predicted position at epoch `t` by polynomial evaluation.
    pub fn predict(&self, t: MJD) -> f64 {
        let dt = t - self.reference_epoch;
        self.position + self.velocity * dt + 0.5 * self.acceleration * dt * dt
    }
}

/// Fit a constant-acceleration model to one axis.
///
/// Arguments
/// ---------
/// * `times`: observation epochs (MJD)
/// * `positions`: positions along the axis, in degrees; an RA series must be
///   unwrapped across the 0°/360° seam beforehand
///
/// Return
/// ------
/// * the fitted state at `times[0]`, or a `DegenerateFit` error when fewer
///   than three distinct epochs are available or the system is singular
pub fn fit_quadratic(times: &[MJD], positions: &[f64]) -> Result<QuadraticFit, DaylinkError> {
    if times.len() != positions.len() {
        return Err(DaylinkError::DegenerateFit(format!(
            "mismatched sample counts: {} epochs, {} positions",
            times.len(),
            positions.len()
        )));
    }
    if distinct_epochs(times) < 3 {
        return Err(DaylinkError::DegenerateFit(format!(
            "quadratic fit needs at least 3 distinct epochs, got {}",
            distinct_epochs(times)
        )));
    }

    let reference_epoch = times[0];
    let design = DMatrix::from_fn(times.len(), 3, |row, col| {
        let dt = times[row] - reference_epoch;
        match col {
            0 => 1.,
            1 => dt,
            _ => 0.5 * dt * dt,
        }
    });
    let rhs = DVector::from_column_slice(positions);

    let solution = design
        .svd(true, true)
        .solve(&rhs, 1e-12)
        .map_err(|e| DaylinkError::DegenerateFit(e.to_string()))?;

    Ok(QuadraticFit {
        position: solution[0],
        velocity: solution[1],
        acceleration: solution[2],
        reference_epoch,
    })
}

fn distinct_epochs(times: &[MJD]) -> usize {
    let mut sorted = times.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted.dedup_by(|a, b| (*a - *b).abs() < 1e-12);
    sorted.len()
}

#[cfg(test)]
mod quadratic_tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_recovers_exact_quadratic() {
        let times = [53735.0, 53735.5, 53736.0, 53737.0, 53738.5];
        let positions: Vec<f64> = times
            .iter()
            .map(|t| {
                let dt = t - 53735.0;
                12.0 + 0.4 * dt + 0.5 * 0.015 * dt * dt
            })
            .collect();

        let fit = fit_quadratic(&times, &positions).unwrap();
        assert_relative_eq!(fit.position, 12.0, epsilon = 1e-8);
        assert_relative_eq!(fit.velocity, 0.4, epsilon = 1e-8);
        assert_relative_eq!(fit.acceleration, 0.015, epsilon = 1e-8);
        assert_relative_eq!(fit.predict(53740.0), 12.0 + 0.4 * 5.0 + 0.5 * 0.015 * 25.0, epsilon = 1e-8);
    }

    #[test]
    fn test_duplicate_epochs_are_degenerate() {
        let times = [53735.0, 53735.0, 53736.0, 53736.0];
        let positions = [1.0, 1.0, 2.0, 2.0];
        let err = fit_quadratic(&times, &positions);
        assert!(matches!(err, Err(DaylinkError::DegenerateFit(_))));
    }

    #[test]
    fn test_too_few_samples_are_degenerate() {
        let err = fit_quadratic(&[53735.0, 53736.0], &[1.0, 2.0]);
        assert!(matches!(err, Err(DaylinkError::DegenerateFit(_))));
    }
}
