//! Scalar sequential estimator (1D Kalman filter)
//!
//! Random-walk model by default (F = H = 1): the prediction keeps the
//! estimate and grows the covariance by the process noise, the update blends
//! in a measurement with gain P / (P + R).

use serde::Serialize;

use crate::logic::profile::{EstimatorParams, ResidualMode};

/// Estimate + covariance for one (sensor, feature)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EstimatorState {
    pub estimate: f64,
    pub covariance: f64,
}

/// Result of one predict/update step
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Step {
    /// Estimate after `predict`
    pub predicted: f64,
    /// Estimate after `update`
    pub corrected: f64,
    pub gain: f64,
    pub residual: f64,
}

#[derive(Debug, Clone)]
pub struct SequentialEstimator {
    params: EstimatorParams,
    state: EstimatorState,
    updates: u64,
}

impl SequentialEstimator {
    pub fn new(params: EstimatorParams) -> Self {
        Self {
            params,
            state: EstimatorState {
                estimate: params.initial_state,
                covariance: params.initial_covariance,
            },
            updates: 0,
        }
    }

    pub fn state(&self) -> EstimatorState {
        self.state
    }

    pub fn estimate(&self) -> f64 {
        self.state.estimate
    }

    pub fn covariance(&self) -> f64 {
        self.state.covariance
    }

    /// Number of measurements folded in so far
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Advance the state one step
    pub fn predict(&mut self) {
        let f = self.params.transition;
        self.state.estimate *= f;
        self.state.covariance = f * self.state.covariance * f + self.params.process_noise;
    }

    /// Fold in a measurement, returns the gain used
    pub fn update(&mut self, measurement: f64) -> f64 {
        let h = self.params.observation;
        let s = h * self.state.covariance * h + self.params.measurement_noise;
        let gain = self.state.covariance * h / s;

        let innovation = measurement - h * self.state.estimate;
        self.state.estimate += gain * innovation;
        self.state.covariance *= 1.0 - gain * h;
        self.updates += 1;

        gain
    }

    /// predict + update, with the residual measured per `mode`
    pub fn step(&mut self, measurement: f64, mode: ResidualMode) -> Step {
        self.predict();
        let predicted = self.state.estimate;
        let gain = self.update(measurement);
        let corrected = self.state.estimate;

        let residual = match mode {
            ResidualMode::PostUpdate => (corrected - measurement).abs(),
            ResidualMode::PreUpdate => (measurement - self.params.observation * predicted).abs(),
        };

        Step {
            predicted,
            corrected,
            gain,
            residual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_predict_random_walk() {
        let mut est = SequentialEstimator::new(EstimatorParams::starting_at(12.0));
        est.predict();
        assert_eq!(est.estimate(), 12.0);
        assert!(approx(est.covariance(), 1.05));
    }

    #[test]
    fn test_update_matches_closed_form() {
        let mut est = SequentialEstimator::new(EstimatorParams::starting_at(0.008));
        est.predict();
        let gain = est.update(0.05);

        let expected_gain = 1.05 / (1.05 + 0.1);
        assert!(approx(gain, expected_gain));
        assert!(approx(est.estimate(), 0.008 + expected_gain * (0.05 - 0.008)));
        assert!(approx(est.covariance(), 1.05 * (1.0 - expected_gain)));
        assert_eq!(est.updates(), 1);
    }

    #[test]
    fn test_post_update_residual_decreases_on_constant_input() {
        let mut est = SequentialEstimator::new(EstimatorParams::starting_at(0.0));
        let mut last = f64::INFINITY;

        for _ in 0..50 {
            let step = est.step(5.0, ResidualMode::PostUpdate);
            assert!(step.residual < last, "{} !< {}", step.residual, last);
            last = step.residual;
        }
        assert!(last < 1e-6);
    }

    #[test]
    fn test_pre_update_residual_is_never_smaller() {
        let params = EstimatorParams::starting_at(0.01);
        let mut post = SequentialEstimator::new(params);
        let mut pre = SequentialEstimator::new(params);

        for z in [0.02, 0.05, 0.01, 0.3, 0.0] {
            let a = post.step(z, ResidualMode::PostUpdate);
            let b = pre.step(z, ResidualMode::PreUpdate);
            // identical state evolution, only the measuring point differs
            assert!(approx(a.corrected, b.corrected));
            assert!(b.residual >= a.residual);
        }
    }

    #[test]
    fn test_non_unit_transition() {
        let params = EstimatorParams {
            transition: 0.5,
            ..EstimatorParams::starting_at(4.0)
        };
        let mut est = SequentialEstimator::new(params);
        est.predict();
        assert_eq!(est.estimate(), 2.0);
        assert!(approx(est.covariance(), 0.25 + 0.05));
    }
}
