//! Torque sample averaging

use std::time::Duration;

use hardware::TreadmillInterface;
use tracing::trace;

use super::abort::AbortFlag;
use super::executor::BrakeCalibrationError;

/// Reduces repeated torque readings at one setpoint to their arithmetic mean.
#[derive(Debug, Clone, Copy)]
pub struct SampleAverager {
    sample_count: usize,
    inter_sample_delay: Duration,
}

impl SampleAverager {
    /// `sample_count` must be at least 1.
    pub fn new(sample_count: usize, inter_sample_delay: Duration) -> Self {
        debug_assert!(sample_count >= 1, "sample_count must be positive");
        Self {
            sample_count,
            inter_sample_delay,
        }
    }

    /// Take `sample_count` readings, waiting `inter_sample_delay` before each,
    /// and return the mean torque.
    ///
    /// Returns `Ok(None)` if an abort is raised before all samples are taken.
    /// A failed read fails the whole average; a partial mean is never returned.
    pub fn average<D: TreadmillInterface>(
        &self,
        device: &mut D,
        abort: &AbortFlag,
    ) -> Result<Option<f64>, BrakeCalibrationError> {
        let mut sum: i64 = 0;

        for i in 0..self.sample_count {
            if !abort.sleep(self.inter_sample_delay) {
                return Ok(None);
            }

            let sample = device
                .read_sensors()
                .map_err(BrakeCalibrationError::Transaction)?;
            trace!("sample {}: torque {}", i, sample.torque);
            sum += sample.torque as i64;
        }

        Ok(Some(sum as f64 / self.sample_count as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brake_calibration::mock::{EventLog, LinkEvent, MockTreadmill};
    use approx::{assert_abs_diff_eq, relative_eq};
    use proptest::prelude::*;

    #[test]
    fn test_average_of_constant_torque() {
        let mut device = MockTreadmill::constant(100);
        let averager = SampleAverager::new(10, Duration::ZERO);

        let mean = averager.average(&mut device, &AbortFlag::new()).unwrap();
        assert_abs_diff_eq!(mean.unwrap(), 100.0);
    }

    #[test]
    fn test_average_of_sequence() {
        let mut device = MockTreadmill::from_sequence(vec![1, 2, 3, 4]);
        let averager = SampleAverager::new(4, Duration::ZERO);

        let mean = averager.average(&mut device, &AbortFlag::new()).unwrap();
        assert_abs_diff_eq!(mean.unwrap(), 2.5);
    }

    #[test]
    fn test_average_handles_negative_and_extreme_torque() {
        let mut device = MockTreadmill::from_sequence(vec![i32::MAX, i32::MAX, i32::MIN]);
        let averager = SampleAverager::new(3, Duration::ZERO);

        let mean = averager.average(&mut device, &AbortFlag::new()).unwrap();
        let expected = (i32::MAX as f64 * 2.0 + i32::MIN as f64) / 3.0;
        assert_abs_diff_eq!(mean.unwrap(), expected, epsilon = 1e-6);
    }

    #[test]
    fn test_takes_exactly_sample_count_readings() {
        let log = EventLog::default();
        let mut device = MockTreadmill::constant(7).with_log(log.clone());
        let averager = SampleAverager::new(5, Duration::ZERO);

        averager.average(&mut device, &AbortFlag::new()).unwrap();
        assert_eq!(log.count(|e| matches!(e, LinkEvent::ReadSensors)), 5);
    }

    #[test]
    fn test_read_failure_fails_the_average() {
        let mut device = MockTreadmill::constant(100).with_read_failure_at(3);
        let averager = SampleAverager::new(5, Duration::ZERO);

        let result = averager.average(&mut device, &AbortFlag::new());
        assert!(matches!(
            result,
            Err(BrakeCalibrationError::Transaction(_))
        ));
    }

    #[test]
    fn test_abort_discards_partial_average() {
        let abort = AbortFlag::new();
        let log = EventLog::default();
        let mut device = MockTreadmill::constant(100)
            .with_log(log.clone())
            .with_abort_after_reads(2, abort.clone());
        let averager = SampleAverager::new(5, Duration::ZERO);

        let result = averager.average(&mut device, &abort).unwrap();
        assert!(result.is_none());
        assert_eq!(log.count(|e| matches!(e, LinkEvent::ReadSensors)), 2);
    }

    proptest! {
        /// Mean of n readings is their sum over n, one read per sample
        #[test]
        fn prop_average_is_arithmetic_mean(torques in prop::collection::vec(any::<i32>(), 1..64)) {
            let log = EventLog::default();
            let mut device = MockTreadmill::from_sequence(torques.clone()).with_log(log.clone());
            let averager = SampleAverager::new(torques.len(), Duration::ZERO);

            let mean = averager.average(&mut device, &AbortFlag::new()).unwrap().unwrap();
            let expected = torques.iter().map(|&t| t as f64).sum::<f64>() / torques.len() as f64;

            prop_assert!(relative_eq!(mean, expected, epsilon = 1e-9, max_relative = 1e-12));
            prop_assert_eq!(log.count(|e| matches!(e, LinkEvent::ReadSensors)), torques.len());
        }
    }
}
