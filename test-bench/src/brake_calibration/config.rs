//! Configuration for the brake calibration procedure

use std::time::Duration;

use clap::Args;
use hardware::treadmill::DEFAULT_TREADMILL_PORT;

/// Configuration for one brake calibration run. Immutable once the run starts.
#[derive(Args, Debug, Clone)]
pub struct BrakeCalibrationConfig {
    #[arg(
        long = "port",
        default_value = DEFAULT_TREADMILL_PORT,
        help = "Treadmill board serial port",
        long_help = "Serial port of the treadmill sensor/brake board (Harp device), \
            e.g. /dev/ttyACM0 on Linux or COM3 on Windows."
    )]
    pub port: String,

    #[arg(
        long = "min_current",
        default_value = "0",
        help = "Minimum brake current in percent of full scale",
        long_help = "Lower end of the brake current range in percent [0, 100]. Accepted and \
            validated but not yet applied to the sweep, which always starts at 0."
    )]
    pub min_current_pct: f64,

    #[arg(
        long = "max_current",
        default_value = "50",
        help = "Maximum brake current in percent of full scale",
        long_help = "Upper end of the brake current sweep in percent (0, 100]. The sweep \
            covers raw setpoints 0, 4, 8, ... up to round(65535 * max_current / 100)."
    )]
    pub max_current_pct: f64,

    #[arg(
        long = "sample_average_count",
        default_value = "10",
        help = "Number of samples to average per data point"
    )]
    pub sample_average_count: usize,

    #[arg(
        long = "reverse",
        help = "Reverse sweep direction (reserved)",
        long_help = "Accepted for compatibility with future directional sweeps. \
            Currently has no effect on the sweep order."
    )]
    pub reverse: bool,

    #[arg(
        long = "motor_speed",
        default_value = "50",
        allow_negative_numbers = true,
        help = "Motor test speed in percent of full scale"
    )]
    pub motor_speed_pct: f64,

    #[arg(
        long = "settle_secs",
        default_value = "2.0",
        help = "Time to hold test speed before the sweep starts"
    )]
    pub settle_secs: f64,

    #[arg(
        long = "sample_delay_ms",
        default_value = "1",
        help = "Delay before each torque sample in milliseconds"
    )]
    pub sample_delay_ms: u64,
}

impl Default for BrakeCalibrationConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_TREADMILL_PORT.to_string(),
            min_current_pct: 0.0,
            max_current_pct: 50.0,
            sample_average_count: 10,
            reverse: false,
            motor_speed_pct: 50.0,
            settle_secs: 2.0,
            sample_delay_ms: 1,
        }
    }
}

impl BrakeCalibrationConfig {
    /// Check ranges. Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.max_current_pct > 0.0 && self.max_current_pct <= 100.0) {
            return Err(format!(
                "max_current must be in (0, 100], got {}",
                self.max_current_pct
            ));
        }
        if !(0.0..=100.0).contains(&self.min_current_pct) {
            return Err(format!(
                "min_current must be in [0, 100], got {}",
                self.min_current_pct
            ));
        }
        if self.sample_average_count == 0 {
            return Err("sample_average_count must be at least 1".to_string());
        }
        if !(-100.0..=100.0).contains(&self.motor_speed_pct) || self.motor_speed_pct == 0.0 {
            return Err(format!(
                "motor_speed must be nonzero and in [-100, 100], got {}",
                self.motor_speed_pct
            ));
        }
        if !self.settle_secs.is_finite() || self.settle_secs < 0.0 {
            return Err(format!(
                "settle_secs must be a non-negative number, got {}",
                self.settle_secs
            ));
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs_f64(self.settle_secs)
    }

    pub fn sample_delay(&self) -> Duration {
        Duration::from_millis(self.sample_delay_ms)
    }
}
