//! Drivers for the treadmill test bench.
//!
//! - [`harp`] - Harp binary protocol over serial
//! - [`treadmill`] - sensor/brake board built on Harp
//! - [`motor`] - motor controller driven through its vendor CLI
//!
//! The calibration procedure programs against [`TreadmillInterface`] and
//! [`MotorInterface`] so it can run against these drivers or simulated links.

pub mod harp;
pub mod motor;
pub mod treadmill;

pub use motor::{MotorArgs, MotorCli, MotorSettings};
pub use treadmill::Treadmill;

/// One instantaneous reading of the board's aggregate sensor register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeasurementSample {
    /// Encoder ticks
    pub position: i32,
    /// Reaction torque, raw ADC counts
    pub torque: i32,
    /// Brake coil current, raw ADC counts
    pub current: i32,
}

/// Interface to the sensor/brake board
///
/// Abstracts the board for testability in calibration workflows.
pub trait TreadmillInterface {
    /// Read position, torque and brake current in one transaction
    fn read_sensors(&mut self) -> Result<MeasurementSample, String>;

    /// Command the brake current setpoint in raw 16-bit DAC units
    fn set_brake_current(&mut self, setpoint: u16) -> Result<(), String>;

    /// Clear a latched over-torque fault
    fn clear_torque_limit(&mut self) -> Result<(), String>;
}

/// Interface to the motor controller
pub trait MotorInterface {
    /// Fetch the controller's settings document
    fn get_settings(&mut self) -> Result<MotorSettings, String>;

    /// Push a settings document to the controller
    fn apply_settings(&mut self, settings: &MotorSettings) -> Result<(), String>;

    /// Reload the controller with its current settings
    fn reinitialize(&mut self) -> Result<(), String>;

    /// Command speed in percent of full scale, [-100, 100]
    fn set_speed(&mut self, percent: f64) -> Result<(), String>;
}
