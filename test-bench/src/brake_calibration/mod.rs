//! Magnetic Brake Calibration
//!
//! Measures the current -> torque curve of the treadmill's magnetic brake. The
//! motor drives the belt at a fixed open-loop speed while the brake current is
//! stepped upward; at each setpoint the reaction torque is sampled and averaged.
//!
//! # Overview
//!
//! The calibration process:
//! 1. Connect to the sensor/brake board and clear any latched over-torque fault
//! 2. Switch the motor controller to open-loop and ramp to test speed
//! 3. Step the brake current from 0 in increments of 4 raw units
//! 4. Average `sample_average_count` torque readings at each setpoint
//! 5. Hand the collected points to a [`ResultSink`]
//! 6. Zero motor speed, then brake current, whatever happened before
//!
//! # Modules
//!
//! - [`config`] - Run parameters and their command-line flags
//! - [`sweep`] - Brake setpoint sequence
//! - [`averager`] - Per-setpoint torque averaging
//! - [`abort`] - Cooperative abort flag
//! - [`session`] - Link ownership and guaranteed shutdown
//! - [`executor`] - Lifecycle state machine
//! - [`sink`] - Result destinations
//! - [`mock`] - Simulated links

pub mod abort;
pub mod averager;
pub mod config;
pub mod executor;
pub mod mock;
pub mod session;
pub mod sink;
pub mod sweep;
pub mod types;

pub use abort::AbortFlag;
pub use averager::SampleAverager;
pub use config::BrakeCalibrationConfig;
pub use executor::{BrakeCalibrationError, BrakeCalibrationExecutor};
pub use hardware::{MotorInterface, TreadmillInterface};
pub use session::CalibrationSession;
pub use sink::{CsvSink, MemorySink, ResultSink};
pub use sweep::{generate_sweep, setpoint_upper_bound, SweepPoint, SETPOINT_STEP};
pub use types::{AveragedPoint, CalibrationRun, RunReport, RunState, Termination};
