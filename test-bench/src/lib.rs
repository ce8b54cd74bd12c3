//! Procedures run on the treadmill test bench.

pub mod brake_calibration;
