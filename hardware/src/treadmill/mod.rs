//! Treadmill Sensor/Brake Board Driver
//!
//! The board measures wheel position (quadrature encoder), reaction torque and
//! magnetic brake coil current, and drives the brake coil current through a DAC.
//! It speaks Harp over USB serial.
//!
//! # Safety
//!
//! When measured torque exceeds the board's safety threshold it zeroes the brake
//! setpoint and latches [`Register::TorqueLimitState`]. The latch must be cleared
//! before the brake responds to new setpoints.

mod registers;

pub use registers::Register;

use serialport::SerialPort;
use tracing::{info, warn};

use crate::harp::{HarpDevice, HarpError, HarpResult, HarpTransport, ParseError, RegisterValue};
use crate::{MeasurementSample, TreadmillInterface};

/// WhoAmI identifier reported by the treadmill board.
pub const TREADMILL_WHO_AM_I: u16 = 0x057A;

/// Default serial port of the board on Linux.
pub const DEFAULT_TREADMILL_PORT: &str = "/dev/ttyACM0";

/// High-level driver for the treadmill sensor/brake board.
pub struct Treadmill<T = Box<dyn SerialPort>> {
    device: HarpDevice<T>,
}

impl Treadmill {
    /// Open the board on a serial port and verify its identity.
    pub fn connect(port: &str) -> HarpResult<Self> {
        let device = HarpDevice::connect(port)?;
        Self::init(device)
    }
}

impl<T: HarpTransport> Treadmill<T> {
    /// Verify the device identity after the transport is open.
    pub fn init(mut device: HarpDevice<T>) -> HarpResult<Self> {
        let who_am_i = device.who_am_i()?;
        if who_am_i != TREADMILL_WHO_AM_I {
            return Err(HarpError::UnexpectedDevice {
                expected: TREADMILL_WHO_AM_I,
                got: who_am_i,
            });
        }
        info!("Connected to treadmill board on {}", device.name());

        Ok(Self { device })
    }

    /// Read every element of `register`, checking `V` against its declared type.
    fn read_register<V: RegisterValue, const N: usize>(
        &mut self,
        register: Register,
    ) -> HarpResult<[V; N]> {
        check_type::<V>(register)?;
        self.device.read_array::<V, N>(register.address())
    }

    fn write_register<V: RegisterValue>(&mut self, register: Register, value: V) -> HarpResult<()> {
        check_type::<V>(register)?;
        self.device.write_single(register.address(), value)
    }

    /// Read position, torque and brake current in one transaction.
    pub fn read_sensors(&mut self) -> HarpResult<MeasurementSample> {
        let [position, torque, current] = self.read_register::<i32, 3>(Register::SensorData)?;
        Ok(MeasurementSample {
            position,
            torque,
            current,
        })
    }

    /// Command the brake current DAC.
    pub fn set_brake_current(&mut self, setpoint: u16) -> HarpResult<()> {
        self.write_register(Register::BrakeCurrentSetPoint, setpoint)
    }

    /// Whether the over-torque cutoff has latched.
    pub fn torque_limit_triggered(&mut self) -> HarpResult<bool> {
        let [state] = self.read_register::<u8, 1>(Register::TorqueLimitState)?;
        Ok(state != 0)
    }

    /// Clear a latched over-torque cutoff.
    pub fn clear_torque_limit(&mut self) -> HarpResult<()> {
        if self.torque_limit_triggered()? {
            warn!("Over-torque limit was latched, clearing");
        }
        self.write_register(Register::TorqueLimitState, 0u8)
    }
}

fn check_type<V: RegisterValue>(register: Register) -> HarpResult<()> {
    if V::PAYLOAD_TYPE != register.payload_type() {
        return Err(HarpError::Frame(ParseError::PayloadTypeMismatch {
            expected: register.payload_type(),
            got: V::PAYLOAD_TYPE,
        }));
    }
    Ok(())
}

impl<T> Drop for Treadmill<T> {
    fn drop(&mut self) {
        info!("Disconnecting from treadmill board on {}", self.device.name());
    }
}

impl<T: HarpTransport> TreadmillInterface for Treadmill<T> {
    fn read_sensors(&mut self) -> Result<MeasurementSample, String> {
        Treadmill::read_sensors(self).map_err(|e| format!("sensor read failed: {e}"))
    }

    fn set_brake_current(&mut self, setpoint: u16) -> Result<(), String> {
        Treadmill::set_brake_current(self, setpoint)
            .map_err(|e| format!("brake setpoint write failed: {e}"))
    }

    fn clear_torque_limit(&mut self) -> Result<(), String> {
        Treadmill::clear_torque_limit(self)
            .map_err(|e| format!("clearing torque limit failed: {e}"))
    }
}
