use std::fmt;

use crate::harp::PayloadType;

/// Application registers of the treadmill sensor/brake board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Encoder ticks (S32)
    Encoder,
    /// Reaction torque, raw ADC counts (S16)
    Torque,
    /// Brake coil current, raw ADC counts (S16)
    TorqueLoadCurrent,
    /// Aggregate [encoder, torque, brake current] (S32 x3)
    SensorData,
    /// Rate of periodic SensorData events in Hz, 0 disables (U16)
    SensorDataDispatchRate,
    /// Brake current DAC setpoint, 12-bit value upscaled to 16 bits (U16)
    BrakeCurrentSetPoint,
    /// Tare bitmask: bit 0 encoder, bit 1 torque, bit 2 brake current (U8)
    TareSensors,
    /// Clear-tare bitmask, same layout as TareSensors (U8)
    ResetTareSensors,
    /// Enable the over-torque brake cutoff (U8)
    EnableTorqueLimit,
    /// Latched over-torque state, write 0 to clear (U8)
    TorqueLimitState,
}

impl Register {
    pub fn address(self) -> u8 {
        match self {
            Register::Encoder => 32,
            Register::Torque => 33,
            Register::TorqueLoadCurrent => 34,
            Register::SensorData => 35,
            Register::SensorDataDispatchRate => 36,
            Register::BrakeCurrentSetPoint => 37,
            Register::TareSensors => 38,
            Register::ResetTareSensors => 39,
            Register::EnableTorqueLimit => 40,
            Register::TorqueLimitState => 41,
        }
    }

    pub fn payload_type(self) -> PayloadType {
        match self {
            Register::Encoder | Register::SensorData => PayloadType::S32,
            Register::Torque | Register::TorqueLoadCurrent => PayloadType::S16,
            Register::SensorDataDispatchRate | Register::BrakeCurrentSetPoint => PayloadType::U16,
            Register::TareSensors
            | Register::ResetTareSensors
            | Register::EnableTorqueLimit
            | Register::TorqueLimitState => PayloadType::U8,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses_are_contiguous() {
        let registers = [
            Register::Encoder,
            Register::Torque,
            Register::TorqueLoadCurrent,
            Register::SensorData,
            Register::SensorDataDispatchRate,
            Register::BrakeCurrentSetPoint,
            Register::TareSensors,
            Register::ResetTareSensors,
            Register::EnableTorqueLimit,
            Register::TorqueLimitState,
        ];
        for (i, reg) in registers.iter().enumerate() {
            assert_eq!(reg.address() as usize, 32 + i, "{reg}");
        }
    }

    #[test]
    fn test_calibration_register_types() {
        assert_eq!(Register::SensorData.payload_type(), PayloadType::S32);
        assert_eq!(Register::BrakeCurrentSetPoint.payload_type(), PayloadType::U16);
        assert_eq!(Register::TorqueLimitState.payload_type(), PayloadType::U8);
    }
}
