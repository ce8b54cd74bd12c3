//! Exclusive ownership of the device and motor links for one run.
//!
//! A [`CalibrationSession`] is created as soon as the device link is acquired. It
//! zeroes motor speed and then brake current exactly once: either explicitly via
//! [`CalibrationSession::shutdown`] or, on any path that skips that call
//! (early return, panic), when it is dropped.

use hardware::{MotorInterface, TreadmillInterface};
use tracing::{info, warn};

pub struct CalibrationSession<D: TreadmillInterface, M: MotorInterface> {
    device: D,
    motor: M,
    shut_down: bool,
}

impl<D: TreadmillInterface, M: MotorInterface> CalibrationSession<D, M> {
    pub fn new(device: D, motor: M) -> Self {
        Self {
            device,
            motor,
            shut_down: false,
        }
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn motor_mut(&mut self) -> &mut M {
        &mut self.motor
    }

    /// Whether the shutdown sequence has run at least once.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// De-energise the motor, then clear the brake setpoint.
    ///
    /// Both commands are always attempted; the first failure is returned.
    /// Safe to call repeatedly.
    pub fn shutdown(&mut self) -> Result<(), String> {
        info!("Zeroing motor speed...");
        let motor = self.motor.set_speed(0.0);
        if let Err(e) = &motor {
            warn!("Failed to zero motor speed: {e}");
        }

        info!("Zeroing brake current...");
        let brake = self.device.set_brake_current(0);
        if let Err(e) = &brake {
            warn!("Failed to zero brake current: {e}");
        }

        self.shut_down = true;
        motor.and(brake)
    }
}

impl<D: TreadmillInterface, M: MotorInterface> Drop for CalibrationSession<D, M> {
    fn drop(&mut self) {
        if !self.shut_down {
            warn!("Calibration session dropped without shutdown, zeroing actuators");
            if let Err(e) = self.shutdown() {
                warn!("Shutdown on drop failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brake_calibration::mock::{EventLog, LinkEvent, MockMotor, MockTreadmill};

    fn session(log: &EventLog) -> CalibrationSession<MockTreadmill, MockMotor> {
        CalibrationSession::new(
            MockTreadmill::constant(0).with_log(log.clone()),
            MockMotor::new().with_log(log.clone()),
        )
    }

    #[test]
    fn test_shutdown_order_motor_then_brake() {
        let log = EventLog::default();
        let mut session = session(&log);
        session.shutdown().unwrap();

        assert_eq!(
            log.events(),
            vec![LinkEvent::SetSpeed(0.0), LinkEvent::SetBrakeCurrent(0)]
        );
    }

    #[test]
    fn test_shutdown_twice_is_harmless() {
        let log = EventLog::default();
        let mut session = session(&log);
        session.shutdown().unwrap();
        session.shutdown().unwrap();
        drop(session);

        assert_eq!(log.last_speed(), Some(0.0));
        assert_eq!(log.last_brake_current(), Some(0));
        assert_eq!(log.count(|e| *e == LinkEvent::SetSpeed(0.0)), 2);
    }

    #[test]
    fn test_drop_runs_shutdown_once() {
        let log = EventLog::default();
        {
            let mut session = session(&log);
            session.device_mut().set_brake_current(1000).unwrap();
        }

        assert_eq!(
            log.events(),
            vec![
                LinkEvent::SetBrakeCurrent(1000),
                LinkEvent::SetSpeed(0.0),
                LinkEvent::SetBrakeCurrent(0)
            ]
        );
    }

    #[test]
    fn test_brake_is_zeroed_even_if_motor_fails() {
        let log = EventLog::default();
        let mut session = CalibrationSession::new(
            MockTreadmill::constant(0).with_log(log.clone()),
            MockMotor::new().with_log(log.clone()).with_failing_speed(),
        );

        assert!(session.shutdown().is_err());
        assert!(session.is_shut_down());
        assert_eq!(log.last_brake_current(), Some(0));
    }
}
