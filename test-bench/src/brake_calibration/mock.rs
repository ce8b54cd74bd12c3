//! Simulated device and motor links.
//!
//! Used by the test suite and by `calibrate_brake --simulate` to exercise the
//! procedure without hardware. Both mocks can share an [`EventLog`] so tests can
//! assert on the interleaving of device and motor commands.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use hardware::{MeasurementSample, MotorInterface, MotorSettings, TreadmillInterface};

use super::abort::AbortFlag;

/// A command observed by a mock link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    ReadSensors,
    SetBrakeCurrent(u16),
    ClearTorqueLimit,
    GetSettings,
    ApplySettings(MotorSettings),
    Reinitialize,
    SetSpeed(f64),
}

/// Shared, append-only record of link commands.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<LinkEvent>>>,
}

impl EventLog {
    fn lock(&self) -> MutexGuard<'_, Vec<LinkEvent>> {
        // Poisoned by a panicking test thread; the events are still valid
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, event: LinkEvent) {
        self.lock().push(event);
    }

    pub fn events(&self) -> Vec<LinkEvent> {
        self.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&LinkEvent) -> bool) -> usize {
        self.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn last_speed(&self) -> Option<f64> {
        self.lock().iter().rev().find_map(|e| match e {
            LinkEvent::SetSpeed(speed) => Some(*speed),
            _ => None,
        })
    }

    pub fn last_brake_current(&self) -> Option<u16> {
        self.lock().iter().rev().find_map(|e| match e {
            LinkEvent::SetBrakeCurrent(setpoint) => Some(*setpoint),
            _ => None,
        })
    }
}

enum TorqueModel {
    Sequence(VecDeque<i32>),
    /// torque = offset + gain * setpoint
    Linear { offset: f64, gain: f64 },
}

/// Simulated sensor/brake board.
pub struct MockTreadmill {
    model: TorqueModel,
    setpoint: u16,
    reads: usize,
    fail_read_at: Option<usize>,
    abort_after: Option<(usize, AbortFlag)>,
    log: Option<EventLog>,
}

impl MockTreadmill {
    /// Every read reports `torque`.
    pub fn constant(torque: i32) -> Self {
        Self::from_sequence(vec![torque])
    }

    /// Reads cycle through `torques`.
    pub fn from_sequence(torques: Vec<i32>) -> Self {
        Self::with_model(TorqueModel::Sequence(torques.into()))
    }

    /// Torque proportional to the commanded brake setpoint, like a brake whose
    /// drag grows linearly with coil current.
    pub fn linear(offset: f64, gain: f64) -> Self {
        Self::with_model(TorqueModel::Linear { offset, gain })
    }

    fn with_model(model: TorqueModel) -> Self {
        Self {
            model,
            setpoint: 0,
            reads: 0,
            fail_read_at: None,
            abort_after: None,
            log: None,
        }
    }

    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }

    /// The `n`th read (1-based) fails.
    pub fn with_read_failure_at(mut self, n: usize) -> Self {
        self.fail_read_at = Some(n);
        self
    }

    /// Raise `abort` as soon as `n` reads have completed.
    pub fn with_abort_after_reads(mut self, n: usize, abort: AbortFlag) -> Self {
        self.abort_after = Some((n, abort));
        self
    }

    fn record(&self, event: LinkEvent) {
        if let Some(log) = &self.log {
            log.record(event);
        }
    }

    fn next_torque(&mut self) -> i32 {
        match &mut self.model {
            TorqueModel::Sequence(torques) => match torques.pop_front() {
                Some(torque) => {
                    torques.push_back(torque);
                    torque
                }
                None => 0,
            },
            TorqueModel::Linear { offset, gain } => {
                (*offset + *gain * self.setpoint as f64).round() as i32
            }
        }
    }
}

impl TreadmillInterface for MockTreadmill {
    fn read_sensors(&mut self) -> Result<MeasurementSample, String> {
        self.record(LinkEvent::ReadSensors);
        self.reads += 1;

        if self.fail_read_at == Some(self.reads) {
            return Err(format!("simulated read failure on read {}", self.reads));
        }

        let torque = self.next_torque();

        if let Some((n, abort)) = &self.abort_after {
            if self.reads >= *n {
                abort.raise();
            }
        }

        Ok(MeasurementSample {
            position: self.reads as i32,
            torque,
            current: self.setpoint as i32,
        })
    }

    fn set_brake_current(&mut self, setpoint: u16) -> Result<(), String> {
        self.record(LinkEvent::SetBrakeCurrent(setpoint));
        self.setpoint = setpoint;
        Ok(())
    }

    fn clear_torque_limit(&mut self) -> Result<(), String> {
        self.record(LinkEvent::ClearTorqueLimit);
        Ok(())
    }
}

const DEFAULT_SETTINGS_YAML: &str = "\
product: simulated
feedback_mode: analog
max_duty_cycle: 600
";

/// Simulated motor controller.
pub struct MockMotor {
    settings: MotorSettings,
    malformed_settings: bool,
    failing_speed: bool,
    log: Option<EventLog>,
}

impl Default for MockMotor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMotor {
    pub fn new() -> Self {
        let settings = MotorSettings::from_yaml(DEFAULT_SETTINGS_YAML).unwrap_or_default();
        Self {
            settings,
            malformed_settings: false,
            failing_speed: false,
            log: None,
        }
    }

    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }

    /// `get_settings` returns an unparseable document.
    pub fn with_malformed_settings(mut self) -> Self {
        self.malformed_settings = true;
        self
    }

    /// Every `set_speed` fails.
    pub fn with_failing_speed(mut self) -> Self {
        self.failing_speed = true;
        self
    }

    fn record(&self, event: LinkEvent) {
        if let Some(log) = &self.log {
            log.record(event);
        }
    }
}

impl MotorInterface for MockMotor {
    fn get_settings(&mut self) -> Result<MotorSettings, String> {
        self.record(LinkEvent::GetSettings);
        if self.malformed_settings {
            return MotorSettings::from_yaml("- not\n- a mapping\n").map_err(|e| e.to_string());
        }
        Ok(self.settings.clone())
    }

    fn apply_settings(&mut self, settings: &MotorSettings) -> Result<(), String> {
        self.record(LinkEvent::ApplySettings(settings.clone()));
        self.settings = settings.clone();
        Ok(())
    }

    fn reinitialize(&mut self) -> Result<(), String> {
        self.record(LinkEvent::Reinitialize);
        Ok(())
    }

    fn set_speed(&mut self, percent: f64) -> Result<(), String> {
        if self.failing_speed {
            return Err("simulated motor fault".to_string());
        }
        self.record(LinkEvent::SetSpeed(percent));
        Ok(())
    }
}
