//! Brake Calibration Executor
//!
//! Drives one calibration run through its lifecycle:
//!
//! ```text
//! DISCONNECTED -> CONNECTING -> CONFIGURING -> RAMPING -> SWEEPING -> DRAINING -> SHUTDOWN -> DISCONNECTED
//! ```
//!
//! Once the device link is acquired, shutdown (motor speed to zero, then brake
//! current to zero) runs exactly once on every exit path. An abort during
//! CONFIGURING, RAMPING or SWEEPING skips straight to DRAINING and is reported as
//! an early, successful termination rather than an error.

use hardware::{MotorInterface, TreadmillInterface};
use indicatif::ProgressBar;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::abort::AbortFlag;
use super::averager::SampleAverager;
use super::config::BrakeCalibrationConfig;
use super::session::CalibrationSession;
use super::sink::ResultSink;
use super::sweep::{generate_sweep, SweepPoint};
use super::types::{AveragedPoint, CalibrationRun, RunReport, RunState, Termination};

/// Error during brake calibration
#[derive(Error, Debug)]
pub enum BrakeCalibrationError {
    /// Configuration values out of range; nothing was touched
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Device link could not be opened; nothing to shut down
    #[error("cannot connect to treadmill board on {port}: {reason}")]
    Connection { port: String, reason: String },

    /// A device or motor transaction failed mid-run
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// Motor settings could not be read, modified or written
    #[error("motor configuration failed: {0}")]
    Configuration(String),

    /// Result sink could not store the run
    #[error("result sink failed: {0}")]
    Sink(String),
}

/// Brake calibration executor
pub struct BrakeCalibrationExecutor {
    config: BrakeCalibrationConfig,
    abort: AbortFlag,
    progress: ProgressBar,
    state: RunState,
}

impl BrakeCalibrationExecutor {
    /// Create a new executor. `abort` may be raised at any time from another thread.
    pub fn new(config: BrakeCalibrationConfig, abort: AbortFlag) -> Self {
        Self {
            config,
            abort,
            progress: ProgressBar::hidden(),
            state: RunState::Disconnected,
        }
    }

    /// Report sweep progress on the given bar.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &BrakeCalibrationConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        debug!("{} -> {}", self.state, next);
        self.state = next;
        info!("State: {}", next);
    }

    /// Run the calibration.
    ///
    /// `connect` opens the device link for the configured port. `motor` is not
    /// used unless `connect` succeeds. Collected points are handed to `sink`
    /// whether the sweep completes, is aborted or fails.
    pub fn run<D, M, C, S>(
        &mut self,
        connect: C,
        motor: M,
        sink: &mut S,
    ) -> Result<RunReport, BrakeCalibrationError>
    where
        D: TreadmillInterface,
        M: MotorInterface,
        C: FnOnce(&str) -> Result<D, String>,
        S: ResultSink + ?Sized,
    {
        self.config
            .validate()
            .map_err(BrakeCalibrationError::InvalidConfig)?;

        if self.config.min_current_pct > 0.0 || self.config.reverse {
            warn!("min_current and reverse are not yet applied; sweeping upward from 0");
        }

        let sweep = generate_sweep(self.config.max_current_pct);
        let total_points = sweep.len();

        self.transition(RunState::Connecting);
        info!("Connecting to treadmill board on {}...", self.config.port);
        let device = match connect(&self.config.port) {
            Ok(device) => device,
            Err(reason) => {
                error!("Failed to connect: {reason}");
                self.transition(RunState::Disconnected);
                return Err(BrakeCalibrationError::Connection {
                    port: self.config.port.clone(),
                    reason,
                });
            }
        };

        let mut session = CalibrationSession::new(device, motor);
        let mut run = CalibrationRun::with_capacity(total_points);

        let outcome = self.drive(&mut session, &sweep, &mut run);
        match &outcome {
            Ok(Termination::Completed) => info!("Sweep complete: {} points", run.len()),
            Ok(Termination::Aborted { during }) => warn!(
                "Aborted during {during}: keeping {} of {total_points} points",
                run.len()
            ),
            Err(e) => error!("Calibration failed: {e}"),
        }

        self.transition(RunState::Draining);
        let drained = sink.consume(&run);
        if let Err(e) = &drained {
            error!("Failed to store results: {e}");
        }

        self.transition(RunState::Shutdown);
        let shutdown = session.shutdown();
        drop(session);
        self.transition(RunState::Disconnected);

        let termination = outcome?;
        shutdown.map_err(BrakeCalibrationError::Transaction)?;
        drained.map_err(BrakeCalibrationError::Sink)?;

        Ok(RunReport {
            run,
            termination,
            total_points,
        })
    }

    /// CONFIGURING, RAMPING and SWEEPING.
    fn drive<D: TreadmillInterface, M: MotorInterface>(
        &mut self,
        session: &mut CalibrationSession<D, M>,
        sweep: &[SweepPoint],
        run: &mut CalibrationRun,
    ) -> Result<Termination, BrakeCalibrationError> {
        self.transition(RunState::Configuring);
        if let Some(aborted) = self.check_abort() {
            return Ok(aborted);
        }
        self.configure(session)?;

        self.transition(RunState::Ramping);
        if let Some(aborted) = self.check_abort() {
            return Ok(aborted);
        }
        info!(
            "Ramping motor to {:.1}% and settling for {:.1} s...",
            self.config.motor_speed_pct, self.config.settle_secs
        );
        session
            .motor_mut()
            .set_speed(self.config.motor_speed_pct)
            .map_err(BrakeCalibrationError::Transaction)?;
        if !self.abort.sleep(self.config.settle_delay()) {
            return Ok(self.aborted());
        }

        self.transition(RunState::Sweeping);
        info!(
            "Sweeping {} setpoints from 0 to {}, {} samples each",
            sweep.len(),
            sweep.last().map(|p| p.setpoint).unwrap_or(0),
            self.config.sample_average_count
        );
        let averager = SampleAverager::new(
            self.config.sample_average_count,
            self.config.sample_delay(),
        );
        self.progress.set_length(sweep.len() as u64);
        self.progress.set_position(0);

        for point in sweep {
            if let Some(aborted) = self.check_abort() {
                self.progress.abandon();
                return Ok(aborted);
            }

            session
                .device_mut()
                .set_brake_current(point.setpoint)
                .map_err(BrakeCalibrationError::Transaction)?;

            let Some(torque) = averager.average(session.device_mut(), &self.abort)? else {
                self.progress.abandon();
                return Ok(self.aborted());
            };

            debug!("setpoint {:5} -> torque {:.2}", point.setpoint, torque);
            run.push(AveragedPoint {
                setpoint: point.setpoint,
                torque,
            });
            self.progress.inc(1);
        }

        self.progress.finish();
        Ok(Termination::Completed)
    }

    /// Clear any latched fault and put the motor controller in open-loop mode.
    fn configure<D: TreadmillInterface, M: MotorInterface>(
        &mut self,
        session: &mut CalibrationSession<D, M>,
    ) -> Result<(), BrakeCalibrationError> {
        info!("Clearing over-torque trigger...");
        session
            .device_mut()
            .clear_torque_limit()
            .map_err(BrakeCalibrationError::Transaction)?;

        info!("Configuring motor controller for open-loop operation...");
        let mut settings = session
            .motor_mut()
            .get_settings()
            .map_err(BrakeCalibrationError::Configuration)?;
        settings.force_open_loop();
        session
            .motor_mut()
            .apply_settings(&settings)
            .map_err(BrakeCalibrationError::Configuration)?;
        session
            .motor_mut()
            .reinitialize()
            .map_err(BrakeCalibrationError::Configuration)?;

        Ok(())
    }

    fn check_abort(&self) -> Option<Termination> {
        self.abort.is_raised().then(|| self.aborted())
    }

    fn aborted(&self) -> Termination {
        Termination::Aborted {
            during: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brake_calibration::mock::{EventLog, LinkEvent, MockMotor, MockTreadmill};
    use crate::brake_calibration::sink::MemorySink;
    use approx::assert_abs_diff_eq;

    fn fast_config(max_current_pct: f64, sample_average_count: usize) -> BrakeCalibrationConfig {
        BrakeCalibrationConfig {
            max_current_pct,
            sample_average_count,
            settle_secs: 0.0,
            sample_delay_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_complete_run_records_every_point() {
        let log = EventLog::default();
        let mut sink = MemorySink::default();
        let mut executor = BrakeCalibrationExecutor::new(fast_config(0.116, 3), AbortFlag::new());

        let report = executor
            .run(
                |_| Ok(MockTreadmill::constant(42).with_log(log.clone())),
                MockMotor::new().with_log(log.clone()),
                &mut sink,
            )
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.total_points, 20);
        assert_eq!(report.run.len(), 20);
        for (i, point) in report.run.points().iter().enumerate() {
            assert_eq!(point.setpoint as usize, i * 4);
            assert_abs_diff_eq!(point.torque, 42.0);
        }
        assert_eq!(sink.last(), Some(&report.run));
        assert_eq!(executor.state(), RunState::Disconnected);
    }

    #[test]
    fn test_configuring_sequence() {
        let log = EventLog::default();
        let mut executor = BrakeCalibrationExecutor::new(fast_config(0.001, 1), AbortFlag::new());

        executor
            .run(
                |_| Ok(MockTreadmill::constant(0).with_log(log.clone())),
                MockMotor::new().with_log(log.clone()),
                &mut MemorySink::default(),
            )
            .unwrap();

        let events = log.events();
        assert_eq!(events[0], LinkEvent::ClearTorqueLimit);
        assert_eq!(events[1], LinkEvent::GetSettings);
        match &events[2] {
            LinkEvent::ApplySettings(settings) => assert!(settings.is_open_loop()),
            other => panic!("expected ApplySettings, got {other:?}"),
        }
        assert_eq!(events[3], LinkEvent::Reinitialize);
        assert_eq!(events[4], LinkEvent::SetSpeed(50.0));
        assert_eq!(events[5], LinkEvent::SetBrakeCurrent(0));
        assert_eq!(events[6], LinkEvent::ReadSensors);
        assert_eq!(
            events[7..],
            [LinkEvent::SetSpeed(0.0), LinkEvent::SetBrakeCurrent(0)]
        );
    }

    #[test]
    fn test_invalid_config_touches_nothing() {
        let log = EventLog::default();
        let mut executor = BrakeCalibrationExecutor::new(fast_config(0.0, 1), AbortFlag::new());

        let result = executor.run(
            |_| Ok(MockTreadmill::constant(0).with_log(log.clone())),
            MockMotor::new().with_log(log.clone()),
            &mut MemorySink::default(),
        );

        assert!(matches!(
            result,
            Err(BrakeCalibrationError::InvalidConfig(_))
        ));
        assert!(log.events().is_empty());
    }

    #[test]
    fn test_abort_before_start_still_shuts_down() {
        let log = EventLog::default();
        let abort = AbortFlag::new();
        abort.raise();
        let mut sink = MemorySink::default();
        let mut executor = BrakeCalibrationExecutor::new(fast_config(1.0, 1), abort);

        let report = executor
            .run(
                |_| Ok(MockTreadmill::constant(0).with_log(log.clone())),
                MockMotor::new().with_log(log.clone()),
                &mut sink,
            )
            .unwrap();

        assert_eq!(
            report.termination,
            Termination::Aborted {
                during: RunState::Configuring
            }
        );
        assert!(report.run.is_empty());
        assert_eq!(sink.last().map(CalibrationRun::len), Some(0));
        assert_eq!(
            log.events(),
            vec![LinkEvent::SetSpeed(0.0), LinkEvent::SetBrakeCurrent(0)]
        );
    }

    #[test]
    fn test_abort_during_settle() {
        let log = EventLog::default();
        let abort = AbortFlag::new();
        let config = BrakeCalibrationConfig {
            settle_secs: 30.0,
            ..fast_config(1.0, 1)
        };
        let mut executor = BrakeCalibrationExecutor::new(config, abort.clone());

        let raiser = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            abort.raise();
        });

        let report = executor
            .run(
                |_| Ok(MockTreadmill::constant(0).with_log(log.clone())),
                MockMotor::new().with_log(log.clone()),
                &mut MemorySink::default(),
            )
            .unwrap();
        raiser.join().unwrap();

        assert_eq!(
            report.termination,
            Termination::Aborted {
                during: RunState::Ramping
            }
        );
        assert!(report.run.is_empty());
        assert_eq!(log.count(|e| matches!(e, LinkEvent::ReadSensors)), 0);
        assert_eq!(log.last_speed(), Some(0.0));
    }

    #[test]
    fn test_motor_configuration_failure_still_shuts_down() {
        let log = EventLog::default();
        let mut sink = MemorySink::default();
        let mut executor = BrakeCalibrationExecutor::new(fast_config(1.0, 1), AbortFlag::new());

        let result = executor.run(
            |_| Ok(MockTreadmill::constant(0).with_log(log.clone())),
            MockMotor::new()
                .with_log(log.clone())
                .with_malformed_settings(),
            &mut sink,
        );

        assert!(matches!(
            result,
            Err(BrakeCalibrationError::Configuration(_))
        ));
        assert_eq!(sink.last().map(CalibrationRun::len), Some(0));
        assert_eq!(log.last_speed(), Some(0.0));
        assert_eq!(log.last_brake_current(), Some(0));
    }

    #[test]
    fn test_transaction_failure_keeps_partial_run_in_sink() {
        let log = EventLog::default();
        let mut sink = MemorySink::default();
        let mut executor = BrakeCalibrationExecutor::new(fast_config(1.0, 2), AbortFlag::new());

        // 7th read fails: points 1-3 complete, point 4 fails on its first sample
        let result = executor.run(
            |_| {
                Ok(MockTreadmill::constant(5)
                    .with_log(log.clone())
                    .with_read_failure_at(7))
            },
            MockMotor::new().with_log(log.clone()),
            &mut sink,
        );

        assert!(matches!(result, Err(BrakeCalibrationError::Transaction(_))));
        assert_eq!(sink.last().map(CalibrationRun::len), Some(3));
        assert_eq!(
            log.count(|e| *e == LinkEvent::SetSpeed(0.0)),
            1,
            "shutdown must run exactly once"
        );
        assert_eq!(log.last_brake_current(), Some(0));
    }

    #[test]
    fn test_sink_failure_is_reported_after_shutdown() {
        let log = EventLog::default();
        let mut sink = MemorySink::failing();
        let mut executor = BrakeCalibrationExecutor::new(fast_config(0.001, 1), AbortFlag::new());

        let result = executor.run(
            |_| Ok(MockTreadmill::constant(5).with_log(log.clone())),
            MockMotor::new().with_log(log.clone()),
            &mut sink,
        );

        assert!(matches!(result, Err(BrakeCalibrationError::Sink(_))));
        assert_eq!(log.last_speed(), Some(0.0));
    }
}
