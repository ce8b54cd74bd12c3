//! Motor Controller Driver
//!
//! The treadmill motor is driven by a controller configured and commanded through
//! its vendor command-line tool. Every operation spawns the tool once and waits for
//! it to exit; there is no persistent connection.
//!
//! Speed is commanded as a duty-cycle target in the controller's native range of
//! ±[`NATIVE_SPEED_LIMIT`]. Callers work in percent of full scale.

mod settings;

pub use settings::{MotorSettings, FEEDBACK_MODE_KEY, OPEN_LOOP_FEEDBACK_MODE};

use std::ffi::OsStr;
use std::process::{Command, ExitStatus};

use clap::Args;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::MotorInterface;

/// Default vendor CLI program.
pub const DEFAULT_MOTOR_CLI: &str = "jrk2cmd";

/// Full-scale duty cycle in controller units.
pub const NATIVE_SPEED_LIMIT: i32 = 600;

/// Errors from the motor controller CLI
#[derive(Error, Debug)]
pub enum MotorError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings document is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("malformed settings document: {0}")]
    MalformedSettings(String),
}

/// Convert a speed in percent of full scale to the controller's native units.
///
/// Out-of-range inputs are clamped to ±100%.
pub fn speed_to_native(percent: f64) -> i32 {
    let clamped = percent.clamp(-100.0, 100.0);
    (clamped / 100.0 * NATIVE_SPEED_LIMIT as f64).round() as i32
}

/// Motor controller driven through its vendor CLI.
#[derive(Debug, Clone)]
pub struct MotorCli {
    program: String,
    serial: Option<String>,
}

impl MotorCli {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            serial: None,
        }
    }

    /// Address a specific controller when several are attached.
    pub fn with_serial(mut self, serial: &str) -> Self {
        self.serial = Some(serial.to_string());
        self
    }

    /// Base command with device selection applied.
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(serial) = &self.serial {
            cmd.args(["-d", serial]);
        }
        cmd
    }

    /// Run the CLI with `args` and return its stdout.
    fn run<I, S>(&self, args: I) -> Result<String, MotorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command();
        cmd.args(args);
        debug!("Running {:?}", cmd);

        let output = cmd.output().map_err(|source| MotorError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(MotorError::CommandFailed {
                command: format!("{cmd:?}"),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Read the controller's settings.
    pub fn get_settings(&self) -> Result<MotorSettings, MotorError> {
        let file = NamedTempFile::new()?;
        self.run([OsStr::new("--get-settings"), file.path().as_os_str()])?;
        let text = std::fs::read_to_string(file.path())?;
        MotorSettings::from_yaml(&text)
    }

    /// Write a settings document to the controller.
    pub fn apply_settings(&self, settings: &MotorSettings) -> Result<(), MotorError> {
        let file = NamedTempFile::new()?;
        std::fs::write(file.path(), settings.to_yaml()?)?;
        self.run([OsStr::new("--settings"), file.path().as_os_str()])?;
        Ok(())
    }

    /// Make the controller reload its settings.
    pub fn reinitialize(&self) -> Result<(), MotorError> {
        self.run(["--reinitialize"])?;
        Ok(())
    }

    /// Command an open-loop speed in percent of full scale.
    pub fn set_speed(&self, percent: f64) -> Result<(), MotorError> {
        let native = speed_to_native(percent);
        info!("Motor speed {percent:.1}% (duty cycle target {native})");
        self.run(["--force-duty-cycle-target".to_string(), native.to_string()])?;
        Ok(())
    }
}

impl MotorInterface for MotorCli {
    fn get_settings(&mut self) -> Result<MotorSettings, String> {
        MotorCli::get_settings(self).map_err(|e| format!("reading motor settings failed: {e}"))
    }

    fn apply_settings(&mut self, settings: &MotorSettings) -> Result<(), String> {
        MotorCli::apply_settings(self, settings)
            .map_err(|e| format!("writing motor settings failed: {e}"))
    }

    fn reinitialize(&mut self) -> Result<(), String> {
        MotorCli::reinitialize(self).map_err(|e| format!("motor reinitialize failed: {e}"))
    }

    fn set_speed(&mut self, percent: f64) -> Result<(), String> {
        MotorCli::set_speed(self, percent).map_err(|e| format!("motor speed command failed: {e}"))
    }
}

/// Command-line arguments selecting the motor controller.
///
/// Use with `#[command(flatten)]` in your CLI args struct.
#[derive(Args, Debug, Clone)]
pub struct MotorArgs {
    #[arg(
        long = "motor_cli",
        default_value = DEFAULT_MOTOR_CLI,
        help = "Motor controller command-line tool",
        long_help = "Program used to configure and command the motor controller. It must \
            accept --get-settings, --settings, --reinitialize and --force-duty-cycle-target."
    )]
    pub motor_cli: String,

    #[arg(
        long = "motor_serial",
        help = "Serial number of the motor controller",
        long_help = "Selects a specific motor controller when more than one is connected. \
            Passed to the CLI as -d <serial>."
    )]
    pub motor_serial: Option<String>,
}

impl MotorArgs {
    /// Build the CLI driver. No command is issued until the first operation.
    pub fn build(&self) -> MotorCli {
        let cli = MotorCli::new(&self.motor_cli);
        match &self.motor_serial {
            Some(serial) => cli.with_serial(serial),
            None => cli,
        }
    }
}
