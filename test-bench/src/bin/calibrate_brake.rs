//! Magnetic Brake Calibration
//!
//! Sweeps the treadmill brake current upward while the motor holds a fixed
//! open-loop speed, recording the averaged reaction torque at each setpoint.
//!
//! Ctrl+C (or SIGTERM) stops the sweep at the next safe point. The motor and
//! brake are always zeroed before the program exits.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use hardware::{MotorArgs, MotorInterface, Treadmill, TreadmillInterface};
use indicatif::{ProgressBar, ProgressStyle};
use test_bench::brake_calibration::mock::{MockMotor, MockTreadmill};
use test_bench::brake_calibration::{
    AbortFlag, BrakeCalibrationConfig, BrakeCalibrationError, BrakeCalibrationExecutor, CsvSink,
    MemorySink, ResultSink, RunReport, Termination,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Torque counts per raw setpoint reported by the simulated brake.
const SIMULATED_BRAKE_GAIN: f64 = 0.05;

#[derive(Parser, Debug)]
#[command(name = "calibrate_brake")]
#[command(
    about = "Measure the magnetic brake current-to-torque curve",
    long_about = "Magnetic brake calibration for the treadmill test bench.\n\n\
        The calibration process:\n  \
        1. Connects to the sensor/brake board and clears the over-torque trigger\n  \
        2. Puts the motor controller in open-loop mode and ramps to test speed\n  \
        3. Steps the brake current from 0 to --max_current in raw increments of 4\n  \
        4. Averages --sample_average_count torque readings per step\n  \
        5. Zeroes motor speed and brake current\n\n\
        Prerequisites:\n  \
        - Treadmill board on a serial port (see --port)\n  \
        - Motor controller CLI installed and on PATH (see --motor_cli)"
)]
struct Args {
    #[command(flatten)]
    calibration: BrakeCalibrationConfig,

    #[command(flatten)]
    motor: MotorArgs,

    #[arg(
        long = "output_csv",
        help = "Output CSV file for the calibration curve",
        long_help = "If provided, writes one `setpoint,torque` row per measured setpoint. \
            Aborted and failed runs still write the points collected so far."
    )]
    output_csv: Option<PathBuf>,

    #[arg(
        long,
        help = "Run against simulated links instead of hardware",
        long_help = "Replace the treadmill board and motor controller with simulated links. \
            The simulated brake produces torque proportional to its setpoint."
    )]
    simulate: bool,
}

/// Raise `abort` on Ctrl+C or SIGTERM.
async fn watch_for_abort(abort: AbortFlag) {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Received Ctrl+C, stopping at the next safe point..."),
        _ = terminate => warn!("Received SIGTERM, stopping at the next safe point..."),
    }
    abort.raise();
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    bar
}

fn build_sink(args: &Args) -> Box<dyn ResultSink + Send> {
    match &args.output_csv {
        Some(path) => Box::new(
            CsvSink::new(path)
                .with_comment(format!("Port: {}", args.calibration.port))
                .with_comment(format!(
                    "Motor speed: {:.1}%",
                    args.calibration.motor_speed_pct
                ))
                .with_comment(format!(
                    "Samples per point: {}",
                    args.calibration.sample_average_count
                )),
        ),
        None => Box::new(MemorySink::default()),
    }
}

fn execute<D, M, C>(
    mut executor: BrakeCalibrationExecutor,
    connect: C,
    motor: M,
    mut sink: Box<dyn ResultSink + Send>,
) -> Result<RunReport, BrakeCalibrationError>
where
    D: TreadmillInterface,
    M: MotorInterface,
    C: FnOnce(&str) -> Result<D, String>,
{
    executor.run(connect, motor, sink.as_mut())
}

fn report_failure(error: &BrakeCalibrationError, args: &Args) {
    error!("Calibration failed: {error}");
    match error {
        BrakeCalibrationError::InvalidConfig(_) => {
            error!("Run with --help to see valid ranges");
        }
        BrakeCalibrationError::Connection { port, .. } => {
            error!("Check that the treadmill board is powered and connected on {port}");
        }
        BrakeCalibrationError::Configuration(_) => {
            error!(
                "Check that {} is installed and the motor controller is connected",
                args.motor.motor_cli
            );
        }
        BrakeCalibrationError::Transaction(_) => {
            warn!("Motor and brake were commanded to zero; verify the bench is at rest");
        }
        BrakeCalibrationError::Sink(_) => {
            if let Some(path) = &args.output_csv {
                error!("Check that {} is writable", path.display());
            }
        }
    }
}

fn report_success(report: &RunReport) {
    info!("");
    info!("=== Calibration Results ===");
    match report.termination {
        Termination::Completed => info!("Status:    complete"),
        Termination::Aborted { during } => warn!("Status:    aborted during {during}"),
    }
    info!(
        "Points:    {} of {}",
        report.run.len(),
        report.total_points
    );
    if let (Some(first), Some(last)) = (report.run.points().first(), report.run.points().last()) {
        info!("Setpoints: {} to {}", first.setpoint, last.setpoint);
    }
    if let Some((lo, hi)) = report.run.torque_range() {
        info!("Torque:    {lo:.2} to {hi:.2}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Brake Calibration");
    info!("=================");
    info!(
        "Port:              {}",
        if args.simulate {
            "(simulated)"
        } else {
            args.calibration.port.as_str()
        }
    );
    info!("Max current:       {:.1}%", args.calibration.max_current_pct);
    info!(
        "Samples/point:     {}",
        args.calibration.sample_average_count
    );
    info!("Motor speed:       {:.1}%", args.calibration.motor_speed_pct);
    info!("Settle time:       {:.1} s", args.calibration.settle_secs);
    if let Some(ref path) = args.output_csv {
        info!("Output CSV:        {:?}", path);
    }
    info!("");

    let abort = AbortFlag::new();
    tokio::spawn(watch_for_abort(abort.clone()));

    let executor = BrakeCalibrationExecutor::new(args.calibration.clone(), abort)
        .with_progress(progress_bar());
    let sink = build_sink(&args);
    let simulate = args.simulate;
    let motor = args.motor.build();

    let result = tokio::task::spawn_blocking(move || {
        if simulate {
            execute(
                executor,
                |_: &str| Ok(MockTreadmill::linear(0.0, SIMULATED_BRAKE_GAIN)),
                MockMotor::new(),
                sink,
            )
        } else {
            execute(
                executor,
                |port: &str| Treadmill::connect(port).map_err(|e| e.to_string()),
                motor,
                sink,
            )
        }
    })
    .await?;

    match result {
        Ok(report) => {
            report_success(&report);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            report_failure(&e, &args);
            Ok(ExitCode::FAILURE)
        }
    }
}
