//! Destinations for a finished (or aborted) calibration run

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use super::types::CalibrationRun;

/// Receives the collected points once, after the sweep ends.
pub trait ResultSink {
    fn consume(&mut self, run: &CalibrationRun) -> Result<(), String>;
}

impl<S: ResultSink + ?Sized> ResultSink for Box<S> {
    fn consume(&mut self, run: &CalibrationRun) -> Result<(), String> {
        (**self).consume(run)
    }
}

/// Writes `setpoint,torque` rows to a CSV file with a commented header.
pub struct CsvSink {
    path: PathBuf,
    header: Vec<String>,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            header: Vec::new(),
        }
    }

    /// Add a `# ...` comment line above the column header.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.header.push(comment.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, run: &CalibrationRun) -> std::io::Result<()> {
        let mut file = BufWriter::new(File::create(&self.path)?);

        writeln!(file, "# Brake Calibration")?;
        for comment in &self.header {
            writeln!(file, "# {comment}")?;
        }
        writeln!(file, "# Points: {}", run.len())?;
        if let Some((lo, hi)) = run.torque_range() {
            writeln!(file, "# Torque range: {lo:.2} to {hi:.2}")?;
        }

        writeln!(file, "setpoint,torque")?;
        for point in run.points() {
            writeln!(file, "{},{:.4}", point.setpoint, point.torque)?;
        }

        file.flush()
    }
}

impl ResultSink for CsvSink {
    fn consume(&mut self, run: &CalibrationRun) -> Result<(), String> {
        self.write(run)
            .map_err(|e| format!("Failed to write {}: {e}", self.path.display()))?;
        info!("Wrote {} points to {}", run.len(), self.path.display());
        Ok(())
    }
}

/// Keeps every consumed run in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    runs: Vec<CalibrationRun>,
    fail: bool,
}

impl MemorySink {
    /// A sink whose `consume` always fails, after recording the run.
    pub fn failing() -> Self {
        Self {
            runs: Vec::new(),
            fail: true,
        }
    }

    pub fn runs(&self) -> &[CalibrationRun] {
        &self.runs
    }

    pub fn last(&self) -> Option<&CalibrationRun> {
        self.runs.last()
    }
}

impl ResultSink for MemorySink {
    fn consume(&mut self, run: &CalibrationRun) -> Result<(), String> {
        self.runs.push(run.clone());
        if self.fail {
            return Err("memory sink configured to fail".to_string());
        }
        Ok(())
    }
}
