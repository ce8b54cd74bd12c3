use std::fmt;

/// Lifecycle of a calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Disconnected,
    Connecting,
    Configuring,
    Ramping,
    Sweeping,
    Draining,
    Shutdown,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Disconnected => "DISCONNECTED",
            RunState::Connecting => "CONNECTING",
            RunState::Configuring => "CONFIGURING",
            RunState::Ramping => "RAMPING",
            RunState::Sweeping => "SWEEPING",
            RunState::Draining => "DRAINING",
            RunState::Shutdown => "SHUTDOWN",
        };
        f.write_str(name)
    }
}

/// One row of the current -> torque curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AveragedPoint {
    /// Raw brake current setpoint
    pub setpoint: u16,
    /// Mean torque over the samples taken at this setpoint, raw ADC counts
    pub torque: f64,
}

/// Points collected during a run, in sweep order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationRun {
    points: Vec<AveragedPoint>,
}

impl CalibrationRun {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, point: AveragedPoint) {
        self.points.push(point);
    }

    pub fn points(&self) -> &[AveragedPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Minimum and maximum averaged torque, if any points were collected.
    pub fn torque_range(&self) -> Option<(f64, f64)> {
        self.points.iter().map(|p| p.torque).fold(None, |acc, t| {
            Some(match acc {
                None => (t, t),
                Some((lo, hi)) => (lo.min(t), hi.max(t)),
            })
        })
    }
}

/// How a run that acquired its links came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Every sweep point was measured.
    Completed,
    /// An abort was requested; the run stopped early in the given state.
    Aborted { during: RunState },
}

/// Result of a run that did not fail.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: CalibrationRun,
    pub termination: Termination,
    /// Number of points the full sweep would have measured
    pub total_points: usize,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.termination == Termination::Completed
    }
}
