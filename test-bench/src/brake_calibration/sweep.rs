//! Brake current sweep generation
//!
//! The brake DAC is 12 bits wide but its setpoint register is 16 bits, with the
//! value upscaled by 4. Only every 4th raw setpoint is distinguishable, so the
//! sweep steps by [`SETPOINT_STEP`].

/// Distance between consecutive raw setpoints.
pub const SETPOINT_STEP: u16 = 4;

/// One brake current setpoint to test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SweepPoint {
    /// Raw 16-bit brake current setpoint
    pub setpoint: u16,
}

/// Highest raw setpoint allowed for a given percent of full scale.
pub fn setpoint_upper_bound(max_current_pct: f64) -> u16 {
    let pct = max_current_pct.clamp(0.0, 100.0);
    (u16::MAX as f64 * pct / 100.0).round() as u16
}

/// Generate the ascending setpoints `0, 4, 8, ...` up to but not exceeding
/// [`setpoint_upper_bound`]`(max_current_pct)`.
pub fn generate_sweep(max_current_pct: f64) -> Vec<SweepPoint> {
    let bound = setpoint_upper_bound(max_current_pct);
    (0..=bound)
        .step_by(SETPOINT_STEP as usize)
        .map(|setpoint| SweepPoint { setpoint })
        .collect()
}
