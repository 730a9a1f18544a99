//! Phases, time units and current/power conversions shared across the crate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of one scheduling timeslot in seconds (15 minutes).
pub const SECONDS_PER_TIMESLOT: u32 = 900;
/// Number of timeslots in one day.
pub const TIMESLOTS_PER_DAY: usize = 96;
/// Number of seconds in one day.
pub const SECONDS_PER_DAY: u32 = 86_400;
/// Line voltage used for current/power conversions (V).
pub const LINE_VOLTAGE: f64 = 230.0;

/// One of the three phases of the grid or of a charging station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Phase1,
    Phase2,
    Phase3,
}

impl Phase {
    /// All phases in order.
    pub const ALL: [Phase; 3] = [Phase::Phase1, Phase::Phase2, Phase::Phase3];

    /// Zero-based index into `[f64; 3]` arrays.
    pub fn index(self) -> usize {
        match self {
            Phase::Phase1 => 0,
            Phase::Phase2 => 1,
            Phase::Phase3 => 2,
        }
    }

    /// One-based phase number as used in variable names.
    pub fn number(self) -> usize {
        self.index() + 1
    }

    /// Returns the phase for a one-based number, or `None` outside `1..=3`.
    pub fn from_number(number: usize) -> Option<Self> {
        match number {
            1 => Some(Phase::Phase1),
            2 => Some(Phase::Phase2),
            3 => Some(Phase::Phase3),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.number())
    }
}

/// Current in amps drawn when charging with `power_kw` spread across `phases`.
pub fn current_from_power(power_kw: f64, phases: u32) -> f64 {
    (1000.0 * power_kw) / (f64::from(phases) * LINE_VOLTAGE)
}

/// Power in kW for `current` amps on each of `phases` phases.
pub fn power_from_current(current: f64, phases: u32) -> f64 {
    f64::from(phases) * LINE_VOLTAGE * current / 1000.0
}

/// Charge in amp-hours delivered by `current` amps over `seconds`.
pub fn ampere_hours(seconds: u32, current: f64) -> f64 {
    current * f64::from(seconds) / 3600.0
}

/// Timeslot containing the second `seconds`, counted from `start_seconds`.
pub fn timeslot_of(seconds: u32, start_seconds: u32) -> usize {
    (seconds.saturating_sub(start_seconds) / SECONDS_PER_TIMESLOT) as usize
}
