//! Engine configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::energy::{SECONDS_PER_TIMESLOT, TIMESLOTS_PER_DAY};
use crate::validation::DEFAULT_TOLERANCE;

/// Default charging efficiency applied to every delivered amp-hour.
pub const DEFAULT_CHARGING_EFFICIENCY: f64 = 0.85;

/// Event kind the engine schedules at every reoptimization interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodicEvent {
    /// Re-announces the current price history.
    #[default]
    EnergyPriceChange,
    /// Asks the policy to revise its plans.
    Reoptimize,
}

impl PeriodicEvent {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "energy_price_change" => Some(Self::EnergyPriceChange),
            "reoptimize" => Some(Self::Reoptimize),
            _ => None,
        }
    }
}

impl fmt::Display for PeriodicEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodicEvent::EnergyPriceChange => f.write_str("energy_price_change"),
            PeriodicEvent::Reoptimize => f.write_str("reoptimize"),
        }
    }
}

/// Parameters of one simulation run, passed explicitly to the engine,
/// the validator and every battery simulator it creates.
///
/// # Examples
///
/// ```
/// use ev_charge_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(4, 32);
/// assert_eq!(cfg.start_seconds(), 32 * 900);
/// assert_eq!(cfg.end_seconds(), 36 * 900);
/// assert_eq!(cfg.total_steps(), 3600);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Number of 15-minute timeslots to simulate.
    pub timeslots: usize,
    /// Absolute timeslot of day the run starts at.
    pub start_timeslot: usize,
    /// Seconds between periodic events.
    pub reoptimization_interval: u32,
    /// Kind of the periodic events.
    pub periodic_event: PeriodicEvent,
    /// Fraction of the drawn charge that ends up in the battery.
    pub charging_efficiency: f64,
    /// Slack on every capacity comparison (A).
    pub tolerance: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new(TIMESLOTS_PER_DAY, 0)
    }
}

impl SimConfig {
    /// Creates a configuration with default interval, efficiency and tolerance.
    ///
    /// # Arguments
    ///
    /// * `timeslots` - Number of timeslots to simulate (must be > 0)
    /// * `start_timeslot` - First simulated timeslot of day
    ///
    /// # Panics
    ///
    /// Panics if `timeslots` is zero.
    pub fn new(timeslots: usize, start_timeslot: usize) -> Self {
        assert!(timeslots > 0, "timeslots must be > 0");
        Self {
            timeslots,
            start_timeslot,
            reoptimization_interval: SECONDS_PER_TIMESLOT,
            periodic_event: PeriodicEvent::default(),
            charging_efficiency: DEFAULT_CHARGING_EFFICIENCY,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// # Panics
    ///
    /// Panics if `seconds` is zero.
    pub fn with_reoptimization_interval(mut self, seconds: u32) -> Self {
        assert!(seconds > 0, "reoptimization interval must be > 0");
        self.reoptimization_interval = seconds;
        self
    }

    pub fn with_periodic_event(mut self, kind: PeriodicEvent) -> Self {
        self.periodic_event = kind;
        self
    }

    pub fn with_charging_efficiency(mut self, efficiency: f64) -> Self {
        self.charging_efficiency = efficiency;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// First simulated second of day.
    pub fn start_seconds(&self) -> u32 {
        self.start_timeslot as u32 * SECONDS_PER_TIMESLOT
    }

    /// First second after the horizon.
    pub fn end_seconds(&self) -> u32 {
        (self.start_timeslot + self.timeslots) as u32 * SECONDS_PER_TIMESLOT
    }

    /// Number of simulated seconds.
    pub fn total_steps(&self) -> usize {
        self.timeslots * SECONDS_PER_TIMESLOT as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_one_day() {
        let cfg = SimConfig::default();
        assert_eq!(cfg.start_seconds(), 0);
        assert_eq!(cfg.end_seconds(), 86_400);
        assert_eq!(cfg.reoptimization_interval, 900);
        assert_eq!(cfg.periodic_event, PeriodicEvent::EnergyPriceChange);
        assert_eq!(cfg.charging_efficiency, 0.85);
    }

    #[test]
    #[should_panic(expected = "timeslots must be > 0")]
    fn zero_timeslots_panics() {
        SimConfig::new(0, 0);
    }

    #[test]
    fn periodic_event_names() {
        assert_eq!(
            PeriodicEvent::from_name("reoptimize"),
            Some(PeriodicEvent::Reoptimize)
        );
        assert_eq!(PeriodicEvent::from_name("hourly"), None);
        assert_eq!(PeriodicEvent::EnergyPriceChange.to_string(), "energy_price_change");
    }
}
