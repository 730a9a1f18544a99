//! Run summary computed after a simulation.

use std::collections::BTreeSet;
use std::fmt;

use super::listener::TracePoint;
use super::result::SimulationResult;
use super::state::State;

/// Aggregate figures of a complete run.
///
/// Computed post-hoc from the recorded current trace, the result
/// accumulator and the final state.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Policy method name.
    pub method: String,
    /// Simulated seconds.
    pub steps: usize,
    /// Amp-hours stored in batteries.
    pub total_charged_ah: f64,
    /// Highest aggregated current over all power assignments (A).
    pub peak_current: f64,
    /// Mean aggregated current (A).
    pub mean_current: f64,
    pub cars_total: usize,
    /// Cars that were plugged into a station at least once.
    pub cars_assigned: usize,
    pub cars_fully_charged: usize,
    pub cars_never_assigned: usize,
}

impl RunReport {
    /// Builds the report.
    ///
    /// # Arguments
    ///
    /// * `method` - Name of the scheduling policy
    /// * `trace` - Per-second aggregated currents
    /// * `result` - Result accumulator of the run
    /// * `state` - Final engine state
    pub fn from_run(
        method: &str,
        trace: &[TracePoint],
        result: &SimulationResult,
        state: &State,
    ) -> Self {
        let assigned: BTreeSet<u32> = state
            .all_car_assignments()
            .iter()
            .map(|assignment| assignment.car)
            .collect();
        let cars_total = state.cars().count();
        let peak_current = trace.iter().map(|p| p.current).fold(0.0, f64::max);
        let mean_current = if trace.is_empty() {
            0.0
        } else {
            trace.iter().map(|p| p.current).sum::<f64>() / trace.len() as f64
        };

        Self {
            method: method.to_string(),
            steps: trace.len(),
            total_charged_ah: result.sum_charged(),
            peak_current,
            mean_current,
            cars_total,
            cars_assigned: assigned.len(),
            cars_fully_charged: state.cars().filter(|car| car.is_fully_charged()).count(),
            cars_never_assigned: state
                .cars()
                .filter(|car| !assigned.contains(&car.id))
                .count(),
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Run Report ({}) ---", self.method)?;
        writeln!(f, "Simulated seconds:     {}", self.steps)?;
        writeln!(f, "Charged:               {:.3} Ah", self.total_charged_ah)?;
        writeln!(f, "Peak current:          {:.2} A", self.peak_current)?;
        writeln!(f, "Mean current:          {:.2} A", self.mean_current)?;
        writeln!(
            f,
            "Cars assigned:         {} of {}",
            self.cars_assigned, self.cars_total
        )?;
        writeln!(f, "Cars fully charged:    {}", self.cars_fully_charged)?;
        write!(f, "Cars never assigned:   {}", self.cars_never_assigned)
    }
}
