//! Observer hooks invoked around the per-second update.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::state::State;

/// Callbacks run synchronously in every step. Listeners may change cars or
/// assignments but must leave the state valid; it is checked right after
/// `after_update` and nothing is rolled back.
pub trait SimulationListener: Send {
    /// Called after events were dispatched, before currents are applied.
    fn before_update(&mut self, _state: &mut State) {}

    /// Called after currents were applied for the current second.
    fn after_update(&mut self, _state: &mut State) {}
}

impl<L: SimulationListener> SimulationListener for Arc<Mutex<L>> {
    fn before_update(&mut self, state: &mut State) {
        self.lock().before_update(state);
    }

    fn after_update(&mut self, state: &mut State) {
        self.lock().after_update(state);
    }
}

/// Handle returned on registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

/// Aggregated current of one simulated second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TracePoint {
    pub step: u32,
    /// Sum of all power assignments (A).
    pub current: f64,
    /// Sum of what the assigned cars' plans allow (A).
    pub current_plan_limit: f64,
}

/// Records the aggregated current drawn in every second.
#[derive(Debug, Clone, Default)]
pub struct CurrentTraceListener {
    points: Vec<TracePoint>,
}

impl CurrentTraceListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from already recorded points.
    pub fn from_points(points: Vec<TracePoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[TracePoint] {
        &self.points
    }

    /// Highest aggregated current seen.
    pub fn peak_current(&self) -> f64 {
        self.points.iter().map(|p| p.current).fold(0.0, f64::max)
    }

    pub fn mean_current(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points.iter().map(|p| p.current).sum::<f64>() / self.points.len() as f64
    }

    /// Points where the current differs from the previous second.
    pub fn changes(&self) -> impl Iterator<Item = &TracePoint> {
        self.points.iter().enumerate().filter_map(|(i, point)| {
            let changed = i == 0 || self.points[i - 1].current != point.current;
            changed.then_some(point)
        })
    }
}

impl SimulationListener for CurrentTraceListener {
    fn after_update(&mut self, state: &mut State) {
        let current = state.power_assignments().iter().map(|p| p.total()).sum();
        let timeslot = state.current_timeslot();
        let current_plan_limit = state
            .car_assignments()
            .iter()
            .filter_map(|assignment| state.car(assignment.car))
            .map(|car| match car.planned_current_per_phase(timeslot) {
                Some(planned) => planned * car.sum_used_phases(),
                None => car.max_current,
            })
            .sum();
        self.points.push(TracePoint {
            step: state.current_time(),
            current,
            current_plan_limit,
        });
    }
}
