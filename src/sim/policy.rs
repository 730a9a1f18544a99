//! Scheduling policies deciding assignments and current plans.
//!
//! The engine hands every due event to [`apply_event`], which performs the
//! bookkeeping common to all policies around the call to
//! [`SchedulingPolicy::react`].

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{ModelError, SimError, StateError};
use crate::io::interchange::{InterchangeDocument, Solution, VariableName};
use crate::model::Phase;
use crate::validation::{DEFAULT_TOLERANCE, Validator};

use super::event::{Event, EventKind};
use super::state::{PowerAssignment, State};

/// Reacts to simulation events by changing assignments and plans.
///
/// Errors returned from `react` abort the run.
pub trait SchedulingPolicy: Send {
    /// Reacts to `event`; changes are visible to the same second's update.
    ///
    /// # Errors
    ///
    /// Any error aborts the simulation.
    fn react(&mut self, state: &mut State, event: &Event) -> Result<(), SimError>;

    /// Method name reported in the interchange document.
    fn method(&self) -> &str;
}

impl SchedulingPolicy for Box<dyn SchedulingPolicy> {
    fn react(&mut self, state: &mut State, event: &Event) -> Result<(), SimError> {
        (**self).react(state, event)
    }

    fn method(&self) -> &str {
        (**self).method()
    }
}

/// Dispatches `event` to `policy` with the shared bookkeeping:
///
/// * arrival: policy first, then the car is queued as unassigned if the
///   policy did not place it
/// * departure: power and assignment (or queue entry) are dropped, then policy
/// * finished: power is dropped, then policy
/// * price change: the new history is installed, then policy
/// * reoptimize: policy only
///
/// # Errors
///
/// Propagates the policy's error.
pub fn apply_event(
    policy: &mut dyn SchedulingPolicy,
    state: &mut State,
    event: &Event,
) -> Result<(), SimError> {
    match &event.kind {
        EventKind::CarArrival { car } => {
            policy.react(state, event)?;
            if state.car_assignment_for_car(*car).is_none() {
                state.add_unassigned_car(*car);
            }
            Ok(())
        }
        EventKind::CarDeparture { car } => {
            state.remove_power_assignment(*car);
            if state.remove_car_assignment(*car).is_none() {
                state.remove_unassigned_car(*car);
            }
            policy.react(state, event)
        }
        EventKind::CarFinished { car, .. } => {
            state.remove_power_assignment(*car);
            policy.react(state, event)
        }
        EventKind::EnergyPriceChange(history) => {
            state.set_energy_price_history(history.clone());
            policy.react(state, event)
        }
        EventKind::Reoptimize => policy.react(state, event),
    }
}

/// Builds a policy by its configuration name (`"greedy"` or `"idle"`).
pub fn policy_from_name(name: &str, tolerance: f64) -> Option<Box<dyn SchedulingPolicy>> {
    match name {
        "greedy" => Some(Box::new(GreedyPolicy::new(tolerance))),
        "idle" => Some(Box::new(IdlePolicy)),
        _ => None,
    }
}

/// Plugs each arriving car into the first free station at full current.
///
/// If full current would overload the fuse tree the car stays plugged in
/// with a zero plan. Cars that found no station get the next station that
/// frees up on departure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GreedyPolicy {
    validator: Validator,
}

impl Default for GreedyPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl GreedyPolicy {
    pub const METHOD: &'static str = "realTimeGreedy";

    pub fn new(tolerance: f64) -> Self {
        Self {
            validator: Validator::new(tolerance),
        }
    }

    /// Tries to plug `car` into a free station.
    ///
    /// # Returns
    ///
    /// `true` if the car was assigned.
    fn place(&self, state: &mut State, car_id: u32) -> Result<bool, SimError> {
        let car = state.car(car_id).ok_or(StateError::UnknownCar(car_id))?;
        let Some(station) = state
            .free_stations()
            .into_iter()
            .find(|station| station.accepts(car))
            .cloned()
        else {
            warn!(car = car_id, t = state.current_time(), "no charging station free");
            return Ok(false);
        };

        let tree = state.fuse_tree();
        let phases = Phase::ALL.map(|phase| {
            if tree.is_station_phase_connected(station.id, phase) {
                car.can_load(phase) * car.max_current_per_phase.min(station.fuse(phase))
            } else {
                0.0
            }
        });
        let per_phase = car.max_current_per_phase.min(station.fuse_phase1);
        let plan_len = state
            .energy_price_history()
            .len()
            .max(car.last_available_timeslot + 1);
        let window = car.first_available_timeslot..=car.last_available_timeslot;

        debug!(
            car = car_id,
            station = station.id,
            t = state.current_time(),
            k = state.current_timeslot(),
            "assigning car"
        );
        state.add_car_assignment(car_id, station.id)?;
        state.set_power_assignment(PowerAssignment::new(car_id, station.id, phases))?;
        let mut plan = vec![0.0; plan_len];
        if let Some(slots) = plan.get_mut(window) {
            slots.fill(per_phase);
        }

        if !self.validator.is_fuse_tree_valid(state) {
            debug!(car = car_id, "full current would overload the fuse tree, using a zero plan");
            state.set_power_assignment(PowerAssignment::new(car_id, station.id, [0.0; 3]))?;
            plan.fill(0.0);
        }
        if let Some(car) = state.car_mut(car_id) {
            car.current_plan = Some(plan);
        }
        Ok(true)
    }
}

impl SchedulingPolicy for GreedyPolicy {
    fn react(&mut self, state: &mut State, event: &Event) -> Result<(), SimError> {
        match &event.kind {
            EventKind::CarArrival { car } => {
                self.place(state, *car)?;
            }
            EventKind::CarDeparture { car } => {
                debug!(car, t = state.current_time(), "car leaving");
                let now = state.current_time();
                let waiting: Vec<u32> = state
                    .unassigned_cars()
                    .iter()
                    .copied()
                    .filter(|id| state.car(*id).is_some_and(|c| c.is_available_at(now)))
                    .collect();
                for id in waiting {
                    if !self.place(state, id)? {
                        break;
                    }
                }
            }
            EventKind::CarFinished { .. }
            | EventKind::EnergyPriceChange(_)
            | EventKind::Reoptimize => {}
        }
        Ok(())
    }

    fn method(&self) -> &str {
        Self::METHOD
    }
}

/// Never assigns anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdlePolicy;

impl SchedulingPolicy for IdlePolicy {
    fn react(&mut self, _state: &mut State, _event: &Event) -> Result<(), SimError> {
        Ok(())
    }

    fn method(&self) -> &str {
        "idle"
    }
}

/// Assignments and phase-1 current plans taken from a solved instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayAheadSchedule {
    stations: HashMap<u32, u32>,
    plans: HashMap<u32, Vec<f64>>,
    timeslots: usize,
}

impl DayAheadSchedule {
    /// Decodes `X` and phase-1 `P` variables. `P` values within 1e-6 below
    /// zero are read as zero.
    ///
    /// # Arguments
    ///
    /// * `solution` - Solved variables
    /// * `timeslots` - Minimum plan length
    ///
    /// # Errors
    ///
    /// * [`ModelError::InvalidVariableName`] for an undecodable name
    /// * [`ModelError::NegativePlanCurrent`] for a clearly negative current
    pub fn from_solution(solution: &Solution, timeslots: usize) -> Result<Self, ModelError> {
        let mut schedule = Self {
            timeslots,
            ..Self::default()
        };
        for variable in &solution.variables {
            match variable.name()? {
                VariableName::X { station, car } => {
                    if variable.variable_value == 1.0 {
                        schedule.stations.insert(car, station);
                    }
                }
                VariableName::P {
                    station,
                    phase,
                    timeslot,
                } => {
                    let mut value = variable.variable_value;
                    if value < -DEFAULT_TOLERANCE {
                        return Err(ModelError::NegativePlanCurrent {
                            name: variable.variable_name.clone(),
                            value,
                        });
                    }
                    value = value.max(0.0);
                    if phase != Phase::Phase1 {
                        continue;
                    }
                    let plan = schedule.plans.entry(station).or_default();
                    if plan.len() <= timeslot {
                        plan.resize(timeslot + 1, 0.0);
                    }
                    plan[timeslot] = value;
                }
            }
        }
        Ok(schedule)
    }

    /// Station the schedule assigns `car` to.
    pub fn station_for(&self, car: u32) -> Option<u32> {
        self.stations.get(&car).copied()
    }

    /// Phase-1 plan of `station`, zero where unspecified.
    pub fn station_plan(&self, station: u32) -> Vec<f64> {
        let mut plan = self.plans.get(&station).cloned().unwrap_or_default();
        if plan.len() < self.timeslots {
            plan.resize(self.timeslots, 0.0);
        }
        plan
    }
}

/// Replays a day-ahead schedule: each car goes to its scheduled station and
/// follows that station's plan.
#[derive(Debug, Clone)]
pub struct DayAheadReplayPolicy {
    schedule: DayAheadSchedule,
    tolerance: f64,
}

impl DayAheadReplayPolicy {
    pub const METHOD: &'static str = "realTimeFromDayAhead";

    pub fn new(schedule: DayAheadSchedule, tolerance: f64) -> Self {
        Self {
            schedule,
            tolerance,
        }
    }

    /// # Errors
    ///
    /// See [`DayAheadSchedule::from_solution`].
    pub fn from_document(document: &InterchangeDocument) -> Result<Self, ModelError> {
        let timeslots = document.problem_instance.energy_price_history.len();
        let schedule = DayAheadSchedule::from_solution(&document.solution, timeslots)?;
        Ok(Self::new(schedule, DEFAULT_TOLERANCE))
    }

    pub fn schedule(&self) -> &DayAheadSchedule {
        &self.schedule
    }
}

impl SchedulingPolicy for DayAheadReplayPolicy {
    fn react(&mut self, state: &mut State, event: &Event) -> Result<(), SimError> {
        let EventKind::CarArrival { car: car_id } = event.kind else {
            return Ok(());
        };
        let Some(station_id) = self.schedule.station_for(car_id) else {
            return Ok(());
        };
        if state.car_assignment_for_station(station_id).is_some() {
            warn!(car = car_id, station = station_id, "scheduled station is occupied");
            return Ok(());
        }
        let station = state
            .station(station_id)
            .ok_or(StateError::UnknownStation(station_id))?;
        let fuse_phase1 = station.fuse_phase1;
        state.add_car_assignment(car_id, station_id)?;

        let tolerance = self.tolerance;
        let mut plan = self.schedule.station_plan(station_id);
        let car = state.car_mut(car_id).ok_or(StateError::UnknownCar(car_id))?;
        let max_allowed = fuse_phase1.min(car.max_current_per_phase);
        for (k, value) in plan.iter_mut().enumerate() {
            if *value > 0.0 && *value < car.min_current_per_phase {
                warn!(car = car_id, k, planned = *value, "plan below minimum current, raising");
                *value = car.min_current_per_phase;
            }
            if *value > max_allowed && *value < max_allowed + tolerance {
                *value = max_allowed;
            }
        }
        car.current_plan = Some(plan);
        Ok(())
    }

    fn method(&self) -> &str {
        Self::METHOD
    }
}
