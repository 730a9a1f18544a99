//! Second-by-second simulation engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info};

use crate::data::DataProvider;
use crate::error::{SimError, StateError};
use crate::io::interchange::InterchangeDocument;
use crate::model::energy::ampere_hours;
use crate::model::{Car, ChargingStation, EnergyPriceHistory, FuseTree, NodeId, Phase};
use crate::validation::Validator;

use super::clock::SimClock;
use super::event::{Event, EventKind, Timeline};
use super::listener::{ListenerId, SimulationListener};
use super::policy::{SchedulingPolicy, apply_event};
use super::result::SimulationResult;
use super::state::{CarAssignment, PowerAssignment, State};
use super::types::{PeriodicEvent, SimConfig};

/// Charge delivered on one station phase during the current second.
#[derive(Debug, Clone, Copy)]
struct ChargeDelta {
    assignment: CarAssignment,
    phase: Phase,
    timeslot: usize,
    ampere_hours: f64,
}

/// Simulation engine owning the state, the event timeline, the policy and
/// the registered listeners.
///
/// Each simulated second runs: events, `before_update` listeners, the
/// current update, `after_update` listeners, validation, result recording.
/// The first failing second aborts the engine for good.
pub struct Simulation {
    config: SimConfig,
    state: State,
    policy: Box<dyn SchedulingPolicy>,
    validator: Validator,
    timeline: Timeline,
    clock: SimClock,
    listeners: Vec<(ListenerId, Box<dyn SimulationListener>)>,
    next_listener_id: u64,
    result: SimulationResult,
    recorded_assignments: usize,
    time_policy: Duration,
    time_update: Duration,
    failed: bool,
}

impl Simulation {
    /// Creates a simulation and its event timeline.
    ///
    /// Stations missing from `fuse_tree` are attached to the first fuse
    /// that already feeds stations or has no children.
    ///
    /// # Arguments
    ///
    /// * `config` - Horizon, periodic events, efficiency and tolerance
    /// * `cars` - Cars taking part; each gets an arrival and a departure event
    /// * `stations` - Charging stations
    /// * `fuse_tree` - Capacity network
    /// * `energy_price_history` - Prices announced by the periodic events
    /// * `policy` - Scheduling policy
    ///
    /// # Errors
    ///
    /// * [`SimError::DuplicateCar`] if a car id repeats
    /// * [`SimError::Topology`] if a station cannot be attached
    /// * [`SimError::NoEvents`] if the timeline ends up empty
    pub fn new(
        config: SimConfig,
        cars: Vec<Car>,
        stations: Vec<ChargingStation>,
        fuse_tree: FuseTree,
        energy_price_history: EnergyPriceHistory,
        policy: impl SchedulingPolicy + 'static,
    ) -> Result<Self, SimError> {
        let start = config.start_seconds();
        let end = config.end_seconds();
        let series_len = config.start_timeslot + config.timeslots;
        let mut simulation = Self {
            state: State::new(fuse_tree, energy_price_history, start),
            policy: Box::new(policy),
            validator: Validator::new(config.tolerance),
            timeline: Timeline::new(),
            clock: SimClock::new(start, end),
            listeners: Vec::new(),
            next_listener_id: 0,
            result: SimulationResult::new(series_len, config.charging_efficiency),
            recorded_assignments: 0,
            time_policy: Duration::ZERO,
            time_update: Duration::ZERO,
            failed: false,
            config,
        };

        for station in stations {
            if !simulation.state.fuse_tree().contains_station(station.id) {
                simulation.add_charging_station(station)?;
            }
        }
        let car_count = cars.len();
        for car in cars {
            simulation.add_car(car, true, true)?;
        }
        let periodic = simulation.add_periodic_events();
        if simulation.timeline.is_empty() {
            return Err(SimError::NoEvents);
        }

        info!(
            timeslots = simulation.config.timeslots,
            seconds = end - start,
            cars = car_count,
            stations = simulation.state.fuse_tree().stations().len(),
            periodic_events = periodic,
            events = simulation.timeline.len(),
            "simulation constructed"
        );
        Ok(simulation)
    }

    /// Creates a simulation from the data of `provider`.
    ///
    /// # Errors
    ///
    /// Same as [`Simulation::new`].
    pub fn from_provider(
        config: SimConfig,
        provider: &dyn DataProvider,
        policy: impl SchedulingPolicy + 'static,
    ) -> Result<Self, SimError> {
        Self::new(
            config,
            provider.cars(),
            provider.charging_stations(),
            provider.fuse_tree(),
            provider.energy_price_history(),
            policy,
        )
    }

    fn add_periodic_events(&mut self) -> usize {
        let history = self.state.energy_price_history().clone();
        let times: Vec<u32> = (self.clock.current()..self.clock.end())
            .step_by(self.config.reoptimization_interval.max(1) as usize)
            .collect();
        for &t in &times {
            let kind = match self.config.periodic_event {
                PeriodicEvent::EnergyPriceChange => EventKind::EnergyPriceChange(history.clone()),
                PeriodicEvent::Reoptimize => EventKind::Reoptimize,
            };
            self.timeline.push(Event::new(t, kind));
        }
        times.len()
    }

    /// Adds a car, also while the simulation is running.
    ///
    /// A departure event is only scheduled if the car has a departure time.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::DuplicateCar`] if the car is already known.
    pub fn add_car(
        &mut self,
        car: Car,
        add_arrival: bool,
        add_departure: bool,
    ) -> Result<(), SimError> {
        let (id, arrival, departure) = (car.id, car.timestamp_arrival, car.timestamp_departure);
        self.state.insert_car(car)?;
        debug!(car = id, arrival, departure, "adding car");
        if add_arrival {
            self.timeline
                .push(Event::new(arrival, EventKind::CarArrival { car: id }));
        }
        if add_departure && departure != 0 {
            self.timeline
                .push(Event::new(departure, EventKind::CarDeparture { car: id }));
        }
        Ok(())
    }

    /// Adds a charging station, also while the simulation is running.
    ///
    /// # Errors
    ///
    /// * [`crate::error::TopologyError::DuplicateStation`] if it already exists
    /// * [`crate::error::TopologyError::NoAttachmentPoint`] if no fuse accepts it
    pub fn add_charging_station(&mut self, station: ChargingStation) -> Result<NodeId, SimError> {
        let id = station.id;
        let node = self.state.fuse_tree_mut().attach_station(station)?;
        debug!(station = id, "added charging station");
        Ok(node)
    }

    /// Schedules an additional event.
    pub fn add_event(&mut self, event: Event) {
        self.timeline.push(event);
    }

    /// Registers a listener.
    pub fn add_listener(&mut self, listener: impl SimulationListener + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(registered, _)| *registered != id);
        self.listeners.len() != before
    }

    /// Runs every remaining second of the horizon.
    ///
    /// # Errors
    ///
    /// * [`SimError::Aborted`] if an earlier call failed
    /// * [`SimError::InvalidState`] on the first capacity violation
    /// * any policy or state error raised during a step
    pub fn simulate(&mut self) -> Result<(), SimError> {
        if self.failed {
            return Err(SimError::Aborted);
        }
        info!(
            t0 = self.clock.current(),
            t_max = self.clock.end(),
            method = self.policy.method(),
            "simulating"
        );
        while self.simulate_next_step()? {}
        info!(
            policy_seconds = self.time_policy.as_secs_f64(),
            update_seconds = self.time_update.as_secs_f64(),
            charged_ah = self.result.sum_charged(),
            "simulation finished"
        );
        Ok(())
    }

    /// Simulates exactly one second.
    ///
    /// # Returns
    ///
    /// `Ok(false)` without doing anything once the horizon is reached.
    ///
    /// # Errors
    ///
    /// Same as [`Simulation::simulate`].
    pub fn simulate_next_step(&mut self) -> Result<bool, SimError> {
        if self.failed {
            return Err(SimError::Aborted);
        }
        let Some(t) = self.clock.tick() else {
            return Ok(false);
        };
        if let Err(err) = self.step(t) {
            self.failed = true;
            return Err(err);
        }
        self.state.set_current_time(self.clock.current());
        Ok(true)
    }

    fn step(&mut self, t: u32) -> Result<(), SimError> {
        self.state.set_current_time(t);

        let events = self.timeline.at(t).to_vec();
        if !events.is_empty() {
            let started = Instant::now();
            for event in &events {
                let before = Instant::now();
                apply_event(self.policy.as_mut(), &mut self.state, event)?;
                debug!(
                    t,
                    k = self.state.current_timeslot(),
                    event = %event,
                    elapsed_us = before.elapsed().as_micros() as u64,
                    "policy reacted"
                );
            }
            self.time_policy += started.elapsed();
        }
        self.record_new_assignments();

        for (_, listener) in &mut self.listeners {
            listener.before_update(&mut self.state);
        }

        let started = Instant::now();
        let deltas = self.update(t)?;

        for (_, listener) in &mut self.listeners {
            listener.after_update(&mut self.state);
        }

        let validation = self.validator.validate_state(&self.state);
        self.time_update += started.elapsed();
        if let Err(violation) = validation {
            error!(
                t,
                k = self.state.current_timeslot(),
                %violation,
                "invalid simulation state"
            );
            for power in self.state.sorted_power_assignments() {
                error!(
                    station = power.station,
                    car = power.car,
                    phase1 = power.phase1,
                    phase2 = power.phase2,
                    phase3 = power.phase3,
                    "power assignment"
                );
            }
            return Err(SimError::InvalidState { time: t, violation });
        }

        for delta in deltas {
            self.result
                .add_delta(delta.assignment, delta.phase, delta.timeslot, delta.ampere_hours)?;
        }
        Ok(())
    }

    fn record_new_assignments(&mut self) {
        let all = self.state.all_car_assignments();
        for assignment in &all[self.recorded_assignments..] {
            self.result.record_assignment(*assignment);
        }
        self.recorded_assignments = all.len();
    }

    /// Sets the power of every charging car from its plan and charges every
    /// powered car for one second.
    fn update(&mut self, t: u32) -> Result<Vec<ChargeDelta>, SimError> {
        let k = self.state.current_timeslot();
        let efficiency = self.config.charging_efficiency;

        let assignments = self.state.car_assignments().to_vec();
        for assignment in assignments {
            let car = self
                .state
                .car(assignment.car)
                .ok_or(StateError::UnknownCar(assignment.car))?;
            if car.is_fully_charged() {
                continue;
            }
            let station = self
                .state
                .station(assignment.station)
                .ok_or(StateError::UnknownStation(assignment.station))?;
            let per_phase = car
                .planned_current_per_phase(k)
                .unwrap_or_else(|| station.fuse_phase1.min(car.max_current_per_phase));
            let used = car.sum_used_phases();
            let flags = car.can_load_phases();
            let connected = Phase::ALL.map(|phase| {
                self.state
                    .fuse_tree()
                    .is_station_phase_connected(assignment.station, phase)
            });

            let car = self
                .state
                .car_mut(assignment.car)
                .ok_or(StateError::UnknownCar(assignment.car))?;
            let battery_current = car.accepted_current(per_phase * used)?;
            let phases = Phase::ALL.map(|phase| {
                if connected[phase.index()] {
                    flags[phase.index()] * battery_current / used
                } else {
                    0.0
                }
            });
            self.state.set_power_assignment(PowerAssignment::new(
                assignment.car,
                assignment.station,
                phases,
            ))?;
        }

        let powers = self.state.power_assignments().to_vec();
        let mut deltas = Vec::with_capacity(powers.len() * 3);
        for power in powers {
            let car = self
                .state
                .car_mut(power.car)
                .ok_or(StateError::UnknownCar(power.car))?;
            let total = power.total();
            let stored = car.add_charged_capacity(1, total, efficiency)?;
            let full = car.is_fully_charged();
            let assignment = CarAssignment {
                car: power.car,
                station: power.station,
            };

            for phase in Phase::ALL {
                let amps = power.phase(phase);
                if amps <= 0.0 {
                    continue;
                }
                let delivered = if full {
                    stored * (amps / total) / efficiency
                } else {
                    ampere_hours(1, amps)
                };
                deltas.push(ChargeDelta {
                    assignment,
                    phase,
                    timeslot: k,
                    ampere_hours: delivered,
                });
            }

            if full && stored > 0.0 {
                debug!(car = power.car, station = power.station, t = t + 1, "car finished charging");
                self.timeline.push(Event::new(
                    t + 1,
                    EventKind::CarFinished {
                        car: power.car,
                        station: power.station,
                    },
                ));
            }
        }
        Ok(deltas)
    }

    /// Whether the whole horizon has been simulated.
    pub fn is_finished(&self) -> bool {
        self.clock.is_finished()
    }

    pub fn has_started(&self) -> bool {
        self.clock.current() > self.config.start_seconds()
    }

    /// Whether an earlier step failed.
    pub fn is_aborted(&self) -> bool {
        self.failed
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Mutable state for external drivers stepping the simulation.
    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn result(&self) -> &SimulationResult {
        &self.result
    }

    pub fn method(&self) -> &str {
        self.policy.method()
    }

    /// Time spent inside the policy.
    pub fn time_policy(&self) -> Duration {
        self.time_policy
    }

    /// Timestamp of the first car arrival, if any.
    pub fn first_arrival(&self) -> Option<u32> {
        self.timeline
            .iter()
            .find(|event| matches!(event.kind, EventKind::CarArrival { .. }))
            .map(|event| event.timestamp)
    }

    /// Renders problem instance and results as an interchange document.
    pub fn to_document(&self) -> InterchangeDocument {
        self.result.to_document(
            &self.state,
            self.policy.method(),
            self.time_update.as_secs_f64(),
            self.time_policy.as_secs_f64(),
        )
    }
}

/// A [`Simulation`] shared between threads. Running it while another
/// handle holds the lock fails with [`SimError::Busy`] instead of blocking.
#[derive(Clone)]
pub struct SharedSimulation(Arc<Mutex<Simulation>>);

impl SharedSimulation {
    pub fn new(simulation: Simulation) -> Self {
        Self(Arc::new(Mutex::new(simulation)))
    }

    /// # Errors
    ///
    /// [`SimError::Busy`] if the simulation is in use, otherwise as
    /// [`Simulation::simulate`].
    pub fn simulate(&self) -> Result<(), SimError> {
        self.0.try_lock().ok_or(SimError::Busy)?.simulate()
    }

    /// # Errors
    ///
    /// [`SimError::Busy`] if the simulation is in use, otherwise as
    /// [`Simulation::simulate_next_step`].
    pub fn simulate_next_step(&self) -> Result<bool, SimError> {
        self.0.try_lock().ok_or(SimError::Busy)?.simulate_next_step()
    }

    /// Blocks until the simulation is available.
    pub fn lock(&self) -> MutexGuard<'_, Simulation> {
        self.0.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, Simulation>> {
        self.0.try_lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CarBuilder, Fuse};
    use crate::sim::policy::{GreedyPolicy, IdlePolicy};

    fn one_station_tree() -> FuseTree {
        let mut tree = FuseTree::new(Fuse::new(0, 100.0), 1);
        let root = tree.root();
        tree.add_station(root, ChargingStation::new(0)).expect("station");
        tree
    }

    fn car(id: u32, arrival: u32, departure: u32) -> Car {
        CarBuilder::new(id)
            .phases(1.0, 0.0, 0.0)
            .max_current_per_phase(32.0)
            .availability(arrival, departure)
            .build()
            .expect("valid car")
    }

    fn simulation(cars: Vec<Car>, timeslots: usize) -> Simulation {
        Simulation::new(
            SimConfig::new(timeslots, 0),
            cars,
            Vec::new(),
            one_station_tree(),
            EnergyPriceHistory::default_curve(96),
            GreedyPolicy::default(),
        )
        .expect("valid simulation")
    }

    #[test]
    fn timeline_holds_car_and_periodic_events() {
        let sim = simulation(vec![car(0, 100, 200), car(1, 300, 0)], 2);
        let labels: Vec<&str> = sim.timeline().iter().map(Event::label).collect();
        assert_eq!(
            labels,
            vec![
                "energy_price_change",
                "car_arrival",
                "car_departure",
                "car_arrival",
                "energy_price_change"
            ]
        );
        assert_eq!(sim.first_arrival(), Some(100));
    }

    #[test]
    fn reoptimize_interval_is_configurable() {
        let config = SimConfig::new(1, 4)
            .with_reoptimization_interval(300)
            .with_periodic_event(PeriodicEvent::Reoptimize);
        let sim = Simulation::new(
            config,
            Vec::new(),
            Vec::new(),
            one_station_tree(),
            EnergyPriceHistory::default_curve(96),
            IdlePolicy,
        )
        .expect("valid simulation");
        let times: Vec<u32> = sim.timeline().iter().map(|e| e.timestamp).collect();
        assert_eq!(times, vec![3600, 3900, 4200]);
    }

    #[test]
    fn next_step_stops_at_horizon() {
        let mut sim = simulation(vec![car(0, 0, 900)], 1);
        let mut steps = 0;
        while sim.simulate_next_step().expect("valid step") {
            steps += 1;
        }
        assert_eq!(steps, 900);
        assert!(sim.is_finished());
        assert!(!sim.simulate_next_step().expect("no-op"));
        assert_eq!(sim.state().current_time(), 900);
    }

    #[test]
    fn charging_records_results_and_assignments() {
        let mut sim = simulation(vec![car(0, 0, 0)], 1);
        sim.simulate().expect("valid run");
        let charged = sim.state().car(0).map(|c| c.charged_capacity).unwrap_or_default();
        assert!((charged - 0.85 * 32.0 * 900.0 / 3600.0).abs() < 1e-9);
        assert!((sim.result().sum_charged() - charged).abs() < 1e-9);
        let names: Vec<String> = sim
            .result()
            .variables()
            .into_iter()
            .map(|v| v.variable_name)
            .collect();
        assert_eq!(names, vec!["X_i0_n0", "P_i0_j1_k0"]);
    }

    #[test]
    fn listeners_can_be_removed() {
        #[derive(Default)]
        struct Counter(usize);
        impl SimulationListener for Counter {
            fn after_update(&mut self, _state: &mut State) {
                self.0 += 1;
            }
        }
        let counter = Arc::new(Mutex::new(Counter::default()));
        let mut sim = simulation(Vec::new(), 1);
        let id = sim.add_listener(Arc::clone(&counter));
        sim.simulate_next_step().expect("valid step");
        assert!(sim.remove_listener(id));
        assert!(!sim.remove_listener(id));
        sim.simulate_next_step().expect("valid step");
        assert_eq!(counter.lock().0, 1);
    }

    #[test]
    fn shared_simulation_reports_busy() {
        let shared = SharedSimulation::new(simulation(Vec::new(), 1));
        let other = shared.clone();
        let guard = shared.lock();
        assert!(matches!(other.simulate_next_step(), Err(SimError::Busy)));
        drop(guard);
        assert!(matches!(other.simulate_next_step(), Ok(true)));
    }
}
