//! Mutable simulation state shared by the engine, policies and listeners.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, StateError};
use crate::model::energy::{Phase, SECONDS_PER_TIMESLOT};
use crate::model::{Car, ChargingStation, EnergyPriceHistory, FuseTree};

/// A car plugged into a charging station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CarAssignment {
    pub car: u32,
    pub station: u32,
}

/// Per-phase current (A) a car draws at its station during the current
/// second. Phases are station phases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerAssignment {
    pub car: u32,
    pub station: u32,
    pub phase1: f64,
    pub phase2: f64,
    pub phase3: f64,
}

impl PowerAssignment {
    pub fn new(car: u32, station: u32, phases: [f64; 3]) -> Self {
        Self {
            car,
            station,
            phase1: phases[0],
            phase2: phases[1],
            phase3: phases[2],
        }
    }

    pub fn phases(&self) -> [f64; 3] {
        [self.phase1, self.phase2, self.phase3]
    }

    pub fn phase(&self, phase: Phase) -> f64 {
        self.phases()[phase.index()]
    }

    /// Sum over all three phases.
    pub fn total(&self) -> f64 {
        self.phase1 + self.phase2 + self.phase3
    }
}

/// Everything a policy may inspect or change while reacting to an event.
///
/// Cars are owned here and the fuse tree owns the stations. Free stations are
/// derived from the active car assignments.
#[derive(Debug, Clone)]
pub struct State {
    cars: BTreeMap<u32, Car>,
    fuse_tree: FuseTree,
    energy_price_history: EnergyPriceHistory,
    car_assignments: Vec<CarAssignment>,
    all_car_assignments: Vec<CarAssignment>,
    power_assignments: Vec<PowerAssignment>,
    unassigned_cars: Vec<u32>,
    start_seconds: u32,
    current_seconds: u32,
}

impl State {
    pub fn new(
        fuse_tree: FuseTree,
        energy_price_history: EnergyPriceHistory,
        start_seconds: u32,
    ) -> Self {
        Self {
            cars: BTreeMap::new(),
            fuse_tree,
            energy_price_history,
            car_assignments: Vec::new(),
            all_car_assignments: Vec::new(),
            power_assignments: Vec::new(),
            unassigned_cars: Vec::new(),
            start_seconds,
            current_seconds: start_seconds,
        }
    }

    /// Second of day the simulation started at.
    pub fn start_time(&self) -> u32 {
        self.start_seconds
    }

    /// Second of day currently being simulated.
    pub fn current_time(&self) -> u32 {
        self.current_seconds
    }

    /// Timeslot of day containing the current second.
    pub fn current_timeslot(&self) -> usize {
        (self.current_seconds / SECONDS_PER_TIMESLOT) as usize
    }

    pub(crate) fn set_current_time(&mut self, seconds: u32) {
        self.current_seconds = seconds;
    }

    pub(crate) fn insert_car(&mut self, car: Car) -> Result<(), SimError> {
        if self.cars.contains_key(&car.id) {
            return Err(SimError::DuplicateCar(car.id));
        }
        self.cars.insert(car.id, car);
        Ok(())
    }

    pub fn cars(&self) -> impl Iterator<Item = &Car> {
        self.cars.values()
    }

    pub fn car(&self, id: u32) -> Option<&Car> {
        self.cars.get(&id)
    }

    pub fn car_mut(&mut self, id: u32) -> Option<&mut Car> {
        self.cars.get_mut(&id)
    }

    pub fn fuse_tree(&self) -> &FuseTree {
        &self.fuse_tree
    }

    pub(crate) fn fuse_tree_mut(&mut self) -> &mut FuseTree {
        &mut self.fuse_tree
    }

    pub fn station(&self, id: u32) -> Option<&ChargingStation> {
        self.fuse_tree.station(id)
    }

    pub fn energy_price_history(&self) -> &EnergyPriceHistory {
        &self.energy_price_history
    }

    pub fn set_energy_price_history(&mut self, history: EnergyPriceHistory) {
        self.energy_price_history = history;
    }

    /// Active car assignments.
    pub fn car_assignments(&self) -> &[CarAssignment] {
        &self.car_assignments
    }

    /// Every assignment made during the run, including removed ones.
    pub fn all_car_assignments(&self) -> &[CarAssignment] {
        &self.all_car_assignments
    }

    pub fn car_assignment_for_car(&self, car: u32) -> Option<CarAssignment> {
        self.car_assignments.iter().copied().find(|a| a.car == car)
    }

    pub fn car_assignment_for_station(&self, station: u32) -> Option<CarAssignment> {
        self.car_assignments
            .iter()
            .copied()
            .find(|a| a.station == station)
    }

    /// Stations without an active car assignment, in fuse-tree order.
    pub fn free_stations(&self) -> Vec<&ChargingStation> {
        self.fuse_tree
            .stations()
            .into_iter()
            .filter(|station| self.car_assignment_for_station(station.id).is_none())
            .collect()
    }

    /// Plugs `car` into `station`.
    ///
    /// # Errors
    ///
    /// * [`StateError::UnknownCar`] / [`StateError::UnknownStation`]
    /// * [`StateError::CarAlreadyAssigned`] if the car already has a station
    /// * [`StateError::StationOccupied`] if the station already has a car
    /// * [`StateError::CarNotAvailable`] if the car is not present at the
    ///   current time
    pub fn add_car_assignment(
        &mut self,
        car: u32,
        station: u32,
    ) -> Result<CarAssignment, StateError> {
        let car_ref = self.cars.get(&car).ok_or(StateError::UnknownCar(car))?;
        if !self.fuse_tree.contains_station(station) {
            return Err(StateError::UnknownStation(station));
        }
        if self.car_assignment_for_car(car).is_some() {
            return Err(StateError::CarAlreadyAssigned(car));
        }
        if self.car_assignment_for_station(station).is_some() {
            return Err(StateError::StationOccupied(station));
        }
        if !car_ref.is_available_at(self.current_seconds) {
            return Err(StateError::CarNotAvailable {
                car,
                time: self.current_seconds,
                arrival: car_ref.timestamp_arrival,
                departure: car_ref.timestamp_departure,
            });
        }

        let assignment = CarAssignment { car, station };
        self.car_assignments.push(assignment);
        self.all_car_assignments.push(assignment);
        self.remove_unassigned_car(car);
        Ok(assignment)
    }

    /// Unplugs `car`. Any power assignment of the car is dropped too.
    pub fn remove_car_assignment(&mut self, car: u32) -> Option<CarAssignment> {
        let index = self.car_assignments.iter().position(|a| a.car == car)?;
        self.remove_power_assignment(car);
        Some(self.car_assignments.remove(index))
    }

    pub fn power_assignments(&self) -> &[PowerAssignment] {
        &self.power_assignments
    }

    pub fn power_assignment_for_car(&self, car: u32) -> Option<&PowerAssignment> {
        self.power_assignments.iter().find(|p| p.car == car)
    }

    /// Adds a power assignment for a car without one.
    ///
    /// # Errors
    ///
    /// * [`StateError::CarNotAssigned`] if the car has no station
    /// * [`StateError::StationMismatch`] if the car sits at another station
    /// * [`StateError::PowerAlreadyAssigned`] if the car already draws power
    pub fn add_power_assignment(&mut self, power: PowerAssignment) -> Result<(), StateError> {
        self.check_power_target(&power)?;
        if self.power_assignment_for_car(power.car).is_some() {
            return Err(StateError::PowerAlreadyAssigned(power.car));
        }
        self.power_assignments.push(power);
        Ok(())
    }

    /// Inserts or replaces the power assignment of `power.car`.
    ///
    /// # Errors
    ///
    /// Same target checks as [`State::add_power_assignment`].
    pub fn set_power_assignment(&mut self, power: PowerAssignment) -> Result<(), StateError> {
        self.check_power_target(&power)?;
        match self.power_assignments.iter_mut().find(|p| p.car == power.car) {
            Some(existing) => *existing = power,
            None => self.power_assignments.push(power),
        }
        Ok(())
    }

    pub fn remove_power_assignment(&mut self, car: u32) -> Option<PowerAssignment> {
        let index = self.power_assignments.iter().position(|p| p.car == car)?;
        Some(self.power_assignments.remove(index))
    }

    /// Present cars without a station, in arrival order.
    pub fn unassigned_cars(&self) -> &[u32] {
        &self.unassigned_cars
    }

    pub fn add_unassigned_car(&mut self, car: u32) {
        if !self.unassigned_cars.contains(&car) {
            self.unassigned_cars.push(car);
        }
    }

    pub fn remove_unassigned_car(&mut self, car: u32) -> bool {
        let before = self.unassigned_cars.len();
        self.unassigned_cars.retain(|c| *c != car);
        self.unassigned_cars.len() != before
    }

    /// Active power assignments sorted by station, for diagnostics.
    pub fn sorted_power_assignments(&self) -> Vec<PowerAssignment> {
        let mut sorted = self.power_assignments.clone();
        sorted.sort_by_key(|p| (p.station, p.car));
        sorted
    }

    fn check_power_target(&self, power: &PowerAssignment) -> Result<(), StateError> {
        let assignment = self
            .car_assignment_for_car(power.car)
            .ok_or(StateError::CarNotAssigned(power.car))?;
        if assignment.station != power.station {
            return Err(StateError::StationMismatch {
                car: power.car,
                assigned: assignment.station,
                requested: power.station,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CarBuilder, Fuse};

    fn state_with_two_stations() -> State {
        let mut tree = FuseTree::new(Fuse::new(0, 100.0), 2);
        let root = tree.root();
        tree.add_station(root, ChargingStation::new(0)).expect("station");
        tree.add_station(root, ChargingStation::new(1)).expect("station");
        let mut state = State::new(tree, EnergyPriceHistory::default_curve(96), 0);
        for id in 0..3 {
            let car = CarBuilder::new(id)
                .availability(0, 3600)
                .build()
                .expect("valid car");
            state.insert_car(car).expect("new car");
        }
        state
    }

    #[test]
    fn duplicate_car_is_rejected() {
        let mut state = state_with_two_stations();
        let car = CarBuilder::new(1).build().expect("valid car");
        assert!(matches!(state.insert_car(car), Err(SimError::DuplicateCar(1))));
    }

    #[test]
    fn car_assignment_is_exclusive() {
        let mut state = state_with_two_stations();
        state.add_unassigned_car(0);
        state.add_car_assignment(0, 0).expect("free station");
        assert!(state.unassigned_cars().is_empty());
        assert_eq!(
            state.add_car_assignment(0, 1),
            Err(StateError::CarAlreadyAssigned(0))
        );
        assert_eq!(
            state.add_car_assignment(1, 0),
            Err(StateError::StationOccupied(0))
        );
        assert_eq!(state.add_car_assignment(9, 1), Err(StateError::UnknownCar(9)));
        assert_eq!(
            state.add_car_assignment(1, 9),
            Err(StateError::UnknownStation(9))
        );
        let free: Vec<u32> = state.free_stations().iter().map(|s| s.id).collect();
        assert_eq!(free, vec![1]);
    }

    #[test]
    fn car_must_be_present() {
        let mut state = state_with_two_stations();
        state.set_current_time(3601);
        assert!(matches!(
            state.add_car_assignment(0, 0),
            Err(StateError::CarNotAvailable { car: 0, time: 3601, .. })
        ));
    }

    #[test]
    fn power_assignment_requires_matching_car_assignment() {
        let mut state = state_with_two_stations();
        let power = PowerAssignment::new(0, 0, [16.0, 16.0, 16.0]);
        assert_eq!(
            state.add_power_assignment(power),
            Err(StateError::CarNotAssigned(0))
        );
        state.add_car_assignment(0, 0).expect("free station");
        assert_eq!(
            state.add_power_assignment(PowerAssignment::new(0, 1, [1.0, 1.0, 1.0])),
            Err(StateError::StationMismatch {
                car: 0,
                assigned: 0,
                requested: 1
            })
        );
        state.add_power_assignment(power).expect("assigned");
        assert_eq!(
            state.add_power_assignment(power),
            Err(StateError::PowerAlreadyAssigned(0))
        );

        let updated = PowerAssignment::new(0, 0, [8.0, 8.0, 8.0]);
        state.set_power_assignment(updated).expect("upsert");
        assert_eq!(state.power_assignments(), &[updated]);
        assert_eq!(state.power_assignment_for_car(0).map(|p| p.total()), Some(24.0));
    }

    #[test]
    fn removing_car_assignment_drops_power() {
        let mut state = state_with_two_stations();
        state.add_car_assignment(0, 0).expect("free station");
        state
            .add_power_assignment(PowerAssignment::new(0, 0, [1.0, 0.0, 0.0]))
            .expect("assigned");
        assert!(state.remove_car_assignment(0).is_some());
        assert!(state.power_assignments().is_empty());
        assert!(state.remove_car_assignment(0).is_none());
        assert_eq!(state.all_car_assignments().len(), 1);
    }

    #[test]
    fn unassigned_cars_keep_order_without_duplicates() {
        let mut state = state_with_two_stations();
        state.add_unassigned_car(2);
        state.add_unassigned_car(1);
        state.add_unassigned_car(2);
        assert_eq!(state.unassigned_cars(), &[2, 1]);
        assert!(state.remove_unassigned_car(2));
        assert!(!state.remove_unassigned_car(2));
    }
}
