//! Accumulated charging results of a run.
//!
//! Delivered charge is stored as average current per (station, phase,
//! timeslot) plus dense per-car and per-station series indexed by absolute
//! timeslot. The accumulator renders into an [`InterchangeDocument`].

use std::collections::{BTreeMap, BTreeSet};

use crate::error::SimError;
use crate::io::interchange::{
    CarEntry, InterchangeDocument, ProblemInstance, Solution, StationEntry, Variable, VariableName,
};
use crate::model::energy::SECONDS_PER_TIMESLOT;
use crate::model::{Car, Phase};

use super::state::{CarAssignment, State};

/// Hours per timeslot, used to turn amp-hours into average amps.
const TIMESLOT_HOURS: f64 = SECONDS_PER_TIMESLOT as f64 / 3600.0;

/// Composite key of a `P` variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableKey {
    pub station: u32,
    pub phase: Phase,
    pub timeslot: usize,
}

#[derive(Debug, Clone)]
pub struct SimulationResult {
    efficiency: f64,
    series_len: usize,
    currents: BTreeMap<VariableKey, f64>,
    car_series: BTreeMap<u32, Vec<f64>>,
    station_series: BTreeMap<u32, Vec<f64>>,
    assignments: BTreeSet<(u32, u32)>,
}

impl SimulationResult {
    /// Creates an empty accumulator.
    ///
    /// # Arguments
    ///
    /// * `series_len` - Length of the dense series (last timeslot + 1)
    /// * `efficiency` - Charging efficiency used by [`SimulationResult::sum_charged`]
    pub fn new(series_len: usize, efficiency: f64) -> Self {
        Self {
            efficiency,
            series_len,
            currents: BTreeMap::new(),
            car_series: BTreeMap::new(),
            station_series: BTreeMap::new(),
            assignments: BTreeSet::new(),
        }
    }

    /// Adds `ampere_hours` delivered by `assignment` on a station phase
    /// during `timeslot`, as average current over the timeslot.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::NegativeDelta`] if `ampere_hours` is negative.
    pub fn add_delta(
        &mut self,
        assignment: CarAssignment,
        phase: Phase,
        timeslot: usize,
        ampere_hours: f64,
    ) -> Result<(), SimError> {
        if ampere_hours < 0.0 {
            return Err(SimError::NegativeDelta {
                station: assignment.station,
                ampere_hours,
            });
        }
        let amps = ampere_hours / TIMESLOT_HOURS;
        let key = VariableKey {
            station: assignment.station,
            phase,
            timeslot,
        };
        *self.currents.entry(key).or_default() += amps;

        let len = self.series_len.max(timeslot + 1);
        for series in [
            self.car_series.entry(assignment.car).or_default(),
            self.station_series.entry(assignment.station).or_default(),
        ] {
            if series.len() < len {
                series.resize(len, 0.0);
            }
            series[timeslot] += amps;
        }
        Ok(())
    }

    /// Records an assignment as an `X` variable.
    pub fn record_assignment(&mut self, assignment: CarAssignment) {
        self.assignments.insert((assignment.station, assignment.car));
    }

    /// Average current at `key`, zero if nothing was delivered.
    pub fn current(&self, key: VariableKey) -> f64 {
        self.currents.get(&key).copied().unwrap_or(0.0)
    }

    /// Per-timeslot current received by `car`, summed over phases.
    pub fn car_series(&self, car: u32) -> Option<&[f64]> {
        self.car_series.get(&car).map(Vec::as_slice)
    }

    /// Per-timeslot current delivered by `station`, summed over phases.
    pub fn station_series(&self, station: u32) -> Option<&[f64]> {
        self.station_series.get(&station).map(Vec::as_slice)
    }

    /// Amp-hours stored in batteries over the whole run.
    pub fn sum_charged(&self) -> f64 {
        self.currents.values().sum::<f64>() * self.efficiency * TIMESLOT_HOURS
    }

    /// Amp-hours stored in `car` at `station` within its availability window.
    pub fn sum_charged_for_car(&self, car: &Car, station: u32) -> f64 {
        let total: f64 = self
            .currents
            .iter()
            .filter(|(key, _)| {
                key.station == station
                    && (car.first_available_timeslot..=car.last_available_timeslot)
                        .contains(&key.timeslot)
            })
            .map(|(_, amps)| amps)
            .sum();
        total * self.efficiency * TIMESLOT_HOURS
    }

    /// `X` variables first (by station, car), then `P` variables ordered by
    /// station, phase and timeslot.
    pub fn variables(&self) -> Vec<Variable> {
        let mut variables: Vec<Variable> = self
            .assignments
            .iter()
            .map(|&(station, car)| Variable::new(VariableName::X { station, car }, 1.0))
            .collect();
        variables.extend(self.currents.iter().map(|(key, amps)| {
            Variable::new(
                VariableName::P {
                    station: key.station,
                    phase: key.phase,
                    timeslot: key.timeslot,
                },
                *amps,
            )
        }));
        variables
    }

    /// Renders the run as an interchange document.
    ///
    /// # Arguments
    ///
    /// * `state` - Final engine state providing the problem instance
    /// * `method` - Name of the scheduling policy
    /// * `time_problem_construction` - Setup time (s)
    /// * `time_solution` - Simulation time (s)
    pub fn to_document(
        &self,
        state: &State,
        method: &str,
        time_problem_construction: f64,
        time_solution: f64,
    ) -> InterchangeDocument {
        let cars = state
            .cars()
            .map(|car| CarEntry {
                car: car.clone(),
                input_currents: self.dense(self.car_series.get(&car.id)),
            })
            .collect();
        let charging_stations = state
            .fuse_tree()
            .stations()
            .into_iter()
            .map(|station| StationEntry {
                name: station.name(),
                station: station.clone(),
                output_currents: self.dense(self.station_series.get(&station.id)),
            })
            .collect();

        InterchangeDocument {
            problem_instance: ProblemInstance {
                energy_price_history: state.energy_price_history().clone(),
                charging_stations,
                cars,
                fuse_tree: state.fuse_tree().clone(),
            },
            solution: Solution {
                variables: self.variables(),
                time_problem_construction,
                time_solution,
                method: method.to_string(),
            },
        }
    }

    fn dense(&self, series: Option<&Vec<f64>>) -> Vec<f64> {
        let mut dense = series.cloned().unwrap_or_default();
        if dense.len() < self.series_len {
            dense.resize(self.series_len, 0.0);
        }
        dense
    }
}
