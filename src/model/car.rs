//! Electric vehicles, their charging limits and charge bookkeeping.

use serde::{Deserialize, Serialize};

use crate::battery::{BatterySim, BatterySimParameters};
use crate::error::{BatteryError, ModelError};

use super::energy::{
    Phase, SECONDS_PER_TIMESLOT, TIMESLOTS_PER_DAY, ampere_hours, current_from_power,
};

/// Tolerance below which a car counts as fully charged (Ah).
pub const FULLY_CHARGED_EPSILON: f64 = 1e-9;

/// Drive train of a vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarType {
    #[default]
    #[serde(rename = "BEV")]
    Bev,
    #[serde(rename = "PHEV")]
    Phev,
}

/// Known vehicle models with their battery and charger characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarModel {
    TeslaModelS,
    NissanLeaf2016,
    BmwI3_2017,
    MercedesGlc350e,
    RenaultZoeR240,
    RenaultZoeZe40,
}

/// Static characteristics of a [`CarModel`]. Currents are totals over all
/// used phases.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub model_name: &'static str,
    pub car_type: CarType,
    /// Capacity (Ah).
    pub max_capacity: f64,
    pub min_current: f64,
    pub max_current: f64,
    pub phases: [f64; 3],
    pub suspendable: bool,
    pub can_use_variable_power: bool,
    pub immediate_start: bool,
}

impl CarModel {
    pub const ALL: [CarModel; 6] = [
        CarModel::TeslaModelS,
        CarModel::NissanLeaf2016,
        CarModel::BmwI3_2017,
        CarModel::MercedesGlc350e,
        CarModel::RenaultZoeR240,
        CarModel::RenaultZoeZe40,
    ];

    pub fn spec(self) -> ModelSpec {
        let kw = |p| current_from_power(p, 1);
        match self {
            CarModel::TeslaModelS => ModelSpec {
                model_name: "Tesla Model S85",
                car_type: CarType::Bev,
                max_capacity: kw(85.0),
                min_current: kw(3.0),
                max_current: kw(22.1),
                phases: [1.0, 1.0, 1.0],
                suspendable: false,
                can_use_variable_power: false,
                immediate_start: true,
            },
            CarModel::NissanLeaf2016 => ModelSpec {
                model_name: "Nissan Leaf 2016",
                car_type: CarType::Bev,
                max_capacity: kw(30.0),
                min_current: kw(1.4),
                max_current: kw(6.6),
                phases: [1.0, 0.0, 0.0],
                suspendable: false,
                can_use_variable_power: false,
                immediate_start: true,
            },
            CarModel::BmwI3_2017 => ModelSpec {
                model_name: "BMW i3 2017",
                car_type: CarType::Bev,
                max_capacity: 94.0,
                min_current: kw(1.4),
                max_current: kw(11.0),
                phases: [1.0, 1.0, 0.0],
                suspendable: true,
                can_use_variable_power: true,
                immediate_start: false,
            },
            CarModel::MercedesGlc350e => ModelSpec {
                model_name: "MERCEDES GLC 350e",
                car_type: CarType::Phev,
                max_capacity: kw(8.7),
                min_current: kw(1.0),
                max_current: kw(3.7),
                phases: [1.0, 0.0, 0.0],
                suspendable: false,
                can_use_variable_power: false,
                immediate_start: true,
            },
            CarModel::RenaultZoeR240 => ModelSpec {
                model_name: "Renault Zoe R240",
                car_type: CarType::Bev,
                max_capacity: 95.5,
                min_current: kw(1.0),
                max_current: kw(11.0),
                phases: [1.0, 1.0, 1.0],
                suspendable: true,
                can_use_variable_power: true,
                immediate_start: false,
            },
            CarModel::RenaultZoeZe40 => ModelSpec {
                model_name: "Renault Zoe ZE40",
                car_type: CarType::Bev,
                max_capacity: 65.6,
                min_current: 0.0,
                max_current: 96.0,
                phases: [1.0, 1.0, 1.0],
                suspendable: true,
                can_use_variable_power: true,
                immediate_start: false,
            },
        }
    }
}

/// A vehicle taking part in a simulation.
///
/// Currents are in amps, capacities in amp-hours. Per-phase currents times
/// the sum of usable-phase flags equal the totals. The current plan holds one
/// per-phase current per timeslot; negative entries are unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Car {
    #[serde(rename = "indexN", alias = "id")]
    pub id: u32,
    pub name: String,
    pub model_name: String,
    pub car_type: CarType,
    pub max_capacity: f64,
    #[serde(alias = "startCapacity")]
    pub cur_capacity: f64,
    pub charged_capacity: f64,
    pub min_loading_state: f64,
    pub min_current: f64,
    pub min_current_per_phase: f64,
    pub max_current: f64,
    pub max_current_per_phase: f64,
    pub can_load_phase1: f64,
    pub can_load_phase2: f64,
    pub can_load_phase3: f64,
    pub first_available_timeslot: usize,
    pub last_available_timeslot: usize,
    /// Arrival (seconds of day).
    pub timestamp_arrival: u32,
    /// Departure (seconds of day); 0 means the car never leaves.
    pub timestamp_departure: u32,
    pub immediate_start: bool,
    pub suspendable: bool,
    pub can_use_variable_power: bool,
    pub nonlinear_charging: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_plan: Option<Vec<f64>>,
    #[serde(skip)]
    battery_sim: Option<BatterySim>,
}

impl Car {
    pub fn can_load(&self, phase: Phase) -> f64 {
        self.can_load_phases()[phase.index()]
    }

    pub fn can_load_phases(&self) -> [f64; 3] {
        [self.can_load_phase1, self.can_load_phase2, self.can_load_phase3]
    }

    /// Sum of the usable-phase flags.
    pub fn sum_used_phases(&self) -> f64 {
        self.can_load_phase1 + self.can_load_phase2 + self.can_load_phase3
    }

    /// Planned per-phase current at `timeslot`, or `None` if unset.
    pub fn plan_at(&self, timeslot: usize) -> Option<f64> {
        self.current_plan
            .as_ref()
            .and_then(|plan| plan.get(timeslot).copied())
            .filter(|value| *value >= 0.0)
    }

    /// Per-phase current to charge with at `timeslot`.
    ///
    /// `None` when the car has no plan at all. With a plan, unset or missing
    /// entries mean 0 A.
    pub fn planned_current_per_phase(&self, timeslot: usize) -> Option<f64> {
        self.current_plan
            .as_ref()
            .map(|plan| plan.get(timeslot).copied().unwrap_or(0.0).max(0.0))
    }

    pub fn is_bev(&self) -> bool {
        self.car_type == CarType::Bev
    }

    pub fn is_phev(&self) -> bool {
        self.car_type == CarType::Phev
    }

    /// Whether the car is plugged in at `seconds`.
    pub fn is_available_at(&self, seconds: u32) -> bool {
        seconds >= self.timestamp_arrival
            && (self.timestamp_departure == 0 || seconds <= self.timestamp_departure)
    }

    /// Whether `timeslot` lies inside the availability window.
    pub fn is_available_in(&self, timeslot: usize) -> bool {
        (self.first_available_timeslot..=self.last_available_timeslot).contains(&timeslot)
    }

    /// State of charge including what was charged during this run.
    pub fn soc(&self) -> f64 {
        (self.cur_capacity + self.charged_capacity) / self.max_capacity
    }

    pub fn missing_capacity(&self) -> f64 {
        self.max_capacity - (self.cur_capacity + self.charged_capacity)
    }

    pub fn is_fully_charged(&self) -> bool {
        self.missing_capacity() <= FULLY_CHARGED_EPSILON
    }

    /// Battery parameters used for nonlinear charging, with this car's capacity.
    pub fn battery_params(&self) -> BatterySimParameters {
        self.battery_sim
            .as_ref()
            .map(|sim| sim.params().clone())
            .unwrap_or_else(BatterySimParameters::default_params)
            .with_capacity(self.max_capacity)
    }

    /// Switches the car to nonlinear charging with the given battery.
    ///
    /// # Errors
    ///
    /// Fails if the car's SoC lies outside `[0, 1]`.
    pub fn enable_nonlinear_charging(
        &mut self,
        params: BatterySimParameters,
    ) -> Result<(), BatteryError> {
        let params = params
            .with_capacity(self.max_capacity)
            .with_initial_soc(self.soc());
        self.battery_sim = Some(BatterySim::new(params, false, 1.0)?);
        self.nonlinear_charging = true;
        Ok(())
    }

    /// Current (A) the car accepts when offered `max_current_allowed`.
    ///
    /// # Errors
    ///
    /// Fails if nonlinear charging is on and the simulator cannot be created.
    pub fn accepted_current(&mut self, max_current_allowed: f64) -> Result<f64, BatteryError> {
        if !self.nonlinear_charging {
            return Ok(max_current_allowed);
        }
        if self.battery_sim.is_none() {
            self.enable_nonlinear_charging(BatterySimParameters::default_params())?;
        }
        let soc = self.soc();
        Ok(self
            .battery_sim
            .as_mut()
            .map_or(max_current_allowed, |sim| {
                sim.current_at_soc(soc, max_current_allowed)
            }))
    }

    /// Charges for `seconds` with at most `max_current_allowed` amps.
    ///
    /// The delivered charge is `efficiency * current * seconds / 3600` and is
    /// clipped so that stored capacity never exceeds the maximum.
    ///
    /// # Returns
    ///
    /// The amp-hours actually added.
    ///
    /// # Errors
    ///
    /// Fails if nonlinear charging is on and the simulator cannot be created.
    pub fn add_charged_capacity(
        &mut self,
        seconds: u32,
        max_current_allowed: f64,
        efficiency: f64,
    ) -> Result<f64, BatteryError> {
        let current = self.accepted_current(max_current_allowed)?;
        let before = self.charged_capacity;
        self.charged_capacity += efficiency * ampere_hours(seconds, current);
        if self.cur_capacity + self.charged_capacity >= self.max_capacity {
            self.charged_capacity = self.max_capacity - self.cur_capacity;
        }
        Ok(self.charged_capacity - before)
    }
}

/// Builder for [`Car`] that checks phase and capacity consistency.
///
/// # Examples
///
/// ```
/// use ev_charge_sim::model::car::{CarBuilder, CarModel};
///
/// let car = CarBuilder::new(0)
///     .model(CarModel::NissanLeaf2016)
///     .availability(8 * 3600, 17 * 3600)
///     .build()
///     .unwrap();
/// assert_eq!(car.sum_used_phases(), 1.0);
/// assert_eq!(car.first_available_timeslot, 32);
/// ```
#[derive(Debug, Clone)]
pub struct CarBuilder {
    car: Car,
    min_current: Option<f64>,
    min_current_per_phase: Option<f64>,
    max_current: Option<f64>,
    max_current_per_phase: Option<f64>,
    min_loading_state: Option<f64>,
    timeslots: Option<(usize, usize)>,
}

impl CarBuilder {
    /// Starts a three-phase BEV with 100 Ah capacity and 32 A per phase.
    pub fn new(id: u32) -> Self {
        Self {
            car: Car {
                id,
                name: format!("n{id}"),
                model_name: String::new(),
                max_capacity: 100.0,
                can_load_phase1: 1.0,
                can_load_phase2: 1.0,
                can_load_phase3: 1.0,
                suspendable: true,
                can_use_variable_power: true,
                ..Car::default()
            },
            min_current: None,
            min_current_per_phase: Some(0.0),
            max_current: None,
            max_current_per_phase: Some(32.0),
            min_loading_state: None,
            timeslots: None,
        }
    }

    /// Applies the characteristics of a known model.
    pub fn model(mut self, model: CarModel) -> Self {
        let spec = model.spec();
        self.car.model_name = spec.model_name.to_string();
        self.car.car_type = spec.car_type;
        self.car.max_capacity = spec.max_capacity;
        [
            self.car.can_load_phase1,
            self.car.can_load_phase2,
            self.car.can_load_phase3,
        ] = spec.phases;
        self.car.suspendable = spec.suspendable;
        self.car.can_use_variable_power = spec.can_use_variable_power;
        self.car.immediate_start = spec.immediate_start;
        self.min_current = Some(spec.min_current);
        self.min_current_per_phase = None;
        self.max_current = Some(spec.max_current);
        self.max_current_per_phase = None;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.car.name = name.into();
        self
    }

    pub fn car_type(mut self, car_type: CarType) -> Self {
        self.car.car_type = car_type;
        self
    }

    pub fn max_capacity(mut self, ampere_hours: f64) -> Self {
        self.car.max_capacity = ampere_hours;
        self
    }

    pub fn current_capacity(mut self, ampere_hours: f64) -> Self {
        self.car.cur_capacity = ampere_hours;
        self
    }

    pub fn min_loading_state(mut self, ampere_hours: f64) -> Self {
        self.min_loading_state = Some(ampere_hours);
        self
    }

    pub fn phases(mut self, phase1: f64, phase2: f64, phase3: f64) -> Self {
        self.car.can_load_phase1 = phase1;
        self.car.can_load_phase2 = phase2;
        self.car.can_load_phase3 = phase3;
        self
    }

    /// Total minimum current over all used phases.
    pub fn min_current(mut self, amps: f64) -> Self {
        self.min_current = Some(amps);
        self.min_current_per_phase = None;
        self
    }

    pub fn min_current_per_phase(mut self, amps: f64) -> Self {
        self.min_current_per_phase = Some(amps);
        self.min_current = None;
        self
    }

    /// Total maximum current over all used phases.
    pub fn max_current(mut self, amps: f64) -> Self {
        self.max_current = Some(amps);
        self.max_current_per_phase = None;
        self
    }

    pub fn max_current_per_phase(mut self, amps: f64) -> Self {
        self.max_current_per_phase = Some(amps);
        self.max_current = None;
        self
    }

    /// Sets arrival and departure (seconds of day). The availability window
    /// covers the timeslots containing both.
    pub fn availability(mut self, arrival: u32, departure: u32) -> Self {
        self.car.timestamp_arrival = arrival;
        self.car.timestamp_departure = departure;
        self
    }

    /// Overrides the availability window derived from arrival and departure.
    pub fn timeslots(mut self, first: usize, last: usize) -> Self {
        self.timeslots = Some((first, last));
        self
    }

    pub fn suspendable(mut self, suspendable: bool) -> Self {
        self.car.suspendable = suspendable;
        self
    }

    pub fn can_use_variable_power(mut self, variable: bool) -> Self {
        self.car.can_use_variable_power = variable;
        self
    }

    pub fn immediate_start(mut self, immediate: bool) -> Self {
        self.car.immediate_start = immediate;
        self
    }

    pub fn nonlinear_charging(mut self, nonlinear: bool) -> Self {
        self.car.nonlinear_charging = nonlinear;
        self
    }

    pub fn current_plan(mut self, plan: Vec<f64>) -> Self {
        self.car.current_plan = Some(plan);
        self
    }

    /// Finishes the car.
    ///
    /// # Errors
    ///
    /// * [`ModelError::NoUsablePhase`] if all phase flags are zero
    /// * [`ModelError::PhaseSumMismatch`] if explicit totals and per-phase
    ///   currents disagree
    /// * [`ModelError::CapacityOutOfRange`] if the stored capacity is negative
    ///   or above the maximum
    /// * [`ModelError::ArrivalAfterDeparture`] for an inverted window
    pub fn build(self) -> Result<Car, ModelError> {
        let mut car = self.car;
        let used = car.sum_used_phases();
        if used <= 0.0 {
            return Err(ModelError::NoUsablePhase { car: car.id });
        }

        (car.min_current, car.min_current_per_phase) =
            resolve_current(car.id, "minCurrent", used, self.min_current, self.min_current_per_phase)?;
        (car.max_current, car.max_current_per_phase) =
            resolve_current(car.id, "maxCurrent", used, self.max_current, self.max_current_per_phase)?;

        if car.cur_capacity < 0.0 || car.cur_capacity > car.max_capacity {
            return Err(ModelError::CapacityOutOfRange {
                car: car.id,
                current: car.cur_capacity,
                max: car.max_capacity,
            });
        }
        if car.timestamp_departure != 0 && car.timestamp_arrival > car.timestamp_departure {
            return Err(ModelError::ArrivalAfterDeparture {
                car: car.id,
                arrival: car.timestamp_arrival,
                departure: car.timestamp_departure,
            });
        }

        car.min_loading_state = self
            .min_loading_state
            .unwrap_or(car.max_capacity / 2.0)
            .clamp(0.0, car.max_capacity);
        (car.first_available_timeslot, car.last_available_timeslot) =
            self.timeslots.unwrap_or_else(|| {
                let last = match car.timestamp_departure {
                    0 => TIMESLOTS_PER_DAY - 1,
                    departure => (departure / SECONDS_PER_TIMESLOT) as usize,
                };
                ((car.timestamp_arrival / SECONDS_PER_TIMESLOT) as usize, last)
            });
        Ok(car)
    }
}

fn resolve_current(
    car: u32,
    field: &'static str,
    used_phases: f64,
    total: Option<f64>,
    per_phase: Option<f64>,
) -> Result<(f64, f64), ModelError> {
    match (total, per_phase) {
        (Some(total), Some(per_phase)) => {
            if (used_phases * per_phase - total).abs() > 1e-6 {
                return Err(ModelError::PhaseSumMismatch {
                    car,
                    field,
                    used_phases,
                    per_phase,
                    total,
                });
            }
            Ok((total, per_phase))
        }
        (Some(total), None) => Ok((total, total / used_phases)),
        (None, Some(per_phase)) => Ok((per_phase * used_phases, per_phase)),
        (None, None) => Ok((0.0, 0.0)),
    }
}
