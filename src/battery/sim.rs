//! Resistor-only equivalent-circuit simulation of CC/CV and CP/CV charging.

use crate::error::BatteryError;
use crate::model::car::Car;
use crate::model::energy::{SECONDS_PER_TIMESLOT, ampere_hours};

use super::params::{BatterySimParameters, ChargeAlgorithm};

/// One recorded simulator sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatterySample {
    pub step: u32,
    pub soc: f64,
    /// Accepted current (A), positive while charging.
    pub current: f64,
    pub terminal_voltage: f64,
    pub open_circuit_voltage: f64,
    /// Charging power (W).
    pub power: f64,
    pub r0: f64,
}

/// Stateful one-second integrator for a single battery.
///
/// Every query may record a history sample at the current step when history
/// capture is enabled. History buffers are sized to the configured horizon
/// and indexed by absolute step.
///
/// # Examples
///
/// ```
/// use ev_charge_sim::battery::{BatterySim, BatterySimParameters};
///
/// let params = BatterySimParameters::default_params();
/// let mut sim = BatterySim::new(params, false, 1.0).unwrap();
///
/// // An empty sample cell accepts the full constant current.
/// assert_eq!(sim.current_at_soc(0.0, 200.0), 96.0);
/// sim.advance(200.0);
/// assert_eq!(sim.step(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct BatterySim {
    params: BatterySimParameters,
    efficiency: f64,
    step: u32,
    charged_ah: f64,
    soc: f64,
    next_current: f64,
    history: Option<Vec<Option<BatterySample>>>,
}

impl BatterySim {
    /// Creates a simulator at the parameters' initial step and SoC.
    ///
    /// # Arguments
    ///
    /// * `params` - Curve, charge algorithm and starting point
    /// * `record_history` - Whether every query stores a [`BatterySample`]
    /// * `efficiency` - Factor applied to each charged amp-hour (1.0 disables it)
    ///
    /// # Errors
    ///
    /// Returns [`BatteryError::InitialSocOutOfRange`] if the initial SoC lies
    /// outside `[0, 1]`.
    pub fn new(
        params: BatterySimParameters,
        record_history: bool,
        efficiency: f64,
    ) -> Result<Self, BatteryError> {
        if !(0.0..=1.0).contains(&params.initial_soc) {
            return Err(BatteryError::InitialSocOutOfRange(params.initial_soc));
        }
        let history = record_history.then(|| vec![None; params.horizon as usize]);
        Ok(Self {
            soc: params.initial_soc,
            step: params.initial_step,
            params,
            efficiency,
            charged_ah: 0.0,
            next_current: 0.0,
            history,
        })
    }

    /// Creates a simulator starting at the car's live SoC with a 24-hour horizon.
    ///
    /// # Errors
    ///
    /// Fails if the car's SoC lies outside `[0, 1]`.
    pub fn from_car(car: &Car, efficiency: f64) -> Result<Self, BatteryError> {
        Self::from_car_with_horizon(car, efficiency, crate::model::energy::SECONDS_PER_DAY)
    }

    /// Same as [`BatterySim::from_car`] with an explicit horizon in steps.
    pub fn from_car_with_horizon(
        car: &Car,
        efficiency: f64,
        horizon: u32,
    ) -> Result<Self, BatteryError> {
        let params = car
            .battery_params()
            .with_initial_soc(car.soc())
            .with_horizon(horizon);
        Self::new(params, false, efficiency)
    }

    /// Current (A) the battery accepts at `soc`, capped at `max_current_allowed`.
    ///
    /// Does not advance the simulator. With history capture enabled the sample
    /// is stored at the current step.
    pub fn current_at_soc(&mut self, soc: f64, max_current_allowed: f64) -> f64 {
        let data = &self.params.battery_data;
        let r0 = data.resistance_at(soc);
        let ocv = data.ocv_at(soc);
        let max_voltage = self.params.terminal_voltage;

        // Cell current, negative while charging.
        let mut ik = match self.params.charge_algorithm {
            ChargeAlgorithm::Cccv => ((ocv - max_voltage) / r0).max(-self.params.constant_current),
            ChargeAlgorithm::Cpcv => {
                let ik = (ocv - (ocv.powi(2) + 4.0 * r0 * self.params.constant_power).sqrt())
                    / (2.0 * r0);
                if ocv - ik * r0 > max_voltage {
                    (ocv - max_voltage) / r0
                } else {
                    ik
                }
            }
        };
        ik = ik.max(-max_current_allowed);

        if let Some(history) = self.history.as_mut() {
            if let Some(slot) = history.get_mut(self.step as usize) {
                let terminal_voltage = ocv - ik * r0;
                *slot = Some(BatterySample {
                    step: self.step,
                    soc,
                    current: -ik,
                    terminal_voltage,
                    open_circuit_voltage: ocv,
                    power: -ik * terminal_voltage,
                    r0,
                });
            }
        }
        -ik
    }

    /// Applies the accepted current at the current SoC for one second.
    pub fn advance(&mut self, max_current_allowed: f64) {
        let current = self.current_at_soc(self.soc, max_current_allowed);
        self.step += 1;
        let delta_ah = self.efficiency * ampere_hours(1, current);
        self.charged_ah += delta_ah;
        self.soc += delta_ah / self.params.capacity;
    }

    /// Steps one second back.
    ///
    /// Reuses the current accepted at the present SoC instead of the one at
    /// the previous second, so forward-then-back only approximately returns
    /// to the starting charge.
    ///
    /// # Errors
    ///
    /// Returns [`BatteryError::RewindBeforeStart`] at step 0.
    pub fn rewind(&mut self, max_current_allowed: f64) -> Result<(), BatteryError> {
        if self.step == 0 {
            return Err(BatteryError::RewindBeforeStart);
        }
        let current = self.current_at_soc(self.soc, max_current_allowed);
        self.next_current = current;
        self.step -= 1;
        let delta_ah = self.efficiency * ampere_hours(1, current);
        self.charged_ah -= delta_ah;
        self.soc -= delta_ah / self.params.capacity;
        Ok(())
    }

    /// Simulates the half-open range `start..end` one second at a time.
    ///
    /// When `car` carries a current plan, each second is further capped by
    /// `plan[timeslot] * sum_used_phases` unless the plan entry is unset or
    /// the timeslot equals `ignore_timeslot`. Afterwards the lookahead
    /// [`next_current`](Self::next_current) is computed with the static cap.
    ///
    /// # Errors
    ///
    /// * [`BatteryError::AlreadySimulated`] if the simulator is already past `start`
    /// * [`BatteryError::NonContiguous`] if the range would leave a gap
    pub fn run(
        &mut self,
        start: u32,
        end: u32,
        car: Option<&Car>,
        max_current_static: f64,
        ignore_timeslot: Option<usize>,
    ) -> Result<(), BatteryError> {
        if self.step > start {
            return Err(BatteryError::AlreadySimulated {
                step: self.step,
                start,
            });
        }
        if self.step != self.params.initial_step && start > self.step {
            return Err(BatteryError::NonContiguous {
                step: self.step,
                start,
            });
        }

        self.step = start;
        for second in start..end {
            let timeslot = (second / SECONDS_PER_TIMESLOT) as usize;
            let mut max_current = max_current_static;
            if let Some(car) = car {
                if ignore_timeslot != Some(timeslot) {
                    if let Some(planned) = car.plan_at(timeslot) {
                        max_current = max_current.min(planned * car.sum_used_phases());
                    }
                }
            }
            self.advance(max_current);
        }
        self.next_current = self.current_at_soc(self.soc, max_current_static);
        Ok(())
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// State of charge at the end of the last simulated second.
    pub fn soc(&self) -> f64 {
        self.soc
    }

    /// Charge (Ah) accumulated since construction.
    pub fn charged_ah(&self) -> f64 {
        self.charged_ah
    }

    /// Current (A) for the next second under the static cap of the last
    /// [`run`](Self::run) or [`rewind`](Self::rewind).
    pub fn next_current(&self) -> f64 {
        self.next_current
    }

    pub fn params(&self) -> &BatterySimParameters {
        &self.params
    }

    /// Recorded samples in step order. Empty without history capture.
    pub fn history(&self) -> impl Iterator<Item = &BatterySample> {
        self.history.iter().flatten().flatten()
    }
}
