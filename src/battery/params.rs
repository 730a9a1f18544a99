//! Parameters for the nonlinear battery simulator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::BatteryError;
use crate::model::energy::SECONDS_PER_DAY;

use super::data::{BatteryData, ChargeDefaults};

/// Charge algorithm driving the terminal voltage towards its cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeAlgorithm {
    /// Constant current until the voltage cap, then constant voltage.
    Cccv,
    /// Constant power until the voltage cap, then constant voltage.
    Cpcv,
}

impl ChargeAlgorithm {
    /// Parses the lowercase configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cccv" => Some(Self::Cccv),
            "cpcv" => Some(Self::Cpcv),
            _ => None,
        }
    }
}

/// Inputs for one [`BatterySim`](super::BatterySim) instance.
///
/// Cloning yields an independent copy; the curve data is shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct BatterySimParameters {
    pub battery_data: Arc<BatteryData>,
    /// State of charge at `initial_step`, within `[0, 1]`.
    pub initial_soc: f64,
    pub initial_step: u32,
    /// Capacity (Ah).
    pub capacity: f64,
    pub charge_algorithm: ChargeAlgorithm,
    /// Constant-current target (A).
    pub constant_current: f64,
    /// Constant-power target (W).
    pub constant_power: f64,
    /// Terminal voltage cap (V).
    pub terminal_voltage: f64,
    /// Number of steps covered by the history buffers.
    pub horizon: u32,
}

impl BatterySimParameters {
    /// Builds parameters from the defaults attached to `battery_data`, starting
    /// empty at step 0 with a 24-hour horizon.
    pub fn from_battery_data(battery_data: Arc<BatteryData>) -> Self {
        let defaults = battery_data.defaults().clone();
        Self {
            battery_data,
            initial_soc: 0.0,
            initial_step: 0,
            capacity: defaults.capacity,
            charge_algorithm: defaults.charge_algorithm,
            constant_current: defaults.constant_current,
            constant_power: defaults.constant_power,
            terminal_voltage: defaults.terminal_voltage,
            horizon: SECONDS_PER_DAY,
        }
    }

    /// Parameters for a cell given by its tabulated curves, with the default
    /// charge settings.
    ///
    /// # Errors
    ///
    /// Returns the curve problem reported by [`BatteryData::new`].
    pub fn from_curves(
        soc: Vec<f64>,
        open_circuit_voltage: Vec<f64>,
        resistance: Vec<f64>,
    ) -> Result<Self, BatteryError> {
        let data = BatteryData::new(
            soc,
            open_circuit_voltage,
            resistance,
            ChargeDefaults::default(),
        )?;
        Ok(Self::from_battery_data(Arc::new(data)))
    }

    /// Parameters for the bundled sample cell.
    pub fn default_params() -> Self {
        Self::from_battery_data(Arc::new(BatteryData::sample()))
    }

    pub fn with_initial_soc(mut self, soc: f64) -> Self {
        self.initial_soc = soc;
        self
    }

    pub fn with_initial_step(mut self, step: u32) -> Self {
        self.initial_step = step;
        self
    }

    pub fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_charge_algorithm(mut self, algorithm: ChargeAlgorithm) -> Self {
        self.charge_algorithm = algorithm;
        self
    }

    pub fn with_constant_current(mut self, current: f64) -> Self {
        self.constant_current = current;
        self
    }

    pub fn with_constant_power(mut self, power: f64) -> Self {
        self.constant_power = power;
        self
    }

    pub fn with_terminal_voltage(mut self, voltage: f64) -> Self {
        self.terminal_voltage = voltage;
        self
    }

    pub fn with_horizon(mut self, horizon: u32) -> Self {
        self.horizon = horizon;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_params_use_sample_defaults() {
        let params = BatterySimParameters::default_params();
        assert_eq!(params.charge_algorithm, ChargeAlgorithm::Cccv);
        assert_eq!(params.constant_current, 96.0);
        assert_eq!(params.constant_power, 343.8);
        assert_eq!(params.capacity, 65.6);
        assert_eq!(params.terminal_voltage, 4.166);
        assert_eq!(params.horizon, 86_400);
        assert_eq!(params.initial_soc, 0.0);
    }

    #[test]
    fn clones_do_not_share_step_state() {
        let params = BatterySimParameters::default_params().with_initial_step(10);
        let branch = params.clone().with_initial_step(20).with_initial_soc(0.5);
        assert_eq!(params.initial_step, 10);
        assert_eq!(params.initial_soc, 0.0);
        assert_eq!(branch.initial_step, 20);
        assert!(Arc::ptr_eq(&params.battery_data, &branch.battery_data));
    }

    #[test]
    fn custom_curves_are_checked() {
        let params = BatterySimParameters::from_curves(
            vec![0.0, 0.5, 1.0],
            vec![3.2, 3.7, 4.2],
            vec![0.002; 3],
        )
        .expect("valid curve");
        assert_relative_eq!(params.battery_data.ocv_at(0.25), 3.45, epsilon = 1e-12);
        assert_eq!(params.constant_current, 96.0);

        let err = BatterySimParameters::from_curves(vec![0.0, 1.0], vec![3.2], vec![0.002; 2])
            .expect_err("short ocv curve");
        assert!(matches!(err, BatteryError::CurveLengthMismatch { len: 1, .. }));
    }

    #[test]
    fn charge_algorithm_names() {
        assert_eq!(ChargeAlgorithm::from_name("cccv"), Some(ChargeAlgorithm::Cccv));
        assert_eq!(ChargeAlgorithm::from_name("cpcv"), Some(ChargeAlgorithm::Cpcv));
        assert_eq!(ChargeAlgorithm::from_name("cc"), None);
    }
}
