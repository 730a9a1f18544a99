//! Tabulated battery curves and one-dimensional interpolation.

use serde::{Deserialize, Serialize};

use crate::error::BatteryError;

use super::params::ChargeAlgorithm;

/// Charge parameters a simulator starts from when built for a curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeDefaults {
    pub charge_algorithm: ChargeAlgorithm,
    /// Constant-current target (A).
    pub constant_current: f64,
    /// Constant-power target (W).
    pub constant_power: f64,
    /// Capacity (Ah).
    pub capacity: f64,
    /// Terminal voltage cap (V).
    pub terminal_voltage: f64,
}

impl Default for ChargeDefaults {
    fn default() -> Self {
        Self {
            charge_algorithm: ChargeAlgorithm::Cccv,
            constant_current: 96.0,
            constant_power: 343.8,
            capacity: 65.6,
            terminal_voltage: 4.166,
        }
    }
}

/// Open-circuit voltage and internal resistance tabulated over state of charge.
///
/// Both curves share the same SoC axis. When the axis starts at zero and is
/// equidistant, lookups compute the bracketing index directly instead of
/// running a binary search.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryData {
    soc: Vec<f64>,
    open_circuit_voltage: Vec<f64>,
    resistance: Vec<f64>,
    defaults: ChargeDefaults,
    #[serde(skip)]
    equidistant: bool,
}

const SAMPLE_OCV: [f64; 21] = [
    3.167, 3.413, 3.446, 3.488, 3.537, 3.571, 3.593, 3.610, 3.625, 3.642, 3.663, 3.695, 3.755,
    3.799, 3.846, 3.895, 3.945, 3.997, 4.051, 4.108, 4.166,
];

const SAMPLE_RESISTANCE: [f64; 21] = [
    0.00335, 0.00212, 0.00196, 0.0019, 0.00184, 0.00175, 0.00166, 0.00163, 0.0016, 0.00162,
    0.00164, 0.00166, 0.00168, 0.001695, 0.00171, 0.001715, 0.00172, 0.001725, 0.00173, 0.00175,
    0.00186,
];

impl BatteryData {
    /// Creates curve data from a shared SoC axis.
    ///
    /// # Errors
    ///
    /// * [`BatteryError::EmptyCurve`] if the axis is empty
    /// * [`BatteryError::CurveLengthMismatch`] if a curve differs in length
    ///   from the axis
    /// * [`BatteryError::AxisNotIncreasing`] if the axis is not strictly
    ///   increasing
    pub fn new(
        soc: Vec<f64>,
        open_circuit_voltage: Vec<f64>,
        resistance: Vec<f64>,
        defaults: ChargeDefaults,
    ) -> Result<Self, BatteryError> {
        if soc.is_empty() {
            return Err(BatteryError::EmptyCurve);
        }
        for (curve, values) in [
            ("openCircuitVoltage", &open_circuit_voltage),
            ("resistance", &resistance),
        ] {
            if values.len() != soc.len() {
                return Err(BatteryError::CurveLengthMismatch {
                    curve,
                    len: values.len(),
                    axis: soc.len(),
                });
            }
        }
        if !soc.windows(2).all(|w| w[0] < w[1]) {
            return Err(BatteryError::AxisNotIncreasing);
        }
        Ok(Self::from_checked(soc, open_circuit_voltage, resistance, defaults))
    }

    fn from_checked(
        soc: Vec<f64>,
        open_circuit_voltage: Vec<f64>,
        resistance: Vec<f64>,
        defaults: ChargeDefaults,
    ) -> Self {
        let equidistant = is_equidistant_from_zero(&soc);
        Self {
            soc,
            open_circuit_voltage,
            resistance,
            defaults,
            equidistant,
        }
    }

    /// Sample lithium-ion cell with 21 points over SoC 0..1 in steps of 0.05.
    pub fn sample() -> Self {
        let soc = (0..SAMPLE_OCV.len()).map(|i| i as f64 * 0.05).collect();
        Self::from_checked(
            soc,
            SAMPLE_OCV.to_vec(),
            SAMPLE_RESISTANCE.to_vec(),
            ChargeDefaults::default(),
        )
    }

    pub fn defaults(&self) -> &ChargeDefaults {
        &self.defaults
    }

    /// Open-circuit voltage (V) at `soc`.
    pub fn ocv_at(&self, soc: f64) -> f64 {
        self.interp1(&self.open_circuit_voltage, soc)
    }

    /// Internal resistance (Ohm) at `soc`.
    pub fn resistance_at(&self, soc: f64) -> f64 {
        self.interp1(&self.resistance, soc)
    }

    /// Highest tabulated open-circuit voltage.
    pub fn max_ocv(&self) -> f64 {
        self.open_circuit_voltage
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn is_equidistant(&self) -> bool {
        self.equidistant
    }

    /// Linear interpolation of `y` over the SoC axis. Values outside the axis
    /// return the nearest endpoint.
    fn interp1(&self, y: &[f64], xi: f64) -> f64 {
        let x = &self.soc;
        let n = x.len();
        let ip = self.upper_index(xi);
        if ip == 0 {
            return y[0];
        }
        if ip >= n {
            return y[n - 1];
        }
        let (x0, x1) = (x[ip - 1], x[ip]);
        let (y0, y1) = (y[ip - 1], y[ip]);
        y0 + (y1 - y0) * (xi - x0) / (x1 - x0)
    }

    /// First index whose axis value is `>= xi`, or `len` if there is none.
    fn upper_index(&self, xi: f64) -> usize {
        let x = &self.soc;
        let n = x.len();
        if !self.equidistant || n < 2 {
            return x.partition_point(|&v| v < xi);
        }

        let dx = x[1] - x[0];
        let guess = (xi / dx).ceil();
        let mut ip = if guess <= 0.0 {
            0
        } else {
            (guess as usize).min(n)
        };
        // Float rounding can leave the guess one slot off.
        while ip < n && x[ip] < xi {
            ip += 1;
        }
        while ip > 0 && x[ip - 1] >= xi {
            ip -= 1;
        }
        ip
    }
}

fn is_equidistant_from_zero(x: &[f64]) -> bool {
    if x.len() < 2 || x[0] != 0.0 {
        return false;
    }
    let dx = x[1] - x[0];
    x.windows(2).all(|w| ((w[1] - w[0]) - dx).abs() < 1e-12)
}
