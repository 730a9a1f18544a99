//! JSON interchange document shared with day-ahead optimizers.
//!
//! The document pairs a problem instance (prices, stations, cars, fuse tree)
//! with a solution made of named variables. `X_i{station}_n{car}` marks an
//! assignment, `P_i{station}_j{phase}_k{timeslot}` an average current.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::{Car, ChargingStation, EnergyPriceHistory, FuseTree, Phase};

/// A complete interchange document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterchangeDocument {
    pub problem_instance: ProblemInstance,
    pub solution: Solution,
}

impl InterchangeDocument {
    /// Reads a document from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid document.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Writes the document as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_json_file(&self, path: &Path) -> anyhow::Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Input data of a charging problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemInstance {
    pub energy_price_history: EnergyPriceHistory,
    pub charging_stations: Vec<StationEntry>,
    pub cars: Vec<CarEntry>,
    pub fuse_tree: FuseTree,
}

/// A car with the per-timeslot current it received.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarEntry {
    #[serde(flatten)]
    pub car: Car,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_currents: Vec<f64>,
}

/// A station with the per-timeslot current it delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationEntry {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub station: ChargingStation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_currents: Vec<f64>,
}

/// Variables of a solved instance plus timing metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub time_problem_construction: f64,
    #[serde(default)]
    pub time_solution: f64,
    #[serde(default)]
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub variable_name: String,
    pub variable_value: f64,
}

impl Variable {
    pub fn new(name: VariableName, value: f64) -> Self {
        Self {
            variable_name: name.to_string(),
            variable_value: value,
        }
    }

    /// # Errors
    ///
    /// Returns [`ModelError::InvalidVariableName`] for unknown encodings.
    pub fn name(&self) -> Result<VariableName, ModelError> {
        self.variable_name.parse()
    }
}

/// Decoded variable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableName {
    /// Car `car` is assigned to `station`.
    X { station: u32, car: u32 },
    /// Average current at `station` on `phase` during `timeslot`.
    P {
        station: u32,
        phase: Phase,
        timeslot: usize,
    },
}

impl fmt::Display for VariableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableName::X { station, car } => write!(f, "X_i{station}_n{car}"),
            VariableName::P {
                station,
                phase,
                timeslot,
            } => write!(f, "P_i{station}_j{}_k{timeslot}", phase.number()),
        }
    }
}

impl FromStr for VariableName {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ModelError::InvalidVariableName(s.to_string());
        let mut parts = s.split('_');
        let kind = parts.next().ok_or_else(invalid)?;
        let mut index = |prefix: char| -> Result<usize, ModelError> {
            parts
                .next()
                .and_then(|part| part.strip_prefix(prefix))
                .and_then(|digits| digits.parse().ok())
                .ok_or_else(invalid)
        };
        let name = match kind {
            "X" => {
                let station = index('i')?;
                let car = index('n')?;
                VariableName::X {
                    station: u32::try_from(station).map_err(|_| invalid())?,
                    car: u32::try_from(car).map_err(|_| invalid())?,
                }
            }
            "P" => {
                let station = index('i')?;
                let phase = Phase::from_number(index('j')?).ok_or_else(invalid)?;
                let timeslot = index('k')?;
                VariableName::P {
                    station: u32::try_from(station).map_err(|_| invalid())?,
                    phase,
                    timeslot,
                }
            }
            _ => return Err(invalid()),
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_names_encode_indices() {
        let x = VariableName::X { station: 3, car: 12 };
        assert_eq!(x.to_string(), "X_i3_n12");
        let p: VariableName = "P_i2_j3_k95".parse().expect("valid name");
        assert_eq!(
            p,
            VariableName::P {
                station: 2,
                phase: Phase::Phase3,
                timeslot: 95
            }
        );
    }

    #[test]
    fn malformed_names_are_rejected() {
        for name in ["", "X_i1", "P_i1_j4_k0", "Y_i1_n2", "X_i1_n2_k3", "X_n1_i2"] {
            assert_eq!(
                name.parse::<VariableName>(),
                Err(ModelError::InvalidVariableName(name.to_string())),
                "{name}"
            );
        }
    }

    #[test]
    fn solution_json_shape() {
        let solution = Solution {
            variables: vec![Variable::new(VariableName::X { station: 0, car: 1 }, 1.0)],
            time_problem_construction: 0.5,
            time_solution: 1.5,
            method: "realTimeGreedy".into(),
        };
        let value = serde_json::to_value(&solution).expect("serializable");
        assert_eq!(value["variables"][0]["variableName"], "X_i0_n1");
        assert_eq!(value["variables"][0]["variableValue"], 1.0);
        assert_eq!(value["timeProblemConstruction"], 0.5);
        assert_eq!(value["method"], "realTimeGreedy");
    }
}
