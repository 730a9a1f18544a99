//! Nonlinear battery charge model.
//!
//! [`BatteryData`] holds the tabulated open-circuit voltage and internal
//! resistance curves, [`BatterySimParameters`] selects the charge algorithm
//! and starting point, and [`BatterySim`] integrates the accepted current
//! one second at a time.

pub mod data;
pub mod params;
pub mod sim;

pub use data::{BatteryData, ChargeDefaults};
pub use params::{BatterySimParameters, ChargeAlgorithm};
pub use sim::{BatterySample, BatterySim};
