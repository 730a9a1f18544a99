//! Sources of problem instances.
//!
//! A [`DataProvider`] supplies cars, stations, the fuse tree and prices. Where
//! the data comes from is opaque to the engine.

pub mod file;
pub mod random;

pub use file::InstanceFile;
pub use random::RandomDataGenerator;

use crate::model::{Car, ChargingStation, EnergyPriceHistory, FuseTree};

/// Problem instance consumed by [`Simulation::from_provider`](crate::sim::Simulation::from_provider).
pub trait DataProvider {
    fn cars(&self) -> Vec<Car>;

    fn charging_stations(&self) -> Vec<ChargingStation>;

    /// Fuse tree, usually already holding the stations.
    fn fuse_tree(&self) -> FuseTree;

    fn energy_price_history(&self) -> EnergyPriceHistory;
}
