//! Domain model: vehicles, charging stations, the fuse tree and prices.

pub mod car;
pub mod energy;
pub mod fuse_tree;
pub mod prices;
pub mod station;

pub use car::{Car, CarBuilder, CarModel, CarType};
pub use energy::Phase;
pub use fuse_tree::{Fuse, FuseTree, FuseTreeNode, NodeId};
pub use prices::EnergyPriceHistory;
pub use station::{ChargingStation, PhaseMatching};
