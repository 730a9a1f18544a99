//! Second-by-second simulation of electric-vehicle charging below a
//! hierarchical fuse tree.

pub mod battery;
pub mod cli;
pub mod config;
/// Problem-instance providers.
pub mod data;
pub mod error;
pub mod io;
/// Cars, charging stations, fuse trees and energy prices.
pub mod model;
pub mod runner;
/// Simulation engine, state, events, policies and listeners.
pub mod sim;
pub mod telemetry;
pub mod validation;
