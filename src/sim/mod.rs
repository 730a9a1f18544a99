//! Second-granularity simulation: state, events, policies and the engine.

/// Simulation clock over the seconds of the horizon.
pub mod clock;
pub mod engine;
/// Timeline events and their ordering.
pub mod event;
pub mod kpi;
pub mod listener;
pub mod policy;
/// Accumulated charge per station, phase and timeslot.
pub mod result;
pub mod state;
pub mod types;

pub use engine::{SharedSimulation, Simulation};
pub use event::{Event, EventKind};
pub use kpi::RunReport;
pub use listener::{CurrentTraceListener, ListenerId, SimulationListener};
pub use policy::{DayAheadReplayPolicy, GreedyPolicy, IdlePolicy, SchedulingPolicy};
pub use result::SimulationResult;
pub use state::{CarAssignment, PowerAssignment, State};
pub use types::{PeriodicEvent, SimConfig};
