//! Error types for model construction, engine state changes, battery
//! simulation and simulation runs.

use thiserror::Error;

use crate::validation::Violation;

/// Invalid vehicle, station or price data.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("car n={car}: {used_phases} used phases * {per_phase} A per phase should equal {total} A ({field})")]
    PhaseSumMismatch {
        car: u32,
        field: &'static str,
        used_phases: f64,
        per_phase: f64,
        total: f64,
    },
    #[error("car n={car}: no usable phase")]
    NoUsablePhase { car: u32 },
    #[error("car n={car}: current capacity {current} Ah outside [0, {max}] Ah")]
    CapacityOutOfRange { car: u32, current: f64, max: f64 },
    #[error("car n={car}: arrival {arrival}s is after departure {departure}s")]
    ArrivalAfterDeparture { car: u32, arrival: u32, departure: u32 },
    #[error("node {node}: phase {phase} is not connected but rated {rating} A")]
    DisconnectedPhaseRated {
        node: String,
        phase: usize,
        rating: f64,
    },
    #[error("energy price history must contain at least one price")]
    EmptyPriceHistory,
    #[error("invalid variable name {0:?}")]
    InvalidVariableName(String),
    #[error("negative current {value} A in plan variable {name}")]
    NegativePlanCurrent { name: String, value: f64 },
}

/// Invalid fuse-tree modification.
#[derive(Debug, Error, PartialEq)]
pub enum TopologyError {
    #[error("charging station i={0} is already part of the fuse tree (added multiple times)")]
    DuplicateStation(u32),
    #[error("fuse l={0} is already part of the fuse tree")]
    DuplicateFuse(u32),
    #[error("charging station i={0} is unable to be added: no fuse accepts charging stations")]
    NoAttachmentPoint(u32),
    #[error("node {0} is a charging station and cannot have children")]
    NotAFuse(String),
    #[error("unknown fuse tree node index {0}")]
    UnknownNode(usize),
    #[error("fuse tree record must contain exactly one root fuse, found {0}")]
    InvalidRoot(usize),
}

/// Rejected change to the engine state.
#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    #[error("unknown car n={0}")]
    UnknownCar(u32),
    #[error("unknown charging station i={0}")]
    UnknownStation(u32),
    #[error("car n={0} is already assigned")]
    CarAlreadyAssigned(u32),
    #[error("charging station i={0} is already occupied")]
    StationOccupied(u32),
    #[error("car n={car} is not available at t={time} (arrival={arrival}, departure={departure})")]
    CarNotAvailable {
        car: u32,
        time: u32,
        arrival: u32,
        departure: u32,
    },
    #[error("car n={0} is not assigned to a charging station")]
    CarNotAssigned(u32),
    #[error("car n={car} is assigned to station i={assigned}, not i={requested}")]
    StationMismatch {
        car: u32,
        assigned: u32,
        requested: u32,
    },
    #[error("car n={0} already has a power assignment")]
    PowerAlreadyAssigned(u32),
}

/// Failure inside the nonlinear battery simulator.
#[derive(Debug, Error, PartialEq)]
pub enum BatteryError {
    #[error("initial state of charge {0} outside [0, 1]")]
    InitialSocOutOfRange(f64),
    #[error("step {step} already simulated, cannot start at {start}")]
    AlreadySimulated { step: u32, start: u32 },
    #[error("start {start} should equal step {step} to avoid holes in the simulation")]
    NonContiguous { step: u32, start: u32 },
    #[error("cannot rewind before step 0")]
    RewindBeforeStart,
    #[error("battery curve has an empty soc axis")]
    EmptyCurve,
    #[error("battery curve {curve} has {len} points, soc axis has {axis}")]
    CurveLengthMismatch {
        curve: &'static str,
        len: usize,
        axis: usize,
    },
    #[error("battery curve soc axis must be strictly increasing")]
    AxisNotIncreasing,
}

/// Error raised while constructing or running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("simulation has no events")]
    NoEvents,
    #[error("invalid simulation state at t={time}: {violation}")]
    InvalidState { time: u32, violation: Violation },
    #[error("simulation busy")]
    Busy,
    #[error("simulation aborted after an earlier failure")]
    Aborted,
    #[error("car n={0} is already part of the simulation")]
    DuplicateCar(u32),
    #[error("negative charge delta {ampere_hours} Ah for station i={station}")]
    NegativeDelta { station: u32, ampere_hours: f64 },
    #[error("policy error: {0}")]
    Policy(String),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Battery(#[from] BatteryError),
    #[error(transparent)]
    Model(#[from] ModelError),
}
