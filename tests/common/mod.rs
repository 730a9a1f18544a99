//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use ev_charge_sim::model::{Car, CarBuilder, ChargingStation, EnergyPriceHistory, Fuse, FuseTree};
use ev_charge_sim::sim::{SchedulingPolicy, SimConfig, Simulation};

/// Root fuse rated `root_amps` with a single 32 A station `i=0` below it.
pub fn one_station_tree(root_amps: f64) -> FuseTree {
    let mut tree = FuseTree::new(Fuse::new(0, root_amps), 1);
    let root = tree.root();
    tree.add_station(root, ChargingStation::new(0))
        .expect("fresh tree accepts a station");
    tree
}

/// Root, one intermediate fuse and `stations` stations below it, every
/// node rated `amps` on phase 1 only.
pub fn single_phase_chain(amps: f64, stations: u32) -> FuseTree {
    let fuse = |id| {
        Fuse::new(id, amps)
            .with_connected(true, false, false)
            .with_fuses(amps, 0.0, 0.0)
    };
    let mut tree = FuseTree::new(fuse(0), stations as usize);
    let root = tree.root();
    let middle = tree.add_fuse(root, fuse(1)).expect("fuse below root");
    for id in 0..stations {
        let station = ChargingStation::new(id)
            .with_connected(true, false, false)
            .with_fuses(amps, 0.0, 0.0);
        tree.add_station(middle, station).expect("station below fuse");
    }
    tree
}

/// Car drawing up to 32 A on phase 1 only, empty 100 Ah battery.
pub fn single_phase_car(id: u32, arrival: u32, departure: u32) -> Car {
    single_phase_builder(id, arrival, departure)
        .build()
        .expect("valid car")
}

pub fn single_phase_builder(id: u32, arrival: u32, departure: u32) -> CarBuilder {
    CarBuilder::new(id)
        .phases(1.0, 0.0, 0.0)
        .max_current_per_phase(32.0)
        .availability(arrival, departure)
}

/// Simulation over the first `timeslots` timeslots of the day.
pub fn simulation(
    cars: Vec<Car>,
    tree: FuseTree,
    timeslots: usize,
    policy: impl SchedulingPolicy + 'static,
) -> Simulation {
    Simulation::new(
        SimConfig::new(timeslots, 0),
        cars,
        Vec::new(),
        tree,
        EnergyPriceHistory::default_curve(96),
        policy,
    )
    .expect("valid simulation")
}
