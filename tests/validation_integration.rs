mod common;

use common::{simulation, single_phase_car, single_phase_chain};
use ev_charge_sim::error::{SimError, StateError};
use ev_charge_sim::model::Phase;
use ev_charge_sim::sim::{CarAssignment, IdlePolicy, PowerAssignment, Simulation};
use ev_charge_sim::validation::{NodeRef, PowerRule, Validator, Violation};

fn chain_with_cars(stations: u32) -> Simulation {
    let cars = (0..stations).map(|id| single_phase_car(id, 0, 0)).collect();
    simulation(cars, single_phase_chain(32.0, stations), 1, IdlePolicy)
}

fn plug(sim: &mut Simulation, car: u32, station: u32, amps: f64) {
    let state = sim.state_mut();
    state.add_car_assignment(car, station).expect("free station");
    state
        .add_power_assignment(PowerAssignment::new(car, station, [amps, 0.0, 0.0]))
        .expect("assigned car");
}

#[test]
fn rated_current_is_accepted() {
    let mut sim = chain_with_cars(1);
    plug(&mut sim, 0, 0, 32.0);
    assert!(Validator::default().is_state_valid(sim.state()));
}

#[test]
fn overloaded_station_is_reported_first() {
    let mut sim = chain_with_cars(1);
    plug(&mut sim, 0, 0, 33.0);

    let validator = Validator::default();
    assert!(!validator.is_fuse_tree_valid(sim.state()));
    match validator.validate_state(sim.state()) {
        Err(Violation::FuseOverload(overload)) => {
            assert_eq!(overload.node, NodeRef::Station(0));
            assert_eq!(overload.phase_with_highest_delta(), Phase::Phase1);
            assert!((overload.delta_by_phase()[0] - 1.0).abs() < 1e-12);
        }
        other => panic!("expected a station overload, got {other:?}"),
    }
}

#[test]
fn shared_fuse_sums_its_stations() {
    let mut sim = chain_with_cars(2);
    plug(&mut sim, 0, 0, 20.0);
    plug(&mut sim, 1, 1, 20.0);

    match Validator::default().validate_state(sim.state()) {
        Err(Violation::FuseOverload(overload)) => {
            assert_eq!(overload.node, NodeRef::Fuse(1));
            assert!((overload.total_consumed() - 40.0).abs() < 1e-12);
        }
        other => panic!("expected a fuse overload, got {other:?}"),
    }
}

#[test]
fn tolerance_absorbs_rounding() {
    let mut sim = chain_with_cars(1);
    plug(&mut sim, 0, 0, 32.0 + 1e-7);
    assert!(Validator::default().is_state_valid(sim.state()));
    assert!(!Validator::new(1e-9).is_state_valid(sim.state()));
}

#[test]
fn station_cannot_take_two_cars() {
    let mut sim = chain_with_cars(2);
    let state = sim.state_mut();
    state.add_car_assignment(0, 0).expect("free station");
    assert_eq!(
        state.add_car_assignment(1, 0),
        Err(StateError::StationOccupied(0))
    );
    assert_eq!(
        state.add_car_assignment(0, 1),
        Err(StateError::CarAlreadyAssigned(0))
    );

    let twice = [
        CarAssignment { car: 0, station: 0 },
        CarAssignment { car: 1, station: 0 },
    ];
    assert_eq!(
        Validator::default().check_car_assignments(&twice),
        Err(Violation::StationAssignedTwice { station: 0 })
    );
}

#[test]
fn current_on_an_unrated_station_phase_is_rejected() {
    let mut sim = chain_with_cars(1);
    sim.state_mut()
        .add_car_assignment(0, 0)
        .expect("free station");
    sim.state_mut()
        .add_power_assignment(PowerAssignment::new(0, 0, [10.0, 5.0, 0.0]))
        .expect("assigned car");
    let state = sim.state();
    let power = state.power_assignments()[0];
    match Validator::default().check_power_assignment(state, &power) {
        Err(Violation::PowerAssignment { rule, phase, .. }) => {
            assert_eq!(rule, PowerRule::StationLimit);
            assert_eq!(phase, Phase::Phase2);
        }
        other => panic!("expected a power-assignment violation, got {other:?}"),
    }
}

#[test]
fn unknown_station_is_rejected() {
    let mut sim = chain_with_cars(1);
    let err = sim
        .state_mut()
        .add_car_assignment(0, 9)
        .map_err(SimError::from)
        .expect_err("no such station");
    assert!(matches!(err, SimError::State(StateError::UnknownStation(9))));
}
