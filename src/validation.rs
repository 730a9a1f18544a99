//! Capacity validation of fuse trees and assignments.
//!
//! All checks are pure functions over a [`State`] snapshot. Each check comes
//! in a `Result` form that names the first violated rule and, where callers
//! only need to probe, a boolean form.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::model::energy::Phase;
use crate::model::{FuseTreeNode, NodeId};
use crate::sim::state::{CarAssignment, PowerAssignment, State};

/// Slack allowed on every current comparison (A).
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Identity of a fuse-tree node in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Fuse(u32),
    Station(u32),
}

impl NodeRef {
    fn of(node: &FuseTreeNode) -> Self {
        match node {
            FuseTreeNode::Fuse(fuse) => NodeRef::Fuse(fuse.id),
            FuseTreeNode::Station(station) => NodeRef::Station(station.id),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Fuse(id) => write!(f, "l{id}"),
            NodeRef::Station(id) => write!(f, "i{id}"),
        }
    }
}

/// A node whose aggregated current exceeds its rating on some phase.
#[derive(Debug, Clone, PartialEq)]
pub struct FuseOverload {
    pub node: NodeRef,
    /// Aggregated current per phase (A).
    pub consumed: [f64; 3],
    /// Rated current per phase (A).
    pub limits: [f64; 3],
    /// Timeslot checked, or `None` for the current second.
    pub timeslot: Option<usize>,
}

impl FuseOverload {
    /// Consumed minus rated current per phase.
    pub fn delta_by_phase(&self) -> [f64; 3] {
        [0, 1, 2].map(|i| self.consumed[i] - self.limits[i])
    }

    /// Phase exceeding its rating by the largest margin.
    pub fn phase_with_highest_delta(&self) -> Phase {
        let delta = self.delta_by_phase();
        Phase::ALL
            .into_iter()
            .fold(Phase::Phase1, |best, phase| {
                if delta[phase.index()] > delta[best.index()] {
                    phase
                } else {
                    best
                }
            })
    }

    /// Sum of the aggregated current over all phases.
    pub fn total_consumed(&self) -> f64 {
        self.consumed.iter().sum()
    }
}

impl fmt::Display for FuseOverload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fuse {} overloaded: consumed {:?} A, limits {:?} A",
            self.node, self.consumed, self.limits
        )?;
        match self.timeslot {
            Some(k) => write!(f, " at timeslot k={k}"),
            None => write!(f, " at the current second"),
        }
    }
}

/// Rule a power assignment can break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerRule {
    /// More than the station phase is rated for.
    StationLimit,
    /// More than the car can draw on the phase.
    CarLimit,
    /// Non-zero but below the car's minimum current.
    BelowMinimum,
    /// Phase currents not proportional to the car's usable phases.
    PhaseRatio,
}

impl fmt::Display for PowerRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PowerRule::StationLimit => "above station limit",
            PowerRule::CarLimit => "above car limit",
            PowerRule::BelowMinimum => "below car minimum",
            PowerRule::PhaseRatio => "phase ratio inconsistent with usable phases",
        };
        f.write_str(text)
    }
}

/// First rule found broken in a snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("{0}")]
    FuseOverload(FuseOverload),
    #[error("Car n={car} is already assigned.")]
    CarAssignedTwice { car: u32 },
    #[error("ChargingStation i={station} is already assigned.")]
    StationAssignedTwice { station: u32 },
    #[error(
        "power assignment n={car} i={station}: {rule} on phase {phase} ({value} A, limit {limit} A)"
    )]
    PowerAssignment {
        car: u32,
        station: u32,
        rule: PowerRule,
        phase: Phase,
        value: f64,
        limit: f64,
    },
    #[error("power assignment n={car} i={station} refers to an unknown car or station")]
    UnknownTarget { car: u32, station: u32 },
}

/// Stateless checker parameterised by its tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Validator {
    tolerance: f64,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl Validator {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Runs the fuse, exclusivity and power-assignment checks in that order.
    ///
    /// # Errors
    ///
    /// Returns the first [`Violation`] found.
    pub fn validate_state(&self, state: &State) -> Result<(), Violation> {
        self.check_fuse_tree(state, None, None)?;
        self.check_car_assignments(state.car_assignments())?;
        self.check_power_assignments(state)
    }

    pub fn is_state_valid(&self, state: &State) -> bool {
        self.validate_state(state).is_ok()
    }

    pub fn is_fuse_tree_valid(&self, state: &State) -> bool {
        self.check_fuse_tree(state, None, None).is_ok()
    }

    /// Whether the car plans at `timeslot` respect every rating.
    pub fn is_fuse_valid_at_timeslot(&self, state: &State, timeslot: usize) -> bool {
        self.check_fuse_tree(state, None, Some(timeslot)).is_ok()
    }

    /// Checks every node of the subtree rooted at `from` (default: root).
    ///
    /// Stations are checked against their own ratings on station phases.
    /// Their consumption is then mapped to grid phases and added to every
    /// ancestor within the subtree, whose ratings are checked bottom-up.
    ///
    /// # Arguments
    ///
    /// * `state` - Snapshot to check
    /// * `from` - Subtree root, or `None` for the whole tree
    /// * `timeslot` - Check car plans at this timeslot instead of the
    ///   current power assignments
    ///
    /// # Errors
    ///
    /// Returns [`Violation::FuseOverload`] for the first overloaded node.
    pub fn check_fuse_tree(
        &self,
        state: &State,
        from: Option<NodeId>,
        timeslot: Option<usize>,
    ) -> Result<(), Violation> {
        let tree = state.fuse_tree();
        let from = from.unwrap_or_else(|| tree.root());
        let order = tree.traverse(from);
        let mut consumed = vec![[0.0_f64; 3]; tree.len()];

        for &id in &order {
            let Some(station) = tree.node(id).and_then(FuseTreeNode::as_station) else {
                continue;
            };
            let local = station_consumption(state, station.id, timeslot);
            self.check_limits(NodeRef::Station(station.id), local, station.fuses(), timeslot)?;
            consumed[id.index()] = local;

            let grid = current_per_grid_phase(state, station.id, local);
            if id == from {
                continue;
            }
            for ancestor in tree.ancestors(id) {
                let total = &mut consumed[ancestor.index()];
                for (sum, value) in total.iter_mut().zip(grid) {
                    *sum += value;
                }
                if ancestor == from {
                    break;
                }
            }
        }

        for &id in order.iter().rev() {
            let Some(node) = tree.node(id) else {
                continue;
            };
            if let FuseTreeNode::Fuse(fuse) = node {
                self.check_limits(NodeRef::of(node), consumed[id.index()], fuse.fuses(), timeslot)?;
            }
        }
        Ok(())
    }

    /// Checks that no car and no station appears twice.
    ///
    /// # Errors
    ///
    /// Returns [`Violation::CarAssignedTwice`] or
    /// [`Violation::StationAssignedTwice`] for the first repetition.
    pub fn check_car_assignments(&self, assignments: &[CarAssignment]) -> Result<(), Violation> {
        let mut cars = HashSet::new();
        let mut stations = HashSet::new();
        for assignment in assignments {
            if !cars.insert(assignment.car) {
                return Err(Violation::CarAssignedTwice {
                    car: assignment.car,
                });
            }
            if !stations.insert(assignment.station) {
                return Err(Violation::StationAssignedTwice {
                    station: assignment.station,
                });
            }
        }
        Ok(())
    }

    /// Checks every active power assignment.
    ///
    /// # Errors
    ///
    /// Returns the first failing [`Violation::PowerAssignment`].
    pub fn check_power_assignments(&self, state: &State) -> Result<(), Violation> {
        state
            .power_assignments()
            .iter()
            .try_for_each(|power| self.check_power_assignment(state, power))
    }

    /// Checks one power assignment against the station rating, the car's
    /// limits and the car's usable-phase ratio.
    ///
    /// The ratio is only compared on station phases that reach the root of
    /// the fuse tree.
    ///
    /// # Errors
    ///
    /// Returns [`Violation::PowerAssignment`] naming the broken [`PowerRule`].
    pub fn check_power_assignment(
        &self,
        state: &State,
        power: &PowerAssignment,
    ) -> Result<(), Violation> {
        let (Some(car), Some(station)) = (state.car(power.car), state.station(power.station))
        else {
            return Err(Violation::UnknownTarget {
                car: power.car,
                station: power.station,
            });
        };
        let tol = self.tolerance;
        let fail = |rule, phase: Phase, value, limit| Violation::PowerAssignment {
            car: power.car,
            station: power.station,
            rule,
            phase,
            value,
            limit,
        };

        for phase in Phase::ALL {
            let value = power.phase(phase);
            let station_limit = station.fuse(phase);
            if value > station_limit + tol {
                return Err(fail(PowerRule::StationLimit, phase, value, station_limit));
            }
            let car_limit = car.can_load(phase) * car.max_current_per_phase;
            if value > car_limit + tol {
                return Err(fail(PowerRule::CarLimit, phase, value, car_limit));
            }
            if car.can_load(phase) > 0.0
                && value.abs() > tol
                && value < car.min_current_per_phase - tol
            {
                return Err(fail(
                    PowerRule::BelowMinimum,
                    phase,
                    value,
                    car.min_current_per_phase,
                ));
            }
        }

        let tree = state.fuse_tree();
        let connected: Vec<Phase> = Phase::ALL
            .into_iter()
            .filter(|phase| tree.is_station_phase_connected(station.id, *phase))
            .collect();
        let reference = connected
            .iter()
            .copied()
            .find(|phase| car.can_load(*phase) > 0.0);
        if let Some(reference) = reference {
            let reference_value = power.phase(reference);
            let reference_flag = car.can_load(reference);
            for phase in connected {
                let expected = reference_value * car.can_load(phase) / reference_flag;
                let value = power.phase(phase);
                if (value - expected).abs() > tol {
                    return Err(fail(PowerRule::PhaseRatio, phase, value, expected));
                }
            }
        }
        Ok(())
    }

    fn check_limits(
        &self,
        node: NodeRef,
        consumed: [f64; 3],
        limits: [f64; 3],
        timeslot: Option<usize>,
    ) -> Result<(), Violation> {
        let overloaded = consumed
            .iter()
            .zip(limits)
            .any(|(value, limit)| *value > limit + self.tolerance);
        if overloaded {
            return Err(Violation::FuseOverload(FuseOverload {
                node,
                consumed,
                limits,
                timeslot,
            }));
        }
        Ok(())
    }
}

/// Current per station phase drawn at `station`: the active power
/// assignment, or with `timeslot` set the assigned car's plan times its
/// usable-phase flags.
pub fn station_consumption(state: &State, station: u32, timeslot: Option<usize>) -> [f64; 3] {
    let Some(assignment) = state.car_assignment_for_station(station) else {
        return [0.0; 3];
    };
    match timeslot {
        None => state
            .power_assignment_for_car(assignment.car)
            .filter(|power| power.station == station)
            .map(PowerAssignment::phases)
            .unwrap_or([0.0; 3]),
        Some(k) => state
            .car(assignment.car)
            .map(|car| {
                let planned = car.plan_at(k).unwrap_or(0.0);
                car.can_load_phases().map(|flag| flag * planned)
            })
            .unwrap_or([0.0; 3]),
    }
}

/// Maps station-phase currents to grid phases. A grid phase only receives
/// current if the feeding station phase is connected through the whole tree.
pub fn current_per_grid_phase(state: &State, station: u32, local: [f64; 3]) -> [f64; 3] {
    let tree = state.fuse_tree();
    let Some(matching) = tree.station(station).map(|s| s.phase_matching) else {
        return [0.0; 3];
    };
    Phase::ALL.map(|grid_phase| match matching.to_station(grid_phase) {
        Some(station_phase) if tree.is_station_phase_connected(station, station_phase) => {
            local[station_phase.index()]
        }
        _ => 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CarBuilder, ChargingStation, EnergyPriceHistory, Fuse, FuseTree, PhaseMatching};

    fn state(tree: FuseTree, cars: Vec<crate::model::Car>) -> State {
        let mut state = State::new(tree, EnergyPriceHistory::default_curve(96), 0);
        for car in cars {
            state.insert_car(car).expect("new car");
        }
        state
    }

    fn three_phase_car(id: u32) -> crate::model::Car {
        CarBuilder::new(id)
            .max_current_per_phase(32.0)
            .availability(0, 86_399)
            .build()
            .expect("valid car")
    }

    #[test]
    fn station_overload_is_reported_before_fuses() {
        let mut tree = FuseTree::new(Fuse::new(0, 32.0), 1);
        let l1 = tree.add_fuse(tree.root(), Fuse::new(1, 32.0)).expect("fuse");
        let station = ChargingStation::new(0)
            .with_fuses(32.0, 0.0, 0.0)
            .with_connected(true, false, false);
        tree.add_station(l1, station).expect("station");
        let car = CarBuilder::new(0)
            .phases(1.0, 0.0, 0.0)
            .max_current_per_phase(64.0)
            .availability(0, 3600)
            .build()
            .expect("valid car");
        let mut state = state(tree, vec![car]);
        state.add_car_assignment(0, 0).expect("free station");
        state
            .set_power_assignment(PowerAssignment::new(0, 0, [33.0, 0.0, 0.0]))
            .expect("assigned");

        let err = Validator::default()
            .check_fuse_tree(&state, None, None)
            .expect_err("overloaded");
        let Violation::FuseOverload(overload) = err else {
            panic!("expected fuse overload, got {err:?}");
        };
        assert_eq!(overload.node, NodeRef::Station(0));
        assert_eq!(overload.consumed, [33.0, 0.0, 0.0]);
        assert_eq!(overload.phase_with_highest_delta(), Phase::Phase1);
        assert_eq!(overload.timeslot, None);
    }

    fn two_single_phase_cars(second_matching: PhaseMatching) -> State {
        let mut tree = FuseTree::new(Fuse::new(0, 40.0), 2);
        let root = tree.root();
        tree.add_station(root, ChargingStation::new(0)).expect("station");
        tree.add_station(root, ChargingStation::new(1).with_phase_matching(second_matching))
            .expect("station");
        let cars = (0..2)
            .map(|id| {
                CarBuilder::new(id)
                    .phases(1.0, 0.0, 0.0)
                    .max_current_per_phase(32.0)
                    .availability(0, 3600)
                    .build()
                    .expect("valid car")
            })
            .collect();
        let mut state = state(tree, cars);
        for id in 0..2 {
            state.add_car_assignment(id, id).expect("free");
            state
                .set_power_assignment(PowerAssignment::new(id, id, [30.0, 0.0, 0.0]))
                .expect("assigned");
        }
        state
    }

    #[test]
    fn fuses_aggregate_grid_phases() {
        let validator = Validator::default();
        // Station 1 feeds grid phase 2, so the root sees 30 A on two phases.
        let rotated = two_single_phase_cars(PhaseMatching::rotated(1));
        assert!(validator.is_fuse_tree_valid(&rotated));

        let identity = two_single_phase_cars(PhaseMatching::IDENTITY);
        let err = validator
            .check_fuse_tree(&identity, None, None)
            .expect_err("both cars on grid phase 1");
        assert_eq!(
            err,
            Violation::FuseOverload(FuseOverload {
                node: NodeRef::Fuse(0),
                consumed: [60.0, 0.0, 0.0],
                limits: [40.0; 3],
                timeslot: None,
            })
        );
    }

    #[test]
    fn root_overload_sums_children() {
        let mut tree = FuseTree::new(Fuse::new(0, 50.0), 2);
        let root = tree.root();
        tree.add_station(root, ChargingStation::new(0)).expect("station");
        tree.add_station(root, ChargingStation::new(1)).expect("station");
        let mut state = state(tree, vec![three_phase_car(0), three_phase_car(1)]);
        state.add_car_assignment(0, 0).expect("free");
        state.add_car_assignment(1, 1).expect("free");
        for (car, station) in [(0, 0), (1, 1)] {
            state
                .set_power_assignment(PowerAssignment::new(car, station, [30.0; 3]))
                .expect("assigned");
        }
        let err = Validator::default()
            .check_fuse_tree(&state, None, None)
            .expect_err("overloaded");
        let Violation::FuseOverload(overload) = err else {
            panic!("expected fuse overload, got {err:?}");
        };
        assert_eq!(overload.node, NodeRef::Fuse(0));
        assert_eq!(overload.consumed, [60.0; 3]);
        assert_eq!(overload.delta_by_phase(), [10.0; 3]);
        assert_eq!(overload.total_consumed(), 180.0);

        // A subtree check rooted at a station ignores the root fuse.
        let station_node = state.fuse_tree().station_node(0).expect("attached");
        assert!(Validator::default()
            .check_fuse_tree(&state, Some(station_node), None)
            .is_ok());
    }

    #[test]
    fn tolerance_allows_rounding_noise() {
        let mut tree = FuseTree::new(Fuse::new(0, 32.0), 1);
        let root = tree.root();
        tree.add_station(root, ChargingStation::new(0)).expect("station");
        let mut state = state(tree, vec![three_phase_car(0)]);
        state.add_car_assignment(0, 0).expect("free");
        state
            .set_power_assignment(PowerAssignment::new(0, 0, [32.0 + 5e-7; 3]))
            .expect("assigned");
        assert!(Validator::default().is_state_valid(&state));
        assert!(!Validator::new(1e-9).is_state_valid(&state));
    }

    #[test]
    fn timeslot_check_uses_plans() {
        let mut tree = FuseTree::new(Fuse::new(0, 20.0), 1);
        let root = tree.root();
        tree.add_station(root, ChargingStation::new(0)).expect("station");
        let mut car = three_phase_car(0);
        car.current_plan = Some(vec![10.0, 25.0, -1.0]);
        let mut state = state(tree, vec![car]);
        state.add_car_assignment(0, 0).expect("free");
        let validator = Validator::default();
        assert!(validator.is_fuse_valid_at_timeslot(&state, 0));
        // 25 A exceeds the 20 A root but not the 32 A station.
        let err = validator
            .check_fuse_tree(&state, None, Some(1))
            .expect_err("overloaded");
        assert!(matches!(
            err,
            Violation::FuseOverload(FuseOverload {
                node: NodeRef::Fuse(0),
                timeslot: Some(1),
                ..
            })
        ));
        assert!(validator.is_fuse_valid_at_timeslot(&state, 2));
        // No power assignment means nothing flows right now.
        assert!(validator.is_fuse_tree_valid(&state));
    }

    #[test]
    fn duplicate_assignments_are_rejected() {
        let validator = Validator::default();
        let a = CarAssignment { car: 0, station: 0 };
        let b = CarAssignment { car: 1, station: 0 };
        let c = CarAssignment { car: 0, station: 1 };
        assert!(validator.check_car_assignments(&[a]).is_ok());
        assert_eq!(
            validator.check_car_assignments(&[a, b]),
            Err(Violation::StationAssignedTwice { station: 0 })
        );
        assert_eq!(
            validator.check_car_assignments(&[a, c]),
            Err(Violation::CarAssignedTwice { car: 0 })
        );
        assert_eq!(
            Violation::StationAssignedTwice { station: 0 }.to_string(),
            "ChargingStation i=0 is already assigned."
        );
    }

    fn power_rule(state: &State, phases: [f64; 3]) -> Option<PowerRule> {
        let power = PowerAssignment::new(0, 0, phases);
        match Validator::default().check_power_assignment(state, &power) {
            Ok(()) => None,
            Err(Violation::PowerAssignment { rule, .. }) => Some(rule),
            Err(other) => panic!("unexpected violation {other:?}"),
        }
    }

    #[test]
    fn power_assignment_rules() {
        let mut tree = FuseTree::new(Fuse::new(0, 100.0), 1);
        let root = tree.root();
        tree.add_station(root, ChargingStation::new(0).with_fuses(32.0, 32.0, 16.0))
            .expect("station");
        let car = CarBuilder::new(0)
            .phases(1.0, 1.0, 0.0)
            .max_current_per_phase(20.0)
            .min_current_per_phase(6.0)
            .availability(0, 3600)
            .build()
            .expect("valid car");
        let mut state = state(tree, vec![car]);
        state.add_car_assignment(0, 0).expect("free");

        assert_eq!(power_rule(&state, [20.0, 20.0, 0.0]), None);
        assert_eq!(power_rule(&state, [0.0, 0.0, 0.0]), None);
        assert_eq!(power_rule(&state, [21.0, 21.0, 0.0]), Some(PowerRule::CarLimit));
        assert_eq!(power_rule(&state, [0.0, 0.0, 17.0]), Some(PowerRule::StationLimit));
        assert_eq!(power_rule(&state, [0.0, 0.0, 1.0]), Some(PowerRule::CarLimit));
        assert_eq!(power_rule(&state, [3.0, 3.0, 0.0]), Some(PowerRule::BelowMinimum));
        assert_eq!(power_rule(&state, [10.0, 8.0, 0.0]), Some(PowerRule::PhaseRatio));
    }

    #[test]
    fn phase_ratio_ignores_unconnected_station_phases() {
        let mut tree = FuseTree::new(Fuse::new(0, 100.0), 1);
        let root = tree.root();
        let single_phase = ChargingStation::new(0)
            .with_fuses(32.0, 0.0, 0.0)
            .with_connected(true, false, false);
        tree.add_station(root, single_phase).expect("station");
        let mut state = state(tree, vec![three_phase_car(0)]);
        state.add_car_assignment(0, 0).expect("free");

        assert_eq!(power_rule(&state, [10.0, 0.0, 0.0]), None);
    }

    #[test]
    fn validate_state_reports_unknown_targets() {
        let mut tree = FuseTree::new(Fuse::new(0, 100.0), 1);
        let root = tree.root();
        tree.add_station(root, ChargingStation::new(0)).expect("station");
        let state = state(tree, vec![]);
        let power = PowerAssignment::new(7, 0, [1.0, 1.0, 1.0]);
        assert_eq!(
            Validator::default().check_power_assignment(&state, &power),
            Err(Violation::UnknownTarget { car: 7, station: 0 })
        );
    }
}
