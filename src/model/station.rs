//! Charging stations and their phase wiring.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

use super::car::Car;
use super::energy::Phase;

/// Default per-phase rating of a charging station (A).
pub const DEFAULT_STATION_FUSE: f64 = 32.0;

/// Grid phase fed by each station phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseMatching {
    pub phase1: Phase,
    pub phase2: Phase,
    pub phase3: Phase,
}

impl PhaseMatching {
    /// Station phase `n` feeds grid phase `n`.
    pub const IDENTITY: PhaseMatching = PhaseMatching {
        phase1: Phase::Phase1,
        phase2: Phase::Phase2,
        phase3: Phase::Phase3,
    };

    /// Grid phase fed by `station_phase`.
    pub fn to_grid(&self, station_phase: Phase) -> Phase {
        match station_phase {
            Phase::Phase1 => self.phase1,
            Phase::Phase2 => self.phase2,
            Phase::Phase3 => self.phase3,
        }
    }

    /// Station phase feeding `grid_phase`, if any.
    pub fn to_station(&self, grid_phase: Phase) -> Option<Phase> {
        Phase::ALL
            .into_iter()
            .find(|phase| self.to_grid(*phase) == grid_phase)
    }

    /// Cyclic rotation by `offset`: station phase 1 feeds grid phase
    /// `(offset % 3) + 1` and the others follow in order.
    pub fn rotated(offset: usize) -> Self {
        let grid = |shift: usize| Phase::ALL[(offset + shift) % 3];
        Self {
            phase1: grid(0),
            phase2: grid(1),
            phase3: grid(2),
        }
    }
}

impl Default for PhaseMatching {
    fn default() -> Self {
        Self::IDENTITY
    }
}

fn connected() -> bool {
    true
}

/// A charging point with its own per-phase rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingStation {
    #[serde(rename = "indexI", alias = "id")]
    pub id: u32,
    pub fuse_phase1: f64,
    pub fuse_phase2: f64,
    pub fuse_phase3: f64,
    #[serde(default = "connected")]
    pub phase1_connected: bool,
    #[serde(default = "connected")]
    pub phase2_connected: bool,
    #[serde(default = "connected")]
    pub phase3_connected: bool,
    #[serde(default)]
    pub phase_matching: PhaseMatching,
    #[serde(rename = "isBEVAllowed", default = "connected")]
    pub is_bev_allowed: bool,
    #[serde(rename = "isPHEVAllowed", default = "connected")]
    pub is_phev_allowed: bool,
}

impl ChargingStation {
    /// Three-phase station rated 32 A per phase with identity phase matching.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            fuse_phase1: DEFAULT_STATION_FUSE,
            fuse_phase2: DEFAULT_STATION_FUSE,
            fuse_phase3: DEFAULT_STATION_FUSE,
            phase1_connected: true,
            phase2_connected: true,
            phase3_connected: true,
            phase_matching: PhaseMatching::IDENTITY,
            is_bev_allowed: true,
            is_phev_allowed: true,
        }
    }

    /// KeContact P30 wallbox: 32 A on all phases.
    pub fn ke_contact_p30(id: u32, phase_matching: PhaseMatching) -> Self {
        Self::new(id).with_phase_matching(phase_matching)
    }

    pub fn with_fuses(mut self, phase1: f64, phase2: f64, phase3: f64) -> Self {
        self.fuse_phase1 = phase1;
        self.fuse_phase2 = phase2;
        self.fuse_phase3 = phase3;
        self
    }

    pub fn with_connected(mut self, phase1: bool, phase2: bool, phase3: bool) -> Self {
        self.phase1_connected = phase1;
        self.phase2_connected = phase2;
        self.phase3_connected = phase3;
        self
    }

    pub fn with_phase_matching(mut self, phase_matching: PhaseMatching) -> Self {
        self.phase_matching = phase_matching;
        self
    }

    pub fn with_allowed(mut self, bev: bool, phev: bool) -> Self {
        self.is_bev_allowed = bev;
        self.is_phev_allowed = phev;
        self
    }

    pub fn name(&self) -> String {
        format!("i{}", self.id)
    }

    /// Rating of a station phase (A).
    pub fn fuse(&self, phase: Phase) -> f64 {
        self.fuses()[phase.index()]
    }

    pub fn fuses(&self) -> [f64; 3] {
        [self.fuse_phase1, self.fuse_phase2, self.fuse_phase3]
    }

    pub fn is_phase_connected(&self, phase: Phase) -> bool {
        match phase {
            Phase::Phase1 => self.phase1_connected,
            Phase::Phase2 => self.phase2_connected,
            Phase::Phase3 => self.phase3_connected,
        }
    }

    /// Whether the station admits the car's drive train.
    pub fn accepts(&self, car: &Car) -> bool {
        (car.is_bev() && self.is_bev_allowed) || (car.is_phev() && self.is_phev_allowed)
    }

    /// Checks that no disconnected phase carries a rating.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DisconnectedPhaseRated`] for the first offending phase.
    pub fn validate(&self) -> Result<(), ModelError> {
        check_disconnected_phases(&self.name(), self.fuses(), |phase| {
            self.is_phase_connected(phase)
        })
    }
}

pub(crate) fn check_disconnected_phases(
    node: &str,
    fuses: [f64; 3],
    is_connected: impl Fn(Phase) -> bool,
) -> Result<(), ModelError> {
    for phase in Phase::ALL {
        let rating = fuses[phase.index()];
        if !is_connected(phase) && rating > 0.0 {
            return Err(ModelError::DisconnectedPhaseRated {
                node: node.to_string(),
                phase: phase.number(),
                rating,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::car::{CarBuilder, CarType};

    #[test]
    fn phase_matching_inverse() {
        let matching = PhaseMatching::rotated(1);
        assert_eq!(matching.to_grid(Phase::Phase1), Phase::Phase2);
        assert_eq!(matching.to_grid(Phase::Phase3), Phase::Phase1);
        for phase in Phase::ALL {
            assert_eq!(matching.to_station(matching.to_grid(phase)), Some(phase));
        }
        assert_eq!(PhaseMatching::rotated(3), PhaseMatching::IDENTITY);
    }

    #[test]
    fn disconnected_phase_must_not_be_rated() {
        let station = ChargingStation::new(7).with_connected(true, false, true);
        assert_eq!(
            station.validate(),
            Err(ModelError::DisconnectedPhaseRated {
                node: "i7".into(),
                phase: 2,
                rating: 32.0
            })
        );
        let fixed = station.with_fuses(32.0, 0.0, 32.0);
        assert!(fixed.validate().is_ok());
    }

    #[test]
    fn accepts_by_car_type() {
        let station = ChargingStation::new(0).with_allowed(true, false);
        let bev = CarBuilder::new(0).build().expect("valid car");
        let phev = CarBuilder::new(1)
            .car_type(CarType::Phev)
            .build()
            .expect("valid car");
        assert!(station.accepts(&bev));
        assert!(!station.accepts(&phev));
    }

    #[test]
    fn json_round_trip_keeps_matching() {
        let station = ChargingStation::ke_contact_p30(3, PhaseMatching::rotated(2));
        let value = serde_json::to_value(&station).expect("serializable");
        assert_eq!(value["indexI"], 3);
        assert_eq!(value["phaseMatching"]["phase1"], "phase3");
        assert_eq!(value["isBEVAllowed"], true);
        let parsed: ChargingStation = serde_json::from_value(value).expect("deserializable");
        assert_eq!(parsed, station);
    }

    #[test]
    fn missing_connectivity_defaults_to_connected() {
        let json = r#"{"id": 4, "fusePhase1": 16, "fusePhase2": 16, "fusePhase3": 16}"#;
        let station: ChargingStation = serde_json::from_str(json).expect("deserializable");
        assert_eq!(station.id, 4);
        assert!(station.phase2_connected);
        assert_eq!(station.phase_matching, PhaseMatching::IDENTITY);
    }
}
