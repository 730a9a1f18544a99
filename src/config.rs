//! Scenario files and built-in presets for charging runs.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::battery::{BatterySimParameters, ChargeAlgorithm};
use crate::error::BatteryError;
use crate::model::energy::TIMESLOTS_PER_DAY;
use crate::sim::types::{DEFAULT_CHARGING_EFFICIENCY, PeriodicEvent, SimConfig};
use crate::validation::DEFAULT_TOLERANCE;

/// A charging scenario: horizon and policy, instance generator, battery.
///
/// Missing sections and keys fall back to the baseline values, so a TOML
/// file only lists what differs. See [`ScenarioConfig::from_toml_file`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Horizon, periodic events and policy.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Random problem instance parameters.
    #[serde(default)]
    pub generator: GeneratorConfig,
    /// Battery used by cars with nonlinear charging.
    #[serde(default)]
    pub battery: BatteryConfig,
}

/// Horizon, periodic events and policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Number of 15-minute timeslots to simulate (must be > 0).
    pub timeslots: usize,
    /// First simulated timeslot of the day.
    pub start_timeslot: usize,
    /// Spacing of the periodic events (seconds, must be > 0).
    pub reoptimization_interval_seconds: u32,
    /// `"energy_price_change"` or `"reoptimize"`.
    pub periodic_event: String,
    /// Fraction of the drawn current stored in the battery, in (0, 1].
    pub charging_efficiency: f64,
    /// Capacity check tolerance (A).
    pub tolerance: f64,
    /// Master random seed.
    pub seed: u64,
    /// Policy: `"greedy"` or `"idle"`.
    pub policy: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            timeslots: TIMESLOTS_PER_DAY,
            start_timeslot: 0,
            reoptimization_interval_seconds: 900,
            periodic_event: "energy_price_change".to_string(),
            charging_efficiency: DEFAULT_CHARGING_EFFICIENCY,
            tolerance: DEFAULT_TOLERANCE,
            seed: 42,
            policy: "greedy".to_string(),
        }
    }
}

/// Random problem instance parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    pub cars: usize,
    pub charging_stations: usize,
    /// Draw arrival and departure timeslots uniformly over the day.
    pub uniform_times: bool,
    /// Charge cars through the nonlinear battery model.
    pub nonlinear_charging: bool,
    /// `"simple"` (all stations below the root) or `"car_park"` (3x2 fuses).
    pub layout: String,
    /// Stations per lowest-level fuse in the car-park layout.
    pub stations_per_fuse: usize,
    /// Rotate station phase matching in the car-park layout.
    pub rotate_phases: bool,
    /// Root fuse rating (A per phase).
    pub fuse_level0: f64,
    /// Rating of the three riser fuses (A per phase).
    pub fuse_level1: f64,
    /// Rating of the six distribution fuses (A per phase).
    pub fuse_level2: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            cars: 20,
            charging_stations: 10,
            uniform_times: true,
            nonlinear_charging: false,
            layout: "simple".to_string(),
            stations_per_fuse: 10,
            rotate_phases: true,
            fuse_level0: 4000.0,
            fuse_level1: 1250.0,
            fuse_level2: 800.0,
        }
    }
}

/// Battery used by cars with nonlinear charging.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryConfig {
    /// `"cccv"` or `"cpcv"`.
    pub charge_algorithm: String,
    /// Constant-current target (A).
    pub constant_current: f64,
    /// Constant-power target (W).
    pub constant_power: f64,
    /// Terminal voltage cap (V).
    pub terminal_voltage: f64,
    /// Capacity (Ah); replaced by each car's own capacity.
    pub capacity: f64,
    /// Cell curves replacing the bundled sample cell.
    pub curve: Option<CurveConfig>,
}

/// Tabulated cell curves over a shared state-of-charge axis.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CurveConfig {
    pub soc: Vec<f64>,
    /// Open-circuit voltage (V) per axis point.
    pub open_circuit_voltage: Vec<f64>,
    /// Internal resistance (Ohm) per axis point.
    pub resistance: Vec<f64>,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            charge_algorithm: "cccv".to_string(),
            constant_current: 96.0,
            constant_power: 343.8,
            terminal_voltage: 4.166,
            capacity: 65.6,
            curve: None,
        }
    }
}

impl BatteryConfig {
    /// Simulator parameters on the configured curve, or the bundled sample
    /// cell without one.
    ///
    /// # Errors
    ///
    /// Returns the curve problem if `curve` is malformed.
    pub fn params(&self) -> Result<BatterySimParameters, BatteryError> {
        let base = match &self.curve {
            Some(curve) => BatterySimParameters::from_curves(
                curve.soc.clone(),
                curve.open_circuit_voltage.clone(),
                curve.resistance.clone(),
            )?,
            None => BatterySimParameters::default_params(),
        };
        Ok(base
            .with_charge_algorithm(
                ChargeAlgorithm::from_name(&self.charge_algorithm).unwrap_or(ChargeAlgorithm::Cccv),
            )
            .with_constant_current(self.constant_current)
            .with_constant_power(self.constant_power)
            .with_terminal_voltage(self.terminal_voltage)
            .with_capacity(self.capacity))
    }
}

/// A rejected setting, named by its dotted TOML path.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.timeslots"`).
    pub field: String,
    /// What the setting must satisfy.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ScenarioConfig {
    /// Returns the baseline scenario: 20 cars, 10 stations below one root fuse.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Returns the nonlinear preset: cars charge through the CC/CV battery model.
    pub fn nonlinear() -> Self {
        Self {
            generator: GeneratorConfig {
                nonlinear_charging: true,
                ..GeneratorConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns the tight-fuses preset: a car park whose distribution fuses
    /// cannot carry every station at full current.
    pub fn tight_fuses() -> Self {
        Self {
            simulation: SimulationConfig {
                seed: 7,
                ..SimulationConfig::default()
            },
            generator: GeneratorConfig {
                cars: 40,
                charging_stations: 30,
                layout: "car_park".to_string(),
                stations_per_fuse: 5,
                fuse_level0: 400.0,
                fuse_level1: 200.0,
                fuse_level2: 100.0,
                ..GeneratorConfig::default()
            },
            battery: BatteryConfig::default(),
        }
    }

    /// Names accepted by [`ScenarioConfig::from_preset`].
    pub const PRESETS: &[&str] = &["baseline", "nonlinear", "tight_fuses"];

    /// Looks up a built-in scenario by name.
    ///
    /// # Errors
    ///
    /// Fails for names outside [`ScenarioConfig::PRESETS`].
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "nonlinear" => Ok(Self::nonlinear()),
            "tight_fuses" => Ok(Self::tight_fuses()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Reads a scenario file.
    ///
    /// # Errors
    ///
    /// Fails if the file is unreadable or not a valid scenario.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "scenario".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses scenario TOML.
    ///
    /// # Errors
    ///
    /// Fails on malformed TOML and on keys no section defines.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Engine settings derived from the `[simulation]` section.
    ///
    /// Call [`ScenarioConfig::validate`] first; invalid values are clamped
    /// to the nearest usable setting.
    pub fn sim_config(&self) -> SimConfig {
        let s = &self.simulation;
        SimConfig::new(s.timeslots.max(1), s.start_timeslot)
            .with_reoptimization_interval(s.reoptimization_interval_seconds.max(1))
            .with_periodic_event(PeriodicEvent::from_name(&s.periodic_event).unwrap_or_default())
            .with_charging_efficiency(s.charging_efficiency)
            .with_tolerance(s.tolerance)
    }

    /// Checks every setting and collects all problems; empty means usable.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ConfigError {
                field: field.into(),
                message,
            });
        };

        let s = &self.simulation;
        if s.timeslots == 0 {
            push("simulation.timeslots", "must be > 0".into());
        }
        if s.start_timeslot + s.timeslots > TIMESLOTS_PER_DAY {
            push(
                "simulation.timeslots",
                format!("start_timeslot + timeslots must be <= {TIMESLOTS_PER_DAY}"),
            );
        }
        if s.reoptimization_interval_seconds == 0 {
            push("simulation.reoptimization_interval_seconds", "must be > 0".into());
        }
        if PeriodicEvent::from_name(&s.periodic_event).is_none() {
            push(
                "simulation.periodic_event",
                format!(
                    "must be \"energy_price_change\" or \"reoptimize\", got \"{}\"",
                    s.periodic_event
                ),
            );
        }
        if !(s.charging_efficiency > 0.0 && s.charging_efficiency <= 1.0) {
            push("simulation.charging_efficiency", "must be in (0.0, 1.0]".into());
        }
        if s.tolerance < 0.0 {
            push("simulation.tolerance", "must be >= 0".into());
        }
        if s.policy != "greedy" && s.policy != "idle" {
            push(
                "simulation.policy",
                format!("must be \"greedy\" or \"idle\", got \"{}\"", s.policy),
            );
        }

        let g = &self.generator;
        match g.layout.as_str() {
            "simple" => {}
            "car_park" => {
                if g.stations_per_fuse == 0 {
                    push("generator.stations_per_fuse", "must be > 0".into());
                } else if g.charging_stations > 6 * g.stations_per_fuse {
                    push(
                        "generator.charging_stations",
                        format!(
                            "car park fits at most {} stations",
                            6 * g.stations_per_fuse
                        ),
                    );
                }
            }
            other => push(
                "generator.layout",
                format!("must be \"simple\" or \"car_park\", got \"{other}\""),
            ),
        }
        for (field, value) in [
            ("generator.fuse_level0", g.fuse_level0),
            ("generator.fuse_level1", g.fuse_level1),
            ("generator.fuse_level2", g.fuse_level2),
        ] {
            if value <= 0.0 {
                push(field, "must be > 0".into());
            }
        }

        let b = &self.battery;
        if ChargeAlgorithm::from_name(&b.charge_algorithm).is_none() {
            push(
                "battery.charge_algorithm",
                format!("must be \"cccv\" or \"cpcv\", got \"{}\"", b.charge_algorithm),
            );
        }
        for (field, value) in [
            ("battery.constant_current", b.constant_current),
            ("battery.constant_power", b.constant_power),
            ("battery.terminal_voltage", b.terminal_voltage),
            ("battery.capacity", b.capacity),
        ] {
            if value <= 0.0 {
                push(field, "must be > 0".into());
            }
        }
        if let Err(err) = b.params() {
            push("battery.curve", err.to_string());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_preset_unknown() {
        let err = ScenarioConfig::from_preset("nonexistent").expect_err("unknown preset");
        assert!(err.message.contains("unknown preset"));
        assert!(err.to_string().starts_with("config error: preset:"));
    }

    #[test]
    fn all_presets_are_valid() {
        for name in ScenarioConfig::PRESETS {
            let cfg = ScenarioConfig::from_preset(name);
            assert!(cfg.is_ok(), "preset \"{name}\" should load");
            let errors = cfg.as_ref().map(|c| c.validate()).unwrap_or_default();
            assert!(
                errors.is_empty(),
                "preset \"{name}\" should be valid: {errors:?}"
            );
        }
    }

    #[test]
    fn valid_toml_parses() {
        let toml = r#"
[simulation]
timeslots = 8
start_timeslot = 32
reoptimization_interval_seconds = 300
periodic_event = "reoptimize"
charging_efficiency = 0.9
seed = 99
policy = "idle"

[generator]
cars = 5
charging_stations = 12
layout = "car_park"
stations_per_fuse = 2
rotate_phases = false

[battery]
charge_algorithm = "cpcv"
constant_power = 300.0
"#;
        let cfg = ScenarioConfig::from_toml_str(toml).expect("valid TOML");
        assert!(cfg.validate().is_empty());
        assert_eq!(cfg.generator.layout, "car_park");
        let params = cfg.battery.params().expect("sample curve");
        assert_eq!(params.charge_algorithm, ChargeAlgorithm::Cpcv);

        let sim = cfg.sim_config();
        assert_eq!(sim.timeslots, 8);
        assert_eq!(sim.start_seconds(), 32 * 900);
        assert_eq!(sim.reoptimization_interval, 300);
        assert_eq!(sim.periodic_event, PeriodicEvent::Reoptimize);
        assert_eq!(sim.charging_efficiency, 0.9);
    }

    #[test]
    fn invalid_toml_unknown_field() {
        let toml = r#"
[simulation]
timeslots = 24
bogus_field = true
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn validation_collects_every_error() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.simulation.timeslots = 0;
        cfg.simulation.charging_efficiency = 1.5;
        cfg.simulation.policy = "bogus".into();
        cfg.generator.layout = "ring".into();
        cfg.battery.charge_algorithm = "cv".into();
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "simulation.timeslots",
                "simulation.charging_efficiency",
                "simulation.policy",
                "generator.layout",
                "battery.charge_algorithm"
            ]
        );
    }

    #[test]
    fn horizon_must_fit_the_day() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.simulation.start_timeslot = 90;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "simulation.timeslots"));
    }

    #[test]
    fn car_park_capacity_is_checked() {
        let mut cfg = ScenarioConfig::tight_fuses();
        cfg.generator.charging_stations = 31;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "generator.charging_stations"));
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg = ScenarioConfig::from_toml_str("[simulation]\nseed = 99\n").expect("valid TOML");
        assert_eq!(cfg.simulation.seed, 99);
        assert_eq!(cfg.simulation.timeslots, 96);
        assert_eq!(cfg.generator.fuse_level0, 4000.0);
        assert_eq!(cfg.battery.constant_current, 96.0);
    }

    #[test]
    fn battery_curve_from_toml() {
        let toml = r#"
[battery]
curve = { soc = [0.0, 0.5, 1.0], open_circuit_voltage = [3.2, 3.7, 4.2], resistance = [0.002, 0.002, 0.002] }
"#;
        let cfg = ScenarioConfig::from_toml_str(toml).expect("valid TOML");
        assert!(cfg.validate().is_empty());
        let params = cfg.battery.params().expect("valid curve");
        assert!(params.battery_data.is_equidistant());
        assert_eq!(params.capacity, 65.6);

        let bad = r#"
[battery]
curve = { soc = [0.0, 1.0, 0.5], open_circuit_voltage = [3.2, 3.7, 4.2], resistance = [0.002, 0.002, 0.002] }
"#;
        let cfg = ScenarioConfig::from_toml_str(bad).expect("valid TOML");
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["battery.curve"]);
        assert!(cfg.battery.params().is_err());
    }
}
