//! Seeded random problem instances.

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::debug;

use crate::battery::BatterySimParameters;
use crate::config::{GeneratorConfig, ScenarioConfig};
use crate::error::SimError;
use crate::model::energy::{SECONDS_PER_TIMESLOT, TIMESLOTS_PER_DAY};
use crate::model::{
    Car, CarBuilder, CarModel, ChargingStation, EnergyPriceHistory, Fuse, FuseTree, PhaseMatching,
};

use super::DataProvider;

/// Riser fuses below the root in the car-park layout.
const RISER_FUSES: usize = 3;
/// Distribution fuses below each riser in the car-park layout.
const DISTRIBUTION_FUSES: usize = 2;

/// Commuter arrival window (timeslots) used when times are not uniform.
const COMMUTER_ARRIVAL: std::ops::Range<usize> = 28..40;
/// Commuter departure window (timeslots) used when times are not uniform.
const COMMUTER_DEPARTURE: std::ops::Range<usize> = 64..76;

/// Random problem instance built once from a seed.
///
/// * Prices follow the bundled day curve.
/// * Stations are KeContact P30 wallboxes (32 A per phase).
/// * Cars pick a random model (Renault Zoe ZE40 when charging nonlinearly),
///   a random arrival and departure, and a random initial charge that always
///   leaves room for at least the car's minimum current.
///
/// # Examples
///
/// ```
/// use ev_charge_sim::config::ScenarioConfig;
/// use ev_charge_sim::data::{DataProvider, RandomDataGenerator};
///
/// let config = ScenarioConfig::baseline();
/// let a = RandomDataGenerator::from_config(&config).unwrap();
/// let b = RandomDataGenerator::from_config(&config).unwrap();
/// assert_eq!(a.cars().len(), 20);
/// assert_eq!(a.cars()[3].timestamp_arrival, b.cars()[3].timestamp_arrival);
/// ```
#[derive(Debug, Clone)]
pub struct RandomDataGenerator {
    cars: Vec<Car>,
    stations: Vec<ChargingStation>,
    fuse_tree: FuseTree,
    energy_price_history: EnergyPriceHistory,
}

impl RandomDataGenerator {
    /// Generates an instance from the scenario's seed, generator and
    /// battery sections.
    ///
    /// # Errors
    ///
    /// Returns an error if the battery curve is malformed, or if a generated
    /// car or the fuse tree is inconsistent, for example when the car park
    /// cannot hold all stations.
    pub fn from_config(config: &ScenarioConfig) -> Result<Self, SimError> {
        Self::generate(
            config.simulation.seed,
            &config.generator,
            &config.battery.params()?,
        )
    }

    /// Generates an instance.
    ///
    /// # Arguments
    ///
    /// * `seed` - Seed for the random number generator
    /// * `generator` - Instance size and fuse-tree layout
    /// * `battery` - Battery of cars charging nonlinearly
    ///
    /// # Errors
    ///
    /// Same as [`RandomDataGenerator::from_config`].
    pub fn generate(
        seed: u64,
        generator: &GeneratorConfig,
        battery: &BatterySimParameters,
    ) -> Result<Self, SimError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let energy_price_history = EnergyPriceHistory::default_curve(TIMESLOTS_PER_DAY);

        let stations: Vec<ChargingStation> = (0..generator.charging_stations as u32)
            .map(|id| ChargingStation::ke_contact_p30(id, PhaseMatching::IDENTITY))
            .collect();
        let (fuse_tree, stations) = match generator.layout.as_str() {
            "car_park" => car_park(generator, stations)?,
            _ => simple(generator, stations)?,
        };

        let cars = (0..generator.cars as u32)
            .map(|id| random_car(&mut rng, id, generator, battery))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            seed,
            cars = cars.len(),
            stations = stations.len(),
            layout = generator.layout.as_str(),
            "generated random instance"
        );
        Ok(Self {
            cars,
            stations,
            fuse_tree,
            energy_price_history,
        })
    }
}

/// All stations directly below one root fuse, phases rotated by position.
fn simple(
    generator: &GeneratorConfig,
    stations: Vec<ChargingStation>,
) -> Result<(FuseTree, Vec<ChargingStation>), SimError> {
    let mut tree = FuseTree::new(Fuse::new(0, generator.fuse_level0), stations.len());
    let root = tree.root();
    let mut placed = Vec::with_capacity(stations.len());
    for (i, station) in stations.into_iter().enumerate() {
        let station = station.with_phase_matching(PhaseMatching::rotated(i));
        tree.add_station(root, station.clone())?;
        placed.push(station);
    }
    Ok((tree, placed))
}

/// Root, three riser fuses with two distribution fuses each, stations
/// filled into the distribution fuses in order.
fn car_park(
    generator: &GeneratorConfig,
    stations: Vec<ChargingStation>,
) -> Result<(FuseTree, Vec<ChargingStation>), SimError> {
    let per_fuse = generator.stations_per_fuse;
    let mut tree = FuseTree::new(Fuse::new(0, generator.fuse_level0), per_fuse);
    let root = tree.root();
    let mut fuse_id = 1;
    let mut remaining = stations.into_iter();
    let mut placed = Vec::new();

    for _ in 0..RISER_FUSES {
        let riser = tree.add_fuse(root, Fuse::new(fuse_id, generator.fuse_level1))?;
        fuse_id += 1;
        for _ in 0..DISTRIBUTION_FUSES {
            let distribution = tree.add_fuse(riser, Fuse::new(fuse_id, generator.fuse_level2))?;
            fuse_id += 1;
            for (k, station) in remaining.by_ref().take(per_fuse).enumerate() {
                let matching = if generator.rotate_phases {
                    PhaseMatching::rotated(k)
                } else {
                    PhaseMatching::IDENTITY
                };
                let station = station.with_phase_matching(matching);
                tree.add_station(distribution, station.clone())?;
                placed.push(station);
            }
        }
    }

    if let Some(station) = remaining.next() {
        return Err(crate::error::TopologyError::NoAttachmentPoint(station.id).into());
    }
    Ok((tree, placed))
}

fn random_car(
    rng: &mut StdRng,
    id: u32,
    generator: &GeneratorConfig,
    battery: &BatterySimParameters,
) -> Result<Car, SimError> {
    let model = if generator.nonlinear_charging {
        CarModel::RenaultZoeZe40
    } else {
        CarModel::ALL[rng.random_range(0..CarModel::ALL.len())]
    };
    let spec = model.spec();

    let (arrival_slot, departure_slot) = if generator.uniform_times {
        (
            rng.random_range(0..TIMESLOTS_PER_DAY),
            rng.random_range(0..TIMESLOTS_PER_DAY),
        )
    } else {
        (
            rng.random_range(COMMUTER_ARRIVAL),
            rng.random_range(COMMUTER_DEPARTURE),
        )
    };
    let mut arrival = random_second_in(rng, arrival_slot);
    let mut departure = random_second_in(rng, departure_slot);
    if arrival > departure {
        std::mem::swap(&mut arrival, &mut departure);
    }

    let mut current_capacity = rng.random::<f64>() * spec.max_capacity;
    if spec.min_current > spec.max_capacity - current_capacity {
        current_capacity = (current_capacity - spec.min_current).max(0.0);
    }

    let mut car = CarBuilder::new(id)
        .model(model)
        .current_capacity(current_capacity)
        .availability(arrival, departure)
        .build()?;
    if generator.nonlinear_charging {
        car.enable_nonlinear_charging(battery.clone())?;
    }
    Ok(car)
}

/// Random second within `timeslot`.
fn random_second_in(rng: &mut StdRng, timeslot: usize) -> u32 {
    timeslot as u32 * SECONDS_PER_TIMESLOT + rng.random_range(0..SECONDS_PER_TIMESLOT)
}

impl DataProvider for RandomDataGenerator {
    fn cars(&self) -> Vec<Car> {
        self.cars.clone()
    }

    fn charging_stations(&self) -> Vec<ChargingStation> {
        self.stations.clone()
    }

    fn fuse_tree(&self) -> FuseTree {
        self.fuse_tree.clone()
    }

    fn energy_price_history(&self) -> EnergyPriceHistory {
        self.energy_price_history.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Phase;

    fn generate(generator: GeneratorConfig) -> RandomDataGenerator {
        RandomDataGenerator::generate(1, &generator, &BatterySimParameters::default_params())
            .expect("valid instance")
    }

    #[test]
    fn same_seed_same_instance() {
        let a = generate(GeneratorConfig::default());
        let b = generate(GeneratorConfig::default());
        let key = |g: &RandomDataGenerator| -> Vec<(u32, u32, String)> {
            g.cars()
                .iter()
                .map(|c| (c.timestamp_arrival, c.timestamp_departure, c.model_name.clone()))
                .collect()
        };
        assert_eq!(key(&a), key(&b));
    }

    #[test]
    fn cars_are_consistent() {
        for car in generate(GeneratorConfig::default()).cars() {
            assert!(car.timestamp_arrival <= car.timestamp_departure || car.timestamp_departure == 0);
            assert!(car.cur_capacity >= 0.0);
            assert!(car.missing_capacity() >= car.min_current.min(car.max_capacity) - 1e-9);
            assert!(!car.nonlinear_charging);
        }
    }

    #[test]
    fn simple_layout_rotates_phases() {
        let g = generate(GeneratorConfig::default());
        let tree = g.fuse_tree();
        assert_eq!(tree.stations().len(), 10);
        assert_eq!(tree.number_children_bottom_level(), 10);
        let matching = |id| tree.station(id).map(|s| s.phase_matching.phase1);
        assert_eq!(matching(0), Some(Phase::Phase1));
        assert_eq!(matching(1), Some(Phase::Phase2));
        assert_eq!(matching(5), Some(Phase::Phase3));
    }

    #[test]
    fn car_park_layout() {
        let g = generate(GeneratorConfig {
            charging_stations: 9,
            layout: "car_park".into(),
            stations_per_fuse: 2,
            rotate_phases: false,
            ..GeneratorConfig::default()
        });
        let tree = g.fuse_tree();
        // root + 3 risers + 6 distribution fuses + 9 stations
        assert_eq!(tree.len(), 19);
        let node = tree.station_node(8).expect("placed");
        assert_eq!(tree.ancestors(node).count(), 3);
        assert!(
            g.charging_stations()
                .iter()
                .all(|s| s.phase_matching == PhaseMatching::IDENTITY)
        );
    }

    #[test]
    fn car_park_overflow_is_rejected() {
        let err = RandomDataGenerator::generate(
            1,
            &GeneratorConfig {
                charging_stations: 7,
                layout: "car_park".into(),
                stations_per_fuse: 1,
                ..GeneratorConfig::default()
            },
            &BatterySimParameters::default_params(),
        )
        .expect_err("too many stations");
        assert!(matches!(err, SimError::Topology(_)));
    }

    #[test]
    fn nonlinear_cars_use_the_battery_model() {
        let g = generate(GeneratorConfig {
            nonlinear_charging: true,
            uniform_times: false,
            ..GeneratorConfig::default()
        });
        for car in g.cars() {
            assert!(car.nonlinear_charging);
            assert_eq!(car.model_name, "Renault Zoe ZE40");
            assert!(car.timestamp_arrival >= 28 * 900 && car.timestamp_arrival < 40 * 900);
            assert!(car.timestamp_departure >= 64 * 900);
        }
    }
}
