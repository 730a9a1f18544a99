//! Problem instance read back from an interchange document.

use std::path::Path;

use crate::io::interchange::{InterchangeDocument, ProblemInstance};
use crate::model::{Car, ChargingStation, EnergyPriceHistory, FuseTree};

use super::DataProvider;

/// Replays the problem instance of an interchange document.
///
/// Cars start with nothing charged, whatever the document recorded.
#[derive(Debug, Clone)]
pub struct InstanceFile {
    instance: ProblemInstance,
}

impl InstanceFile {
    pub fn new(instance: ProblemInstance) -> Self {
        Self { instance }
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::from_document(InterchangeDocument::from_json_file(path)?))
    }

    pub fn from_document(document: InterchangeDocument) -> Self {
        Self::new(document.problem_instance)
    }

    pub fn instance(&self) -> &ProblemInstance {
        &self.instance
    }
}

impl DataProvider for InstanceFile {
    fn cars(&self) -> Vec<Car> {
        self.instance
            .cars
            .iter()
            .map(|entry| {
                let mut car = entry.car.clone();
                car.charged_capacity = 0.0;
                car
            })
            .collect()
    }

    fn charging_stations(&self) -> Vec<ChargingStation> {
        self.instance
            .charging_stations
            .iter()
            .map(|entry| entry.station.clone())
            .collect()
    }

    fn fuse_tree(&self) -> FuseTree {
        self.instance.fuse_tree.clone()
    }

    fn energy_price_history(&self) -> EnergyPriceHistory {
        self.instance.energy_price_history.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::interchange::{CarEntry, Solution, StationEntry};
    use crate::model::{CarBuilder, Fuse};

    #[test]
    fn charged_capacity_is_reset() {
        let station = ChargingStation::new(3);
        let mut tree = FuseTree::new(Fuse::new(0, 100.0), 1);
        let root = tree.root();
        tree.add_station(root, station.clone()).expect("station");
        let mut car = CarBuilder::new(7).build().expect("valid car");
        car.charged_capacity = 12.0;

        let document = InterchangeDocument {
            problem_instance: ProblemInstance {
                energy_price_history: EnergyPriceHistory::default_curve(4),
                charging_stations: vec![StationEntry {
                    name: station.name(),
                    station,
                    output_currents: Vec::new(),
                }],
                cars: vec![CarEntry {
                    car,
                    input_currents: vec![1.0],
                }],
                fuse_tree: tree,
            },
            solution: Solution::default(),
        };
        let json = serde_json::to_string(&document).expect("serializable document");
        let reloaded: InterchangeDocument = serde_json::from_str(&json).expect("valid document");
        assert_eq!(reloaded.problem_instance.cars[0].car.charged_capacity, 12.0);
        let provider = InstanceFile::from_document(reloaded);

        let cars = provider.cars();
        assert_eq!(cars.len(), 1);
        assert_eq!(cars[0].id, 7);
        assert_eq!(cars[0].charged_capacity, 0.0);
        assert_eq!(provider.charging_stations()[0].id, 3);
        assert!(provider.fuse_tree().contains_station(3));
        assert_eq!(provider.energy_price_history().len(), 4);
    }
}
