//! Day-ahead energy price history.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Default 96-slot day-ahead price curve (EUR/MWh).
pub const DEFAULT_PRICES: [f64; 96] = [
    27.27, 37.53, 35.55, 28.63, 39.26, 38.13, 35.71, 34.25, 37.65, 34.57, 36.41, 39.53, 31.54,
    31.55, 31.41, 29.72, 26.27, 32.84, 35.39, 38.53, 31.48, 35.18, 40.22, 44.39, 40.33, 38.45,
    50.61, 63.06, 53.66, 53.91, 63.53, 72.64, 67.55, 64.33, 60.96, 53.19, 70.43, 59.24, 64.52,
    54.94, 65.26, 57.29, 48.90, 41.52, 57.33, 58.90, 51.74, 48.39, 57.90, 47.67, 48.32, 45.24,
    54.22, 48.42, 45.62, 46.88, 43.31, 41.76, 38.00, 48.65, 40.17, 47.82, 51.83, 53.56, 51.22,
    59.17, 59.66, 64.19, 54.11, 57.56, 66.56, 82.67, 70.38, 91.69, 100.25, 133.85, 123.98, 102.26,
    79.37, 68.78, 91.31, 54.62, 45.52, 41.26, 60.89, 54.07, 40.26, 26.85, 55.72, 61.53, 44.56,
    34.19, 42.62, 46.79, 41.32, 34.85,
];

/// One price per timeslot, optionally labelled with its date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "PriceHistoryRecord")]
pub struct EnergyPriceHistory {
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    energy_prices: Vec<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceHistoryRecord {
    #[serde(default)]
    date: Option<String>,
    energy_prices: Vec<f64>,
}

impl TryFrom<PriceHistoryRecord> for EnergyPriceHistory {
    type Error = ModelError;

    fn try_from(record: PriceHistoryRecord) -> Result<Self, Self::Error> {
        Self::new(record.energy_prices, record.date)
    }
}

impl EnergyPriceHistory {
    /// # Errors
    ///
    /// Returns [`ModelError::EmptyPriceHistory`] if `prices` is empty.
    pub fn new(prices: Vec<f64>, date: Option<String>) -> Result<Self, ModelError> {
        if prices.is_empty() {
            return Err(ModelError::EmptyPriceHistory);
        }
        Ok(Self {
            date,
            energy_prices: prices,
        })
    }

    /// The first `timeslots` entries of [`DEFAULT_PRICES`], repeated if longer.
    pub fn default_curve(timeslots: usize) -> Self {
        let prices = DEFAULT_PRICES
            .iter()
            .copied()
            .cycle()
            .take(timeslots.max(1))
            .collect();
        Self {
            date: None,
            energy_prices: prices,
        }
    }

    pub fn prices(&self) -> &[f64] {
        &self.energy_prices
    }

    pub fn price_at(&self, timeslot: usize) -> Option<f64> {
        self.energy_prices.get(timeslot).copied()
    }

    /// Number of timeslots covered.
    pub fn len(&self) -> usize {
        self.energy_prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energy_prices.is_empty()
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_is_rejected() {
        assert_eq!(
            EnergyPriceHistory::new(Vec::new(), None),
            Err(ModelError::EmptyPriceHistory)
        );
        let json = r#"{"date": "2024-01-01", "energyPrices": []}"#;
        assert!(serde_json::from_str::<EnergyPriceHistory>(json).is_err());
    }

    #[test]
    fn default_curve_truncates_and_cycles() {
        let short = EnergyPriceHistory::default_curve(4);
        assert_eq!(short.prices(), &[27.27, 37.53, 35.55, 28.63]);
        let long = EnergyPriceHistory::default_curve(100);
        assert_eq!(long.len(), 100);
        assert_eq!(long.price_at(96), Some(27.27));
        assert_eq!(long.price_at(100), None);
    }

    #[test]
    fn json_shape() {
        let history = EnergyPriceHistory::new(vec![1.0, 2.0], Some("2024-01-01".into()))
            .expect("non-empty");
        let value = serde_json::to_value(&history).expect("serializable");
        assert_eq!(value["date"], "2024-01-01");
        assert_eq!(value["energyPrices"][1], 2.0);
        let parsed: EnergyPriceHistory = serde_json::from_value(value).expect("deserializable");
        assert_eq!(parsed, history);
    }
}
