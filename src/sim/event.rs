//! Timed simulation events and the ordered event timeline.

use std::collections::BTreeMap;
use std::fmt;

use crate::model::EnergyPriceHistory;

/// What happens at an event's timestamp.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A car becomes available.
    CarArrival { car: u32 },
    /// A car leaves.
    CarDeparture { car: u32 },
    /// A car reached its maximum capacity one second earlier.
    CarFinished { car: u32, station: u32 },
    /// A new price history becomes effective.
    EnergyPriceChange(EnergyPriceHistory),
    /// Periodic prompt for the policy to revise its plans.
    Reoptimize,
}

/// An immutable event at a second of day.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub timestamp: u32,
    pub kind: EventKind,
}

impl Event {
    pub fn new(timestamp: u32, kind: EventKind) -> Self {
        Self { timestamp, kind }
    }

    /// Car the event refers to, if any.
    pub fn car(&self) -> Option<u32> {
        match self.kind {
            EventKind::CarArrival { car }
            | EventKind::CarDeparture { car }
            | EventKind::CarFinished { car, .. } => Some(car),
            EventKind::EnergyPriceChange(_) | EventKind::Reoptimize => None,
        }
    }

    /// Short kind label used in logs.
    pub fn label(&self) -> &'static str {
        match self.kind {
            EventKind::CarArrival { .. } => "car_arrival",
            EventKind::CarDeparture { .. } => "car_departure",
            EventKind::CarFinished { .. } => "car_finished",
            EventKind::EnergyPriceChange(_) => "energy_price_change",
            EventKind::Reoptimize => "reoptimize",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EventKind::CarArrival { car } => write!(f, "t={} arrival n={car}", self.timestamp),
            EventKind::CarDeparture { car } => {
                write!(f, "t={} departure n={car}", self.timestamp)
            }
            EventKind::CarFinished { car, station } => {
                write!(f, "t={} finished n={car} i={station}", self.timestamp)
            }
            EventKind::EnergyPriceChange(history) => write!(
                f,
                "t={} energy price change ({} timeslots)",
                self.timestamp,
                history.len()
            ),
            EventKind::Reoptimize => write!(f, "t={} reoptimize", self.timestamp),
        }
    }
}

/// Events grouped by timestamp. Events sharing a timestamp keep their
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    events: BTreeMap<u32, Vec<Event>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.events.entry(event.timestamp).or_default().push(event);
    }

    /// Events due exactly at `seconds`.
    pub fn at(&self, seconds: u32) -> &[Event] {
        self.events.get(&seconds).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All events in timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
