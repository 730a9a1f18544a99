/// Second-granularity simulation clock over a half-open range of seconds.
///
/// The `SimClock` hands out each second of `[start, end)` exactly once and
/// never goes back.
///
/// # Examples
///
/// ```
/// use ev_charge_sim::sim::clock::SimClock;
///
/// let mut clock = SimClock::new(10, 13);
/// let mut seconds = Vec::new();
///
/// while let Some(t) = clock.tick() {
///     seconds.push(t);
/// }
/// assert_eq!(seconds, vec![10, 11, 12]);
/// assert!(clock.is_finished());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimClock {
    /// Next second to simulate
    current: u32,
    /// First second after the horizon
    end: u32,
}

impl SimClock {
    /// Creates a clock covering `[start, end)`.
    ///
    /// # Arguments
    ///
    /// * `start` - First simulated second of day
    /// * `end` - First second no longer simulated
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            current: start,
            end: end.max(start),
        }
    }

    /// Advances the clock by one second.
    ///
    /// # Returns
    ///
    /// * `Some(t)` - The second to simulate now
    /// * `None` - If the horizon has been reached
    pub fn tick(&mut self) -> Option<u32> {
        if self.current < self.end {
            let t = self.current;
            self.current += 1;
            Some(t)
        } else {
            None
        }
    }

    /// Second that the next [`SimClock::tick`] returns.
    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn is_finished(&self) -> bool {
        self.current >= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick() {
        let mut clock = SimClock::new(5, 7);
        assert_eq!(clock.tick(), Some(5));
        assert_eq!(clock.current(), 6);
        assert_eq!(clock.tick(), Some(6));
        assert_eq!(clock.tick(), None);
        assert!(clock.is_finished());
    }

    #[test]
    fn test_empty_clock() {
        let mut clock = SimClock::new(9, 3);
        assert_eq!(clock.end(), 9);
        assert_eq!(clock.tick(), None);
        assert!(clock.is_finished());
    }
}
