/// Tracks simulation time: a monotonic tick counter and elapsed simulated seconds.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    tick: u64,
    elapsed: f64,
}

impl SimClock {
    /// A clock at tick 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by one tick of `delta` seconds. Returns the new tick number.
    pub fn advance(&mut self, delta: f64) -> u64 {
        self.tick += 1;
        self.elapsed += delta;
        self.tick
    }

    /// Return the current tick number.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Total simulated seconds since the start.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_initial_state() {
        let clock = SimClock::new();
        assert_eq!(clock.tick(), 0);
        assert_eq!(clock.elapsed_secs(), 0.0);
    }

    #[test]
    fn clock_advance_accumulates_variable_steps() {
        let mut clock = SimClock::new();
        clock.advance(0.5);
        clock.advance(1.5);
        assert_eq!(clock.advance(2.0), 3);
        assert!((clock.elapsed_secs() - 4.0).abs() < f64::EPSILON);
    }
}
