/// Tracks how long a boolean condition has been continuously true.
///
/// A false reading only clears the counter once the condition has stayed
/// false for longer than the hysteresis window, so a single flicker from the
/// classifier does not restart a grace period.
#[derive(Debug, Clone, PartialEq)]
pub struct DurationAccumulator {
    elapsed: f64,
    false_for: f64,
    hysteresis: f64,
}

impl DurationAccumulator {
    pub fn new(hysteresis_secs: f64) -> Self {
        Self {
            elapsed: 0.0,
            false_for: 0.0,
            hysteresis: hysteresis_secs.max(0.0),
        }
    }

    /// Feeds one tick and returns the accumulated duration after it.
    pub fn advance(&mut self, condition: bool, dt: f64) -> f64 {
        let dt = dt.max(0.0);
        if condition {
            self.false_for = 0.0;
            self.elapsed += dt;
        } else {
            self.false_for += dt;
            if self.false_for > self.hysteresis {
                self.elapsed = 0.0;
            }
        }
        self.elapsed
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Clears the counter, e.g. after a threshold has been paid out.
    pub fn reset(&mut self) {
        self.elapsed = 0.0;
        self.false_for = 0.0;
    }
}
