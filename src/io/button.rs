//! Push-button press classification.
//!
//! Converts raw level samples into debounced short/long press events. Long
//! fires while the button is still held once the hold time passes the
//! threshold; short fires on release only if long did not. Edges inside the
//! debounce window are ignored, so a bouncing contact can never
//! double-advance sequencer state.

use std::time::{Duration, Instant};

/// A classified button press.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Press {
    Short,
    Long,
}

/// Debounced press classifier over `(level, now)` samples.
///
/// Pure state machine: feed it the sampled logical level (true = pressed)
/// and the sample time; it performs no I/O of its own, so callback bodies
/// stay short and non-blocking.
#[derive(Debug)]
pub struct PushButton {
    debounce: Duration,
    long_press: Duration,
    pressed: bool,
    long_fired: bool,
    last_change: Option<Instant>,
}

impl PushButton {
    pub const DEBOUNCE: Duration = Duration::from_millis(50);
    pub const LONG_PRESS: Duration = Duration::from_millis(1000);

    pub fn new() -> Self {
        Self::with_windows(Self::DEBOUNCE, Self::LONG_PRESS)
    }

    pub fn with_windows(debounce: Duration, long_press: Duration) -> Self {
        Self {
            debounce,
            long_press,
            pressed: false,
            long_fired: false,
            last_change: None,
        }
    }

    /// Feed one level sample. Returns a press event when one completes.
    pub fn update(&mut self, level: bool, now: Instant) -> Option<Press> {
        if level == self.pressed {
            // Still held: fire the long press once past the threshold.
            if level && !self.long_fired {
                if let Some(t) = self.last_change {
                    if now.saturating_duration_since(t) >= self.long_press {
                        self.long_fired = true;
                        return Some(Press::Long);
                    }
                }
            }
            return None;
        }

        // Ignore edges until the switch has settled.
        if let Some(t) = self.last_change {
            if now.saturating_duration_since(t) < self.debounce {
                return None;
            }
        }

        self.pressed = level;
        self.last_change = Some(now);
        if level {
            self.long_fired = false;
            None
        } else if self.long_fired {
            // Release after a long press already fired.
            None
        } else {
            Some(Press::Short)
        }
    }
}

impl Default for PushButton {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn short_press_fires_on_release() {
        let mut b = PushButton::new();
        let t0 = Instant::now();
        assert_eq!(b.update(true, t0), None);
        assert_eq!(b.update(true, t0 + ms(100)), None);
        assert_eq!(b.update(false, t0 + ms(200)), Some(Press::Short));
    }

    #[test]
    fn long_press_fires_while_held_and_suppresses_short() {
        let mut b = PushButton::new();
        let t0 = Instant::now();
        assert_eq!(b.update(true, t0), None);
        assert_eq!(b.update(true, t0 + ms(999)), None);
        assert_eq!(b.update(true, t0 + ms(1000)), Some(Press::Long));
        // Holding past the threshold fires exactly once.
        assert_eq!(b.update(true, t0 + ms(1500)), None);
        assert_eq!(b.update(false, t0 + ms(1600)), None);
    }

    #[test]
    fn bouncing_edges_inside_the_debounce_window_are_ignored() {
        let mut b = PushButton::new();
        let t0 = Instant::now();
        assert_eq!(b.update(true, t0), None);
        // Contact bounce right after the press: no spurious releases.
        assert_eq!(b.update(false, t0 + ms(5)), None);
        assert_eq!(b.update(true, t0 + ms(10)), None);
        // A real release later still classifies as one short press.
        assert_eq!(b.update(false, t0 + ms(120)), Some(Press::Short));
    }

    #[test]
    fn repeated_presses_each_classify() {
        let mut b = PushButton::new();
        let t0 = Instant::now();
        assert_eq!(b.update(true, t0), None);
        assert_eq!(b.update(false, t0 + ms(100)), Some(Press::Short));
        assert_eq!(b.update(true, t0 + ms(300)), None);
        assert_eq!(b.update(false, t0 + ms(400)), Some(Press::Short));
    }
}
