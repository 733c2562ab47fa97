//! Master clock.
//!
//! Produces one tick per quarter note from either an internal tempo knob
//! (with running-average smoothing against analog read jitter) or an
//! external pulse input. Callers see a single blocking `wait()` regardless
//! of source.

use std::time::Duration;

use crate::io::ports::{ContinuousInput, LevelInput};

/// Where ticks come from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClockSource {
    Internal,
    External,
}

/// Tempo range and smoothing parameters.
#[derive(Debug, Clone)]
pub struct ClockConfig {
    pub min_bpm: f32,
    pub max_bpm: f32,
    /// Number of recent tempo samples averaged into the published tempo.
    pub smoothing: usize,
    /// How often the external pulse input is sampled while waiting.
    pub external_poll: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            min_bpm: 20.0,
            max_bpm: 280.0,
            smoothing: 10,
            external_poll: Duration::from_millis(1),
        }
    }
}

/// Errors rejected when constructing a clock.
#[derive(Debug, Clone, PartialEq)]
pub enum ClockError {
    /// `min_bpm` must be positive and below `max_bpm`, or the period
    /// computation divides by zero.
    InvalidTempoRange { min: f32, max: f32 },
    /// The smoothing window must hold at least one sample.
    ZeroSmoothingWindow,
}

impl std::fmt::Display for ClockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClockError::InvalidTempoRange { min, max } => {
                write!(f, "invalid tempo range: min {} bpm, max {} bpm", min, max)
            }
            ClockError::ZeroSmoothingWindow => {
                write!(f, "smoothing window must hold at least one sample")
            }
        }
    }
}

impl std::error::Error for ClockError {}

/// Fixed-capacity ring of recent tempo samples.
#[derive(Debug, Clone)]
struct TempoSmoother {
    window: Vec<f32>,
    next: usize,
}

impl TempoSmoother {
    /// Pre-fill the whole window with the first reading so the published
    /// tempo has no cold-start transient.
    fn primed(capacity: usize, sample: f32) -> Self {
        Self {
            window: vec![sample; capacity],
            next: 0,
        }
    }

    fn prime(&mut self, sample: f32) {
        self.window.fill(sample);
        self.next = 0;
    }

    /// Evict the oldest sample, append the newest.
    fn push(&mut self, sample: f32) {
        self.window[self.next] = sample;
        self.next = (self.next + 1) % self.window.len();
    }

    fn mean(&self) -> f32 {
        self.window.iter().sum::<f32>() / self.window.len() as f32
    }
}

/// Two-mode master clock.
pub struct Clock {
    config: ClockConfig,
    source: ClockSource,
    tempo_knob: Box<dyn ContinuousInput + Send>,
    pulse_in: Box<dyn LevelInput + Send>,
    smoother: TempoSmoother,
    tempo_bpm: f32,
    prev_level: bool,
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("config", &self.config)
            .field("source", &self.source)
            .field("smoother", &self.smoother)
            .field("tempo_bpm", &self.tempo_bpm)
            .field("prev_level", &self.prev_level)
            .finish_non_exhaustive()
    }
}

impl Clock {
    pub fn new(
        config: ClockConfig,
        tempo_knob: Box<dyn ContinuousInput + Send>,
        pulse_in: Box<dyn LevelInput + Send>,
    ) -> Result<Clock, ClockError> {
        if config.min_bpm <= 0.0 || config.max_bpm <= config.min_bpm {
            return Err(ClockError::InvalidTempoRange {
                min: config.min_bpm,
                max: config.max_bpm,
            });
        }
        if config.smoothing == 0 {
            return Err(ClockError::ZeroSmoothingWindow);
        }

        let first = map_tempo(&config, tempo_knob.read());
        Ok(Clock {
            smoother: TempoSmoother::primed(config.smoothing, first),
            tempo_bpm: first,
            config,
            source: ClockSource::Internal,
            tempo_knob,
            pulse_in,
            prev_level: false,
        })
    }

    /// The published tempo: the mean of the smoothing window.
    pub fn tempo_bpm(&self) -> f32 {
        self.tempo_bpm
    }

    pub fn source(&self) -> ClockSource {
        self.source
    }

    /// Switch between internal and external source. Takes effect at the
    /// next `wait()`; an in-flight wait is never interrupted.
    pub fn toggle_source(&mut self) {
        self.source = match self.source {
            ClockSource::Internal => {
                self.prev_level = false;
                ClockSource::External
            }
            ClockSource::External => {
                // Re-prime the window from the current knob position so the
                // old pre-switch samples don't drag the tempo.
                let tempo = self.read_internal_tempo();
                self.smoother.prime(tempo);
                self.tempo_bpm = tempo;
                ClockSource::Internal
            }
        };
    }

    /// Map the current knob reading linearly onto `[min_bpm, max_bpm]`.
    /// Pure: safe to sample repeatedly for smoothing.
    fn read_internal_tempo(&self) -> f32 {
        map_tempo(&self.config, self.tempo_knob.read())
    }

    /// Push one knob sample through the smoothing window and publish the
    /// new mean.
    fn observe_tempo(&mut self) -> f32 {
        self.smoother.push(self.read_internal_tempo());
        self.tempo_bpm = self.smoother.mean();
        self.tempo_bpm
    }

    fn wait_internal(&mut self) {
        let bpm = self.observe_tempo();
        log::trace!("tick at {:.1} bpm", bpm);
        // One quarter note of the smoothed tempo.
        std::thread::sleep(Duration::from_secs_f32(60.0 / bpm / 4.0));
    }

    /// Block until the external pulse completes: a transition to the active
    /// level followed by the matching transition back. Blocks indefinitely
    /// on a stalled source; there is no watchdog.
    fn wait_external(&mut self) {
        loop {
            let level = self.pulse_in.level();
            if level != self.prev_level {
                self.prev_level = level;
                if !level {
                    return;
                }
            }
            std::thread::sleep(self.config.external_poll);
        }
    }

    /// Block until the next tick of the current source.
    pub fn wait(&mut self) {
        match self.source {
            ClockSource::Internal => self.wait_internal(),
            ClockSource::External => self.wait_external(),
        }
    }
}

fn map_tempo(config: &ClockConfig, reading: f32) -> f32 {
    config.min_bpm + reading.clamp(0.0, 1.0) * (config.max_bpm - config.min_bpm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::virt::{VirtGate, VirtKnob};

    fn clock(config: ClockConfig, knob: &VirtKnob, gate: &VirtGate) -> Clock {
        Clock::new(config, Box::new(knob.clone()), Box::new(gate.clone())).unwrap()
    }

    #[test]
    fn construction_rejects_bad_config() {
        let knob = VirtKnob::new(0.5);
        let gate = VirtGate::new();
        let bad = ClockConfig {
            min_bpm: 0.0,
            ..ClockConfig::default()
        };
        assert!(matches!(
            Clock::new(bad, Box::new(knob.clone()), Box::new(gate.clone())),
            Err(ClockError::InvalidTempoRange { .. })
        ));

        let inverted = ClockConfig {
            min_bpm: 200.0,
            max_bpm: 100.0,
            ..ClockConfig::default()
        };
        assert!(matches!(
            Clock::new(inverted, Box::new(knob.clone()), Box::new(gate.clone())),
            Err(ClockError::InvalidTempoRange { .. })
        ));

        let unsmoothed = ClockConfig {
            smoothing: 0,
            ..ClockConfig::default()
        };
        assert_eq!(
            Clock::new(unsmoothed, Box::new(knob), Box::new(gate)).unwrap_err(),
            ClockError::ZeroSmoothingWindow
        );
    }

    #[test]
    fn window_prefill_avoids_cold_start_transient() {
        let knob = VirtKnob::new(0.5);
        let gate = VirtGate::new();
        let config = ClockConfig {
            min_bpm: 100.0,
            max_bpm: 200.0,
            smoothing: 10,
            ..ClockConfig::default()
        };
        let mut c = clock(config, &knob, &gate);
        assert_eq!(c.tempo_bpm(), 150.0);
        // One new identical sample leaves the mean unchanged.
        c.observe_tempo();
        assert_eq!(c.tempo_bpm(), 150.0);
    }

    #[test]
    fn tempo_is_the_mean_of_the_last_k_samples() {
        let knob = VirtKnob::new(0.0);
        let gate = VirtGate::new();
        let config = ClockConfig {
            min_bpm: 100.0,
            max_bpm: 200.0,
            smoothing: 4,
            ..ClockConfig::default()
        };
        let mut c = clock(config, &knob, &gate);

        // Push enough samples to fully turn the window over, checking the
        // ring-buffer mean after each one.
        let readings = [0.0, 0.2, 0.4, 0.8, 1.0, 0.6];
        let mut raw: Vec<f32> = vec![100.0; 4]; // prefill from the 0.0 reading
        for &r in &readings {
            knob.set(r);
            let tempo = {
                c.observe_tempo();
                c.tempo_bpm()
            };
            raw.push(100.0 + r * 100.0);
            let window = &raw[raw.len() - 4..];
            let expected = window.iter().sum::<f32>() / 4.0;
            assert!((tempo - expected).abs() < 1e-3, "{} != {}", tempo, expected);
        }
    }

    #[test]
    fn external_wait_advances_on_the_completed_pulse() {
        struct Script(std::cell::RefCell<Vec<bool>>);
        impl LevelInput for Script {
            fn level(&self) -> bool {
                let mut levels = self.0.borrow_mut();
                if levels.len() > 1 {
                    levels.remove(0)
                } else {
                    levels[0]
                }
            }
        }

        let knob = VirtKnob::new(0.5);
        // Idle, rising edge, held high, falling edge completes the tick.
        let script = Script(std::cell::RefCell::new(vec![
            false, false, true, true, false,
        ]));
        let config = ClockConfig {
            external_poll: Duration::ZERO,
            ..ClockConfig::default()
        };
        let mut c = Clock::new(config, Box::new(knob), Box::new(script)).unwrap();
        c.toggle_source();
        assert_eq!(c.source(), ClockSource::External);
        // Returns once the scripted pulse completes; a hang here would be a
        // missed edge.
        c.wait();
    }

    #[test]
    fn switching_back_to_internal_reprimes_the_window() {
        let knob = VirtKnob::new(0.0);
        let gate = VirtGate::new();
        let config = ClockConfig {
            min_bpm: 100.0,
            max_bpm: 200.0,
            smoothing: 4,
            ..ClockConfig::default()
        };
        let mut c = clock(config, &knob, &gate);
        c.toggle_source();
        knob.set(1.0);
        c.toggle_source();
        // The stale 100 bpm samples are gone after the explicit switch.
        assert_eq!(c.tempo_bpm(), 200.0);
    }
}
