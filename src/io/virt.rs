//! Virtual jacks.
//!
//! In-memory implementations of the panel capabilities, shared between the
//! rig thread and whoever is simulating the hardware (the TUI panel, or a
//! test). Each port carries a single scalar behind an atomic, so cloned
//! halves stay in sync without locks.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::ports::{AnalogOutput, ContinuousInput, DigitalOutput, LevelInput};

/// A shared normalized knob position.
#[derive(Debug, Clone)]
pub struct VirtKnob(Arc<AtomicU32>);

impl VirtKnob {
    pub fn new(position: f32) -> Self {
        Self(Arc::new(AtomicU32::new(position.clamp(0.0, 1.0).to_bits())))
    }

    pub fn set(&self, position: f32) {
        self.0
            .store(position.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

impl ContinuousInput for VirtKnob {
    fn read(&self) -> f32 {
        self.get()
    }
}

/// A shared digital input level, e.g. a simulated external clock pulse.
#[derive(Debug, Clone, Default)]
pub struct VirtGate(Arc<AtomicBool>);

impl VirtGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, level: bool) {
        self.0.store(level, Ordering::Relaxed);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl LevelInput for VirtGate {
    fn level(&self) -> bool {
        self.get()
    }
}

/// A shared CV output jack, optionally recording every written value.
#[derive(Debug, Clone, Default)]
pub struct VirtCvOut {
    last: Arc<AtomicU16>,
    history: Option<Arc<Mutex<Vec<u16>>>>,
}

impl VirtCvOut {
    pub fn new() -> Self {
        Self::default()
    }

    /// A jack that records every written value, for assertions on the
    /// sequence of writes.
    pub fn recording() -> Self {
        Self {
            last: Arc::new(AtomicU16::new(0)),
            history: Some(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    pub fn get(&self) -> u16 {
        self.last.load(Ordering::Relaxed)
    }

    pub fn take_history(&self) -> Vec<u16> {
        match &self.history {
            Some(h) => std::mem::take(&mut *h.lock().unwrap()),
            None => Vec::new(),
        }
    }
}

impl AnalogOutput for VirtCvOut {
    fn set(&mut self, value: u16) {
        self.last.store(value, Ordering::Relaxed);
        if let Some(h) = &self.history {
            h.lock().unwrap().push(value);
        }
    }
}

/// A shared gate/trigger output jack, counting rising edges.
#[derive(Debug, Clone, Default)]
pub struct VirtGateOut {
    level: Arc<AtomicBool>,
    rises: Arc<AtomicUsize>,
}

impl VirtGateOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> bool {
        self.level.load(Ordering::Relaxed)
    }

    /// Number of low-to-high transitions seen so far.
    pub fn rises(&self) -> usize {
        self.rises.load(Ordering::Relaxed)
    }
}

impl DigitalOutput for VirtGateOut {
    fn set(&mut self, level: bool) {
        let was = self.level.swap(level, Ordering::Relaxed);
        if level && !was {
            self.rises.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn knob_clamps_to_unit_range() {
        let k = VirtKnob::new(2.0);
        assert_eq!(k.read(), 1.0);
        k.set(-1.0);
        assert_eq!(k.read(), 0.0);
    }

    #[test]
    fn gate_out_counts_rising_edges() {
        let mut g = VirtGateOut::new();
        g.pulse(Duration::ZERO);
        g.pulse(Duration::ZERO);
        g.set(true);
        g.set(true); // held high, not a new rise
        assert_eq!(g.rises(), 3);
    }

    #[test]
    fn cv_out_records_history_when_asked() {
        let mut cv = VirtCvOut::recording();
        cv.set(10);
        cv.set(20);
        assert_eq!(cv.get(), 20);
        assert_eq!(cv.take_history(), vec![10, 20]);
        assert!(cv.take_history().is_empty());
    }
}
