//! The simulated front panel.
//!
//! One set of virtual jacks shared between the rig thread (which reads the
//! knobs and drives the outputs) and the TUI (which moves the knobs and
//! meters the outputs).

use tickwork::io::virt::{VirtCvOut, VirtGate, VirtGateOut, VirtKnob};

pub struct Panel {
    pub knob1: VirtKnob,
    pub knob2: VirtKnob,
    pub pulse_in: VirtGate,
    pub cv: [VirtCvOut; 4],
    pub gates: [VirtGateOut; 4],
}

impl Panel {
    pub fn new() -> Self {
        Self {
            // Centered knobs: 150 bpm on the default tempo range.
            knob1: VirtKnob::new(0.5),
            knob2: VirtKnob::new(0.5),
            pulse_in: VirtGate::new(),
            cv: std::array::from_fn(|_| VirtCvOut::new()),
            gates: std::array::from_fn(|_| VirtGateOut::new()),
        }
    }

    pub fn cv_values(&self) -> [u16; 4] {
        std::array::from_fn(|i| self.cv[i].get())
    }

    pub fn gate_levels(&self) -> [bool; 4] {
        std::array::from_fn(|i| self.gates[i].get())
    }
}
