//! Clock divider bank.
//!
//! Fans one master clock out into N independent sub-clocks, each firing
//! every Dth tick. Divisions are edited at runtime by cycling a selection
//! through the outputs and sampling a knob against a fixed set of useful
//! divisor values. Every change is mirrored to an optional observer (a
//! display or the expander serial link) without ever blocking the tick.

use std::time::Duration;

use crate::io::ports::{ContinuousInput, DigitalOutput};
use crate::runtime::SnapshotSink;
use crate::scale::bucket;

/// Divisor values reachable from the edit knob.
pub const DIVISION_CHOICES: [u8; 10] = [1, 2, 3, 4, 5, 6, 7, 8, 12, 16];

/// Bank geometry and policies.
#[derive(Debug, Clone)]
pub struct DividerConfig {
    /// Initial division per output jack.
    pub divisions: Vec<u8>,
    /// How long fired outputs are held high.
    pub pulse_width: Duration,
    /// Whether editing a division realigns that output's phase counter.
    /// Off by default: a running pattern keeps its phase across an edit.
    pub reset_counter_on_change: bool,
}

impl Default for DividerConfig {
    fn default() -> Self {
        Self {
            divisions: vec![1, 2, 4, 8],
            pulse_width: crate::TRIGGER_WIDTH,
            reset_counter_on_change: false,
        }
    }
}

/// Errors rejected when constructing a bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DividerError {
    /// The bank needs at least one output.
    NoOutputs,
    /// A division of zero would never fire and breaks the countdown.
    ZeroDivision { index: usize },
    /// One output jack per division.
    OutputMismatch { outputs: usize, divisions: usize },
}

impl std::fmt::Display for DividerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DividerError::NoOutputs => write!(f, "divider bank needs at least one output"),
            DividerError::ZeroDivision { index } => {
                write!(f, "division for output {} is zero", index)
            }
            DividerError::OutputMismatch { outputs, divisions } => write!(
                f,
                "got {} output jacks for {} divisions",
                outputs, divisions
            ),
        }
    }
}

impl std::error::Error for DividerError {}

/// Copyable view of the bank's editable state, pushed to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DivisionSnapshot {
    /// Output currently selected for editing, if any.
    pub selected: Option<u8>,
    pub divisions: Vec<u8>,
}

/// N countdown dividers over one clock.
pub struct DividerBank {
    divisions: Vec<u8>,
    counters: Vec<u8>,
    selected: Option<usize>,
    prev_choice: Option<usize>,
    pulse_width: Duration,
    reset_counter_on_change: bool,
    choice_knob: Box<dyn ContinuousInput + Send>,
    outs: Vec<Box<dyn DigitalOutput + Send>>,
    sink: Option<Box<dyn SnapshotSink<DivisionSnapshot> + Send>>,
    fired: Vec<bool>,
}

impl std::fmt::Debug for DividerBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DividerBank")
            .field("divisions", &self.divisions)
            .field("counters", &self.counters)
            .field("selected", &self.selected)
            .field("prev_choice", &self.prev_choice)
            .field("pulse_width", &self.pulse_width)
            .field("reset_counter_on_change", &self.reset_counter_on_change)
            .field("fired", &self.fired)
            .finish_non_exhaustive()
    }
}

impl DividerBank {
    pub fn new(
        config: DividerConfig,
        choice_knob: Box<dyn ContinuousInput + Send>,
        outs: Vec<Box<dyn DigitalOutput + Send>>,
    ) -> Result<DividerBank, DividerError> {
        if config.divisions.is_empty() {
            return Err(DividerError::NoOutputs);
        }
        if let Some(index) = config.divisions.iter().position(|&d| d == 0) {
            return Err(DividerError::ZeroDivision { index });
        }
        if outs.len() != config.divisions.len() {
            return Err(DividerError::OutputMismatch {
                outputs: outs.len(),
                divisions: config.divisions.len(),
            });
        }

        let count = config.divisions.len();
        Ok(DividerBank {
            // Start every counter at 1 so all outputs fire together on the
            // first tick.
            counters: vec![1; count],
            divisions: config.divisions,
            selected: None,
            prev_choice: None,
            pulse_width: config.pulse_width,
            reset_counter_on_change: config.reset_counter_on_change,
            choice_knob,
            outs,
            sink: None,
            fired: vec![false; count],
        })
    }

    /// Attach an observer for division-state changes.
    pub fn with_sink(mut self, sink: Box<dyn SnapshotSink<DivisionSnapshot> + Send>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn divisions(&self) -> &[u8] {
        &self.divisions
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn snapshot(&self) -> DivisionSnapshot {
        DivisionSnapshot {
            selected: self.selected.map(|s| s as u8),
            divisions: self.divisions.clone(),
        }
    }

    /// Count one master tick down on every output; fire the ones that
    /// reach zero. Outputs firing on the same tick are raised together,
    /// held for the pulse width, and cleared together.
    pub fn on_tick(&mut self) {
        for i in 0..self.divisions.len() {
            self.counters[i] -= 1;
            if self.counters[i] == 0 {
                self.fired[i] = true;
                self.counters[i] = self.divisions[i];
            }
        }

        for (out, &fired) in self.outs.iter_mut().zip(&self.fired) {
            if fired {
                out.set(true);
            }
        }
        std::thread::sleep(self.pulse_width);
        for (out, fired) in self.outs.iter_mut().zip(&mut self.fired) {
            if *fired {
                out.set(false);
                *fired = false;
            }
        }
    }

    /// Cycle the edit selection through the outputs, then back to "not
    /// editing".
    pub fn select_next_output(&mut self) {
        self.selected = match self.selected {
            None => Some(0),
            Some(i) if i + 1 == self.divisions.len() => None,
            Some(i) => Some(i + 1),
        };
        self.notify();
    }

    /// Sample the choice knob and, if an output is selected and the mapped
    /// choice moved since the last sample, overwrite its division. The
    /// moved-since-last-sample guard keeps a stationary knob from
    /// re-writing (and re-notifying) every tick.
    pub fn adjust_division(&mut self) {
        let choice = bucket(self.choice_knob.read(), DIVISION_CHOICES.len());
        let Some(selected) = self.selected else {
            return;
        };
        if Some(choice) == self.prev_choice {
            return;
        }
        self.prev_choice = Some(choice);
        self.divisions[selected] = DIVISION_CHOICES[choice];
        if self.reset_counter_on_change {
            self.counters[selected] = self.divisions[selected];
        }
        log::debug!(
            "divider: output {} set to /{}",
            selected,
            self.divisions[selected]
        );
        self.notify();
    }

    fn notify(&mut self) {
        if let Some(sink) = &mut self.sink {
            let snapshot = DivisionSnapshot {
                selected: self.selected.map(|s| s as u8),
                divisions: self.divisions.clone(),
            };
            sink.push(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::virt::{VirtGateOut, VirtKnob};

    fn bank(config: DividerConfig, knob: &VirtKnob) -> (DividerBank, Vec<VirtGateOut>) {
        let jacks: Vec<VirtGateOut> = (0..config.divisions.len())
            .map(|_| VirtGateOut::new())
            .collect();
        let outs: Vec<Box<dyn DigitalOutput + Send>> = jacks
            .iter()
            .map(|j| Box::new(j.clone()) as Box<dyn DigitalOutput + Send>)
            .collect();
        let bank = DividerBank::new(config, Box::new(knob.clone()), outs).unwrap();
        (bank, jacks)
    }

    fn fast(divisions: Vec<u8>) -> DividerConfig {
        DividerConfig {
            divisions,
            pulse_width: Duration::ZERO,
            reset_counter_on_change: false,
        }
    }

    #[test]
    fn construction_rejects_bad_config() {
        let knob = VirtKnob::new(0.0);
        let err = DividerBank::new(fast(vec![]), Box::new(knob.clone()), vec![]).unwrap_err();
        assert_eq!(err, DividerError::NoOutputs);

        let err = DividerBank::new(
            fast(vec![1, 0]),
            Box::new(knob.clone()),
            vec![
                Box::new(VirtGateOut::new()),
                Box::new(VirtGateOut::new()),
            ],
        )
        .unwrap_err();
        assert_eq!(err, DividerError::ZeroDivision { index: 1 });

        let err = DividerBank::new(fast(vec![1, 2]), Box::new(knob), vec![]).unwrap_err();
        assert_eq!(
            err,
            DividerError::OutputMismatch {
                outputs: 0,
                divisions: 2
            }
        );
    }

    #[test]
    fn default_divisions_fire_8_4_2_1_over_eight_ticks() {
        let knob = VirtKnob::new(0.0);
        let (mut bank, jacks) = bank(fast(vec![1, 2, 4, 8]), &knob);
        for _ in 0..8 {
            bank.on_tick();
        }
        let fires: Vec<usize> = jacks.iter().map(|j| j.rises()).collect();
        assert_eq!(fires, vec![8, 4, 2, 1]);
    }

    #[test]
    fn fires_are_evenly_spaced_over_the_lcm() {
        // lcm(3, 4) = 12; two cycles.
        let knob = VirtKnob::new(0.0);
        let (mut bank, jacks) = bank(fast(vec![3, 4]), &knob);
        for _ in 0..24 {
            bank.on_tick();
        }
        assert_eq!(jacks[0].rises(), 8);
        assert_eq!(jacks[1].rises(), 6);
    }

    #[test]
    fn selection_cycles_through_outputs_then_disables() {
        let knob = VirtKnob::new(0.0);
        let (mut bank, _jacks) = bank(fast(vec![1, 2]), &knob);
        assert_eq!(bank.selected(), None);
        bank.select_next_output();
        assert_eq!(bank.selected(), Some(0));
        bank.select_next_output();
        assert_eq!(bank.selected(), Some(1));
        bank.select_next_output();
        assert_eq!(bank.selected(), None);
    }

    #[test]
    fn knob_edits_only_the_selected_output() {
        let knob = VirtKnob::new(0.999); // maps to the last choice, /16
        let (mut bank, _jacks) = bank(fast(vec![1, 2, 4, 8]), &knob);

        // Nothing selected: the knob is ignored.
        bank.adjust_division();
        assert_eq!(bank.divisions(), &[1, 2, 4, 8]);

        bank.select_next_output();
        bank.adjust_division();
        assert_eq!(bank.divisions(), &[16, 2, 4, 8]);

        // Stationary knob: no further writes.
        bank.adjust_division();
        assert_eq!(bank.divisions(), &[16, 2, 4, 8]);

        // Knob moved to the first choice, /1.
        knob.set(0.0);
        bank.adjust_division();
        assert_eq!(bank.divisions(), &[1, 2, 4, 8]);
    }

    #[test]
    fn division_edit_keeps_phase_by_default() {
        let knob = VirtKnob::new(0.0);
        let (mut bank, jacks) = bank(fast(vec![4]), &knob);
        bank.on_tick(); // fires, counter back to 4
        bank.on_tick(); // counter 3

        // Edit to /2 mid-cycle; the countdown continues from 3, so the next
        // fire still lands two ticks out.
        bank.select_next_output();
        knob.set(0.15); // second choice, /2
        bank.adjust_division();
        assert_eq!(bank.divisions(), &[2]);
        bank.on_tick(); // counter 2
        bank.on_tick(); // counter 1
        assert_eq!(jacks[0].rises(), 1);
        bank.on_tick(); // counter 0: fires
        assert_eq!(jacks[0].rises(), 2);
    }

    #[test]
    fn division_edit_can_realign_phase() {
        let knob = VirtKnob::new(0.0);
        let config = DividerConfig {
            divisions: vec![4],
            pulse_width: Duration::ZERO,
            reset_counter_on_change: true,
        };
        let (mut bank, jacks) = bank(config, &knob);
        bank.on_tick();
        bank.on_tick();

        bank.select_next_output();
        knob.set(0.15); // /2
        bank.adjust_division();
        bank.on_tick(); // realigned: counter was reset to 2, now 1
        bank.on_tick(); // fires
        assert_eq!(jacks[0].rises(), 2);
    }

    #[test]
    fn changes_notify_the_sink() {
        struct Collect(std::sync::Arc<std::sync::Mutex<Vec<DivisionSnapshot>>>);
        impl SnapshotSink<DivisionSnapshot> for Collect {
            fn push(&mut self, snapshot: DivisionSnapshot) {
                self.0.lock().unwrap().push(snapshot);
            }
        }

        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let knob = VirtKnob::new(0.999);
        let outs: Vec<Box<dyn DigitalOutput + Send>> = vec![Box::new(VirtGateOut::new())];
        let mut bank = DividerBank::new(fast(vec![4]), Box::new(knob), outs)
            .unwrap()
            .with_sink(Box::new(Collect(seen.clone())));

        bank.select_next_output();
        bank.adjust_division();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].selected, Some(0));
        assert_eq!(seen[1].divisions, vec![16]);
    }
}
