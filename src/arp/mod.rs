//! Arpeggiator.
//!
//! Walks a fixed note collection in four simultaneous orders - ascending,
//! descending, bidirectional, and random - writing each to its own CV jack
//! every tick. Unlike the sequencer there is no per-step memory: the walk
//! is recomputed from the collection and the step counter alone. A button
//! rotates through the available collections; a knob windows the walk down
//! to one, two, or three octaves.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::io::ports::{AnalogOutput, ContinuousInput, DigitalOutput};
use crate::scale::{bucket, ScaleTable, MAX_OCTAVES};

/// A walkable note collection: a scale table plus whether its per-octave
/// window should close on the octave note.
#[derive(Debug, Clone)]
pub struct NoteSet {
    pub table: Arc<ScaleTable>,
    pub ends_on_octave: bool,
}

impl NoteSet {
    pub fn new(table: Arc<ScaleTable>, ends_on_octave: bool) -> Self {
        Self {
            table,
            ends_on_octave,
        }
    }
}

/// The collections the panel button rotates through.
pub fn standard_collections() -> Vec<NoteSet> {
    let set = |name: &str, steps: &[u8], ends_on_octave: bool| {
        let table = ScaleTable::from_steps(name, steps, MAX_OCTAVES)
            .expect("standard scale patterns are valid");
        NoteSet::new(Arc::new(table), ends_on_octave)
    };
    let chromatic: Vec<u8> = (1..=12).collect();
    vec![
        set("Major scale", &[1, 3, 5, 6, 8, 10, 12], true),
        set("Minor scale", &[1, 3, 4, 6, 8, 9, 11], true),
        set("Major triad", &[1, 5, 8], false),
        set("Minor triad", &[1, 4, 8], false),
        set("Major pentatonic", &[1, 3, 5, 6, 8], false),
        set("Minor pentatonic", &[1, 4, 5, 6, 9], false),
        set("Chromatic scale", &chromatic, true),
        set("Octave", &[1], true),
        set("Octave + 7th", &[1, 12], false),
    ]
}

/// The four CV jacks, one per walk order.
pub struct ArpJacks {
    pub forward: Box<dyn AnalogOutput + Send>,
    pub backward: Box<dyn AnalogOutput + Send>,
    pub bidirectional: Box<dyn AnalogOutput + Send>,
    pub random: Box<dyn AnalogOutput + Send>,
}

/// The four trigger jacks: every tick, cycle start, every third step,
/// every fourth step.
pub struct ArpTriggers {
    pub master: Box<dyn DigitalOutput + Send>,
    pub cycle: Box<dyn DigitalOutput + Send>,
    pub third: Box<dyn DigitalOutput + Send>,
    pub fourth: Box<dyn DigitalOutput + Send>,
}

/// Pulse width for the trigger fan.
#[derive(Debug, Clone)]
pub struct ArpConfig {
    pub pulse_width: Duration,
}

impl Default for ArpConfig {
    fn default() -> Self {
        Self {
            pulse_width: crate::TRIGGER_WIDTH,
        }
    }
}

/// Errors rejected when constructing an arpeggiator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArpError {
    /// The rotation needs at least one collection.
    NoCollections,
}

impl std::fmt::Display for ArpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArpError::NoCollections => write!(f, "arpeggiator needs at least one collection"),
        }
    }
}

impl std::error::Error for ArpError {}

/// Copyable view of the walk state, pushed to observers.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArpSnapshot {
    pub collection: String,
    pub step: usize,
    pub forward: bool,
    pub octaves: u8,
    pub effective_len: usize,
}

/// Stateless-per-tick pattern walker.
pub struct Arpeggiator {
    sets: Vec<NoteSet>,
    active: usize,
    step: usize,
    bi_forward: bool,
    octaves: u8,
    range_knob: Box<dyn ContinuousInput + Send>,
    jacks: ArpJacks,
    triggers: ArpTriggers,
    pulse_width: Duration,
    rng: StdRng,
}

impl std::fmt::Debug for Arpeggiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arpeggiator")
            .field("sets", &self.sets)
            .field("active", &self.active)
            .field("step", &self.step)
            .field("bi_forward", &self.bi_forward)
            .field("octaves", &self.octaves)
            .field("pulse_width", &self.pulse_width)
            .finish_non_exhaustive()
    }
}

impl Arpeggiator {
    pub fn new(
        config: ArpConfig,
        sets: Vec<NoteSet>,
        range_knob: Box<dyn ContinuousInput + Send>,
        jacks: ArpJacks,
        triggers: ArpTriggers,
    ) -> Result<Arpeggiator, ArpError> {
        if sets.is_empty() {
            return Err(ArpError::NoCollections);
        }
        let octaves = read_octaves(range_knob.as_ref());
        Ok(Arpeggiator {
            sets,
            active: 0,
            step: 0,
            bi_forward: true,
            octaves,
            range_knob,
            jacks,
            triggers,
            pulse_width: config.pulse_width,
            rng: StdRng::from_os_rng(),
        })
    }

    pub fn collection_name(&self) -> &str {
        self.sets[self.active].table.name()
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Number of notes the walk covers at the current octave range.
    pub fn effective_len(&self) -> usize {
        let set = &self.sets[self.active];
        let n = set.table.len();
        let mut len = (n / MAX_OCTAVES as usize) * self.octaves as usize;
        if set.ends_on_octave {
            len += 1;
        }
        len.clamp(1, n)
    }

    pub fn snapshot(&self) -> ArpSnapshot {
        ArpSnapshot {
            collection: self.collection_name().to_string(),
            step: self.step,
            forward: self.bi_forward,
            octaves: self.octaves,
            effective_len: self.effective_len(),
        }
    }

    /// Rewind the walk to the first note, ascending.
    pub fn restart(&mut self) {
        self.step = 0;
        self.bi_forward = true;
    }

    /// Swap in the next collection of the rotation and restart.
    pub fn next_collection(&mut self) {
        self.active = (self.active + 1) % self.sets.len();
        self.restart();
        log::debug!("arp: collection {}", self.collection_name());
    }

    /// One clocked step: track the range knob, write all four walk orders,
    /// fire the trigger fan, advance.
    pub fn tick(&mut self) {
        // A range change would leave the step counter pointing past the new
        // effective length, so it forces a restart.
        let octaves = read_octaves(self.range_knob.as_ref());
        if octaves != self.octaves {
            self.octaves = octaves;
            self.restart();
        }

        let len = self.effective_len();
        let window = &self.sets[self.active].table.notes()[..len];
        let forward = window[self.step];
        let backward = window[len - 1 - self.step];
        let bi = if self.bi_forward { forward } else { backward };
        let random = window[self.rng.random_range(0..len)];

        self.jacks.forward.set(forward);
        self.jacks.backward.set(backward);
        self.jacks.bidirectional.set(bi);
        self.jacks.random.set(random);

        // Raise the whole trigger fan for this step, then clear it together.
        self.triggers.master.set(true);
        if self.step == 0 {
            self.triggers.cycle.set(true);
        }
        if self.step % 3 == 0 {
            self.triggers.third.set(true);
        }
        if self.step % 4 == 0 {
            self.triggers.fourth.set(true);
        }
        std::thread::sleep(self.pulse_width);
        self.triggers.master.set(false);
        self.triggers.cycle.set(false);
        self.triggers.third.set(false);
        self.triggers.fourth.set(false);

        if self.step + 1 >= len {
            self.step = 0;
            self.bi_forward = !self.bi_forward;
        } else {
            self.step += 1;
        }
    }
}

fn read_octaves(knob: &(dyn ContinuousInput + Send)) -> u8 {
    bucket(knob.read(), MAX_OCTAVES as usize) as u8 + 1
}
