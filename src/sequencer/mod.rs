//! Step sequencer.
//!
//! A grid of per-step pitch/velocity values across one or more rows. In
//! Play mode the step pointer advances on every clock tick; in Edit mode
//! the grid is mutated at the addressed cell from the two continuous
//! controls, and the pointer moves only on an explicit "next step" action.
//! Mode and row switching are driven by short/long presses on the two
//! panel buttons.

use std::sync::Arc;
use std::time::Duration;

use crate::io::button::Press;
use crate::io::ports::{AnalogOutput, ContinuousInput, DigitalOutput};
use crate::scale::ScaleTable;

/// Top-level sequencer mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SeqMode {
    /// Knobs write into the addressed step; the clock is not consulted.
    Edit,
    /// Steps advance on each clock tick while running.
    Play,
}

/// One cell of the sequence grid.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SequenceStep {
    pub pitch: u16,
    pub velocity: u16,
}

impl Default for SequenceStep {
    fn default() -> Self {
        // Silent pitch, full velocity: audible as soon as a pitch is dialed.
        Self {
            pitch: 0,
            velocity: u16::MAX,
        }
    }
}

/// The pitch and velocity CV jacks for one row.
pub struct RowJacks {
    pub pitch: Box<dyn AnalogOutput + Send>,
    pub velocity: Box<dyn AnalogOutput + Send>,
}

/// Grid geometry, pulse widths, and edit policies.
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    pub rows: usize,
    pub seq_len: usize,
    /// Bits dropped from the velocity knob reading: keeping only the top
    /// bits suppresses control noise.
    pub velocity_shift: u32,
    /// Step trigger pulse width.
    pub trigger_width: Duration,
    /// Edit-mode position marker blink.
    pub marker_width: Duration,
    /// Longer marker blink signalling the pattern wrapped to step 0.
    pub restart_width: Duration,
    /// Whether previewing a step in Edit mode also writes the current knob
    /// values into it.
    pub write_on_preview: bool,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            rows: 2,
            seq_len: 8,
            velocity_shift: 9,
            trigger_width: crate::TRIGGER_WIDTH,
            marker_width: crate::TRIGGER_WIDTH,
            restart_width: Duration::from_millis(500),
            write_on_preview: false,
        }
    }
}

/// Errors rejected when constructing a sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerError {
    /// At least one row.
    NoRows,
    /// At least one step.
    NoSteps,
    /// One jack pair per row.
    RowJackMismatch { rows: usize, jacks: usize },
    /// Row LEDs, when present, must cover every row.
    RowLedMismatch { rows: usize, leds: usize },
}

impl std::fmt::Display for SequencerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequencerError::NoRows => write!(f, "sequencer needs at least one row"),
            SequencerError::NoSteps => write!(f, "sequence length must be at least one step"),
            SequencerError::RowJackMismatch { rows, jacks } => {
                write!(f, "got {} row jack pairs for {} rows", jacks, rows)
            }
            SequencerError::RowLedMismatch { rows, leds } => {
                write!(f, "got {} row LEDs for {} rows", leds, rows)
            }
        }
    }
}

impl std::error::Error for SequencerError {}

/// Copyable view of the sequencer state, pushed to observers.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SeqSnapshot {
    pub mode: SeqMode,
    pub running: bool,
    pub position: usize,
    pub active_row: usize,
    pub steps: Vec<Vec<SequenceStep>>,
}

/// The step-sequencer state machine.
pub struct Sequencer {
    config: SequencerConfig,
    steps: Vec<Vec<SequenceStep>>,
    position: usize,
    active_row: usize,
    mode: SeqMode,
    running: bool,
    prev_pitch: Option<u16>,
    prev_velocity: Option<u16>,
    scale: Arc<ScaleTable>,
    pitch_knob: Box<dyn ContinuousInput + Send>,
    velocity_knob: Box<dyn ContinuousInput + Send>,
    rows: Vec<RowJacks>,
    trigger: Box<dyn DigitalOutput + Send>,
    marker: Box<dyn DigitalOutput + Send>,
    row_leds: Vec<Box<dyn DigitalOutput + Send>>,
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("config", &self.config)
            .field("steps", &self.steps)
            .field("position", &self.position)
            .field("active_row", &self.active_row)
            .field("mode", &self.mode)
            .field("running", &self.running)
            .field("prev_pitch", &self.prev_pitch)
            .field("prev_velocity", &self.prev_velocity)
            .finish_non_exhaustive()
    }
}

impl Sequencer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SequencerConfig,
        scale: Arc<ScaleTable>,
        pitch_knob: Box<dyn ContinuousInput + Send>,
        velocity_knob: Box<dyn ContinuousInput + Send>,
        rows: Vec<RowJacks>,
        trigger: Box<dyn DigitalOutput + Send>,
        marker: Box<dyn DigitalOutput + Send>,
        row_leds: Vec<Box<dyn DigitalOutput + Send>>,
    ) -> Result<Sequencer, SequencerError> {
        if config.rows == 0 {
            return Err(SequencerError::NoRows);
        }
        if config.seq_len == 0 {
            return Err(SequencerError::NoSteps);
        }
        if rows.len() != config.rows {
            return Err(SequencerError::RowJackMismatch {
                rows: config.rows,
                jacks: rows.len(),
            });
        }
        if !row_leds.is_empty() && row_leds.len() != config.rows {
            return Err(SequencerError::RowLedMismatch {
                rows: config.rows,
                leds: row_leds.len(),
            });
        }

        let steps = vec![vec![SequenceStep::default(); config.seq_len]; config.rows];
        let mut seq = Sequencer {
            config,
            steps,
            position: 0,
            active_row: 0,
            mode: SeqMode::Edit,
            running: false,
            prev_pitch: None,
            prev_velocity: None,
            scale,
            pitch_knob,
            velocity_knob,
            rows,
            trigger,
            marker,
            row_leds,
        };
        seq.update_row_leds();
        Ok(seq)
    }

    pub fn mode(&self) -> SeqMode {
        self.mode
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn active_row(&self) -> usize {
        self.active_row
    }

    pub fn seq_len(&self) -> usize {
        self.config.seq_len
    }

    /// Snapshot copy of one cell.
    pub fn step_at(&self, row: usize, position: usize) -> SequenceStep {
        self.steps[row][position]
    }

    pub fn snapshot(&self) -> SeqSnapshot {
        SeqSnapshot {
            mode: self.mode,
            running: self.running,
            position: self.position,
            active_row: self.active_row,
            steps: self.steps.clone(),
        }
    }

    /// Button A: preview (Edit) or play/pause (Play); long press cycles the
    /// edited row while in Edit mode.
    pub fn on_button_a(&mut self, press: Press) {
        match (press, self.mode) {
            (Press::Short, SeqMode::Edit) => self.preview_step(),
            (Press::Short, SeqMode::Play) => self.toggle_run(),
            (Press::Long, SeqMode::Edit) => self.cycle_row(),
            (Press::Long, SeqMode::Play) => {}
        }
    }

    /// Button B: next step (Edit); long press toggles Edit/Play.
    pub fn on_button_b(&mut self, press: Press) {
        match (press, self.mode) {
            (Press::Short, SeqMode::Edit) => {
                self.advance();
            }
            (Press::Short, SeqMode::Play) => {}
            (Press::Long, _) => self.toggle_mode(),
        }
    }

    /// Audition the addressed step immediately.
    fn preview_step(&mut self) {
        if self.config.write_on_preview {
            self.sample_controls(true);
        }
        self.play_step();
    }

    pub fn toggle_run(&mut self) {
        self.running = !self.running;
    }

    fn cycle_row(&mut self) {
        self.active_row = (self.active_row + 1) % self.config.rows;
        self.update_row_leds();
    }

    /// Toggle Edit/Play. Entering Play force-starts the sequence from the
    /// current position; entering Edit stops it and rewinds to step 0.
    pub fn toggle_mode(&mut self) {
        match self.mode {
            SeqMode::Edit => {
                self.mode = SeqMode::Play;
                self.running = true;
                for led in &mut self.row_leds {
                    led.set(false);
                }
            }
            SeqMode::Play => {
                self.mode = SeqMode::Edit;
                self.running = false;
                self.position = 0;
                self.update_row_leds();
            }
        }
    }

    /// Write every row's current step to its jacks and pulse the trigger.
    pub fn play_step(&mut self) {
        for (jacks, row) in self.rows.iter_mut().zip(&self.steps) {
            let step = row[self.position];
            jacks.pitch.set(step.pitch);
            jacks.velocity.set(step.velocity);
        }
        self.trigger.pulse(self.config.trigger_width);
        log::debug!(
            "step {} row {}: {:?}",
            self.position,
            self.active_row,
            self.steps
                .iter()
                .map(|row| row[self.position])
                .collect::<Vec<_>>()
        );
    }

    /// Move the step pointer forward, wrapping at the sequence length.
    /// Returns true when the pattern wrapped back to step 0; in Edit mode
    /// the wrap also shows as a longer marker blink.
    pub fn advance(&mut self) -> bool {
        self.position = (self.position + 1) % self.config.seq_len;
        let wrapped = self.position == 0;
        if self.mode == SeqMode::Edit {
            let width = if wrapped {
                self.config.restart_width
            } else {
                self.config.marker_width
            };
            self.marker.pulse(width);
        }
        wrapped
    }

    /// One unclocked Edit-mode pass: sample both knobs into the addressed
    /// cell, writing only when a mapped value moved since the last write.
    pub fn edit_tick(&mut self) {
        if self.mode != SeqMode::Edit {
            return;
        }
        self.sample_controls(false);
    }

    fn sample_controls(&mut self, force: bool) {
        let pitch = self.scale.quantize(self.pitch_knob.read());
        if force || Some(pitch) != self.prev_pitch {
            self.steps[self.active_row][self.position].pitch = pitch;
            self.prev_pitch = Some(pitch);
        }

        let velocity = self.read_coarse_velocity();
        if force || Some(velocity) != self.prev_velocity {
            self.steps[self.active_row][self.position].velocity = velocity;
            self.prev_velocity = Some(velocity);
        }
    }

    /// Truncate the velocity reading to its top bits: knob noise lives in
    /// the low bits.
    fn read_coarse_velocity(&self) -> u16 {
        let raw = (self.velocity_knob.read().clamp(0.0, 1.0) * u16::MAX as f32) as u16;
        (raw >> self.config.velocity_shift) << self.config.velocity_shift
    }

    fn update_row_leds(&mut self) {
        for (i, led) in self.row_leds.iter_mut().enumerate() {
            led.set(i == self.active_row);
        }
    }
}
