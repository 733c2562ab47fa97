//! Cooperative tick loop.
//!
//! A `Rig` wires one clock, one event queue, and one active program
//! together. Each pass drains pending control events, then either waits on
//! the clock and steps the program, or - for programs that are not
//! clock-driven right now, like a sequencer in Edit mode - runs one idle
//! pass and sleeps briefly. Every component is owned and mutated by
//! exactly one rig pass; observers only ever see snapshot copies.

mod message;

pub use message::{ControlEvent, EventSource, SnapshotSink};

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::arp::{ArpSnapshot, Arpeggiator};
use crate::clock::{Clock, ClockSource};
use crate::divider::{DividerBank, DivisionSnapshot};
use crate::io::button::Press;
use crate::sequencer::{SeqMode, SeqSnapshot, Sequencer};

/// How often an unclocked program samples its controls between ticks.
pub const IDLE_POLL: Duration = Duration::from_millis(10);

/// Snapshot of whichever program the rig is running.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProgramSnapshot {
    Sequencer(SeqSnapshot),
    Arpeggiator(ArpSnapshot),
    Divider(DivisionSnapshot),
}

/// Snapshot of the whole rig, pushed to the observer after every pass.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RigSnapshot {
    pub tempo_bpm: f32,
    pub source: ClockSource,
    pub program: ProgramSnapshot,
}

/// One top-level behavior driven by the rig.
pub trait Program {
    /// Apply a drained control event. Runs between ticks, never mid-step.
    fn handle_event(&mut self, event: ControlEvent);

    /// Whether the next pass should wait on the clock.
    fn wants_clock(&self) -> bool {
        true
    }

    /// One clocked step.
    fn tick(&mut self);

    /// One unclocked pass.
    fn idle(&mut self) {}

    fn snapshot(&self) -> ProgramSnapshot;
}

impl Program for Sequencer {
    fn handle_event(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::PressA(press) => self.on_button_a(press),
            ControlEvent::PressB(press) => self.on_button_b(press),
            ControlEvent::ToggleClockSource => {}
        }
    }

    fn wants_clock(&self) -> bool {
        self.running() && self.mode() == SeqMode::Play
    }

    fn tick(&mut self) {
        self.play_step();
        self.advance();
    }

    fn idle(&mut self) {
        self.edit_tick();
    }

    fn snapshot(&self) -> ProgramSnapshot {
        ProgramSnapshot::Sequencer(self.snapshot())
    }
}

impl Program for Arpeggiator {
    fn handle_event(&mut self, event: ControlEvent) {
        if let ControlEvent::PressA(Press::Short) = event {
            self.next_collection();
        }
    }

    fn tick(&mut self) {
        self.tick();
    }

    fn snapshot(&self) -> ProgramSnapshot {
        ProgramSnapshot::Arpeggiator(self.snapshot())
    }
}

impl Program for DividerBank {
    fn handle_event(&mut self, event: ControlEvent) {
        if let ControlEvent::PressB(Press::Short) = event {
            self.select_next_output();
        }
    }

    fn tick(&mut self) {
        self.on_tick();
        self.adjust_division();
    }

    fn snapshot(&self) -> ProgramSnapshot {
        ProgramSnapshot::Divider(self.snapshot())
    }
}

impl<P: Program + ?Sized> Program for Box<P> {
    fn handle_event(&mut self, event: ControlEvent) {
        (**self).handle_event(event)
    }

    fn wants_clock(&self) -> bool {
        (**self).wants_clock()
    }

    fn tick(&mut self) {
        (**self).tick()
    }

    fn idle(&mut self) {
        (**self).idle()
    }

    fn snapshot(&self) -> ProgramSnapshot {
        (**self).snapshot()
    }
}

/// One clock, one event queue, one program.
pub struct Rig<P> {
    clock: Clock,
    events: Box<dyn EventSource + Send>,
    program: P,
    observer: Option<Box<dyn SnapshotSink<RigSnapshot> + Send>>,
}

impl<P: Program> Rig<P> {
    pub fn new(clock: Clock, events: Box<dyn EventSource + Send>, program: P) -> Self {
        Self {
            clock,
            events,
            program,
            observer: None,
        }
    }

    /// Attach an observer receiving a `RigSnapshot` after every pass.
    pub fn with_observer(mut self, observer: Box<dyn SnapshotSink<RigSnapshot> + Send>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn program(&self) -> &P {
        &self.program
    }

    /// One cooperative pass: drain events, then tick or idle.
    pub fn step(&mut self) {
        while let Some(event) = self.events.pop() {
            match event {
                ControlEvent::ToggleClockSource => self.clock.toggle_source(),
                other => self.program.handle_event(other),
            }
        }

        if self.program.wants_clock() {
            self.clock.wait();
            self.program.tick();
        } else {
            self.program.idle();
            std::thread::sleep(IDLE_POLL);
        }

        if let Some(observer) = &mut self.observer {
            observer.push(RigSnapshot {
                tempo_bpm: self.clock.tempo_bpm(),
                source: self.clock.source(),
                program: self.program.snapshot(),
            });
        }
    }

    /// Run passes until `stop` is raised. The flag is checked between
    /// passes only: an in-flight clock wait is never interrupted, so a
    /// stop (like a source switch) takes effect at the next tick boundary.
    pub fn run_until(&mut self, stop: &AtomicBool) {
        while !stop.load(Ordering::Relaxed) {
            self.step();
        }
    }
}

#[cfg(all(test, feature = "rtrb"))]
mod tests {
    use super::*;
    use crate::clock::ClockConfig;
    use crate::divider::{DividerConfig, DividerError};
    use crate::io::ports::DigitalOutput;
    use crate::io::virt::{VirtGate, VirtGateOut, VirtKnob};

    fn divider_rig() -> Result<(Rig<DividerBank>, VirtGate, Vec<VirtGateOut>), DividerError> {
        let tempo_knob = VirtKnob::new(1.0);
        let pulse = VirtGate::new();
        let clock = Clock::new(
            ClockConfig {
                external_poll: Duration::from_micros(200),
                ..ClockConfig::default()
            },
            Box::new(tempo_knob),
            Box::new(pulse.clone()),
        )
        .unwrap();

        let jacks: Vec<VirtGateOut> = (0..4).map(|_| VirtGateOut::new()).collect();
        let outs: Vec<Box<dyn DigitalOutput + Send>> = jacks
            .iter()
            .map(|j| Box::new(j.clone()) as Box<dyn DigitalOutput + Send>)
            .collect();
        let bank = DividerBank::new(
            DividerConfig {
                pulse_width: Duration::ZERO,
                ..DividerConfig::default()
            },
            Box::new(VirtKnob::new(0.0)),
            outs,
        )?;

        let (mut producer, consumer) = rtrb::RingBuffer::new(8);
        producer
            .push(ControlEvent::ToggleClockSource)
            .expect("fresh ring has room");

        Ok((Rig::new(clock, Box::new(consumer), bank), pulse, jacks))
    }

    #[test]
    fn rig_drains_events_then_ticks_on_the_external_pulse() {
        let (mut rig, pulse, jacks) = divider_rig().unwrap();

        // The rig blocks in wait() until the pulse completes, so drive the
        // pulse from a second thread. A few spare pulses at the end keep a
        // slow test runner from stranding the last wait.
        let driver = std::thread::spawn(move || {
            for _ in 0..12 {
                std::thread::sleep(Duration::from_millis(3));
                pulse.set(true);
                std::thread::sleep(Duration::from_millis(3));
                pulse.set(false);
            }
        });

        for _ in 0..8 {
            rig.step();
        }
        driver.join().unwrap();

        // The queued source toggle was applied before the first wait.
        assert_eq!(rig.clock.source(), ClockSource::External);
        let fires: Vec<usize> = jacks.iter().map(|j| j.rises()).collect();
        assert_eq!(fires, vec![8, 4, 2, 1]);
    }
}
