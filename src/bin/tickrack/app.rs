//! tickrack - application state and worker management.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use color_eyre::eyre::Result as EyreResult;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::DefaultTerminal;

use tickwork::arp::{ArpConfig, Arpeggiator, ArpJacks, ArpTriggers};
use tickwork::clock::{Clock, ClockConfig};
use tickwork::divider::{DividerBank, DividerConfig};
use tickwork::io::button::Press;
use tickwork::io::ports::{AnalogOutput, DigitalOutput};
use tickwork::runtime::{ControlEvent, Program, Rig, RigSnapshot};
use tickwork::scale::ScaleTable;
use tickwork::sequencer::{RowJacks, Sequencer, SequencerConfig};

use super::panel::Panel;
use super::ui;

/// How long a keyboard-triggered external clock pulse stays high. Longer
/// than the clock's poll interval so the edge is never missed.
const KEY_PULSE_WIDTH: Duration = Duration::from_millis(20);

const KNOB_STEP: f32 = 0.05;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProgramKind {
    Sequencer,
    Arpeggiator,
    Divider,
}

impl ProgramKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProgramKind::Sequencer => "sequencer",
            ProgramKind::Arpeggiator => "arpeggiator",
            ProgramKind::Divider => "divider",
        }
    }
}

/// A running rig on its worker thread.
struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    events: rtrb::Producer<ControlEvent>,
    snapshots: rtrb::Consumer<RigSnapshot>,
}

/// What the UI needs to draw one frame.
pub struct View<'a> {
    pub kind: ProgramKind,
    pub snapshot: Option<&'a RigSnapshot>,
    pub knobs: [f32; 2],
    pub cv: [u16; 4],
    pub gates: [bool; 4],
    pub pulse: bool,
}

pub struct App {
    panel: Panel,
    kind: ProgramKind,
    worker: Option<Worker>,
    latest: Option<RigSnapshot>,
    pulse_clear_at: Option<Instant>,
    should_quit: bool,
}

impl App {
    pub fn new() -> Self {
        Self {
            panel: Panel::new(),
            kind: ProgramKind::Sequencer,
            worker: None,
            latest: None,
            pulse_clear_at: None,
            should_quit: false,
        }
    }

    pub fn run(&mut self, terminal: &mut DefaultTerminal) -> EyreResult<()> {
        self.switch(ProgramKind::Sequencer)?;

        while !self.should_quit {
            self.poll_snapshots();
            self.maybe_clear_pulse();

            {
                let view = View {
                    kind: self.kind,
                    snapshot: self.latest.as_ref(),
                    knobs: [self.panel.knob1.get(), self.panel.knob2.get()],
                    cv: self.panel.cv_values(),
                    gates: self.panel.gate_levels(),
                    pulse: self.panel.pulse_in.get(),
                };
                terminal.draw(|frame| ui::render(frame, &view))?;
            }

            // Keyboard input, non-blocking at ~60fps.
            if event::poll(Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code)?;
                    }
                }
            }
        }

        self.stop_worker();
        Ok(())
    }

    fn handle_key(&mut self, code: KeyCode) -> EyreResult<()> {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,

            KeyCode::Char('1') => self.switch(ProgramKind::Sequencer)?,
            KeyCode::Char('2') => self.switch(ProgramKind::Arpeggiator)?,
            KeyCode::Char('3') => self.switch(ProgramKind::Divider)?,

            KeyCode::Char('a') => self.send(ControlEvent::PressA(Press::Short)),
            KeyCode::Char('A') => self.send(ControlEvent::PressA(Press::Long)),
            KeyCode::Char('b') => self.send(ControlEvent::PressB(Press::Short)),
            KeyCode::Char('B') => self.send(ControlEvent::PressB(Press::Long)),
            KeyCode::Char('c') => self.send(ControlEvent::ToggleClockSource),

            KeyCode::Char('x') => {
                self.panel.pulse_in.set(true);
                self.pulse_clear_at = Some(Instant::now() + KEY_PULSE_WIDTH);
            }

            KeyCode::Left => self.nudge(0, -KNOB_STEP),
            KeyCode::Right => self.nudge(0, KNOB_STEP),
            KeyCode::Down => self.nudge(1, -KNOB_STEP),
            KeyCode::Up => self.nudge(1, KNOB_STEP),

            _ => {}
        }
        Ok(())
    }

    fn nudge(&mut self, knob: usize, delta: f32) {
        let knob = if knob == 0 {
            &self.panel.knob1
        } else {
            &self.panel.knob2
        };
        knob.set(knob.get() + delta);
    }

    fn send(&mut self, event: ControlEvent) {
        if let Some(worker) = &mut self.worker {
            // A full queue means the rig is wedged on a stalled external
            // clock; dropping the press mirrors real button behavior.
            let _ = worker.events.push(event);
        }
    }

    fn poll_snapshots(&mut self) {
        if let Some(worker) = &mut self.worker {
            while let Ok(snapshot) = worker.snapshots.pop() {
                self.latest = Some(snapshot);
            }
        }
    }

    fn maybe_clear_pulse(&mut self) {
        if let Some(at) = self.pulse_clear_at {
            if Instant::now() >= at {
                self.panel.pulse_in.set(false);
                self.pulse_clear_at = None;
            }
        }
    }

    fn switch(&mut self, kind: ProgramKind) -> EyreResult<()> {
        if self.worker.is_some() && self.kind == kind {
            return Ok(());
        }
        self.stop_worker();
        self.kind = kind;
        self.latest = None;

        let clock = Clock::new(
            ClockConfig::default(),
            Box::new(self.panel.knob1.clone()),
            Box::new(self.panel.pulse_in.clone()),
        )?;
        let program = self.build_program(kind)?;

        let (event_tx, event_rx) = rtrb::RingBuffer::new(64);
        let (snapshot_tx, snapshot_rx) = rtrb::RingBuffer::new(256);

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let mut rig = Rig::new(clock, Box::new(event_rx), program)
            .with_observer(Box::new(snapshot_tx));
        let handle = std::thread::spawn(move || rig.run_until(&thread_stop));

        log::info!("started {} rig", kind.name());
        self.worker = Some(Worker {
            stop,
            handle,
            events: event_tx,
            snapshots: snapshot_rx,
        });
        Ok(())
    }

    fn build_program(&self, kind: ProgramKind) -> EyreResult<Box<dyn Program + Send>> {
        let cv = |i: usize| Box::new(self.panel.cv[i].clone()) as Box<dyn AnalogOutput + Send>;
        let gate = |i: usize| Box::new(self.panel.gates[i].clone()) as Box<dyn DigitalOutput + Send>;

        let program: Box<dyn Program + Send> = match kind {
            ProgramKind::Sequencer => Box::new(Sequencer::new(
                SequencerConfig::default(),
                ScaleTable::chromatic(),
                Box::new(self.panel.knob1.clone()),
                Box::new(self.panel.knob2.clone()),
                vec![
                    RowJacks {
                        pitch: cv(0),
                        velocity: cv(1),
                    },
                    RowJacks {
                        pitch: cv(2),
                        velocity: cv(3),
                    },
                ],
                gate(0),
                gate(1),
                vec![gate(2), gate(3)],
            )?),
            ProgramKind::Arpeggiator => Box::new(Arpeggiator::new(
                ArpConfig::default(),
                tickwork::arp::standard_collections(),
                Box::new(self.panel.knob2.clone()),
                ArpJacks {
                    forward: cv(0),
                    backward: cv(1),
                    bidirectional: cv(2),
                    random: cv(3),
                },
                ArpTriggers {
                    master: gate(0),
                    cycle: gate(1),
                    third: gate(2),
                    fourth: gate(3),
                },
            )?),
            ProgramKind::Divider => Box::new(DividerBank::new(
                DividerConfig::default(),
                Box::new(self.panel.knob2.clone()),
                (0..4).map(gate).collect(),
            )?),
        };
        Ok(program)
    }

    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::Relaxed);
            // Release the rig if it is blocked waiting on the external
            // pulse input.
            self.panel.pulse_in.set(true);
            std::thread::sleep(Duration::from_millis(5));
            self.panel.pulse_in.set(false);
            let _ = worker.handle.join();
        }
    }
}
