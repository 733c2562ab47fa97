//! tickrack - panel rendering.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use tickwork::clock::ClockSource;
use tickwork::divider::DivisionSnapshot;
use tickwork::runtime::ProgramSnapshot;
use tickwork::sequencer::{SeqMode, SeqSnapshot};

use super::app::View;

pub fn render(frame: &mut Frame, view: &View) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // transport bar
            Constraint::Min(8),    // program panel
            Constraint::Length(4), // jack meters
            Constraint::Length(1), // help bar
        ])
        .split(frame.area());

    render_transport(frame, chunks[0], view);
    render_program(frame, chunks[1], view);
    render_jacks(frame, chunks[2], view);

    let help = Paragraph::new(
        " [1/2/3] Program  [a/A b/B] Buttons  [arrows] Knobs  [c] Clock source  [x] Pulse  [q] Quit",
    )
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, chunks[3]);
}

fn render_transport(frame: &mut Frame, area: Rect, view: &View) {
    let block = Block::default().title(" tickrack ").borders(Borders::ALL);

    let (tempo, source) = match view.snapshot {
        Some(snapshot) => (snapshot.tempo_bpm, snapshot.source),
        None => (0.0, ClockSource::Internal),
    };
    let source_str = match source {
        ClockSource::Internal => "internal",
        ClockSource::External => "external",
    };
    let pulse = if view.pulse { "▮" } else { "▯" };

    let line = Line::from(vec![
        Span::styled(
            format!(" {}  ", view.kind.name()),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("{:.1} bpm  ", tempo)),
        Span::styled(format!("clock: {}  ", source_str), Style::default().fg(Color::Yellow)),
        Span::raw(format!("pulse in: {}  ", pulse)),
        Span::raw(format!(
            "k1: {:.2}  k2: {:.2}",
            view.knobs[0], view.knobs[1]
        )),
    ]);

    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_program(frame: &mut Frame, area: Rect, view: &View) {
    let block = Block::default().title(" program ").borders(Borders::ALL);

    let lines = match view.snapshot.map(|s| &s.program) {
        Some(ProgramSnapshot::Sequencer(seq)) => sequencer_lines(seq),
        Some(ProgramSnapshot::Arpeggiator(arp)) => vec![
            Line::from(format!("collection: {}", arp.collection)),
            Line::from(format!(
                "step {:>2} / {:<2}  {}",
                arp.step + 1,
                arp.effective_len,
                if arp.forward { "→" } else { "←" }
            )),
            Line::from(format!("octaves: {}", arp.octaves)),
        ],
        Some(ProgramSnapshot::Divider(bank)) => divider_lines(bank),
        None => vec![Line::from("starting...")],
    };

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn sequencer_lines(seq: &SeqSnapshot) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    let status = match (seq.mode, seq.running) {
        (SeqMode::Edit, _) => "EDIT".to_string(),
        (SeqMode::Play, true) => "PLAY ▶".to_string(),
        (SeqMode::Play, false) => "PLAY ⏸".to_string(),
    };
    lines.push(Line::from(format!("{}  step {}", status, seq.position + 1)));
    lines.push(Line::from(""));

    for (r, row) in seq.steps.iter().enumerate() {
        let marker = if r == seq.active_row && seq.mode == SeqMode::Edit {
            "▸"
        } else {
            " "
        };
        let mut spans = vec![Span::raw(format!("{} row {}  ", marker, r + 1))];
        for (i, step) in row.iter().enumerate() {
            let style = if i == seq.position {
                Style::default().fg(Color::Black).bg(Color::Cyan)
            } else {
                Style::default()
            };
            spans.push(Span::styled(format!("{:>6}", step.pitch), style));
        }
        lines.push(Line::from(spans));

        let mut spans = vec![Span::raw("         ")];
        for step in row {
            spans.push(Span::styled(
                format!("{:>6}", step.velocity),
                Style::default().fg(Color::DarkGray),
            ));
        }
        lines.push(Line::from(spans));
    }

    lines
}

fn divider_lines(bank: &DivisionSnapshot) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from("divisions:"), Line::from("")];
    for (i, d) in bank.divisions.iter().enumerate() {
        let selected = bank.selected == Some(i as u8);
        let style = if selected {
            Style::default().fg(Color::Black).bg(Color::Yellow)
        } else {
            Style::default()
        };
        let marker = if selected { "▸" } else { " " };
        lines.push(Line::from(Span::styled(
            format!("{} out {}  /{}", marker, i + 1, d),
            style,
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        if bank.selected.is_some() {
            "knob 2 sets the division; [b] selects the next output"
        } else {
            "[b] to select an output for editing"
        },
        Style::default().fg(Color::DarkGray),
    )));
    lines
}

fn render_jacks(frame: &mut Frame, area: Rect, view: &View) {
    let block = Block::default().title(" jacks ").borders(Borders::ALL);

    let cv = Line::from(format!(
        "cv    a1:{:>5}  a2:{:>5}  a3:{:>5}  a4:{:>5}",
        view.cv[0], view.cv[1], view.cv[2], view.cv[3]
    ));
    let gates = Line::from(vec![
        Span::raw("gate  "),
        gate_span("d1", view.gates[0]),
        gate_span("d2", view.gates[1]),
        gate_span("d3", view.gates[2]),
        gate_span("d4", view.gates[3]),
    ]);

    frame.render_widget(Paragraph::new(vec![cv, gates]).block(block), area);
}

fn gate_span(label: &str, level: bool) -> Span<'static> {
    let dot = if level { "●" } else { "○" };
    let style = if level {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Span::styled(format!("{}:{}  ", label, dot), style)
}
