//! tickrack - a virtual rack for the tickwork control core.
//!
//! Runs one of the brain module's programs (sequencer, arpeggiator, clock
//! divider) against a simulated front panel: keyboard keys stand in for
//! the two buttons and the external clock pulse, arrow keys for the two
//! knobs, and the output jacks are metered on screen.
//!
//! Run with: cargo run

mod app;
mod panel;
mod ui;

use app::App;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    // The TUI owns stdout, so diagnostics go to a file.
    let _ = simplelog::WriteLogger::init(
        simplelog::LevelFilter::Debug,
        simplelog::Config::default(),
        std::fs::File::create("tickrack.log")?,
    );

    let mut terminal = ratatui::init();
    let result = App::new().run(&mut terminal);
    ratatui::restore();
    result
}
