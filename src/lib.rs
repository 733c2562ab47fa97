pub mod arp;
pub mod clock; // Master tick source: internal tempo or external pulse
pub mod divider;
pub mod io;
pub mod runtime; // Cooperative tick loop and control-event plumbing
pub mod scale;
pub mod sequencer;

/// Standard trigger pulse width for digital output jacks.
pub const TRIGGER_WIDTH: std::time::Duration = std::time::Duration::from_millis(10);

/// Guard against a maximum reading indexing one past the end of a table.
pub(crate) const CONTROL_EPSILON: f32 = 1e-4;
