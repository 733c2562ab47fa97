//! Expander serial link.
//!
//! The divider bank mirrors its division state to a remote display module
//! over a byte-oriented serial link. The wire record is five signed bytes in
//! fixed order - selected output then the four divisions - with no checksum
//! and no framing. Receivers treat a malformed or partial read as ignorable
//! noise, never a fatal error.

use std::io::Write;

use crate::divider::DivisionSnapshot;
use crate::runtime::SnapshotSink;

/// Serialized division state record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DivisionFrame {
    /// Selected output index, or -1 when not editing.
    pub selected: i8,
    pub divisions: [i8; 4],
}

impl DivisionFrame {
    pub const LEN: usize = 5;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        [
            self.selected as u8,
            self.divisions[0] as u8,
            self.divisions[1] as u8,
            self.divisions[2] as u8,
            self.divisions[3] as u8,
        ]
    }

    /// Decode a received buffer. Anything that is not exactly one
    /// well-formed record yields `None`.
    pub fn from_bytes(raw: &[u8]) -> Option<DivisionFrame> {
        if raw.len() != Self::LEN {
            return None;
        }
        let selected = raw[0] as i8;
        if !(-1..4).contains(&(selected as i32)) {
            return None;
        }
        let mut divisions = [0i8; 4];
        for (d, &b) in divisions.iter_mut().zip(&raw[1..]) {
            *d = b as i8;
            if *d < 1 {
                return None;
            }
        }
        Some(DivisionFrame {
            selected,
            divisions,
        })
    }

    /// Build a frame from a bank snapshot. Snapshots that do not describe
    /// exactly four outputs have no wire representation.
    pub fn from_snapshot(snapshot: &DivisionSnapshot) -> Option<DivisionFrame> {
        if snapshot.divisions.len() != 4 {
            return None;
        }
        let mut divisions = [0i8; 4];
        for (d, &v) in divisions.iter_mut().zip(&snapshot.divisions) {
            *d = i8::try_from(v).ok()?;
        }
        Some(DivisionFrame {
            selected: snapshot.selected.map_or(-1, |s| s as i8),
            divisions,
        })
    }
}

/// Fire-and-forget adapter from division snapshots onto a serial writer.
///
/// Write errors are dropped: the link must never block or fail tick
/// processing.
pub struct FrameLink<W: Write> {
    port: W,
}

impl<W: Write> FrameLink<W> {
    pub fn new(port: W) -> Self {
        Self { port }
    }
}

impl<W: Write> SnapshotSink<DivisionSnapshot> for FrameLink<W> {
    fn push(&mut self, snapshot: DivisionSnapshot) {
        if let Some(frame) = DivisionFrame::from_snapshot(&snapshot) {
            let _ = self.port.write_all(&frame.to_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips() {
        let frame = DivisionFrame {
            selected: 2,
            divisions: [1, 2, 12, 16],
        };
        assert_eq!(DivisionFrame::from_bytes(&frame.to_bytes()), Some(frame));
    }

    #[test]
    fn not_editing_encodes_as_minus_one() {
        let snapshot = DivisionSnapshot {
            selected: None,
            divisions: vec![1, 2, 4, 8],
        };
        let frame = DivisionFrame::from_snapshot(&snapshot).unwrap();
        assert_eq!(frame.selected, -1);
        assert_eq!(frame.to_bytes()[0], 0xff);
    }

    #[test]
    fn malformed_buffers_decode_to_none() {
        // Partial read.
        assert_eq!(DivisionFrame::from_bytes(&[0, 1, 2]), None);
        // Oversized read.
        assert_eq!(DivisionFrame::from_bytes(&[0, 1, 2, 4, 8, 8]), None);
        // Zero division.
        assert_eq!(DivisionFrame::from_bytes(&[0, 0, 2, 4, 8]), None);
        // Selected index out of range.
        assert_eq!(DivisionFrame::from_bytes(&[9, 1, 2, 4, 8]), None);
    }

    #[test]
    fn link_writes_one_record_per_change() {
        let mut link = FrameLink::new(Vec::new());
        link.push(DivisionSnapshot {
            selected: Some(1),
            divisions: vec![1, 2, 4, 8],
        });
        assert_eq!(link.port, vec![1, 1, 2, 4, 8]);
    }
}
