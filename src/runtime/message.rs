//! Control-event and snapshot plumbing.
//!
//! Button callbacks and UI threads never touch component state directly:
//! they enqueue a `ControlEvent`, and the rig drains the queue at the top
//! of each pass. Snapshots flow the other way through a `SnapshotSink`
//! that must never block the tick - the rtrb implementations drop on a
//! full ring rather than wait.

#[cfg(feature = "rtrb")]
use rtrb::{Consumer, Producer};

use crate::io::button::Press;

/// An intent enqueued by a callback context, applied by the tick loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    PressA(Press),
    PressB(Press),
    ToggleClockSource,
}

/// Source of pending control events.
pub trait EventSource {
    fn pop(&mut self) -> Option<ControlEvent>;
}

#[cfg(feature = "rtrb")]
impl EventSource for Consumer<ControlEvent> {
    fn pop(&mut self) -> Option<ControlEvent> {
        Consumer::pop(self).ok()
    }
}

/// Fire-and-forget receiver for state snapshots.
pub trait SnapshotSink<T> {
    fn push(&mut self, snapshot: T);
}

#[cfg(feature = "rtrb")]
impl<T> SnapshotSink<T> for Producer<T> {
    fn push(&mut self, snapshot: T) {
        // A full ring means the observer fell behind; drop rather than block.
        let _ = Producer::push(self, snapshot);
    }
}
