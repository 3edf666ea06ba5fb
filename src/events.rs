//! Event definitions for the application event loop.
//!
//! Run events are produced by the supervisor's reader and watcher tasks; terminal
//! events by the input listener. Everything is drained by one consumer, so the
//! supervisor never runs concurrently with itself.

use crossterm::event::KeyEvent;

/// Identifies one spawned run. Events carrying an old id are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(pub u64);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    /// A chunk of raw output (stdout or stderr, in arrival order).
    RunOutput { run: RunId, chunk: Vec<u8> },
    /// The process exited and both output streams are drained.
    /// `None` means it was terminated by a signal.
    RunExited { run: RunId, code: Option<i32> },
    /// A keyboard event received from the user.
    Key(KeyEvent),
    /// The terminal window was resized.
    Resize,
}
