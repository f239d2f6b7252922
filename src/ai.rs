//! AiBroadcaster — fan-out of unsolicited CAT frames to every connected
//! rigctl session and any in-process subscriber.
//!
//! Delivery is best-effort per session: a full/closed channel just drops
//! that one subscriber rather than blocking the others (spec.md §4.5).

use crate::cat::cowlist::CowList;
use crate::cat::frame::CatFrame;
use tokio::sync::mpsc;

/// A single rigctl session's outbound line channel, registered for AI fan-out.
pub type AiSink = mpsc::UnboundedSender<String>;

#[derive(Default)]
pub struct AiBroadcaster {
    sessions: CowList<(u64, AiSink)>,
}

impl AiBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rigctl session's outbound sink under `session_id`.
    pub fn register(&self, session_id: u64, sink: AiSink) {
        self.sessions.push((session_id, sink));
    }

    /// Removes a session, e.g. on disconnect.
    pub fn unregister(&self, session_id: u64) {
        self.sessions.retain(|(id, _)| *id != session_id);
    }

    /// Formats and fans out one CAT frame as `AI:<raw-frame>\n` to every
    /// registered session. Sessions whose channel is closed are left for
    /// the session task itself to unregister on its next disconnect check.
    pub fn broadcast(&self, frame: &CatFrame) {
        let line = format!("AI:{}\n", frame.raw);
        for (_, sink) in self.sessions.snapshot().iter() {
            let _ = sink.send(line.clone());
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
