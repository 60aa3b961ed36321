//! Outbound events for presentation and spoken feedback. Both sinks are
//! write-only from the core's point of view.

use crate::command::Rejection;
use crate::device::DeviceCommand;
use crate::state::SessionState;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// Final transcript and what it normalized to
    Heard { raw: String, normalized: String },
    Rejected { command: String, reason: Rejection },
    Dispatched(DeviceCommand),
    /// Program/preview after an action
    Tally { program: String, preview: String },
    /// Short phrase for the text-to-speech collaborator
    Announce(String),
}

/// Fire-and-forget event sender; a missing or closed receiver is fine
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<flume::Sender<SessionEvent>>,
}

impl EventSink {
    pub fn new(tx: flume::Sender<SessionEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that drops everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn announce(&self, message: impl Into<String>) {
        self.emit(SessionEvent::Announce(message.into()));
    }
}
