//! Switcher state machine - tracks program/preview and turns actions into
//! device commands.
//!
//! Updates are optimistic: the local state changes even when the device
//! rejects or times out, and failures are only logged.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::command::{Action, Rejection};
use crate::config::{InputEntry, SwitcherConfig};
use crate::device::{DeviceCommand, DeviceControl, Row};
use crate::feedback::{EventSink, SessionEvent};
use crate::state::SessionState;

/// A spoken source key and its switcher input name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub key: String,
    pub id: String,
}

/// Ordered key -> source table
#[derive(Debug, Clone)]
pub struct InputMapping {
    entries: Vec<InputEntry>,
}

impl InputMapping {
    pub fn new(entries: Vec<InputEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| InputEntry {
                key: e.key.trim().to_lowercase(),
                source: e.source,
            })
            .collect();
        Self { entries }
    }

    pub fn from_config(config: &SwitcherConfig) -> Self {
        Self::new(config.inputs.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    pub fn source(&self, key: &str) -> Option<Source> {
        self.entries.iter().find(|e| e.key == key).map(|e| Source {
            key: e.key.clone(),
            id: e.source.clone(),
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    /// Source ids of the first two entries, used as initial program/preview
    fn initial_pair(&self) -> (String, String) {
        let mut ids = self.entries.iter().map(|e| e.source.clone());
        let program = ids.next().unwrap_or_default();
        let preview = ids.next().unwrap_or_else(|| program.clone());
        (program, preview)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitcherState {
    pub program: String,
    pub preview: String,
    pub first_input_received: bool,
}

/// What one applied action did on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Applied {
    pub dispatched: usize,
    pub failed: usize,
}

pub struct Switcher {
    state: SwitcherState,
    device: Arc<dyn DeviceControl>,
    events: EventSink,
    direct_cut_settle: Duration,
}

impl Switcher {
    pub fn new(
        inputs: &InputMapping,
        config: &SwitcherConfig,
        device: Arc<dyn DeviceControl>,
        events: EventSink,
    ) -> Self {
        let (program, preview) = inputs.initial_pair();
        Self {
            state: SwitcherState {
                program,
                preview,
                first_input_received: !config.bootstrap_program,
            },
            device,
            events,
            direct_cut_settle: config.direct_cut_settle(),
        }
    }

    pub fn state(&self) -> &SwitcherState {
        &self.state
    }

    /// Apply an action. Everything except `Arm` needs an armed session;
    /// `Arm` itself is handled by the session and never touches the device.
    pub fn apply(&mut self, action: &Action, session: SessionState) -> Result<Applied, Rejection> {
        if matches!(action, Action::Arm) {
            return Ok(Applied::default());
        }
        if !session.is_armed() {
            return Err(Rejection::NotArmed);
        }

        let mut applied = Applied::default();
        match action {
            Action::Arm => {}
            Action::SelectPreview(source) => {
                self.state.preview = source.id.clone();
                self.dispatch(
                    DeviceCommand::SetNamedInput {
                        row: Row::B,
                        source: source.id.clone(),
                    },
                    &mut applied,
                );
                if !self.state.first_input_received {
                    self.state.program = source.id.clone();
                    self.state.first_input_received = true;
                    info!(source = %source.id, "first source, program follows preview");
                }
                info!(program = %self.state.program, preview = %self.state.preview, "preview set");
            }
            Action::DirectCut(source) => {
                self.state.program = source.id.clone();
                self.dispatch(
                    DeviceCommand::SetNamedInput {
                        row: Row::A,
                        source: source.id.clone(),
                    },
                    &mut applied,
                );
                if !self.direct_cut_settle.is_zero() {
                    thread::sleep(self.direct_cut_settle);
                }
                self.dispatch(DeviceCommand::Take, &mut applied);
                info!(program = %self.state.program, "quick cut");
                self.events.announce("Quick cut");
            }
            Action::Cut => {
                self.state.program = self.state.preview.clone();
                self.dispatch(DeviceCommand::Take, &mut applied);
                info!(program = %self.state.program, preview = %self.state.preview, "cut");
                self.events.announce("Cut");
            }
            Action::Mix => {
                self.state.program = self.state.preview.clone();
                self.dispatch(DeviceCommand::AutoTransition, &mut applied);
                info!(program = %self.state.program, preview = %self.state.preview, "mix");
                self.events.announce("Mix");
            }
        }

        self.events.emit(SessionEvent::Tally {
            program: self.state.program.clone(),
            preview: self.state.preview.clone(),
        });
        Ok(applied)
    }

    fn dispatch(&self, command: DeviceCommand, applied: &mut Applied) {
        match self.device.send(&command) {
            Ok(()) => {
                debug!(command = %command, port = self.device.name(), "sent");
                applied.dispatched += 1;
                self.events.emit(SessionEvent::Dispatched(command));
            }
            Err(e) => {
                warn!(command = %command, error = %e, "device dispatch failed");
                applied.failed += 1;
            }
        }
    }
}
