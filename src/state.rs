//! Session state - lifecycle of the recognition session, shared between the
//! supervisor and its worker without locks.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of the recognition session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Nothing started yet
    Idle = 0,
    /// Worker consuming transcripts, waiting for the readiness phrase
    Starting = 1,
    /// Readiness confirmed, commands dispatch
    Armed = 2,
    /// Armed and at least one command dispatched this session
    Running = 3,
    /// Worker being replaced
    Resetting = 4,
    /// Terminal
    Stopped = 5,
}

impl From<u8> for SessionState {
    fn from(v: u8) -> Self {
        match v {
            0 => SessionState::Idle,
            1 => SessionState::Starting,
            2 => SessionState::Armed,
            3 => SessionState::Running,
            4 => SessionState::Resetting,
            _ => SessionState::Stopped,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Starting => write!(f, "Starting"),
            SessionState::Armed => write!(f, "Armed"),
            SessionState::Running => write!(f, "Running"),
            SessionState::Resetting => write!(f, "Resetting"),
            SessionState::Stopped => write!(f, "Stopped"),
        }
    }
}

impl SessionState {
    /// Commands may reach the device
    pub fn is_armed(self) -> bool {
        matches!(self, SessionState::Armed | SessionState::Running)
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, Starting) => true,
            (Starting, Armed) => true,
            (Armed, Running) => true,
            (Starting | Armed | Running, Resetting) => true,
            (Resetting, Armed | Starting) => true,
            (Stopped, _) => false,
            (_, Stopped) => true,
            _ => false,
        }
    }
}

/// Atomic session state cell
pub struct SessionStateCell {
    state: AtomicU8,
}

impl SessionStateCell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(SessionState::Idle as u8),
        })
    }

    pub fn get(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_armed(&self) -> bool {
        self.get().is_armed()
    }

    /// Move to `next` if that is a legal step from the current state.
    /// Returns the previous state on success.
    pub fn transition(&self, next: SessionState) -> Result<SessionState, SessionState> {
        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                SessionState::from(cur)
                    .can_transition_to(next)
                    .then_some(next as u8)
            })
            .map(SessionState::from)
            .map_err(SessionState::from)
    }

    /// Move from exactly `from` to `to`; fails if another thread got there first
    pub fn transition_from(&self, from: SessionState, to: SessionState) -> bool {
        from.can_transition_to(to)
            && self
                .state
                .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }
}

impl fmt::Debug for SessionStateCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStateCell")
            .field("state", &self.get())
            .finish()
    }
}

/// Type alias for shared session state
pub type SharedSessionState = Arc<SessionStateCell>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8_round_trip() {
        for state in [
            SessionState::Idle,
            SessionState::Starting,
            SessionState::Armed,
            SessionState::Running,
            SessionState::Resetting,
            SessionState::Stopped,
        ] {
            assert_eq!(SessionState::from(state as u8), state);
        }
    }

    #[test]
    fn test_armed_states() {
        assert!(SessionState::Armed.is_armed());
        assert!(SessionState::Running.is_armed());
        assert!(!SessionState::Starting.is_armed());
        assert!(!SessionState::Resetting.is_armed());
        assert!(!SessionState::Stopped.is_armed());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let cell = SessionStateCell::new();
        assert_eq!(cell.transition(SessionState::Starting), Ok(SessionState::Idle));
        assert!(cell.transition(SessionState::Running).is_err());
        assert!(cell.transition_from(SessionState::Starting, SessionState::Armed));
        assert_eq!(cell.transition(SessionState::Running), Ok(SessionState::Armed));
        assert_eq!(cell.transition(SessionState::Resetting), Ok(SessionState::Running));
        assert_eq!(cell.transition(SessionState::Armed), Ok(SessionState::Resetting));
        assert_eq!(cell.transition(SessionState::Stopped), Ok(SessionState::Armed));
    }

    #[test]
    fn test_stopped_is_terminal() {
        let cell = SessionStateCell::new();
        cell.transition(SessionState::Stopped).unwrap();
        assert_eq!(
            cell.transition(SessionState::Starting),
            Err(SessionState::Stopped)
        );
        assert!(cell.transition(SessionState::Stopped).is_err());
    }

    #[test]
    fn test_arm_only_from_starting() {
        let cell = SessionStateCell::new();
        cell.transition(SessionState::Starting).unwrap();
        cell.transition(SessionState::Resetting).unwrap();
        assert!(!cell.transition_from(SessionState::Starting, SessionState::Armed));
        assert_eq!(cell.get(), SessionState::Resetting);
    }
}
