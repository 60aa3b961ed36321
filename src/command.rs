//! Command interpreter - turns a transcript into a switcher action
//!
//! Rules are applied in order:
//! 1. Empty input is rejected
//! 2. Anything containing "stop" requests shutdown
//! 3. Phrases starting with "test" arm the session
//! 4. Nothing else passes until the session is armed
//! 5. Leading filler words are dropped, keeping "<source> cut" compounds
//! 6. Over-long commands and rapid repeats are rejected
//! 7. Unknown vocabulary is rejected and asks for a session reset

use std::fmt;
use std::time::{Duration, Instant};

use crate::config::SessionConfig;
use crate::phonetic::PhoneticTable;
use crate::switcher::{InputMapping, Source};

/// Switcher action produced by an accepted command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Readiness phrase heard
    Arm,
    /// Stage a source on preview
    SelectPreview(Source),
    /// Put a source straight on program
    DirectCut(Source),
    /// Instant preview -> program transition
    Cut,
    /// Timed preview -> program transition
    Mix,
}

impl Action {
    /// Canonical command text for this action
    pub fn command(&self) -> String {
        match self {
            Action::Arm => "test".to_string(),
            Action::SelectPreview(source) => source.key.clone(),
            Action::DirectCut(source) => format!("{} cut", source.key),
            Action::Cut => "cut".to_string(),
            Action::Mix => "mix".to_string(),
        }
    }
}

/// Why a transcript did not become an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    NotArmed,
    TooLong,
    Duplicate,
    Unrecognized,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Empty => write!(f, "empty"),
            Rejection::NotArmed => write!(f, "not armed"),
            Rejection::TooLong => write!(f, "too long"),
            Rejection::Duplicate => write!(f, "duplicate"),
            Rejection::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

/// Result of interpreting one transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpretation {
    Accepted(Action),
    Rejected(Rejection),
    /// Operator asked to shut down
    Shutdown,
}

impl Interpretation {
    /// Repeated garbage means the recognition stream has degraded
    pub fn requests_reset(&self) -> bool {
        matches!(self, Interpretation::Rejected(Rejection::Unrecognized))
    }
}

/// One transcript as seen by the interpreter
#[derive(Debug, Clone)]
pub struct CommandEvent {
    pub raw_text: String,
    /// Canonical command after normalization and filler reduction
    pub normalized: String,
    pub timestamp: Instant,
}

/// Readiness and clock for one interpretation
#[derive(Debug, Clone, Copy)]
pub struct InterpretContext {
    pub armed: bool,
    pub now: Instant,
}

#[derive(Debug)]
pub struct Interpreted {
    pub event: CommandEvent,
    pub outcome: Interpretation,
}

/// Last accepted command and when it was accepted
#[derive(Debug, Clone, Default)]
pub struct DedupWindow {
    last_command: Option<String>,
    last_at: Option<Instant>,
}

impl DedupWindow {
    fn is_duplicate(&self, command: &str, now: Instant, window: Duration) -> bool {
        match (&self.last_command, self.last_at) {
            (Some(last), Some(at)) => {
                last == command && now.saturating_duration_since(at) < window
            }
            _ => false,
        }
    }

    fn record(&mut self, command: &str, now: Instant) {
        self.last_command = Some(command.to_string());
        self.last_at = Some(now);
    }

    pub fn clear(&mut self) {
        self.last_command = None;
        self.last_at = None;
    }

    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }
}

/// Command interpreter - owns the dedup window, so keep exactly one per worker
#[derive(Debug, Clone)]
pub struct CommandInterpreter {
    table: PhoneticTable,
    inputs: InputMapping,
    dedup: DedupWindow,
    dedup_window: Duration,
    max_words: usize,
}

impl CommandInterpreter {
    pub fn new(table: PhoneticTable, inputs: InputMapping, session: &SessionConfig) -> Self {
        Self {
            table,
            inputs,
            dedup: DedupWindow::default(),
            dedup_window: session.dedup_window(),
            max_words: session.max_command_words,
        }
    }

    pub fn normalize(&self, text: &str) -> String {
        self.table.normalize(text)
    }

    pub fn dedup(&self) -> &DedupWindow {
        &self.dedup
    }

    /// Forget the last accepted command (new recognition session)
    pub fn clear_dedup(&mut self) {
        self.dedup.clear();
    }

    pub fn interpret(&mut self, transcript: &str, ctx: InterpretContext) -> Interpreted {
        let mut event = CommandEvent {
            raw_text: transcript.to_string(),
            normalized: String::new(),
            timestamp: ctx.now,
        };
        let outcome = self.evaluate(transcript, ctx, &mut event.normalized);
        Interpreted { event, outcome }
    }

    fn evaluate(
        &mut self,
        transcript: &str,
        ctx: InterpretContext,
        normalized_out: &mut String,
    ) -> Interpretation {
        if transcript.trim().is_empty() {
            return Interpretation::Rejected(Rejection::Empty);
        }

        if transcript.to_lowercase().contains("stop") {
            *normalized_out = "stop".to_string();
            return Interpretation::Shutdown;
        }

        let normalized = self.table.normalize(transcript);
        if normalized.starts_with("test") {
            *normalized_out = "test".to_string();
            return Interpretation::Accepted(Action::Arm);
        }

        if !ctx.armed {
            *normalized_out = normalized;
            return Interpretation::Rejected(Rejection::NotArmed);
        }

        let command = self.reduce(&normalized);
        *normalized_out = command.clone();

        if command.split_whitespace().count() > self.max_words {
            return Interpretation::Rejected(Rejection::TooLong);
        }

        if self.dedup.is_duplicate(&command, ctx.now, self.dedup_window) {
            return Interpretation::Rejected(Rejection::Duplicate);
        }

        match self.resolve(&command) {
            Some(action) => {
                self.dedup.record(&command, ctx.now);
                Interpretation::Accepted(action)
            }
            None => Interpretation::Rejected(Rejection::Unrecognized),
        }
    }

    /// Keep "<source> cut", otherwise treat everything but the last word as filler
    fn reduce(&self, normalized: &str) -> String {
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        match tokens.as_slice() {
            [key, "cut"] if self.inputs.contains(key) => normalized.to_string(),
            [.., last] if tokens.len() > 1 => last.to_string(),
            _ => normalized.to_string(),
        }
    }

    fn resolve(&self, command: &str) -> Option<Action> {
        if let Some(source) = self.inputs.source(command) {
            return Some(Action::SelectPreview(source));
        }
        match command {
            "cut" => return Some(Action::Cut),
            "mix" => return Some(Action::Mix),
            _ => {}
        }
        let prefix = command.strip_suffix("cut")?.trim();
        self.inputs.source(prefix).map(Action::DirectCut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, builtin_phonetic_table};

    fn interpreter() -> CommandInterpreter {
        let config = Config::default();
        CommandInterpreter::new(
            PhoneticTable::new(builtin_phonetic_table()),
            InputMapping::from_config(&config.switcher),
            &config.session,
        )
    }

    fn armed(now: Instant) -> InterpretContext {
        InterpretContext { armed: true, now }
    }

    fn source(key: &str, id: &str) -> Source {
        Source {
            key: key.to_string(),
            id: id.to_string(),
        }
    }

    #[test]
    fn test_empty_rejected() {
        let mut interp = interpreter();
        let now = Instant::now();
        let result = interp.interpret("   ", armed(now));
        assert_eq!(result.outcome, Interpretation::Rejected(Rejection::Empty));
    }

    #[test]
    fn test_arm_phrases() {
        let mut interp = interpreter();
        let ctx = InterpretContext {
            armed: false,
            now: Instant::now(),
        };
        assert_eq!(
            interp.interpret("Test", ctx).outcome,
            Interpretation::Accepted(Action::Arm)
        );
        assert_eq!(
            interp.interpret("testing one two", ctx).outcome,
            Interpretation::Accepted(Action::Arm)
        );
        // Still Arm once armed; the session decides it is only an acknowledgement
        assert_eq!(
            interp.interpret("test", armed(Instant::now())).outcome,
            Interpretation::Accepted(Action::Arm)
        );
    }

    #[test]
    fn test_not_armed_blocks_commands() {
        let mut interp = interpreter();
        let ctx = InterpretContext {
            armed: false,
            now: Instant::now(),
        };
        for text in ["two", "cut", "mix", "four cut", "banana"] {
            assert_eq!(
                interp.interpret(text, ctx).outcome,
                Interpretation::Rejected(Rejection::NotArmed),
                "'{}' should be blocked",
                text
            );
        }
        assert!(interp.dedup().last_command().is_none());
    }

    #[test]
    fn test_stop_requests_shutdown() {
        let mut interp = interpreter();
        let ctx = InterpretContext {
            armed: false,
            now: Instant::now(),
        };
        assert_eq!(interp.interpret("Stop", ctx).outcome, Interpretation::Shutdown);
        assert_eq!(
            interp.interpret("please stop now", armed(Instant::now())).outcome,
            Interpretation::Shutdown
        );
    }

    #[test]
    fn test_select_preview() {
        let mut interp = interpreter();
        let result = interp.interpret("two", armed(Instant::now()));
        assert_eq!(
            result.outcome,
            Interpretation::Accepted(Action::SelectPreview(source("2", "input2")))
        );
        assert_eq!(result.event.normalized, "2");
        assert_eq!(result.event.raw_text, "two");
    }

    #[test]
    fn test_direct_cut_compound() {
        let mut interp = interpreter();
        assert_eq!(
            interp.interpret("four cut", armed(Instant::now())).outcome,
            Interpretation::Accepted(Action::DirectCut(source("4", "input4")))
        );
        assert_eq!(
            interp.interpret("pick 2 cut", armed(Instant::now())).outcome,
            Interpretation::Accepted(Action::DirectCut(source("p2", "ddr2")))
        );
    }

    #[test]
    fn test_split_source_keys() {
        let mut interp = interpreter();
        assert_eq!(
            interp.interpret("m too", armed(Instant::now())).outcome,
            Interpretation::Accepted(Action::SelectPreview(source("m2", "V2")))
        );
        assert_eq!(
            interp.interpret("p too", armed(Instant::now())).outcome,
            Interpretation::Accepted(Action::SelectPreview(source("p2", "ddr2")))
        );
        let result = interp.interpret("m one", armed(Instant::now()));
        assert_eq!(
            result.outcome,
            Interpretation::Accepted(Action::SelectPreview(source("m1", "V1")))
        );
        assert_eq!(result.event.normalized, "m1");
    }

    #[test]
    fn test_direct_cut_without_space() {
        let mut interp = interpreter();
        assert_eq!(
            interp.interpret("m1cut", armed(Instant::now())).outcome,
            Interpretation::Accepted(Action::DirectCut(source("m1", "V1")))
        );
    }

    #[test]
    fn test_filler_words_keep_last_token() {
        let mut interp = interpreter();
        let result = interp.interpret("okay switch to camera three", armed(Instant::now()));
        assert_eq!(
            result.outcome,
            Interpretation::Accepted(Action::SelectPreview(source("3", "input3")))
        );
        assert_eq!(result.event.normalized, "3");

        let result = interp.interpret("and now mix", armed(Instant::now()));
        assert_eq!(result.outcome, Interpretation::Accepted(Action::Mix));
    }

    #[test]
    fn test_unknown_source_before_cut_reduces_to_cut() {
        let mut interp = interpreter();
        assert_eq!(
            interp.interpret("nine cut", armed(Instant::now())).outcome,
            Interpretation::Accepted(Action::Cut)
        );
    }

    #[test]
    fn test_too_long_with_tight_limit() {
        let config = Config::default();
        let mut session = config.session.clone();
        session.max_command_words = 1;
        let mut interp = CommandInterpreter::new(
            PhoneticTable::new(builtin_phonetic_table()),
            InputMapping::from_config(&config.switcher),
            &session,
        );
        assert_eq!(
            interp.interpret("four cut", armed(Instant::now())).outcome,
            Interpretation::Rejected(Rejection::TooLong)
        );
    }

    #[test]
    fn test_duplicate_window() {
        let mut interp = interpreter();
        let t0 = Instant::now();
        assert!(matches!(
            interp.interpret("cut", armed(t0)).outcome,
            Interpretation::Accepted(Action::Cut)
        ));
        assert_eq!(
            interp
                .interpret("cut", armed(t0 + Duration::from_millis(100)))
                .outcome,
            Interpretation::Rejected(Rejection::Duplicate)
        );
        assert_eq!(
            interp
                .interpret("cut", armed(t0 + Duration::from_millis(300)))
                .outcome,
            Interpretation::Accepted(Action::Cut)
        );
    }

    #[test]
    fn test_different_command_not_duplicate() {
        let mut interp = interpreter();
        let t0 = Instant::now();
        interp.interpret("two", armed(t0));
        assert!(matches!(
            interp
                .interpret("cut", armed(t0 + Duration::from_millis(10)))
                .outcome,
            Interpretation::Accepted(Action::Cut)
        ));
    }

    #[test]
    fn test_clear_dedup_allows_repeat() {
        let mut interp = interpreter();
        let t0 = Instant::now();
        interp.interpret("cut", armed(t0));
        interp.clear_dedup();
        assert!(matches!(
            interp
                .interpret("cut", armed(t0 + Duration::from_millis(50)))
                .outcome,
            Interpretation::Accepted(Action::Cut)
        ));
    }

    #[test]
    fn test_unrecognized_requests_reset() {
        let mut interp = interpreter();
        let result = interp.interpret("banana", armed(Instant::now()));
        assert_eq!(
            result.outcome,
            Interpretation::Rejected(Rejection::Unrecognized)
        );
        assert!(result.outcome.requests_reset());
        assert!(interp.dedup().last_command().is_none());
    }

    #[test]
    fn test_rejections_do_not_request_reset() {
        for rejection in [
            Rejection::Empty,
            Rejection::NotArmed,
            Rejection::TooLong,
            Rejection::Duplicate,
        ] {
            assert!(!Interpretation::Rejected(rejection).requests_reset());
        }
        assert!(!Interpretation::Shutdown.requests_reset());
    }

    #[test]
    fn test_action_command_text() {
        assert_eq!(Action::DirectCut(source("p1", "ddr1")).command(), "p1 cut");
        assert_eq!(Action::SelectPreview(source("2", "input2")).command(), "2");
        assert_eq!(Action::Cut.command(), "cut");
    }
}
