//! Transcript sources - the recognizer side of the pipeline
//!
//! The speech engine itself lives outside this crate. The supervisor only
//! needs something it can pull `(text, is_final)` pairs from with a bounded
//! wait, and a factory that can hand out a fresh one after a reset.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::thread;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{SwitcherError, SwitcherResult};

/// One recognizer hypothesis
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    pub is_final: bool,
}

impl Transcript {
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }

    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Stream broke mid-session; recoverable by opening a new source
    #[error("transcript stream fault: {0}")]
    Fault(String),

    /// No more transcripts will ever arrive
    #[error("transcript stream ended")]
    Exhausted,
}

pub trait TranscriptSource: Send {
    /// Wait at most `timeout` for the next transcript. `Ok(None)` means nothing
    /// arrived in time.
    fn next_transcript(&mut self, timeout: Duration) -> Result<Option<Transcript>, SourceError>;

    /// Release the underlying stream. Must be safe to call more than once.
    fn close(&mut self) {}
}

/// Opens recognition sessions. Called once at startup and again after every reset.
pub trait SourceFactory: Send {
    fn name(&self) -> &str;
    fn open(&mut self) -> SwitcherResult<Box<dyn TranscriptSource>>;
}

/// Source backed by a channel that a producer thread fills
pub struct ChannelSource {
    rx: Receiver<Transcript>,
    closed: bool,
}

impl ChannelSource {
    pub fn new(rx: Receiver<Transcript>) -> Self {
        Self { rx, closed: false }
    }
}

impl TranscriptSource for ChannelSource {
    fn next_transcript(&mut self, timeout: Duration) -> Result<Option<Transcript>, SourceError> {
        if self.closed {
            return Err(SourceError::Exhausted);
        }
        match self.rx.recv_timeout(timeout) {
            Ok(transcript) => Ok(Some(transcript)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Exhausted),
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Reads transcripts line by line from a reader (stdin or a script file).
///
/// One reader thread feeds a channel for the whole run; every `open()` hands
/// out a new `ChannelSource` on that channel, so a reset never loses lines
/// that were already read.
///
/// Line format: plain text is a final transcript, a leading `~` marks a
/// partial one, `#` starts a comment, blank lines are skipped.
pub struct LineSourceFactory {
    name: String,
    rx: Receiver<Transcript>,
}

impl LineSourceFactory {
    pub fn spawn<R>(name: impl Into<String>, reader: R) -> SwitcherResult<Self>
    where
        R: BufRead + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = flume::unbounded::<Transcript>();

        thread::Builder::new()
            .name(format!("{}-reader", name))
            .spawn(move || {
                for line in reader.lines() {
                    match line {
                        Ok(line) => {
                            if let Some(transcript) = parse_line(&line) {
                                if tx.send(transcript).is_err() {
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "transcript reader failed");
                            break;
                        }
                    }
                }
                debug!("transcript reader finished");
            })?;

        Ok(Self { name, rx })
    }

    pub fn stdin() -> SwitcherResult<Self> {
        Self::spawn("stdin", BufReader::new(io::stdin()))
    }

    pub fn from_file(path: &Path) -> SwitcherResult<Self> {
        let file = File::open(path).map_err(|e| {
            SwitcherError::SourceInit(format!("cannot open {}: {}", path.display(), e))
        })?;
        Self::spawn(path.display().to_string(), BufReader::new(file))
    }
}

impl SourceFactory for LineSourceFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> SwitcherResult<Box<dyn TranscriptSource>> {
        Ok(Box::new(ChannelSource::new(self.rx.clone())))
    }
}

pub fn parse_line(line: &str) -> Option<Transcript> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match line.strip_prefix('~') {
        Some(partial) => {
            let partial = partial.trim();
            (!partial.is_empty()).then(|| Transcript::partial(partial))
        }
        None => Some(Transcript::final_text(line)),
    }
}
