//! Session supervisor - keeps exactly one transcript worker alive
//!
//! The worker pulls transcripts, interprets them and drives the switcher on
//! its own thread. It owns the interpreter (and with it the dedup window) and
//! the switcher state by value; when it ends it hands both back through its
//! join handle, so a reset can clear the dedup window and pass the same
//! switcher state to the next worker without any lock.
//!
//! A reset always joins the outgoing worker before the next one is spawned,
//! which is what keeps two workers from dispatching at the same time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use crate::command::{Action, CommandInterpreter, InterpretContext, Interpretation};
use crate::config::{Config, SessionConfig, SwitcherConfig};
use crate::device::DeviceControl;
use crate::error::{SwitcherError, SwitcherResult};
use crate::feedback::{EventSink, SessionEvent};
use crate::phonetic::PhoneticTable;
use crate::state::{SessionState, SessionStateCell, SharedSessionState};
use crate::switcher::{InputMapping, Switcher, SwitcherState};
use crate::transcript::{SourceError, SourceFactory, TranscriptSource};

/// Why a worker ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Supervisor asked it to stop
    Cancelled,
    /// Session reached its maximum age
    Rotate,
    /// Transcript stream broke
    Fault(String),
    /// Unparseable command, stream assumed degraded
    Unrecognized,
    /// Operator said "stop"
    Shutdown,
    /// Source will never produce again
    Exhausted,
    /// Worker thread panicked
    Panicked,
}

enum SupervisorEvent {
    WorkerExited { generation: u64, exit: WorkerExit },
    ResetRequested,
    StopRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestartReason {
    Unrecognized,
    StreamFault,
    External,
    Rotation,
}

/// Cloneable control surface for other threads (signal handler, UI)
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: Sender<SupervisorEvent>,
    state: SharedSessionState,
}

impl SupervisorHandle {
    pub fn request_reset(&self) {
        let _ = self.tx.send(SupervisorEvent::ResetRequested);
    }

    pub fn request_stop(&self) {
        let _ = self.tx.send(SupervisorEvent::StopRequested);
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }
}

/// Summary returned when the supervisor stops
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub resets: u32,
    pub rotations: u32,
    pub commands_dispatched: usize,
    pub switcher: SwitcherState,
}

/// State moved into each worker and returned on exit
struct WorkerContext {
    interpreter: CommandInterpreter,
    switcher: Switcher,
    dispatched: usize,
}

/// Everything needed to build a fresh `WorkerContext`
struct ContextSeed {
    table: PhoneticTable,
    inputs: InputMapping,
    switcher: SwitcherConfig,
    session: SessionConfig,
    device: Arc<dyn DeviceControl>,
    events: EventSink,
}

impl ContextSeed {
    fn build(&self) -> WorkerContext {
        WorkerContext {
            interpreter: CommandInterpreter::new(
                self.table.clone(),
                self.inputs.clone(),
                &self.session,
            ),
            switcher: Switcher::new(
                &self.inputs,
                &self.switcher,
                Arc::clone(&self.device),
                self.events.clone(),
            ),
            dispatched: 0,
        }
    }
}

struct ActiveWorker {
    generation: u64,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<WorkerContext>,
}

pub struct Supervisor {
    session: SessionConfig,
    factory: Box<dyn SourceFactory>,
    seed: ContextSeed,
    state: SharedSessionState,
    events: EventSink,
    tx: Sender<SupervisorEvent>,
    rx: Receiver<SupervisorEvent>,
    context: Option<WorkerContext>,
    worker: Option<ActiveWorker>,
    generation: u64,
    resets: u32,
    rotations: u32,
}

impl Supervisor {
    pub fn new(
        config: &Config,
        factory: Box<dyn SourceFactory>,
        device: Arc<dyn DeviceControl>,
        events: EventSink,
    ) -> Self {
        let seed = ContextSeed {
            table: PhoneticTable::from_config(&config.phonetic),
            inputs: InputMapping::from_config(&config.switcher),
            switcher: config.switcher.clone(),
            session: config.session.clone(),
            device,
            events: events.clone(),
        };
        let (tx, rx) = flume::unbounded();

        Self {
            session: config.session.clone(),
            factory,
            context: Some(seed.build()),
            seed,
            state: SessionStateCell::new(),
            events,
            tx,
            rx,
            worker: None,
            generation: 0,
            resets: 0,
            rotations: 0,
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            tx: self.tx.clone(),
            state: Arc::clone(&self.state),
        }
    }

    /// Run until stopped. Only a source that cannot be opened is an error; a
    /// failed reopen still goes through the normal shutdown first.
    pub fn run(mut self) -> SwitcherResult<SessionReport> {
        self.set_state(SessionState::Starting);
        if let Err(e) = self.spawn_worker() {
            self.set_state(SessionState::Stopped);
            return Err(e);
        }
        info!(source = self.factory.name(), "listening, waiting for readiness phrase");
        self.events.announce("Voice switcher started. Say \"test\" when ready.");

        let mut failure = None;
        loop {
            let event = match self.rx.recv_timeout(self.session.poll_interval()) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                // We hold a sender ourselves, so this cannot happen
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let reason = match event {
                SupervisorEvent::WorkerExited { generation, exit } => {
                    if generation != self.generation {
                        debug!(generation, ?exit, "stale worker exit ignored");
                        continue;
                    }
                    match exit {
                        WorkerExit::Cancelled => continue,
                        WorkerExit::Rotate => RestartReason::Rotation,
                        WorkerExit::Fault(_) | WorkerExit::Panicked => RestartReason::StreamFault,
                        WorkerExit::Unrecognized => RestartReason::Unrecognized,
                        WorkerExit::Shutdown | WorkerExit::Exhausted => break,
                    }
                }
                SupervisorEvent::ResetRequested => RestartReason::External,
                SupervisorEvent::StopRequested => break,
            };

            if let Err(e) = self.restart(reason) {
                failure = Some(e);
                break;
            }
        }

        let report = self.shutdown();
        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn set_state(&self, next: SessionState) -> bool {
        set_state(&self.state, &self.events, next)
    }

    fn spawn_worker(&mut self) -> SwitcherResult<()> {
        let source = self.factory.open()?;
        self.start_worker(source)
    }

    /// Start a worker on an open source, handing it the current context
    fn start_worker(&mut self, source: Box<dyn TranscriptSource>) -> SwitcherResult<()> {
        let context = self.context.take().unwrap_or_else(|| self.seed.build());
        let generation = self.generation + 1;
        let cancel = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            generation,
            source,
            context,
            cancel: Arc::clone(&cancel),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            notify: self.tx.clone(),
            max_session: self.session.max_session(),
            poll_interval: self.session.poll_interval(),
        };

        let handle = thread::Builder::new()
            .name(format!("transcript-worker-{}", generation))
            .spawn(move || worker.run())?;

        self.generation = generation;
        self.worker = Some(ActiveWorker {
            generation,
            cancel,
            handle,
        });
        debug!(generation, "worker started");
        Ok(())
    }

    fn open_with_retry(&mut self) -> SwitcherResult<Box<dyn TranscriptSource>> {
        let attempts = self.session.reopen_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.factory.open() {
                Ok(source) => return Ok(source),
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "could not reopen transcript source");
                    last_error = Some(e);
                    if attempt < attempts {
                        thread::sleep(self.session.reopen_delay());
                    }
                }
            }
        }
        Err(SwitcherError::SourceInit(format!(
            "gave up after {} attempts: {}",
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Cancel and join the current worker, returning its context. No-op if none runs.
    fn stop_worker(&mut self) -> WorkerContext {
        match self.worker.take() {
            Some(worker) => {
                worker.cancel.store(true, Ordering::SeqCst);
                match worker.handle.join() {
                    Ok(context) => {
                        debug!(generation = worker.generation, "worker joined");
                        context
                    }
                    Err(_) => {
                        error!(generation = worker.generation, "worker panicked, rebuilding its state");
                        self.seed.build()
                    }
                }
            }
            None => self.context.take().unwrap_or_else(|| self.seed.build()),
        }
    }

    fn restart(&mut self, reason: RestartReason) -> SwitcherResult<()> {
        let before = self.state.get();
        if before == SessionState::Stopped {
            return Ok(());
        }
        let rearm = before.is_armed();
        match reason {
            RestartReason::Rotation => info!(state = %before, "rotating recognition session"),
            _ => warn!(state = %before, ?reason, "resetting recognition session"),
        }

        self.set_state(SessionState::Resetting);
        let mut context = self.stop_worker();
        context.interpreter.clear_dedup();
        self.context = Some(context);

        let source = match self.open_with_retry() {
            Ok(source) => source,
            Err(e) => {
                error!(error = %e, "recognition session could not be restarted");
                return Err(e);
            }
        };

        // The new worker must see the restored state on its first transcript
        self.set_state(if rearm {
            SessionState::Armed
        } else {
            SessionState::Starting
        });
        if let Err(e) = self.start_worker(source) {
            error!(error = %e, "transcript worker could not be started");
            return Err(e);
        }
        match reason {
            RestartReason::Rotation => self.rotations += 1,
            _ => self.resets += 1,
        }
        info!(state = %self.state.get(), "recognition session restarted");
        Ok(())
    }

    fn shutdown(mut self) -> SessionReport {
        self.set_state(SessionState::Stopped);
        let context = self.stop_worker();
        info!(
            resets = self.resets,
            rotations = self.rotations,
            dispatched = context.dispatched,
            "shutting down"
        );
        self.events.announce("Shutting down.");
        // Let the last spoken feedback finish
        thread::sleep(self.session.grace());

        SessionReport {
            resets: self.resets,
            rotations: self.rotations,
            commands_dispatched: context.dispatched,
            switcher: context.switcher.state().clone(),
        }
    }
}

fn set_state(state: &SessionStateCell, events: &EventSink, next: SessionState) -> bool {
    match state.transition(next) {
        Ok(prev) => {
            debug!(from = %prev, to = %next, "session state");
            events.emit(SessionEvent::StateChanged(next));
            true
        }
        Err(current) => {
            debug!(current = %current, requested = %next, "session transition refused");
            false
        }
    }
}

/// Sends the worker's exit reason when dropped, including on panic
struct ExitNotice {
    tx: Sender<SupervisorEvent>,
    generation: u64,
    exit: Option<WorkerExit>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let exit = self.exit.take().unwrap_or(WorkerExit::Panicked);
        let _ = self.tx.send(SupervisorEvent::WorkerExited {
            generation: self.generation,
            exit,
        });
    }
}

struct Worker {
    generation: u64,
    source: Box<dyn TranscriptSource>,
    context: WorkerContext,
    cancel: Arc<AtomicBool>,
    state: SharedSessionState,
    events: EventSink,
    notify: Sender<SupervisorEvent>,
    max_session: Duration,
    poll_interval: Duration,
}

impl Worker {
    fn run(mut self) -> WorkerContext {
        let mut notice = ExitNotice {
            tx: self.notify.clone(),
            generation: self.generation,
            exit: None,
        };
        let started = Instant::now();

        let exit = loop {
            if self.cancel.load(Ordering::SeqCst) {
                break WorkerExit::Cancelled;
            }
            if started.elapsed() >= self.max_session {
                break WorkerExit::Rotate;
            }

            match self.source.next_transcript(self.poll_interval) {
                Ok(Some(transcript)) => {
                    if !transcript.is_final {
                        debug!(text = %transcript.text, "partial transcript");
                        continue;
                    }
                    if let Some(exit) = self.handle_transcript(&transcript.text) {
                        break exit;
                    }
                }
                Ok(None) => {}
                Err(SourceError::Fault(msg)) => {
                    warn!(error = %msg, "transcript stream fault");
                    break WorkerExit::Fault(msg);
                }
                Err(SourceError::Exhausted) => {
                    info!("transcript source ended");
                    break WorkerExit::Exhausted;
                }
            }
        };

        self.source.close();
        debug!(generation = self.generation, ?exit, "worker exiting");
        notice.exit = Some(exit);
        self.context
    }

    fn handle_transcript(&mut self, text: &str) -> Option<WorkerExit> {
        let ctx = InterpretContext {
            armed: self.state.is_armed(),
            now: Instant::now(),
        };
        let interpreted = self.context.interpreter.interpret(text, ctx);
        let reset = interpreted.outcome.requests_reset();
        let event = interpreted.event;
        info!(raw = %event.raw_text, normalized = %event.normalized, "heard");
        self.events.emit(SessionEvent::Heard {
            raw: event.raw_text.clone(),
            normalized: event.normalized.clone(),
        });

        match interpreted.outcome {
            Interpretation::Shutdown => {
                info!("stop phrase heard");
                Some(WorkerExit::Shutdown)
            }
            Interpretation::Accepted(Action::Arm) => {
                if self
                    .state
                    .transition_from(SessionState::Starting, SessionState::Armed)
                {
                    self.events
                        .emit(SessionEvent::StateChanged(SessionState::Armed));
                    info!("readiness confirmed, commands enabled");
                    self.events.announce("Voice recognition ready.");
                } else {
                    info!(state = %self.state.get(), "readiness phrase heard, system operating normally");
                }
                None
            }
            Interpretation::Accepted(action) => {
                let session = self.state.get();
                match self.context.switcher.apply(&action, session) {
                    Ok(applied) => {
                        self.context.dispatched += applied.dispatched;
                        if session == SessionState::Armed {
                            set_state(&self.state, &self.events, SessionState::Running);
                        }
                    }
                    Err(reason) => {
                        debug!(command = %action.command(), %reason, "session left armed state");
                    }
                }
                None
            }
            Interpretation::Rejected(reason) => {
                if reset {
                    warn!(command = %event.normalized, %reason, "unrecognized command, resetting session");
                } else {
                    info!(command = %event.normalized, %reason, "command ignored");
                }
                self.events.emit(SessionEvent::Rejected {
                    command: event.normalized,
                    reason,
                });
                reset.then_some(WorkerExit::Unrecognized)
            }
        }
    }
}
