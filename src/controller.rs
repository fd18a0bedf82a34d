use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::{AudioError, FrameSource};
use crate::config::RecordingConfig;
use crate::session::{RecordingSession, SessionError};
use crate::transcription::TranscriptionInvoker;
use crate::vad::{SpeechGate, VadError};
use crate::worker::{TranscriptionWorker, WorkerOutcome};

/// Opens a fresh frame source for each recording session
pub type SourceFactory = Box<dyn FnMut() -> Result<Box<dyn FrameSource>, AudioError> + Send>;

/// Builds a fresh gate for each recording session
pub type GateFactory = Box<dyn FnMut() -> Result<Box<dyn SpeechGate>, VadError> + Send>;

/// One hotkey trigger: what to do with the eventual text, plus the trigger
/// time used for debouncing
#[derive(Debug, Clone, Copy)]
pub struct ActivationRequest {
    pub type_result: bool,
    pub use_clipboard: bool,
    pub timestamp: Instant,
}

impl ActivationRequest {
    pub fn new(type_result: bool, use_clipboard: bool) -> Self {
        Self::at(type_result, use_clipboard, Instant::now())
    }

    pub fn at(type_result: bool, use_clipboard: bool, timestamp: Instant) -> Self {
        ActivationRequest {
            type_result,
            use_clipboard,
            timestamp,
        }
    }
}

/// Delivered to downstream consumers once per completed activation cycle.
/// Empty `text` means "nothing to type or copy" and consumers must no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEvent {
    pub text: String,
    pub type_result: bool,
    pub use_clipboard: bool,
}

impl ResultEvent {
    fn with_text(text: String, request: &ActivationRequest) -> Self {
        ResultEvent {
            text,
            type_result: request.type_result,
            use_clipboard: request.use_clipboard,
        }
    }

    fn empty(request: &ActivationRequest) -> Self {
        Self::with_text(String::new(), request)
    }
}

/// Fire-and-forget status notification, one per state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Recording,
    Transcribing,
    Idle,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Recording => "recording",
            Status::Transcribing => "transcribing",
            Status::Idle => "idle",
            Status::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Recording,
    Transcribing,
}

struct ActiveCycle {
    session: RecordingSession,
    request: ActivationRequest,
}

/// The state machine bridging hotkey events, session lifecycle, and result
/// delivery.
///
/// All transitions happen on the thread that calls `on_hotkey`/`poll`; the
/// controller is the single owner of the state, and cross-thread traffic
/// is confined to the worker channels and the session's internal lock. At
/// most one session exists at a time, and a failed cycle resets to idle
/// (the error state is transient, visible only as a status notification).
pub struct ActivationController {
    recording: RecordingConfig,
    activation_delay: Duration,
    sources: SourceFactory,
    gates: GateFactory,
    worker: TranscriptionWorker,
    outcomes: Receiver<WorkerOutcome>,
    status_tx: Sender<Status>,
    result_tx: Sender<ResultEvent>,
    state: ControllerState,
    active: Option<ActiveCycle>,
    last_accepted: Option<Instant>,
    generation: u64,
    disabled: bool,
}

impl ActivationController {
    pub fn new(
        recording: RecordingConfig,
        sources: SourceFactory,
        gates: GateFactory,
        invoker: Arc<dyn TranscriptionInvoker>,
    ) -> (Self, Receiver<Status>, Receiver<ResultEvent>) {
        let (worker, outcomes) = TranscriptionWorker::spawn(invoker);
        let (status_tx, status_rx) = channel();
        let (result_tx, result_rx) = channel();

        let activation_delay = recording.activation_delay();
        let controller = ActivationController {
            recording,
            activation_delay,
            sources,
            gates,
            worker,
            outcomes,
            status_tx,
            result_tx,
            state: ControllerState::Idle,
            active: None,
            last_accepted: None,
            generation: 0,
            disabled: false,
        };

        (controller, status_rx, result_rx)
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Handle one activation trigger.
    ///
    /// Requests inside the debounce window of the last accepted one, and
    /// requests arriving while a transcription is in flight, are dropped
    /// silently (no state change, no notification).
    pub fn on_hotkey(&mut self, request: ActivationRequest) {
        if self.disabled {
            return;
        }
        if self.state == ControllerState::Transcribing {
            return; // at most one in-flight transcription; no queueing
        }
        if let Some(last) = self.last_accepted {
            if request.timestamp.saturating_duration_since(last) < self.activation_delay {
                return;
            }
        }
        self.last_accepted = Some(request.timestamp);

        match self.state {
            ControllerState::Idle => self.begin_cycle(request),
            ControllerState::Recording => self.finish_cycle(),
            ControllerState::Transcribing => {}
        }
    }

    /// Drain transcription outcomes and advance the state machine. Call
    /// regularly from the coordination loop.
    pub fn poll(&mut self) {
        while let Ok(outcome) = self.outcomes.try_recv() {
            if outcome.generation() != self.generation {
                continue; // superseded by shutdown, discard
            }
            if self.state != ControllerState::Transcribing {
                continue;
            }

            match outcome {
                WorkerOutcome::Done { text, request, .. } => {
                    self.state = ControllerState::Idle;
                    self.notify(Status::Idle);
                    self.emit(ResultEvent::with_text(text, &request));
                }
                WorkerOutcome::Failed { error, request, .. } => {
                    eprintln!("Transcription failed: {}", error);
                    self.state = ControllerState::Idle;
                    self.notify(Status::Error);
                    self.emit(ResultEvent::empty(&request));
                }
            }
        }
    }

    /// Forcibly stop any active session, discard any in-flight result, and
    /// refuse further activations. Safe to call at any time.
    pub fn shutdown(&mut self) {
        if let Some(mut cycle) = self.active.take() {
            let _ = cycle.session.stop();
        }
        self.generation = self.generation.wrapping_add(1);
        if self.state != ControllerState::Idle {
            self.state = ControllerState::Idle;
            self.notify(Status::Idle);
        }
        self.disabled = true;
    }

    fn begin_cycle(&mut self, request: ActivationRequest) {
        let source = match (self.sources)() {
            Ok(source) => source,
            Err(e) => {
                eprintln!("Audio device unavailable: {}", e);
                self.notify(Status::Error);
                return; // stay idle, next trigger may succeed
            }
        };
        let gate = match (self.gates)() {
            Ok(gate) => gate,
            Err(e) => {
                eprintln!("Voice gate unavailable: {}", e);
                self.notify(Status::Error);
                return;
            }
        };

        match RecordingSession::start(source, gate, &self.recording) {
            Ok(session) => {
                self.active = Some(ActiveCycle { session, request });
                self.state = ControllerState::Recording;
                self.notify(Status::Recording);
                println!("Recording...");
            }
            Err(e) => {
                eprintln!("Failed to start recording: {}", e);
                self.notify(Status::Error);
            }
        }
    }

    fn finish_cycle(&mut self) {
        let Some(mut cycle) = self.active.take() else {
            self.state = ControllerState::Idle;
            return;
        };

        match cycle.session.stop() {
            Ok(buffer) => {
                println!(
                    "Recording finished: {} samples ({:.2}s of speech)",
                    buffer.len(),
                    buffer.duration_secs(self.recording.sample_rate)
                );
                self.state = ControllerState::Transcribing;
                self.notify(Status::Transcribing);
                println!("Transcribing...");
                self.worker.submit(
                    buffer,
                    self.recording.sample_rate,
                    cycle.request,
                    self.generation,
                );
            }
            Err(SessionError::NoSpeechCaptured) => {
                println!("No speech captured, nothing to transcribe");
                self.state = ControllerState::Idle;
                self.notify(Status::Idle);
                self.emit(ResultEvent::empty(&cycle.request));
            }
            Err(e) => {
                eprintln!("Recording session failed: {}", e);
                self.state = ControllerState::Idle;
                self.notify(Status::Error);
                self.emit(ResultEvent::empty(&cycle.request));
            }
        }
    }

    fn notify(&self, status: Status) {
        let _ = self.status_tx.send(status);
    }

    fn emit(&self, event: ResultEvent) {
        let _ = self.result_tx.send(event);
    }
}
