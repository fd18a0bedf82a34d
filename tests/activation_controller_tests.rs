// State machine tests for ActivationController: debounce, status ordering,
// single-session invariant, busy drops, shutdown. All collaborators are
// synthetic so every scenario is deterministic.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use whisper_key::audio::{AudioError, FrameSink, FrameSource};
use whisper_key::config::RecordingConfig;
use whisper_key::controller::{
    ActivationController, ActivationRequest, ControllerState, GateFactory, ResultEvent,
    SourceFactory, Status,
};
use whisper_key::transcription::{TranscriptionError, TranscriptionInvoker};
use whisper_key::vad::{FrameClass, SpeechGate, VadError};

const FRAME: usize = 480; // 30ms at 16kHz

fn test_config(activation_delay_secs: f64) -> RecordingConfig {
    RecordingConfig {
        sample_rate: 16000,
        device: None,
        vad_aggressiveness: 2,
        frame_duration_ms: 30,
        activation_delay_secs,
    }
}

fn request_at(timestamp: Instant) -> ActivationRequest {
    ActivationRequest::at(true, true, timestamp)
}

/// Tracks how many sources are open at once across factory invocations
#[derive(Clone, Default)]
struct SourceStats {
    open_now: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
    opened_total: Arc<AtomicUsize>,
}

/// Delivers a fixed number of frames synchronously on open
struct TestSource {
    frames: usize,
    stats: SourceStats,
    open: bool,
}

impl FrameSource for TestSource {
    fn open(&mut self, mut sink: FrameSink) -> Result<(), AudioError> {
        self.open = true;
        let now = self.stats.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_open.fetch_max(now, Ordering::SeqCst);
        self.stats.opened_total.fetch_add(1, Ordering::SeqCst);

        for i in 0..self.frames {
            sink(&vec![i as i16 + 1; FRAME]);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.stats.open_now.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for TestSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Gate with a fixed verdict for every frame
struct FixedGate(FrameClass);

impl SpeechGate for FixedGate {
    fn classify(&mut self, _frame: &[i16], _sample_rate: u32) -> Result<FrameClass, VadError> {
        Ok(self.0)
    }
}

/// Invoker returning a canned reply, optionally after a delay
struct CannedInvoker {
    reply: Result<String, String>,
    delay: Duration,
}

impl CannedInvoker {
    fn ok(text: &str) -> Arc<Self> {
        Arc::new(CannedInvoker {
            reply: Ok(text.to_string()),
            delay: Duration::ZERO,
        })
    }

    fn ok_after(text: &str, delay: Duration) -> Arc<Self> {
        Arc::new(CannedInvoker {
            reply: Ok(text.to_string()),
            delay,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(CannedInvoker {
            reply: Err("model exploded".to_string()),
            delay: Duration::ZERO,
        })
    }
}

impl TranscriptionInvoker for CannedInvoker {
    fn transcribe(&self, _samples: &[i16], _sample_rate: u32) -> Result<String, TranscriptionError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(TranscriptionError::Failed(message.clone())),
        }
    }
}

struct Harness {
    controller: ActivationController,
    status_rx: Receiver<Status>,
    result_rx: Receiver<ResultEvent>,
    stats: SourceStats,
}

fn harness(
    frames_per_session: usize,
    gate_class: FrameClass,
    invoker: Arc<dyn TranscriptionInvoker>,
    activation_delay_secs: f64,
) -> Harness {
    let stats = SourceStats::default();
    let factory_stats = stats.clone();
    let sources: SourceFactory = Box::new(move || {
        Ok(Box::new(TestSource {
            frames: frames_per_session,
            stats: factory_stats.clone(),
            open: false,
        }) as Box<dyn FrameSource>)
    });
    let gates: GateFactory =
        Box::new(move || Ok(Box::new(FixedGate(gate_class)) as Box<dyn SpeechGate>));

    let (controller, status_rx, result_rx) = ActivationController::new(
        test_config(activation_delay_secs),
        sources,
        gates,
        invoker,
    );

    Harness {
        controller,
        status_rx,
        result_rx,
        stats,
    }
}

fn wait_for_result(
    controller: &mut ActivationController,
    result_rx: &Receiver<ResultEvent>,
) -> ResultEvent {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        controller.poll();
        if let Ok(event) = result_rx.try_recv() {
            return event;
        }
        assert!(Instant::now() < deadline, "timed out waiting for result");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn successful_cycle_emits_expected_sequence() {
    let mut h = harness(5, FrameClass::Speech, CannedInvoker::ok("hello world"), 0.0);
    let base = Instant::now();

    h.controller.on_hotkey(request_at(base));
    assert_eq!(h.controller.state(), ControllerState::Recording);

    h.controller.on_hotkey(request_at(base + Duration::from_secs(2)));
    assert_eq!(h.controller.state(), ControllerState::Transcribing);

    let result = wait_for_result(&mut h.controller, &h.result_rx);
    assert_eq!(result.text, "hello world");
    assert!(result.type_result);
    assert!(result.use_clipboard);
    assert_eq!(h.controller.state(), ControllerState::Idle);

    let statuses: Vec<Status> = h.status_rx.try_iter().collect();
    assert_eq!(
        statuses,
        vec![Status::Recording, Status::Transcribing, Status::Idle]
    );
}

#[test]
fn no_speech_cycle_skips_transcription() {
    let mut h = harness(5, FrameClass::Silence, CannedInvoker::ok("unused"), 0.0);
    let base = Instant::now();

    h.controller.on_hotkey(request_at(base));
    h.controller.on_hotkey(request_at(base + Duration::from_secs(2)));

    assert_eq!(h.controller.state(), ControllerState::Idle);

    let result = h.result_rx.try_recv().expect("empty result expected");
    assert!(result.text.is_empty());

    let statuses: Vec<Status> = h.status_rx.try_iter().collect();
    assert_eq!(statuses, vec![Status::Recording, Status::Idle]);
}

#[test]
fn transcription_failure_surfaces_as_error_and_empty_result() {
    let mut h = harness(3, FrameClass::Speech, CannedInvoker::failing(), 0.0);
    let base = Instant::now();

    h.controller.on_hotkey(request_at(base));
    h.controller.on_hotkey(request_at(base + Duration::from_secs(2)));

    let result = wait_for_result(&mut h.controller, &h.result_rx);
    assert!(result.text.is_empty());
    assert_eq!(h.controller.state(), ControllerState::Idle);

    let statuses: Vec<Status> = h.status_rx.try_iter().collect();
    assert_eq!(
        statuses,
        vec![Status::Recording, Status::Transcribing, Status::Error]
    );
}

#[test]
fn device_failure_does_not_wedge_the_controller() {
    let stats = SourceStats::default();
    let factory_stats = stats.clone();
    let fail_next = Arc::new(AtomicBool::new(true));
    let fail_flag = Arc::clone(&fail_next);

    let sources: SourceFactory = Box::new(move || {
        if fail_flag.load(Ordering::SeqCst) {
            return Err(AudioError::DeviceUnavailable("microphone is busy".to_string()));
        }
        Ok(Box::new(TestSource {
            frames: 2,
            stats: factory_stats.clone(),
            open: false,
        }) as Box<dyn FrameSource>)
    });
    let gates: GateFactory =
        Box::new(|| Ok(Box::new(FixedGate(FrameClass::Speech)) as Box<dyn SpeechGate>));

    let (mut controller, status_rx, _result_rx) =
        ActivationController::new(test_config(0.0), sources, gates, CannedInvoker::ok("hi"));

    let base = Instant::now();
    controller.on_hotkey(request_at(base));

    // Error status only, no recording, controller back to idle
    assert_eq!(controller.state(), ControllerState::Idle);
    let statuses: Vec<Status> = status_rx.try_iter().collect();
    assert_eq!(statuses, vec![Status::Error]);

    // The next trigger is accepted once the device is back
    fail_next.store(false, Ordering::SeqCst);
    controller.on_hotkey(request_at(base + Duration::from_secs(2)));
    assert_eq!(controller.state(), ControllerState::Recording);
    assert_eq!(stats.opened_total.load(Ordering::SeqCst), 1);
}

#[test]
fn debounce_drops_requests_inside_the_window() {
    let mut h = harness(3, FrameClass::Speech, CannedInvoker::ok("hi"), 1.0);
    let base = Instant::now();

    // Two requests less than the activation delay apart: one transition
    h.controller.on_hotkey(request_at(base));
    h.controller.on_hotkey(request_at(base + Duration::from_millis(300)));

    assert_eq!(h.controller.state(), ControllerState::Recording);
    let statuses: Vec<Status> = h.status_rx.try_iter().collect();
    assert_eq!(statuses, vec![Status::Recording]);

    // Outside the window the toggle goes through
    h.controller.on_hotkey(request_at(base + Duration::from_millis(1500)));
    assert_eq!(h.controller.state(), ControllerState::Transcribing);
}

#[test]
fn requests_while_transcribing_are_dropped() {
    let invoker = CannedInvoker::ok_after("slow", Duration::from_millis(200));
    let mut h = harness(3, FrameClass::Speech, invoker, 0.0);
    let base = Instant::now();

    h.controller.on_hotkey(request_at(base));
    h.controller.on_hotkey(request_at(base + Duration::from_secs(2)));
    assert_eq!(h.controller.state(), ControllerState::Transcribing);

    // Dropped: no new session while the transcription is in flight
    h.controller.on_hotkey(request_at(base + Duration::from_secs(4)));
    h.controller.poll();
    assert_eq!(h.stats.opened_total.load(Ordering::SeqCst), 1);

    let result = wait_for_result(&mut h.controller, &h.result_rx);
    assert_eq!(result.text, "slow");

    // Accepted again once idle
    h.controller.on_hotkey(request_at(base + Duration::from_secs(6)));
    assert_eq!(h.controller.state(), ControllerState::Recording);
    assert_eq!(h.stats.opened_total.load(Ordering::SeqCst), 2);
}

#[test]
fn at_most_one_open_source_under_rapid_fire() {
    let h = harness(1, FrameClass::Silence, CannedInvoker::ok("unused"), 0.0);
    let stats = h.stats.clone();
    let controller = Arc::new(Mutex::new(h.controller));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let controller = Arc::clone(&controller);
        handles.push(thread::spawn(move || {
            for _ in 0..25 {
                controller
                    .lock()
                    .unwrap()
                    .on_hotkey(ActivationRequest::new(true, true));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(stats.max_open.load(Ordering::SeqCst) <= 1);

    controller.lock().unwrap().shutdown();
    assert_eq!(stats.open_now.load(Ordering::SeqCst), 0);
}

#[test]
fn shutdown_discards_in_flight_result() {
    let invoker = CannedInvoker::ok_after("late", Duration::from_millis(200));
    let mut h = harness(3, FrameClass::Speech, invoker, 0.0);
    let base = Instant::now();

    h.controller.on_hotkey(request_at(base));
    h.controller.on_hotkey(request_at(base + Duration::from_secs(2)));
    assert_eq!(h.controller.state(), ControllerState::Transcribing);

    h.controller.shutdown();
    assert_eq!(h.controller.state(), ControllerState::Idle);

    // The worker finishes, but the outcome is stale and must be dropped
    thread::sleep(Duration::from_millis(300));
    h.controller.poll();
    assert!(h.result_rx.try_recv().is_err());

    // Further activations are refused
    h.controller.on_hotkey(request_at(base + Duration::from_secs(4)));
    assert_eq!(h.controller.state(), ControllerState::Idle);
    assert_eq!(h.stats.opened_total.load(Ordering::SeqCst), 1);
}

#[test]
fn shutdown_without_active_session_is_safe() {
    let mut h = harness(1, FrameClass::Speech, CannedInvoker::ok("hi"), 0.0);

    h.controller.shutdown();
    assert_eq!(h.controller.state(), ControllerState::Idle);

    h.controller.on_hotkey(ActivationRequest::new(true, true));
    assert_eq!(h.controller.state(), ControllerState::Idle);
    assert_eq!(h.stats.opened_total.load(Ordering::SeqCst), 0);
}

#[test]
fn result_carries_request_flags() {
    let stats = SourceStats::default();
    let factory_stats = stats.clone();
    let sources: SourceFactory = Box::new(move || {
        Ok(Box::new(TestSource {
            frames: 2,
            stats: factory_stats.clone(),
            open: false,
        }) as Box<dyn FrameSource>)
    });
    let gates: GateFactory =
        Box::new(|| Ok(Box::new(FixedGate(FrameClass::Speech)) as Box<dyn SpeechGate>));

    let (mut controller, _status_rx, result_rx) = ActivationController::new(
        test_config(0.0),
        sources,
        gates,
        CannedInvoker::ok("typed only"),
    );

    let base = Instant::now();
    controller.on_hotkey(ActivationRequest::at(true, false, base));
    controller.on_hotkey(ActivationRequest::at(true, false, base + Duration::from_secs(2)));

    let result = wait_for_result(&mut controller, &result_rx);
    assert_eq!(result.text, "typed only");
    assert!(result.type_result);
    assert!(!result.use_clipboard);
}
