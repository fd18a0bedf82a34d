use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::audio::{AudioError, FrameSink, FrameSource};
use crate::config::RecordingConfig;
use crate::vad::{FrameClass, SpeechGate};

#[derive(Debug, Error)]
pub enum SessionError {
    /// The session ended without a single frame classifying as speech;
    /// callers must not dispatch an empty transcription request
    #[error("no speech captured")]
    NoSpeechCaptured,

    /// The frame handler hit a contract violation and stopped accepting frames
    #[error("recording aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Audio(#[from] AudioError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Stopped,
}

/// Silence-stripped samples accumulated over one session, in arrival order.
/// Moved out of the session when it stops.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SpeechBuffer {
    samples: Vec<i16>,
}

impl SpeechBuffer {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    pub fn duration_secs(&self, sample_rate: u32) -> f32 {
        self.samples.len() as f32 / sample_rate as f32
    }
}

impl From<Vec<i16>> for SpeechBuffer {
    fn from(samples: Vec<i16>) -> Self {
        SpeechBuffer { samples }
    }
}

/// Shared between the delivery thread (appends) and the controller thread
/// (claims on stop). Critical sections are append-and-return so `stop()`
/// never waits longer than one frame handler.
struct Pipeline {
    staging: Vec<i16>,
    speech: Vec<i16>,
    stopped: bool,
    fault: Option<String>,
}

/// One recording's capture-to-buffer pipeline: pulls frames from a
/// `FrameSource`, gates them, and accumulates speech frames until stopped.
pub struct RecordingSession {
    source: Box<dyn FrameSource>,
    shared: Arc<Mutex<Pipeline>>,
    state: SessionState,
}

impl RecordingSession {
    /// Open the source and start accumulating gated frames.
    ///
    /// The handler runs on the source's delivery thread: it stages incoming
    /// samples up to one frame, classifies the completed frame, appends
    /// speech to the buffer, and clears the staging area either way.
    pub fn start(
        mut source: Box<dyn FrameSource>,
        mut gate: Box<dyn SpeechGate>,
        recording: &RecordingConfig,
    ) -> Result<Self, SessionError> {
        let frame_size = recording.frame_size();
        let sample_rate = recording.sample_rate;

        let shared = Arc::new(Mutex::new(Pipeline {
            staging: Vec::with_capacity(frame_size),
            speech: Vec::new(),
            stopped: false,
            fault: None,
        }));

        let pipeline = Arc::clone(&shared);
        let sink: FrameSink = Box::new(move |samples: &[i16]| {
            let Ok(mut pipe) = pipeline.lock() else {
                return;
            };
            if pipe.stopped || pipe.fault.is_some() {
                return;
            }

            pipe.staging.extend_from_slice(samples);

            while pipe.staging.len() >= frame_size {
                let Pipeline {
                    staging,
                    speech,
                    fault,
                    ..
                } = &mut *pipe;

                match gate.classify(&staging[..frame_size], sample_rate) {
                    Ok(FrameClass::Speech) => speech.extend_from_slice(&staging[..frame_size]),
                    Ok(FrameClass::Silence) => {}
                    Err(err) => {
                        eprintln!("Voice gate rejected frame, aborting session: {}", err);
                        *fault = Some(err.to_string());
                        staging.clear();
                        return;
                    }
                }

                staging.drain(..frame_size);
            }
        });

        source.open(sink)?;

        Ok(RecordingSession {
            source,
            shared,
            state: SessionState::Active,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Stop delivery, release the device, and claim the accumulated buffer.
    ///
    /// Safe to call from a different thread than the one producing frames.
    /// The first call returns the buffer (or `NoSpeechCaptured`/`Aborted`);
    /// repeat calls are no-ops returning an empty buffer.
    pub fn stop(&mut self) -> Result<SpeechBuffer, SessionError> {
        if self.state == SessionState::Stopped {
            return Ok(SpeechBuffer::default());
        }
        self.state = SessionState::Stopped;

        {
            let mut pipe = self.lock_pipeline();
            pipe.stopped = true;
        }

        self.source.close();

        let (samples, fault) = {
            let mut pipe = self.lock_pipeline();
            (std::mem::take(&mut pipe.speech), pipe.fault.take())
        };

        if let Some(reason) = fault {
            return Err(SessionError::Aborted(reason));
        }
        if samples.is_empty() {
            return Err(SessionError::NoSpeechCaptured);
        }
        Ok(SpeechBuffer::from(samples))
    }

    // A poisoned pipeline lock means a panic mid-append on the delivery
    // thread; recover the data rather than taking the process down
    fn lock_pipeline(&self) -> MutexGuard<'_, Pipeline> {
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.source.close();
    }
}
