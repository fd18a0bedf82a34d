use std::sync::mpsc::{channel, sync_channel, Receiver, Sender, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;

use crate::constants::worker::MAX_PENDING_REQUESTS;
use crate::controller::ActivationRequest;
use crate::session::SpeechBuffer;
use crate::transcription::TranscriptionInvoker;

/// Task handed to the worker thread
enum WorkerTask {
    Transcribe {
        buffer: SpeechBuffer,
        sample_rate: u32,
        request: ActivationRequest,
        generation: u64,
    },
}

/// Outcome reported back to the controller
#[derive(Debug)]
pub enum WorkerOutcome {
    Done {
        text: String,
        request: ActivationRequest,
        generation: u64,
    },
    Failed {
        error: String,
        request: ActivationRequest,
        generation: u64,
    },
}

impl WorkerOutcome {
    pub fn generation(&self) -> u64 {
        match self {
            WorkerOutcome::Done { generation, .. } => *generation,
            WorkerOutcome::Failed { generation, .. } => *generation,
        }
    }
}

/// Handle for the transcription worker thread.
///
/// Transcription runs off the coordination thread so a slow model call
/// never stalls hotkey handling or audio delivery. Submission never blocks:
/// the task channel is bounded and a full queue drops the request loudly.
pub struct TranscriptionWorker {
    tasks: SyncSender<WorkerTask>,
}

impl TranscriptionWorker {
    pub fn spawn(invoker: Arc<dyn TranscriptionInvoker>) -> (Self, Receiver<WorkerOutcome>) {
        let (task_tx, task_rx) = sync_channel(MAX_PENDING_REQUESTS);
        let (outcome_tx, outcome_rx) = channel();

        thread::spawn(move || {
            Self::worker_loop(task_rx, outcome_tx, invoker);
        });

        (TranscriptionWorker { tasks: task_tx }, outcome_rx)
    }

    pub fn submit(
        &self,
        buffer: SpeechBuffer,
        sample_rate: u32,
        request: ActivationRequest,
        generation: u64,
    ) {
        let task = WorkerTask::Transcribe {
            buffer,
            sample_rate,
            request,
            generation,
        };
        match self.tasks.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                eprintln!("Transcription queue full, dropping request (worker is stuck?)");
            }
            Err(TrySendError::Disconnected(_)) => {
                eprintln!("Transcription worker disconnected");
            }
        }
    }

    fn worker_loop(
        tasks: Receiver<WorkerTask>,
        outcomes: Sender<WorkerOutcome>,
        invoker: Arc<dyn TranscriptionInvoker>,
    ) {
        for task in tasks {
            let WorkerTask::Transcribe {
                buffer,
                sample_rate,
                request,
                generation,
            } = task;

            let outcome = match invoker.transcribe(buffer.samples(), sample_rate) {
                Ok(text) => WorkerOutcome::Done {
                    text: text.trim().to_string(),
                    request,
                    generation,
                },
                Err(e) => WorkerOutcome::Failed {
                    error: e.to_string(),
                    request,
                    generation,
                },
            };

            if outcomes.send(outcome).is_err() {
                break; // controller is gone
            }
        }
    }
}
