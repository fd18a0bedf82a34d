/// Application-wide constants for audio processing and transcription

pub mod audio {
    /// Sample rate Whisper models expect
    pub const WHISPER_SAMPLE_RATE: u32 = 16000;

    /// Minimum audio samples required for Whisper transcription (1.5 seconds)
    pub const MIN_WHISPER_SAMPLES: usize = 24000; // 1.5s at 16kHz
}

pub mod worker {
    /// Maximum number of pending transcription requests in queue
    /// The controller dispatches at most one buffer per cycle, so anything
    /// beyond this indicates a stuck model call
    pub const MAX_PENDING_REQUESTS: usize = 2;
}
