use thiserror::Error;
use webrtc_vad::{SampleRate, Vad, VadMode};

/// Per-frame classification result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    Speech,
    Silence,
}

#[derive(Debug, Error)]
pub enum VadError {
    #[error("vad aggressiveness must be 0-3 (got {0})")]
    InvalidAggressiveness(u8),

    #[error("unsupported sample rate {0}Hz (expected 8000, 16000, 32000 or 48000)")]
    UnsupportedSampleRate(u32),

    #[error("frame of {got} samples is not a 10/20/30ms frame at {sample_rate}Hz")]
    InvalidFrameLength { got: usize, sample_rate: u32 },
}

/// Frame-level speech/silence classifier.
///
/// Implementations keep whatever internal state they need, but for a fixed
/// configuration the same frame sequence must always classify the same way.
pub trait SpeechGate: Send {
    fn classify(&mut self, frame: &[i16], sample_rate: u32) -> Result<FrameClass, VadError>;
}

/// WebRTC VAD backed gate at a construction-fixed aggressiveness level.
///
/// WebRTC VAD supports only 10/20/30ms frames at 8/16/32/48kHz; anything
/// else is a contract violation between the frame source and the gate.
pub struct VoiceActivityGate {
    // Built on first classify; the detector wants its rate at construction
    // and the rate is fixed for the lifetime of a session
    vad: Option<Vad>,
    aggressiveness: u8,
    sample_rate: Option<u32>,
}

// The raw detector handle is owned exclusively by whichever thread drives
// classification for the current session (same pattern as the capture stream).
unsafe impl Send for VoiceActivityGate {}

impl VoiceActivityGate {
    pub fn new(aggressiveness: u8) -> Result<Self, VadError> {
        // Validate up front so a bad config fails at construction
        vad_mode(aggressiveness)?;
        Ok(VoiceActivityGate {
            vad: None,
            aggressiveness,
            sample_rate: None,
        })
    }

    pub fn aggressiveness(&self) -> u8 {
        self.aggressiveness
    }

    fn frame_length_is_valid(frame_len: usize, sample_rate: u32) -> bool {
        let samples_per_ms = sample_rate as usize / 1000;
        [10usize, 20, 30]
            .iter()
            .any(|ms| frame_len == samples_per_ms * ms)
    }
}

fn vad_mode(aggressiveness: u8) -> Result<VadMode, VadError> {
    match aggressiveness {
        0 => Ok(VadMode::Quality),
        1 => Ok(VadMode::LowBitrate),
        2 => Ok(VadMode::Aggressive),
        3 => Ok(VadMode::VeryAggressive),
        other => Err(VadError::InvalidAggressiveness(other)),
    }
}

impl SpeechGate for VoiceActivityGate {
    fn classify(&mut self, frame: &[i16], sample_rate: u32) -> Result<FrameClass, VadError> {
        let rate = SampleRate::try_from(sample_rate as i32)
            .map_err(|_| VadError::UnsupportedSampleRate(sample_rate))?;

        if !Self::frame_length_is_valid(frame.len(), sample_rate) {
            return Err(VadError::InvalidFrameLength {
                got: frame.len(),
                sample_rate,
            });
        }

        let mut vad = match self.vad.take() {
            Some(vad) if self.sample_rate == Some(sample_rate) => vad,
            _ => {
                self.sample_rate = Some(sample_rate);
                Vad::new_with_rate_and_mode(rate, vad_mode(self.aggressiveness)?)
            }
        };

        let verdict = vad.is_voice_segment(frame);
        self.vad = Some(vad);

        let is_speech = verdict.map_err(|_| VadError::InvalidFrameLength {
            got: frame.len(),
            sample_rate,
        })?;

        Ok(if is_speech {
            FrameClass::Speech
        } else {
            FrameClass::Silence
        })
    }
}
