use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::config::TranscriptionConfig;
use crate::constants::audio::{MIN_WHISPER_SAMPLES, WHISPER_SAMPLE_RATE};

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transcription model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("transcription failed: {0}")]
    Failed(String),
}

/// Maps an audio buffer to text. Must be callable from a worker thread;
/// failures come back as typed errors, never panics.
pub trait TranscriptionInvoker: Send + Sync {
    fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<String, TranscriptionError>;
}

/// Whisper-backed invoker.
pub struct Transcriber {
    ctx: Mutex<WhisperContext>,
    config: TranscriptionConfig,
}

impl Transcriber {
    pub fn new(config: TranscriptionConfig) -> Result<Self, TranscriptionError> {
        let model_path = Self::model_path(&config.model)?;

        println!("Loading Whisper model from: {}", model_path.display());

        let ctx_params = WhisperContextParameters {
            use_gpu: config.use_gpu,
            ..Default::default()
        };

        let ctx = WhisperContext::new_with_params(&model_path.to_string_lossy(), ctx_params)
            .map_err(|e| {
                TranscriptionError::ModelUnavailable(format!(
                    "failed to load {}: {}",
                    model_path.display(),
                    e
                ))
            })?;

        println!("Whisper model loaded successfully (GPU: {})", config.use_gpu);

        Ok(Transcriber {
            ctx: Mutex::new(ctx),
            config,
        })
    }

    fn model_path(model_name: &str) -> Result<PathBuf, TranscriptionError> {
        let models_dir = dirs::home_dir()
            .ok_or_else(|| {
                TranscriptionError::ModelUnavailable("failed to get home directory".to_string())
            })?
            .join(".whisper-key")
            .join("models");

        let model_filename = format!("ggml-{}.bin", model_name);
        let model_path = models_dir.join(&model_filename);

        if !model_path.exists() {
            return Err(TranscriptionError::ModelUnavailable(format!(
                "model file not found: {}\nDownload it with: whisper-key download-model {}",
                model_path.display(),
                model_name
            )));
        }

        Ok(model_path)
    }

    /// Convert to f32, resample to the Whisper rate if needed, and pad short
    /// buffers up to the minimum length the model handles well
    fn prepare(samples: &[i16], sample_rate: u32) -> Vec<f32> {
        let mut audio: Vec<f32> = samples
            .iter()
            .map(|&s| s as f32 / i16::MAX as f32)
            .collect();

        if sample_rate != WHISPER_SAMPLE_RATE {
            audio = Self::resample(&audio, sample_rate, WHISPER_SAMPLE_RATE);
        }

        if audio.len() < MIN_WHISPER_SAMPLES {
            audio.resize(MIN_WHISPER_SAMPLES, 0.0);
        }

        audio
    }

    // Simple linear interpolation resampling
    fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
        if from_rate == to_rate || input.is_empty() {
            return input.to_vec();
        }

        let ratio = from_rate as f64 / to_rate as f64;
        let output_len = (input.len() as f64 / ratio) as usize;
        let mut output = Vec::with_capacity(output_len);

        for i in 0..output_len {
            let src_idx = i as f64 * ratio;
            let src_idx_floor = src_idx.floor() as usize;
            let src_idx_ceil = (src_idx_floor + 1).min(input.len() - 1);
            let frac = src_idx - src_idx_floor as f64;

            let sample = input[src_idx_floor] * (1.0 - frac) as f32
                + input[src_idx_ceil] * frac as f32;

            output.push(sample);
        }

        output
    }
}

impl TranscriptionInvoker for Transcriber {
    fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<String, TranscriptionError> {
        let audio = Self::prepare(samples, sample_rate);

        let ctx = self
            .ctx
            .lock()
            .map_err(|_| TranscriptionError::Failed("whisper context lock poisoned".to_string()))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        if !self.config.language.is_empty() && self.config.language != "auto" {
            params.set_language(Some(&self.config.language));
        }

        params.set_translate(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        // Disable special tokens to avoid annotations like [BLANK_AUDIO], (coughs), etc.
        params.set_suppress_blank(true);
        params.set_suppress_non_speech_tokens(true);

        // Greedy decoding at temperature 0 keeps hallucinations down on
        // silence-stripped buffers
        params.set_temperature(0.0);
        params.set_temperature_inc(0.0);

        let mut state = ctx
            .create_state()
            .map_err(|e| TranscriptionError::Failed(format!("failed to create whisper state: {}", e)))?;

        state
            .full(params, &audio)
            .map_err(|e| TranscriptionError::Failed(format!("whisper inference failed: {}", e)))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| TranscriptionError::Failed(format!("failed to read segments: {}", e)))?;

        let mut result = String::new();
        for i in 0..num_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| TranscriptionError::Failed(format!("failed to read segment {}: {}", i, e)))?;
            result.push_str(&segment);
            result.push(' ');
        }

        Ok(result.trim().to_string())
    }
}
