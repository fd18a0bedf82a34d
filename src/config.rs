use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Sample rates the WebRTC voice detector accepts
const SUPPORTED_SAMPLE_RATES: [u32; 4] = [8000, 16000, 32000, 48000];

/// Frame durations the WebRTC voice detector accepts
const SUPPORTED_FRAME_DURATIONS_MS: [u32; 3] = [10, 20, 30];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub hotkeys: HotkeyConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HotkeyConfig {
    #[serde(default = "default_activate_hotkey")]
    pub activate: String,
}

fn default_activate_hotkey() -> String {
    "Ctrl+Shift+Space".to_string()
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        HotkeyConfig {
            activate: default_activate_hotkey(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecordingConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Input device name; None picks the system default
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default = "default_vad_aggressiveness")]
    pub vad_aggressiveness: u8,
    #[serde(default = "default_frame_duration")]
    pub frame_duration_ms: u32,
    #[serde(default = "default_activation_delay")]
    pub activation_delay_secs: f64,
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_vad_aggressiveness() -> u8 {
    2
}

fn default_frame_duration() -> u32 {
    30
}

fn default_activation_delay() -> f64 {
    1.0
}

impl Default for RecordingConfig {
    fn default() -> Self {
        RecordingConfig {
            sample_rate: default_sample_rate(),
            device: None,
            vad_aggressiveness: default_vad_aggressiveness(),
            frame_duration_ms: default_frame_duration(),
            activation_delay_secs: default_activation_delay(),
        }
    }
}

impl RecordingConfig {
    /// Samples per frame at the configured rate and duration
    pub fn frame_size(&self) -> usize {
        (self.sample_rate as usize * self.frame_duration_ms as usize) / 1000
    }

    /// Minimum delay between accepted activations
    pub fn activation_delay(&self) -> Duration {
        Duration::from_secs_f64(self.activation_delay_secs.max(0.0))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranscriptionConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_use_gpu")]
    pub use_gpu: bool,
}

fn default_model() -> String {
    "base.en".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_use_gpu() -> bool {
    true
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        TranscriptionConfig {
            model: default_model(),
            language: default_language(),
            use_gpu: default_use_gpu(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_type_result")]
    pub type_result: bool,
    #[serde(default = "default_use_clipboard")]
    pub use_clipboard: bool,
}

fn default_type_result() -> bool {
    true
}

fn default_use_clipboard() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            type_result: default_type_result(),
            use_clipboard: default_use_clipboard(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hotkeys: HotkeyConfig::default(),
            recording: RecordingConfig::default(),
            transcription: TranscriptionConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".whisper-key"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.yaml"))
    }

    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config: Config = serde_yaml::from_str(&contents)
                .context("Failed to parse config file")?;

            // Validate configuration after loading
            config.validate()?;

            Ok(config)
        } else {
            // Create default config
            let config = Config::default();
            config.save()?;
            println!("Created default config at: {}", config_path.display());
            Ok(config)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_SAMPLE_RATES.contains(&self.recording.sample_rate) {
            bail!(
                "sample_rate must be one of {:?} (got {})",
                SUPPORTED_SAMPLE_RATES,
                self.recording.sample_rate
            );
        }

        if !SUPPORTED_FRAME_DURATIONS_MS.contains(&self.recording.frame_duration_ms) {
            bail!(
                "frame_duration_ms must be one of {:?} (got {})",
                SUPPORTED_FRAME_DURATIONS_MS,
                self.recording.frame_duration_ms
            );
        }

        if self.recording.vad_aggressiveness > 3 {
            bail!(
                "vad_aggressiveness must be 0-3 (got {})",
                self.recording.vad_aggressiveness
            );
        }

        if self.recording.activation_delay_secs < 0.0 {
            bail!("activation_delay_secs must be >= 0.0");
        }

        // Validate model name (basic check)
        if self.transcription.model.is_empty() {
            bail!("model name cannot be empty");
        }

        // Validate language code (basic check)
        if self.transcription.language.is_empty() {
            bail!("language code cannot be empty");
        }

        if self.hotkeys.activate.is_empty() {
            bail!("activate hotkey cannot be empty");
        }

        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir()?;
        fs::create_dir_all(&config_dir)
            .context("Failed to create config directory")?;

        let config_path = Self::config_path()?;
        let yaml = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs::write(&config_path, yaml)
            .context("Failed to write config file")?;

        Ok(())
    }
}
