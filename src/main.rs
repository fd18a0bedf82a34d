mod audio;
mod config;
mod constants;
mod controller;
mod hotkey;
mod model_download;
mod output;
mod session;
mod transcription;
mod tray;
mod vad;
mod worker;

use anyhow::Result;
use audio::{CaptureSource, FrameSource};
use clap::{Parser, Subcommand};
use config::Config;
use controller::{
    ActivationController, ActivationRequest, ControllerState, GateFactory, SourceFactory,
};
use hotkey::{HotkeyEvent, HotkeyManager};
use model_download::ModelDownloader;
use tao::event_loop::{ControlFlow, EventLoop};
#[cfg(target_os = "macos")]
use tao::platform::macos::{ActivationPolicy, EventLoopExtMacOS};
use transcription::{Transcriber, TranscriptionInvoker};
use tray::{TrayApp, TrayMenuEvent};
use vad::{SpeechGate, VoiceActivityGate};

use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "whisper-key")]
#[command(about = "Hotkey-driven dictation with Whisper", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a Whisper model
    DownloadModel {
        /// Model to download (e.g., base.en, tiny.en, small.en). If not specified, uses the configured model from settings.yaml
        model: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::DownloadModel { model }) => download_model_command(&model),
        None => run_app(),
    }
}

fn download_model_command(model_name: &Option<String>) -> Result<()> {
    println!("Whisper Key - Model Downloader");
    println!();

    // If no model specified, use the configured model
    let model_to_download = if let Some(name) = model_name {
        name.clone()
    } else {
        let config = Config::load_or_create()?;
        println!(
            "No model specified, using configured model: {}",
            config.transcription.model
        );
        println!();
        config.transcription.model
    };

    let config_dir = Config::config_dir()?;
    let models_dir = config_dir.join("models");

    let downloader = ModelDownloader::new(models_dir.clone());

    println!("Available models:");
    for (name, size, desc) in ModelDownloader::list_available_models() {
        let marker = if name == model_to_download { "->" } else { "  " };
        println!("  {} {} - {} ({})", marker, name, desc, size);
    }
    println!();

    println!("Models directory: {}", models_dir.display());
    println!();

    downloader.ensure_model_exists(&model_to_download)?;

    println!();
    println!("Model setup complete!");

    if model_name.is_some() {
        println!();
        println!("To use this model, update ~/.whisper-key/settings.yaml:");
        println!("  transcription:");
        println!("    model: \"{}\"", model_to_download);
    }

    Ok(())
}

fn run_app() -> Result<()> {
    println!("Whisper Key - hotkey dictation");

    // Load configuration
    let config = Config::load_or_create()?;
    println!("Configuration loaded successfully");

    let transcriber: Arc<dyn TranscriptionInvoker> =
        Arc::new(Transcriber::new(config.transcription.clone())?);

    // Each activation opens its own capture stream and gate; the factories
    // close over the immutable recording config
    let source_config = config.recording.clone();
    let sources: SourceFactory = Box::new(move || {
        let source = CaptureSource::new(&source_config)?;
        Ok(Box::new(source) as Box<dyn FrameSource>)
    });

    let vad_level = config.recording.vad_aggressiveness;
    let gates: GateFactory = Box::new(move || {
        let gate = VoiceActivityGate::new(vad_level)?;
        Ok(Box::new(gate) as Box<dyn SpeechGate>)
    });

    let (mut activation, status_rx, result_rx) =
        ActivationController::new(config.recording.clone(), sources, gates, transcriber);

    // Create event loop
    let mut event_loop = EventLoop::new();

    // Menu-bar only app (no Dock icon) - MUST be set before run()
    #[cfg(target_os = "macos")]
    event_loop.set_activation_policy(ActivationPolicy::Accessory);

    let mut tray_app = TrayApp::new()?;
    println!("System tray initialized");

    let hotkey_manager = HotkeyManager::new(&config.hotkeys)?;

    let type_result = config.output.type_result;
    let use_clipboard = config.output.use_clipboard;

    // Blink timer for the recording indicator
    let mut last_blink = Instant::now();
    let blink_interval = Duration::from_millis(500);

    // Main event loop
    event_loop.run(move |_event, _, control_flow| {
        // Short timeout keeps hotkey/worker polling responsive
        *control_flow =
            ControlFlow::WaitUntil(Instant::now() + Duration::from_millis(16));

        // Poll hotkey events
        if let Some(HotkeyEvent::Activate) = hotkey_manager.poll_event() {
            activation.on_hotkey(ActivationRequest::new(type_result, use_clipboard));
        }

        // Poll tray events
        if let Some(event) = tray_app.poll_event() {
            match event {
                TrayMenuEvent::ToggleDictation => {
                    activation.on_hotkey(ActivationRequest::new(type_result, use_clipboard));
                }
                TrayMenuEvent::Settings => {
                    if let Ok(config_path) = Config::config_path() {
                        println!("Settings file: {}", config_path.display());
                        #[cfg(target_os = "macos")]
                        {
                            let _ = std::process::Command::new("open")
                                .arg(config_path)
                                .spawn();
                        }
                    }
                }
                TrayMenuEvent::Quit => {
                    println!("Quitting application...");
                    activation.shutdown();
                    *control_flow = ControlFlow::Exit;
                }
            }
        }

        // Advance the state machine with any finished transcriptions
        activation.poll();

        // Fan out status notifications
        while let Ok(status) = status_rx.try_recv() {
            println!("Status: {}", status.as_str());
            tray_app.set_status(status);
        }

        // Deliver completed results
        while let Ok(result) = result_rx.try_recv() {
            output::deliver(&result);
        }

        // Blink recording indicator while recording
        if activation.state() == ControllerState::Recording
            && last_blink.elapsed() >= blink_interval
        {
            tray_app.blink_recording_indicator();
            last_blink = Instant::now();
        }
    });
}
