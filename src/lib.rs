// Library exports for testing
pub mod audio;
pub mod config;
pub mod constants;
pub mod controller;
pub mod session;
pub mod transcription;
pub mod vad;
pub mod worker;
