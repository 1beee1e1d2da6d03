//! Audio device errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio output device available")]
    NoDevices,

    #[error("No default device: {0}")]
    NoDefaultDevice(String),

    #[error("Configured audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device configuration unusable: {0}")]
    ConfigError(String),

    #[error("Could not open audio stream: {0}")]
    StreamBuildError(String),

    #[error("Could not start audio stream: {0}")]
    StreamPlayError(String),
}

pub type AudioResult<T> = Result<T, AudioError>;
