//! Audio device layer
//!
//! Configuration types are always available so they can live in the engine
//! config file; the CPAL streams are behind the `cpal-backend` feature.

mod config;
mod error;

#[cfg(feature = "cpal-backend")]
mod cpal_backend;
#[cfg(feature = "cpal-backend")]
mod device;

pub use config::{
    AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE,
};
pub use error::{AudioError, AudioResult};

#[cfg(feature = "cpal-backend")]
pub use cpal_backend::{start_audio_system, AudioSystem, CpalAudioHandle};
#[cfg(feature = "cpal-backend")]
pub use device::{default_output_device, output_devices, AudioDevice};
