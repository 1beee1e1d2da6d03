//! Audio device configuration

use serde::{Deserialize, Serialize};

/// Largest callback the backend pre-allocates for (frames)
pub const MAX_BUFFER_SIZE: usize = crate::types::MAX_BLOCK_SIZE;

/// Buffer size when none is requested (frames, ~11.6 ms at 44.1 kHz)
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Sample rate requested from the device when none is configured
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Preferred buffer size for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the backend pick (uses [`DEFAULT_BUFFER_SIZE`])
    #[default]
    Default,
    /// Request a specific size in frames, clamped to 64..=MAX_BUFFER_SIZE
    Fixed(u32),
}

impl BufferSize {
    /// Frames to request from the device
    pub fn frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => (*frames).clamp(64, MAX_BUFFER_SIZE as u32),
        }
    }

    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        self.frames() as f32 / sample_rate as f32 * 1000.0
    }
}

/// Audio device identifier: device name plus the host backend
/// ("ALSA", "JACK", "CoreAudio"). Without a host every host is searched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// "[host] name", or just the name
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device (None = system default)
    pub device: Option<DeviceId>,
    pub buffer_size: BufferSize,
    /// Preferred sample rate (None = [`DEFAULT_SAMPLE_RATE`])
    pub sample_rate: Option<u32>,
    /// Open the default input device for record-armed tracks
    pub input_enabled: bool,
}

impl AudioConfig {
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn with_input(mut self, enabled: bool) -> Self {
        self.input_enabled = enabled;
        self
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_frames() {
        assert_eq!(BufferSize::Default.frames(), DEFAULT_BUFFER_SIZE);
        assert_eq!(BufferSize::Fixed(16).frames(), 64);
        assert_eq!(BufferSize::Fixed(1_000_000).frames(), MAX_BUFFER_SIZE as u32);
        assert!((BufferSize::Fixed(441).latency_ms(44100) - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_device_label() {
        assert_eq!(DeviceId::new("hw:0").display_label(), "hw:0");
        assert_eq!(DeviceId::with_host("hw:0", "ALSA").display_label(), "[ALSA] hw:0");
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = AudioConfig::default()
            .with_device(DeviceId::with_host("Speakers", "CoreAudio"))
            .with_buffer_frames(256)
            .with_sample_rate(48000)
            .with_input(true);
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: AudioConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.target_sample_rate(), 48000);
    }
}
