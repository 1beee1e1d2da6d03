//! Top-level engine configuration

use serde::{Deserialize, Serialize};

use crate::audio::AudioConfig;
use crate::engine::{DEFAULT_METRONOME_GAIN, MESSAGE_QUEUE_CAPACITY};
use crate::render::BounceSettings;

/// Telemetry is pushed to the UI every this many callbacks
pub const DEFAULT_TELEMETRY_INTERVAL: u32 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub enabled: bool,
    pub gain: f32,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gain: DEFAULT_METRONOME_GAIN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audio: AudioConfig,
    pub metronome: MetronomeConfig,
    /// Slots in each UI/audio message queue (rounded up to a power of two)
    pub queue_capacity: usize,
    /// Callbacks between playhead/peak telemetry messages
    pub telemetry_interval: u32,
    /// Defaults for offline bounces
    pub bounce: BounceSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            metronome: MetronomeConfig::default(),
            queue_capacity: MESSAGE_QUEUE_CAPACITY,
            telemetry_interval: DEFAULT_TELEMETRY_INTERVAL,
            bounce: BounceSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Queue capacity actually used by the engine
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.max(2).next_power_of_two()
    }

    pub fn effective_telemetry_interval(&self) -> u32 {
        self.telemetry_interval.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: EngineConfig = serde_yaml::from_str("metronome:\n  enabled: true\nqueue_capacity: 300\n").unwrap();
        assert!(config.metronome.enabled);
        assert_eq!(config.metronome.gain, DEFAULT_METRONOME_GAIN);
        assert_eq!(config.effective_queue_capacity(), 512);
        assert_eq!(config.telemetry_interval, DEFAULT_TELEMETRY_INTERVAL);
        assert_eq!(config.bounce.bits_per_sample, 24);
    }

    #[test]
    fn test_degenerate_values_are_clamped() {
        let config = EngineConfig {
            queue_capacity: 0,
            telemetry_interval: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.effective_queue_capacity(), 2);
        assert_eq!(config.effective_telemetry_interval(), 1);
    }
}
