//! Gain plugin - volume in decibels

use crate::midi::MidiBuffer;
use crate::plugin::{ParamInfo, ParamValue, Plugin, PluginBase, PluginInfo, PluginResult};
use crate::types::{db_to_gain, StereoBuffer};

/// A simple gain stage
///
/// Parameters:
/// - Gain: -60 dB to +12 dB (default 0 dB)
///
/// This plugin has zero latency.
pub struct GainPlugin {
    base: PluginBase,
}

impl GainPlugin {
    pub fn new() -> Self {
        let info = PluginInfo::effect("Gain", "Utility").with_param(
            // 60/72 normalized = 0 dB
            ParamInfo::new("Gain", 60.0 / 72.0)
                .with_range(-60.0, 12.0)
                .with_unit("dB"),
        );
        Self {
            base: PluginBase::new(info),
        }
    }

    fn gain_db(&self) -> f32 {
        self.base.param_actual(0)
    }
}

impl Default for GainPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for GainPlugin {
    fn info(&self) -> &PluginInfo {
        self.base.info()
    }

    fn prepare(&mut self, _sample_rate: f64, _max_block: usize) {}

    fn process(&mut self, buffer: &mut StereoBuffer, _midi: &MidiBuffer) -> PluginResult<()> {
        buffer.scale(db_to_gain(self.gain_db()));
        Ok(())
    }

    fn latency_samples(&self) -> u32 {
        0
    }

    fn reset(&mut self) {
        // No state to reset
    }

    fn params(&self) -> &[ParamValue] {
        self.base.params()
    }

    fn set_param(&mut self, index: usize, value: f32) {
        self.base.set_param(index, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_default_is_unity() {
        let mut plugin = GainPlugin::new();
        let mut buffer = StereoBuffer::silence(4);
        buffer[0] = StereoSample::new(1.0, 0.5);

        plugin.process(&mut buffer, &MidiBuffer::new()).unwrap();

        assert!((buffer[0].left - 1.0).abs() < 0.001);
        assert!((buffer[0].right - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_minus_six_db() {
        let mut plugin = GainPlugin::new();
        // -6 dB: (−6 + 60) / 72
        plugin.set_param(0, 54.0 / 72.0);

        let mut buffer = StereoBuffer::silence(2);
        buffer[0] = StereoSample::new(1.0, 1.0);
        plugin.process(&mut buffer, &MidiBuffer::new()).unwrap();

        assert!((buffer[0].left - 0.501).abs() < 0.01);
    }
}
