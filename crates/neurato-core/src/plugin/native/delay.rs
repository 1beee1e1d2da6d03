//! Stereo delay plugin
//!
//! A feedback delay with:
//! - Delay time in ms
//! - Feedback control
//! - Dry/wet mix
//!
//! The delay line is sized in `prepare` for the device sample rate, so
//! times stay correct at any rate.

use crate::midi::MidiBuffer;
use crate::plugin::{ParamInfo, ParamValue, Plugin, PluginBase, PluginInfo, PluginResult};
use crate::types::{StereoBuffer, DEFAULT_SAMPLE_RATE};

/// Maximum delay time in seconds
const MAX_DELAY_SECONDS: f64 = 2.0;

/// Stereo circular delay line
struct DelayLine {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
    delay_samples: usize,
}

impl DelayLine {
    fn new(sample_rate: f64) -> Self {
        let len = (sample_rate * MAX_DELAY_SECONDS) as usize + 1;
        Self {
            buffer_l: vec![0.0; len],
            buffer_r: vec![0.0; len],
            write_pos: 0,
            delay_samples: 1,
        }
    }

    fn set_delay_samples(&mut self, samples: usize) {
        self.delay_samples = samples.clamp(1, self.buffer_l.len() - 1);
    }

    /// Returns the delayed sample and writes input plus feedback
    #[inline]
    fn process(&mut self, left: f32, right: f32, feedback: f32) -> (f32, f32) {
        let len = self.buffer_l.len();
        let read_pos = (self.write_pos + len - self.delay_samples) % len;
        let delayed_l = self.buffer_l[read_pos];
        let delayed_r = self.buffer_r[read_pos];

        self.buffer_l[self.write_pos] = left + delayed_l * feedback;
        self.buffer_r[self.write_pos] = right + delayed_r * feedback;
        self.write_pos = (self.write_pos + 1) % len;

        (delayed_l, delayed_r)
    }

    fn reset(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
    }
}

/// Parameters:
/// - Time: 10-2000 ms
/// - Feedback: 0-95%
/// - Mix: dry/wet balance
pub struct DelayPlugin {
    base: PluginBase,
    delay_line: DelayLine,
    sample_rate: f64,
}

impl DelayPlugin {
    pub fn new() -> Self {
        let info = PluginInfo::effect("Stereo Delay", "Delay")
            .with_param(
                ParamInfo::new("Time", 0.2) // ~408 ms
                    .with_range(10.0, 2000.0)
                    .with_unit("ms"),
            )
            .with_param(ParamInfo::new("Feedback", 0.4).with_range(0.0, 0.95))
            .with_param(ParamInfo::new("Mix", 0.3).with_range(0.0, 1.0));

        let mut plugin = Self {
            base: PluginBase::new(info),
            delay_line: DelayLine::new(DEFAULT_SAMPLE_RATE),
            sample_rate: DEFAULT_SAMPLE_RATE,
        };
        plugin.update_delay_time();
        plugin
    }

    fn delay_time_ms(&self) -> f32 {
        self.base.param_actual(0)
    }

    fn feedback(&self) -> f32 {
        self.base.param_actual(1)
    }

    fn mix(&self) -> f32 {
        self.base.param_actual(2)
    }

    fn update_delay_time(&mut self) {
        let samples = (self.delay_time_ms() as f64 / 1000.0 * self.sample_rate) as usize;
        self.delay_line.set_delay_samples(samples);
    }
}

impl Default for DelayPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for DelayPlugin {
    fn info(&self) -> &PluginInfo {
        self.base.info()
    }

    fn prepare(&mut self, sample_rate: f64, _max_block: usize) {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.delay_line = DelayLine::new(sample_rate);
        }
        self.update_delay_time();
    }

    fn process(&mut self, buffer: &mut StereoBuffer, _midi: &MidiBuffer) -> PluginResult<()> {
        let feedback = self.feedback();
        let mix = self.mix();
        let dry = 1.0 - mix;

        for sample in buffer.iter_mut() {
            let (delayed_l, delayed_r) = self.delay_line.process(sample.left, sample.right, feedback);
            sample.left = sample.left * dry + delayed_l * mix;
            sample.right = sample.right * dry + delayed_r * mix;
        }
        Ok(())
    }

    fn latency_samples(&self) -> u32 {
        // The echo is the effect itself, not latency to compensate
        0
    }

    fn reset(&mut self) {
        self.delay_line.reset();
    }

    fn params(&self) -> &[ParamValue] {
        self.base.params()
    }

    fn set_param(&mut self, index: usize, value: f32) {
        self.base.set_param(index, value);
        if index == 0 {
            self.update_delay_time();
        }
    }
}
