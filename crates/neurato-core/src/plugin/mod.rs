//! Plugin system - the processing trait, shared instances and the manager
//!
//! A plugin is anything that processes a stereo block with the block's MIDI:
//! - Native Rust effects and instruments ([`native`])
//! - Any external hosting layer that implements [`Plugin`]
//!
//! Instances are owned by the [`PluginManager`] on the UI thread and shared
//! with render snapshots as `Shared<PluginInstance>`, so an unloaded plugin
//! stays alive until the last snapshot that references it is retired.

mod manager;
pub mod native;

pub use manager::PluginManager;
pub use native::NativePlugin;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

use thiserror::Error;

use crate::midi::MidiBuffer;
use crate::types::StereoBuffer;

/// Errors reported by plugins and the plugin manager
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PluginError {
    /// Returned from [`Plugin::process`]; static so the audio thread never
    /// formats a message
    #[error("Plugin processing failed: {0}")]
    Process(&'static str),

    #[error("Unknown native plugin: {0}")]
    UnknownNative(String),

    #[error("Plugin not loaded: {0}")]
    NotLoaded(String),
}

pub type PluginResult<T> = Result<T, PluginError>;

/// Information about a plugin parameter
#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: String,
    /// Default value (0.0-1.0)
    pub default: f32,
    pub min: f32,
    pub max: f32,
    /// Unit label (e.g., "ms", "dB", "%")
    pub unit: String,
}

impl Default for ParamInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            default: 0.5,
            min: 0.0,
            max: 1.0,
            unit: String::new(),
        }
    }
}

impl ParamInfo {
    pub fn new(name: impl Into<String>, default: f32) -> Self {
        Self {
            name: name.into(),
            default,
            ..Default::default()
        }
    }

    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Current parameter value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamValue {
    /// Normalized value (0.0-1.0)
    pub normalized: f32,
    /// Value after range mapping
    pub actual: f32,
}

impl ParamValue {
    pub fn from_normalized(normalized: f32, info: &ParamInfo) -> Self {
        let normalized = normalized.clamp(0.0, 1.0);
        let actual = info.min + normalized * (info.max - info.min);
        Self { normalized, actual }
    }
}

/// Information about a plugin
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub name: String,
    /// e.g. "Utility", "Delay", "Instrument"
    pub category: String,
    /// Instruments generate audio from MIDI
    pub is_instrument: bool,
    pub params: Vec<ParamInfo>,
}

impl PluginInfo {
    pub fn effect(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            is_instrument: false,
            params: Vec::new(),
        }
    }

    pub fn instrument(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: "Instrument".to_string(),
            is_instrument: true,
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: ParamInfo) -> Self {
        self.params.push(param);
        self
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

/// The processing interface every plugin implements
///
/// `process` runs on the audio thread and must not allocate or block. It may
/// still panic or fail; the renderer contains either outcome to this plugin
/// (see [`PluginInstance::process_isolated`]).
pub trait Plugin: Send {
    fn info(&self) -> &PluginInfo;

    /// Called on the UI thread before first use and after device changes
    fn prepare(&mut self, sample_rate: f64, max_block: usize);

    /// Process a stereo block in place. Instruments add their output to
    /// whatever the buffer already holds.
    fn process(&mut self, buffer: &mut StereoBuffer, midi: &MidiBuffer) -> PluginResult<()>;

    fn latency_samples(&self) -> u32;

    /// Clear internal state (delay lines, sounding voices)
    fn reset(&mut self);

    fn params(&self) -> &[ParamValue] {
        &[]
    }

    /// Set a parameter by index (normalized value 0.0-1.0)
    fn set_param(&mut self, _index: usize, _value: f32) {}
}

/// Parameter storage shared by the native plugins
#[derive(Debug, Clone)]
pub struct PluginBase {
    info: PluginInfo,
    params: Vec<ParamValue>,
}

impl PluginBase {
    pub fn new(info: PluginInfo) -> Self {
        let params = info
            .params
            .iter()
            .map(|p| ParamValue::from_normalized(p.default, p))
            .collect();
        Self { info, params }
    }

    pub fn info(&self) -> &PluginInfo {
        &self.info
    }

    pub fn params(&self) -> &[ParamValue] {
        &self.params
    }

    pub fn set_param(&mut self, index: usize, value: f32) {
        if let Some(info) = self.info.params.get(index) {
            self.params[index] = ParamValue::from_normalized(value, info);
        }
    }

    pub fn param_actual(&self, index: usize) -> f32 {
        self.params.get(index).map(|p| p.actual).unwrap_or(0.0)
    }
}

/// A loaded plugin shared between the manager and render snapshots
///
/// The UI thread takes the lock to prepare or edit parameters; the audio
/// thread only ever `try_lock`s it.
pub struct PluginInstance {
    id: String,
    name: String,
    is_instrument: bool,
    plugin: Mutex<Box<dyn Plugin>>,
    /// Blocks this plugin has failed to process
    failures: AtomicU32,
}

impl PluginInstance {
    pub fn new(id: impl Into<String>, plugin: Box<dyn Plugin>) -> Self {
        let info = plugin.info();
        Self {
            id: id.into(),
            name: info.name.clone(),
            is_instrument: info.is_instrument,
            plugin: Mutex::new(plugin),
            failures: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_instrument(&self) -> bool {
        self.is_instrument
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Blocking access for the UI thread. A poisoned lock is recovered.
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn Plugin>> {
        self.plugin.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn prepare(&self, sample_rate: f64, max_block: usize) {
        self.lock().prepare(sample_rate, max_block);
    }

    pub fn set_param(&self, index: usize, value: f32) {
        self.lock().set_param(index, value);
    }

    pub fn latency_samples(&self) -> u32 {
        self.lock().latency_samples()
    }

    /// Process on the audio thread with failure containment
    ///
    /// Never blocks: if the UI thread holds the lock the block passes
    /// through unprocessed, so a parameter edit never drops the signal.
    /// A panic or an `Err` from the plugin silences `buffer`, bumps the
    /// failure counter and returns `false`; the next block is processed
    /// normally.
    pub fn process_isolated(&self, buffer: &mut StereoBuffer, midi: &MidiBuffer) -> bool {
        let mut plugin = match self.plugin.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                log::trace!("Plugin {} busy, passing block through", self.id);
                return false;
            }
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| plugin.process(buffer, midi)));
        if matches!(result, Ok(Ok(()))) {
            return true;
        }

        buffer.fill_silence();
        if self.failures.fetch_add(1, Ordering::Relaxed) == 0 {
            log::warn!("Plugin {} failed while processing; output silenced", self.id);
        }
        false
    }
}


#[cfg(test)]
mod tests {
    use super::test_plugins::{FailingPlugin, PanickingPlugin};
    use super::*;
    use crate::types::StereoSample;

    fn ones(len: usize) -> StereoBuffer {
        let mut buffer = StereoBuffer::silence(len);
        buffer.iter_mut().for_each(|s| *s = StereoSample::mono(1.0));
        buffer
    }

    #[test]
    fn test_param_value_mapping() {
        let info = ParamInfo::new("Time", 0.5).with_range(0.0, 100.0).with_unit("ms");
        assert_eq!(ParamValue::from_normalized(0.5, &info).actual, 50.0);
        assert_eq!(ParamValue::from_normalized(2.0, &info).normalized, 1.0);
        assert_eq!(info.unit, "ms");
    }

    #[test]
    fn test_plugin_base_ignores_unknown_index() {
        let info = PluginInfo::effect("Test", "Test")
            .with_param(ParamInfo::new("P1", 0.5).with_range(0.0, 100.0));
        let mut base = PluginBase::new(info);
        assert_eq!(base.param_actual(0), 50.0);
        base.set_param(5, 1.0);
        assert_eq!(base.param_actual(5), 0.0);
        assert_eq!(base.params().len(), 1);
    }

    #[test]
    fn test_panic_is_contained() {
        let instance = PluginInstance::new("bad", Box::new(PanickingPlugin::new()));
        let mut buffer = ones(64);
        let midi = MidiBuffer::new();

        assert!(!instance.process_isolated(&mut buffer, &midi));
        assert_eq!(buffer.peak(), 0.0);
        assert_eq!(instance.failure_count(), 1);

        // Still usable afterwards
        let mut buffer = ones(64);
        assert!(!instance.process_isolated(&mut buffer, &midi));
        assert_eq!(instance.failure_count(), 2);
    }

    #[test]
    fn test_error_silences_block() {
        let instance = PluginInstance::new("fail", Box::new(FailingPlugin::new()));
        let mut buffer = ones(32);
        assert!(!instance.process_isolated(&mut buffer, &MidiBuffer::new()));
        assert_eq!(buffer.peak(), 0.0);
    }

    #[test]
    fn test_contended_lock_passes_block_through() {
        let instance = PluginInstance::new("gain", NativePlugin::Gain.create());
        instance.set_param(0, 0.0);
        let _held = instance.lock();
        let mut buffer = ones(16);
        assert!(!instance.process_isolated(&mut buffer, &MidiBuffer::new()));
        assert_eq!(buffer.peak(), 1.0);
        assert_eq!(instance.failure_count(), 0);
    }
}
