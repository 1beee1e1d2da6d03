//! Table of loaded plugin instances (UI thread)

use std::collections::HashMap;

use basedrop::Shared;

use super::native::NativePlugin;
use super::{Plugin, PluginError, PluginInfo, PluginInstance, PluginResult};
use crate::engine::gc_handle;
use crate::types::{DEFAULT_SAMPLE_RATE, MAX_BLOCK_SIZE};

/// Owns every loaded plugin, keyed by plugin id
///
/// Lookups hand out `Shared` clones, so removing an entry never frees an
/// instance a published snapshot still points at.
pub struct PluginManager {
    plugins: HashMap<String, Shared<PluginInstance>>,
    sample_rate: f64,
    max_block: usize,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block: MAX_BLOCK_SIZE,
        }
    }

    /// Id of the built-in piano loaded by [`load_default_instruments`](Self::load_default_instruments)
    pub fn default_piano_id() -> String {
        Self::native_id(NativePlugin::Piano)
    }

    /// Conventional id for a native plugin ("native:gain")
    pub fn native_id(plugin: NativePlugin) -> String {
        format!("native:{}", plugin.name())
    }

    /// Prepare and register a plugin, replacing any plugin with the same id
    pub fn load(&mut self, id: impl Into<String>, mut plugin: Box<dyn Plugin>) -> Shared<PluginInstance> {
        let id = id.into();
        plugin.prepare(self.sample_rate, self.max_block);
        log::info!("Loaded plugin {} ({})", id, plugin.info().name);

        let instance = Shared::new(&gc_handle(), PluginInstance::new(id.clone(), plugin));
        if self.plugins.insert(id.clone(), instance.clone()).is_some() {
            log::debug!("Replaced previously loaded plugin {}", id);
        }
        instance
    }

    pub fn load_native(&mut self, id: impl Into<String>, plugin: NativePlugin) -> Shared<PluginInstance> {
        self.load(id, plugin.create())
    }

    /// Load a native plugin by name ("gain", "delay", "piano")
    pub fn load_native_by_name(&mut self, id: impl Into<String>, name: &str) -> PluginResult<Shared<PluginInstance>> {
        let plugin = NativePlugin::from_name(name).ok_or_else(|| PluginError::UnknownNative(name.to_string()))?;
        Ok(self.load_native(id, plugin))
    }

    /// Load the built-in piano under [`default_piano_id`](Self::default_piano_id)
    pub fn load_default_instruments(&mut self) {
        if !self.is_loaded(&Self::default_piano_id()) {
            self.load_native(Self::default_piano_id(), NativePlugin::Piano);
        }
    }

    /// Drop the table's reference. Returns `false` for an unknown id.
    pub fn unload(&mut self, id: &str) -> bool {
        let removed = self.plugins.remove(id).is_some();
        if removed {
            log::info!("Unloaded plugin {}", id);
        }
        removed
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    /// Instance for a render snapshot, or `None` when not loaded
    pub fn plugin_for_audio(&self, id: &str) -> Option<Shared<PluginInstance>> {
        self.plugins.get(id).cloned()
    }

    pub fn get(&self, id: &str) -> PluginResult<&Shared<PluginInstance>> {
        self.plugins.get(id).ok_or_else(|| PluginError::NotLoaded(id.to_string()))
    }

    /// Re-prepare every plugin for a new device configuration
    pub fn prepare_all(&mut self, sample_rate: f64, max_block: usize) {
        self.sample_rate = sample_rate;
        self.max_block = max_block;
        for instance in self.plugins.values() {
            instance.prepare(sample_rate, max_block);
        }
        log::debug!(
            "Prepared {} plugins at {}Hz, max block {}",
            self.plugins.len(),
            sample_rate,
            max_block
        );
    }

    /// Sorted ids of every loaded plugin
    pub fn loaded_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.plugins.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    /// Descriptions of every plugin that can be loaded
    pub fn available_plugins(&self) -> Vec<(NativePlugin, PluginInfo)> {
        NativePlugin::ALL
            .into_iter()
            .map(|p| (p, p.create().info().clone()))
            .collect()
    }

    pub fn instruments(&self) -> Vec<(NativePlugin, PluginInfo)> {
        self.available_plugins()
            .into_iter()
            .filter(|(_, info)| info.is_instrument)
            .collect()
    }

    pub fn effects(&self) -> Vec<(NativePlugin, PluginInfo)> {
        self.available_plugins()
            .into_iter()
            .filter(|(_, info)| !info.is_instrument)
            .collect()
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}
