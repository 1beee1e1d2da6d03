//! Tracks and their plugin slots

use super::clip::{Clip, MidiClip};
use super::next_id;
use crate::types::SampleCount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackKind {
    #[default]
    Audio,
    Midi,
}

/// Reference to a plugin in a track's chain
///
/// The slot only names the plugin; the instance lives in the
/// [`PluginManager`](crate::plugin::PluginManager) and is resolved when a
/// render snapshot is built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PluginSlot {
    /// Key into the plugin manager (e.g. "native:gain#1")
    pub plugin_id: String,
    pub name: String,
    /// "Native", "VST3", ...
    pub format: String,
    pub bypassed: bool,
    /// Whether the plugin was found on this system
    pub resolved: bool,
}

impl PluginSlot {
    pub fn new(plugin_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            name: name.into(),
            format: "Native".to_string(),
            bypassed: false,
            resolved: true,
        }
    }

    pub fn bypassed(mut self, bypassed: bool) -> Self {
        self.bypassed = bypassed;
        self
    }
}

/// A track: clips of one kind, a plugin chain and mixer settings
///
/// Audio tracks only hold [`Clip`]s and MIDI tracks only hold
/// [`MidiClip`]s; the `add_*` methods refuse the wrong kind.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub kind: TrackKind,
    pub clips: Vec<Clip>,
    pub midi_clips: Vec<MidiClip>,
    /// Insert effects, in processing order
    pub plugin_chain: Vec<PluginSlot>,
    /// Instrument for MIDI tracks; the built-in piano plays when absent
    pub instrument: Option<PluginSlot>,
    pub gain_db: f32,
    /// -1.0 (left) to 1.0 (right)
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
    /// Audio input is summed into the track while armed
    pub record_armed: bool,
}

impl Track {
    pub fn new(name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: next_id("track"),
            name: name.into(),
            kind,
            clips: Vec::new(),
            midi_clips: Vec::new(),
            plugin_chain: Vec::new(),
            instrument: None,
            gain_db: 0.0,
            pan: 0.0,
            muted: false,
            solo: false,
            record_armed: false,
        }
    }

    #[inline]
    pub fn is_audio(&self) -> bool {
        self.kind == TrackKind::Audio
    }

    #[inline]
    pub fn is_midi(&self) -> bool {
        self.kind == TrackKind::Midi
    }

    /// Add an audio clip. Returns `false` on a MIDI track.
    pub fn add_clip(&mut self, clip: Clip) -> bool {
        if !self.is_audio() {
            log::warn!("Refusing audio clip on MIDI track {}", self.name);
            return false;
        }
        self.clips.push(clip);
        true
    }

    /// Add a MIDI clip. Returns `false` on an audio track.
    pub fn add_midi_clip(&mut self, clip: MidiClip) -> bool {
        if !self.is_midi() {
            log::warn!("Refusing MIDI clip on audio track {}", self.name);
            return false;
        }
        self.midi_clips.push(clip);
        true
    }

    pub fn find_midi_clip(&self, id: &str) -> Option<&MidiClip> {
        self.midi_clips.iter().find(|c| c.id == id)
    }

    pub fn find_midi_clip_mut(&mut self, id: &str) -> Option<&mut MidiClip> {
        self.midi_clips.iter_mut().find(|c| c.id == id)
    }

    /// Timeline end of the last clip of either kind
    pub fn content_end(&self) -> SampleCount {
        let audio_end = self.clips.iter().map(Clip::timeline_end).max().unwrap_or(0);
        let midi_end = self.midi_clips.iter().map(MidiClip::timeline_end).max().unwrap_or(0);
        audio_end.max(midi_end)
    }

    /// Deep copy with new ids for the track and everything it holds
    pub fn duplicate(&self) -> Self {
        Self {
            id: next_id("track"),
            clips: self.clips.iter().map(Clip::duplicate).collect(),
            midi_clips: self.midi_clips.iter().map(MidiClip::duplicate).collect(),
            ..self.clone()
        }
    }
}
