//! Immutable render snapshot of a session
//!
//! Built on the UI thread from a [`Session`] and the [`PluginManager`];
//! everything the renderer needs is resolved here so the audio thread only
//! reads plain values. The snapshot holds `Shared` references to every asset
//! and plugin instance it uses, which keeps them alive for as long as the
//! audio thread may touch them.

use basedrop::Shared;

use crate::model::{AudioAsset, PluginSlot, Session, Track};
use crate::plugin::{PluginInstance, PluginManager};
use crate::types::{balance_pan, constant_power_pan, db_to_gain, SampleCount};

/// An audio clip with its gain resolved to linear
pub struct RenderClip {
    pub asset: Shared<AudioAsset>,
    pub timeline_start: SampleCount,
    pub source_start: SampleCount,
    pub source_length: SampleCount,
    pub gain: f32,
    pub fade_in: SampleCount,
    pub fade_out: SampleCount,
}

impl RenderClip {
    #[inline]
    pub fn timeline_end(&self) -> SampleCount {
        self.timeline_start + self.source_length
    }
}

/// A note at timeline-absolute sample positions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderNote {
    pub note: u8,
    /// 0.0-1.0
    pub velocity: f32,
    pub absolute_start: SampleCount,
    pub absolute_end: SampleCount,
}

pub struct RenderPlugin {
    pub instance: Shared<PluginInstance>,
    pub bypassed: bool,
}

pub struct RenderTrack {
    pub gain: f32,
    /// Constant-power pan coefficients
    pub pan_l: f32,
    pub pan_r: f32,
    pub muted: bool,
    pub solo: bool,
    pub is_midi: bool,
    pub record_armed: bool,
    pub clips: Vec<RenderClip>,
    /// Every note of every MIDI clip, sorted by start
    pub notes: Vec<RenderNote>,
    /// Longest note in `notes`; bounds how far back a block must look for
    /// note-offs
    pub max_note_length: SampleCount,
    pub instrument: Option<RenderPlugin>,
    /// Insert effects in chain order
    pub plugins: Vec<RenderPlugin>,
}

impl RenderTrack {
    /// Whether gain and pan are deferred until after plugin processing
    #[inline]
    pub fn has_plugin_chain(&self) -> bool {
        self.instrument.is_some() || !self.plugins.is_empty()
    }
}

pub struct RenderSnapshot {
    /// Increments with every publish
    pub generation: u64,
    pub tracks: Vec<RenderTrack>,
    pub has_soloed_track: bool,
    pub master_gain: f32,
    /// Master pan coefficients
    ///
    /// The master bus uses a balance law (the far side is attenuated, the
    /// near side stays at unity), unlike the constant-power law on tracks.
    /// A centred master is therefore exactly unity and a default session
    /// passes the track mix through unchanged.
    pub master_pan_l: f32,
    pub master_pan_r: f32,
}

impl RenderSnapshot {
    pub fn build(session: &Session, plugins: &PluginManager, generation: u64) -> Self {
        let (master_pan_l, master_pan_r) = balance_pan(session.master_pan());
        Self {
            generation,
            tracks: session.tracks().iter().map(|t| build_track(t, plugins)).collect(),
            has_soloed_track: session.has_soloed_track(),
            master_gain: db_to_gain(session.master_gain_db()),
            master_pan_l,
            master_pan_r,
        }
    }

    /// Snapshot with no tracks and a unity master bus
    pub fn empty(generation: u64) -> Self {
        Self {
            generation,
            tracks: Vec::new(),
            has_soloed_track: false,
            master_gain: 1.0,
            master_pan_l: 1.0,
            master_pan_r: 1.0,
        }
    }

    /// Whether the master bus changes the signal at all
    #[inline]
    pub fn master_is_unity(&self) -> bool {
        self.master_gain == 1.0 && self.master_pan_l == 1.0 && self.master_pan_r == 1.0
    }
}

fn build_track(track: &Track, plugins: &PluginManager) -> RenderTrack {
    let (pan_l, pan_r) = constant_power_pan(track.pan);

    let clips = track
        .clips
        .iter()
        .filter(|clip| {
            let playable = !clip.asset.is_empty() && clip.source_length > 0;
            if !playable {
                log::debug!("Skipping empty clip {} on track {}", clip.id, track.name);
            }
            playable
        })
        .map(|clip| RenderClip {
            asset: clip.asset.clone(),
            timeline_start: clip.timeline_start,
            source_start: clip.source_start,
            source_length: clip.source_length,
            gain: db_to_gain(clip.gain_db),
            fade_in: clip.fade_in.max(0),
            fade_out: clip.fade_out.max(0),
        })
        .collect();

    // Notes past the clip end are cut off, ends are clipped to it
    let mut notes: Vec<RenderNote> = track
        .midi_clips
        .iter()
        .flat_map(|clip| {
            clip.notes
                .iter()
                .filter(move |note| note.start < clip.length && note.length > 0)
                .map(move |note| RenderNote {
                    note: note.note,
                    velocity: note.velocity,
                    absolute_start: clip.timeline_start + note.start,
                    absolute_end: clip.timeline_start + note.end().min(clip.length),
                })
        })
        .collect();
    notes.sort_by_key(|n| n.absolute_start);
    let max_note_length = notes
        .iter()
        .map(|n| n.absolute_end - n.absolute_start)
        .max()
        .unwrap_or(0);

    RenderTrack {
        gain: db_to_gain(track.gain_db),
        pan_l,
        pan_r,
        muted: track.muted,
        solo: track.solo,
        is_midi: track.is_midi(),
        record_armed: track.record_armed,
        clips,
        notes,
        max_note_length,
        instrument: track
            .instrument
            .as_ref()
            .filter(|_| track.is_midi())
            .and_then(|slot| resolve_slot(slot, plugins, &track.name)),
        plugins: track
            .plugin_chain
            .iter()
            .filter_map(|slot| resolve_slot(slot, plugins, &track.name))
            .collect(),
    }
}

fn resolve_slot(slot: &PluginSlot, plugins: &PluginManager, track_name: &str) -> Option<RenderPlugin> {
    if !slot.resolved {
        return None;
    }
    match plugins.plugin_for_audio(&slot.plugin_id) {
        Some(instance) => Some(RenderPlugin {
            instance,
            bypassed: slot.bypassed,
        }),
        None => {
            log::warn!(
                "Plugin {} ({}) on track {} is not loaded, skipping",
                slot.name,
                slot.plugin_id,
                track_name
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Clip, MidiClip, MidiNote, TrackKind};
    use crate::plugin::NativePlugin;

    fn asset(len: usize) -> Shared<AudioAsset> {
        AudioAsset::from_channels("a", vec![vec![1.0; len]], 44100.0).into_shared()
    }

    #[test]
    fn test_pan_and_gain_resolved() {
        let mut session = Session::new();
        let index = session.add_track("A", TrackKind::Audio);
        let track = session.track_mut(index).unwrap();
        track.gain_db = -6.0;
        track.pan = -1.0;

        let snapshot = RenderSnapshot::build(&session, &PluginManager::new(), 3);
        let track = &snapshot.tracks[0];
        assert_eq!(snapshot.generation, 3);
        assert!((track.gain - 0.501).abs() < 0.001);
        assert!((track.pan_l - 1.0).abs() < 1e-6);
        assert!(track.pan_r.abs() < 1e-6);
        assert!(snapshot.master_is_unity());
    }

    #[test]
    fn test_master_pan_uses_balance_law() {
        let mut session = Session::new();
        let snapshot = RenderSnapshot::build(&session, &PluginManager::new(), 1);
        assert_eq!((snapshot.master_pan_l, snapshot.master_pan_r), (1.0, 1.0));

        // The near side stays at unity, unlike constant-power track pan
        session.set_master_pan(0.5);
        let snapshot = RenderSnapshot::build(&session, &PluginManager::new(), 2);
        assert_eq!(snapshot.master_pan_r, 1.0);
        assert!((snapshot.master_pan_l - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!(!snapshot.master_is_unity());
    }

    #[test]
    fn test_empty_clips_skipped() {
        let mut session = Session::new();
        let index = session.add_track("A", TrackKind::Audio);
        let mut trimmed = Clip::from_asset(asset(100), 0);
        trimmed.source_length = 0;
        session.add_clip_to_track(index, trimmed);
        session.add_clip_to_track(index, Clip::from_asset(asset(100), 0));

        let snapshot = RenderSnapshot::build(&session, &PluginManager::new(), 1);
        assert_eq!(snapshot.tracks[0].clips.len(), 1);
    }

    #[test]
    fn test_notes_flattened_to_absolute_positions() {
        let mut session = Session::new();
        let index = session.add_midi_track("Keys");
        let mut clip = MidiClip::empty(1000, 500, "MIDI");
        clip.add_note(MidiNote::new(64, 0.5, 100, 50));
        clip.add_note(MidiNote::new(60, 0.8, 0, 1000));
        clip.add_note(MidiNote::new(72, 0.8, 600, 10));
        session.add_midi_clip_to_track(index, clip);

        let snapshot = RenderSnapshot::build(&session, &PluginManager::new(), 1);
        let notes = &snapshot.tracks[0].notes;
        assert_eq!(notes.len(), 2);
        assert_eq!((notes[0].note, notes[0].absolute_start, notes[0].absolute_end), (60, 1000, 1500));
        assert_eq!((notes[1].note, notes[1].absolute_start, notes[1].absolute_end), (64, 1100, 1150));
        // The 1000-sample note is clipped to 500 by the clip end
        assert_eq!(snapshot.tracks[0].max_note_length, 500);
    }

    #[test]
    fn test_missing_plugins_are_skipped() {
        let mut plugins = PluginManager::new();
        plugins.load_native("gain", NativePlugin::Gain);

        let mut session = Session::new();
        let index = session.add_track("A", TrackKind::Audio);
        let track = session.track_mut(index).unwrap();
        track.plugin_chain.push(PluginSlot::new("missing", "Missing"));
        track.plugin_chain.push(PluginSlot::new("gain", "Gain").bypassed(true));
        // Instruments are only used on MIDI tracks
        track.instrument = Some(PluginSlot::new("gain", "Gain"));

        let snapshot = RenderSnapshot::build(&session, &plugins, 1);
        let track = &snapshot.tracks[0];
        assert_eq!(track.plugins.len(), 1);
        assert!(track.plugins[0].bypassed);
        assert!(track.instrument.is_none());
        assert!(track.has_plugin_chain());
    }
}
