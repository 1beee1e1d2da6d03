//! The project model
//!
//! Owned and mutated by the UI thread only. The audio thread never sees a
//! `Session`; it renders immutable snapshots built from it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use basedrop::Shared;

use super::asset::{AssetResult, AudioAsset};
use super::clip::{Clip, MidiClip};
use super::track::{Track, TrackKind};
use crate::types::{SampleCount, DEFAULT_SAMPLE_RATE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopRegion {
    pub enabled: bool,
    pub start: SampleCount,
    pub end: SampleCount,
}

pub struct Session {
    bpm: f64,
    time_sig_numerator: u32,
    time_sig_denominator: u32,
    sample_rate: f64,
    master_gain_db: f32,
    master_pan: f32,
    loop_region: LoopRegion,
    tracks: Vec<Track>,
    asset_cache: HashMap<PathBuf, Shared<AudioAsset>>,
    next_track_number: u32,
}

impl Session {
    pub fn new() -> Self {
        Self {
            bpm: 120.0,
            time_sig_numerator: 4,
            time_sig_denominator: 4,
            sample_rate: DEFAULT_SAMPLE_RATE,
            master_gain_db: 0.0,
            master_pan: 0.0,
            loop_region: LoopRegion::default(),
            tracks: Vec::new(),
            asset_cache: HashMap::new(),
            next_track_number: 1,
        }
    }

    // ─── Tempo & time signature ──────────────────────────────────────

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm;
    }

    pub fn time_signature(&self) -> (u32, u32) {
        (self.time_sig_numerator, self.time_sig_denominator)
    }

    pub fn set_time_signature(&mut self, numerator: u32, denominator: u32) {
        self.time_sig_numerator = numerator;
        self.time_sig_denominator = denominator;
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    // ─── Loop region ─────────────────────────────────────────────────

    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    /// Set the loop bounds; `start` and `end` are swapped if reversed
    pub fn set_loop_region(&mut self, start: SampleCount, end: SampleCount, enabled: bool) {
        self.loop_region = LoopRegion {
            enabled,
            start: start.min(end),
            end: start.max(end),
        };
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.loop_region.enabled = enabled;
    }

    // ─── Master bus ──────────────────────────────────────────────────

    pub fn master_gain_db(&self) -> f32 {
        self.master_gain_db
    }

    pub fn set_master_gain_db(&mut self, db: f32) {
        self.master_gain_db = db;
    }

    pub fn master_pan(&self) -> f32 {
        self.master_pan
    }

    pub fn set_master_pan(&mut self, pan: f32) {
        self.master_pan = pan.clamp(-1.0, 1.0);
    }

    // ─── Tracks ──────────────────────────────────────────────────────

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    /// Append a track and return its index. An empty name becomes
    /// "Track N" or "MIDI N".
    pub fn add_track(&mut self, name: &str, kind: TrackKind) -> usize {
        let name = if name.is_empty() {
            let prefix = match kind {
                TrackKind::Audio => "Track",
                TrackKind::Midi => "MIDI",
            };
            let name = format!("{} {}", prefix, self.next_track_number);
            self.next_track_number += 1;
            name
        } else {
            name.to_string()
        };
        self.tracks.push(Track::new(name, kind));
        self.tracks.len() - 1
    }

    pub fn add_midi_track(&mut self, name: &str) -> usize {
        self.add_track(name, TrackKind::Midi)
    }

    pub fn remove_track(&mut self, index: usize) -> Option<Track> {
        (index < self.tracks.len()).then(|| self.tracks.remove(index))
    }

    /// Insert at `index`, clamped to the end of the list
    pub fn insert_track(&mut self, index: usize, track: Track) -> usize {
        let index = index.min(self.tracks.len());
        self.tracks.insert(index, track);
        index
    }

    pub fn move_track(&mut self, from: usize, to: usize) -> bool {
        if from >= self.tracks.len() || to >= self.tracks.len() {
            return false;
        }
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);
        true
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn track_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index)
    }

    pub fn find_track_by_id(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn find_track_by_id_mut(&mut self, id: &str) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    pub fn has_soloed_track(&self) -> bool {
        self.tracks.iter().any(|t| t.solo)
    }

    /// Latest timeline end across all clips
    pub fn content_end(&self) -> SampleCount {
        self.tracks.iter().map(Track::content_end).max().unwrap_or(0)
    }

    // ─── Audio assets ────────────────────────────────────────────────

    /// Decode a WAV file, or return the cached asset for a path loaded before
    pub fn load_audio_asset(&mut self, path: &Path) -> AssetResult<Shared<AudioAsset>> {
        if let Some(asset) = self.asset_cache.get(path) {
            log::debug!("Asset cache hit: {:?}", path);
            return Ok(asset.clone());
        }
        let asset = AudioAsset::from_wav(path)?.into_shared();
        self.asset_cache.insert(path.to_path_buf(), asset.clone());
        Ok(asset)
    }

    pub fn audio_asset(&self, path: &Path) -> Option<Shared<AudioAsset>> {
        self.asset_cache.get(path).cloned()
    }

    // ─── Clips ───────────────────────────────────────────────────────

    /// Add an audio clip; fails for a missing index or a MIDI track
    pub fn add_clip_to_track(&mut self, track_index: usize, clip: Clip) -> bool {
        self.tracks
            .get_mut(track_index)
            .is_some_and(|track| track.add_clip(clip))
    }

    /// Add a MIDI clip; fails for a missing index or an audio track
    pub fn add_midi_clip_to_track(&mut self, track_index: usize, clip: MidiClip) -> bool {
        self.tracks
            .get_mut(track_index)
            .is_some_and(|track| track.add_midi_clip(clip))
    }

    /// Remove an audio or MIDI clip by id from one track
    pub fn remove_clip_from_track(&mut self, track_index: usize, clip_id: &str) -> bool {
        let Some(track) = self.tracks.get_mut(track_index) else {
            return false;
        };
        let before = track.clips.len() + track.midi_clips.len();
        track.clips.retain(|c| c.id != clip_id);
        track.midi_clips.retain(|c| c.id != clip_id);
        track.clips.len() + track.midi_clips.len() != before
    }

    pub fn find_clip(&self, clip_id: &str) -> Option<&Clip> {
        self.tracks
            .iter()
            .flat_map(|t| t.clips.iter())
            .find(|c| c.id == clip_id)
    }

    pub fn find_clip_mut(&mut self, clip_id: &str) -> Option<&mut Clip> {
        self.tracks
            .iter_mut()
            .flat_map(|t| t.clips.iter_mut())
            .find(|c| c.id == clip_id)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(len: usize) -> Shared<AudioAsset> {
        AudioAsset::from_channels("test", vec![vec![1.0; len]], 44100.0).into_shared()
    }

    #[test]
    fn test_defaults() {
        let session = Session::new();
        assert_eq!(session.bpm(), 120.0);
        assert_eq!(session.time_signature(), (4, 4));
        assert_eq!(session.sample_rate(), 44100.0);
        assert!(session.tracks().is_empty());
        assert!(!session.loop_region().enabled);
    }

    #[test]
    fn test_auto_track_names() {
        let mut session = Session::new();
        session.add_track("", TrackKind::Audio);
        session.add_midi_track("");
        session.add_track("Vocals", TrackKind::Audio);
        let names: Vec<_> = session.tracks().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Track 1", "MIDI 2", "Vocals"]);
    }

    #[test]
    fn test_insert_move_remove() {
        let mut session = Session::new();
        session.add_track("A", TrackKind::Audio);
        session.add_track("B", TrackKind::Audio);
        assert_eq!(session.insert_track(99, Track::new("C", TrackKind::Audio)), 2);
        assert!(session.move_track(2, 0));
        assert!(!session.move_track(5, 0));
        let names: Vec<_> = session.tracks().iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, ["C", "A", "B"]);

        assert_eq!(session.remove_track(1).map(|t| t.name), Some("A".to_string()));
        assert!(session.remove_track(10).is_none());
        assert_eq!(session.tracks().len(), 2);
    }

    #[test]
    fn test_clip_operations() {
        let mut session = Session::new();
        let audio = session.add_track("Audio", TrackKind::Audio);
        let midi = session.add_midi_track("Keys");

        let clip = Clip::from_asset(asset(100), 1000);
        let clip_id = clip.id.clone();
        assert!(session.add_clip_to_track(audio, clip.clone()));
        assert!(!session.add_clip_to_track(midi, clip.duplicate()));
        assert!(!session.add_clip_to_track(42, clip));

        assert_eq!(session.find_clip(&clip_id).map(|c| c.timeline_start), Some(1000));
        assert_eq!(session.content_end(), 1100);

        assert!(session.remove_clip_from_track(audio, &clip_id));
        assert!(!session.remove_clip_from_track(audio, &clip_id));
        assert!(session.find_clip(&clip_id).is_none());
    }

    #[test]
    fn test_asset_cache_returns_same_asset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..100 {
            writer.write_sample(i as i16).unwrap();
        }
        writer.finalize().unwrap();

        let mut session = Session::new();
        let a = session.load_audio_asset(&path).unwrap();
        let b = session.load_audio_asset(&path).unwrap();
        assert!(std::ptr::eq(&*a, &*b));
        assert!(session.audio_asset(&path).is_some());
    }

    #[test]
    fn test_loop_region_normalised() {
        let mut session = Session::new();
        session.set_loop_region(500, 100, true);
        assert_eq!(
            session.loop_region(),
            LoopRegion { enabled: true, start: 100, end: 500 }
        );
    }
}
