//! Audio and MIDI clips
//!
//! All edits are non-destructive: a clip only describes which region of its
//! asset plays where on the timeline.

use basedrop::Shared;

use super::asset::AudioAsset;
use super::next_id;
use crate::types::SampleCount;

/// A region of an audio asset placed on a track's timeline
#[derive(Clone)]
pub struct Clip {
    pub id: String,
    pub asset: Shared<AudioAsset>,
    /// Position on the timeline
    pub timeline_start: SampleCount,
    /// Trim start (offset into the asset)
    pub source_start: SampleCount,
    /// How many samples of the source play
    pub source_length: SampleCount,
    pub gain_db: f32,
    pub fade_in: SampleCount,
    pub fade_out: SampleCount,
}

impl Clip {
    /// Clip covering the whole asset, starting at `timeline_start`
    pub fn from_asset(asset: Shared<AudioAsset>, timeline_start: SampleCount) -> Self {
        let source_length = asset.length();
        Self {
            id: next_id("clip"),
            asset,
            timeline_start,
            source_start: 0,
            source_length,
            gain_db: 0.0,
            fade_in: 0,
            fade_out: 0,
        }
    }

    #[inline]
    pub fn timeline_end(&self) -> SampleCount {
        self.timeline_start + self.source_length
    }

    /// Copy with a fresh id
    pub fn duplicate(&self) -> Self {
        Self {
            id: next_id("clip"),
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for Clip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clip")
            .field("id", &self.id)
            .field("asset", &self.asset.name)
            .field("timeline_start", &self.timeline_start)
            .field("source_start", &self.source_start)
            .field("source_length", &self.source_length)
            .field("gain_db", &self.gain_db)
            .field("fade_in", &self.fade_in)
            .field("fade_out", &self.fade_out)
            .finish()
    }
}

/// A note inside a MIDI clip, positioned relative to the clip start
#[derive(Debug, Clone, PartialEq)]
pub struct MidiNote {
    pub id: String,
    /// 0-127, middle C = 60
    pub note: u8,
    /// 0.0-1.0
    pub velocity: f32,
    pub start: SampleCount,
    pub length: SampleCount,
}

impl MidiNote {
    pub fn new(note: u8, velocity: f32, start: SampleCount, length: SampleCount) -> Self {
        Self {
            id: next_id("note"),
            note: note.min(127),
            velocity: velocity.clamp(0.0, 1.0),
            start,
            length,
        }
    }

    #[inline]
    pub fn end(&self) -> SampleCount {
        self.start + self.length
    }
}

/// A sequence of notes placed on a MIDI track's timeline
#[derive(Debug, Clone, PartialEq)]
pub struct MidiClip {
    pub id: String,
    pub name: String,
    pub timeline_start: SampleCount,
    pub length: SampleCount,
    pub notes: Vec<MidiNote>,
}

impl MidiClip {
    pub fn empty(timeline_start: SampleCount, length: SampleCount, name: impl Into<String>) -> Self {
        Self {
            id: next_id("midi-clip"),
            name: name.into(),
            timeline_start,
            length,
            notes: Vec::new(),
        }
    }

    #[inline]
    pub fn timeline_end(&self) -> SampleCount {
        self.timeline_start + self.length
    }

    /// Append a note and return its id
    pub fn add_note(&mut self, note: MidiNote) -> String {
        let id = note.id.clone();
        self.notes.push(note);
        id
    }

    pub fn find_note(&self, id: &str) -> Option<&MidiNote> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn find_note_mut(&mut self, id: &str) -> Option<&mut MidiNote> {
        self.notes.iter_mut().find(|n| n.id == id)
    }

    pub fn remove_note(&mut self, id: &str) -> bool {
        let before = self.notes.len();
        self.notes.retain(|n| n.id != id);
        self.notes.len() != before
    }

    /// Lowest and highest note, `(60, 72)` for an empty clip
    pub fn note_range(&self) -> (u8, u8) {
        if self.notes.is_empty() {
            return (60, 72);
        }
        self.notes.iter().fold((127, 0), |(lo, hi), n| (lo.min(n.note), hi.max(n.note)))
    }

    /// Copy with fresh ids for the clip and every note
    pub fn duplicate(&self) -> Self {
        Self {
            id: next_id("midi-clip"),
            name: self.name.clone(),
            timeline_start: self.timeline_start,
            length: self.length,
            notes: self
                .notes
                .iter()
                .map(|n| MidiNote {
                    id: next_id("note"),
                    ..n.clone()
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_from_asset() {
        let asset = AudioAsset::from_channels("a", vec![vec![0.0; 100]], 44100.0).into_shared();
        let clip = Clip::from_asset(asset, 50);
        assert_eq!(clip.source_length, 100);
        assert_eq!(clip.timeline_end(), 150);
        assert_ne!(clip.duplicate().id, clip.id);
    }

    #[test]
    fn test_note_range() {
        let mut clip = MidiClip::empty(0, 1000, "MIDI");
        assert_eq!(clip.note_range(), (60, 72));
        clip.add_note(MidiNote::new(64, 0.8, 0, 100));
        clip.add_note(MidiNote::new(48, 0.8, 100, 100));
        assert_eq!(clip.note_range(), (48, 64));
    }

    #[test]
    fn test_note_lookup_and_remove() {
        let mut clip = MidiClip::empty(0, 1000, "MIDI");
        let id = clip.add_note(MidiNote::new(60, 2.0, 10, 20));
        assert_eq!(clip.find_note(&id).map(|n| n.velocity), Some(1.0));
        assert_eq!(clip.find_note(&id).map(MidiNote::end), Some(30));
        assert!(clip.remove_note(&id));
        assert!(!clip.remove_note(&id));
    }

    #[test]
    fn test_duplicate_midi_clip_gets_new_ids() {
        let mut clip = MidiClip::empty(0, 1000, "MIDI");
        clip.add_note(MidiNote::new(60, 0.5, 0, 10));
        let copy = clip.duplicate();
        assert_ne!(copy.id, clip.id);
        assert_ne!(copy.notes[0].id, clip.notes[0].id);
        assert_eq!(copy.notes[0].note, 60);
    }
}
