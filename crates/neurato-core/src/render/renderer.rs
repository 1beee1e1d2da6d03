//! Snapshot publishing and the per-block mixer
//!
//! [`session_renderer`] returns the two halves of one handoff:
//!
//! - [`SessionPublisher`] (UI thread) builds a [`RenderSnapshot`] and swaps
//!   it into a single pending slot. A snapshot still pending when the next
//!   one arrives is discarded, so the audio thread only ever sees the latest.
//! - [`SessionRenderer`] (audio thread) adopts the pending snapshot at the
//!   start of a block and mixes every track into the output.
//!
//! The renderer keeps three slots: `active` (rendered now), `retiring` (the
//! previous active, released at the start of the next block) and the shared
//! pending cell. Released snapshots go to the basedrop collector, so the
//! audio thread never frees memory.

use std::mem;
use std::sync::Arc;

use basedrop::{Shared, SharedCell};

use super::piano::PianoSynth;
use super::snapshot::{RenderClip, RenderNote, RenderPlugin, RenderSnapshot};
use crate::engine::gc_handle;
use crate::midi::{MidiBuffer, MidiEvent};
use crate::model::Session;
use crate::plugin::PluginManager;
use crate::types::{SampleCount, StereoBuffer, StereoSample, DEFAULT_SAMPLE_RATE, MAX_BLOCK_SIZE};

/// Built-in piano instances, one per MIDI track (by MIDI track order)
pub const PIANO_POOL_SIZE: usize = 64;

type SnapshotSlot = Shared<Option<RenderSnapshot>>;

/// Create a connected publisher/renderer pair
pub fn session_renderer(sample_rate: f64) -> (SessionPublisher, SessionRenderer) {
    let handle = gc_handle();
    let empty = Shared::new(&handle, None);
    let pending = Arc::new(SharedCell::new(empty.clone()));

    let publisher = SessionPublisher {
        pending: Arc::clone(&pending),
        generation: 0,
    };

    let mut renderer = SessionRenderer {
        pending,
        active: empty.clone(),
        retiring: None,
        empty,
        pianos: (0..PIANO_POOL_SIZE).map(|_| PianoSynth::new()).collect(),
        track_buffer: StereoBuffer::with_capacity(MAX_BLOCK_SIZE),
        piano_buffer: StereoBuffer::with_capacity(MAX_BLOCK_SIZE),
        mix_buffer: StereoBuffer::with_capacity(MAX_BLOCK_SIZE),
        track_midi: MidiBuffer::new(),
        no_midi: MidiBuffer::with_capacity(0),
        next_position: None,
        sample_rate,
    };
    renderer.prepare(sample_rate, MAX_BLOCK_SIZE);

    (publisher, renderer)
}

/// UI-thread half: builds and publishes snapshots
pub struct SessionPublisher {
    pending: Arc<SharedCell<Option<RenderSnapshot>>>,
    generation: u64,
}

impl SessionPublisher {
    /// Build a snapshot of `session` and make it the pending one
    pub fn publish(&mut self, session: &Session, plugins: &PluginManager) -> u64 {
        self.generation += 1;
        let snapshot = RenderSnapshot::build(session, plugins, self.generation);
        log::debug!(
            "Publishing snapshot {} ({} tracks)",
            snapshot.generation,
            snapshot.tracks.len()
        );
        self.store(snapshot);
        self.generation
    }

    /// Publish a prebuilt snapshot. Its generation is replaced with the next
    /// one from this publisher.
    pub fn publish_snapshot(&mut self, mut snapshot: RenderSnapshot) -> u64 {
        self.generation += 1;
        snapshot.generation = self.generation;
        self.store(snapshot);
        self.generation
    }

    /// Generation of the most recent publish (0 before the first)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn store(&self, snapshot: RenderSnapshot) {
        // The displaced snapshot, if never adopted, is dropped here
        self.pending.set(Shared::new(&gc_handle(), Some(snapshot)));
    }
}

/// Audio-thread half: adopts snapshots and mixes them
pub struct SessionRenderer {
    pending: Arc<SharedCell<Option<RenderSnapshot>>>,
    active: SnapshotSlot,
    retiring: Option<SnapshotSlot>,
    /// Pre-allocated `None` swapped into the pending cell
    empty: SnapshotSlot,

    pianos: Vec<PianoSynth>,
    track_buffer: StereoBuffer,
    piano_buffer: StereoBuffer,
    mix_buffer: StereoBuffer,
    track_midi: MidiBuffer,
    no_midi: MidiBuffer,
    /// Where the next sequenced block starts if playback is continuous
    next_position: Option<SampleCount>,
    sample_rate: f64,
}

impl SessionRenderer {
    /// Propagate the device configuration (call outside of `process`)
    pub fn prepare(&mut self, sample_rate: f64, _max_block: usize) {
        self.sample_rate = if sample_rate > 0.0 { sample_rate } else { DEFAULT_SAMPLE_RATE };
        for piano in self.pianos.iter_mut() {
            piano.prepare(self.sample_rate);
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Whether any snapshot has been adopted
    pub fn has_snapshot(&self) -> bool {
        self.active.is_some()
    }

    /// Generation of the snapshot being rendered
    pub fn active_generation(&self) -> Option<u64> {
        (*self.active).as_ref().map(|s| s.generation)
    }

    /// Release the retiring snapshot and adopt a pending one, if any
    ///
    /// Called at the top of every `process`; public so the engine can keep
    /// the handoff moving while nothing is rendered. Notes held by the
    /// built-in pianos are released on adoption, since the new snapshot may
    /// no longer contain their note-offs.
    pub fn update_snapshot(&mut self) {
        self.retiring = None;

        let incoming = self.pending.replace(self.empty.clone());
        if incoming.is_some() {
            self.retiring = Some(mem::replace(&mut self.active, incoming));
            for piano in self.pianos.iter_mut() {
                piano.release_all();
            }
        }
    }

    /// Cut every built-in piano voice (transport stop or seek)
    pub fn silence_instruments(&mut self) {
        for piano in self.pianos.iter_mut() {
            piano.all_notes_off();
        }
        self.next_position = None;
    }

    /// Sum the session at `position` into `output`
    pub fn process(&mut self, output: &mut StereoBuffer, position: SampleCount) {
        self.process_with_external_io(output, position, None, &MidiBuffer::with_capacity(0));
    }

    /// Sum the session into `output`, with live audio input for
    /// record-armed tracks and live MIDI for every MIDI track
    ///
    /// `output` is added to, never cleared. External MIDI offsets are relative
    /// to the start of `output`.
    pub fn process_with_external_io(
        &mut self,
        output: &mut StereoBuffer,
        position: SampleCount,
        audio_in: Option<&StereoBuffer>,
        external_midi: &MidiBuffer,
    ) {
        self.render_blocks(output, position, audio_in, external_midi, true);
    }

    /// Render only live sources (external MIDI and record-armed input),
    /// for a stopped transport. Clips and sequenced notes stay silent.
    pub fn process_live(&mut self, output: &mut StereoBuffer, audio_in: Option<&StereoBuffer>, external_midi: &MidiBuffer) {
        self.render_blocks(output, 0, audio_in, external_midi, false);
    }

    fn render_blocks(
        &mut self,
        output: &mut StereoBuffer,
        position: SampleCount,
        audio_in: Option<&StereoBuffer>,
        external_midi: &MidiBuffer,
        sequenced: bool,
    ) {
        self.update_snapshot();
        if !self.has_snapshot() {
            return;
        }

        let len = output.len();
        if sequenced {
            // A jump skips note-offs, so nothing held may carry over
            if self.next_position != Some(position) {
                self.silence_instruments();
            }
            self.next_position = Some(position + len as SampleCount);
        } else {
            self.next_position = None;
        }

        let mut start = 0;
        while start < len {
            let end = (start + MAX_BLOCK_SIZE).min(len);
            let input = audio_in.map(|buffer| {
                let slice = buffer.as_slice();
                &slice[start.min(slice.len())..end.min(slice.len())]
            });
            self.render_chunk(
                &mut output.as_mut_slice()[start..end],
                position + start as SampleCount,
                input,
                external_midi,
                start as u32,
                sequenced,
            );
            start = end;
        }
    }

    fn render_chunk(
        &mut self,
        output: &mut [StereoSample],
        position: SampleCount,
        audio_in: Option<&[StereoSample]>,
        external_midi: &MidiBuffer,
        midi_offset: u32,
        sequenced: bool,
    ) {
        let Self {
            active,
            pianos,
            track_buffer,
            piano_buffer,
            mix_buffer,
            track_midi,
            no_midi,
            ..
        } = self;
        let Some(snapshot) = &**active else {
            return;
        };

        let len = output.len();
        mix_buffer.set_len_from_capacity(len);
        mix_buffer.fill_silence();
        track_buffer.set_len_from_capacity(len);
        piano_buffer.set_len_from_capacity(len);

        let mut midi_index = 0;
        for track in &snapshot.tracks {
            // Pool slots follow MIDI track order whether or not the track plays
            let piano = if track.is_midi {
                midi_index += 1;
                pianos.get_mut(midi_index - 1)
            } else {
                None
            };

            if track.muted || (snapshot.has_soloed_track && !track.solo) {
                if let Some(piano) = piano {
                    piano.all_notes_off();
                }
                continue;
            }

            track_buffer.fill_silence();
            let deferred = track.has_plugin_chain();
            let (gain, pan_l, pan_r) = if deferred {
                (1.0, 1.0, 1.0)
            } else {
                (track.gain, track.pan_l, track.pan_r)
            };

            if track.record_armed && !track.is_midi {
                if let Some(input) = audio_in {
                    mix_input(track_buffer, input, gain * pan_l, gain * pan_r);
                }
            }

            if track.is_midi {
                let notes: &[RenderNote] = if sequenced { &track.notes } else { &[] };
                collect_track_midi(
                    notes,
                    track.max_note_length,
                    position,
                    len,
                    external_midi,
                    midi_offset,
                    track_midi,
                );
                match &track.instrument {
                    Some(instrument) => {
                        if !instrument.bypassed {
                            instrument.instance.process_isolated(track_buffer, track_midi);
                        }
                    }
                    None => {
                        if let Some(piano) = piano {
                            piano_buffer.fill_silence();
                            piano.render_with_events(piano_buffer, track_midi.as_slice());
                            add_scaled(track_buffer, piano_buffer, gain * pan_l, gain * pan_r);
                        }
                    }
                }
            } else if sequenced {
                for clip in &track.clips {
                    mix_clip(track_buffer, clip, position, gain * pan_l, gain * pan_r);
                }
            }

            if deferred {
                let midi = if track.is_midi { &*track_midi } else { &*no_midi };
                run_effects(&track.plugins, track_buffer, midi);
                track_buffer.apply_gain_pan(track.gain, track.pan_l, track.pan_r);
            }

            mix_buffer.add_buffer(track_buffer);
        }

        if !snapshot.master_is_unity() {
            mix_buffer.apply_gain_pan(snapshot.master_gain, snapshot.master_pan_l, snapshot.master_pan_r);
        }

        for (out, mixed) in output.iter_mut().zip(mix_buffer.iter()) {
            *out += *mixed;
        }
    }
}

/// Insert effects in chain order, bypassed slots skipped
fn run_effects(plugins: &[RenderPlugin], buffer: &mut StereoBuffer, midi: &MidiBuffer) {
    for plugin in plugins.iter().filter(|p| !p.bypassed) {
        plugin.instance.process_isolated(buffer, midi);
    }
}

/// Sequenced note events for `[position, position + len)` plus external
/// MIDI for this chunk, sorted by offset
///
/// `notes` is sorted by start and no note is longer than `max_note_length`,
/// so notes starting before `position - max_note_length` have already ended.
fn collect_track_midi(
    notes: &[RenderNote],
    max_note_length: SampleCount,
    position: SampleCount,
    len: usize,
    external_midi: &MidiBuffer,
    midi_offset: u32,
    out: &mut MidiBuffer,
) {
    out.clear();
    let block_end = position + len as SampleCount;
    let in_block = |t: SampleCount| t >= position && t < block_end;

    for event in external_midi.iter() {
        if event.offset >= midi_offset && ((event.offset - midi_offset) as usize) < len {
            out.push(MidiEvent {
                offset: event.offset - midi_offset,
                ..*event
            });
        }
    }

    let first = notes.partition_point(|n| n.absolute_start < position - max_note_length);
    for note in &notes[first..] {
        if note.absolute_start >= block_end {
            // Sorted by start: nothing later begins in this block
            break;
        }
        let velocity = (note.velocity * 127.0).round().clamp(1.0, 127.0) as u8;
        if in_block(note.absolute_start) {
            out.push(MidiEvent::note_on((note.absolute_start - position) as u32, 0, note.note, velocity));
        }
        if in_block(note.absolute_end) {
            out.push(MidiEvent::note_off((note.absolute_end - position) as u32, 0, note.note));
        }
    }

    out.sort_by_offset();
}

/// Add one clip's overlap with the block into `buffer`
fn mix_clip(buffer: &mut StereoBuffer, clip: &RenderClip, position: SampleCount, left_gain: f32, right_gain: f32) {
    let len = buffer.len() as SampleCount;
    let clip_end = clip.timeline_end();
    if position >= clip_end || position + len <= clip.timeline_start {
        return;
    }

    let block_start = (clip.timeline_start - position).max(0);
    let block_end = (clip_end - position).min(len);
    let asset_length = clip.asset.length();

    for i in block_start..block_end {
        let pos_in_clip = position + i - clip.timeline_start;
        let source_pos = clip.source_start + pos_in_clip;
        if source_pos < 0 || source_pos >= asset_length {
            continue;
        }

        let mut envelope = 1.0;
        if clip.fade_in > 0 && pos_in_clip < clip.fade_in {
            envelope = pos_in_clip as f32 / clip.fade_in as f32;
        }
        if clip.fade_out > 0 && pos_in_clip >= clip.source_length - clip.fade_out {
            envelope *= (clip.source_length - pos_in_clip) as f32 / clip.fade_out as f32;
        }

        let (left, right) = clip.asset.frame(source_pos as usize);
        let gain = clip.gain * envelope;
        let frame = &mut buffer[i as usize];
        frame.left += left * gain * left_gain;
        frame.right += right * gain * right_gain;
    }
}

/// Add live input; shorter input only covers the start of the block
fn mix_input(buffer: &mut StereoBuffer, input: &[StereoSample], left_gain: f32, right_gain: f32) {
    for (frame, sample) in buffer.iter_mut().zip(input) {
        frame.left += sample.left * left_gain;
        frame.right += sample.right * right_gain;
    }
}

fn add_scaled(buffer: &mut StereoBuffer, source: &StereoBuffer, left_gain: f32, right_gain: f32) {
    for (frame, sample) in buffer.iter_mut().zip(source.iter()) {
        frame.left += sample.left * left_gain;
        frame.right += sample.right * right_gain;
    }
}
