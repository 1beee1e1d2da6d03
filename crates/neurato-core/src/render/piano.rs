//! Built-in sampled piano
//!
//! Plays one generated piano-like sample, pitch-shifted per note with
//! linear interpolation. Used by MIDI tracks without an instrument plugin
//! and wrapped as [`PianoPlugin`](crate::plugin::native::PianoPlugin).
//!
//! The voice table is fixed-size; `note_on`, `note_off` and `render` never
//! allocate.

use std::sync::OnceLock;

use crate::midi::{MidiEvent, MidiMessage};
use crate::types::{StereoBuffer, DEFAULT_SAMPLE_RATE};

pub const MAX_VOICES: usize = 32;

/// Rate and length of the generated sample (one second)
const SAMPLE_RATE: f64 = 44100.0;
const SAMPLE_LENGTH: usize = 44100;
const FUNDAMENTAL_HZ: f32 = 220.0;
/// The sample's pitch (A3)
const SAMPLE_ROOT_NOTE: i32 = 57;

/// (frequency multiple, amplitude)
const PARTIALS: [(f32, f32); 5] = [(1.0, 0.6), (2.0, 0.3), (3.0, 0.2), (4.0, 0.1), (4.2, 0.05)];

const ATTACK_SECONDS: f32 = 0.01;
const DECAY_SECONDS: f32 = 0.1;
const SUSTAIN_LEVEL: f32 = 0.7;
const RELEASE_SECONDS: f32 = 0.3;
const OUTPUT_SCALE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum EnvelopeStage {
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Debug, Clone, Copy, Default)]
struct Voice {
    note: u8,
    velocity: f32,
    /// Read position in the sample
    position: f64,
    increment: f64,
    stage: EnvelopeStage,
    level: f32,
    /// Samples spent in the current stage
    stage_samples: u32,
    release_start: f32,
}

impl Voice {
    #[inline]
    fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Idle
    }
}

/// Generated once and shared by every synth
static PIANO_SAMPLE: OnceLock<Vec<f32>> = OnceLock::new();

pub struct PianoSynth {
    sample: &'static [f32],
    voices: [Voice; MAX_VOICES],
    sample_rate: f32,
}

impl PianoSynth {
    pub fn new() -> Self {
        Self {
            sample: PIANO_SAMPLE.get_or_init(generate_sample),
            voices: [Voice::default(); MAX_VOICES],
            sample_rate: DEFAULT_SAMPLE_RATE as f32,
        }
    }

    pub fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate as f32;
        self.all_notes_off();
    }

    /// Start a note (velocity 0.0-1.0)
    ///
    /// A note that is already sounding restarts in place. When all voices are
    /// busy the new note is dropped.
    pub fn note_on(&mut self, note: u8, velocity: f32) {
        let index = self
            .voices
            .iter()
            .position(|v| v.is_active() && v.note == note && v.stage != EnvelopeStage::Release)
            .or_else(|| self.voices.iter().position(|v| !v.is_active()));

        let Some(index) = index else {
            return;
        };

        let ratio = 2f64.powf((note as i32 - SAMPLE_ROOT_NOTE) as f64 / 12.0);
        let voice = &mut self.voices[index];
        let retrigger = voice.is_active();
        *voice = Voice {
            note,
            velocity: velocity.clamp(0.0, 1.0),
            position: 0.0,
            increment: ratio * SAMPLE_RATE / self.sample_rate as f64,
            stage: EnvelopeStage::Attack,
            // Retriggered voices ramp from where they are
            level: if retrigger { voice.level } else { 0.0 },
            stage_samples: 0,
            release_start: 0.0,
        };
    }

    pub fn note_off(&mut self, note: u8) {
        for voice in self.voices.iter_mut() {
            if voice.is_active() && voice.note == note && voice.stage != EnvelopeStage::Release {
                voice.release_start = voice.level;
                voice.stage = EnvelopeStage::Release;
                voice.stage_samples = 0;
            }
        }
    }

    /// Send every sounding note into its release stage
    pub fn release_all(&mut self) {
        for voice in self.voices.iter_mut() {
            if voice.is_active() && voice.stage != EnvelopeStage::Release {
                voice.release_start = voice.level;
                voice.stage = EnvelopeStage::Release;
                voice.stage_samples = 0;
            }
        }
    }

    /// Silence every voice immediately
    pub fn all_notes_off(&mut self) {
        for voice in self.voices.iter_mut() {
            *voice = Voice::default();
        }
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Apply a note-on/note-off; other messages are ignored
    pub fn handle_event(&mut self, event: &MidiEvent) {
        match event.message() {
            MidiMessage::NoteOn { note, velocity, .. } => self.note_on(note, velocity as f32 / 127.0),
            MidiMessage::NoteOff { note, .. } => self.note_off(note),
            _ => {}
        }
    }

    /// Add all voices into `output[start..end]`
    pub fn render(&mut self, output: &mut StereoBuffer, start: usize, end: usize) {
        let end = end.min(output.len());
        if start >= end {
            return;
        }

        let sample_rate = self.sample_rate;
        let frames = &mut output.as_mut_slice()[start..end];
        let sample = self.sample;

        for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
            for frame in frames.iter_mut() {
                let envelope = next_envelope(voice, sample_rate);
                if !voice.is_active() {
                    break;
                }
                let value = read_interpolated(sample, voice.position) * voice.velocity * envelope * OUTPUT_SCALE;
                frame.left += value;
                frame.right += value;

                voice.position += voice.increment;
                if voice.position >= SAMPLE_LENGTH as f64 {
                    voice.position -= SAMPLE_LENGTH as f64;
                }
            }
        }
    }

    /// Render a whole block, applying `events` (sorted by offset) at their
    /// sample offsets
    pub fn render_with_events(&mut self, output: &mut StereoBuffer, events: &[MidiEvent]) {
        let mut cursor = 0;
        for event in events {
            let offset = (event.offset as usize).min(output.len());
            self.render(output, cursor, offset);
            cursor = offset;
            self.handle_event(event);
        }
        let len = output.len();
        self.render(output, cursor, len);
    }
}

impl Default for PianoSynth {
    fn default() -> Self {
        Self::new()
    }
}

/// One second of a decaying harmonic tone at 220 Hz
fn generate_sample() -> Vec<f32> {
    (0..SAMPLE_LENGTH)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let tone: f32 = PARTIALS
                .iter()
                .map(|&(multiple, amp)| (std::f32::consts::TAU * FUNDAMENTAL_HZ * multiple * t).sin() * amp)
                .sum();
            tone * (-2.0 * t).exp()
        })
        .collect()
}

#[inline]
fn read_interpolated(sample: &[f32], position: f64) -> f32 {
    let index = position as usize;
    let frac = (position - index as f64) as f32;
    let a = sample[index % sample.len()];
    let b = sample[(index + 1) % sample.len()];
    a + (b - a) * frac
}

/// Advance the ADSR by one sample and return the level to apply
#[inline]
fn next_envelope(voice: &mut Voice, sample_rate: f32) -> f32 {
    let elapsed = voice.stage_samples as f32;
    voice.stage_samples += 1;

    match voice.stage {
        EnvelopeStage::Attack => {
            let attack = ATTACK_SECONDS * sample_rate;
            voice.level = (voice.level + 1.0 / attack).min(1.0);
            if voice.level >= 1.0 {
                voice.stage = EnvelopeStage::Decay;
                voice.stage_samples = 0;
            }
        }
        EnvelopeStage::Decay => {
            let decay = DECAY_SECONDS * sample_rate;
            voice.level = 1.0 - (1.0 - SUSTAIN_LEVEL) * (elapsed / decay);
            if elapsed >= decay {
                voice.level = SUSTAIN_LEVEL;
                voice.stage = EnvelopeStage::Sustain;
            }
        }
        EnvelopeStage::Sustain => voice.level = SUSTAIN_LEVEL,
        EnvelopeStage::Release => {
            let release = RELEASE_SECONDS * sample_rate;
            voice.level = voice.release_start * (1.0 - elapsed / release);
            if elapsed >= release {
                voice.level = 0.0;
                voice.stage = EnvelopeStage::Idle;
            }
        }
        EnvelopeStage::Idle => voice.level = 0.0,
    }
    voice.level
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(synth: &mut PianoSynth, len: usize) -> StereoBuffer {
        let mut buffer = StereoBuffer::silence(len);
        synth.render(&mut buffer, 0, len);
        buffer
    }

    #[test]
    fn test_silent_without_notes() {
        let mut synth = PianoSynth::new();
        assert_eq!(rendered(&mut synth, 256).peak(), 0.0);
    }

    #[test]
    fn test_note_produces_sound_and_releases() {
        let mut synth = PianoSynth::new();
        synth.prepare(44100.0);
        synth.note_on(60, 1.0);
        assert!(rendered(&mut synth, 2048).peak() > 0.01);

        synth.note_off(60);
        // Release is 300 ms (13230 samples)
        rendered(&mut synth, 13300);
        assert_eq!(synth.active_voice_count(), 0);
        assert_eq!(rendered(&mut synth, 256).peak(), 0.0);
    }

    #[test]
    fn test_retrigger_reuses_voice() {
        let mut synth = PianoSynth::new();
        synth.note_on(60, 1.0);
        synth.note_on(60, 0.5);
        assert_eq!(synth.active_voice_count(), 1);
    }

    #[test]
    fn test_voice_exhaustion_drops_new_notes() {
        let mut synth = PianoSynth::new();
        for note in 0..MAX_VOICES as u8 {
            synth.note_on(30 + note, 1.0);
        }
        synth.note_on(100, 1.0);
        assert_eq!(synth.active_voice_count(), MAX_VOICES);
        assert!(synth.voices.iter().all(|v| v.note != 100));
    }

    #[test]
    fn test_events_start_at_their_offset() {
        let mut synth = PianoSynth::new();
        let mut buffer = StereoBuffer::silence(512);
        let events = [MidiEvent::note_on(300, 0, 69, 127)];
        synth.render_with_events(&mut buffer, &events);

        assert!(buffer.as_slice()[..300].iter().all(|s| s.peak() == 0.0));
        assert!(buffer.as_slice()[300..].iter().any(|s| s.peak() > 0.0));
    }

    #[test]
    fn test_envelope_reaches_sustain() {
        let mut voice = Voice {
            stage: EnvelopeStage::Attack,
            ..Voice::default()
        };
        // Attack 441 + decay 4410 samples at 44.1 kHz
        for _ in 0..5000 {
            next_envelope(&mut voice, 44100.0);
        }
        assert_eq!(voice.stage, EnvelopeStage::Sustain);
        assert!((voice.level - SUSTAIN_LEVEL).abs() < 1e-6);
    }
}
