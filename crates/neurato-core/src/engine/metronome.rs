//! Click track synthesized on the audio thread
//!
//! Enabled flag and gain are atomics (the engine applies UI messages to
//! them). The click phase and last triggered beat are plain fields because
//! only the audio thread touches them.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::transport::Transport;
use crate::types::StereoBuffer;

/// Click length in samples (~45 ms at 44.1 kHz)
pub const CLICK_LENGTH: u32 = 2000;
/// Downbeat click pitch
pub const DOWNBEAT_FREQUENCY: f32 = 1200.0;
/// Pitch of the other beats in the bar
pub const BEAT_FREQUENCY: f32 = 800.0;
/// Peak amplitude before the user gain
const CLICK_AMPLITUDE: f32 = 0.5;

pub const DEFAULT_METRONOME_GAIN: f32 = 0.5;

pub struct Metronome {
    enabled: AtomicBool,
    /// f32 stored as bits
    gain: AtomicU32,

    sample_rate: f32,
    /// Samples left in the click currently sounding
    click_remaining: u32,
    click_phase: f32,
    click_frequency: f32,
    /// Index of the last beat that triggered a click (`None` = re-arm)
    last_beat: Option<i64>,
    /// Start of the next block if the transport runs on without a jump
    next_position: Option<i64>,
}

impl Metronome {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            gain: AtomicU32::new(DEFAULT_METRONOME_GAIN.to_bits()),
            sample_rate: 44100.0,
            click_remaining: 0,
            click_phase: 0.0,
            click_frequency: BEAT_FREQUENCY,
            last_beat: None,
            next_position: None,
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.max(0.0).to_bits(), Ordering::Release);
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Acquire))
    }

    pub fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate as f32;
        self.reset();
    }

    /// Forget the click state, e.g. after a seek or device restart
    pub fn reset(&mut self) {
        self.click_remaining = 0;
        self.click_phase = 0.0;
        self.last_beat = None;
        self.next_position = None;
    }

    /// Add the click into `output` for a block that starts at the transport's
    /// current (pre-advance) position.
    pub fn process(&mut self, output: &mut StereoBuffer, transport: &Transport) {
        if !self.is_enabled() || !transport.is_playing() {
            self.click_remaining = 0;
            self.last_beat = None;
            self.next_position = None;
            return;
        }

        let gain = self.gain() * CLICK_AMPLITUDE;
        let start = transport.position_in_samples();
        let (numerator, _) = transport.time_signature();
        let beats_per_bar = numerator.max(1) as i64;

        // Any jump re-arms the detector; landing mid-beat must not click
        if self.next_position != Some(start) {
            self.last_beat = None;
        }
        self.next_position = Some(start + output.len() as i64);

        for (i, frame) in output.iter_mut().enumerate() {
            let beats = transport.samples_to_beats(start + i as i64);
            let beat = beats.floor() as i64;

            if self.last_beat != Some(beat) {
                // Only a boundary crossed inside this block (or the very first
                // sample at an exact beat) starts a click
                let on_boundary = self.last_beat.is_some() || beats - beat as f64 == 0.0;
                self.last_beat = Some(beat);
                if on_boundary {
                    self.click_frequency = if beat.rem_euclid(beats_per_bar) == 0 {
                        DOWNBEAT_FREQUENCY
                    } else {
                        BEAT_FREQUENCY
                    };
                    self.click_remaining = CLICK_LENGTH;
                    self.click_phase = 0.0;
                }
            }

            if self.click_remaining > 0 {
                let elapsed = (CLICK_LENGTH - self.click_remaining) as f32 / CLICK_LENGTH as f32;
                let envelope = (1.0 - elapsed) * (1.0 - elapsed);
                let value = (self.click_phase * std::f32::consts::TAU).sin() * envelope * gain;
                frame.left += value;
                frame.right += value;

                self.click_phase += self.click_frequency / self.sample_rate;
                if self.click_phase >= 1.0 {
                    self.click_phase -= 1.0;
                }
                self.click_remaining -= 1;
            }
        }
    }
}

impl Default for Metronome {
    fn default() -> Self {
        Self::new()
    }
}
