//! Shared playback clock
//!
//! The transport is read by the audio thread every block and written by the
//! UI thread (directly, or through messages applied on the audio thread).
//! Every field is an independent atomic: loads use `Acquire`, stores use
//! `Release`. There is no cross-field transaction; render decisions only
//! need each field to be fresh on its own.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::types::{SampleCount, DEFAULT_SAMPLE_RATE};

/// Tempo accepted by [`Transport::set_bpm`] must lie strictly inside this range
pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 999.0;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransportState {
    #[default]
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl TransportState {
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Playing,
            2 => Self::Paused,
            _ => Self::Stopped,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
        }
    }
}

/// Atomic transport state machine
///
/// Stopped ⇄ Playing ⇄ Paused. `stop()` is the only way back to Stopped and
/// also rewinds to sample 0.
#[derive(Debug)]
pub struct Transport {
    state: AtomicU8,
    position: AtomicI64,
    /// f64 stored as bits
    bpm: AtomicU64,
    /// f64 stored as bits
    sample_rate: AtomicU64,
    time_sig_numerator: AtomicU32,
    time_sig_denominator: AtomicU32,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(TransportState::Stopped as u8),
            position: AtomicI64::new(0),
            bpm: AtomicU64::new(120.0_f64.to_bits()),
            sample_rate: AtomicU64::new(DEFAULT_SAMPLE_RATE.to_bits()),
            time_sig_numerator: AtomicU32::new(4),
            time_sig_denominator: AtomicU32::new(4),
        }
    }

    // ─────────────────────────────────────────────────────────────────
    // State machine
    // ─────────────────────────────────────────────────────────────────

    pub fn play(&self) {
        self.state.store(TransportState::Playing as u8, Ordering::Release);
    }

    /// Pause keeps the position. Only a playing transport can pause.
    pub fn pause(&self) {
        let _ = self.state.compare_exchange(
            TransportState::Playing as u8,
            TransportState::Paused as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn stop(&self) {
        self.state.store(TransportState::Stopped as u8, Ordering::Release);
        self.position.store(0, Ordering::Release);
    }

    #[inline]
    pub fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state() == TransportState::Playing
    }

    // ─────────────────────────────────────────────────────────────────
    // Position
    // ─────────────────────────────────────────────────────────────────

    #[inline]
    pub fn position_in_samples(&self) -> SampleCount {
        self.position.load(Ordering::Acquire)
    }

    pub fn set_position_in_samples(&self, position: SampleCount) {
        self.position.store(position, Ordering::Release);
    }

    /// Move the playhead forward by one rendered block.
    ///
    /// Audio thread only, once per callback after the block was rendered.
    /// Does nothing unless the transport is playing.
    #[inline]
    pub fn advance(&self, num_samples: usize) {
        if self.is_playing() {
            self.position
                .fetch_add(num_samples as SampleCount, Ordering::AcqRel);
        }
    }

    pub fn position_in_seconds(&self) -> f64 {
        let sample_rate = self.sample_rate();
        if sample_rate <= 0.0 {
            return 0.0;
        }
        self.position_in_samples() as f64 / sample_rate
    }

    pub fn position_in_beats(&self) -> f64 {
        self.samples_to_beats(self.position_in_samples())
    }

    // ─────────────────────────────────────────────────────────────────
    // Tempo, rate and meter
    // ─────────────────────────────────────────────────────────────────

    #[inline]
    pub fn bpm(&self) -> f64 {
        f64::from_bits(self.bpm.load(Ordering::Acquire))
    }

    /// Set the tempo. Values outside `(20, 999)` are ignored.
    pub fn set_bpm(&self, bpm: f64) {
        if bpm > MIN_BPM && bpm < MAX_BPM {
            self.bpm.store(bpm.to_bits(), Ordering::Release);
        } else {
            log::debug!("Transport: ignoring out-of-range bpm {}", bpm);
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate.load(Ordering::Acquire))
    }

    pub fn set_sample_rate(&self, sample_rate: f64) {
        self.sample_rate.store(sample_rate.to_bits(), Ordering::Release);
    }

    pub fn time_signature(&self) -> (u32, u32) {
        (
            self.time_sig_numerator.load(Ordering::Acquire),
            self.time_sig_denominator.load(Ordering::Acquire),
        )
    }

    pub fn set_time_signature(&self, numerator: u32, denominator: u32) {
        self.time_sig_numerator.store(numerator, Ordering::Release);
        self.time_sig_denominator.store(denominator, Ordering::Release);
    }

    /// Samples to beats at the current tempo; 0 when tempo or rate is not positive
    pub fn samples_to_beats(&self, samples: SampleCount) -> f64 {
        let bpm = self.bpm();
        let sample_rate = self.sample_rate();
        if bpm <= 0.0 || sample_rate <= 0.0 {
            return 0.0;
        }
        samples as f64 / sample_rate * bpm / 60.0
    }

    /// Beats to samples at the current tempo; 0 when tempo or rate is not positive
    pub fn beats_to_samples(&self, beats: f64) -> SampleCount {
        let bpm = self.bpm();
        let sample_rate = self.sample_rate();
        if bpm <= 0.0 || sample_rate <= 0.0 {
            return 0;
        }
        (beats * 60.0 / bpm * sample_rate) as SampleCount
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let transport = Transport::new();
        assert_eq!(transport.state(), TransportState::Stopped);
        assert_eq!(transport.position_in_samples(), 0);
        assert_eq!(transport.bpm(), 120.0);
        assert_eq!(transport.time_signature(), (4, 4));
    }

    #[test]
    fn test_advance_only_while_playing() {
        let transport = Transport::new();
        transport.advance(512);
        assert_eq!(transport.position_in_samples(), 0);

        transport.play();
        let mut expected = 0;
        for n in [512, 256, 1, 1024] {
            let before = transport.position_in_samples();
            transport.advance(n);
            expected += n as SampleCount;
            assert!(transport.position_in_samples() >= before);
            assert_eq!(transport.position_in_samples(), expected);
        }

        transport.pause();
        transport.advance(4096);
        assert_eq!(transport.position_in_samples(), expected);
    }

    #[test]
    fn test_stop_rewinds_pause_keeps_position() {
        let transport = Transport::new();
        transport.play();
        transport.advance(1000);
        transport.pause();
        assert_eq!(transport.state(), TransportState::Paused);
        assert_eq!(transport.position_in_samples(), 1000);

        transport.play();
        assert_eq!(transport.state(), TransportState::Playing);
        transport.stop();
        assert_eq!(transport.state(), TransportState::Stopped);
        assert_eq!(transport.position_in_samples(), 0);
    }

    #[test]
    fn test_pause_from_stopped_is_ignored() {
        let transport = Transport::new();
        transport.pause();
        assert_eq!(transport.state(), TransportState::Stopped);
    }

    #[test]
    fn test_bpm_rejection() {
        let transport = Transport::new();
        for bad in [20.0, 0.0, -5.0, 999.0, 1500.0, f64::NAN] {
            transport.set_bpm(bad);
            assert_eq!(transport.bpm(), 120.0, "bpm {} should be rejected", bad);
        }
        transport.set_bpm(20.5);
        assert_eq!(transport.bpm(), 20.5);
        transport.set_bpm(998.0);
        assert_eq!(transport.bpm(), 998.0);
    }

    #[test]
    fn test_half_beat_after_22050_samples() {
        let transport = Transport::new();
        transport.set_bpm(120.0);
        transport.set_sample_rate(44100.0);
        transport.play();
        transport.advance(22050);
        assert!((transport.position_in_beats() - 0.5).abs() < 1e-12);
        assert!((transport.position_in_seconds() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_conversions_guard_zero_rate() {
        let transport = Transport::new();
        transport.set_sample_rate(0.0);
        assert_eq!(transport.samples_to_beats(44100), 0.0);
        assert_eq!(transport.beats_to_samples(4.0), 0);

        transport.set_sample_rate(48000.0);
        assert_eq!(transport.beats_to_samples(2.0), 48000);
        assert!((transport.samples_to_beats(48000) - 2.0).abs() < 1e-12);
    }
}
