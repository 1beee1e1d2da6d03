//! Messages crossing the UI/audio boundary
//!
//! Both directions are closed, fixed-tag enums of plain values. They are
//! `Copy` and small so a queue slot stays within a cache line.

use super::transport::TransportState;
use crate::types::SampleCount;

/// Commands sent from the UI thread to the audio thread
///
/// Applied in FIFO order at the start of each callback, before that
/// callback renders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UiToAudioMessage {
    // ─── Transport ───────────────────────────────────────────────────
    Play,
    Pause,
    Stop,
    SetBpm(f64),
    Seek(SampleCount),

    // ─── Metronome ───────────────────────────────────────────────────
    SetMetronomeEnabled(bool),
    SetMetronomeGain(f32),

    // ─── Legacy single track ─────────────────────────────────────────
    SetTrackGain(f32),
    SetTrackMute(bool),
}

/// Telemetry sent from the audio thread to the UI thread
///
/// Best effort: dropped when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioToUiMessage {
    PlayheadPosition { samples: SampleCount, seconds: f64 },
    PeakLevel { left: f32, right: f32 },
    TransportStateChanged { state: TransportState },
}
