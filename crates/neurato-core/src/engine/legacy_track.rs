//! Single-track playback used before any session is published
//!
//! One audio buffer played from timeline position 0. The buffer is swapped
//! through a `SharedCell` so the UI can load a file while the audio thread
//! plays; gain and mute are atomics driven by `SetTrackGain`/`SetTrackMute`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use basedrop::{Shared, SharedCell};

use super::gc::gc_handle;
use crate::model::{AssetResult, AudioAsset};
use crate::types::{SampleCount, StereoBuffer, DEFAULT_SAMPLE_RATE};

pub struct AudioTrack {
    audio: SharedCell<AudioAsset>,
    /// Linear gain, f32 stored as bits
    gain: AtomicU32,
    muted: AtomicBool,
}

impl AudioTrack {
    pub fn new() -> Self {
        let empty = AudioAsset::from_channels("", Vec::new(), DEFAULT_SAMPLE_RATE);
        Self {
            audio: SharedCell::new(Shared::new(&gc_handle(), empty)),
            gain: AtomicU32::new(1.0f32.to_bits()),
            muted: AtomicBool::new(false),
        }
    }

    /// Decode a WAV file and make it the track's audio (UI thread)
    pub fn load_file(&self, path: &Path) -> AssetResult<()> {
        let asset = AudioAsset::from_wav(path)?;
        log::info!("Legacy track loaded {} ({} samples)", path.display(), asset.length());
        self.set_audio(asset.into_shared());
        Ok(())
    }

    pub fn set_audio(&self, asset: Shared<AudioAsset>) {
        self.audio.set(asset);
    }

    pub fn has_audio(&self) -> bool {
        !self.audio.get().is_empty()
    }

    pub fn length(&self) -> SampleCount {
        self.audio.get().length()
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.max(0.0).to_bits(), Ordering::Release);
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Acquire))
    }

    pub fn set_mute(&self, muted: bool) {
        self.muted.store(muted, Ordering::Release);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    /// Add the audio at `position` into `output` (audio thread)
    pub fn process(&self, output: &mut StereoBuffer, position: SampleCount) {
        if self.is_muted() {
            return;
        }
        let audio = self.audio.get();
        let length = audio.length();
        if position < 0 || position >= length {
            return;
        }

        let gain = self.gain();
        let available = (length - position) as usize;
        for (i, frame) in output.iter_mut().take(available).enumerate() {
            let (left, right) = audio.frame(position as usize + i);
            frame.left += left * gain;
            frame.right += right * gain;
        }
    }
}

impl Default for AudioTrack {
    fn default() -> Self {
        Self::new()
    }
}
