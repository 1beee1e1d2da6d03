//! Common audio types for Neurato
//!
//! Stereo sample/buffer handling shared by the renderer, plugins, the
//! metronome and the device backends, plus the gain and pan laws used by
//! every mixing stage.

use std::ops::{Index, IndexMut};

/// Audio sample type (32-bit float everywhere inside the engine)
pub type Sample = f32;

/// Timeline positions and lengths, in samples from project start
pub type SampleCount = i64;

/// Largest block the engine renders in one pass.
///
/// Every per-block scratch buffer is allocated with this capacity up front.
/// Device blocks longer than this are split into chunks by the engine.
pub const MAX_BLOCK_SIZE: usize = 8192;

/// Default project sample rate
pub const DEFAULT_SAMPLE_RATE: f64 = 44100.0;

/// Convert decibels to a linear gain factor
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Constant-power pan law
///
/// `pan` runs from -1.0 (hard left) to 1.0 (hard right). Returns
/// `(cos θ, sin θ)` with `θ = (pan + 1) / 2 · π/2`, so the centre yields
/// `cos(π/4)` on both sides.
#[inline]
pub fn constant_power_pan(pan: f32) -> (f32, f32) {
    let theta = (pan.clamp(-1.0, 1.0) + 1.0) * 0.5 * std::f32::consts::FRAC_PI_2;
    (theta.cos(), theta.sin())
}

/// Balance law for the master bus
///
/// Unity on both sides at the centre; moving towards one side fades the
/// opposite side with a quarter cosine.
#[inline]
pub fn balance_pan(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    let fade = (pan.abs() * std::f32::consts::FRAC_PI_2).cos();
    if pan > 0.0 {
        (fade, 1.0)
    } else if pan < 0.0 {
        (1.0, fade)
    } else {
        (1.0, 1.0)
    }
}

/// A single stereo frame
///
/// `#[repr(C)]` keeps the layout `[left, right]` so a `&[StereoSample]` can
/// be viewed as interleaved `&[f32]` through bytemuck without copying.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Same value on both sides
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Largest absolute value of either side
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self::new(self.left + other.left, self.right + other.right)
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self::new(self.left * factor, self.right * factor)
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

/// A block of stereo frames
///
/// Audio-thread buffers are created once with [`StereoBuffer::with_capacity`]
/// or [`StereoBuffer::silence`] and then resized per block with
/// [`StereoBuffer::set_len_from_capacity`], which never allocates.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Empty buffer with room for `capacity` frames
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Buffer of `len` silent frames
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Build from separate left and right channels
    pub fn from_channels(left: &[Sample], right: &[Sample]) -> Self {
        assert_eq!(left.len(), right.len(), "Channel lengths must match");
        Self {
            samples: left
                .iter()
                .zip(right)
                .map(|(&l, &r)| StereoSample::new(l, r))
                .collect(),
        }
    }

    /// Build from interleaved `[L, R, L, R, ...]` data
    pub fn from_interleaved(interleaved: &[Sample]) -> Self {
        assert!(interleaved.len() % 2 == 0, "Interleaved buffer must have even length");
        Self {
            samples: interleaved
                .chunks_exact(2)
                .map(|frame| StereoSample::new(frame[0], frame[1]))
                .collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Newly exposed frames are silent. Growing past the capacity is a bug in
    /// the caller and trips a debug assertion.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        debug_assert!(
            new_len <= self.samples.capacity(),
            "set_len_from_capacity: {} exceeds capacity {}",
            new_len,
            self.samples.capacity()
        );
        if new_len > self.samples.len() {
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    /// Zero every frame, keeping the length
    #[inline]
    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Zero-copy interleaved view `[L, R, L, R, ...]`
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Zero-copy mutable interleaved view
    #[inline]
    pub fn as_interleaved_mut(&mut self) -> &mut [Sample] {
        bytemuck::cast_slice_mut(&mut self.samples)
    }

    /// Sum another buffer of the same length into this one
    pub fn add_buffer(&mut self, other: &StereoBuffer) {
        debug_assert_eq!(self.len(), other.len(), "Buffer lengths must match");
        for (dst, src) in self.samples.iter_mut().zip(&other.samples) {
            *dst += *src;
        }
    }

    /// Scale both channels by `factor`
    pub fn scale(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    /// Apply a gain and separate left/right pan coefficients in place
    pub fn apply_gain_pan(&mut self, gain: Sample, pan_l: Sample, pan_r: Sample) {
        let left = gain * pan_l;
        let right = gain * pan_r;
        for sample in &mut self.samples {
            sample.left *= left;
            sample.right *= right;
        }
    }

    /// Copy `other` into this buffer without growing the allocation
    pub fn copy_from(&mut self, other: &StereoBuffer) {
        self.set_len_from_capacity(other.len());
        self.samples.copy_from_slice(&other.samples);
    }

    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }

    /// Peak across both channels
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(StereoSample::peak).fold(0.0, Sample::max)
    }

    /// Peak of each channel separately, `(left, right)`
    pub fn channel_peaks(&self) -> (Sample, Sample) {
        self.samples.iter().fold((0.0, 0.0), |(l, r), s| {
            (l.max(s.left.abs()), r.max(s.right.abs()))
        })
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}
