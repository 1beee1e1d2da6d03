//! Immutable decoded audio shared by clips
//!
//! An asset is decoded once on the UI thread and never modified afterwards.
//! It always travels as `Shared<AudioAsset>` so the last reference can be
//! released on the audio thread without freeing memory there.

use std::path::{Path, PathBuf};

use basedrop::Shared;
use thiserror::Error;

use crate::engine::gc_handle;
use crate::types::{Sample, SampleCount};

/// Errors while loading an audio asset
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to read audio file {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Unsupported sample format in {path:?}: {bits}-bit {format}")]
    UnsupportedFormat {
        path: PathBuf,
        bits: u16,
        format: &'static str,
    },

    #[error("Audio file {0:?} contains no samples")]
    Empty(PathBuf),
}

pub type AssetResult<T> = Result<T, AssetError>;

/// Decoded PCM, one `Vec` per channel
#[derive(Debug)]
pub struct AudioAsset {
    pub path: PathBuf,
    pub name: String,
    channels: Vec<Vec<Sample>>,
    length: SampleCount,
    sample_rate: f64,
}

impl AudioAsset {
    /// Build from already-decoded channels (channel 0 defines the length)
    pub fn from_channels(name: impl Into<String>, channels: Vec<Vec<Sample>>, sample_rate: f64) -> Self {
        let length = channels.first().map_or(0, |c| c.len()) as SampleCount;
        let name = name.into();
        Self {
            path: PathBuf::from(&name),
            name,
            channels,
            length,
            sample_rate,
        }
    }

    /// Decode a WAV file (8/16/24/32-bit integer or 32-bit float)
    pub fn from_wav(path: &Path) -> AssetResult<Self> {
        let decode_err = |source| AssetError::Decode {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = hound::WavReader::open(path).map_err(decode_err)?;
        let spec = reader.spec();
        let channel_count = spec.channels.max(1) as usize;
        let frames = reader.duration() as usize;

        let mut channels = vec![Vec::with_capacity(frames); channel_count];

        match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, 32) => {
                for (i, sample) in reader.samples::<f32>().enumerate() {
                    channels[i % channel_count].push(sample.map_err(decode_err)?);
                }
            }
            (hound::SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
                let scale = 1.0 / (1u64 << (bits - 1)) as f32;
                for (i, sample) in reader.samples::<i32>().enumerate() {
                    channels[i % channel_count].push(sample.map_err(decode_err)? as f32 * scale);
                }
            }
            (format, bits) => {
                return Err(AssetError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    bits,
                    format: match format {
                        hound::SampleFormat::Float => "float",
                        hound::SampleFormat::Int => "int",
                    },
                })
            }
        }

        let length = channels[0].len() as SampleCount;
        if length == 0 {
            return Err(AssetError::Empty(path.to_path_buf()));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        log::info!(
            "Loaded audio asset {} ({} ch, {} samples @ {}Hz)",
            name,
            channel_count,
            length,
            spec.sample_rate
        );

        Ok(Self {
            path: path.to_path_buf(),
            name,
            channels,
            length,
            sample_rate: spec.sample_rate as f64,
        })
    }

    /// Wrap in a `Shared` tied to the audio GC
    pub fn into_shared(self) -> Shared<AudioAsset> {
        Shared::new(&gc_handle(), self)
    }

    #[inline]
    pub fn length(&self) -> SampleCount {
        self.length
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0 || self.channels.is_empty()
    }

    /// Left/right frame at `index`; mono assets feed both sides.
    ///
    /// Caller guarantees `0 <= index < length`.
    #[inline]
    pub fn frame(&self, index: usize) -> (Sample, Sample) {
        let left = self.channels[0][index];
        let right = match self.channels.get(1) {
            Some(channel) => channel[index],
            None => left,
        };
        (left, right)
    }

    pub fn channel(&self, channel: usize) -> Option<&[Sample]> {
        self.channels.get(channel).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, channels: u16, frames: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in frames {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_from_wav_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 2, &[16384, -16384, 0, 8192]);

        let asset = AudioAsset::from_wav(&path).unwrap();
        assert_eq!(asset.num_channels(), 2);
        assert_eq!(asset.length(), 2);
        assert_eq!(asset.sample_rate(), 44100.0);
        assert_eq!(asset.name, "stereo.wav");
        assert_eq!(asset.frame(0), (0.5, -0.5));
        assert_eq!(asset.frame(1), (0.0, 0.25));
    }

    #[test]
    fn test_mono_feeds_both_sides() {
        let asset = AudioAsset::from_channels("mono", vec![vec![0.25, 0.5]], 48000.0);
        assert_eq!(asset.frame(1), (0.5, 0.5));
        assert_eq!(asset.length(), 2);
    }

    #[test]
    fn test_empty_wav_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_wav(&path, 1, &[]);
        assert!(matches!(AudioAsset::from_wav(&path), Err(AssetError::Empty(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = AudioAsset::from_wav(Path::new("/nonexistent/file.wav"));
        assert!(matches!(result, Err(AssetError::Decode { .. })));
    }
}
