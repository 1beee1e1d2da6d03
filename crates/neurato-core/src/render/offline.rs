//! Offline bounce to WAV
//!
//! Renders a session faster than realtime through the same
//! [`SessionRenderer`](super::SessionRenderer) the live engine uses, with
//! its own publisher/renderer pair and a manually advanced position. Blocking;
//! run it on a worker thread when a UI is involved.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use hound::{SampleFormat, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::renderer::session_renderer;
use crate::model::Session;
use crate::plugin::PluginManager;
use crate::types::{SampleCount, StereoBuffer, MAX_BLOCK_SIZE};

/// Progress is reported every this many blocks
const PROGRESS_INTERVAL_BLOCKS: u64 = 32;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Nothing to render (start {start}, end {end})")]
    NothingToRender { start: SampleCount, end: SampleCount },
    #[error("Unsupported bit depth {0} (use 16, 24 or 32)")]
    UnsupportedBitDepth(u16),
    #[error("WAV write failed: {0}")]
    Write(#[from] hound::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Render cancelled")]
    Cancelled,
}

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BounceSettings {
    pub sample_rate: u32,
    /// 16 or 24 (integer PCM) or 32 (float)
    pub bits_per_sample: u16,
    pub block_size: usize,
    pub start_sample: SampleCount,
    /// 0 = session content end plus `tail_seconds`
    pub end_sample: SampleCount,
    pub tail_seconds: f64,
}

impl Default for BounceSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            bits_per_sample: 24,
            block_size: 512,
            start_sample: 0,
            end_sample: 0,
            tail_seconds: 1.0,
        }
    }
}

impl BounceSettings {
    /// Resolve the `[start, end)` range to render for `session`
    pub fn range(&self, session: &Session) -> (SampleCount, SampleCount) {
        let end = if self.end_sample > 0 {
            self.end_sample
        } else {
            let tail = (self.tail_seconds.max(0.0) * self.sample_rate as f64) as SampleCount;
            session.content_end() + tail
        };
        (self.start_sample.max(0), end)
    }

    fn wav_spec(&self) -> RenderResult<WavSpec> {
        let sample_format = match self.bits_per_sample {
            16 | 24 => SampleFormat::Int,
            32 => SampleFormat::Float,
            other => return Err(RenderError::UnsupportedBitDepth(other)),
        };
        Ok(WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BounceProgress {
    /// 0.0 to 1.0
    pub fraction: f64,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BounceSummary {
    pub path: PathBuf,
    pub frames: u64,
    pub peak: f32,
    pub seconds: f64,
}

/// Render `session` to a stereo WAV at `path`
///
/// Plugins are used as loaded in `plugins`; they are not re-prepared for the
/// bounce sample rate. Setting `cancel` stops the render between blocks.
/// On cancellation or any write error the partial file is removed.
pub fn render_offline(
    session: &Session,
    plugins: &PluginManager,
    path: impl AsRef<Path>,
    settings: &BounceSettings,
    mut progress: Option<&mut dyn FnMut(BounceProgress)>,
    cancel: Option<&AtomicBool>,
) -> RenderResult<BounceSummary> {
    let path = path.as_ref();
    let (start, end) = settings.range(session);
    if start >= end {
        return Err(RenderError::NothingToRender { start, end });
    }
    let spec = settings.wav_spec()?;
    let block_size = settings.block_size.clamp(1, MAX_BLOCK_SIZE);

    log::info!(
        "Bouncing {} samples ({}..{}) to {} at {}Hz/{}bit",
        end - start,
        start,
        end,
        path.display(),
        settings.sample_rate,
        settings.bits_per_sample
    );
    let started = Instant::now();

    let (mut publisher, mut renderer) = session_renderer(settings.sample_rate as f64);
    publisher.publish(session, plugins);

    let partial = PartialFile::new(path);
    let mut writer = WavWriter::create(path, spec)?;
    let mut buffer = StereoBuffer::with_capacity(block_size);
    let total = (end - start) as f64;
    let mut position = start;
    let mut blocks = 0u64;
    let mut peak = 0.0f32;

    while position < end {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            log::info!("Bounce cancelled at sample {}", position);
            return Err(RenderError::Cancelled);
        }

        let frames = ((end - position) as usize).min(block_size);
        buffer.set_len_from_capacity(frames);
        buffer.fill_silence();
        renderer.process(&mut buffer, position);

        peak = peak.max(buffer.peak());
        write_block(&mut writer, &buffer, settings.bits_per_sample)?;

        position += frames as SampleCount;
        blocks += 1;
        if blocks % PROGRESS_INTERVAL_BLOCKS == 0 {
            if let Some(report) = progress.as_deref_mut() {
                report(BounceProgress {
                    fraction: (position - start) as f64 / total,
                    complete: false,
                });
            }
        }
    }

    writer.finalize()?;
    partial.keep();
    if let Some(report) = progress.as_deref_mut() {
        report(BounceProgress {
            fraction: 1.0,
            complete: true,
        });
    }

    let summary = BounceSummary {
        path: path.to_path_buf(),
        frames: (end - start) as u64,
        peak,
        seconds: started.elapsed().as_secs_f64(),
    };
    log::info!(
        "Bounced {} frames in {:.2}s (peak {:.3})",
        summary.frames,
        summary.seconds,
        summary.peak
    );
    Ok(summary)
}

/// Removes an unfinished output file when dropped, unless kept
///
/// Declare it before the writer so the writer drops (closing the file) first.
struct PartialFile<'a> {
    path: &'a Path,
    keep: bool,
}

impl<'a> PartialFile<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, keep: false }
    }

    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match fs::remove_file(self.path) {
            Ok(()) => log::debug!("Removed partial bounce {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove partial bounce {}: {}", self.path.display(), e),
        }
    }
}

fn write_block<W: std::io::Write + std::io::Seek>(
    writer: &mut WavWriter<W>,
    buffer: &StereoBuffer,
    bits: u16,
) -> RenderResult<()> {
    match bits {
        16 => {
            for &sample in buffer.as_interleaved() {
                writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
            }
        }
        24 => {
            const MAX_24: f32 = 8_388_607.0;
            for &sample in buffer.as_interleaved() {
                writer.write_sample((sample.clamp(-1.0, 1.0) * MAX_24) as i32)?;
            }
        }
        _ => {
            for &sample in buffer.as_interleaved() {
                writer.write_sample(sample)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AudioAsset, Clip, TrackKind};

    fn session_with_clip(len: usize, value: f32) -> Session {
        let mut session = Session::new();
        let index = session.add_track("A", TrackKind::Audio);
        let asset = AudioAsset::from_channels("a", vec![vec![value; len]], 44100.0).into_shared();
        session.add_clip_to_track(index, Clip::from_asset(asset, 0));
        session
    }

    #[test]
    fn test_auto_range_adds_tail() {
        let session = session_with_clip(1000, 0.5);
        let settings = BounceSettings::default();
        assert_eq!(settings.range(&session), (0, 1000 + 44100));

        let fixed = BounceSettings {
            end_sample: 500,
            ..BounceSettings::default()
        };
        assert_eq!(fixed.range(&session), (0, 500));
    }

    #[test]
    fn test_nothing_to_render() {
        let dir = tempfile::tempdir().unwrap();
        let settings = BounceSettings {
            tail_seconds: 0.0,
            ..BounceSettings::default()
        };
        let result = render_offline(
            &Session::new(),
            &PluginManager::new(),
            dir.path().join("out.wav"),
            &settings,
            None,
            None,
        );
        assert!(matches!(result, Err(RenderError::NothingToRender { .. })));
    }

    #[test]
    fn test_bounce_writes_float_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let session = session_with_clip(2000, 0.5);
        let settings = BounceSettings {
            bits_per_sample: 32,
            block_size: 300,
            tail_seconds: 0.0,
            ..BounceSettings::default()
        };

        let mut reports = Vec::new();
        let mut on_progress = |p: BounceProgress| reports.push(p);
        let summary = render_offline(
            &session,
            &PluginManager::new(),
            &path,
            &settings,
            Some(&mut on_progress as &mut dyn FnMut(BounceProgress)),
            None,
        )
        .unwrap();

        assert_eq!(summary.frames, 2000);
        assert!(reports.last().is_some_and(|p| p.complete && p.fraction == 1.0));

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 4000);
        // Mono clip at centre pan: 0.5 * cos(pi/4)
        let expected = 0.5 * std::f32::consts::FRAC_1_SQRT_2;
        assert!(samples.iter().all(|s| (s - expected).abs() < 1e-5));
    }

    #[test]
    fn test_bounce_24_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out24.wav");
        let session = session_with_clip(1000, 0.25);
        let settings = BounceSettings {
            tail_seconds: 0.5,
            ..BounceSettings::default()
        };

        render_offline(&session, &PluginManager::new(), &path, &settings, None, None).unwrap();
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 24);
        assert_eq!(reader.duration(), 1000 + 22050);
    }

    #[test]
    fn test_cancel_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cancelled.wav");
        let cancel = AtomicBool::new(true);
        let result = render_offline(
            &session_with_clip(1000, 0.5),
            &PluginManager::new(),
            &path,
            &BounceSettings::default(),
            None,
            Some(&cancel),
        );
        assert!(matches!(result, Err(RenderError::Cancelled)));
        assert!(!path.exists());
    }

    #[test]
    fn test_cancel_mid_render_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cancelled.wav");
        let cancel = AtomicBool::new(false);
        let settings = BounceSettings {
            block_size: 64,
            tail_seconds: 0.0,
            ..BounceSettings::default()
        };

        let mut reports = 0;
        let mut on_progress = |_: BounceProgress| {
            reports += 1;
            cancel.store(true, Ordering::Relaxed);
        };
        let result = render_offline(
            &session_with_clip(44100, 0.5),
            &PluginManager::new(),
            &path,
            &settings,
            Some(&mut on_progress as &mut dyn FnMut(BounceProgress)),
            Some(&cancel),
        );
        assert!(matches!(result, Err(RenderError::Cancelled)));
        assert_eq!(reports, 1);
        assert!(!path.exists());
    }

    #[test]
    fn test_unfinished_file_removed_on_error_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.wav");
        fs::write(&path, b"RIFF").unwrap();
        drop(PartialFile::new(&path));
        assert!(!path.exists());

        fs::write(&path, b"RIFF").unwrap();
        PartialFile::new(&path).keep();
        assert!(path.exists());
    }

    #[test]
    fn test_unsupported_bit_depth() {
        let settings = BounceSettings {
            bits_per_sample: 8,
            ..BounceSettings::default()
        };
        assert!(matches!(settings.wav_spec(), Err(RenderError::UnsupportedBitDepth(8))));
    }
}
