//! CPAL output (and optional input) streams driving the audio engine
//!
//! The output callback owns the [`AudioEngine`] through a mutex that only the
//! callback ever locks. Device input is captured on its own stream and handed
//! over frame by frame through an rtrb ring, so the two streams never block
//! each other.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};
use rtrb::{Consumer, Producer, RingBuffer};

use super::config::{AudioConfig, MAX_BUFFER_SIZE};
use super::device::{cpal_default_input, cpal_default_output, find_device_by_id};
use super::error::{AudioError, AudioResult};
use crate::config::EngineConfig;
use crate::engine::{create_engine, AudioEngine, EngineHandle};
use crate::types::{StereoBuffer, StereoSample};

/// Input frames buffered between the input and output callbacks
const INPUT_RING_FRAMES: usize = MAX_BUFFER_SIZE * 2;

/// Streams that must stay alive while audio runs; dropping stops them
pub struct CpalAudioHandle {
    _output: Stream,
    input: Option<Stream>,
    sample_rate: u32,
    buffer_size: u32,
}

impl CpalAudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    pub fn latency_ms(&self) -> f32 {
        self.buffer_size as f32 / self.sample_rate as f32 * 1000.0
    }

    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }
}

/// A running audio device plus the UI-side handle of its engine
pub struct AudioSystem {
    pub handle: CpalAudioHandle,
    pub engine: EngineHandle,
}

impl AudioSystem {
    pub fn sample_rate(&self) -> u32 {
        self.handle.sample_rate()
    }

    pub fn buffer_size(&self) -> u32 {
        self.handle.buffer_size()
    }

    pub fn latency_ms(&self) -> f32 {
        self.handle.latency_ms()
    }
}

struct AudioCallbackState {
    engine: AudioEngine,
    output: StereoBuffer,
    input: StereoBuffer,
    input_rx: Option<Consumer<StereoSample>>,
}

impl AudioCallbackState {
    /// Render `n_frames` (at most `MAX_BUFFER_SIZE`) into `output`
    fn process(&mut self, n_frames: usize) {
        self.output.set_len_from_capacity(n_frames);

        let audio_in = match self.input_rx.as_mut() {
            Some(rx) => {
                self.input.set_len_from_capacity(n_frames);
                for frame in self.input.iter_mut() {
                    *frame = rx.pop().unwrap_or_default();
                }
                Some(&self.input)
            }
            None => None,
        };

        self.engine.process(&mut self.output, audio_in);
    }
}

impl Drop for AudioCallbackState {
    fn drop(&mut self) {
        self.engine.stopped();
    }
}

/// Open the configured output device, start streaming and return the
/// engine handle for the UI thread
pub fn start_audio_system(config: &EngineConfig) -> AudioResult<AudioSystem> {
    let device = match &config.audio.device {
        Some(id) => find_device_by_id(id)?,
        None => cpal_default_output()?,
    };
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let (supported, buffer_size) = output_config(&device, &config.audio)?;
    let mut stream_config: StreamConfig = supported.config();
    stream_config.buffer_size = CpalBufferSize::Fixed(buffer_size);
    let sample_rate = stream_config.sample_rate.0;

    log::info!(
        "Opening '{}' at {}Hz, {} channels, {} frames",
        device_name,
        sample_rate,
        stream_config.channels,
        buffer_size
    );

    let (handle, mut engine) = create_engine(config, sample_rate as f64);
    engine.about_to_start(sample_rate as f64, buffer_size as usize);

    let (input_stream, input_rx) = if config.audio.input_enabled {
        match build_input_stream(sample_rate, buffer_size) {
            Ok((stream, rx)) => (Some(stream), Some(rx)),
            Err(e) => {
                log::warn!("Audio input unavailable, continuing without it: {}", e);
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let state = Arc::new(Mutex::new(AudioCallbackState {
        engine,
        output: StereoBuffer::with_capacity(MAX_BUFFER_SIZE),
        input: StereoBuffer::with_capacity(MAX_BUFFER_SIZE),
        input_rx,
    }));

    let output_stream = build_output_stream(&device, &stream_config, state)?;
    output_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
    if let Some(stream) = &input_stream {
        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
    }

    Ok(AudioSystem {
        handle: CpalAudioHandle {
            _output: output_stream,
            input: input_stream,
            sample_rate,
            buffer_size,
        },
        engine: handle,
    })
}

/// Pick an f32 stereo configuration at the requested rate, falling back to
/// whatever the device offers
fn output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    let target = config.target_sample_rate();
    let in_range = |c: &cpal::SupportedStreamConfigRange| {
        target >= c.min_sample_rate().0 && target <= c.max_sample_rate().0
    };

    let best = supported
        .iter()
        .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2 && in_range(*c))
        .or_else(|| {
            supported
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2)
        })
        .or_else(|| supported.iter().find(|c| c.sample_format() == SampleFormat::F32))
        .ok_or_else(|| AudioError::ConfigError("No f32 output configuration".to_string()))?;

    let sample_rate = if in_range(best) {
        cpal::SampleRate(target)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "Device does not support {}Hz, using {}Hz",
            target,
            fallback.0
        );
        fallback
    };

    Ok((best.clone().with_sample_rate(sample_rate), config.buffer_size.frames()))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    state: Arc<Mutex<AudioCallbackState>>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let Ok(mut state) = state.lock() else {
                    data.fill(0.0);
                    return;
                };

                // Devices may ask for more than the pre-allocated block
                for device_chunk in data.chunks_mut(MAX_BUFFER_SIZE * channels) {
                    let n_frames = device_chunk.len() / channels;
                    state.process(n_frames);

                    let samples = state.output.as_slice();
                    for (frame, sample) in device_chunk.chunks_mut(channels).zip(samples) {
                        frame[0] = sample.left;
                        if channels > 1 {
                            frame[1] = sample.right;
                        }
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("Output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

/// Open the default input at the output's rate, feeding a ring of frames
fn build_input_stream(
    sample_rate: u32,
    buffer_size: u32,
) -> AudioResult<(Stream, Consumer<StereoSample>)> {
    let device = cpal_default_input()
        .ok_or_else(|| AudioError::NoDefaultDevice("No default input device".to_string()))?;

    let supported = device
        .supported_input_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .find(|c| {
            c.sample_format() == SampleFormat::F32
                && sample_rate >= c.min_sample_rate().0
                && sample_rate <= c.max_sample_rate().0
        })
        .ok_or_else(|| {
            AudioError::ConfigError(format!("Input does not support f32 at {}Hz", sample_rate))
        })?;

    let mut config: StreamConfig = supported.with_sample_rate(cpal::SampleRate(sample_rate)).config();
    config.buffer_size = CpalBufferSize::Fixed(buffer_size);
    let channels = config.channels as usize;

    let (mut producer, consumer): (Producer<StereoSample>, _) = RingBuffer::new(INPUT_RING_FRAMES);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                for frame in data.chunks(channels) {
                    let left = frame[0];
                    let right = frame.get(1).copied().unwrap_or(left);
                    // Output side fell behind; drop the newest frames
                    if producer.push(StereoSample::new(left, right)).is_err() {
                        break;
                    }
                }
            },
            move |err| {
                log::error!("Input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    log::info!("Audio input open: {} channels at {}Hz", channels, sample_rate);
    Ok((stream, consumer))
}
