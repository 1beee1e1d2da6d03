//! The real-time engine: device callback owner
//!
//! [`create_engine`] splits the engine into two halves:
//!
//! ```text
//! ┌──────────────────┐   UiToAudioMessage    ┌─────────────────────┐
//! │   EngineHandle   │──────(SPSC)──────────►│     AudioEngine     │
//! │    (UI thread)   │◄─────(SPSC)───────────│   (audio callback)  │
//! │                  │   AudioToUiMessage    │                     │
//! │  SessionPublisher│───snapshot cell──────►│  SessionRenderer    │
//! │  ExternalIoMgr   │───live MIDI queue────►│  MidiCollector      │
//! └──────────────────┘                       └─────────────────────┘
//!            └──────────── Arc<Transport> (atomics) ──────┘
//! ```
//!
//! Per callback the engine applies pending UI messages, zeroes the output,
//! renders at the pre-advance position (session renderer, or the legacy
//! single track until a session is published), adds the metronome, advances
//! the transport and every few callbacks reports playhead and peak levels.

use std::mem;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::legacy_track::AudioTrack;
use super::message::{AudioToUiMessage, UiToAudioMessage};
use super::metronome::Metronome;
use super::queue::{message_channel, MessageReceiver, MessageSender};
use super::transport::{Transport, TransportState};
use crate::config::EngineConfig;
use crate::io::{external_io, ExternalIoManager, MidiCollector};
use crate::midi::MidiBuffer;
use crate::model::{AssetResult, Session};
use crate::plugin::PluginManager;
use crate::render::{session_renderer, SessionPublisher, SessionRenderer};
use crate::types::{SampleCount, StereoBuffer, MAX_BLOCK_SIZE};

/// Create the UI and audio halves of an engine running at `sample_rate`
pub fn create_engine(config: &EngineConfig, sample_rate: f64) -> (EngineHandle, AudioEngine) {
    let capacity = config.effective_queue_capacity();
    let (command_tx, command_rx) = message_channel(capacity);
    let (telemetry_tx, telemetry_rx) = message_channel(capacity);

    let transport = Arc::new(Transport::new());
    transport.set_sample_rate(sample_rate);

    let (publisher, renderer) = session_renderer(sample_rate);
    let (io_manager, midi_collector) = external_io();
    let legacy_track = Arc::new(AudioTrack::new());
    let session_published = Arc::new(AtomicBool::new(false));

    let mut plugins = PluginManager::new();
    plugins.prepare_all(sample_rate, MAX_BLOCK_SIZE);

    let metronome = Metronome::new();
    metronome.set_enabled(config.metronome.enabled);
    metronome.set_gain(config.metronome.gain);

    log::info!(
        "Engine created at {}Hz (queues {}, telemetry every {} callbacks)",
        sample_rate,
        capacity,
        config.effective_telemetry_interval()
    );

    let handle = EngineHandle {
        commands: command_tx,
        telemetry: telemetry_rx,
        transport: Arc::clone(&transport),
        publisher,
        plugins,
        external_io: io_manager,
        legacy_track: Arc::clone(&legacy_track),
        session_published: Arc::clone(&session_published),
    };

    let mut engine = AudioEngine {
        commands: command_rx,
        telemetry: telemetry_tx,
        transport,
        metronome,
        renderer,
        midi_collector,
        legacy_track,
        session_published,
        external_midi: MidiBuffer::new(),
        chunk_output: StereoBuffer::with_capacity(MAX_BLOCK_SIZE),
        chunk_input: StereoBuffer::with_capacity(MAX_BLOCK_SIZE),
        telemetry_interval: config.effective_telemetry_interval(),
        callbacks_since_telemetry: 0,
        block_size: MAX_BLOCK_SIZE,
    };
    engine.about_to_start(sample_rate, MAX_BLOCK_SIZE);

    (handle, engine)
}

/// UI-thread side of the engine
pub struct EngineHandle {
    commands: MessageSender<UiToAudioMessage>,
    telemetry: MessageReceiver<AudioToUiMessage>,
    transport: Arc<Transport>,
    publisher: SessionPublisher,
    plugins: PluginManager,
    external_io: ExternalIoManager,
    legacy_track: Arc<AudioTrack>,
    session_published: Arc<AtomicBool>,
}

impl EngineHandle {
    /// Queue a message. Returns `false` if the queue is full (message lost).
    pub fn send(&mut self, message: UiToAudioMessage) -> bool {
        let queued = self.commands.try_push(message);
        if !queued {
            log::warn!("UI->audio queue full, dropped {:?}", message);
        }
        queued
    }

    pub fn send_play(&mut self) -> bool {
        self.send(UiToAudioMessage::Play)
    }

    pub fn send_pause(&mut self) -> bool {
        self.send(UiToAudioMessage::Pause)
    }

    pub fn send_stop(&mut self) -> bool {
        self.send(UiToAudioMessage::Stop)
    }

    /// Pause when playing, otherwise play
    pub fn send_toggle_play_stop(&mut self) -> bool {
        if self.transport.is_playing() {
            self.send_pause()
        } else {
            self.send_play()
        }
    }

    pub fn send_set_bpm(&mut self, bpm: f64) -> bool {
        self.send(UiToAudioMessage::SetBpm(bpm))
    }

    pub fn send_seek(&mut self, position: SampleCount) -> bool {
        self.send(UiToAudioMessage::Seek(position))
    }

    pub fn send_set_metronome_enabled(&mut self, enabled: bool) -> bool {
        self.send(UiToAudioMessage::SetMetronomeEnabled(enabled))
    }

    pub fn send_set_metronome_gain(&mut self, gain: f32) -> bool {
        self.send(UiToAudioMessage::SetMetronomeGain(gain))
    }

    pub fn send_set_track_gain(&mut self, gain: f32) -> bool {
        self.send(UiToAudioMessage::SetTrackGain(gain))
    }

    pub fn send_set_track_mute(&mut self, muted: bool) -> bool {
        self.send(UiToAudioMessage::SetTrackMute(muted))
    }

    pub fn poll_audio_message(&mut self) -> Option<AudioToUiMessage> {
        self.telemetry.try_pop()
    }

    /// Hand every pending audio message to `f`; returns how many there were
    pub fn drain_audio_messages(&mut self, mut f: impl FnMut(AudioToUiMessage)) -> usize {
        let mut count = 0;
        while let Some(message) = self.telemetry.try_pop() {
            f(message);
            count += 1;
        }
        count
    }

    /// Snapshot `session` for the audio thread and switch it from the legacy
    /// track to session rendering. Returns the snapshot generation.
    pub fn publish_session(&mut self, session: &Session) -> u64 {
        let generation = self.publisher.publish(session, &self.plugins);
        self.session_published.store(true, Ordering::Release);
        generation
    }

    pub fn plugin_manager(&self) -> &PluginManager {
        &self.plugins
    }

    /// Loaded plugins take effect in the audio thread with the next publish
    pub fn plugin_manager_mut(&mut self) -> &mut PluginManager {
        &mut self.plugins
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn external_io(&self) -> &ExternalIoManager {
        &self.external_io
    }

    pub fn external_io_mut(&mut self) -> &mut ExternalIoManager {
        &mut self.external_io
    }

    /// Load a WAV file into the legacy single track
    pub fn load_track_audio(&self, path: &Path) -> AssetResult<()> {
        self.legacy_track.load_file(path)
    }

    pub fn legacy_track(&self) -> &AudioTrack {
        &self.legacy_track
    }
}

/// Audio-thread side of the engine; owned by the device callback
pub struct AudioEngine {
    commands: MessageReceiver<UiToAudioMessage>,
    telemetry: MessageSender<AudioToUiMessage>,
    transport: Arc<Transport>,
    metronome: Metronome,
    renderer: SessionRenderer,
    midi_collector: MidiCollector,
    legacy_track: Arc<AudioTrack>,
    session_published: Arc<AtomicBool>,

    external_midi: MidiBuffer,
    /// Scratch for callbacks longer than `MAX_BLOCK_SIZE`
    chunk_output: StereoBuffer,
    chunk_input: StereoBuffer,

    telemetry_interval: u32,
    callbacks_since_telemetry: u32,
    block_size: usize,
}

impl AudioEngine {
    /// Propagate the negotiated device configuration (call before the
    /// stream starts)
    pub fn about_to_start(&mut self, sample_rate: f64, block_size: usize) {
        self.transport.set_sample_rate(sample_rate);
        self.metronome.prepare(sample_rate);
        self.renderer.prepare(sample_rate, block_size);
        self.midi_collector.set_sample_rate(sample_rate);
        self.block_size = block_size;
        log::info!("Audio engine starting at {}Hz, block size {}", sample_rate, block_size);
    }

    /// The device stopped; click state is dropped, everything else is atomics
    pub fn stopped(&mut self) {
        self.metronome.reset();
        self.callbacks_since_telemetry = 0;
        log::info!("Audio engine stopped");
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Render one device callback into `output` (its contents are replaced)
    pub fn process(&mut self, output: &mut StereoBuffer, audio_in: Option<&StereoBuffer>) {
        self.apply_ui_messages();
        output.fill_silence();

        let len = output.len();
        self.midi_collector.midi_messages_for_block(&mut self.external_midi, len);

        if len <= MAX_BLOCK_SIZE {
            self.render_block(output, audio_in);
        } else {
            self.process_chunked(output, audio_in);
        }

        self.callbacks_since_telemetry += 1;
        if self.callbacks_since_telemetry >= self.telemetry_interval {
            self.callbacks_since_telemetry = 0;
            self.push_telemetry(output);
        }
    }

    /// Render a long callback through the scratch buffers, one chunk at a time
    fn process_chunked(&mut self, output: &mut StereoBuffer, audio_in: Option<&StereoBuffer>) {
        let mut chunk_output = mem::take(&mut self.chunk_output);
        let mut chunk_input = mem::take(&mut self.chunk_input);

        let len = output.len();
        let mut start = 0;
        while start < len {
            let end = (start + MAX_BLOCK_SIZE).min(len);
            chunk_output.set_len_from_capacity(end - start);
            chunk_output.fill_silence();

            let input = match audio_in {
                Some(input) => {
                    let frames = input.as_slice();
                    let slice = &frames[start.min(frames.len())..end.min(frames.len())];
                    chunk_input.set_len_from_capacity(slice.len());
                    chunk_input.as_mut_slice().copy_from_slice(slice);
                    Some(&chunk_input)
                }
                None => None,
            };

            self.render_block(&mut chunk_output, input);
            output.as_mut_slice()[start..end].copy_from_slice(chunk_output.as_slice());

            // Live MIDI lands in the first chunk only
            self.external_midi.clear();
            start = end;
        }

        self.chunk_output = chunk_output;
        self.chunk_input = chunk_input;
    }

    /// Steps 3-6 of a callback for a block of at most `MAX_BLOCK_SIZE`
    fn render_block(&mut self, output: &mut StereoBuffer, audio_in: Option<&StereoBuffer>) {
        let position = self.transport.position_in_samples();
        let playing = self.transport.is_playing();
        let live_midi = !self.external_midi.is_empty();
        let session = self.session_published.load(Ordering::Acquire);

        if session && playing {
            self.renderer
                .process_with_external_io(output, position, audio_in, &self.external_midi);
        } else if session && live_midi {
            self.renderer.process_live(output, audio_in, &self.external_midi);
        } else {
            // Keep the snapshot handoff moving while nothing renders
            self.renderer.update_snapshot();
            if !session && playing {
                self.legacy_track.process(output, position);
            }
        }

        self.metronome.process(output, &self.transport);
        self.transport.advance(output.len());
    }

    fn apply_ui_messages(&mut self) {
        let before = self.transport.state();

        while let Some(message) = self.commands.try_pop() {
            match message {
                UiToAudioMessage::Play => self.transport.play(),
                UiToAudioMessage::Pause => self.transport.pause(),
                UiToAudioMessage::Stop => {
                    self.transport.stop();
                    self.renderer.silence_instruments();
                }
                UiToAudioMessage::SetBpm(bpm) => self.transport.set_bpm(bpm),
                UiToAudioMessage::Seek(position) => {
                    self.transport.set_position_in_samples(position);
                    self.renderer.silence_instruments();
                }
                UiToAudioMessage::SetMetronomeEnabled(enabled) => self.metronome.set_enabled(enabled),
                UiToAudioMessage::SetMetronomeGain(gain) => self.metronome.set_gain(gain),
                UiToAudioMessage::SetTrackGain(gain) => self.legacy_track.set_gain(gain),
                UiToAudioMessage::SetTrackMute(muted) => self.legacy_track.set_mute(muted),
            }
        }

        let state = self.transport.state();
        if state != before {
            // Best effort, like all telemetry
            let _ = self.telemetry.try_push(AudioToUiMessage::TransportStateChanged { state });
        }
    }

    fn push_telemetry(&mut self, output: &StereoBuffer) {
        let _ = self.telemetry.try_push(AudioToUiMessage::PlayheadPosition {
            samples: self.transport.position_in_samples(),
            seconds: self.transport.position_in_seconds(),
        });
        let (left, right) = output.channel_peaks();
        let _ = self.telemetry.try_push(AudioToUiMessage::PeakLevel { left, right });
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiEvent;
    use crate::model::{AudioAsset, Clip, TrackKind};
    use std::f32::consts::FRAC_1_SQRT_2;

    fn engine_pair() -> (EngineHandle, AudioEngine) {
        create_engine(&EngineConfig::default(), 44100.0)
    }

    fn run(engine: &mut AudioEngine, len: usize) -> StereoBuffer {
        let mut out = StereoBuffer::silence(len);
        engine.process(&mut out, None);
        out
    }

    fn one_clip_session(len: usize) -> Session {
        let mut session = Session::new();
        let index = session.add_track("A", TrackKind::Audio);
        let asset = AudioAsset::from_channels("ones", vec![vec![1.0; len]], 44100.0).into_shared();
        session.add_clip_to_track(index, Clip::from_asset(asset, 0));
        session
    }

    fn drain(handle: &mut EngineHandle) -> Vec<AudioToUiMessage> {
        let mut messages = Vec::new();
        handle.drain_audio_messages(|m| messages.push(m));
        messages
    }

    #[test]
    fn test_messages_apply_before_render() {
        let (mut handle, mut engine) = engine_pair();
        handle.publish_session(&one_clip_session(44100));
        assert!(handle.send_play());

        let out = run(&mut engine, 256);
        assert!((out[0].left - FRAC_1_SQRT_2).abs() < 1e-6);
        assert_eq!(handle.transport().position_in_samples(), 256);
    }

    #[test]
    fn test_playing_callback_does_not_touch_the_heap() {
        let (mut handle, mut engine) = engine_pair();
        handle.publish_session(&one_clip_session(4 * 44100));
        handle.send_set_metronome_enabled(true);
        handle.send_play();

        let mut block = StereoBuffer::silence(512);
        let mut long_block = StereoBuffer::silence(MAX_BLOCK_SIZE * 2);
        for _ in 0..4 {
            engine.process(&mut block, None);
        }

        let ((), allocations) = crate::alloc_counter::count_allocations(|| {
            for _ in 0..64 {
                engine.process(&mut block, None);
            }
            engine.process(&mut long_block, None);
        });
        assert_eq!(allocations, 0);
        assert!(block.peak() > 0.0);
    }

    #[test]
    fn test_held_piano_note_does_not_survive_stop_and_republish() {
        use crate::model::{MidiClip, MidiNote};

        let (mut handle, mut engine) = engine_pair();
        let mut session = Session::new();
        let keys = session.add_midi_track("Keys");
        let mut clip = MidiClip::empty(0, 441_000, "Held");
        clip.add_note(MidiNote::new(60, 1.0, 0, 441_000));
        session.add_midi_clip_to_track(keys, clip);
        handle.publish_session(&session);

        handle.send_play();
        assert!(run(&mut engine, 512).peak() > 0.0);
        handle.send_stop();
        run(&mut engine, 512);

        let mut empty = Session::new();
        empty.add_midi_track("Keys");
        handle.publish_session(&empty);
        handle.send_play();

        let mut peak = 0.0f32;
        for _ in 0..(3 * 44100 / 512) {
            peak = peak.max(run(&mut engine, 512).peak());
        }
        assert_eq!(peak, 0.0);
    }

    #[test]
    fn test_stopped_transport_is_silent_and_still() {
        let (mut handle, mut engine) = engine_pair();
        handle.publish_session(&one_clip_session(44100));

        let out = run(&mut engine, 256);
        assert_eq!(out.peak(), 0.0);
        assert_eq!(handle.transport().position_in_samples(), 0);
        assert!(!drain(&mut handle)
            .iter()
            .any(|m| matches!(m, AudioToUiMessage::TransportStateChanged { .. })));
    }

    #[test]
    fn test_output_is_replaced_not_summed() {
        let (_handle, mut engine) = engine_pair();
        let mut out = StereoBuffer::silence(64);
        out.iter_mut().for_each(|s| s.left = 1.0);
        engine.process(&mut out, None);
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_transport_state_change_reported() {
        let (mut handle, mut engine) = engine_pair();
        handle.send_play();
        run(&mut engine, 64);
        handle.send_pause();
        handle.send_pause();
        run(&mut engine, 64);

        let states: Vec<TransportState> = drain(&mut handle)
            .into_iter()
            .filter_map(|m| match m {
                AudioToUiMessage::TransportStateChanged { state } => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(states, [TransportState::Playing, TransportState::Paused]);
    }

    #[test]
    fn test_telemetry_is_throttled() {
        let (mut handle, mut engine) = engine_pair();
        handle.send_play();
        drain(&mut handle);

        for _ in 0..7 {
            run(&mut engine, 128);
        }
        let messages = drain(&mut handle);
        assert!(!messages
            .iter()
            .any(|m| matches!(m, AudioToUiMessage::PlayheadPosition { .. })));

        run(&mut engine, 128);
        let messages = drain(&mut handle);
        assert!(messages.contains(&AudioToUiMessage::PlayheadPosition {
            samples: 1024,
            seconds: 1024.0 / 44100.0,
        }));
        assert!(messages
            .iter()
            .any(|m| matches!(m, AudioToUiMessage::PeakLevel { .. })));
    }

    #[test]
    fn test_legacy_track_until_session_published() {
        let (mut handle, mut engine) = engine_pair();
        handle
            .legacy_track()
            .set_audio(AudioAsset::from_channels("t", vec![vec![0.5; 1000]], 44100.0).into_shared());
        handle.send_play();
        handle.send_set_track_gain(2.0);

        let out = run(&mut engine, 64);
        assert!((out[0].left - 1.0).abs() < 1e-6);

        handle.send_set_track_mute(true);
        assert_eq!(run(&mut engine, 64).peak(), 0.0);

        handle.publish_session(&Session::new());
        handle.send_set_track_mute(false);
        assert_eq!(run(&mut engine, 64).peak(), 0.0);
    }

    #[test]
    fn test_seek_and_stop() {
        let (mut handle, mut engine) = engine_pair();
        handle.send_play();
        handle.send_seek(10_000);
        run(&mut engine, 100);
        assert_eq!(handle.transport().position_in_samples(), 10_100);

        handle.send_stop();
        run(&mut engine, 100);
        assert_eq!(handle.transport().position_in_samples(), 0);
    }

    #[test]
    fn test_metronome_clicks_on_top() {
        let (mut handle, mut engine) = engine_pair();
        handle.send_set_metronome_enabled(true);
        handle.send_play();
        assert!(run(&mut engine, 512).peak() > 0.0);
    }

    #[test]
    fn test_live_midi_plays_while_stopped() {
        let (mut handle, mut engine) = engine_pair();
        let mut session = Session::new();
        session.add_midi_track("Keys");
        handle.publish_session(&session);

        handle.external_io().add_midi_message(MidiEvent::note_on(0, 0, 60, 110));
        let out = run(&mut engine, 512);
        assert!(out.peak() > 0.0);
        assert_eq!(handle.transport().position_in_samples(), 0);
    }

    #[test]
    fn test_long_callback_is_chunked() {
        let (mut handle, mut engine) = engine_pair();
        handle.publish_session(&one_clip_session(MAX_BLOCK_SIZE * 3));
        handle.send_play();

        let len = MAX_BLOCK_SIZE * 2 + 100;
        let out = run(&mut engine, len);
        assert!(out.iter().all(|s| (s.left - FRAC_1_SQRT_2).abs() < 1e-6));
        assert_eq!(handle.transport().position_in_samples(), len as SampleCount);
    }

    #[test]
    fn test_full_queue_drops_messages() {
        let config = EngineConfig {
            queue_capacity: 4,
            ..EngineConfig::default()
        };
        let (mut handle, _engine) = create_engine(&config, 44100.0);
        for _ in 0..4 {
            assert!(handle.send_set_bpm(100.0));
        }
        assert!(!handle.send_set_bpm(100.0));
    }
}
