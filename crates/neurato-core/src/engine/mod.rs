//! Real-time engine - transport, metronome, queues and the device callback
//!
//! - [`Transport`]: atomic play state, position and tempo
//! - [`message_channel`]: SPSC queues for [`UiToAudioMessage`] and
//!   [`AudioToUiMessage`]
//! - [`AudioEngine`]/[`EngineHandle`]: the callback owner and its UI side
//! - [`gc_handle`]: deferred deallocation for data the audio thread releases

mod audio_engine;
mod gc;
mod legacy_track;
mod message;
mod metronome;
mod queue;
mod transport;

pub use audio_engine::{create_engine, AudioEngine, EngineHandle};
pub use gc::gc_handle;
pub use legacy_track::AudioTrack;
pub use message::{AudioToUiMessage, UiToAudioMessage};
pub use metronome::{Metronome, BEAT_FREQUENCY, CLICK_LENGTH, DEFAULT_METRONOME_GAIN, DOWNBEAT_FREQUENCY};
pub use queue::{message_channel, MessageReceiver, MessageSender, MESSAGE_QUEUE_CAPACITY};
pub use transport::{Transport, TransportState, MAX_BPM, MIN_BPM};
