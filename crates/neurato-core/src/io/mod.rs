//! External I/O - live MIDI input and its routing
//!
//! MIDI from hardware ports (feature `midi-input`) and from virtual sources
//! such as an on-screen keyboard lands in one SPSC queue. The audio thread
//! drains it once per block through the [`MidiCollector`]; everything else
//! lives on the [`ExternalIoManager`] (UI thread).

mod collector;
#[cfg(feature = "midi-input")]
mod midi_input;

use thiserror::Error;

pub use collector::{external_io, ExternalIoManager, MidiCollector, MIDI_QUEUE_CAPACITY};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("MIDI input support is not compiled in (enable the `midi-input` feature)")]
    MidiUnavailable,

    #[error("Failed to initialize MIDI input: {0}")]
    MidiInit(String),

    #[error("No MIDI input port matching: {0}")]
    PortNotFound(String),

    #[error("Failed to connect to MIDI port: {0}")]
    Connection(String),
}

pub type IoResult<T> = Result<T, IoError>;

/// A MIDI input port as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiDeviceInfo {
    pub name: String,
    /// Stable key used by `enable_midi_input` (the port name)
    pub identifier: String,
    pub enabled: bool,
}
