//! Hardware MIDI input through midir
//!
//! Each open port owns a midir connection whose callback copies the raw
//! bytes into the shared live MIDI queue. The callback runs on the MIDI
//! driver thread and never blocks the audio thread.

use midir::{Ignore, MidiInput, MidiInputConnection};

use super::collector::SharedMidiProducer;
use super::{IoError, IoResult};
use crate::midi::MidiEvent;

const CLIENT_NAME: &str = "neurato-midi-in";

/// An open input port; dropping it closes the connection
pub(crate) struct MidiInputHandle {
    identifier: String,
    _connection: MidiInputConnection<SharedMidiProducer>,
}

impl MidiInputHandle {
    pub(crate) fn identifier(&self) -> &str {
        &self.identifier
    }
}

fn new_input() -> IoResult<MidiInput> {
    let mut input = MidiInput::new(CLIENT_NAME).map_err(|e| IoError::MidiInit(e.to_string()))?;
    input.ignore(Ignore::SysexAndTime);
    Ok(input)
}

pub(crate) fn input_port_names() -> IoResult<Vec<String>> {
    let input = new_input()?;
    Ok(input
        .ports()
        .iter()
        .filter_map(|port| input.port_name(port).ok())
        .collect())
}

/// Connect to the port named `identifier`, or failing an exact match, the
/// first port whose name contains it (case-insensitive)
pub(crate) fn connect(identifier: &str, producer: SharedMidiProducer) -> IoResult<MidiInputHandle> {
    let input = new_input()?;
    let ports = input.ports();
    let pattern = identifier.to_lowercase();

    let port = ports
        .iter()
        .find(|port| input.port_name(port).is_ok_and(|name| name == identifier))
        .or_else(|| {
            ports.iter().find(|port| {
                input
                    .port_name(port)
                    .is_ok_and(|name| name.to_lowercase().contains(&pattern))
            })
        })
        .ok_or_else(|| IoError::PortNotFound(identifier.to_string()))?
        .clone();

    let port_name = input.port_name(&port).unwrap_or_else(|_| identifier.to_string());
    let connection = input
        .connect(&port, "neurato-input", on_midi, producer)
        .map_err(|e| IoError::Connection(e.to_string()))?;

    log::info!("MIDI input {} opened", port_name);
    Ok(MidiInputHandle {
        identifier: identifier.to_string(),
        _connection: connection,
    })
}

fn on_midi(_timestamp: u64, data: &[u8], producer: &mut SharedMidiProducer) {
    let Some(event) = MidiEvent::from_bytes(0, data) else {
        return;
    };
    log::trace!("[MIDI IN] {:?}", event.message());
    if let Ok(mut producer) = producer.lock() {
        if producer.push(event).is_err() {
            log::warn!("Live MIDI queue full, dropping event");
        }
    }
}
