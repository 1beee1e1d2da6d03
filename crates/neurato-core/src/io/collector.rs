//! Live MIDI collection and device routing

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rtrb::{Consumer, Producer, RingBuffer};

use super::{IoResult, MidiDeviceInfo};
use crate::midi::{MidiBuffer, MidiEvent};
use crate::types::DEFAULT_SAMPLE_RATE;

/// Live MIDI events buffered between two audio callbacks
pub const MIDI_QUEUE_CAPACITY: usize = 1024;

/// Producer side of the live MIDI queue
///
/// Shared by the UI thread and every MIDI driver callback. Only those
/// threads lock it; the audio thread owns the consumer.
pub(crate) type SharedMidiProducer = Arc<Mutex<Producer<MidiEvent>>>;

/// Create the two halves of the live MIDI path
pub fn external_io() -> (ExternalIoManager, MidiCollector) {
    let (producer, consumer) = RingBuffer::new(MIDI_QUEUE_CAPACITY);

    let manager = ExternalIoManager {
        producer: Arc::new(Mutex::new(producer)),
        routing: HashMap::new(),
        #[cfg(feature = "midi-input")]
        inputs: Vec::new(),
    };
    let collector = MidiCollector {
        consumer,
        sample_rate: DEFAULT_SAMPLE_RATE,
    };
    (manager, collector)
}

/// Audio-thread half: pulls the MIDI collected since the last block
pub struct MidiCollector {
    consumer: Consumer<MidiEvent>,
    sample_rate: f64,
}

impl MidiCollector {
    /// Replace `buffer` with every pending event, all at offset 0
    ///
    /// Events that do not fit in `buffer` stay queued for the next block.
    pub fn midi_messages_for_block(&mut self, buffer: &mut MidiBuffer, num_samples: usize) {
        buffer.clear();
        if num_samples == 0 {
            return;
        }
        while buffer.len() < buffer.capacity() {
            match self.consumer.pop() {
                Ok(event) => {
                    buffer.push(MidiEvent { offset: 0, ..event });
                }
                Err(_) => break,
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.consumer.is_empty()
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

/// UI-thread half: virtual MIDI injection, hardware inputs and routing
pub struct ExternalIoManager {
    producer: SharedMidiProducer,
    /// Device identifier -> track id; absent means all MIDI tracks
    routing: HashMap<String, String>,
    #[cfg(feature = "midi-input")]
    inputs: Vec<super::midi_input::MidiInputHandle>,
}

impl ExternalIoManager {
    /// Queue a MIDI event from a virtual source (on-screen keyboard,
    /// computer keyboard). Returns `false` when the queue is full.
    pub fn add_midi_message(&self, event: MidiEvent) -> bool {
        match self.producer.lock() {
            Ok(mut producer) => producer.push(event).is_ok(),
            Err(poisoned) => poisoned.into_inner().push(event).is_ok(),
        }
    }

    /// Record which track a device plays. An empty `track_id` routes it to
    /// every MIDI track again.
    pub fn route_midi_device_to_track(&mut self, identifier: &str, track_id: &str) {
        if track_id.is_empty() {
            self.routing.remove(identifier);
        } else {
            self.routing.insert(identifier.to_string(), track_id.to_string());
        }
        log::debug!(
            "MIDI device {} routed to {}",
            identifier,
            if track_id.is_empty() { "all tracks" } else { track_id }
        );
    }

    /// Track a device is routed to, `None` for all tracks
    pub fn midi_device_track_routing(&self, identifier: &str) -> Option<&str> {
        self.routing.get(identifier).map(String::as_str)
    }

    #[cfg(feature = "midi-input")]
    pub fn available_midi_inputs(&self) -> IoResult<Vec<MidiDeviceInfo>> {
        let mut devices = super::midi_input::input_port_names()?
            .into_iter()
            .map(|name| MidiDeviceInfo {
                enabled: self.is_midi_input_enabled(&name),
                identifier: name.clone(),
                name,
            })
            .collect::<Vec<_>>();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(devices)
    }

    #[cfg(not(feature = "midi-input"))]
    pub fn available_midi_inputs(&self) -> IoResult<Vec<MidiDeviceInfo>> {
        Err(super::IoError::MidiUnavailable)
    }

    /// Open a hardware input; already-open inputs are left as they are
    #[cfg(feature = "midi-input")]
    pub fn enable_midi_input(&mut self, identifier: &str) -> IoResult<()> {
        if self.is_midi_input_enabled(identifier) {
            return Ok(());
        }
        let handle = super::midi_input::connect(identifier, Arc::clone(&self.producer))?;
        self.inputs.push(handle);
        Ok(())
    }

    #[cfg(not(feature = "midi-input"))]
    pub fn enable_midi_input(&mut self, _identifier: &str) -> IoResult<()> {
        Err(super::IoError::MidiUnavailable)
    }

    /// Close a hardware input. Returns `false` if it was not open.
    pub fn disable_midi_input(&mut self, identifier: &str) -> bool {
        #[cfg(feature = "midi-input")]
        {
            let before = self.inputs.len();
            self.inputs.retain(|input| input.identifier() != identifier);
            let closed = self.inputs.len() != before;
            if closed {
                log::info!("MIDI input {} closed", identifier);
            }
            closed
        }
        #[cfg(not(feature = "midi-input"))]
        {
            let _ = identifier;
            false
        }
    }

    pub fn disable_all_midi_inputs(&mut self) {
        for identifier in self.enabled_midi_inputs() {
            self.disable_midi_input(&identifier);
        }
    }

    pub fn is_midi_input_enabled(&self, identifier: &str) -> bool {
        self.enabled_midi_inputs().iter().any(|id| id == identifier)
    }

    pub fn enabled_midi_inputs(&self) -> Vec<String> {
        #[cfg(feature = "midi-input")]
        {
            self.inputs.iter().map(|input| input.identifier().to_string()).collect()
        }
        #[cfg(not(feature = "midi-input"))]
        {
            Vec::new()
        }
    }
}
