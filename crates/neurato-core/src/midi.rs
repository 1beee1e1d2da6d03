//! MIDI events and the fixed-capacity block buffer
//!
//! Events are plain `Copy` values with a sample offset inside the current
//! block, so a [`MidiBuffer`] can be filled and cleared on the audio thread
//! without allocating.

/// Maximum events per block; further events are dropped
pub const MIDI_BUFFER_CAPACITY: usize = 1024;

/// A short (up to 3 byte) MIDI message at a sample offset within a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MidiEvent {
    /// Sample offset from the start of the block
    pub offset: u32,
    pub data: [u8; 3],
    /// Number of valid bytes in `data`
    pub len: u8,
}

/// Decoded view of a [`MidiEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, cc: u8, value: u8 },
    /// Anything else (pitch bend, aftertouch, system messages)
    Other,
}

impl MidiEvent {
    pub fn note_on(offset: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            offset,
            data: [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            len: 3,
        }
    }

    pub fn note_off(offset: u32, channel: u8, note: u8) -> Self {
        Self {
            offset,
            data: [0x80 | (channel & 0x0F), note & 0x7F, 0],
            len: 3,
        }
    }

    /// Copy raw bytes from a driver callback. Returns `None` for empty input;
    /// bytes past the third are ignored (SysEx is not carried).
    pub fn from_bytes(offset: u32, bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        let len = bytes.len().min(3);
        let mut data = [0u8; 3];
        data[..len].copy_from_slice(&bytes[..len]);
        Some(Self {
            offset,
            data,
            len: len as u8,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Decode the message
    ///
    /// - Note Off: 0x8n nn vv
    /// - Note On: 0x9n nn vv (velocity 0 is a Note Off)
    /// - Control Change: 0xBn cc vv
    pub fn message(&self) -> MidiMessage {
        if self.len < 3 {
            return MidiMessage::Other;
        }
        let [status, d1, d2] = self.data;
        let channel = status & 0x0F;
        match status & 0xF0 {
            0x80 => MidiMessage::NoteOff {
                channel,
                note: d1,
                velocity: d2,
            },
            0x90 if d2 == 0 => MidiMessage::NoteOff {
                channel,
                note: d1,
                velocity: 0,
            },
            0x90 => MidiMessage::NoteOn {
                channel,
                note: d1,
                velocity: d2,
            },
            0xB0 => MidiMessage::ControlChange {
                channel,
                cc: d1,
                value: d2,
            },
            _ => MidiMessage::Other,
        }
    }
}

/// Fixed-capacity list of events for one block
///
/// Storage is allocated once; `push`, `clear` and `sort_by_offset` never
/// allocate.
pub struct MidiBuffer {
    events: Vec<MidiEvent>,
}

impl MidiBuffer {
    pub fn new() -> Self {
        Self::with_capacity(MIDI_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    /// Append an event. Returns `false` (event dropped) when full.
    #[inline]
    pub fn push(&mut self, event: MidiEvent) -> bool {
        if self.events.len() == self.events.capacity() {
            return false;
        }
        self.events.push(event);
        true
    }

    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.events.capacity()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MidiEvent> {
        self.events.iter()
    }

    pub fn as_slice(&self) -> &[MidiEvent] {
        &self.events
    }

    /// Append every event of `other` that fits
    pub fn extend_from(&mut self, other: &MidiBuffer) {
        for event in other.iter() {
            if !self.push(*event) {
                break;
            }
        }
    }

    /// Stable in-place sort (insertion sort, fine for block-sized lists)
    pub fn sort_by_offset(&mut self) {
        let events = &mut self.events;
        for i in 1..events.len() {
            let mut j = i;
            while j > 0 && events[j - 1].offset > events[j].offset {
                events.swap(j - 1, j);
                j -= 1;
            }
        }
    }
}

impl Default for MidiBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_note_on() {
        let event = MidiEvent::note_on(5, 0, 60, 127);
        assert_eq!(
            event.message(),
            MidiMessage::NoteOn {
                channel: 0,
                note: 60,
                velocity: 127
            }
        );
        assert_eq!(event.bytes(), &[0x90, 60, 127]);
    }

    #[test]
    fn test_zero_velocity_note_on_is_note_off() {
        let event = MidiEvent::from_bytes(0, &[0x93, 0x3C, 0x00]).unwrap();
        assert_eq!(
            event.message(),
            MidiMessage::NoteOff {
                channel: 3,
                note: 60,
                velocity: 0
            }
        );
    }

    #[test]
    fn test_control_change_and_other() {
        let cc = MidiEvent::from_bytes(0, &[0xB1, 7, 100]).unwrap();
        assert_eq!(
            cc.message(),
            MidiMessage::ControlChange {
                channel: 1,
                cc: 7,
                value: 100
            }
        );
        let pitch_bend = MidiEvent::from_bytes(0, &[0xE0, 0, 64]).unwrap();
        assert_eq!(pitch_bend.message(), MidiMessage::Other);
        let clock = MidiEvent::from_bytes(0, &[0xF8]).unwrap();
        assert_eq!(clock.message(), MidiMessage::Other);
        assert!(MidiEvent::from_bytes(0, &[]).is_none());
    }

    #[test]
    fn test_buffer_drops_when_full() {
        let mut buffer = MidiBuffer::with_capacity(2);
        assert!(buffer.push(MidiEvent::note_on(0, 0, 60, 100)));
        assert!(buffer.push(MidiEvent::note_on(1, 0, 61, 100)));
        assert!(!buffer.push(MidiEvent::note_on(2, 0, 62, 100)));
        assert_eq!(buffer.len(), 2);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 2);
    }

    #[test]
    fn test_sort_by_offset_is_stable() {
        let mut buffer = MidiBuffer::new();
        buffer.push(MidiEvent::note_on(30, 0, 60, 100));
        buffer.push(MidiEvent::note_off(10, 0, 61));
        buffer.push(MidiEvent::note_on(10, 0, 62, 100));
        buffer.push(MidiEvent::note_on(0, 0, 63, 100));
        buffer.sort_by_offset();

        let order: Vec<_> = buffer.iter().map(|e| (e.offset, e.data[1])).collect();
        assert_eq!(order, [(0, 63), (10, 61), (10, 62), (30, 60)]);
    }
}
