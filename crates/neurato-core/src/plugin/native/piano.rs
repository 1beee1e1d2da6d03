//! The built-in piano as an instrument plugin

use crate::midi::MidiBuffer;
use crate::plugin::{Plugin, PluginInfo, PluginResult};
use crate::render::PianoSynth;
use crate::types::StereoBuffer;

pub struct PianoPlugin {
    info: PluginInfo,
    synth: PianoSynth,
}

impl PianoPlugin {
    pub fn new() -> Self {
        Self {
            info: PluginInfo::instrument("Piano"),
            synth: PianoSynth::new(),
        }
    }
}

impl Default for PianoPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for PianoPlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn prepare(&mut self, sample_rate: f64, _max_block: usize) {
        self.synth.prepare(sample_rate);
    }

    fn process(&mut self, buffer: &mut StereoBuffer, midi: &MidiBuffer) -> PluginResult<()> {
        self.synth.render_with_events(buffer, midi.as_slice());
        Ok(())
    }

    fn latency_samples(&self) -> u32 {
        0
    }

    fn reset(&mut self) {
        self.synth.all_notes_off();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiEvent;

    #[test]
    fn test_plays_incoming_notes() {
        let mut plugin = PianoPlugin::new();
        plugin.prepare(48000.0, 512);
        assert!(plugin.info().is_instrument);

        let mut midi = MidiBuffer::new();
        midi.push(MidiEvent::note_on(0, 0, 60, 100));
        let mut buffer = StereoBuffer::silence(512);
        plugin.process(&mut buffer, &midi).unwrap();
        assert!(buffer.peak() > 0.0);

        plugin.reset();
        let mut buffer = StereoBuffer::silence(512);
        plugin.process(&mut buffer, &MidiBuffer::new()).unwrap();
        assert_eq!(buffer.peak(), 0.0);
    }
}
