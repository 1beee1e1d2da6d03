//! Native Rust plugins
//!
//! Implemented directly in Rust with zero latency and no allocation on the
//! audio thread.

mod delay;
mod gain;
mod piano;

pub use delay::DelayPlugin;
pub use gain::GainPlugin;
pub use piano::PianoPlugin;

use super::Plugin;

/// The plugins this crate ships
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativePlugin {
    Gain,
    Delay,
    Piano,
}

impl NativePlugin {
    pub const ALL: [NativePlugin; 3] = [Self::Gain, Self::Delay, Self::Piano];

    /// Look up by the name used in plugin ids ("gain", "delay", "piano")
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name().eq_ignore_ascii_case(name))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gain => "gain",
            Self::Delay => "delay",
            Self::Piano => "piano",
        }
    }

    pub fn create(&self) -> Box<dyn Plugin> {
        match self {
            Self::Gain => Box::new(GainPlugin::new()),
            Self::Delay => Box::new(DelayPlugin::new()),
            Self::Piano => Box::new(PianoPlugin::new()),
        }
    }
}
