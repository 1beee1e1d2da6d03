//! Session rendering
//!
//! The real-time mixer ([`SessionRenderer`]) and its snapshot publisher, the
//! built-in piano, and the faster-than-realtime offline bounce.

pub mod offline;
mod piano;
mod renderer;
mod snapshot;

pub use offline::{render_offline, BounceProgress, BounceSettings, BounceSummary, RenderError, RenderResult};
pub use piano::{PianoSynth, MAX_VOICES};
pub use renderer::{session_renderer, SessionPublisher, SessionRenderer, PIANO_POOL_SIZE};
pub use snapshot::{RenderClip, RenderNote, RenderPlugin, RenderSnapshot, RenderTrack};
