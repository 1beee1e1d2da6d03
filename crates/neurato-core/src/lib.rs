//! Neurato Core - real-time session rendering engine for the Neurato DAW
//!
//! The UI thread edits a [`model::Session`] and publishes immutable render
//! snapshots; the audio thread renders them sample-accurately without
//! locking, allocating or freeing. The same renderer drives offline bounces.

pub mod audio;
pub mod config;
pub mod engine;
pub mod io;
pub mod midi;
pub mod model;
pub mod plugin;
pub mod render;
pub mod types;

#[cfg(test)]
mod alloc_counter;

pub use types::*;
