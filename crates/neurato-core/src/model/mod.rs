//! Project model - Session, tracks, clips and audio assets
//!
//! Everything here belongs to the UI thread. The audio thread only ever sees
//! the flattened [`RenderSnapshot`](crate::render::RenderSnapshot) built from
//! a [`Session`].

mod asset;
mod clip;
mod session;
mod track;

use std::sync::atomic::{AtomicU64, Ordering};

pub use asset::{AssetError, AssetResult, AudioAsset};
pub use clip::{Clip, MidiClip, MidiNote};
pub use session::{LoopRegion, Session};
pub use track::{PluginSlot, Track, TrackKind};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id such as "clip-17"
pub(crate) fn next_id(prefix: &str) -> String {
    let n = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", prefix, n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = next_id("clip");
        let b = next_id("clip");
        assert_ne!(a, b);
        assert!(a.starts_with("clip-"));
    }
}
