//! Deferred deallocation for data the audio thread may release
//!
//! Snapshots, audio assets, plugin instances and the legacy track's audio
//! data are wrapped in `basedrop::Shared<T>`. When the last reference is
//! dropped on the audio thread, the node is only pushed onto a lock-free
//! list; the memory is freed later on the `audio-gc` thread, which owns the
//! `Collector` and sweeps every 100 ms.
//!
//! ```ignore
//! use basedrop::Shared;
//! use neurato_core::engine::gc_handle;
//!
//! let asset = Shared::new(&gc_handle(), asset);
//! // Dropping the last clone anywhere defers the free to the GC thread
//! ```

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Interval between collection sweeps
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    // Collector is !Sync, so it lives entirely on its own thread
    thread::Builder::new()
        .name("audio-gc".to_string())
        .spawn(move || {
            let mut collector = Collector::new();
            tx.send(collector.handle())
                .expect("GC handle receiver dropped before startup");

            log::info!("Audio GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn audio GC thread");

    rx.recv().expect("Audio GC thread exited before sending its handle")
}

/// Handle for allocating `Shared<T>` values, starting the GC thread on first use
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Shared;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_is_collected_on_gc_thread() {
        let dropped = Arc::new(AtomicBool::new(false));
        let shared = Shared::new(&gc_handle(), DropFlag(dropped.clone()));
        let clone = shared.clone();
        drop(shared);
        drop(clone);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !dropped.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(dropped.load(Ordering::SeqCst));
    }
}
