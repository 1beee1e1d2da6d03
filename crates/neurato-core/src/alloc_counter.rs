//! Test-only global allocator that counts heap operations per thread

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

thread_local! {
    static COUNTING: Cell<bool> = const { Cell::new(false) };
    static OPERATIONS: Cell<usize> = const { Cell::new(0) };
}

struct CountingAllocator;

impl CountingAllocator {
    #[inline]
    fn record(&self) {
        // try_with: the allocator also runs during thread teardown
        let _ = COUNTING.try_with(|counting| {
            if counting.get() {
                let _ = OPERATIONS.try_with(|ops| ops.set(ops.get() + 1));
            }
        });
    }
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.record();
        System.alloc(layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.record();
        System.alloc_zeroed(layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        self.record();
        System.realloc(ptr, layout, new_size)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.record();
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

/// Run `f` and return its result with the number of allocations,
/// reallocations and frees it made on the calling thread
pub(crate) fn count_allocations<R>(f: impl FnOnce() -> R) -> (R, usize) {
    OPERATIONS.with(|ops| ops.set(0));
    COUNTING.with(|counting| counting.set(true));
    let result = f();
    COUNTING.with(|counting| counting.set(false));
    (result, OPERATIONS.with(Cell::get))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_allocations_inside_closure_only() {
        let outside = vec![0u8; 16];
        let ((), count) = count_allocations(|| {
            let inside = std::hint::black_box(vec![0u8; 32]);
            drop(inside);
        });
        assert_eq!(count, 2);
        drop(outside);
    }

    #[test]
    fn test_stack_only_closure_counts_nothing() {
        let (sum, count) = count_allocations(|| (0..100u32).sum::<u32>());
        assert_eq!(sum, 4950);
        assert_eq!(count, 0);
    }
}
