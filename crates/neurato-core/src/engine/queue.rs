//! Lock-free SPSC message queues between the UI and audio threads
//!
//! Both directions use the same fixed-capacity `rtrb` ring buffer:
//!
//! - **No allocations** after construction
//! - **Wait-free** push and pop, neither side ever blocks
//! - **Single producer, single consumer**: the halves are `Send` but not
//!   `Clone`, so a second producer or consumer cannot be created
//!
//! A full queue drops the new message. Under extreme flooding the UI loses
//! commands (or telemetry) rather than ever stalling the audio thread.

use rtrb::{Consumer, Producer, RingBuffer};

/// Default slot count for both message directions
pub const MESSAGE_QUEUE_CAPACITY: usize = 256;

/// Create a bounded SPSC channel.
///
/// `capacity` is rounded up to the next power of two (minimum 2).
pub fn message_channel<T>(capacity: usize) -> (MessageSender<T>, MessageReceiver<T>) {
    let capacity = capacity.max(2).next_power_of_two();
    let (producer, consumer) = RingBuffer::new(capacity);
    (MessageSender { producer }, MessageReceiver { consumer })
}

/// Producing half, owned by exactly one thread
pub struct MessageSender<T> {
    producer: Producer<T>,
}

impl<T> MessageSender<T> {
    /// Queue a message. Returns `false` (and drops it) when the queue is full.
    #[inline]
    pub fn try_push(&mut self, message: T) -> bool {
        self.producer.push(message).is_ok()
    }

    /// Free slots right now
    #[inline]
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }

    pub fn capacity(&self) -> usize {
        self.producer.buffer().capacity()
    }
}

/// Consuming half, owned by exactly one thread
pub struct MessageReceiver<T> {
    consumer: Consumer<T>,
}

impl<T> MessageReceiver<T> {
    /// Next message in FIFO order, or `None` when empty
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        self.consumer.pop().ok()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// Messages waiting right now
    #[inline]
    pub fn len(&self) -> usize {
        self.consumer.slots()
    }
}
