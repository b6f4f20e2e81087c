//! Byte-bounded inter-stage queues.
//!
//! Each queue is a bounded, blocking, single-producer single-consumer
//! channel measured in bytes of payload rather than entry count (§5 of the
//! concurrency model): a producer blocks on send when the queue's
//! in-flight byte total would exceed its configured capacity; a consumer
//! blocks on receive when the queue is empty. Built on
//! [`crossbeam_channel`] for the underlying entry transport, wrapped with
//! byte accounting so a handful of multi-megabyte `Data` records cannot
//! starve the byte budget the same way thousands of tiny `Free` records
//! would.

use std::sync::{Arc, Condvar, Mutex};

use crossbeam_channel::{Receiver, RecvError, SendError, Sender};

/// Items placed on a [`ByteQueue`] report their own accounting cost.
pub trait Weighted {
    /// The number of bytes this item counts against the queue's capacity.
    fn cost(&self) -> usize;
}

struct Shared {
    cap: usize,
    fill_threshold: usize,
    in_flight: Mutex<usize>,
    drained: Condvar,
}

impl Shared {
    fn reserve(&self, cost: usize) {
        let guard = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let mut guard = self
            .drained
            .wait_while(guard, |n| *n > 0 && *n + cost > self.cap)
            .unwrap_or_else(|e| e.into_inner());
        *guard += cost;
    }

    fn release(&self, cost: usize) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        *in_flight = in_flight.saturating_sub(cost);
        if *in_flight <= self.fill_threshold {
            drop(in_flight);
            self.drained.notify_all();
        }
    }
}

/// The producer half of a [`byte_queue`].
pub struct ByteQueueSender<T> {
    tx: Sender<T>,
    shared: Arc<Shared>,
}

/// The consumer half of a [`byte_queue`].
pub struct ByteQueueReceiver<T> {
    rx: Receiver<T>,
    shared: Arc<Shared>,
}

impl<T: Weighted> ByteQueueSender<T> {
    /// Blocks until the queue has room for `item`'s cost, then enqueues it.
    ///
    /// # Errors
    ///
    /// Returns the item back if the receiver has been dropped.
    pub fn send(&self, item: T) -> Result<(), SendError<T>> {
        self.shared.reserve(item.cost());
        self.tx.send(item)
    }
}

impl<T: Weighted> ByteQueueReceiver<T> {
    /// Blocks until an item is available, then dequeues it.
    ///
    /// # Errors
    ///
    /// Returns an error if every sender has been dropped and the queue is
    /// empty.
    pub fn recv(&self) -> Result<T, RecvError> {
        let item = self.rx.recv()?;
        self.shared.release(item.cost());
        Ok(item)
    }
}

impl<T> Clone for ByteQueueReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Builds a byte-bounded queue.
///
/// `entry_cap` bounds the number of in-flight entries (a backstop against
/// unbounded memory use from the channel itself); `byte_cap` and
/// `fill_threshold` bound and throttle the sum of [`Weighted::cost`] across
/// in-flight entries.
#[must_use]
pub fn byte_queue<T: Weighted>(
    entry_cap: usize,
    byte_cap: usize,
    fill_threshold: usize,
) -> (ByteQueueSender<T>, ByteQueueReceiver<T>) {
    let (tx, rx) = crossbeam_channel::bounded(entry_cap);
    let shared = Arc::new(Shared {
        cap: byte_cap,
        fill_threshold,
        in_flight: Mutex::new(0),
        drained: Condvar::new(),
    });
    (
        ByteQueueSender {
            tx,
            shared: Arc::clone(&shared),
        },
        ByteQueueReceiver { rx, shared },
    )
}
