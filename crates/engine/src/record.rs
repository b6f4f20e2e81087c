//! Internal record types passed between pipeline stages.
//!
//! A [`Record`] is produced by exactly one stage and owned by exactly one
//! stage at a time (invariant §3.3 of the data model); moving it through a
//! [`crate::queue::ByteQueue`] transfers ownership. [`Data`] is the one kind
//! with a second, asynchronous owner: while a read is outstanding, the
//! reader stage and the block store's completion callback co-own the
//! buffer slot until [`Data::wait_ready`] observes it resolved.

use std::sync::{Arc, Condvar, Mutex};

use core::blockptr::BlockPointer;

use crate::queue::Weighted;

/// Canonical class used for ordering and overlap comparisons (§3.2-3):
/// `ObjectRange` precedes `Object` precedes every per-blkid record at the
/// same object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RecordClass {
    /// One encrypted dnode block (`OBJECT_RANGE`).
    ObjectRange,
    /// A full dnode (`OBJECT`).
    Object,
    /// A per-block-id record (`Data`, `Hole`, `Redact`, `PreviouslyRedacted`).
    PerBlock,
}

/// The dnode body carried by an [`Kind::Object`] record.
#[derive(Debug, Clone)]
pub struct ObjectBody {
    /// Block pointer of the dnode itself.
    pub block_pointer: BlockPointer,
    /// Dnode type.
    pub dnode_type: u32,
    /// Bonus buffer type.
    pub bonus_type: u32,
    /// Logical block size in bytes.
    pub block_size: u32,
    /// Bonus buffer bytes.
    pub bonus: Vec<u8>,
    /// Number of 512-byte dnode slots.
    pub dnode_slots: u32,
    /// The dnode has a spill block.
    pub has_spill: bool,
    /// Highest allocated block id (used to derive the terminating `FREE`).
    pub max_blkid: u64,
}

/// The encryption parameters carried by an [`Kind::ObjectRange`] record.
#[derive(Debug, Clone, Copy)]
pub struct ObjectRangeBody {
    /// The block's on-disk endianness differs from the receiver's.
    pub byteswap: bool,
    /// Per-block salt.
    pub salt: [u8; 8],
    /// Initialization vector.
    pub iv: [u8; 12],
    /// Message authentication code.
    pub mac: [u8; 16],
}

/// Completion state of a [`Data`] record's buffer slot.
#[derive(Debug, Clone)]
enum DataState {
    /// No read has been requested yet.
    Empty,
    /// A read has been submitted to the block store and is outstanding.
    Pending,
    /// The read completed successfully.
    Ready(Arc<Vec<u8>>),
    /// The read failed; the reader/main stage decides whether to
    /// synthesize a filler or abort.
    Failed(Arc<str>),
}

#[derive(Debug)]
struct DataSlot {
    state: Mutex<DataState>,
    condvar: Condvar,
}

/// Sentinel block id marking a dnode's spill block, mirroring the
/// reference implementation's `DMU_SPILL_BLKID`.
pub const SPILL_BLKID: u64 = u64::MAX - 1;

/// A single leaf block, with a lazily resolved buffer.
#[derive(Debug, Clone)]
pub struct Data {
    /// Block pointer describing the leaf block.
    pub block_pointer: BlockPointer,
    /// Logical block size in bytes.
    pub logical_size: u32,
    /// The buffer slot preserves the block's on-disk compressed form
    /// rather than decompressing it (stream-compression negotiated).
    pub compression_preserved: bool,
    /// This is a spill block that was unmodified between `fromtxg` and the
    /// current traversal, synthesized per `EngineConfig::send_unmodified_spill_blocks`.
    pub spill_unmodified: bool,
    slot: Arc<DataSlot>,
}

impl Data {
    /// Creates a `Data` record with no read yet requested.
    #[must_use]
    pub fn new(block_pointer: BlockPointer, logical_size: u32) -> Self {
        Self {
            block_pointer,
            logical_size,
            compression_preserved: false,
            spill_unmodified: false,
            slot: Arc::new(DataSlot {
                state: Mutex::new(DataState::Empty),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Marks this record as an unmodified spill block.
    #[must_use]
    pub const fn with_spill_unmodified(mut self) -> Self {
        self.spill_unmodified = true;
        self
    }

    /// Marks the read as outstanding. Called by the reader stage before
    /// handing the record to a block store.
    pub fn begin_read(&self) {
        let mut state = self.slot.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = DataState::Pending;
    }

    /// Resolves the buffer synchronously without going through a pending
    /// state, used when the block is already cached.
    pub fn resolve_cached(&self, buf: Vec<u8>) {
        let mut state = self.slot.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = DataState::Ready(Arc::new(buf));
    }

    /// Completes an outstanding read with data, waking any waiter.
    pub fn complete_read(&self, buf: Vec<u8>) {
        let mut state = self.slot.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = DataState::Ready(Arc::new(buf));
        drop(state);
        self.slot.condvar.notify_all();
    }

    /// Fails an outstanding read, waking any waiter.
    pub fn fail_read(&self, detail: impl Into<Arc<str>>) {
        let mut state = self.slot.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = DataState::Failed(detail.into());
        drop(state);
        self.slot.condvar.notify_all();
    }

    /// Blocks until the buffer is ready or the read failed.
    pub fn wait_ready(&self) -> Result<Arc<Vec<u8>>, Arc<str>> {
        let mut state = self.slot.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            match &*state {
                DataState::Ready(buf) => return Ok(Arc::clone(buf)),
                DataState::Failed(detail) => return Err(Arc::clone(detail)),
                DataState::Empty | DataState::Pending => {
                    state = self
                        .slot
                        .condvar
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                }
            }
        }
    }
}

/// The type-specific body of a [`Record`].
#[derive(Debug, Clone)]
pub enum Kind {
    /// A full dnode.
    Object(ObjectBody),
    /// One encrypted dnode block (raw sends only).
    ObjectRange(ObjectRangeBody),
    /// A single leaf block.
    Data(Data),
    /// A span known to be holes.
    Hole {
        /// Logical block size applicable to the span.
        block_size: u32,
    },
    /// A span to be emitted as an explicit redaction marker.
    Redact {
        /// Logical block size of the redacted span, preserved from TO.
        block_size: u32,
    },
    /// A span redacted at the `from` endpoint, pending reader resolution.
    PreviouslyRedacted,
    /// Sentinel marker ordered after every real record.
    Eos,
}

/// One record flowing through the pipeline.
#[derive(Debug, Clone)]
pub struct Record {
    /// Object id, or [`u64::MAX`] for [`Kind::Eos`].
    pub object: u64,
    /// First block id covered.
    pub start_blkid: u64,
    /// One past the last block id covered.
    pub end_blkid: u64,
    /// Type-specific payload.
    pub kind: Kind,
}

impl Record {
    /// Builds the `Eos` sentinel.
    #[must_use]
    pub const fn eos() -> Self {
        Self {
            object: u64::MAX,
            start_blkid: 0,
            end_blkid: 0,
            kind: Kind::Eos,
        }
    }

    /// Reports whether this is the `Eos` sentinel.
    #[must_use]
    pub const fn is_eos(&self) -> bool {
        matches!(self.kind, Kind::Eos)
    }

    /// The class used for canonical ordering (§3.2-3).
    #[must_use]
    pub const fn class(&self) -> RecordClass {
        match self.kind {
            Kind::ObjectRange(_) => RecordClass::ObjectRange,
            Kind::Object(_) => RecordClass::Object,
            Kind::Data(_) | Kind::Hole { .. } | Kind::Redact { .. } | Kind::PreviouslyRedacted => {
                RecordClass::PerBlock
            }
            Kind::Eos => RecordClass::PerBlock,
        }
    }

    /// Canonical order key: `(object, class, start_blkid)`. `Eos` sorts
    /// last because its `object` is `u64::MAX`.
    #[must_use]
    pub fn order_key(&self) -> (u64, RecordClass, u64) {
        (self.object, self.class(), self.start_blkid)
    }

    /// Returns a copy of this record truncated to `[start, end)`, which
    /// must be a sub-span of the original range. Used by the merge stage
    /// to shrink a lower-priority front in place.
    #[must_use]
    pub fn truncated_to(&self, start: u64, end: u64) -> Self {
        debug_assert!(start >= self.start_blkid && end <= self.end_blkid && start <= end);
        Self {
            object: self.object,
            start_blkid: start,
            end_blkid: end,
            kind: self.kind.clone(),
        }
    }
}

impl Weighted for Record {
    fn cost(&self) -> usize {
        match &self.kind {
            Kind::Object(body) => body.block_size as usize,
            Kind::Data(data) => data.logical_size as usize,
            Kind::Hole { block_size } | Kind::Redact { block_size } => *block_size as usize,
            Kind::ObjectRange(_) | Kind::PreviouslyRedacted | Kind::Eos => 0,
        }
    }
}
