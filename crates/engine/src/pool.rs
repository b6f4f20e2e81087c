//! Interface to the out-of-scope block pool / allocator collaborator.
//!
//! The real block pool, transaction manager, and on-disk allocator are
//! explicitly out of scope; this module only names the shape the TO-
//! traversal and reader stages need from it. A production caller supplies
//! its own implementation; `engine`'s integration tests supply an in-memory
//! one.

use core::blockptr::BlockPointer;
use core::dataset::DatasetHandle;
use core::error::EngineError;

/// One leaf block (or hole) a TO-traversal visits.
#[derive(Debug, Clone)]
pub struct BlockEntry {
    /// Block id within the object.
    pub block_id: u64,
    /// `None` for a hole.
    pub block_pointer: Option<BlockPointer>,
    /// Logical block size in bytes.
    pub block_size: u32,
}

impl BlockEntry {
    /// Reports whether this entry describes a hole.
    #[must_use]
    pub const fn is_hole(&self) -> bool {
        self.block_pointer.is_none()
    }
}

/// One dnode a TO-traversal visits, plus the leaf blocks born after
/// `from_txg`.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    /// Object id.
    pub object: u64,
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
    /// Highest allocated block id.
    pub max_blkid: u64,
    /// Block pointer of the dnode itself.
    pub block_pointer: BlockPointer,
    /// Leaf blocks born after `from_txg`, in ascending `block_id` order.
    pub blocks: Vec<BlockEntry>,
    /// The spill block exists and was born at or before `from_txg`.
    pub spill_unmodified: bool,
    /// Spill block entry, if `has_spill`.
    pub spill: Option<BlockEntry>,
}

/// Read and enumeration surface the TO-traversal and reader stages need.
///
/// Implementations are expected to be cheaply `Clone`-free and safe to share
/// behind an `Arc` across the five pipeline threads.
pub trait BlockStore: Send + Sync {
    /// Returns dnode entries at or after `resume_object`, in ascending
    /// object order, that have at least one visible change (a leaf block,
    /// bonus change, or deletion) after `from_txg`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IoError`] or [`EngineError::CorruptionError`]
    /// on an underlying metadata read failure.
    fn objects(
        &self,
        handle: &DatasetHandle,
        from_txg: u64,
        resume_object: u64,
    ) -> Result<Vec<ObjectEntry>, EngineError>;

    /// Reads the decoded payload bytes for one leaf block.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IoError`] or [`EngineError::CorruptionError`].
    fn read_block(&self, object: u64, block_id: u64) -> Result<Vec<u8>, EngineError>;

    /// Resolves a `PreviouslyRedacted` span against the TO dataset: `None`
    /// if `object` no longer exists (the record should be dropped),
    /// otherwise the concrete entries covering `[start_blkid, end_blkid)`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::IoError`] or [`EngineError::CorruptionError`].
    fn resolve_previously_redacted(
        &self,
        object: u64,
        start_blkid: u64,
        end_blkid: u64,
    ) -> Result<Option<Vec<BlockEntry>>, EngineError>;
}
