//! On-disk block pointer descriptor shared between the traversal and reader
//! stages.
//!
//! A `BlockPointer` is immutable once read from disk: the traversal stage
//! receives one per visited block from the out-of-scope block pool
//! collaborator and copies it into the [`crate`] record it produces; the
//! reader stage later consults it to decide what form of the block to
//! request (raw ciphertext, compressed, or decompressed).

/// Compression algorithm recorded on a block pointer.
///
/// Named after the on-disk compression codes the reference implementation
/// stores per-block; this type records what a given on-disk block *already
/// is*, independent of the `COMPRESSED`/`LZ4`/`ZSTD` feature flags that
/// govern what the stream is allowed to *emit*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OnDiskCompression {
    /// Block stored uncompressed.
    Off,
    /// A "legacy" compression function predating the stream-compression
    /// feature flags (still embeddable without `LZ4`/`ZSTD` negotiated).
    Legacy,
    /// LZ4-compressed block.
    Lz4,
    /// Zstd-compressed block.
    Zstd,
}

impl OnDiskCompression {
    /// Reports whether this compression code is one of the pre-feature-flag
    /// "legacy" codecs embeddable without negotiating `LZ4`.
    #[must_use]
    pub const fn is_legacy(self) -> bool {
        matches!(self, Self::Legacy)
    }
}

/// Block pointer: the fixed-size descriptor of an on-disk block.
///
/// Mirrors the attribute list from the specification's data model: level,
/// birth txg, object type, compression, logical/physical size, checksum
/// kind, and the optional encryption material carried when the block is
/// protected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPointer {
    /// Tree level (0 = leaf data block).
    pub level: u8,
    /// Transaction group in which this block was born.
    pub birth_txg: u64,
    /// Object type recorded on the pointer (informational; the owning
    /// record already carries the authoritative type for dnodes).
    pub object_type: u32,
    /// On-disk compression applied to this block, if any.
    pub compression: OnDiskCompression,
    /// Physical (on-disk, possibly compressed) size in bytes.
    pub psize: u32,
    /// Logical (decompressed) size in bytes.
    pub lsize: u32,
    /// Checksum algorithm identifier recorded on the pointer.
    pub checksum_type: u8,
    /// The pointer's payload is embedded inside the pointer itself.
    pub embedded: bool,
    /// When `embedded` is set, which embed type the payload uses.
    pub embed_type: EmbedType,
    /// The block is encrypted ("protected" in the reference vocabulary).
    pub protected: bool,
    /// Encryption material, present iff `protected` is set.
    pub crypt: Option<CryptParams>,
    /// This block's contents are subject to the BP-level redaction flag
    /// (distinct from a redaction-list entry: some on-disk formats mark
    /// redaction directly on the pointer).
    pub bp_redacted: bool,
    /// Byte-swap flag: the block's on-disk endianness differs from the
    /// host's.
    pub byteswap: bool,
    /// The block is allocated (as opposed to a hole).
    pub allocated: bool,
}

/// Embedded-BP payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbedType {
    /// No embedding (non-embedded pointer).
    None,
    /// Plain embedded data payload.
    Data,
}

/// Encryption material carried by a protected block pointer.
///
/// Raw sends emit these fields verbatim so the receiver can reconstruct a
/// bit-identical ciphertext block without ever seeing the plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptParams {
    /// Per-block salt.
    pub salt: [u8; 8],
    /// Initialization vector.
    pub iv: [u8; 12],
    /// Message authentication code.
    pub mac: [u8; 16],
}

impl BlockPointer {
    /// Reports whether this pointer describes a hole (no allocation).
    #[must_use]
    pub const fn is_hole(&self) -> bool {
        !self.allocated
    }

    /// Reports whether the decoded reader must use the `DEDUP`-capable
    /// precomputed checksum path (non-embedded, non-raw-plaintext blocks
    /// only).
    #[must_use]
    pub const fn has_dedup_capable_checksum(&self) -> bool {
        self.allocated && !self.embedded
    }
}
