//! JSON shape for the block pool fixture this binary sends.
//!
//! Deserializes into the [`core`]/[`engine`] types directly rather than
//! deriving `serde` on them, so those crates stay free of a serialization
//! dependency they otherwise have no use for.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use core::blockptr::{BlockPointer, EmbedType, OnDiskCompression};
use core::dataset::DatasetHandle;
use core::error::EngineError;

use engine::pool::{BlockEntry, BlockStore, ObjectEntry};
use engine::record::SPILL_BLKID;

/// Failure loading or interpreting a pool manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("reading pool manifest {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The manifest file was not valid JSON in the expected shape.
    #[error("parsing pool manifest {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// A `compression` field named a code this binary does not recognize.
    #[error("unknown compression code {0:?}")]
    UnknownCompression(String),
    /// An `embed_type` field named a code this binary does not recognize.
    #[error("unknown embed type {0:?}")]
    UnknownEmbedType(String),
    /// A non-hole block entry did not carry a `block_pointer`.
    #[error("block {block_id} of object {object} is not a hole but has no block_pointer")]
    MissingBlockPointer {
        /// Object id of the offending block.
        object: u64,
        /// Block id of the offending block.
        block_id: u64,
    },
}

#[derive(Debug, Deserialize)]
struct RawBlockPointer {
    #[serde(default)]
    level: u8,
    #[serde(default)]
    birth_txg: u64,
    #[serde(default)]
    object_type: u32,
    #[serde(default = "default_compression")]
    compression: String,
    psize: u32,
    lsize: u32,
    #[serde(default)]
    checksum_type: u8,
    #[serde(default)]
    embedded: bool,
    #[serde(default = "default_embed_type")]
    embed_type: String,
    #[serde(default)]
    protected: bool,
    #[serde(default)]
    bp_redacted: bool,
    #[serde(default)]
    byteswap: bool,
    #[serde(default = "default_true")]
    allocated: bool,
}

fn default_compression() -> String {
    "off".to_owned()
}

fn default_embed_type() -> String {
    "none".to_owned()
}

const fn default_true() -> bool {
    true
}

fn parse_compression(raw: &str) -> Result<OnDiskCompression, ManifestError> {
    match raw {
        "off" => Ok(OnDiskCompression::Off),
        "legacy" => Ok(OnDiskCompression::Legacy),
        "lz4" => Ok(OnDiskCompression::Lz4),
        "zstd" => Ok(OnDiskCompression::Zstd),
        other => Err(ManifestError::UnknownCompression(other.to_owned())),
    }
}

fn parse_embed_type(raw: &str) -> Result<EmbedType, ManifestError> {
    match raw {
        "none" => Ok(EmbedType::None),
        "data" => Ok(EmbedType::Data),
        other => Err(ManifestError::UnknownEmbedType(other.to_owned())),
    }
}

impl RawBlockPointer {
    fn into_block_pointer(self) -> Result<BlockPointer, ManifestError> {
        Ok(BlockPointer {
            level: self.level,
            birth_txg: self.birth_txg,
            object_type: self.object_type,
            compression: parse_compression(&self.compression)?,
            psize: self.psize,
            lsize: self.lsize,
            checksum_type: self.checksum_type,
            embedded: self.embedded,
            embed_type: parse_embed_type(&self.embed_type)?,
            protected: self.protected,
            crypt: None,
            bp_redacted: self.bp_redacted,
            byteswap: self.byteswap,
            allocated: self.allocated,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    block_id: u64,
    #[serde(default)]
    hole: bool,
    #[serde(default)]
    block_pointer: Option<RawBlockPointer>,
    block_size: u32,
    #[serde(default)]
    payload: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    object: u64,
    #[serde(default)]
    dnode_type: u32,
    #[serde(default)]
    bonus_type: u32,
    block_size: u32,
    #[serde(default)]
    bonus: Vec<u8>,
    #[serde(default = "default_dnode_slots")]
    dnode_slots: u32,
    #[serde(default)]
    has_spill: bool,
    max_blkid: u64,
    block_pointer: RawBlockPointer,
    #[serde(default)]
    blocks: Vec<RawBlock>,
    #[serde(default)]
    spill_unmodified: bool,
    #[serde(default)]
    spill: Option<RawBlock>,
}

const fn default_dnode_slots() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct RawDataset {
    guid: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    creation_txg: u64,
    #[serde(default)]
    encrypted: bool,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    to: RawDataset,
    #[serde(default)]
    from: Option<RawDataset>,
    #[serde(default)]
    max_object_id: Option<u64>,
    #[serde(default)]
    crypt_keydata: Option<Vec<u8>>,
    #[serde(default)]
    objects: Vec<RawObject>,
}

/// An in-memory [`BlockStore`] populated from a parsed manifest.
pub struct ManifestPool {
    objects: Vec<ObjectEntry>,
    payloads: HashMap<(u64, u64), Vec<u8>>,
}

impl BlockStore for ManifestPool {
    fn objects(
        &self,
        _handle: &DatasetHandle,
        _from_txg: u64,
        resume_object: u64,
    ) -> Result<Vec<ObjectEntry>, EngineError> {
        Ok(self
            .objects
            .iter()
            .filter(|o| o.object >= resume_object)
            .cloned()
            .collect())
    }

    fn read_block(&self, object: u64, block_id: u64) -> Result<Vec<u8>, EngineError> {
        Ok(self
            .payloads
            .get(&(object, block_id))
            .cloned()
            .unwrap_or_default())
    }

    fn resolve_previously_redacted(
        &self,
        object: u64,
        start_blkid: u64,
        end_blkid: u64,
    ) -> Result<Option<Vec<BlockEntry>>, EngineError> {
        let Some(entry) = self.objects.iter().find(|o| o.object == object) else {
            return Ok(None);
        };
        Ok(Some(
            entry
                .blocks
                .iter()
                .filter(|b| b.block_id >= start_blkid && b.block_id < end_blkid)
                .cloned()
                .collect(),
        ))
    }
}

/// A manifest resolved into the types [`engine::orchestrator::send_obj`]
/// needs.
pub struct LoadedManifest {
    /// The pool fixture driving the traversal and reader stages.
    pub pool: ManifestPool,
    /// The dataset version to send.
    pub to: DatasetHandle,
    /// The dataset version to send incrementally from, if any.
    pub from: Option<DatasetHandle>,
    /// The clamp for `FREEOBJECTS` aggregation, if the manifest names one.
    pub max_object_id: Option<u64>,
    /// Wrapped encryption key material for a raw send, if the manifest
    /// names the dataset as encrypted.
    pub crypt_keydata: Option<Vec<u8>>,
}

fn dataset_handle(raw: RawDataset) -> DatasetHandle {
    DatasetHandle {
        identity: raw.name,
        guid: raw.guid,
        creation_txg: raw.creation_txg,
        encrypted: raw.encrypted,
        root: BlockPointer {
            level: 0,
            birth_txg: raw.creation_txg,
            object_type: 0,
            compression: OnDiskCompression::Off,
            psize: 0,
            lsize: 0,
            checksum_type: 0,
            embedded: false,
            embed_type: EmbedType::None,
            protected: false,
            crypt: None,
            bp_redacted: false,
            byteswap: false,
            allocated: true,
        },
    }
}

fn block_entry(
    object: u64,
    raw: RawBlock,
) -> Result<(BlockEntry, Option<Vec<u8>>), ManifestError> {
    let block_pointer = if raw.hole {
        None
    } else {
        Some(
            raw.block_pointer
                .ok_or(ManifestError::MissingBlockPointer {
                    object,
                    block_id: raw.block_id,
                })?
                .into_block_pointer()?,
        )
    };
    let entry = BlockEntry {
        block_id: raw.block_id,
        block_pointer,
        block_size: raw.block_size,
    };
    let payload = if raw.hole { None } else { Some(raw.payload) };
    Ok((entry, payload))
}

/// Loads and parses a JSON pool manifest at `path`.
///
/// # Errors
///
/// Returns [`ManifestError`] if the file cannot be read, is not valid JSON
/// in the expected shape, or names an unrecognized compression/embed code.
pub fn load_manifest(path: &Path) -> Result<LoadedManifest, ManifestError> {
    let text = fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawManifest =
        serde_json::from_str(&text).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut objects = Vec::with_capacity(raw.objects.len());
    let mut payloads = HashMap::new();

    for raw_object in raw.objects {
        let object_id = raw_object.object;
        let mut blocks = Vec::with_capacity(raw_object.blocks.len());
        for raw_block in raw_object.blocks {
            let block_id = raw_block.block_id;
            let (entry, payload) = block_entry(object_id, raw_block)?;
            if let Some(payload) = payload {
                payloads.insert((object_id, block_id), payload);
            }
            blocks.push(entry);
        }

        let spill = raw_object
            .spill
            .map(|raw_block| block_entry(object_id, raw_block))
            .transpose()?
            .map(|(entry, payload)| {
                if let Some(payload) = payload {
                    payloads.insert((object_id, SPILL_BLKID), payload);
                }
                entry
            });

        objects.push(ObjectEntry {
            object: object_id,
            dnode_type: raw_object.dnode_type,
            bonus_type: raw_object.bonus_type,
            block_size: raw_object.block_size,
            bonus: raw_object.bonus,
            dnode_slots: raw_object.dnode_slots,
            has_spill: raw_object.has_spill,
            max_blkid: raw_object.max_blkid,
            block_pointer: raw_object.block_pointer.into_block_pointer()?,
            blocks,
            spill_unmodified: raw_object.spill_unmodified,
            spill,
        });
    }

    Ok(LoadedManifest {
        pool: ManifestPool { objects, payloads },
        to: dataset_handle(raw.to),
        from: raw.from.map(dataset_handle),
        max_object_id: raw.max_object_id,
        crypt_keydata: raw.crypt_keydata,
    })
}
