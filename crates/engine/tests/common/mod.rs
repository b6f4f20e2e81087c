//! In-memory `BlockStore` fixture standing in for the out-of-scope block
//! pool/allocator collaborator.

use std::collections::HashMap;

use core::dataset::DatasetHandle;
use core::error::EngineError;
use engine::pool::{BlockEntry, BlockStore, ObjectEntry};

/// A fixed, pre-built set of dnodes and their leaf blocks.
#[derive(Default)]
pub struct FakePool {
    objects: Vec<ObjectEntry>,
    payloads: HashMap<(u64, u64), Vec<u8>>,
}

impl FakePool {
    pub fn new(objects: Vec<ObjectEntry>, payloads: HashMap<(u64, u64), Vec<u8>>) -> Self {
        Self { objects, payloads }
    }
}

impl BlockStore for FakePool {
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
        let entries = entry
            .blocks
            .iter()
            .filter(|b| b.block_id >= start_blkid && b.block_id < end_blkid)
            .cloned()
            .collect();
        Ok(Some(entries))
    }
}
