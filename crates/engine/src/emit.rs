//! Main emission stage (§4.6): translates merged, read-resolved records into
//! on-wire records, folding the running checksum and flushing a single
//! pending-aggregation slot.

use core::blockptr::{BlockPointer, EmbedType, OnDiskCompression};
use core::error::EngineError;

use std::sync::Arc;

use checksums::stream::StreamChecksum;
use protocol::features::{Feature, FeatureFlags};
use protocol::wire::{FreeLength, ObjectRawFields, WireRecord};
use tracing::warn;

use crate::cancel::CancelToken;
use crate::queue::ByteQueueReceiver;
use crate::record::{Kind, Record, SPILL_BLKID};

/// Object id of the meta-dnode, whose per-block-id records become
/// `FREEOBJECTS` rather than `FREE`.
pub const META_DNODE_OBJECT: u64 = 0;

/// Legacy maximum block size; blocks larger than this are split into
/// multiple `WRITE` records unless `LARGE_BLOCKS` is negotiated.
pub const LEGACY_MAX_BLOCK_SIZE: u32 = 128 * 1024;

/// A byte sink the emission stage writes encoded records to.
pub trait Sink {
    /// Writes `bytes` to the sink.
    ///
    /// # Errors
    ///
    /// A nonzero/failed write becomes [`EngineError::SinkError`].
    fn write(&mut self, bytes: &[u8]) -> Result<(), EngineError>;
}

/// Reports whether `bp`'s embedded payload may be emitted as
/// `WRITE_EMBEDDED` under `features` (§9 embed eligibility, `send_do_embed`).
#[must_use]
pub fn embed_eligible(bp: &BlockPointer, features: FeatureFlags) -> bool {
    if !bp.embedded || bp.embed_type != EmbedType::Data {
        return false;
    }
    if !features.contains(Feature::EmbedData) {
        return false;
    }
    match bp.compression {
        OnDiskCompression::Legacy => true,
        OnDiskCompression::Lz4 => features.contains(Feature::Lz4),
        OnDiskCompression::Zstd => features.contains(Feature::Zstd),
        OnDiskCompression::Off => false,
    }
}

fn compression_code(c: OnDiskCompression) -> u8 {
    match c {
        OnDiskCompression::Off => 0,
        OnDiskCompression::Legacy => 1,
        OnDiskCompression::Lz4 => 2,
        OnDiskCompression::Zstd => 3,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingAgg {
    FreeObjects { first_object: u64, num_objects: u64 },
    Free { object: u64, offset: u64, length_end: FreeEnd },
    Redact { object: u64, offset: u64, length: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FreeEnd {
    Bytes(u64),
    ToEnd,
}

/// Drives the main emission stage over `rx`, writing encoded `WireRecord`s
/// to `sink` and folding the running checksum.
pub struct EmitStage<'a> {
    to_guid: u64,
    features: FeatureFlags,
    max_object_id: Option<u64>,
    allow_corrupt_data_fillers: bool,
    running: StreamChecksum,
    pending: Option<PendingAgg>,
    last_write: Option<(u64, u64)>,
    sink: &'a mut dyn Sink,
}

impl<'a> EmitStage<'a> {
    /// Builds a new emission stage writing to `sink`.
    pub fn new(
        to_guid: u64,
        features: FeatureFlags,
        max_object_id: Option<u64>,
        allow_corrupt_data_fillers: bool,
        sink: &'a mut dyn Sink,
    ) -> Self {
        Self {
            to_guid,
            features,
            max_object_id,
            allow_corrupt_data_fillers,
            running: StreamChecksum::new(),
            pending: None,
            last_write: None,
            sink,
        }
    }

    /// Pumps records from `rx` until `Eos`, then flushes and returns the
    /// final rolling checksum (for the caller to stamp into `END`).
    ///
    /// # Errors
    ///
    /// Returns the first [`EngineError`] encountered.
    pub fn run(
        &mut self,
        rx: &ByteQueueReceiver<Record>,
        cancel: &CancelToken,
    ) -> Result<[u64; 4], EngineError> {
        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Interrupted);
            }
            let record = rx.recv().map_err(|_| EngineError::Interrupted)?;
            if record.is_eos() {
                self.flush_pending()?;
                return Ok(self.running.finalize());
            }
            self.process(record)?;
        }
    }

    fn write_record(&mut self, record: &WireRecord) -> Result<(), EngineError> {
        let bytes = protocol::wire::fold_and_stamp(&mut self.running, record);
        self.sink.write(&bytes)
    }

    /// Writes the `BEGIN` record, folding it into the running checksum.
    /// Called by the orchestrator before pumping the body.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SinkError`] on a sink write failure.
    pub fn emit_begin(&mut self, begin: &WireRecord) -> Result<(), EngineError> {
        self.write_record(begin)
    }

    /// Writes the `END` record, folding it into the running checksum.
    /// Called by the orchestrator after [`EmitStage::run`] returns.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SinkError`] on a sink write failure.
    pub fn emit_end(&mut self, end: &WireRecord) -> Result<(), EngineError> {
        self.write_record(end)
    }

    fn flush_pending(&mut self) -> Result<(), EngineError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let record = match pending {
            PendingAgg::FreeObjects {
                first_object,
                num_objects,
            } => WireRecord::FreeObjects {
                first_object,
                num_objects,
                to_guid: self.to_guid,
            },
            PendingAgg::Free {
                object,
                offset,
                length_end,
            } => WireRecord::Free {
                object,
                offset,
                length: match length_end {
                    FreeEnd::Bytes(end) => FreeLength::Bytes(end - offset),
                    FreeEnd::ToEnd => FreeLength::ToEnd,
                },
            },
            PendingAgg::Redact {
                object,
                offset,
                length,
            } => WireRecord::Redact {
                object,
                offset,
                length,
                to_guid: self.to_guid,
            },
        };
        self.write_record(&record)
    }

    fn process(&mut self, record: Record) -> Result<(), EngineError> {
        match &record.kind {
            Kind::Object(body) => {
                self.flush_pending()?;
                // maxblkid is only carried explicitly on raw sends (§9 Open
                // Question); a non-raw receiver infers it from the trailing
                // FREE this record is always followed by.
                let raw = self.features.contains(Feature::Raw).then(|| ObjectRawFields {
                    indblkshift: 17,
                    nlevels: 1,
                    nblkptr: 3,
                    maxblkid: body.max_blkid,
                    raw_bonuslen: body.bonus.len() as u32,
                });
                self.write_record(&WireRecord::Object {
                    object: record.object,
                    dnode_type: body.dnode_type,
                    bonus_type: body.bonus_type,
                    block_size: body.block_size,
                    bonus_len: body.bonus.len() as u32,
                    dnode_slots: body.dnode_slots,
                    checksum_type: body.block_pointer.checksum_type,
                    compression: compression_code(body.block_pointer.compression),
                    has_spill: body.has_spill,
                    raw,
                    bonus: body.bonus.clone(),
                })?;
                // Trailing FREE after every OBJECT (§9), preserved verbatim
                // even if a later record immediately overwrites part of it.
                let offset = (body.max_blkid + 1) * u64::from(body.block_size);
                self.write_record(&WireRecord::Free {
                    object: record.object,
                    offset,
                    length: FreeLength::ToEnd,
                })
            }
            Kind::ObjectRange(body) => {
                self.flush_pending()?;
                self.write_record(&WireRecord::ObjectRange {
                    first_object: record.object,
                    num_slots: record.end_blkid - record.start_blkid,
                    to_guid: self.to_guid,
                    byteswap: body.byteswap,
                    salt: body.salt,
                    iv: body.iv,
                    mac: body.mac,
                })
            }
            Kind::Data(data) => self.emit_data(&record, data.clone()),
            Kind::Hole { .. } => self.aggregate_hole(&record),
            Kind::Redact { .. } => self.aggregate_redact(&record),
            Kind::PreviouslyRedacted | Kind::Eos => Ok(()),
        }
    }

    fn emit_data(
        &mut self,
        record: &Record,
        data: crate::record::Data,
    ) -> Result<(), EngineError> {
        self.flush_pending()?;

        let offset = record.start_blkid.saturating_mul(u64::from(data.logical_size));
        if let Some((last_object, last_offset)) = self.last_write {
            let monotone = record.object > last_object
                || (record.object == last_object && offset > last_offset);
            debug_assert!(
                record.start_blkid == SPILL_BLKID || monotone,
                "monotone emission order violated"
            );
        }
        if record.start_blkid != SPILL_BLKID {
            self.last_write = Some((record.object, offset));
        }

        let buf = match data.wait_ready() {
            Ok(buf) => buf,
            Err(detail) if self.allow_corrupt_data_fillers => {
                warn!(
                    object = record.object,
                    block_id = record.start_blkid,
                    detail = %detail,
                    "substituting zero-filled filler for corrupt block",
                );
                Arc::new(vec![0u8; data.logical_size as usize])
            }
            Err(detail) => {
                return Err(EngineError::CorruptionError {
                    object: record.object,
                    block_id: record.start_blkid,
                    detail: detail.to_string(),
                });
            }
        };

        if record.start_blkid == SPILL_BLKID {
            return self.write_record(&WireRecord::Spill {
                object: record.object,
                length: u64::from(data.logical_size),
                to_guid: self.to_guid,
                unmodified: data.spill_unmodified,
                raw: None,
                payload: (*buf).clone(),
            });
        }

        if embed_eligible(&data.block_pointer, self.features) {
            return self.write_record(&WireRecord::WriteEmbedded {
                object: record.object,
                offset,
                length: u64::from(data.logical_size),
                to_guid: self.to_guid,
                compression: compression_code(data.block_pointer.compression),
                embed_type: 1,
                lsize: data.block_pointer.lsize,
                psize: data.block_pointer.psize,
                payload: (*buf).clone(),
            });
        }

        if data.logical_size > LEGACY_MAX_BLOCK_SIZE && !self.features.contains(Feature::LargeBlocks)
        {
            for (chunk_index, chunk) in buf.chunks(LEGACY_MAX_BLOCK_SIZE as usize).enumerate() {
                self.write_record(&WireRecord::Write {
                    object: record.object,
                    dnode_type: 0,
                    offset: offset + (chunk_index as u64) * u64::from(LEGACY_MAX_BLOCK_SIZE),
                    to_guid: self.to_guid,
                    logical_size: chunk.len() as u32,
                    checksum_type: data.block_pointer.checksum_type,
                    dedup: data.block_pointer.has_dedup_capable_checksum(),
                    raw: None,
                    payload: chunk.to_vec(),
                })?;
            }
            return Ok(());
        }

        self.write_record(&WireRecord::Write {
            object: record.object,
            dnode_type: 0,
            offset,
            to_guid: self.to_guid,
            logical_size: data.logical_size,
            checksum_type: data.block_pointer.checksum_type,
            dedup: data.block_pointer.has_dedup_capable_checksum(),
            raw: None,
            payload: (*buf).clone(),
        })
    }

    fn aggregate_hole(&mut self, record: &Record) -> Result<(), EngineError> {
        let block_size = match &record.kind {
            Kind::Hole { block_size } => *block_size,
            _ => unreachable!(),
        };
        if record.object == META_DNODE_OBJECT {
            let first_object = record.start_blkid;
            let mut num_objects = record.end_blkid - record.start_blkid;
            if let Some(max) = self.max_object_id {
                let clamped_end = (record.end_blkid).min(max + 1);
                if clamped_end <= first_object {
                    return Ok(());
                }
                num_objects = clamped_end - first_object;
            }
            if let Some(PendingAgg::FreeObjects {
                first_object: pending_first,
                num_objects: pending_num,
            }) = self.pending
            {
                if pending_first + pending_num == first_object {
                    self.pending = Some(PendingAgg::FreeObjects {
                        first_object: pending_first,
                        num_objects: pending_num + num_objects,
                    });
                    return Ok(());
                }
                self.flush_pending()?;
            }
            self.pending = Some(PendingAgg::FreeObjects {
                first_object,
                num_objects,
            });
            return Ok(());
        }

        let offset = record.start_blkid * u64::from(block_size);
        let end = record.end_blkid * u64::from(block_size);
        if let Some(PendingAgg::Free {
            object,
            offset: pending_offset,
            length_end: FreeEnd::Bytes(pending_end),
        }) = self.pending
        {
            if object == record.object && pending_end == offset {
                self.pending = Some(PendingAgg::Free {
                    object,
                    offset: pending_offset,
                    length_end: FreeEnd::Bytes(end),
                });
                return Ok(());
            }
            self.flush_pending()?;
        } else {
            self.flush_pending()?;
        }
        self.pending = Some(PendingAgg::Free {
            object: record.object,
            offset,
            length_end: FreeEnd::Bytes(end),
        });
        Ok(())
    }

    fn aggregate_redact(&mut self, record: &Record) -> Result<(), EngineError> {
        let block_size = match &record.kind {
            Kind::Redact { block_size } => *block_size,
            _ => unreachable!(),
        };
        let offset = record.start_blkid * u64::from(block_size);
        let length = (record.end_blkid - record.start_blkid) * u64::from(block_size);
        if let Some(PendingAgg::Redact {
            object,
            offset: pending_offset,
            length: pending_length,
        }) = self.pending
        {
            if object == record.object && pending_offset + pending_length == offset {
                self.pending = Some(PendingAgg::Redact {
                    object,
                    offset: pending_offset,
                    length: pending_length + length,
                });
                return Ok(());
            }
            self.flush_pending()?;
        } else {
            self.flush_pending()?;
        }
        self.pending = Some(PendingAgg::Redact {
            object: record.object,
            offset,
            length,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::byte_queue;
    use core::blockptr::{BlockPointer, EmbedType, OnDiskCompression};

    struct VecSink(Vec<u8>);
    impl Sink for VecSink {
        fn write(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
            self.0.extend_from_slice(bytes);
            Ok(())
        }
    }

    fn bp() -> BlockPointer {
        BlockPointer {
            level: 0,
            birth_txg: 1,
            object_type: 19,
            compression: OnDiskCompression::Off,
            psize: 4096,
            lsize: 4096,
            checksum_type: 7,
            embedded: false,
            embed_type: EmbedType::None,
            protected: false,
            crypt: None,
            bp_redacted: false,
            byteswap: false,
            allocated: true,
        }
    }

    #[test]
    fn adjacent_holes_aggregate_into_one_free() {
        let (tx, rx) = byte_queue::<Record>(8, 1 << 20, 1 << 19);
        tx.send(Record {
            object: 5,
            start_blkid: 0,
            end_blkid: 1,
            kind: Kind::Hole { block_size: 4096 },
        })
        .unwrap();
        tx.send(Record {
            object: 5,
            start_blkid: 1,
            end_blkid: 2,
            kind: Kind::Hole { block_size: 4096 },
        })
        .unwrap();
        tx.send(Record::eos()).unwrap();
        drop(tx);

        let mut sink = VecSink(Vec::new());
        let mut stage = EmitStage::new(1, FeatureFlags::empty(), None, false, &mut sink);
        let cancel = CancelToken::new();
        stage.run(&rx, &cancel).unwrap();

        let (decoded, consumed) = WireRecord::decode(&sink.0).unwrap();
        assert_eq!(
            decoded,
            WireRecord::Free {
                object: 5,
                offset: 0,
                length: FreeLength::Bytes(8192),
            }
        );
        assert!(consumed < sink.0.len(), "checksum slot should follow");
    }

    #[test]
    fn object_range_precedes_its_objects_and_carries_crypt_params() {
        let (tx, rx) = byte_queue::<Record>(8, 1 << 20, 1 << 19);
        tx.send(Record {
            object: 64,
            start_blkid: 0,
            end_blkid: 1,
            kind: Kind::ObjectRange(crate::record::ObjectRangeBody {
                byteswap: false,
                salt: [1; 8],
                iv: [2; 12],
                mac: [3; 16],
            }),
        })
        .unwrap();
        tx.send(Record::eos()).unwrap();
        drop(tx);

        let mut sink = VecSink(Vec::new());
        let mut stage =
            EmitStage::new(1, FeatureFlags::empty().with(Feature::Raw), None, false, &mut sink);
        let cancel = CancelToken::new();
        stage.run(&rx, &cancel).unwrap();

        let (decoded, _) = WireRecord::decode(&sink.0).unwrap();
        match decoded {
            WireRecord::ObjectRange {
                first_object,
                num_slots,
                salt,
                iv,
                mac,
                ..
            } => {
                assert_eq!(first_object, 64);
                assert_eq!(num_slots, 1);
                assert_eq!(salt, [1; 8]);
                assert_eq!(iv, [2; 12]);
                assert_eq!(mac, [3; 16]);
            }
            other => panic!("expected ObjectRange, got {other:?}"),
        }
    }

    #[test]
    fn single_data_record_emits_write() {
        let (tx, rx) = byte_queue::<Record>(8, 1 << 20, 1 << 19);
        let data = crate::record::Data::new(bp(), 4096);
        data.resolve_cached(vec![1, 2, 3, 4]);
        tx.send(Record {
            object: 7,
            start_blkid: 2,
            end_blkid: 3,
            kind: Kind::Data(data),
        })
        .unwrap();
        tx.send(Record::eos()).unwrap();
        drop(tx);

        let mut sink = VecSink(Vec::new());
        let mut stage = EmitStage::new(1, FeatureFlags::empty(), None, false, &mut sink);
        let cancel = CancelToken::new();
        stage.run(&rx, &cancel).unwrap();

        let (decoded, _) = WireRecord::decode(&sink.0).unwrap();
        match decoded {
            WireRecord::Write { object, offset, payload, .. } => {
                assert_eq!(object, 7);
                assert_eq!(offset, 2 * 4096);
                assert_eq!(payload, vec![1, 2, 3, 4]);
            }
            other => panic!("expected Write, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_read_aborts_by_default() {
        let (tx, rx) = byte_queue::<Record>(8, 1 << 20, 1 << 19);
        let data = crate::record::Data::new(bp(), 4096);
        data.begin_read();
        data.fail_read("checksum mismatch");
        tx.send(Record {
            object: 7,
            start_blkid: 0,
            end_blkid: 1,
            kind: Kind::Data(data),
        })
        .unwrap();
        tx.send(Record::eos()).unwrap();
        drop(tx);

        let mut sink = VecSink(Vec::new());
        let mut stage = EmitStage::new(1, FeatureFlags::empty(), None, false, &mut sink);
        let cancel = CancelToken::new();
        let err = stage.run(&rx, &cancel).unwrap_err();
        assert!(matches!(err, EngineError::CorruptionError { object: 7, block_id: 0, .. }));
    }

    #[test]
    fn corrupt_read_substitutes_zero_filler_when_allowed() {
        let (tx, rx) = byte_queue::<Record>(8, 1 << 20, 1 << 19);
        let data = crate::record::Data::new(bp(), 4096);
        data.begin_read();
        data.fail_read("checksum mismatch");
        tx.send(Record {
            object: 7,
            start_blkid: 0,
            end_blkid: 1,
            kind: Kind::Data(data),
        })
        .unwrap();
        tx.send(Record::eos()).unwrap();
        drop(tx);

        let mut sink = VecSink(Vec::new());
        let mut stage = EmitStage::new(1, FeatureFlags::empty(), None, true, &mut sink);
        let cancel = CancelToken::new();
        stage.run(&rx, &cancel).unwrap();

        let (decoded, _) = WireRecord::decode(&sink.0).unwrap();
        match decoded {
            WireRecord::Write { object, payload, .. } => {
                assert_eq!(object, 7);
                assert_eq!(payload, vec![0u8; 4096]);
            }
            other => panic!("expected Write, got {other:?}"),
        }
    }
}
