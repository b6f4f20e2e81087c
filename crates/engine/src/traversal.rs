//! TO-traversal stage (§4.2): pre-order walk of the source dataset emitting
//! `Object`, `ObjectRange`, `Data`, `Hole`, and `Redact` records in canonical
//! order, terminated by `Eos`.

use core::dataset::DatasetHandle;
use core::error::EngineError;

use tracing::{info_span, warn};

use crate::cancel::CancelToken;
use crate::pool::BlockStore;
use crate::queue::ByteQueueSender;
use crate::record::{Data, Kind, ObjectBody, Record, SPILL_BLKID};

/// Runs the TO-traversal stage to completion, sending records to `tx`.
///
/// Dnodes whose object id is below `resume_object` are skipped entirely
/// rather than re-walked (§9 resume skip). Unmodified spill blocks are
/// synthesized as an extra `Data` record immediately after `Object` when
/// `send_unmodified_spill_blocks` permits it.
///
/// # Errors
///
/// Returns the first [`EngineError`] the block store reports; always sends
/// `Eos` before returning, even on error.
pub fn run(
    pool: &dyn BlockStore,
    handle: &DatasetHandle,
    from_txg: u64,
    resume_object: u64,
    send_unmodified_spill_blocks: bool,
    tx: &ByteQueueSender<Record>,
    cancel: &CancelToken,
) -> Result<(), EngineError> {
    let span = info_span!("to_traversal", to_guid = handle.guid, from_txg);
    let _enter = span.enter();

    let result = walk(
        pool,
        handle,
        from_txg,
        resume_object,
        send_unmodified_spill_blocks,
        tx,
        cancel,
    );
    let _ = tx.send(Record::eos());
    result
}

fn walk(
    pool: &dyn BlockStore,
    handle: &DatasetHandle,
    from_txg: u64,
    resume_object: u64,
    send_unmodified_spill_blocks: bool,
    tx: &ByteQueueSender<Record>,
    cancel: &CancelToken,
) -> Result<(), EngineError> {
    let objects = pool.objects(handle, from_txg, resume_object)?;

    for entry in objects {
        if cancel.is_cancelled() {
            return Err(EngineError::Interrupted);
        }
        if entry.object < resume_object {
            // Covered by the resume cursor; the gap is at most one
            // dnode-block's worth of objects (§9).
            continue;
        }

        let object_record = Record {
            object: entry.object,
            start_blkid: 0,
            end_blkid: entry.max_blkid.saturating_add(1),
            kind: Kind::Object(ObjectBody {
                block_pointer: entry.block_pointer,
                dnode_type: entry.dnode_type,
                bonus_type: entry.bonus_type,
                block_size: entry.block_size,
                bonus: entry.bonus,
                dnode_slots: entry.dnode_slots,
                has_spill: entry.has_spill,
                max_blkid: entry.max_blkid,
            }),
        };
        if tx.send(object_record).is_err() {
            return Err(EngineError::Interrupted);
        }

        if entry.has_spill && send_unmodified_spill_blocks && entry.spill_unmodified {
            if let Some(spill) = &entry.spill {
                if let Some(bp) = spill.block_pointer.clone() {
                    let data = Data::new(bp, spill.block_size).with_spill_unmodified();
                    data.resolve_cached(Vec::new());
                    let spill_record = Record {
                        object: entry.object,
                        start_blkid: SPILL_BLKID,
                        end_blkid: SPILL_BLKID + 1,
                        kind: Kind::Data(data),
                    };
                    if tx.send(spill_record).is_err() {
                        return Err(EngineError::Interrupted);
                    }
                }
            } else {
                warn!(object = entry.object, "has_spill set with no spill entry");
            }
        }

        for block in entry.blocks {
            if cancel.is_cancelled() {
                return Err(EngineError::Interrupted);
            }
            let kind = match block.block_pointer {
                None => Kind::Hole {
                    block_size: block.block_size,
                },
                Some(bp) if bp.bp_redacted => Kind::Redact {
                    block_size: block.block_size,
                },
                Some(bp) => Kind::Data(Data::new(bp, block.block_size)),
            };
            let record = Record {
                object: entry.object,
                start_blkid: block.block_id,
                end_blkid: block.block_id + 1,
                kind,
            };
            if tx.send(record).is_err() {
                return Err(EngineError::Interrupted);
            }
        }
    }

    Ok(())
}
