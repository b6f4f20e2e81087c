//! Reader/prefetch stage (§4.5): resolves block pointers and issues reads
//! for records the main stage will need a buffer for, and resolves
//! `PreviouslyRedacted` spans against the TO dataset.

use core::error::EngineError;

use crate::cancel::CancelToken;
use crate::pool::BlockStore;
use crate::queue::{ByteQueueReceiver, ByteQueueSender};
use crate::record::{Kind, Record};

/// Runs the reader stage to completion, forwarding records from `rx` to `tx`.
///
/// # Errors
///
/// Returns the first [`EngineError`] encountered; always forwards `Eos`
/// before returning, even on error.
pub fn run(
    pool: &dyn BlockStore,
    rx: &ByteQueueReceiver<Record>,
    tx: &ByteQueueSender<Record>,
    cancel: &CancelToken,
) -> Result<(), EngineError> {
    let result = pump(pool, rx, tx, cancel);
    let _ = tx.send(Record::eos());
    result
}

fn pump(
    pool: &dyn BlockStore,
    rx: &ByteQueueReceiver<Record>,
    tx: &ByteQueueSender<Record>,
    cancel: &CancelToken,
) -> Result<(), EngineError> {
    loop {
        if cancel.is_cancelled() {
            return Err(EngineError::Interrupted);
        }
        let record = rx.recv().map_err(|_| EngineError::Interrupted)?;
        if record.is_eos() {
            return Ok(());
        }

        match record.kind {
            Kind::Data(ref data) => {
                data.begin_read();
                match pool.read_block(record.object, record.start_blkid) {
                    Ok(buf) => data.complete_read(buf),
                    Err(err) => {
                        data.fail_read(err.to_string());
                    }
                }
                if tx.send(record).is_err() {
                    return Err(EngineError::Interrupted);
                }
            }
            Kind::PreviouslyRedacted => {
                match pool.resolve_previously_redacted(
                    record.object,
                    record.start_blkid,
                    record.end_blkid,
                )? {
                    None => {} // object no longer exists at TO: drop
                    Some(entries) => {
                        for entry in entries {
                            let kind = match entry.block_pointer {
                                None => Kind::Hole {
                                    block_size: entry.block_size,
                                },
                                Some(bp) => {
                                    let data = crate::record::Data::new(bp, entry.block_size);
                                    data.begin_read();
                                    match pool.read_block(record.object, entry.block_id) {
                                        Ok(buf) => data.complete_read(buf),
                                        Err(err) => data.fail_read(err.to_string()),
                                    }
                                    Kind::Data(data)
                                }
                            };
                            let resolved = Record {
                                object: record.object,
                                start_blkid: entry.block_id,
                                end_blkid: entry.block_id + 1,
                                kind,
                            };
                            if tx.send(resolved).is_err() {
                                return Err(EngineError::Interrupted);
                            }
                        }
                    }
                }
            }
            _ => {
                if tx.send(record).is_err() {
                    return Err(EngineError::Interrupted);
                }
            }
        }
    }
}
