//! FROM-list and REDACT-list stages (§4.3).
//!
//! Both stages iterate an ordered [`RedactionList`] and emit one record per
//! entry, terminated by `Eos`; an absent list is modeled as an empty one so
//! both stages always produce at least the sentinel.

use core::dataset::RedactionList;

use crate::queue::ByteQueueSender;
use crate::record::{Kind, Record};

/// Runs the REDACT-list stage, emitting `Redact` records.
pub fn run_redact(list: Option<&RedactionList>, tx: &ByteQueueSender<Record>) {
    if let Some(list) = list {
        for entry in list.entries() {
            let record = Record {
                object: entry.object,
                start_blkid: entry.block_id,
                end_blkid: entry.end_block_id(),
                kind: Kind::Redact {
                    block_size: entry.block_size,
                },
            };
            if tx.send(record).is_err() {
                return;
            }
        }
    }
    let _ = tx.send(Record::eos());
}

/// Runs the FROM-list stage, emitting `PreviouslyRedacted` records.
pub fn run_from(list: Option<&RedactionList>, tx: &ByteQueueSender<Record>) {
    if let Some(list) = list {
        for entry in list.entries() {
            let record = Record {
                object: entry.object,
                start_blkid: entry.block_id,
                end_blkid: entry.end_block_id(),
                kind: Kind::PreviouslyRedacted,
            };
            if tx.send(record).is_err() {
                return;
            }
        }
    }
    let _ = tx.send(Record::eos());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::byte_queue;
    use core::dataset::RedactionEntry;

    #[test]
    fn empty_list_emits_only_eos() {
        let (tx, rx) = byte_queue::<Record>(8, 1 << 20, 1 << 19);
        run_redact(None, &tx);
        assert!(rx.recv().unwrap().is_eos());
    }

    #[test]
    fn redact_stage_emits_one_record_per_entry() {
        let list = RedactionList::new(
            1,
            vec![RedactionEntry {
                object: 3,
                block_id: 0,
                span_in_blocks: 2,
                block_size: 4096,
            }],
        );
        let (tx, rx) = byte_queue::<Record>(8, 1 << 20, 1 << 19);
        run_redact(Some(&list), &tx);
        let first = rx.recv().unwrap();
        assert_eq!((first.object, first.start_blkid, first.end_blkid), (3, 0, 2));
        assert!(matches!(first.kind, Kind::Redact { block_size: 4096 }));
        assert!(rx.recv().unwrap().is_eos());
    }
}
