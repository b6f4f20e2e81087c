//! Orchestrator (§4.7): resolves feature flags, spawns the pipeline stages,
//! pumps the main emission stage, and propagates cancellation/errors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use core::config::EngineConfig;
use core::dataset::{DatasetHandle, RedactionList};
use core::error::{EngineError, FirstError};

use protocol::features::{Feature, FeatureFlags};
use protocol::wire::{BeginPayload, WireRecord};
use tracing::{error, info, info_span};

use crate::cancel::CancelToken;
use crate::emit::{EmitStage, Sink};
use crate::merge::MergeStage;
use crate::pool::BlockStore;
use crate::queue::byte_queue;
use crate::record::Record;
use crate::{reader, redaction, traversal};

/// Caller-supplied send options (§6.3), matching the reference
/// implementation's enumerated (not raw-flag) options surface.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Permit `EMBED_DATA`.
    pub embed_ok: bool,
    /// Permit `LARGE_BLOCKS` (implied by `raw_ok`).
    pub large_block_ok: bool,
    /// Permit `COMPRESSED` (implied by `raw_ok`).
    pub compress_ok: bool,
    /// Raw send of an encrypted dataset.
    pub raw_ok: bool,
    /// This is a resumable partial send; omit `END` on success.
    pub saved_ok: bool,
    /// Resume cursor: object id.
    pub resume_obj: Option<u64>,
    /// Resume cursor: byte offset.
    pub resume_off: Option<u64>,
    /// Permit `ZSTD`-compressed payloads.
    pub zstd_ok: bool,
    /// Permit `LARGE_DNODE`.
    pub large_dnode_ok: bool,
    /// Wrapped encryption key material for a raw send of an encrypted
    /// dataset, carried verbatim in `BEGIN`'s `crypt_keydata` key.
    pub crypt_keydata: Option<Vec<u8>>,
}

impl SendOptions {
    fn feature_flags(&self) -> FeatureFlags {
        let mut flags = FeatureFlags::empty();
        if self.embed_ok {
            flags = flags.with(Feature::EmbedData);
        }
        if self.large_block_ok || self.raw_ok {
            flags = flags.with(Feature::LargeBlocks);
        }
        if self.compress_ok || self.raw_ok {
            flags = flags.with(Feature::Compressed);
            flags = flags.with(Feature::Lz4);
        }
        if self.raw_ok {
            flags = flags.with(Feature::Raw);
        }
        if self.resume_obj.is_some() {
            flags = flags.with(Feature::Resuming);
        }
        if self.zstd_ok {
            flags = flags.with(Feature::Zstd);
        }
        if self.large_dnode_ok {
            flags = flags.with(Feature::LargeDnode);
        }
        flags = flags.with(Feature::SaSpill);
        flags
    }
}

/// Cumulative block counter mutated by the main stage after each successful
/// sink write, so a caller can checkpoint progress.
pub type ProgressCursor = AtomicU64;

/// Sends `to`, optionally incremental from `from`, to `sink`.
///
/// Long-holds `to` and, if present, the redaction lists, for the duration of
/// the call; releases them (by dropping the borrows) before returning.
///
/// # Errors
///
/// Returns the first non-[`EngineError::Interrupted`] error observed by any
/// stage; `Interrupted` only if no concrete error was observed.
#[allow(clippy::too_many_arguments)]
pub fn send_obj(
    pool: &dyn BlockStore,
    to: &DatasetHandle,
    from: Option<&DatasetHandle>,
    redact_list: Option<&RedactionList>,
    from_redact_list: Option<&RedactionList>,
    options: &SendOptions,
    sink: &mut dyn Sink,
    progress: Option<&ProgressCursor>,
    cfg: &EngineConfig,
) -> Result<(), EngineError> {
    let span = info_span!("send", to_guid = to.guid);
    let _enter = span.enter();

    let mut features = options.feature_flags();
    if redact_list.is_some() {
        features = features.with(Feature::Redacted);
    }
    features.validate().map_err(|e| EngineError::ProtocolError(e.to_string()))?;

    let from_txg = from.map_or(0, |f| f.creation_txg);
    let resume_object = options.resume_obj.unwrap_or(0);

    let cancel = CancelToken::new();
    let mut errors = FirstError::new();

    let (to_tx, to_rx) = byte_queue::<Record>(256, cfg.queue_byte_cap, cfg.fill_threshold_bytes());
    let (from_tx, from_rx) =
        byte_queue::<Record>(256, cfg.queue_byte_cap, cfg.fill_threshold_bytes());
    let (redact_tx, redact_rx) =
        byte_queue::<Record>(256, cfg.queue_byte_cap, cfg.fill_threshold_bytes());
    let (merge_tx, merge_rx) =
        byte_queue::<Record>(256, cfg.queue_byte_cap, cfg.fill_threshold_bytes());
    let (reader_tx, reader_rx) =
        byte_queue::<Record>(256, cfg.queue_byte_cap, cfg.fill_threshold_bytes());

    let begin = WireRecord::Begin {
        feature_flags: features.bits(),
        to_guid: to.guid,
        from_guid: from.map_or(0, |f| f.guid),
        to_name: to.identity.clone(),
        payload: BeginPayload {
            redact_snaps: Vec::new(),
            redact_from_snaps: Vec::new(),
            resume: match (options.resume_obj, options.resume_off) {
                (Some(obj), Some(off)) => Some((obj, off)),
                _ => None,
            },
            crypt_keydata: options.crypt_keydata.clone(),
        },
    };

    let mut emit = EmitStage::new(
        to.guid,
        features,
        cfg.max_object_id,
        cfg.allow_corrupt_data_fillers,
        sink,
    );
    emit.emit_begin(&begin)?;

    let checksum_result = thread::scope(|scope| {
        let to_cancel = cancel.clone();
        let to_pool = pool;
        let to_handle = scope.spawn(move || {
            traversal::run(
                to_pool,
                to,
                from_txg,
                resume_object,
                cfg.send_unmodified_spill_blocks,
                &to_tx,
                &to_cancel,
            )
        });

        let from_handle = scope.spawn(move || redaction::run_from(from_redact_list, &from_tx));

        let redact_handle = scope.spawn(move || redaction::run_redact(redact_list, &redact_tx));

        let merge_cancel = cancel.clone();
        let merge_handle = scope.spawn(move || {
            let mut stage = MergeStage::new(to_rx, from_rx, redact_rx);
            loop {
                if merge_cancel.is_cancelled() {
                    let _ = merge_tx.send(Record::eos());
                    return Err(EngineError::Interrupted);
                }
                match stage.next_range() {
                    Ok(Some(record)) => {
                        if merge_tx.send(record).is_err() {
                            return Err(EngineError::Interrupted);
                        }
                    }
                    Ok(None) => {
                        let _ = merge_tx.send(Record::eos());
                        return Ok(());
                    }
                    Err(err) => {
                        let _ = merge_tx.send(Record::eos());
                        return Err(err);
                    }
                }
            }
        });

        let reader_cancel = cancel.clone();
        let reader_pool = pool;
        let reader_handle =
            scope.spawn(move || reader::run(reader_pool, &merge_rx, &reader_tx, &reader_cancel));

        let final_checksum = emit.run(&reader_rx, &cancel);
        if final_checksum.is_ok() {
            if let Some(cursor) = progress {
                cursor.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            cancel.cancel();
        }

        if let Err(err) = to_handle.join().unwrap_or(Err(EngineError::Interrupted)) {
            errors.record(err);
        }
        from_handle.join().ok();
        redact_handle.join().ok();
        if let Err(err) = merge_handle.join().unwrap_or(Err(EngineError::Interrupted)) {
            errors.record(err);
        }
        if let Err(err) = reader_handle.join().unwrap_or(Err(EngineError::Interrupted)) {
            errors.record(err);
        }

        final_checksum
    });

    match checksum_result {
        Ok(checksum) if !errors.is_set() => {
            if !options.saved_ok {
                emit.emit_end(&WireRecord::End {
                    checksum,
                    to_guid: to.guid,
                })?;
            }
            info!("send completed");
        }
        Ok(_) => cancel.cancel(),
        Err(err) => {
            cancel.cancel();
            errors.record(err);
        }
    }

    if let Some(err) = errors.into_inner() {
        error!(%err, "send failed");
        return Err(err);
    }
    Ok(())
}

/// Sends a dataset resolved by name through the catalog.
///
/// The dataset/bookmark catalog is an out-of-scope collaborator (§1); this
/// entry point exists for API parity with the reference implementation's
/// by-name/by-object split, and simply forwards to [`send_obj`] with
/// already-resolved handles.
#[allow(clippy::too_many_arguments)]
pub fn send_named(
    pool: &dyn BlockStore,
    to: &DatasetHandle,
    from: Option<&DatasetHandle>,
    redact_list: Option<&RedactionList>,
    from_redact_list: Option<&RedactionList>,
    options: &SendOptions,
    sink: &mut dyn Sink,
    progress: Option<&ProgressCursor>,
    cfg: &EngineConfig,
) -> Result<(), EngineError> {
    send_obj(
        pool,
        to,
        from,
        redact_list,
        from_redact_list,
        options,
        sink,
        progress,
        cfg,
    )
}
