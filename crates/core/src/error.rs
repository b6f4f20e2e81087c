//! Error taxonomy shared by every stage of the send-stream engine.
//!
//! Every stage reports failures through [`EngineError`] rather than ad-hoc
//! error types so the orchestrator can apply one propagation rule (see
//! [`crate::error`] module docs): the first non-[`EngineError::Interrupted`]
//! error observed becomes the send's final result.

use std::fmt;
use std::io;

use thiserror::Error;

/// The eight semantic error kinds a send can report.
///
/// These are *kinds*, not concrete exception types: several stages can
/// produce the same kind for different underlying reasons, and the
/// orchestrator only distinguishes between them to decide what to tell the
/// caller, not to decide how to recover (recovery, if any, happens inside
/// the stage that hit the error).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid argument: a bad bookmark, a missing snapshot, or an illegal
    /// feature-flag combination requested by the caller.
    #[error("invalid argument: {0}")]
    CallerError(String),

    /// The dataset or bookmark was removed after the engine's initial hold.
    #[error("{kind} {name:?} was removed after it was held")]
    NotFound {
        /// What kind of catalog object disappeared (`"dataset"`, `"bookmark"`).
        kind: &'static str,
        /// Name or identifier of the missing object.
        name: String,
    },

    /// Resume metadata could not be read because of a space or quota
    /// failure surfaced by the catalog collaborator.
    #[error("space or quota error resolving resume metadata: {0}")]
    SpaceOrQuota(String),

    /// An underlying block read failed.
    #[error("I/O error reading block ({object}, level {level}, id {block_id}): {source}")]
    IoError {
        /// Object id the failing read belonged to.
        object: u64,
        /// Tree level of the failing block.
        level: u8,
        /// Block id of the failing read.
        block_id: u64,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// A block pointer failed its checksum or encryption authenticity check.
    #[error("corruption detected at object {object}, block {block_id}: {detail}")]
    CorruptionError {
        /// Object id of the corrupt block.
        object: u64,
        /// Block id of the corrupt block.
        block_id: u64,
        /// Human-readable description of what failed (checksum mismatch,
        /// authentication tag mismatch, etc).
        detail: String,
    },

    /// The stage observed its cancel flag set by the orchestrator or a
    /// sibling stage, and stopped without producing a concrete error of its
    /// own.
    #[error("send interrupted")]
    Interrupted,

    /// The caller-supplied sink callback returned a nonzero status.
    #[error("sink rejected write: {0}")]
    SinkError(String),

    /// An illegal feature-flag combination was requested or negotiated
    /// (e.g. `LARGE_MICROZAP` without `LARGE_BLOCKS`).
    #[error("protocol error: {0}")]
    ProtocolError(String),
}

impl EngineError {
    /// Reports whether this error is [`EngineError::Interrupted`].
    ///
    /// The orchestrator uses this to implement its "first concrete error
    /// wins" propagation rule: an `Interrupted` observed from one stage must
    /// not mask a concrete error already recorded by another.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Accumulates the first non-interrupted error observed across stages.
///
/// Mirrors the orchestrator's propagation rule from the specification: once
/// a concrete error is recorded, later `Interrupted` reports (which every
/// other stage produces once cancellation propagates) are discarded, and
/// later concrete errors are discarded too since only the first is kept.
#[derive(Debug, Default)]
pub struct FirstError {
    slot: Option<EngineError>,
}

impl FirstError {
    /// Creates an empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self { slot: None }
    }

    /// Records `err` if no concrete error has been recorded yet.
    ///
    /// An `Interrupted` error is recorded only if the slot is still empty;
    /// it never overwrites a concrete error, and a concrete error always
    /// overwrites a previously recorded `Interrupted`.
    pub fn record(&mut self, err: EngineError) {
        match &self.slot {
            None => self.slot = Some(err),
            Some(existing) if existing.is_interrupted() && !err.is_interrupted() => {
                self.slot = Some(err);
            }
            Some(_) => {}
        }
    }

    /// Consumes the accumulator, returning the recorded error if any.
    #[must_use]
    pub fn into_inner(self) -> Option<EngineError> {
        self.slot
    }

    /// Reports whether any error (including `Interrupted`) was recorded.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.slot.is_some()
    }
}

impl fmt::Display for FirstError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.slot {
            Some(err) => write!(f, "{err}"),
            None => write!(f, "no error recorded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_keeps_first_concrete_error() {
        let mut acc = FirstError::new();
        acc.record(EngineError::Interrupted);
        acc.record(EngineError::SinkError("disk full".into()));
        acc.record(EngineError::Interrupted);
        match acc.into_inner() {
            Some(EngineError::SinkError(msg)) => assert_eq!(msg, "disk full"),
            other => panic!("expected SinkError, got {other:?}"),
        }
    }

    #[test]
    fn first_error_reports_interrupted_when_nothing_else_seen() {
        let mut acc = FirstError::new();
        acc.record(EngineError::Interrupted);
        assert!(matches!(acc.into_inner(), Some(EngineError::Interrupted)));
    }

    #[test]
    fn first_error_does_not_overwrite_earlier_concrete_error() {
        let mut acc = FirstError::new();
        acc.record(EngineError::ProtocolError("bad flags".into()));
        acc.record(EngineError::SinkError("disk full".into()));
        match acc.into_inner() {
            Some(EngineError::ProtocolError(msg)) => assert_eq!(msg, "bad flags"),
            other => panic!("expected ProtocolError, got {other:?}"),
        }
    }
}
