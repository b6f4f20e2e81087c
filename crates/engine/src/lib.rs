#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `engine` is the five-stage concurrent pipeline that walks a dataset,
//! merges it against optional FROM/REDACT redaction lists, resolves block
//! reads, and emits an on-wire replay stream through [`protocol::wire`].
//! [`orchestrator::send_obj`]/[`orchestrator::send_named`] are the only
//! entry points a caller needs.
//!
//! # Design
//!
//! Five `std::thread::spawn`ed stages communicate over
//! [`queue::ByteQueue`]s sized in bytes of payload, not entry count:
//!
//! ```text
//!   traversal   ─┐
//!                ├──► merge ──► reader ──► emit (caller's thread)
//!   redaction(from)
//!   redaction(redact)
//! ```
//!
//! [`merge::MergeStage`] implements the canonical-order tie-break and
//! truncate-in-place algorithm; [`emit::EmitStage`] owns the single pending-
//! aggregation slot and the running [`checksums::stream::StreamChecksum`].
//! The out-of-scope block pool is modeled as [`pool::BlockStore`].
//!
//! # Invariants
//!
//! - Exactly one `Eos` terminates every queue (§3.2's ownership rules).
//! - [`record::Record::order_key`] is the single source of truth for
//!   canonical order everywhere a stage compares two records.
//!
//! # Errors
//!
//! [`core::error::EngineError`] is shared by every stage;
//! [`core::error::FirstError`] implements the orchestrator's "first
//! concrete error wins" propagation rule.
//!
//! # Examples
//!
//! See the `engine` integration tests for a full `send_obj` walkthrough
//! against an in-memory `BlockStore` fixture.
//!
//! # See also
//!
//! - [`protocol`] for the wire format this crate writes.
//! - [`core`] for the shared types and configuration.

pub mod cancel;
pub mod emit;
pub mod merge;
pub mod orchestrator;
pub mod pool;
pub mod queue;
pub mod reader;
pub mod record;
pub mod redaction;
pub mod traversal;
