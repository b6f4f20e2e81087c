#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `protocol` implements the on-wire replay record format the main emission
//! stage writes to the sink, and the feature-flag set negotiated into the
//! `BEGIN` record. It knows nothing about threads, queues, or the block
//! pool; those live in [`engine`](../engine/index.html).
//!
//! # Design
//!
//! [`wire`] models the ten replay record kinds as one Rust enum rather than
//! a tagged union, with [`wire::WireRecord::encode`]/[`wire::WireRecord::decode`]
//! providing a self-consistent (not receiver-interoperable) byte
//! representation good enough for the engine's own re-parse tests.
//! [`features`] models the feature bitmask as a small newtype with an
//! explicit illegal-combination check, rather than a raw `u64` passed
//! around uninterpreted.
//!
//! # Invariants
//!
//! - Every [`wire::WireRecord`] except `BEGIN` carries a trailing 32-byte
//!   checksum slot, folded by [`wire::fold_and_stamp`] with the slot itself
//!   zeroed during folding (matching invariant §3.2-6 of the data model).
//! - [`features::FeatureFlags::validate`] rejects `LARGE_MICROZAP` without
//!   `LARGE_BLOCKS` before a `BEGIN` record is ever built.
//!
//! # Errors
//!
//! [`wire::WireError`] reports truncated or malformed byte streams;
//! [`features::FeatureError`] reports illegal feature combinations.
//!
//! # Examples
//!
//! ```
//! use protocol::wire::{BeginPayload, WireRecord};
//!
//! let begin = WireRecord::Begin {
//!     feature_flags: 0,
//!     to_guid: 1,
//!     from_guid: 0,
//!     to_name: "tank/data@snap".to_owned(),
//!     payload: BeginPayload::default(),
//! };
//! let (decoded, consumed) = WireRecord::decode(&begin.encode()).unwrap();
//! assert_eq!(decoded, begin);
//! assert_eq!(consumed, begin.encode().len());
//! ```
//!
//! # See also
//!
//! - [`core`] for the block pointer and error types this crate's records
//!   are built from.
//! - [`checksums`] for the running stream checksum folded over every record.

pub mod features;
pub mod wire;
