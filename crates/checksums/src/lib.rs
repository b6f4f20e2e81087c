#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `checksums` implements the whole-stream running checksum used by the
//! send-stream engine.
//!
//! # Design
//!
//! [`stream`] implements the four-word running checksum folded over every
//! record written to the stream, so a receiver (or, here, the
//! self-consistency tests) can detect truncation or reordering. This is the
//! one on-wire checksum the engine needs; per-block digest verification
//! (`BlockPointer::checksum_type`) belongs to the out-of-scope block pool
//! collaborator, not to this crate.
//!
//! # Invariants
//!
//! - [`stream::StreamChecksum`] folds data strictly in the order it is
//!   presented; out-of-order folding produces a different result, which is
//!   the property the stream checksum exists to exploit.
//!
//! # Examples
//!
//! Fold two records into the running stream checksum.
//!
//! ```
//! use checksums::stream::StreamChecksum;
//!
//! let mut cksum = StreamChecksum::new();
//! cksum.update(b"record header");
//! cksum.update(b"record payload");
//! let folded = cksum.finalize();
//! assert_ne!(folded, [0; 4]);
//! ```
//!
//! # See also
//!
//! - [`protocol`] for the wire records whose headers get folded into the
//!   stream checksum.

pub mod stream;
