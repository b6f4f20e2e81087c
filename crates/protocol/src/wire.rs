//! On-wire replay record format.
//!
//! A stream is a sequence of fixed-layout record headers, each optionally
//! followed by a payload whose length the header declares. Every record
//! except [`WireRecord::Begin`] carries the rolling checksum-so-far in a
//! trailing 32-byte slot, folded by [`checksums::stream::StreamChecksum`]
//! over the header and payload with the slot itself zeroed.

use thiserror::Error;

use checksums::stream::StreamChecksum;

/// Length of a `FREE`/`SPILL` payload, distinguishing a finite byte count
/// from "to the end of the object" so aggregation code never merges the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeLength {
    /// A finite number of bytes.
    Bytes(u64),
    /// Extends to the end of the object (the reference sentinel `UINT64_MAX`).
    ToEnd,
}

impl FreeLength {
    const SENTINEL: u64 = u64::MAX;

    fn to_wire(self) -> u64 {
        match self {
            Self::Bytes(n) => n,
            Self::ToEnd => Self::SENTINEL,
        }
    }

    fn from_wire(raw: u64) -> Self {
        if raw == Self::SENTINEL {
            Self::ToEnd
        } else {
            Self::Bytes(raw)
        }
    }
}

/// The four `BEGIN` payload keys modeled, standing in for full nvlist
/// semantics (out of scope; see the crate's module documentation).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeginPayload {
    /// Guids of snapshots the source endpoint was redacted against.
    pub redact_snaps: Vec<u64>,
    /// Guids of snapshots the `from` endpoint was redacted against.
    pub redact_from_snaps: Vec<u64>,
    /// Resume cursor, present iff `RESUMING` is negotiated.
    pub resume: Option<(u64, u64)>,
    /// Wrapped key material, present on raw sends of encrypted datasets.
    pub crypt_keydata: Option<Vec<u8>>,
}

/// One record of the on-wire replay stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireRecord {
    /// Stream header: feature flags, endpoint guids, and the nvlist-equivalent
    /// payload.
    Begin {
        /// Negotiated feature bitmask.
        feature_flags: u64,
        /// Guid of the dataset version being sent.
        to_guid: u64,
        /// Guid of the `from` endpoint, or `0` for a full send.
        from_guid: u64,
        /// Name of the `to` endpoint, for diagnostics.
        to_name: String,
        /// The nvlist-equivalent payload.
        payload: BeginPayload,
    },
    /// Stream trailer.
    End {
        /// Final rolling checksum.
        checksum: [u64; 4],
        /// Guid of the `to` endpoint, repeated for receiver validation.
        to_guid: u64,
    },
    /// A full dnode.
    Object {
        /// Object id.
        object: u64,
        /// Dnode type.
        dnode_type: u32,
        /// Bonus buffer type.
        bonus_type: u32,
        /// Logical block size in bytes.
        block_size: u32,
        /// Bonus buffer length.
        bonus_len: u32,
        /// Number of 512-byte dnode slots (>1 only with `LARGE_DNODE`).
        dnode_slots: u32,
        /// Checksum algorithm recorded on the dnode's block pointer.
        checksum_type: u8,
        /// On-disk compression recorded on the dnode's block pointer.
        compression: u8,
        /// The dnode has a spill block.
        has_spill: bool,
        /// Raw-send-only fields; `None` on non-raw sends.
        raw: Option<ObjectRawFields>,
        /// Bonus buffer bytes.
        bonus: Vec<u8>,
    },
    /// One encrypted dnode block, raw sends only.
    ObjectRange {
        /// First object id covered.
        first_object: u64,
        /// Number of dnode slots covered.
        num_slots: u64,
        /// Guid of the `to` endpoint.
        to_guid: u64,
        /// The block's on-disk endianness differs from the receiver's.
        byteswap: bool,
        /// Per-block salt.
        salt: [u8; 8],
        /// Initialization vector.
        iv: [u8; 12],
        /// Message authentication code.
        mac: [u8; 16],
    },
    /// A contiguous span of freed object ids.
    FreeObjects {
        /// First freed object id.
        first_object: u64,
        /// Number of objects freed.
        num_objects: u64,
        /// Guid of the `to` endpoint.
        to_guid: u64,
    },
    /// A freed byte span within one object.
    Free {
        /// Object id.
        object: u64,
        /// Byte offset of the span.
        offset: u64,
        /// Length of the span.
        length: FreeLength,
    },
    /// A leaf block payload.
    Write {
        /// Object id.
        object: u64,
        /// Dnode type.
        dnode_type: u32,
        /// Byte offset of the block.
        offset: u64,
        /// Guid of the `to` endpoint.
        to_guid: u64,
        /// Logical (decompressed) size in bytes.
        logical_size: u32,
        /// Checksum algorithm recorded on the block pointer.
        checksum_type: u8,
        /// The block is deduplication-capable.
        dedup: bool,
        /// Raw-send-only fields; `None` on non-raw sends.
        raw: Option<WriteRawFields>,
        /// Payload bytes: `logical_size`, or the compressed size on raw/
        /// stream-compressed sends.
        payload: Vec<u8>,
    },
    /// A leaf block payload embedded directly in the block pointer.
    WriteEmbedded {
        /// Object id.
        object: u64,
        /// Byte offset of the block.
        offset: u64,
        /// Length of the embedded span.
        length: u64,
        /// Guid of the `to` endpoint.
        to_guid: u64,
        /// Compression algorithm applied to the embedded payload.
        compression: u8,
        /// Embed type recorded on the block pointer.
        embed_type: u8,
        /// Logical size of the decompressed payload.
        lsize: u32,
        /// Physical (compressed) size of the payload.
        psize: u32,
        /// Compressed payload bytes, zero-padded to 8 bytes by the caller.
        payload: Vec<u8>,
    },
    /// A dnode's spill block.
    Spill {
        /// Object id.
        object: u64,
        /// Length of the spill block payload.
        length: u64,
        /// Guid of the `to` endpoint.
        to_guid: u64,
        /// The spill block was unmodified between `fromtxg` and `to`.
        unmodified: bool,
        /// Raw-send-only fields; `None` on non-raw sends.
        raw: Option<SpillRawFields>,
        /// Payload bytes.
        payload: Vec<u8>,
    },
    /// An explicit redaction marker.
    Redact {
        /// Object id.
        object: u64,
        /// Byte offset of the span.
        offset: u64,
        /// Length of the span.
        length: u64,
        /// Guid of the `to` endpoint.
        to_guid: u64,
    },
}

/// Raw-send-only fields carried by `OBJECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRawFields {
    /// Indirect block shift.
    pub indblkshift: u8,
    /// Number of tree levels.
    pub nlevels: u8,
    /// Number of block pointers per indirect block.
    pub nblkptr: u8,
    /// Highest allocated block id.
    pub maxblkid: u64,
    /// Raw (unrounded) bonus buffer length.
    pub raw_bonuslen: u32,
}

/// Raw-send-only fields carried by `WRITE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRawFields {
    /// On-disk compression code.
    pub compression: u8,
    /// Compressed size in bytes.
    pub compressed_size: u32,
    /// Per-block salt.
    pub salt: [u8; 8],
    /// Initialization vector.
    pub iv: [u8; 12],
    /// Message authentication code.
    pub mac: [u8; 16],
    /// The block's on-disk endianness differs from the receiver's.
    pub byteswap: bool,
}

/// Raw-send-only fields carried by `SPILL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpillRawFields {
    /// On-disk compression code.
    pub compression: u8,
    /// Compressed size in bytes.
    pub compressed_size: u32,
    /// Per-block salt.
    pub salt: [u8; 8],
    /// Initialization vector.
    pub iv: [u8; 12],
    /// Message authentication code.
    pub mac: [u8; 16],
}

/// Failure decoding a record from a byte stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The stream ended before a complete header could be read.
    #[error("truncated record header")]
    TruncatedHeader,
    /// The stream ended before the declared payload could be read.
    #[error("truncated record payload: wanted {wanted} bytes, had {available}")]
    TruncatedPayload {
        /// Bytes the header declared.
        wanted: usize,
        /// Bytes actually remaining in the buffer.
        available: usize,
    },
    /// The leading type tag did not match a known record type.
    #[error("unknown record tag {0}")]
    UnknownTag(u8),
}

const TAG_BEGIN: u8 = 0;
const TAG_END: u8 = 1;
const TAG_OBJECT: u8 = 2;
const TAG_OBJECT_RANGE: u8 = 3;
const TAG_FREEOBJECTS: u8 = 4;
const TAG_FREE: u8 = 5;
const TAG_WRITE: u8 = 6;
const TAG_WRITE_EMBEDDED: u8 = 7;
const TAG_SPILL: u8 = 8;
const TAG_REDACT: u8 = 9;

/// Appends `value` to `out` as little-endian bytes.
fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_bytes(out: &mut Vec<u8>, value: &[u8]) {
    put_u32(out, value.len() as u32);
    out.extend_from_slice(value);
}

fn put_string(out: &mut Vec<u8>, value: &str) {
    put_bytes(out, value.as_bytes());
}

fn put_option_u64_pair(out: &mut Vec<u8>, value: Option<(u64, u64)>) {
    match value {
        Some((a, b)) => {
            out.push(1);
            put_u64(out, a);
            put_u64(out, b);
        }
        None => out.push(0),
    }
}

fn put_u64_vec(out: &mut Vec<u8>, values: &[u64]) {
    put_u32(out, values.len() as u32);
    for v in values {
        put_u64(out, *v);
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if self.buf.len() - self.pos < len {
            return Err(WireError::TruncatedHeader);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().unwrap();
        Ok(u32::from_le_bytes(bytes))
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(u64::from_le_bytes(bytes))
    }

    fn bool(&mut self) -> Result<bool, WireError> {
        Ok(self.u8()? != 0)
    }

    fn array8(&mut self) -> Result<[u8; 8], WireError> {
        Ok(self.take(8)?.try_into().unwrap())
    }

    fn array12(&mut self) -> Result<[u8; 12], WireError> {
        Ok(self.take(12)?.try_into().unwrap())
    }

    fn array16(&mut self) -> Result<[u8; 16], WireError> {
        Ok(self.take(16)?.try_into().unwrap())
    }

    fn bytes(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.u32()? as usize;
        if self.buf.len() - self.pos < len {
            return Err(WireError::TruncatedPayload {
                wanted: len,
                available: self.buf.len() - self.pos,
            });
        }
        Ok(self.take(len)?.to_vec())
    }

    fn string(&mut self) -> Result<String, WireError> {
        let bytes = self.bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn u64_vec(&mut self) -> Result<Vec<u64>, WireError> {
        let len = self.u32()? as usize;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.u64()?);
        }
        Ok(out)
    }

    fn option_u64_pair(&mut self) -> Result<Option<(u64, u64)>, WireError> {
        if self.bool()? {
            Ok(Some((self.u64()?, self.u64()?)))
        } else {
            Ok(None)
        }
    }
}

impl WireRecord {
    /// Encodes this record's header and payload (excluding the trailing
    /// checksum slot, which the caller folds in separately via
    /// [`fold_and_stamp`]).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Self::Begin {
                feature_flags,
                to_guid,
                from_guid,
                to_name,
                payload,
            } => {
                out.push(TAG_BEGIN);
                put_u64(&mut out, *feature_flags);
                put_u64(&mut out, *to_guid);
                put_u64(&mut out, *from_guid);
                put_string(&mut out, to_name);
                put_u64_vec(&mut out, &payload.redact_snaps);
                put_u64_vec(&mut out, &payload.redact_from_snaps);
                put_option_u64_pair(&mut out, payload.resume);
                match &payload.crypt_keydata {
                    Some(key) => {
                        out.push(1);
                        put_bytes(&mut out, key);
                    }
                    None => out.push(0),
                }
            }
            Self::End { checksum, to_guid } => {
                out.push(TAG_END);
                for word in checksum {
                    put_u64(&mut out, *word);
                }
                put_u64(&mut out, *to_guid);
            }
            Self::Object {
                object,
                dnode_type,
                bonus_type,
                block_size,
                bonus_len,
                dnode_slots,
                checksum_type,
                compression,
                has_spill,
                raw,
                bonus,
            } => {
                out.push(TAG_OBJECT);
                put_u64(&mut out, *object);
                put_u32(&mut out, *dnode_type);
                put_u32(&mut out, *bonus_type);
                put_u32(&mut out, *block_size);
                put_u32(&mut out, *bonus_len);
                put_u32(&mut out, *dnode_slots);
                out.push(*checksum_type);
                out.push(*compression);
                out.push(u8::from(*has_spill));
                match raw {
                    Some(r) => {
                        out.push(1);
                        out.push(r.indblkshift);
                        out.push(r.nlevels);
                        out.push(r.nblkptr);
                        put_u64(&mut out, r.maxblkid);
                        put_u32(&mut out, r.raw_bonuslen);
                    }
                    None => out.push(0),
                }
                put_bytes(&mut out, bonus);
            }
            Self::ObjectRange {
                first_object,
                num_slots,
                to_guid,
                byteswap,
                salt,
                iv,
                mac,
            } => {
                out.push(TAG_OBJECT_RANGE);
                put_u64(&mut out, *first_object);
                put_u64(&mut out, *num_slots);
                put_u64(&mut out, *to_guid);
                out.push(u8::from(*byteswap));
                out.extend_from_slice(salt);
                out.extend_from_slice(iv);
                out.extend_from_slice(mac);
            }
            Self::FreeObjects {
                first_object,
                num_objects,
                to_guid,
            } => {
                out.push(TAG_FREEOBJECTS);
                put_u64(&mut out, *first_object);
                put_u64(&mut out, *num_objects);
                put_u64(&mut out, *to_guid);
            }
            Self::Free {
                object,
                offset,
                length,
            } => {
                out.push(TAG_FREE);
                put_u64(&mut out, *object);
                put_u64(&mut out, *offset);
                put_u64(&mut out, length.to_wire());
            }
            Self::Write {
                object,
                dnode_type,
                offset,
                to_guid,
                logical_size,
                checksum_type,
                dedup,
                raw,
                payload,
            } => {
                out.push(TAG_WRITE);
                put_u64(&mut out, *object);
                put_u32(&mut out, *dnode_type);
                put_u64(&mut out, *offset);
                put_u64(&mut out, *to_guid);
                put_u32(&mut out, *logical_size);
                out.push(*checksum_type);
                out.push(u8::from(*dedup));
                match raw {
                    Some(r) => {
                        out.push(1);
                        out.push(r.compression);
                        put_u32(&mut out, r.compressed_size);
                        out.extend_from_slice(&r.salt);
                        out.extend_from_slice(&r.iv);
                        out.extend_from_slice(&r.mac);
                        out.push(u8::from(r.byteswap));
                    }
                    None => out.push(0),
                }
                put_bytes(&mut out, payload);
            }
            Self::WriteEmbedded {
                object,
                offset,
                length,
                to_guid,
                compression,
                embed_type,
                lsize,
                psize,
                payload,
            } => {
                out.push(TAG_WRITE_EMBEDDED);
                put_u64(&mut out, *object);
                put_u64(&mut out, *offset);
                put_u64(&mut out, *length);
                put_u64(&mut out, *to_guid);
                out.push(*compression);
                out.push(*embed_type);
                put_u32(&mut out, *lsize);
                put_u32(&mut out, *psize);
                put_bytes(&mut out, payload);
            }
            Self::Spill {
                object,
                length,
                to_guid,
                unmodified,
                raw,
                payload,
            } => {
                out.push(TAG_SPILL);
                put_u64(&mut out, *object);
                put_u64(&mut out, *length);
                put_u64(&mut out, *to_guid);
                out.push(u8::from(*unmodified));
                match raw {
                    Some(r) => {
                        out.push(1);
                        out.push(r.compression);
                        put_u32(&mut out, r.compressed_size);
                        out.extend_from_slice(&r.salt);
                        out.extend_from_slice(&r.iv);
                        out.extend_from_slice(&r.mac);
                    }
                    None => out.push(0),
                }
                put_bytes(&mut out, payload);
            }
            Self::Redact {
                object,
                offset,
                length,
                to_guid,
            } => {
                out.push(TAG_REDACT);
                put_u64(&mut out, *object);
                put_u64(&mut out, *offset);
                put_u64(&mut out, *length);
                put_u64(&mut out, *to_guid);
            }
        }
        out
    }

    /// Decodes one record from the front of `buf`, returning the record and
    /// the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), WireError> {
        let mut r = Reader::new(buf);
        let tag = r.u8()?;
        let record = match tag {
            TAG_BEGIN => Self::Begin {
                feature_flags: r.u64()?,
                to_guid: r.u64()?,
                from_guid: r.u64()?,
                to_name: r.string()?,
                payload: BeginPayload {
                    redact_snaps: r.u64_vec()?,
                    redact_from_snaps: r.u64_vec()?,
                    resume: r.option_u64_pair()?,
                    crypt_keydata: if r.bool()? { Some(r.bytes()?) } else { None },
                },
            },
            TAG_END => {
                let mut checksum = [0u64; 4];
                for word in &mut checksum {
                    *word = r.u64()?;
                }
                Self::End {
                    checksum,
                    to_guid: r.u64()?,
                }
            }
            TAG_OBJECT => {
                let object = r.u64()?;
                let dnode_type = r.u32()?;
                let bonus_type = r.u32()?;
                let block_size = r.u32()?;
                let bonus_len = r.u32()?;
                let dnode_slots = r.u32()?;
                let checksum_type = r.u8()?;
                let compression = r.u8()?;
                let has_spill = r.bool()?;
                let raw = if r.bool()? {
                    Some(ObjectRawFields {
                        indblkshift: r.u8()?,
                        nlevels: r.u8()?,
                        nblkptr: r.u8()?,
                        maxblkid: r.u64()?,
                        raw_bonuslen: r.u32()?,
                    })
                } else {
                    None
                };
                Self::Object {
                    object,
                    dnode_type,
                    bonus_type,
                    block_size,
                    bonus_len,
                    dnode_slots,
                    checksum_type,
                    compression,
                    has_spill,
                    raw,
                    bonus: r.bytes()?,
                }
            }
            TAG_OBJECT_RANGE => Self::ObjectRange {
                first_object: r.u64()?,
                num_slots: r.u64()?,
                to_guid: r.u64()?,
                byteswap: r.bool()?,
                salt: r.array8()?,
                iv: r.array12()?,
                mac: r.array16()?,
            },
            TAG_FREEOBJECTS => Self::FreeObjects {
                first_object: r.u64()?,
                num_objects: r.u64()?,
                to_guid: r.u64()?,
            },
            TAG_FREE => Self::Free {
                object: r.u64()?,
                offset: r.u64()?,
                length: FreeLength::from_wire(r.u64()?),
            },
            TAG_WRITE => {
                let object = r.u64()?;
                let dnode_type = r.u32()?;
                let offset = r.u64()?;
                let to_guid = r.u64()?;
                let logical_size = r.u32()?;
                let checksum_type = r.u8()?;
                let dedup = r.bool()?;
                let raw = if r.bool()? {
                    Some(WriteRawFields {
                        compression: r.u8()?,
                        compressed_size: r.u32()?,
                        salt: r.array8()?,
                        iv: r.array12()?,
                        mac: r.array16()?,
                        byteswap: r.bool()?,
                    })
                } else {
                    None
                };
                Self::Write {
                    object,
                    dnode_type,
                    offset,
                    to_guid,
                    logical_size,
                    checksum_type,
                    dedup,
                    raw,
                    payload: r.bytes()?,
                }
            }
            TAG_WRITE_EMBEDDED => Self::WriteEmbedded {
                object: r.u64()?,
                offset: r.u64()?,
                length: r.u64()?,
                to_guid: r.u64()?,
                compression: r.u8()?,
                embed_type: r.u8()?,
                lsize: r.u32()?,
                psize: r.u32()?,
                payload: r.bytes()?,
            },
            TAG_SPILL => {
                let object = r.u64()?;
                let length = r.u64()?;
                let to_guid = r.u64()?;
                let unmodified = r.bool()?;
                let raw = if r.bool()? {
                    Some(SpillRawFields {
                        compression: r.u8()?,
                        compressed_size: r.u32()?,
                        salt: r.array8()?,
                        iv: r.array12()?,
                        mac: r.array16()?,
                    })
                } else {
                    None
                };
                Self::Spill {
                    object,
                    length,
                    to_guid,
                    unmodified,
                    raw,
                    payload: r.bytes()?,
                }
            }
            TAG_REDACT => Self::Redact {
                object: r.u64()?,
                offset: r.u64()?,
                length: r.u64()?,
                to_guid: r.u64()?,
            },
            other => return Err(WireError::UnknownTag(other)),
        };
        Ok((record, r.pos))
    }

    /// Reports whether this record carries a trailing checksum slot (every
    /// record except `BEGIN`, per invariant §3.2-6).
    #[must_use]
    pub const fn carries_checksum(&self) -> bool {
        !matches!(self, Self::Begin { .. })
    }
}

/// Folds `record`'s encoded bytes into `running`, matching the header's
/// exact fold-then-stamp order: the checksum slot is zeroed during folding,
/// then stamped with the checksum *after* the fold (invariant §3.2-6).
///
/// Returns the bytes to write to the sink (header, payload, and — unless
/// this is `BEGIN` — the stamped checksum slot).
pub fn fold_and_stamp(running: &mut StreamChecksum, record: &WireRecord) -> Vec<u8> {
    let mut bytes = record.encode();
    running.update(&bytes);
    if record.carries_checksum() {
        let stamp = running.finalize();
        for word in stamp {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_write() -> WireRecord {
        WireRecord::Write {
            object: 42,
            dnode_type: 19,
            offset: 8192,
            to_guid: 0xdead_beef,
            logical_size: 4,
            checksum_type: 7,
            dedup: false,
            raw: None,
            payload: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn write_round_trips() {
        let record = sample_write();
        let encoded = record.encode();
        let (decoded, consumed) = WireRecord::decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, record);
    }

    #[test]
    fn free_length_sentinel_round_trips() {
        let record = WireRecord::Free {
            object: 1,
            offset: 0,
            length: FreeLength::ToEnd,
        };
        let (decoded, _) = WireRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded, record);
        assert_ne!(FreeLength::ToEnd, FreeLength::Bytes(u64::MAX - 1));
    }

    #[test]
    fn begin_carries_no_checksum_slot() {
        let record = WireRecord::Begin {
            feature_flags: 0,
            to_guid: 1,
            from_guid: 0,
            to_name: "tank/data@snap".to_owned(),
            payload: BeginPayload::default(),
        };
        assert!(!record.carries_checksum());
        assert!(sample_write().carries_checksum());
    }

    #[test]
    fn fold_and_stamp_appends_checksum_for_non_begin_records() {
        let mut running = StreamChecksum::new();
        let bytes = fold_and_stamp(&mut running, &sample_write());
        assert_eq!(bytes.len(), sample_write().encode().len() + 32);
    }

    #[test]
    fn truncated_payload_is_reported() {
        let mut encoded = sample_write().encode();
        encoded.truncate(encoded.len() - 2);
        let err = WireRecord::decode(&encoded).unwrap_err();
        assert!(matches!(err, WireError::TruncatedPayload { .. }));
    }

    #[test]
    fn unknown_tag_is_reported() {
        let err = WireRecord::decode(&[250]).unwrap_err();
        assert_eq!(err, WireError::UnknownTag(250));
    }
}
