//! Feature-flag bitmask negotiated into the `BEGIN` record.
//!
//! Mirrors the reference implementation's `dsc_featureflags` bitmask: a
//! single `u64` where each bit gates one on-wire capability. Kept as a
//! dedicated newtype (rather than the raw integer) so illegal combinations
//! can be validated in one place instead of at every call site.

use thiserror::Error;

/// One on-wire capability bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum Feature {
    /// Emit `WRITE` records larger than the legacy maximum instead of
    /// splitting them.
    LargeBlocks = 1 << 0,
    /// Emit `WRITE_EMBEDDED` for embedded block pointers.
    EmbedData = 1 << 1,
    /// Permit legacy-compression embedded payloads.
    Lz4 = 1 << 2,
    /// Emit `WRITE` carrying a compressed payload plus compression code.
    Compressed = 1 << 3,
    /// Emit encrypted payload verbatim, plus `OBJECT_RANGE` and crypt keydata.
    Raw = 1 << 4,
    /// Include resume object/offset in `BEGIN`.
    Resuming = 1 << 5,
    /// Emit `REDACT` records and the `redact_snaps` payload key.
    Redacted = 1 << 6,
    /// Allow dnode slot counts greater than one in `OBJECT`.
    LargeDnode = 1 << 7,
    /// Allow `SPILL` records.
    SaSpill = 1 << 8,
    /// Permit ZSTD-compressed payloads.
    Zstd = 1 << 9,
    /// Allow large micro-zap blocks (requires [`Feature::LargeBlocks`]).
    LargeMicrozap = 1 << 10,
    /// Tolerate dataset names using the long-name feature.
    LongName = 1 << 11,
}

/// Set of negotiated [`Feature`] bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FeatureFlags(u64);

impl FeatureFlags {
    /// The empty flag set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Builds a flag set from a raw bitmask, as read off the wire.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw bitmask, as written to the wire.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Sets `feature`, returning the updated set.
    #[must_use]
    pub const fn with(self, feature: Feature) -> Self {
        Self(self.0 | feature as u64)
    }

    /// Reports whether `feature` is set.
    #[must_use]
    pub const fn contains(self, feature: Feature) -> bool {
        self.0 & (feature as u64) != 0
    }

    /// Validates the set against the illegal-combination rules of the
    /// feature table; currently only `LARGE_MICROZAP` requires
    /// `LARGE_BLOCKS`.
    pub fn validate(self) -> Result<(), FeatureError> {
        if self.contains(Feature::LargeMicrozap) && !self.contains(Feature::LargeBlocks) {
            return Err(FeatureError::IllegalCombination {
                detail: "LARGE_MICROZAP requires LARGE_BLOCKS".to_owned(),
            });
        }
        Ok(())
    }
}

/// Failure validating a negotiated feature set.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Two or more flags were set together that the format forbids.
    #[error("illegal feature flag combination: {detail}")]
    IllegalCombination {
        /// Human-readable description of the offending combination.
        detail: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_microzap_requires_large_blocks() {
        let flags = FeatureFlags::empty().with(Feature::LargeMicrozap);
        assert!(flags.validate().is_err());

        let flags = flags.with(Feature::LargeBlocks);
        assert!(flags.validate().is_ok());
    }

    #[test]
    fn contains_reflects_with() {
        let flags = FeatureFlags::empty().with(Feature::Zstd).with(Feature::Raw);
        assert!(flags.contains(Feature::Zstd));
        assert!(flags.contains(Feature::Raw));
        assert!(!flags.contains(Feature::Lz4));
    }

    #[test]
    fn bits_round_trip() {
        let flags = FeatureFlags::empty()
            .with(Feature::LargeBlocks)
            .with(Feature::EmbedData);
        assert_eq!(FeatureFlags::from_bits(flags.bits()), flags);
    }
}
