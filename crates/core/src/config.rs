//! Tunables passed explicitly to the orchestrator and every pipeline stage.
//!
//! The reference implementation keeps these as process-wide tunables; this
//! crate models them as one explicit, read-only value so that no pipeline
//! stage reaches for global mutable state (per the Design Note in the
//! specification).

/// Read-only configuration snapshot handed to the orchestrator and cloned
/// (cheaply, it is `Copy`) into every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Byte capacity of each inter-stage queue.
    pub queue_byte_cap: usize,
    /// Fraction of `queue_byte_cap` (0.0-1.0, stored as parts-per-thousand)
    /// a queue must drain below before a blocked producer is re-signalled.
    /// Smaller values coalesce more wakeups at the cost of producer latency.
    pub queue_fill_fraction_permille: u16,
    /// When a `Data` read surfaces a checksum or authentication failure,
    /// permit substituting a zero-filled "bad-block filler" of the expected
    /// length instead of aborting the send. Operator-visible debug option;
    /// defaults to `false`.
    pub allow_corrupt_data_fillers: bool,
    /// Emit `SPILL` records for spill blocks that were not modified between
    /// `fromtxg` and the current traversal, so old receivers cannot
    /// mistakenly drop a spill block across certain metadata-only changes.
    pub send_unmodified_spill_blocks: bool,
    /// Highest object id the receiver could ever address, used to clamp
    /// `FREEOBJECTS` ranges so they never name objects the receiver could
    /// not allocate. Derived from the TO dataset's meta-dnode span; `None`
    /// disables the clamp (useful for synthetic/test pools with no bound).
    pub max_object_id: Option<u64>,
}

impl EngineConfig {
    /// Default queue capacity: 16 MiB of payload per inter-stage queue.
    pub const DEFAULT_QUEUE_BYTE_CAP: usize = 16 * 1024 * 1024;
    /// Default fill fraction: producers are re-signalled once a queue drains
    /// below 50% of capacity.
    pub const DEFAULT_FILL_FRACTION_PERMILLE: u16 = 500;

    /// Builds a configuration with the engine's defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            queue_byte_cap: Self::DEFAULT_QUEUE_BYTE_CAP,
            queue_fill_fraction_permille: Self::DEFAULT_FILL_FRACTION_PERMILLE,
            allow_corrupt_data_fillers: false,
            send_unmodified_spill_blocks: true,
            max_object_id: None,
        }
    }

    /// Byte threshold below which a blocked producer should be re-signalled.
    #[must_use]
    pub const fn fill_threshold_bytes(&self) -> usize {
        (self.queue_byte_cap * self.queue_fill_fraction_permille as usize) / 1000
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_threshold_is_half_of_default_cap() {
        let cfg = EngineConfig::new();
        assert_eq!(
            cfg.fill_threshold_bytes(),
            EngineConfig::DEFAULT_QUEUE_BYTE_CAP / 2
        );
    }

    #[test]
    fn zero_fill_fraction_never_resignals() {
        let cfg = EngineConfig {
            queue_fill_fraction_permille: 0,
            ..EngineConfig::new()
        };
        assert_eq!(cfg.fill_threshold_bytes(), 0);
    }
}
