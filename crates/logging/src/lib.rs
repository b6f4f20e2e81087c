#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` installs and configures the [`tracing`] subscriber used by the
//! send-stream engine's orchestrator and its five pipeline stages. It turns
//! a single [`Verbosity`] level into an `EnvFilter` directive string,
//! matching the verbosity/info/debug split upstream tooling exposes through
//! repeatable `-v` flags.
//!
//! # Design
//!
//! Each pipeline stage emits a `tracing::info_span!` for its lifetime (for
//! example `to_traversal`, `merge`, `main_emit`) and logs progress at
//! `debug` level inside it; the orchestrator logs stage start/stop and the
//! final block-visited counter at `info` level. This crate only owns turning
//! [`Verbosity`] into the right filter directives — it does not itself log
//! anything.
//!
//! # Invariants
//!
//! - [`install`] is idempotent to call more than once within a process only
//!   in the sense that `tracing`'s global default can only be set once;
//!   later calls return [`InstallError::AlreadyInstalled`] rather than
//!   panicking, since a send-stream engine embedded into a larger binary
//!   should not be able to crash its host by calling `install` twice.
//!
//! # Examples
//!
//! ```
//! use logging::{install, Verbosity};
//!
//! let _ = install(Verbosity::Info);
//! tracing::info!("example message");
//! ```

use std::fmt;

use tracing_subscriber::EnvFilter;

/// Verbosity level controlling which spans and events are emitted.
///
/// Mirrors the progressive `-v`/`-vv`/`--debug` style of upstream tooling:
/// each level is a strict superset of the previous one's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Only warnings and errors.
    #[default]
    Silent,
    /// Stage lifecycle and the final summary (`-v`).
    Info,
    /// Per-record progress within each stage (`-vv`).
    Debug,
    /// Per-record progress plus merge-stage tie-break decisions (`--debug`
    /// equivalent, the noisiest level).
    Trace,
}

impl Verbosity {
    /// Builds a verbosity level from a repeat count of `-v` flags.
    #[must_use]
    pub const fn from_flag_count(count: u8) -> Self {
        match count {
            0 => Self::Silent,
            1 => Self::Info,
            2 => Self::Debug,
            _ => Self::Trace,
        }
    }

    /// Returns the `EnvFilter` directive string for this level.
    #[must_use]
    pub const fn filter_directive(self) -> &'static str {
        match self {
            Self::Silent => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.filter_directive())
    }
}

/// Failure installing the global `tracing` subscriber.
#[derive(Debug)]
pub enum InstallError {
    /// A global default subscriber was already installed by this process.
    AlreadyInstalled,
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInstalled => {
                write!(f, "a global tracing subscriber is already installed")
            }
        }
    }
}

impl std::error::Error for InstallError {}

/// Installs a process-wide `tracing` subscriber at the given verbosity.
///
/// Respects `RUST_LOG` if set (it takes precedence over `verbosity`),
/// matching the teacher crate's convention of layering an explicit
/// verbosity flag underneath the standard `EnvFilter` environment override.
pub fn install(verbosity: Verbosity) -> Result<(), InstallError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|_| InstallError::AlreadyInstalled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_count_maps_monotonically() {
        assert_eq!(Verbosity::from_flag_count(0), Verbosity::Silent);
        assert_eq!(Verbosity::from_flag_count(1), Verbosity::Info);
        assert_eq!(Verbosity::from_flag_count(2), Verbosity::Debug);
        assert_eq!(Verbosity::from_flag_count(9), Verbosity::Trace);
    }

    #[test]
    fn ordering_is_progressive() {
        assert!(Verbosity::Silent < Verbosity::Info);
        assert!(Verbosity::Info < Verbosity::Debug);
        assert!(Verbosity::Debug < Verbosity::Trace);
    }

    #[test]
    fn directive_strings_match_levels() {
        assert_eq!(Verbosity::Silent.filter_directive(), "warn");
        assert_eq!(Verbosity::Trace.filter_directive(), "trace");
    }
}
