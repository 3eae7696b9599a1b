//! Verbosity-gated diagnostics (spec §7's ladder: 0 silent, 1 one-line
//! errors, 2 adds the low-level cause, 3+ adds byte positions/sizes/entry
//! traces), following the teacher's `if verbose > N { eprintln!(...) }`
//! convention (see `read.rs`) with `colored` for the terminal styling the
//! teacher's `Cargo.toml` already carries but never used.

use colored::Colorize;
use std::fmt::Display;
use std::time::Duration;

/// Holds the `-v` count for one process invocation; all diagnostics funnel
/// through this so the ladder lives in one place.
#[derive(Debug, Clone, Copy)]
pub struct Diag {
    pub verbosity: u8,
}

impl Diag {
    pub fn new(verbosity: u8) -> Self {
        Self { verbosity }
    }

    /// Tier 1: the one-line, user-facing error. Always shown unless
    /// verbosity is 0.
    pub fn error(&self, err: &dyn Display) {
        if self.verbosity >= 1 {
            eprintln!("{} {}", "error:".red().bold(), err);
        }
    }

    /// Tier 2: the low-level cause underlying `error` (e.g. a `source()`
    /// chain entry, or a cache read/write failure).
    pub fn cause(&self, cause: &dyn Display) {
        if self.verbosity >= 2 {
            eprintln!("  {} {}", "caused by:".yellow(), cause);
        }
    }

    /// Tier 3+: byte positions, request/response sizes, call-entry traces.
    pub fn trace(&self, message: &dyn Display) {
        if self.verbosity >= 3 {
            eprintln!("  {} {}", "trace:".dimmed(), message);
        }
    }

    /// Descriptor build fetch-duration reporting (spec's supplement to
    /// §7: one line per fetch at verbosity >= 2).
    pub fn fetch_duration(&self, what: &str, duration: Duration) {
        if self.verbosity >= 2 {
            eprintln!("  {} {} took {:?}", "fetch:".cyan(), what, duration);
        }
    }

    /// Cache warnings are never fatal (spec §7) but are surfaced at
    /// verbosity >= 2.
    pub fn cache_warning(&self, warning: &dyn Display) {
        if self.verbosity >= 2 {
            eprintln!("  {} {}", "cache warning:".yellow(), warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_zero_is_silent() {
        let diag = Diag::new(0);
        assert_eq!(diag.verbosity, 0);
    }

    #[test]
    fn levels_are_monotonic_thresholds() {
        let diag = Diag::new(2);
        assert!(diag.verbosity >= 1);
        assert!(diag.verbosity >= 2);
        assert!(diag.verbosity < 3);
    }
}
