//! `episcan`: sequential and spatiotemporal outbreak detection primitives.
//!
//! Designed for streaming disease-surveillance pipelines: a collector hands
//! you periodic `(positives, total)` counts (optionally with per-sample
//! geolocations), and you want a single, defensible answer to "is something
//! happening?".  `episcan` runs several independent sequential tests over the
//! stream and reduces their verdicts to one ordered [`DetectionLevel`].
//!
//! **Detectors:**
//! - [`Sprt`]: Wald's Sequential Probability Ratio Test over a binomial
//!   proportion — per-batch reject/accept/continue with bounded error rates
//!   (Wald 1945).
//! - [`GroupSequential`]: multi-stage group sequential test on a z-statistic
//!   from cumulative counts, with O'Brien–Fleming (1979) or Pocock (1977)
//!   stopping boundaries repurposed from clinical-trial design.
//! - [`Cusum`]: Page's cumulative-sum control chart (Page 1954) with online
//!   variance estimation — detects sustained upward/downward mean shifts.
//! - [`ScanDetector`]: a Kulldorff-style space–time scan statistic
//!   (Kulldorff 1997) — enumerates candidate (center, radius) disks over a
//!   trailing time window and ranks excess-risk clusters by log-likelihood
//!   ratio.
//! - [`OutbreakDetector`]: the orchestrator — owns one instance of each
//!   enabled detector, fans a surveillance update out to all of them, and
//!   escalates to the highest level any of them indicates.
//!
//! **Goals:**
//! - **Deterministic**: same counts + config → same level.  No sampling; the
//!   only clock use is defaulting a missing scan reference date to today, and
//!   callers can always pass the date explicitly.
//! - **Sentinel-valued edge cases**: zero totals, exhausted stages, and empty
//!   case lists return `Continue`/`Completed`/`[]`, never errors.  Only
//!   precondition violations (`positives > total`, out-of-range
//!   probabilities) fail, and they fail fast at the call boundary.
//! - **Bounded state**: every audit log and case list is a ring buffer with a
//!   configurable cap; a detector left running for years does not grow
//!   without bound.
//! - **Single-writer**: detectors are plain mutable values with no interior
//!   sharing.  Shard one detector set per monitored signal (disease, region)
//!   and drive each from one caller.
//!
//! # Quick start
//!
//! ```rust
//! use episcan::{OutbreakConfig, OutbreakDetector, DetectionLevel};
//!
//! let mut det = OutbreakDetector::new(OutbreakConfig {
//!     baseline_rate: 0.05,
//!     target_shift: 0.10,
//!     ..OutbreakConfig::default()
//! })
//! .expect("valid config");
//!
//! // Quiet week: 2 positives out of 40 samples.
//! let level = det.update(2, 40, None, None).expect("valid counts");
//! assert_eq!(level, DetectionLevel::Normal);
//! ```
//!
//! # Choosing detectors
//!
//! The detectors answer different questions and their signals are mapped to
//! different floors on purpose:
//!
//! - CUSUM reacts earliest to small sustained shifts → [`DetectionLevel::Alert`].
//! - SPRT needs a batch extreme enough to cross a Wald boundary →
//!   [`DetectionLevel::Warning`].
//! - The group sequential test crossing an O'Brien–Fleming boundary is the
//!   strongest single-stream evidence → [`DetectionLevel::Outbreak`].
//! - Spatial clusters escalate by relative risk: >2× baseline → `Warning`,
//!   >3× → `Outbreak`.
//!
//! # Related work
//!
//! The group sequential boundaries follow Jennison & Turnbull (2000), ch. 2;
//! the Pocock boundary here is the Bonferroni approximation, not the exact
//! constant (see [`BoundaryShape::Pocock`]).  The scan statistic is the
//! Bernoulli variant of Kulldorff (1997) with a chi-squared approximation to
//! the LLR null distribution in place of Monte Carlo replication.

#![forbid(unsafe_code)]

use std::fmt;

mod error;
pub use error::Error;

pub mod stats;

mod sprt;
pub use sprt::*;

mod group_sequential;
pub use group_sequential::*;

mod cusum;
pub use cusum::*;

mod scan;
pub use scan::*;

mod detector;
pub use detector::*;

/// Escalation level produced by [`OutbreakDetector::update`].
///
/// Levels are totally ordered (`Normal < Alert < Warning < Outbreak`) and
/// escalation within one update cycle always keeps the highest level any
/// enabled detector indicated.
///
/// ```rust
/// use episcan::DetectionLevel;
///
/// assert!(DetectionLevel::Outbreak > DetectionLevel::Warning);
/// assert_eq!(
///     DetectionLevel::Alert.max(DetectionLevel::Warning),
///     DetectionLevel::Warning,
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DetectionLevel {
    /// Nothing unusual in the current window.
    #[default]
    Normal,
    /// An early-warning detector (CUSUM) has signaled a sustained shift.
    Alert,
    /// A sequential test or a moderate spatial cluster indicates likely excess.
    Warning,
    /// Strong evidence of an outbreak (boundary crossing or high-risk cluster).
    Outbreak,
}

impl DetectionLevel {
    /// Stable lowercase wire name (matches the serde representation).
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionLevel::Normal => "normal",
            DetectionLevel::Alert => "alert",
            DetectionLevel::Warning => "warning",
            DetectionLevel::Outbreak => "outbreak",
        }
    }
}

impl fmt::Display for DetectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_totally_ordered() {
        use DetectionLevel::*;
        let mut levels = vec![Outbreak, Normal, Warning, Alert];
        levels.sort();
        assert_eq!(levels, vec![Normal, Alert, Warning, Outbreak]);
    }

    #[test]
    fn max_keeps_highest() {
        use DetectionLevel::*;
        assert_eq!(Normal.max(Alert), Alert);
        assert_eq!(Outbreak.max(Warning), Outbreak);
        assert_eq!(Normal.max(Normal), Normal);
    }

    #[test]
    fn display_matches_wire_names() {
        assert_eq!(DetectionLevel::Normal.to_string(), "normal");
        assert_eq!(DetectionLevel::Outbreak.to_string(), "outbreak");
    }
}
