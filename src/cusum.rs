//! Page's CUSUM control chart with online variance estimation.
//!
//! Two one-sided cumulative sums track upward and downward shifts of the
//! monitored value around a baseline mean:
//!
//! ```text
//! cusum_pos = max(0, cusum_pos + z - k)
//! cusum_neg = max(0, cusum_neg - z - k)
//! ```
//!
//! where `z` is the standardized observation and `k` the reference value
//! (usually half the shift worth detecting).  The `max(0, ·)` clamp is the
//! defining CUSUM property: drift in the favorable direction never
//! accumulates.  A statistic reaching the decision threshold `h` signals.
//!
//! When no standard deviation is supplied, it is estimated online from the
//! running first and second moments (unbiased sample variance, floored to
//! keep standardization finite) and re-estimated on every observation.

use std::collections::VecDeque;

use crate::DetectionLevel;
use crate::Error;

/// Default decision threshold `h` (in standardized units).
pub const DEFAULT_DECISION_THRESHOLD: f64 = 5.0;

/// Default reference value `k`.
pub const DEFAULT_REFERENCE_VALUE: f64 = 0.5;

/// Default cap on the retained observation history.
pub const DEFAULT_HISTORY_CAP: usize = 1000;

/// Floor applied to the estimated variance before taking the square root.
const VARIANCE_FLOOR: f64 = 0.0001;

/// Verdict of one CUSUM observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CusumDecision {
    /// The upper statistic crossed `h`: sustained upward shift.
    Increase,
    /// The lower statistic crossed `h`: sustained downward shift.
    Decrease,
    /// Neither statistic has crossed; keep monitoring.
    Continue,
}

/// Result of [`Cusum::update`]: the decision plus both statistics.
///
/// When `reset_on_signal` is set, the reported statistic is the value that
/// remains *after* the post-signal reset (i.e. `0.0` for the side that fired).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CusumOutcome {
    pub decision: CusumDecision,
    pub cusum_pos: f64,
    pub cusum_neg: f64,
}

/// Audit record for one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CusumRecord {
    /// 1-based observation index.
    pub n: u64,
    /// Raw observed value.
    pub value: f64,
    /// Standardized value used in the sums.
    pub z: f64,
    pub cusum_pos: f64,
    pub cusum_neg: f64,
}

/// Configuration for [`Cusum`].
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CusumConfig {
    /// Expected in-control process mean.
    pub baseline_mean: f64,
    /// Shift worth detecting, in standard-deviation units.
    pub target_shift: f64,
    /// Fixed process standard deviation; `None` means estimate online.
    pub std_dev: Option<f64>,
    /// Reference value `k`; `None` defaults to `target_shift / 2`.
    pub k: Option<f64>,
    /// Decision threshold `h`.
    pub h: f64,
    /// Reset the triggering statistic to zero immediately after a signal,
    /// enabling re-detection of later shifts without waiting for decay.
    pub reset_on_signal: bool,
    /// Cap on the retained observation history (oldest evicted first).
    pub history_cap: usize,
}

impl Default for CusumConfig {
    fn default() -> Self {
        Self {
            baseline_mean: 0.0,
            target_shift: 1.0,
            std_dev: None,
            k: Some(DEFAULT_REFERENCE_VALUE),
            h: DEFAULT_DECISION_THRESHOLD,
            reset_on_signal: false,
            history_cap: DEFAULT_HISTORY_CAP,
        }
    }
}

/// Online CUSUM detector over a scalar stream.
///
/// ```rust
/// use episcan::{Cusum, CusumConfig, CusumDecision};
///
/// let mut cusum = Cusum::new(CusumConfig {
///     baseline_mean: 0.05,
///     target_shift: 0.10,
///     ..CusumConfig::default()
/// })
/// .unwrap();
///
/// let out = cusum.update(0.05);
/// assert_eq!(out.decision, CusumDecision::Continue);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cusum {
    cfg: CusumConfig,
    k: f64,
    n: u64,
    sum_x: f64,
    sum_x2: f64,
    cusum_pos: f64,
    cusum_neg: f64,
    history: VecDeque<CusumRecord>,
}

impl Cusum {
    /// Create a detector from `cfg`.
    pub fn new(cfg: CusumConfig) -> Result<Self, Error> {
        if !cfg.baseline_mean.is_finite() {
            return Err(Error::Domain("baseline_mean must be finite"));
        }
        if !cfg.h.is_finite() || cfg.h <= 0.0 {
            return Err(Error::Domain("decision threshold h must be positive"));
        }
        if let Some(sd) = cfg.std_dev {
            if !sd.is_finite() || sd <= 0.0 {
                return Err(Error::Domain("std_dev must be positive when fixed"));
            }
        }
        let k = match cfg.k {
            Some(k) if k.is_finite() && k >= 0.0 => k,
            Some(_) => return Err(Error::Domain("reference value k must be non-negative")),
            None => cfg.target_shift / 2.0,
        };

        Ok(Self {
            cfg,
            k,
            n: 0,
            sum_x: 0.0,
            sum_x2: 0.0,
            cusum_pos: 0.0,
            cusum_neg: 0.0,
            history: VecDeque::new(),
        })
    }

    /// Observations seen so far.
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Running mean of observed values, or `None` before the first one.
    pub fn mean(&self) -> Option<f64> {
        if self.n == 0 {
            None
        } else {
            Some(self.sum_x / self.n as f64)
        }
    }

    /// Standard deviation in force for the next observation: the fixed value
    /// if configured, otherwise the current online estimate (1.0 until two
    /// observations exist).
    pub fn std_dev(&self) -> f64 {
        match self.cfg.std_dev {
            Some(sd) => sd,
            None => self.estimated_std_dev(),
        }
    }

    /// Current upper statistic.
    pub fn cusum_pos(&self) -> f64 {
        self.cusum_pos
    }

    /// Current lower statistic.
    pub fn cusum_neg(&self) -> f64 {
        self.cusum_neg
    }

    /// Retained observation records, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &CusumRecord> + '_ {
        self.history.iter()
    }

    /// Graded severity of the current upper statistic relative to `h`.
    ///
    /// `>= h` → Outbreak, `>= 0.7h` → Warning, `>= 0.5h` → Alert, else
    /// Normal.  Snapshot only; [`update`](Self::update) decisions are what
    /// the orchestrator escalates on.
    pub fn level(&self) -> DetectionLevel {
        if self.cusum_pos >= self.cfg.h {
            DetectionLevel::Outbreak
        } else if self.cusum_pos >= 0.7 * self.cfg.h {
            DetectionLevel::Warning
        } else if self.cusum_pos >= 0.5 * self.cfg.h {
            DetectionLevel::Alert
        } else {
            DetectionLevel::Normal
        }
    }

    /// Clear both statistics, the moment sums, and the history.
    pub fn reset(&mut self) {
        self.n = 0;
        self.sum_x = 0.0;
        self.sum_x2 = 0.0;
        self.cusum_pos = 0.0;
        self.cusum_neg = 0.0;
        self.history.clear();
    }

    fn estimated_std_dev(&self) -> f64 {
        if self.n > 1 {
            let n = self.n as f64;
            let variance = (self.sum_x2 - self.sum_x * self.sum_x / n) / (n - 1.0);
            variance.max(VARIANCE_FLOOR).sqrt()
        } else {
            1.0
        }
    }

    /// Feed one observation.
    pub fn update(&mut self, value: f64) -> CusumOutcome {
        self.n += 1;
        self.sum_x += value;
        self.sum_x2 += value * value;

        let std_dev = self.std_dev();
        let z = if std_dev > 0.0 {
            (value - self.cfg.baseline_mean) / std_dev
        } else {
            0.0
        };

        self.cusum_pos = (self.cusum_pos + z - self.k).max(0.0);
        self.cusum_neg = (self.cusum_neg - z - self.k).max(0.0);

        let decision = if self.cusum_pos >= self.cfg.h {
            if self.cfg.reset_on_signal {
                self.cusum_pos = 0.0;
            }
            CusumDecision::Increase
        } else if self.cusum_neg >= self.cfg.h {
            if self.cfg.reset_on_signal {
                self.cusum_neg = 0.0;
            }
            CusumDecision::Decrease
        } else {
            CusumDecision::Continue
        };

        if self.cfg.history_cap > 0 {
            if self.history.len() == self.cfg.history_cap {
                self.history.pop_front();
            }
            self.history.push_back(CusumRecord {
                n: self.n,
                value,
                z,
                cusum_pos: self.cusum_pos,
                cusum_neg: self.cusum_neg,
            });
        }

        CusumOutcome {
            decision,
            cusum_pos: self.cusum_pos,
            cusum_neg: self.cusum_neg,
        }
    }
}
