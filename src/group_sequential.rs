//! Multi-stage group sequential testing with classical stopping boundaries.
//!
//! Counts accumulate across stages; at each stage a z-statistic for the
//! cumulative positivity rate against the baseline is compared to a
//! precomputed efficacy boundary.  Two boundary families are supported:
//!
//! - **O'Brien–Fleming** (1979): `Φ⁻¹(1-α/2) / √(i/max_stages)` at stage `i`
//!   — very strict early, relaxing toward the fixed-sample critical value at
//!   the final stage.
//! - **Pocock** (1977): a constant boundary at every stage, computed here as
//!   the Bonferroni adjustment `Φ⁻¹(1 - (α/max_stages)/2)`.  This is an
//!   approximation, not the exact Pocock constant (which needs multivariate
//!   normal quantiles); it is deliberately kept as documented behavior since
//!   replacing it would change detection sensitivity.
//!
//! Stage advancement is unconditional: every successful update consumes a
//! stage, even one that signals.  Callers that want to halt stop calling once
//! the decision is no longer [`GsDecision::Continue`]; after `max_stages`
//! updates the detector answers [`GsDecision::Completed`] forever (or until
//! [`GroupSequential::reset`]).

use std::collections::VecDeque;

use crate::stats::normal_cdf;
use crate::stats::normal_quantile;
use crate::Error;

/// Default number of analysis stages.
pub const DEFAULT_MAX_STAGES: usize = 5;

/// Default cap on the retained per-stage audit log.
pub const DEFAULT_STAGE_LOG_CAP: usize = 1000;

/// Which stopping-boundary family to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BoundaryShape {
    /// O'Brien–Fleming: strict early boundaries that relax over stages.
    #[default]
    OBrienFleming,
    /// Pocock via Bonferroni: one constant boundary for every stage.
    ///
    /// Approximation of the true Pocock constant; see the module docs.
    Pocock,
}

/// Verdict of one group sequential stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum GsDecision {
    /// The z-statistic crossed this stage's efficacy boundary.
    Outbreak,
    /// All stages elapsed without a boundary crossing.
    NoOutbreak,
    /// More stages remain; keep monitoring.
    Continue,
    /// The test already consumed all stages; this call was a no-op.
    Completed,
}

/// Result of [`GroupSequential::update`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GsOutcome {
    pub decision: GsDecision,
    /// z-statistic of the cumulative observed rate against the baseline.
    pub z: f64,
    /// Upper-tail normal p-value `1 - Φ(z)`.
    pub p_value: f64,
}

/// Audit record for one completed stage.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StageRecord {
    /// 1-based stage number.
    pub stage: usize,
    /// Positives in this stage's batch.
    pub positives: u64,
    /// Total samples in this stage's batch.
    pub total: u64,
    /// Cumulative positives through this stage.
    pub cumulative_positives: u64,
    /// Cumulative total through this stage.
    pub cumulative_total: u64,
    /// Cumulative observed positivity rate.
    pub observed_rate: f64,
    /// z-statistic at this stage.
    pub z: f64,
    /// Upper-tail p-value at this stage.
    pub p_value: f64,
    /// Efficacy boundary in force at this stage.
    pub boundary: f64,
}

/// Configuration for [`GroupSequential`].
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupSequentialConfig {
    /// Expected baseline positivity rate, in `(0, 1)`.
    pub baseline_rate: f64,
    /// Minimum rate increase worth detecting (kept for audit; the z-test
    /// itself is against the baseline).
    pub effect_size: f64,
    /// Number of analysis stages (≥ 1).
    pub max_stages: usize,
    /// Type I error rate, in `(0, 1)`.
    pub alpha: f64,
    /// Type II error rate, in `(0, 1)`.
    pub beta: f64,
    /// Boundary family.
    pub boundary: BoundaryShape,
    /// Cap on the retained stage log (oldest records evicted first).
    pub stage_log_cap: usize,
}

impl Default for GroupSequentialConfig {
    fn default() -> Self {
        Self {
            baseline_rate: 0.05,
            effect_size: 0.10,
            max_stages: DEFAULT_MAX_STAGES,
            alpha: 0.05,
            beta: 0.2,
            boundary: BoundaryShape::OBrienFleming,
            stage_log_cap: DEFAULT_STAGE_LOG_CAP,
        }
    }
}

/// Stage-stateful group sequential outbreak test.
///
/// ```rust
/// use episcan::{GroupSequential, GroupSequentialConfig, GsDecision};
///
/// let mut gs = GroupSequential::new(GroupSequentialConfig::default()).unwrap();
/// let out = gs.update(3, 50).unwrap();
/// assert_eq!(out.decision, GsDecision::Continue);
/// assert_eq!(gs.current_stage(), 1);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupSequential {
    cfg: GroupSequentialConfig,
    efficacy_boundaries: Vec<f64>,
    current_stage: usize,
    cumulative_positives: u64,
    cumulative_total: u64,
    stage_log: VecDeque<StageRecord>,
}

impl GroupSequential {
    /// Create a detector with boundaries precomputed from `cfg`.
    pub fn new(cfg: GroupSequentialConfig) -> Result<Self, Error> {
        Error::check_probability("baseline_rate", cfg.baseline_rate)?;
        Error::check_probability("alpha", cfg.alpha)?;
        Error::check_probability("beta", cfg.beta)?;
        if cfg.max_stages == 0 {
            return Err(Error::Domain("max_stages must be at least 1"));
        }
        if !cfg.effect_size.is_finite() || cfg.effect_size <= 0.0 {
            return Err(Error::Domain("effect_size must be positive and finite"));
        }

        let efficacy_boundaries = match cfg.boundary {
            BoundaryShape::OBrienFleming => {
                let c = normal_quantile(1.0 - cfg.alpha / 2.0);
                (1..=cfg.max_stages)
                    .map(|i| {
                        let t = i as f64 / cfg.max_stages as f64;
                        c / t.sqrt()
                    })
                    .collect()
            }
            BoundaryShape::Pocock => {
                let adjusted = cfg.alpha / cfg.max_stages as f64;
                let b = normal_quantile(1.0 - adjusted / 2.0);
                vec![b; cfg.max_stages]
            }
        };

        Ok(Self {
            cfg,
            efficacy_boundaries,
            current_stage: 0,
            cumulative_positives: 0,
            cumulative_total: 0,
            stage_log: VecDeque::new(),
        })
    }

    /// Precomputed efficacy boundaries, one per stage.
    pub fn boundaries(&self) -> &[f64] {
        &self.efficacy_boundaries
    }

    /// Stages consumed so far (never exceeds `max_stages`).
    pub fn current_stage(&self) -> usize {
        self.current_stage
    }

    /// Retained per-stage audit records, oldest first.
    pub fn stage_log(&self) -> impl Iterator<Item = &StageRecord> + '_ {
        self.stage_log.iter()
    }

    /// Clear cumulative counts, stage position, and the audit log.
    ///
    /// Boundaries are retained (they depend only on the config).
    pub fn reset(&mut self) {
        self.current_stage = 0;
        self.cumulative_positives = 0;
        self.cumulative_total = 0;
        self.stage_log.clear();
    }

    /// Feed one stage's batch of counts.
    ///
    /// Past `max_stages`, returns `(Completed, 0.0, 1.0)` without touching
    /// any state.  A batch that leaves the cumulative total at zero returns
    /// `(Continue, 0.0, 1.0)` without consuming a stage.
    pub fn update(&mut self, positives: u64, total: u64) -> Result<GsOutcome, Error> {
        Error::check_counts(positives, total)?;

        if self.current_stage >= self.cfg.max_stages {
            return Ok(GsOutcome {
                decision: GsDecision::Completed,
                z: 0.0,
                p_value: 1.0,
            });
        }

        self.cumulative_positives += positives;
        self.cumulative_total += total;

        if self.cumulative_total == 0 {
            return Ok(GsOutcome {
                decision: GsDecision::Continue,
                z: 0.0,
                p_value: 1.0,
            });
        }

        let observed_rate = self.cumulative_positives as f64 / self.cumulative_total as f64;
        let se = (self.cfg.baseline_rate * (1.0 - self.cfg.baseline_rate)
            / self.cumulative_total as f64)
            .sqrt();
        let z = if se > 0.0 {
            (observed_rate - self.cfg.baseline_rate) / se
        } else {
            0.0
        };
        let p_value = 1.0 - normal_cdf(z);
        let boundary = self.efficacy_boundaries[self.current_stage];

        if self.stage_log.len() == self.cfg.stage_log_cap && self.cfg.stage_log_cap > 0 {
            self.stage_log.pop_front();
        }
        if self.cfg.stage_log_cap > 0 {
            self.stage_log.push_back(StageRecord {
                stage: self.current_stage + 1,
                positives,
                total,
                cumulative_positives: self.cumulative_positives,
                cumulative_total: self.cumulative_total,
                observed_rate,
                z,
                p_value,
                boundary,
            });
        }

        let mut decision = if z >= boundary {
            GsDecision::Outbreak
        } else {
            GsDecision::Continue
        };

        // Stage advances even on a signal; the state machine has no early
        // termination of its own.
        self.current_stage += 1;
        if self.current_stage >= self.cfg.max_stages && decision == GsDecision::Continue {
            decision = GsDecision::NoOutbreak;
        }

        Ok(GsOutcome {
            decision,
            z,
            p_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gs(boundary: BoundaryShape) -> GroupSequential {
        GroupSequential::new(GroupSequentialConfig {
            boundary,
            ..GroupSequentialConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn obf_boundaries_shrink_across_stages() {
        let g = gs(BoundaryShape::OBrienFleming);
        let b = g.boundaries();
        assert_eq!(b.len(), DEFAULT_MAX_STAGES);
        for w in b.windows(2) {
            assert!(w[0] > w[1], "boundaries must strictly decrease: {b:?}");
        }
        // Final boundary is the fixed-sample critical value.
        assert!((b[DEFAULT_MAX_STAGES - 1] - 1.96).abs() < 5e-3);
        // First boundary is c / sqrt(1/5) = c * sqrt(5).
        assert!((b[0] - 1.96 * 5.0f64.sqrt()).abs() < 2e-2);
    }

    #[test]
    fn pocock_boundary_is_constant() {
        let g = gs(BoundaryShape::Pocock);
        let b = g.boundaries();
        assert!(b.windows(2).all(|w| w[0] == w[1]));
        // Bonferroni: quantile at 1 - (0.05/5)/2 = 0.995, i.e. ~2.576.
        assert!((b[0] - 2.576).abs() < 5e-3, "b0={}", b[0]);
    }

    #[test]
    fn completes_after_max_stages_then_noops() {
        let mut g = gs(BoundaryShape::OBrienFleming);
        for _ in 0..DEFAULT_MAX_STAGES {
            let out = g.update(2, 40).unwrap();
            assert_ne!(out.decision, GsDecision::Completed);
        }
        assert_eq!(g.current_stage(), DEFAULT_MAX_STAGES);
        // Arguments no longer matter.
        let out = g.update(40, 40).unwrap();
        assert_eq!(out.decision, GsDecision::Completed);
        assert_eq!(out.z, 0.0);
        assert_eq!(out.p_value, 1.0);
        assert_eq!(g.current_stage(), DEFAULT_MAX_STAGES);
    }

    #[test]
    fn final_stage_without_crossing_is_no_outbreak() {
        let mut g = gs(BoundaryShape::OBrienFleming);
        let mut last = None;
        for _ in 0..DEFAULT_MAX_STAGES {
            last = Some(g.update(2, 40).unwrap());
        }
        assert_eq!(last.unwrap().decision, GsDecision::NoOutbreak);
    }

    #[test]
    fn extreme_excess_crosses_a_boundary() {
        // 30/40 positives against a 5% baseline: z is enormous even for the
        // earliest (strictest) O'Brien-Fleming boundary.
        let mut g = gs(BoundaryShape::OBrienFleming);
        let out = g.update(30, 40).unwrap();
        assert_eq!(out.decision, GsDecision::Outbreak);
        assert!(out.z > g.boundaries()[0]);
        assert!(out.p_value < 1e-6);
        // Signaling still consumed the stage.
        assert_eq!(g.current_stage(), 1);
    }

    #[test]
    fn zero_cumulative_total_continues_without_consuming_a_stage() {
        let mut g = gs(BoundaryShape::OBrienFleming);
        let out = g.update(0, 0).unwrap();
        assert_eq!(out.decision, GsDecision::Continue);
        assert_eq!(out.p_value, 1.0);
        assert_eq!(g.current_stage(), 0);
    }

    #[test]
    fn stage_log_records_every_consumed_stage() {
        let mut g = gs(BoundaryShape::Pocock);
        g.update(1, 20).unwrap();
        g.update(2, 20).unwrap();
        let log: Vec<_> = g.stage_log().collect();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].stage, 1);
        assert_eq!(log[1].stage, 2);
        assert_eq!(log[1].cumulative_positives, 3);
        assert_eq!(log[1].cumulative_total, 40);
        assert_eq!(log[1].boundary, g.boundaries()[1]);
    }

    #[test]
    fn stage_log_is_bounded() {
        let mut g = GroupSequential::new(GroupSequentialConfig {
            max_stages: 100,
            stage_log_cap: 3,
            ..GroupSequentialConfig::default()
        })
        .unwrap();
        for _ in 0..10 {
            g.update(1, 20).unwrap();
        }
        let log: Vec<_> = g.stage_log().collect();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].stage, 8);
        assert_eq!(log[2].stage, 10);
    }

    #[test]
    fn reset_restores_a_fresh_test() {
        let mut g = gs(BoundaryShape::OBrienFleming);
        for _ in 0..DEFAULT_MAX_STAGES {
            g.update(1, 20).unwrap();
        }
        g.reset();
        assert_eq!(g.current_stage(), 0);
        assert_eq!(g.stage_log().count(), 0);
        let out = g.update(1, 20).unwrap();
        assert_eq!(out.decision, GsDecision::Continue);
    }

    #[test]
    fn rejects_degenerate_configs() {
        assert!(GroupSequential::new(GroupSequentialConfig {
            max_stages: 0,
            ..GroupSequentialConfig::default()
        })
        .is_err());
        assert!(GroupSequential::new(GroupSequentialConfig {
            baseline_rate: 0.0,
            ..GroupSequentialConfig::default()
        })
        .is_err());
        assert!(GroupSequential::new(GroupSequentialConfig {
            effect_size: -0.1,
            ..GroupSequentialConfig::default()
        })
        .is_err());
    }
}
