//! Orchestrator: runs every enabled detector on each surveillance update and
//! escalates to the highest level any of them indicates.
//!
//! The mapping from detector signals to escalation floors is fixed:
//!
//! | signal                              | floor     |
//! |-------------------------------------|-----------|
//! | SPRT `RejectNull`                   | Warning   |
//! | group sequential `Outbreak`         | Outbreak  |
//! | CUSUM `Increase` (on observed rate) | Alert     |
//! | spatial cluster, relative risk > 2  | Warning   |
//! | spatial cluster, relative risk > 3  | Outbreak  |
//!
//! The final level is the maximum floor of the cycle (Normal when nothing
//! fired); one call never conflates levels or downgrades below what the
//! enabled detectors jointly indicate.  Every cycle appends an audit record
//! to a bounded detection history.

use std::collections::VecDeque;

use chrono::NaiveDate;

use crate::{
    Cluster, Cusum, CusumConfig, CusumDecision, DetectionLevel, Error, GroupSequential,
    GroupSequentialConfig, GsDecision, ScanConfig, ScanDetector, Sprt, SprtDecision,
};

/// Default cap on the detection history ring.
pub const DEFAULT_DETECTION_HISTORY_CAP: usize = 1000;

/// Relative risk above which a spatial cluster escalates to Warning.
const CLUSTER_WARNING_RISK: f64 = 2.0;

/// Relative risk above which a spatial cluster escalates to Outbreak.
const CLUSTER_OUTBREAK_RISK: f64 = 3.0;

/// Configuration for [`OutbreakDetector`].
///
/// Each sub-detector has its own enable flag; a disabled detector is simply
/// never constructed.  Sub-detector parameters are derived from
/// `baseline_rate`, `target_shift`, and `alpha` the same way throughout:
/// the SPRT targets `baseline_rate + target_shift`, the group sequential
/// test uses `target_shift` as its effect size, and CUSUM monitors the
/// observed rate around `baseline_rate`.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutbreakConfig {
    /// Expected baseline positivity rate, in `(0, 1)`.
    pub baseline_rate: f64,
    /// Rate increase worth detecting; `baseline_rate + target_shift` must
    /// stay below 1 when the SPRT is enabled.
    pub target_shift: f64,
    /// Significance level shared by the sub-detectors.
    pub alpha: f64,
    pub sprt_enabled: bool,
    pub group_sequential_enabled: bool,
    pub cusum_enabled: bool,
    pub spatial_enabled: bool,
    /// Cap on the detection history ring (oldest entries evicted first).
    pub history_cap: usize,
}

impl Default for OutbreakConfig {
    fn default() -> Self {
        Self {
            baseline_rate: 0.05,
            target_shift: 0.10,
            alpha: 0.05,
            sprt_enabled: true,
            group_sequential_enabled: true,
            cusum_enabled: true,
            spatial_enabled: true,
            history_cap: DEFAULT_DETECTION_HISTORY_CAP,
        }
    }
}

/// Audit record for one update cycle.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HistoryEntry {
    pub date: NaiveDate,
    pub positives: u64,
    pub total: u64,
    pub observed_rate: f64,
    /// `None` when the SPRT is disabled.
    pub sprt: Option<SprtDecision>,
    /// `None` when the group sequential test is disabled.
    pub group_sequential: Option<GsDecision>,
    /// `None` when CUSUM is disabled.
    pub cusum: Option<CusumDecision>,
    /// Significant clusters found this cycle (0 when spatial is disabled or
    /// no locations were supplied).
    pub spatial_clusters: usize,
    /// Level this cycle resolved to.
    pub level: DetectionLevel,
}

/// Read-only snapshot returned by [`OutbreakDetector::status`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Status {
    pub level: DetectionLevel,
    /// Up to the last 10 history entries, oldest first.
    pub recent: Vec<HistoryEntry>,
    pub baseline_rate: f64,
    pub target_shift: f64,
}

/// Combined outbreak detector over a surveillance count stream.
///
/// Owns one instance of each enabled sub-detector (composition, no sharing);
/// drive it from a single caller and shard one instance per monitored
/// signal.
///
/// ```rust
/// use chrono::NaiveDate;
/// use episcan::{DetectionLevel, OutbreakConfig, OutbreakDetector};
///
/// let mut det = OutbreakDetector::new(OutbreakConfig::default()).unwrap();
/// let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let level = det.update(1, 30, Some(day), None).unwrap();
/// assert_eq!(level, DetectionLevel::Normal);
/// assert_eq!(det.history().count(), 1);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutbreakDetector {
    cfg: OutbreakConfig,
    sprt: Option<Sprt>,
    group_sequential: Option<GroupSequential>,
    cusum: Option<Cusum>,
    spatial: Option<ScanDetector>,
    current_level: DetectionLevel,
    history: VecDeque<HistoryEntry>,
}

impl OutbreakDetector {
    /// Build the enabled sub-detectors from `cfg`.
    pub fn new(cfg: OutbreakConfig) -> Result<Self, Error> {
        Error::check_probability("baseline_rate", cfg.baseline_rate)?;
        Error::check_probability("alpha", cfg.alpha)?;
        if !cfg.target_shift.is_finite() || cfg.target_shift <= 0.0 {
            return Err(Error::Domain("target_shift must be positive and finite"));
        }

        let sprt = if cfg.sprt_enabled {
            Some(Sprt::new(
                cfg.baseline_rate,
                cfg.baseline_rate + cfg.target_shift,
                cfg.alpha,
                0.2,
            )?)
        } else {
            None
        };

        let group_sequential = if cfg.group_sequential_enabled {
            Some(GroupSequential::new(GroupSequentialConfig {
                baseline_rate: cfg.baseline_rate,
                effect_size: cfg.target_shift,
                alpha: cfg.alpha,
                ..GroupSequentialConfig::default()
            })?)
        } else {
            None
        };

        let cusum = if cfg.cusum_enabled {
            Some(Cusum::new(CusumConfig {
                baseline_mean: cfg.baseline_rate,
                target_shift: cfg.target_shift,
                std_dev: None,
                reset_on_signal: true,
                history_cap: cfg.history_cap,
                ..CusumConfig::default()
            })?)
        } else {
            None
        };

        let spatial = if cfg.spatial_enabled {
            Some(ScanDetector::new(ScanConfig {
                baseline_rate: cfg.baseline_rate,
                alpha: cfg.alpha,
                ..ScanConfig::default()
            })?)
        } else {
            None
        };

        Ok(Self {
            cfg,
            sprt,
            group_sequential,
            cusum,
            spatial,
            current_level: DetectionLevel::Normal,
            history: VecDeque::new(),
        })
    }

    /// Level from the most recent update cycle.
    pub fn current_level(&self) -> DetectionLevel {
        self.current_level
    }

    /// Retained audit records, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.history.iter()
    }

    /// The group sequential sub-detector, when enabled.
    pub fn group_sequential(&self) -> Option<&GroupSequential> {
        self.group_sequential.as_ref()
    }

    /// The CUSUM sub-detector, when enabled.
    pub fn cusum(&self) -> Option<&Cusum> {
        self.cusum.as_ref()
    }

    /// The spatial sub-detector, when enabled.
    pub fn spatial(&self) -> Option<&ScanDetector> {
        self.spatial.as_ref()
    }

    /// Feed one labeled case directly to the spatial detector.
    ///
    /// This sidesteps the aggregate-count labeling convention of
    /// [`update`](Self::update) (see below) for callers that know per-case
    /// outcomes.  No-op when the spatial detector is disabled.
    pub fn record_case(&mut self, date: NaiveDate, location: (f64, f64), positive: bool) {
        if let Some(spatial) = self.spatial.as_mut() {
            spatial.add_case(date, location, positive);
        }
    }

    /// Reset every sub-detector and clear the detection history.
    ///
    /// The configuration (and the SPRT, which is stateless) is untouched.
    pub fn reset(&mut self) {
        if let Some(gs) = self.group_sequential.as_mut() {
            gs.reset();
        }
        if let Some(cusum) = self.cusum.as_mut() {
            cusum.reset();
        }
        if let Some(spatial) = self.spatial.as_mut() {
            spatial.clear();
        }
        self.current_level = DetectionLevel::Normal;
        self.history.clear();
    }

    /// Read-only snapshot: current level, the last 10 history entries
    /// (oldest first), and the headline configuration.
    pub fn status(&self) -> Status {
        let skip = self.history.len().saturating_sub(10);
        Status {
            level: self.current_level,
            recent: self.history.iter().skip(skip).cloned().collect(),
            baseline_rate: self.cfg.baseline_rate,
            target_shift: self.cfg.target_shift,
        }
    }

    /// Run one surveillance update cycle.
    ///
    /// `date` defaults to today.  When `locations` is supplied and the
    /// spatial detector is enabled, the first `positives` locations are
    /// labeled positive — the aggregate interface carries no per-sample
    /// labels, so this deterministic convention stands in for them; use
    /// [`record_case`](Self::record_case) when real labels are available.
    ///
    /// `total == 0` leaves all state untouched and returns the current
    /// level.
    pub fn update(
        &mut self,
        positives: u64,
        total: u64,
        date: Option<NaiveDate>,
        locations: Option<&[(f64, f64)]>,
    ) -> Result<DetectionLevel, Error> {
        Error::check_counts(positives, total)?;
        if total == 0 {
            return Ok(self.current_level);
        }

        let date = date.unwrap_or_else(|| chrono::Utc::now().date_naive());
        let observed_rate = positives as f64 / total as f64;
        let mut level = DetectionLevel::Normal;

        let sprt_decision = match &self.sprt {
            Some(sprt) => {
                let out = sprt.update(positives, total)?;
                if out.decision == SprtDecision::RejectNull {
                    level = level.max(DetectionLevel::Warning);
                }
                Some(out.decision)
            }
            None => None,
        };

        let gs_decision = match self.group_sequential.as_mut() {
            Some(gs) => {
                let out = gs.update(positives, total)?;
                if out.decision == GsDecision::Outbreak {
                    level = level.max(DetectionLevel::Outbreak);
                }
                Some(out.decision)
            }
            None => None,
        };

        let cusum_decision = match self.cusum.as_mut() {
            Some(cusum) => {
                // The monitored scalar is the rate, not the raw count.
                let out = cusum.update(observed_rate);
                if out.decision == CusumDecision::Increase {
                    level = level.max(DetectionLevel::Alert);
                }
                Some(out.decision)
            }
            None => None,
        };

        let mut spatial_clusters = 0;
        if let (Some(spatial), Some(locations)) = (self.spatial.as_mut(), locations) {
            for (i, &location) in locations.iter().enumerate().take(total as usize) {
                spatial.add_case(date, location, (i as u64) < positives);
            }
            let clusters = spatial.detect_clusters(Some(date));
            spatial_clusters = clusters.len();
            level = level.max(cluster_escalation(&clusters));
        }

        if self.cfg.history_cap > 0 {
            if self.history.len() == self.cfg.history_cap {
                self.history.pop_front();
            }
            self.history.push_back(HistoryEntry {
                date,
                positives,
                total,
                observed_rate,
                sprt: sprt_decision,
                group_sequential: gs_decision,
                cusum: cusum_decision,
                spatial_clusters,
                level,
            });
        }

        self.current_level = level;
        Ok(level)
    }
}

/// Highest escalation floor any cluster's relative risk warrants.
fn cluster_escalation(clusters: &[Cluster]) -> DetectionLevel {
    let mut level = DetectionLevel::Normal;
    for c in clusters {
        if c.relative_risk > CLUSTER_OUTBREAK_RISK {
            level = level.max(DetectionLevel::Outbreak);
        } else if c.relative_risk > CLUSTER_WARNING_RISK {
            level = level.max(DetectionLevel::Warning);
        }
    }
    level
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn only(
        sprt: bool,
        gs: bool,
        cusum: bool,
        spatial: bool,
    ) -> OutbreakDetector {
        OutbreakDetector::new(OutbreakConfig {
            sprt_enabled: sprt,
            group_sequential_enabled: gs,
            cusum_enabled: cusum,
            spatial_enabled: spatial,
            ..OutbreakConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn zero_total_is_a_noop() {
        let mut det = only(true, true, true, true);
        assert_eq!(
            det.update(0, 0, Some(day(1)), None).unwrap(),
            DetectionLevel::Normal
        );
        assert_eq!(det.history().count(), 0);
        assert_eq!(det.group_sequential().unwrap().current_stage(), 0);
    }

    #[test]
    fn cusum_signal_alone_yields_exactly_alert() {
        let mut det = only(false, false, true, false);
        let mut seen_alert = false;
        for (i, positives) in [2u64, 3, 4, 6, 8, 10, 12, 13, 14, 15].iter().enumerate() {
            let level = det
                .update(*positives, 20, Some(day(i as u32 + 1)), None)
                .unwrap();
            assert!(
                level == DetectionLevel::Normal || level == DetectionLevel::Alert,
                "lone CUSUM must never exceed Alert, got {level}"
            );
            seen_alert |= level == DetectionLevel::Alert;
        }
        assert!(seen_alert, "rising rates should trip the CUSUM");
    }

    #[test]
    fn group_sequential_signal_alone_yields_outbreak() {
        let mut det = only(false, true, false, false);
        let level = det.update(30, 40, Some(day(1)), None).unwrap();
        assert_eq!(level, DetectionLevel::Outbreak);
    }

    #[test]
    fn sprt_signal_alone_yields_warning() {
        // Under the source orientation of the likelihood ratio, a large
        // all-negative batch is what crosses the upper Wald bound.
        let mut det = only(true, false, false, false);
        let level = det.update(0, 30, Some(day(1)), None).unwrap();
        assert_eq!(level, DetectionLevel::Warning);
    }

    #[test]
    fn high_risk_cluster_yields_outbreak() {
        let mut det = OutbreakDetector::new(OutbreakConfig {
            sprt_enabled: false,
            group_sequential_enabled: false,
            cusum_enabled: false,
            spatial_enabled: true,
            ..OutbreakConfig::default()
        })
        .unwrap();
        let locations = vec![(40.0, -105.0); 25];
        // 20/25 against a 5% baseline: relative risk 16.
        let level = det.update(20, 25, Some(day(1)), Some(&locations)).unwrap();
        assert_eq!(level, DetectionLevel::Outbreak);
        assert!(det.history().next().unwrap().spatial_clusters > 0);
    }

    #[test]
    fn moderate_risk_cluster_yields_warning() {
        let mut det = OutbreakDetector::new(OutbreakConfig {
            baseline_rate: 0.25,
            sprt_enabled: false,
            group_sequential_enabled: false,
            cusum_enabled: false,
            spatial_enabled: true,
            ..OutbreakConfig::default()
        })
        .unwrap();
        let locations = vec![(40.0, -105.0); 25];
        // 15/25 = 0.6 against 0.25: relative risk 2.4.
        let level = det.update(15, 25, Some(day(1)), Some(&locations)).unwrap();
        assert_eq!(level, DetectionLevel::Warning);
    }

    #[test]
    fn escalation_keeps_the_highest_floor() {
        // Group sequential Outbreak beats a simultaneous CUSUM Alert.
        let mut det = only(false, true, true, false);
        let level = det.update(30, 40, Some(day(1)), None).unwrap();
        assert_eq!(level, DetectionLevel::Outbreak);
        let entry = det.history().next().unwrap();
        assert_eq!(entry.group_sequential, Some(GsDecision::Outbreak));
        assert_eq!(entry.level, DetectionLevel::Outbreak);
    }

    #[test]
    fn level_reflects_the_latest_cycle_only() {
        // CUSUM resets on signal, so an Alert cycle followed by an
        // at-baseline cycle drops back to Normal.
        let mut det = only(false, false, true, false);
        let mut alert_day = None;
        for (i, positives) in [2u64, 3, 4, 6].iter().enumerate() {
            let d = day(i as u32 + 1);
            if det.update(*positives, 20, Some(d), None).unwrap() == DetectionLevel::Alert {
                alert_day = Some(d);
            }
        }
        assert!(alert_day.is_some());
        assert_eq!(
            det.update(1, 20, Some(day(5)), None).unwrap(),
            DetectionLevel::Normal
        );
        assert_eq!(det.current_level(), DetectionLevel::Normal);
    }

    #[test]
    fn history_records_every_cycle_in_order() {
        let mut det = only(true, true, true, false);
        for d in 1..=5 {
            det.update(2, 40, Some(day(d)), None).unwrap();
        }
        let dates: Vec<_> = det.history().map(|e| e.date).collect();
        assert_eq!(dates, (1..=5).map(day).collect::<Vec<_>>());
        for e in det.history() {
            assert_eq!(e.total, 40);
            assert!(e.sprt.is_some());
            assert!(e.group_sequential.is_some());
            assert!(e.cusum.is_some());
            assert_eq!(e.spatial_clusters, 0);
        }
    }

    #[test]
    fn history_is_bounded() {
        let mut det = OutbreakDetector::new(OutbreakConfig {
            history_cap: 4,
            spatial_enabled: false,
            ..OutbreakConfig::default()
        })
        .unwrap();
        for d in 1..=10 {
            det.update(2, 40, Some(day(d)), None).unwrap();
        }
        assert_eq!(det.history().count(), 4);
        assert_eq!(det.history().next().unwrap().date, day(7));
    }

    #[test]
    fn status_snapshot_has_last_ten_oldest_first() {
        let mut det = only(false, false, true, false);
        for d in 1..=15 {
            det.update(2, 40, Some(day(d)), None).unwrap();
        }
        let status = det.status();
        assert_eq!(status.recent.len(), 10);
        assert_eq!(status.recent[0].date, day(6));
        assert_eq!(status.recent[9].date, day(15));
        assert_eq!(status.level, det.current_level());
        assert_eq!(status.baseline_rate, 0.05);
        assert_eq!(status.target_shift, 0.10);
    }

    #[test]
    fn record_case_feeds_the_spatial_detector() {
        let mut det = only(false, false, false, true);
        for _ in 0..15 {
            det.record_case(day(1), (40.0, -105.0), true);
        }
        assert_eq!(det.spatial().unwrap().case_count(), 15);
        // record_case is a no-op when spatial is disabled.
        let mut det = only(false, false, false, false);
        det.record_case(day(1), (40.0, -105.0), true);
        assert!(det.spatial().is_none());
    }

    #[test]
    fn reset_restores_a_fresh_detector() {
        let mut det = only(true, true, true, true);
        let locations = vec![(40.0, -105.0); 25];
        det.update(20, 25, Some(day(1)), Some(&locations)).unwrap();
        assert_ne!(det.current_level(), DetectionLevel::Normal);
        det.reset();
        assert_eq!(det.current_level(), DetectionLevel::Normal);
        assert_eq!(det.history().count(), 0);
        assert_eq!(det.group_sequential().unwrap().current_stage(), 0);
        assert_eq!(det.spatial().unwrap().case_count(), 0);
    }

    #[test]
    fn rejects_invalid_configs_and_counts() {
        assert!(OutbreakDetector::new(OutbreakConfig {
            baseline_rate: 0.0,
            ..OutbreakConfig::default()
        })
        .is_err());
        assert!(OutbreakDetector::new(OutbreakConfig {
            target_shift: 0.0,
            ..OutbreakConfig::default()
        })
        .is_err());
        // SPRT target rate pushed out of (0, 1).
        assert!(OutbreakDetector::new(OutbreakConfig {
            baseline_rate: 0.9,
            target_shift: 0.2,
            ..OutbreakConfig::default()
        })
        .is_err());
        let mut det = only(true, true, true, true);
        assert!(det.update(5, 4, Some(day(1)), None).is_err());
    }
}
