//! Kulldorff-style spatiotemporal scan statistic.
//!
//! The detector keeps a bounded list of geolocated case records and, on
//! demand, scans candidate cylinders — every unique observed location as a
//! center, crossed with ten evenly spaced radii up to the configured maximum,
//! over a trailing time window — for excess positivity.  Each candidate is
//! scored with the Bernoulli log-likelihood ratio of its observed rate
//! against the baseline, and significance is assessed with the standard
//! chi-squared approximation `p = 1 - χ²₁(2·LLR)` in place of Monte Carlo
//! replication (Kulldorff 1997).
//!
//! Only excess-risk candidates score (`observed_rate > baseline_rate`);
//! overlapping candidates at the same location with different radii are
//! reported independently, not merged — callers that want one cluster per
//! site can take the first (highest-LLR) entry per center.
//!
//! Cost per scan is `O(unique_locations × 10 × recent_cases)`, which is fine
//! at surveillance scale; the case-list cap bounds the worst case.

use std::collections::VecDeque;

use chrono::{Duration, NaiveDate};

use crate::stats::chi_squared_cdf_1df;
use crate::Error;

/// Number of candidate radii scanned per center.
const RADIUS_STEPS: usize = 10;

/// Smallest candidate radius, in kilometers.
const MIN_RADIUS_KM: f64 = 10.0;

/// Mean Earth radius, in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Default cap on retained case records.
pub const DEFAULT_CASE_CAP: usize = 10_000;

/// Default maximum cluster radius, in kilometers.
pub const DEFAULT_MAX_RADIUS_KM: f64 = 100.0;

/// Default trailing time window, in days.
pub const DEFAULT_TIME_WINDOW_DAYS: i64 = 14;

/// One geolocated surveillance sample.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CaseRecord {
    pub date: NaiveDate,
    /// `(latitude, longitude)` in degrees.
    pub location: (f64, f64),
    pub positive: bool,
}

/// A significant excess-risk cluster found by [`ScanDetector::detect_clusters`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cluster {
    /// `(latitude, longitude)` of the candidate center.
    pub center: (f64, f64),
    pub radius_km: f64,
    /// Earliest case date inside the cluster.
    pub start_date: NaiveDate,
    /// Latest case date inside the cluster.
    pub end_date: NaiveDate,
    /// Samples inside the cylinder.
    pub total_cases: u64,
    /// Positive samples inside the cylinder.
    pub positives: u64,
    /// Expected positives under the baseline rate.
    pub expected: f64,
    pub observed_rate: f64,
    /// `observed_rate / baseline_rate`.
    pub relative_risk: f64,
    pub log_likelihood_ratio: f64,
    /// Chi-squared approximation `1 - χ²₁(2·LLR)`.
    pub p_value: f64,
}

/// Configuration for [`ScanDetector`].
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanConfig {
    /// Expected baseline positivity rate, in `(0, 1)`.
    pub baseline_rate: f64,
    /// Significance threshold on the cluster p-value.
    pub alpha: f64,
    /// Largest candidate radius, in kilometers (at least 10).
    pub max_radius_km: f64,
    /// Trailing window length, in days.
    pub max_time_window_days: i64,
    /// Cap on retained case records (oldest evicted first).
    pub case_cap: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            baseline_rate: 0.05,
            alpha: 0.05,
            max_radius_km: DEFAULT_MAX_RADIUS_KM,
            max_time_window_days: DEFAULT_TIME_WINDOW_DAYS,
            case_cap: DEFAULT_CASE_CAP,
        }
    }
}

/// Haversine great-circle distance on a spherical Earth, in kilometers.
///
/// ```rust
/// use episcan::haversine_km;
///
/// assert_eq!(haversine_km((0.0, 0.0), (0.0, 0.0)), 0.0);
/// // One degree of longitude at the equator is ~111.2 km.
/// let d = haversine_km((0.0, 0.0), (0.0, 1.0));
/// assert!((d - 111.2).abs() < 1.0);
/// ```
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * h.sqrt().asin() * EARTH_RADIUS_KM
}

/// Spatiotemporal scan detector over geolocated case records.
///
/// ```rust
/// use chrono::NaiveDate;
/// use episcan::{ScanConfig, ScanDetector};
///
/// let mut scan = ScanDetector::new(ScanConfig::default()).unwrap();
/// let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
/// scan.add_case(day, (40.0, -105.0), true);
/// let clusters = scan.detect_clusters(Some(day));
/// // A degenerate single-point cluster is scored without panicking; every
/// // candidate radius that contains the case reports it independently.
/// assert!(clusters.iter().all(|c| c.total_cases == 1 && c.positives == 1));
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanDetector {
    cfg: ScanConfig,
    cases: VecDeque<CaseRecord>,
}

impl ScanDetector {
    /// Create a detector from `cfg`.
    pub fn new(cfg: ScanConfig) -> Result<Self, Error> {
        Error::check_probability("baseline_rate", cfg.baseline_rate)?;
        Error::check_probability("alpha", cfg.alpha)?;
        if !cfg.max_radius_km.is_finite() || cfg.max_radius_km < MIN_RADIUS_KM {
            return Err(Error::Domain("max_radius_km must be at least 10 km"));
        }
        if cfg.max_time_window_days <= 0 {
            return Err(Error::Domain("max_time_window_days must be positive"));
        }

        Ok(Self {
            cfg,
            cases: VecDeque::new(),
        })
    }

    /// Number of retained case records.
    pub fn case_count(&self) -> usize {
        self.cases.len()
    }

    /// Append a case record, evicting the oldest if at the cap.
    pub fn add_case(&mut self, date: NaiveDate, location: (f64, f64), positive: bool) {
        if self.cfg.case_cap == 0 {
            return;
        }
        if self.cases.len() == self.cfg.case_cap {
            self.cases.pop_front();
        }
        self.cases.push_back(CaseRecord {
            date,
            location,
            positive,
        });
    }

    /// Drop all case records strictly older than `cutoff`.
    pub fn prune_before(&mut self, cutoff: NaiveDate) {
        self.cases.retain(|c| c.date >= cutoff);
    }

    /// Drop all case records.
    pub fn clear(&mut self) {
        self.cases.clear();
    }

    /// Scan for significant excess-risk clusters within the trailing window
    /// ending at `reference_date` (today when `None`).
    ///
    /// Pure read: stored cases are not mutated.  Output is sorted by
    /// log-likelihood ratio, most significant first.
    pub fn detect_clusters(&self, reference_date: Option<NaiveDate>) -> Vec<Cluster> {
        if self.cases.is_empty() {
            return Vec::new();
        }
        let reference = reference_date.unwrap_or_else(|| chrono::Utc::now().date_naive());
        let min_date = reference - Duration::days(self.cfg.max_time_window_days);

        let recent: Vec<&CaseRecord> = self
            .cases
            .iter()
            .filter(|c| c.date >= min_date && c.date <= reference)
            .collect();
        if recent.is_empty() {
            return Vec::new();
        }

        // Unique centers by exact coordinate equality, in a stable order.
        let mut centers: Vec<(f64, f64)> = recent.iter().map(|c| c.location).collect();
        centers.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
        centers.dedup();

        let mut clusters = Vec::new();
        let step = (self.cfg.max_radius_km - MIN_RADIUS_KM) / (RADIUS_STEPS - 1) as f64;

        for &center in &centers {
            for i in 0..RADIUS_STEPS {
                let radius = MIN_RADIUS_KM + step * i as f64;
                if let Some(cluster) = self.score_candidate(center, radius, &recent) {
                    clusters.push(cluster);
                }
            }
        }

        clusters.sort_by(|a, b| b.log_likelihood_ratio.total_cmp(&a.log_likelihood_ratio));
        clusters
    }

    fn score_candidate(
        &self,
        center: (f64, f64),
        radius: f64,
        recent: &[&CaseRecord],
    ) -> Option<Cluster> {
        let members: Vec<&CaseRecord> = recent
            .iter()
            .filter(|c| haversine_km(center, c.location) <= radius)
            .copied()
            .collect();
        if members.is_empty() {
            return None;
        }

        let total = members.len() as u64;
        let positives = members.iter().filter(|c| c.positive).count() as u64;
        let n = total as f64;
        let x = positives as f64;
        let p0 = self.cfg.baseline_rate;

        // Bernoulli LLR of the candidate against the baseline; only excess
        // risk scores, and the degenerate branches avoid ln(0).
        let llr = if positives == 0 {
            0.0
        } else if positives == total {
            n * (1.0 / p0).ln()
        } else {
            let observed = x / n;
            if observed > p0 {
                x * (observed / p0).ln() + (n - x) * ((1.0 - observed) / (1.0 - p0)).ln()
            } else {
                0.0
            }
        };
        if llr <= 0.0 {
            return None;
        }

        let p_value = 1.0 - chi_squared_cdf_1df(2.0 * llr);
        if p_value > self.cfg.alpha {
            return None;
        }

        let start_date = members.iter().map(|c| c.date).min()?;
        let end_date = members.iter().map(|c| c.date).max()?;
        let observed_rate = x / n;

        Some(Cluster {
            center,
            radius_km: radius,
            start_date,
            end_date,
            total_cases: total,
            positives,
            expected: n * p0,
            observed_rate,
            relative_risk: observed_rate / p0,
            log_likelihood_ratio: llr,
            p_value,
        })
    }
}
