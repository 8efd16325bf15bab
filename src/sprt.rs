//! Wald's Sequential Probability Ratio Test over a binomial proportion.
//!
//! The SPRT compares two simple hypotheses about a positivity rate — the
//! baseline `p0` against an elevated target `p1` — with decision thresholds
//! chosen so the type I/II error rates are bounded by `alpha`/`beta`
//! (Wald 1945).  Here it is applied *per batch*: each call to
//! [`Sprt::update`] evaluates only the counts it is given, with no cumulative
//! state across calls.  The surrounding orchestrator re-invokes it on every
//! reporting window, so a single extreme window is what crosses a boundary.

use crate::Error;

/// Verdict of one SPRT evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SprtDecision {
    /// Evidence crossed the upper Wald bound: the elevated rate is favored.
    RejectNull,
    /// Evidence crossed the lower Wald bound: the baseline rate is favored.
    AcceptNull,
    /// Evidence is between the bounds; keep monitoring.
    Continue,
}

/// Result of [`Sprt::update`]: the decision plus the statistic behind it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SprtOutcome {
    pub decision: SprtDecision,
    /// Binomial log-likelihood ratio for this batch.
    pub llr: f64,
}

/// Per-batch Wald SPRT for a binomial positivity rate.
///
/// ```rust
/// use episcan::{Sprt, SprtDecision};
///
/// let sprt = Sprt::new(0.05, 0.15, 0.05, 0.2).unwrap();
/// // An empty batch carries no information.
/// let out = sprt.update(0, 0).unwrap();
/// assert_eq!(out.decision, SprtDecision::Continue);
/// assert_eq!(out.llr, 0.0);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sprt {
    baseline_rate: f64,
    target_rate: f64,
    alpha: f64,
    beta: f64,
    upper_bound: f64,
    lower_bound: f64,
}

impl Sprt {
    /// Create an SPRT comparing `baseline_rate` against `target_rate`.
    ///
    /// All four parameters must lie strictly inside `(0, 1)`.
    pub fn new(
        baseline_rate: f64,
        target_rate: f64,
        alpha: f64,
        beta: f64,
    ) -> Result<Self, Error> {
        Error::check_probability("baseline_rate", baseline_rate)?;
        Error::check_probability("target_rate", target_rate)?;
        Error::check_probability("alpha", alpha)?;
        Error::check_probability("beta", beta)?;

        Ok(Self {
            baseline_rate,
            target_rate,
            alpha,
            beta,
            upper_bound: ((1.0 - beta) / alpha).ln(),
            lower_bound: (beta / (1.0 - alpha)).ln(),
        })
    }

    /// Upper Wald decision bound `ln((1-β)/α)`.
    pub fn upper_bound(&self) -> f64 {
        self.upper_bound
    }

    /// Lower Wald decision bound `ln(β/(1-α))`.
    pub fn lower_bound(&self) -> f64 {
        self.lower_bound
    }

    /// Evaluate one batch of counts.
    ///
    /// Stateless across calls: the decision reflects only this batch.
    /// `total == 0` yields `(Continue, 0.0)`; `positives > total` is a
    /// precondition violation.
    pub fn update(&self, positives: u64, total: u64) -> Result<SprtOutcome, Error> {
        Error::check_counts(positives, total)?;

        if total == 0 {
            return Ok(SprtOutcome {
                decision: SprtDecision::Continue,
                llr: 0.0,
            });
        }

        let n = total as f64;
        let x = positives as f64;

        // The branches avoid 0·ln(0); the general formula is the same in all
        // three cases.
        let llr = if positives == 0 {
            n * ((1.0 - self.baseline_rate) / (1.0 - self.target_rate)).ln()
        } else if positives == total {
            n * (self.baseline_rate / self.target_rate).ln()
        } else {
            x * (self.baseline_rate / self.target_rate).ln()
                + (n - x) * ((1.0 - self.baseline_rate) / (1.0 - self.target_rate)).ln()
        };

        let decision = if llr >= self.upper_bound {
            SprtDecision::RejectNull
        } else if llr <= self.lower_bound {
            SprtDecision::AcceptNull
        } else {
            SprtDecision::Continue
        };

        Ok(SprtOutcome { decision, llr })
    }
}
