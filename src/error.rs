//! Crate-level error type.
//!
//! Errors here mean the *caller* violated a precondition (counts that don't
//! add up, probabilities outside `(0, 1)`).  Steady-state edge cases — empty
//! batches, exhausted stages, empty case lists — are expressed as sentinel
//! decisions on the success path instead, so a long-running surveillance loop
//! never has to branch on `Err` once its configuration is validated.

/// Precondition violations reported by detector constructors and updates.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A probability-like parameter was outside the open interval `(0, 1)`.
    #[error("{name} must be in (0, 1), got {value}")]
    ProbabilityRange {
        /// Parameter name as it appears in the config.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// A batch reported more positives than samples.
    #[error("positives ({positives}) exceed total ({total})")]
    CountMismatch {
        /// Positive detections in the batch.
        positives: u64,
        /// Total samples in the batch.
        total: u64,
    },

    /// A parameter failed a domain check not covered by the variants above.
    #[error("{0}")]
    Domain(&'static str),
}

impl Error {
    /// Validate that `value` lies strictly inside `(0, 1)`.
    pub(crate) fn check_probability(name: &'static str, value: f64) -> Result<(), Error> {
        if value.is_finite() && value > 0.0 && value < 1.0 {
            Ok(())
        } else {
            Err(Error::ProbabilityRange { name, value })
        }
    }

    /// Validate a `(positives, total)` batch.
    pub(crate) fn check_counts(positives: u64, total: u64) -> Result<(), Error> {
        if positives > total {
            Err(Error::CountMismatch { positives, total })
        } else {
            Ok(())
        }
    }
}
