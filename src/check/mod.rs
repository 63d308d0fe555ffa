//! Rule checkers that replay trace records against inferred specifications.
//!
//! Each checker compares one record's section with the matching
//! sub-specification (and, when available, documentation features) and
//! produces a [`Verdict`]. Checkers are pure: all bookkeeping lives in the
//! detector.

pub mod arg_post;
pub mod arg_pre;
pub mod causality;
pub mod retval;

/// Outcome of replaying one record against a sub-specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A rule was violated; the text goes into the bug report.
    Violation(String),
    /// The record fully conforms. For tolerable kinds this retracts prior
    /// reports at the record's locations.
    Conforming,
    /// No violation, but the record does not vouch for the location either
    /// (e.g. the return value is propagated to the caller unchecked).
    Silent,
}

impl Verdict {
    /// Wrap an accumulated alarm string: empty means conforming.
    pub(crate) fn from_alarm(alarm: String) -> Self {
        if alarm.is_empty() {
            Self::Conforming
        } else {
            Self::Violation(alarm)
        }
    }
}
