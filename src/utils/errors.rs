use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Reserved code range for validation failures.
pub const VALIDATION_BASE: u32 = 1000;
/// Reserved code range for simulation failures (liveness, configuration).
pub const SIMULATION_BASE: u32 = 2000;
/// Reserved code range for numeric failures.
pub const NUMERIC_BASE: u32 = 3000;

/// Stable classification of every error the kernel can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Precondition violation on externally supplied data.
    Validation,
    /// Use of a handle whose generation or index no longer matches live state.
    Liveness,
    /// Missing or inconsistent setup data (e.g. mandatory component init absent).
    Configuration,
    /// Singular matrices, iteration caps, degenerate geometry, near-zero divisors.
    Numeric,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Liveness => write!(f, "liveness"),
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Numeric => write!(f, "numeric"),
        }
    }
}

/// Severity ladder, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Critical,
    Severe,
    Moderate,
    Minor,
    Warning,
}

/// The crate-wide error type.
///
/// Every error carries its kind, a code from the reserved ranges above, and
/// the source location where it was raised. No failure terminates the
/// process; a severe condition only aborts the operation that raised it.
#[derive(Debug, Clone, Error)]
#[error("{kind} error {code}: {message} (at {file}:{line})")]
pub struct SimError {
    pub kind: ErrorKind,
    pub code: u32,
    pub message: String,
    pub file: &'static str,
    pub line: u32,
}

impl SimError {
    #[track_caller]
    pub fn with_code(kind: ErrorKind, code: u32, message: impl Into<String>) -> Self {
        let location = Location::caller();
        Self {
            kind,
            code,
            message: message.into(),
            file: location.file(),
            line: location.line(),
        }
    }

    #[track_caller]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_code(ErrorKind::Validation, VALIDATION_BASE, message)
    }

    #[track_caller]
    pub fn liveness(message: impl Into<String>) -> Self {
        Self::with_code(ErrorKind::Liveness, SIMULATION_BASE, message)
    }

    #[track_caller]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::with_code(ErrorKind::Configuration, SIMULATION_BASE + 100, message)
    }

    #[track_caller]
    pub fn numeric(message: impl Into<String>) -> Self {
        Self::with_code(ErrorKind::Numeric, NUMERIC_BASE, message)
    }

    pub fn severity(&self) -> Severity {
        match self.kind {
            ErrorKind::Validation => Severity::Moderate,
            ErrorKind::Liveness => Severity::Moderate,
            ErrorKind::Configuration => Severity::Moderate,
            ErrorKind::Numeric => Severity::Severe,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_ranges_are_separated() {
        let validation = SimError::validation("bad input");
        let liveness = SimError::liveness("stale handle");
        let configuration = SimError::configuration("missing transform");
        let numeric = SimError::numeric("singular matrix");

        assert!(validation.code < liveness.code);
        assert!(liveness.code < numeric.code);
        assert!(configuration.code < numeric.code);
        assert!(liveness.code - validation.code >= 1000);
        assert!(numeric.code - liveness.code >= 1000);
    }

    #[test]
    fn test_location_is_captured() {
        let err = SimError::validation("oops");
        assert!(err.file.ends_with("errors.rs"));
        assert!(err.line > 0);
    }

    #[test]
    fn test_display_contains_kind_and_code() {
        let err = SimError::numeric("division by near-zero");
        let text = err.to_string();
        assert!(text.contains("numeric"));
        assert!(text.contains("3000"));
        assert!(text.contains("division by near-zero"));
    }

    #[test]
    fn test_severity_by_kind() {
        assert_eq!(SimError::numeric("x").severity(), Severity::Severe);
        assert_eq!(SimError::validation("x").severity(), Severity::Moderate);
        assert_eq!(SimError::liveness("x").severity(), Severity::Moderate);
    }
}
