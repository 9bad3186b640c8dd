//! Non-local flow control
//!
//! `work` and lifecycle callbacks return `Result<(), Fault>`. A [`Fault`] is
//! a control transfer, not an error: [`Fault::Skip`] and [`Fault::Fail`]
//! terminate the task cleanly with the given reason, while [`Fault::Error`]
//! carries an unexpected error toward the configured exception handler.
//! None of them propagate past the engine; they are classified into the
//! task's [`TaskResult`](crate::TaskResult).

use serde_json::{Map, Value};

/// Declared interruption or unexpected error raised inside a task
#[derive(Debug)]
pub enum Fault {
    /// The task declined the work on purpose; outcome stays good
    Skip {
        reason: String,
        metadata: Map<String, Value>,
    },

    /// The task declared a failure; outcome is bad
    Fail {
        reason: String,
        metadata: Map<String, Value>,
    },

    /// Anything that was not declared: routed to the exception handler,
    /// then converted to a failed result
    Error(anyhow::Error),
}

impl Fault {
    /// Reason attached to a declared interruption
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Skip { reason, .. } | Self::Fail { reason, .. } => Some(reason),
            Self::Error(_) => None,
        }
    }

    /// Metadata attached to a declared interruption
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Skip { metadata, .. } | Self::Fail { metadata, .. } => Some(metadata),
            Self::Error(_) => None,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip { .. })
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skip { reason, .. } => write!(f, "skipped: {reason}"),
            Self::Fail { reason, .. } => write!(f, "failed: {reason}"),
            Self::Error(e) => write!(f, "error: {e}"),
        }
    }
}

impl From<anyhow::Error> for Fault {
    fn from(error: anyhow::Error) -> Self {
        Self::Error(error)
    }
}

impl From<serde_json::Error> for Fault {
    fn from(error: serde_json::Error) -> Self {
        Self::Error(error.into())
    }
}

/// Skip the current task
///
/// ```
/// # use cero_core::{skip, Fault};
/// fn work_body(domestic: bool) -> Result<(), Fault> {
///     if !domestic {
///         return Err(skip("non-domestic"));
///     }
///     Ok(())
/// }
/// ```
pub fn skip(reason: impl Into<String>) -> Fault {
    Fault::Skip {
        reason: reason.into(),
        metadata: Map::new(),
    }
}

/// Skip the current task with metadata
pub fn skip_with(reason: impl Into<String>, metadata: Map<String, Value>) -> Fault {
    Fault::Skip {
        reason: reason.into(),
        metadata,
    }
}

/// Fail the current task
pub fn fail(reason: impl Into<String>) -> Fault {
    Fault::Fail {
        reason: reason.into(),
        metadata: Map::new(),
    }
}

/// Fail the current task with metadata
pub fn fail_with(reason: impl Into<String>, metadata: Map<String, Value>) -> Fault {
    Fault::Fail {
        reason: reason.into(),
        metadata,
    }
}

/// Predicate-based fault matching for middleware and callers
///
/// # Example
///
/// ```
/// use cero_core::{fail, FaultMatcher};
///
/// let matcher = FaultMatcher::fail().with_reason("timeout");
/// assert!(matcher.matches(&fail("timeout")));
/// assert!(!matcher.matches(&fail("invalid")));
/// ```
pub struct FaultMatcher {
    kind: Option<FaultKind>,
    reason: Option<String>,
    predicate: Option<Box<dyn Fn(&Fault) -> bool + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultKind {
    Skip,
    Fail,
    Error,
}

impl FaultMatcher {
    /// Match any fault
    pub fn any() -> Self {
        Self {
            kind: None,
            reason: None,
            predicate: None,
        }
    }

    /// Match skip faults
    pub fn skip() -> Self {
        Self {
            kind: Some(FaultKind::Skip),
            ..Self::any()
        }
    }

    /// Match fail faults
    pub fn fail() -> Self {
        Self {
            kind: Some(FaultKind::Fail),
            ..Self::any()
        }
    }

    /// Match unexpected errors
    pub fn error() -> Self {
        Self {
            kind: Some(FaultKind::Error),
            ..Self::any()
        }
    }

    /// Additionally require an exact reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Additionally require a custom predicate
    pub fn with(mut self, predicate: impl Fn(&Fault) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Test a fault against this matcher
    pub fn matches(&self, fault: &Fault) -> bool {
        if let Some(kind) = self.kind {
            let actual = match fault {
                Fault::Skip { .. } => FaultKind::Skip,
                Fault::Fail { .. } => FaultKind::Fail,
                Fault::Error(_) => FaultKind::Error,
            };
            if actual != kind {
                return false;
            }
        }
        if let Some(ref reason) = self.reason {
            if fault.reason() != Some(reason.as_str()) {
                return false;
            }
        }
        if let Some(ref predicate) = self.predicate {
            if !predicate(fault) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constructors() {
        let fault = skip("not needed");
        assert!(fault.is_skip());
        assert_eq!(fault.reason(), Some("not needed"));

        let mut metadata = Map::new();
        metadata.insert("code".to_string(), json!(42));
        let fault = fail_with("broken", metadata);
        assert!(fault.is_fail());
        assert_eq!(fault.metadata().unwrap().get("code"), Some(&json!(42)));
    }

    #[test]
    fn test_error_conversion() {
        fn inner() -> Result<(), Fault> {
            let parsed: serde_json::Value = serde_json::from_str("{not json")?;
            let _ = parsed;
            Ok(())
        }

        let fault = inner().unwrap_err();
        assert!(fault.is_error());
        assert_eq!(fault.reason(), None);
    }

    #[test]
    fn test_matcher_kind_and_reason() {
        assert!(FaultMatcher::any().matches(&skip("x")));
        assert!(FaultMatcher::skip().matches(&skip("x")));
        assert!(!FaultMatcher::skip().matches(&fail("x")));
        assert!(FaultMatcher::fail().with_reason("x").matches(&fail("x")));
        assert!(!FaultMatcher::fail().with_reason("y").matches(&fail("x")));
    }

    #[test]
    fn test_matcher_predicate() {
        let matcher = FaultMatcher::any().with(|f| f.reason().is_some_and(|r| r.starts_with("io")));
        assert!(matcher.matches(&fail("io: disk full")));
        assert!(!matcher.matches(&fail("parse")));
    }
}
