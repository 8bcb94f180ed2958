//! Structured validation findings.

use serde::{Deserialize, Serialize};

/// A single input-validation violation.
///
/// Validation failures are reported as a list of these rather than a prose
/// string so a client can render per-field feedback. `path` is the dotted
/// location of the offending value within the input (empty for the root
/// value); `message` states the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Dotted field path within the input; empty for the root value.
    pub path: String,
    /// Human-readable reason the value was rejected.
    pub message: String,
}

impl Issue {
    /// Creates an issue for the given field path.
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an issue against the root input value.
    #[must_use]
    pub fn root(message: impl Into<String>) -> Self {
        Self::new("", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_issue_has_empty_path() {
        let issue = Issue::root("expected a string");
        assert_eq!(issue.path, "");
        assert_eq!(issue.message, "expected a string");
    }

    #[test]
    fn serialises_path_and_message() {
        let issue = Issue::new("a", "expected a number");
        let value = serde_json::to_value(&issue).expect("serialise issue");
        assert_eq!(value["path"], "a");
        assert_eq!(value["message"], "expected a number");
    }
}
