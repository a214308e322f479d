//! Status updates shown to the operator.

use std::fmt;

use serde::Serialize;

/// How loudly a status should be displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Nothing to report (cleared status).
    Ok,
    /// Normal progress.
    Info,
    /// Request could not proceed right now.
    Warning,
    /// Request failed.
    Error,
}

/// A short, discrete status update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    /// Display severity.
    pub severity: Severity,
    /// Short human-readable text; empty for a cleared status.
    pub text: String,
}

impl Status {
    /// Build a status from a severity and text.
    #[must_use]
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }

    /// Empty status shown once a reading was delivered or the node closed.
    #[must_use]
    pub fn cleared() -> Self {
        Self::new(Severity::Ok, "")
    }

    /// A scan window just opened.
    #[must_use]
    pub fn searching() -> Self {
        Self::new(Severity::Info, "searching")
    }

    /// A request arrived while a scan window was already open.
    #[must_use]
    pub fn still_searching() -> Self {
        Self::new(Severity::Warning, "searching")
    }

    /// An acquisition session just started.
    #[must_use]
    pub fn requesting() -> Self {
        Self::new(Severity::Info, "requesting")
    }

    /// A request arrived while a session was already in flight.
    #[must_use]
    pub fn busy() -> Self {
        Self::new(Severity::Warning, "requesting")
    }

    /// The session finished without any populated field.
    #[must_use]
    pub fn no_data() -> Self {
        Self::new(Severity::Error, "no data")
    }

    /// Whether this is the cleared status.
    #[must_use]
    pub fn is_cleared(&self) -> bool {
        self.severity == Severity::Ok && self.text.is_empty()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_cleared() {
            f.write_str("(cleared)")
        } else {
            write!(f, "[{:?}] {}", self.severity, self.text)
        }
    }
}
