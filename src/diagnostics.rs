//! Diagnostics reported by processing units.
//!
//! Every message is kept for the host and mirrored onto `tracing` at the
//! matching level. Error and exception diagnostics make the build fail;
//! warnings do too when `warnings_as_errors` is set.

use std::cell::RefCell;
use std::fmt;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use symproc_core::raw::Location;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Logging,
    Info,
    Warning,
    Error,
    Exception,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Logging => "v",
            Severity::Info => "i",
            Severity::Warning => "w",
            Severity::Error => "e",
            Severity::Exception => "e",
        };
        write!(f, "{s}")
    }
}

/// One reported message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Source path of the node the message is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: [symproc] {}: {}", self.severity, path, self.message),
            None => write!(f, "{}: [symproc] {}", self.severity, self.message),
        }
    }
}

/// Logger handed to processing units.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: RefCell<Vec<Diagnostic>>,
    warnings_as_errors: bool,
}

impl Diagnostics {
    pub fn new(warnings_as_errors: bool) -> Self {
        Diagnostics {
            entries: RefCell::new(Vec::new()),
            warnings_as_errors,
        }
    }

    pub fn logging(&self, message: impl Into<String>, at: Option<&Location>) {
        self.report(Severity::Logging, message.into(), at);
    }

    pub fn info(&self, message: impl Into<String>, at: Option<&Location>) {
        self.report(Severity::Info, message.into(), at);
    }

    pub fn warn(&self, message: impl Into<String>, at: Option<&Location>) {
        self.report(Severity::Warning, message.into(), at);
    }

    pub fn error(&self, message: impl Into<String>, at: Option<&Location>) {
        self.report(Severity::Error, message.into(), at);
    }

    /// Report a failure raised inside a unit.
    pub fn exception(&self, err: &dyn std::error::Error) {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        self.report(Severity::Exception, message, None);
    }

    fn report(&self, severity: Severity, message: String, at: Option<&Location>) {
        let path = at.and_then(Location::path).map(str::to_string);
        let diagnostic = Diagnostic {
            severity,
            message,
            path,
        };
        match severity {
            Severity::Logging => debug!("{diagnostic}"),
            Severity::Info => info!("{diagnostic}"),
            Severity::Warning => warn!("{diagnostic}"),
            Severity::Error | Severity::Exception => error!("{diagnostic}"),
        }
        self.entries.borrow_mut().push(diagnostic);
    }

    /// Whether any reported diagnostic fails the build.
    pub fn has_errors(&self) -> bool {
        self.entries.borrow().iter().any(|d| self.is_fatal(d.severity))
    }

    fn is_fatal(&self, severity: Severity) -> bool {
        match severity {
            Severity::Error | Severity::Exception => true,
            Severity::Warning => self.warnings_as_errors,
            Severity::Logging | Severity::Info => false,
        }
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|d| self.is_fatal(d.severity))
            .count()
    }

    /// Everything reported so far, in order.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symproc_core::raw::Span;

    #[test]
    fn errors_fail_the_build() {
        let diagnostics = Diagnostics::new(false);
        diagnostics.info("starting", None);
        diagnostics.warn("odd", None);
        assert!(!diagnostics.has_errors());
        diagnostics.error("broken", None);
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn warnings_as_errors() {
        let diagnostics = Diagnostics::new(true);
        diagnostics.warn("odd", None);
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn location_and_format() {
        let diagnostics = Diagnostics::new(false);
        let at = Location::file("src/A.kt", Span::new(0, 4));
        diagnostics.error("missing Bar", Some(&at));
        diagnostics.logging("detail", Some(&Location::NonExistent));
        let entries = diagnostics.entries();
        assert_eq!(entries[0].to_string(), "e: [symproc] src/A.kt: missing Bar");
        assert_eq!(entries[1].path, None);
    }

    #[test]
    fn exception_includes_causes() {
        let diagnostics = Diagnostics::new(false);
        let err = crate::error::DriverError::from(std::io::Error::other("disk full"));
        diagnostics.exception(&err);
        let entries = diagnostics.entries();
        assert_eq!(entries[0].severity, Severity::Exception);
        assert!(entries[0].message.contains("disk full"));
        assert!(diagnostics.has_errors());
    }
}
