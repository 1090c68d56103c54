//! Result and error types for juku-probar.
//!
//! Extraction absence is never an error (see [`crate::extract`]); everything
//! here is raised to the calling test, which is expected to fail.

use thiserror::Error;

/// Result type for juku-probar operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors that can occur while driving or reading the surface
#[derive(Debug, Error)]
pub enum ProbeError {
    /// A tab was clicked but never became the active tab
    #[error(
        "Tab '{requested}' did not become active within {timeout_ms}ms (active: {})",
        .observed.as_deref().unwrap_or("<none>")
    )]
    TabActivationTimeout {
        /// Label the caller asked for
        requested: String,
        /// Last active label observed before giving up
        observed: Option<String>,
        /// Bound that elapsed
        timeout_ms: u64,
    },

    /// An accordion group was clicked but its content never became visible
    #[error(
        "Accordion '{group}' did not expand within {timeout_ms}ms \
         (open class observed: {observed_open})"
    )]
    AccordionExpansionTimeout {
        /// Group label the caller asked for
        group: String,
        /// Bound that elapsed
        timeout_ms: u64,
        /// Whether the open class was present on the last poll
        observed_open: bool,
    },

    /// The filter form was submitted but the result list never settled
    #[error("Filter submission did not settle within {timeout_ms}ms (last observed: {observed})")]
    FilterApplyTimeout {
        /// Bound that elapsed
        timeout_ms: u64,
        /// Last observed form/document state
        observed: String,
    },

    /// Generic bounded wait expiry
    #[error("Timed out after {ms}ms waiting for {waited_for}")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
        /// Description of the awaited condition
        waited_for: String,
    },

    /// Neither exact nor contains matching found a station
    #[error("Station '{label}' not found in expanded lines [{}]", .searched.join(", "))]
    StationNotFound {
        /// Requested station label
        label: String,
        /// Expanded groups that were searched
        searched: Vec<String>,
    },

    /// No trigger carries the requested label
    #[error("Tab '{label}' not found (available: [{}])", .available.join(", "))]
    TabNotFound {
        /// Requested label
        label: String,
        /// Labels present at the time of the lookup
        available: Vec<String>,
    },

    /// The trigger exists but has nothing to click and is not active
    #[error("Tab '{label}' is neither clickable nor active")]
    TabNotClickable {
        /// Requested label
        label: String,
    },

    /// A locator resolved to zero elements where one was required
    #[error("Element not found: {selector}")]
    ElementNotFound {
        /// Human-readable locator description
        selector: String,
    },

    /// An element reference outlived the document it came from
    #[error("Stale element reference: {reference}")]
    StaleElement {
        /// The stale reference
        reference: String,
    },

    /// Caller used a component outside its contract (e.g. reading an inactive tab)
    #[error("Precondition violated: {message}")]
    PreconditionViolated {
        /// Error message
        message: String,
    },

    /// Surface plumbing failure (browser protocol, script evaluation)
    #[error("Surface error: {message}")]
    Surface {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Invalid extraction pattern
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        /// Pattern source
        pattern: String,
        /// Compiler message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl ProbeError {
    /// Create a surface error
    #[must_use]
    pub fn surface(message: impl Into<String>) -> Self {
        Self::Surface {
            message: message.into(),
        }
    }

    /// Create a precondition violation
    #[must_use]
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionViolated {
            message: message.into(),
        }
    }

    /// Whether this error is one of the bounded-wait expiries
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::TabActivationTimeout { .. }
                | Self::AccordionExpansionTimeout { .. }
                | Self::FilterApplyTimeout { .. }
                | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tab_timeout_names_both_labels() {
        let err = ProbeError::TabActivationTimeout {
            requested: "高校受験".into(),
            observed: Some("大学受験".into()),
            timeout_ms: 3000,
        };
        let msg = err.to_string();
        assert!(msg.contains("高校受験"));
        assert!(msg.contains("大学受験"));
        assert!(msg.contains("3000ms"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_tab_timeout_without_active_tab() {
        let err = ProbeError::TabActivationTimeout {
            requested: "コース".into(),
            observed: None,
            timeout_ms: 10,
        };
        assert!(err.to_string().contains("<none>"));
    }

    #[test]
    fn test_station_not_found_lists_searched_groups() {
        let err = ProbeError::StationNotFound {
            label: "札幌".into(),
            searched: vec!["JR函館本線".into(), "JR千歳線".into()],
        };
        assert_eq!(
            err.to_string(),
            "Station '札幌' not found in expanded lines [JR函館本線, JR千歳線]"
        );
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ProbeError = io.into();
        assert!(matches!(err, ProbeError::Io(_)));
    }

    #[test]
    fn test_constructors() {
        assert!(matches!(
            ProbeError::surface("x"),
            ProbeError::Surface { .. }
        ));
        assert!(matches!(
            ProbeError::precondition("x"),
            ProbeError::PreconditionViolated { .. }
        ));
    }
}
