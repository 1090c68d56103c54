//! Suite configuration.
//!
//! Values come from defaults, a YAML file, or the environment:
//!
//! | Variable        | Field              |
//! |-----------------|--------------------|
//! | `BASE_URL`      | `base_url`         |
//! | `TEST_TIMEOUT`  | `timeout_ms`       |
//! | `POLL_INTERVAL` | `poll_interval_ms` |
//! | `HEADLESS`      | `headless`         |
//! | `CHROMIUM_PATH` | `chromium_path`    |

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::result::{ProbeError, ProbeResult};
use crate::wait::{WaitOptions, DEFAULT_POLL_INTERVAL_MS};

/// Default site origin
pub const DEFAULT_BASE_URL: &str = "https://example.com";

/// Default per-wait bound
pub const DEFAULT_TEST_TIMEOUT_MS: u64 = 30_000;

/// Configuration shared by every test of a suite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Origin that site-relative paths resolve against
    pub base_url: String,
    /// Bound for every wait
    pub timeout_ms: u64,
    /// Poll interval for every wait
    pub poll_interval_ms: u64,
    /// Run the browser headless
    pub headless: bool,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TEST_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            headless: true,
            chromium_path: None,
        }
    }
}

impl SuiteConfig {
    /// Set base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set wait bound
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> ProbeResult<Self> {
        Self::default().merge_env(|name| std::env::var(name).ok())
    }

    /// Override fields from `lookup`; unset variables keep their value
    pub fn merge_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> ProbeResult<Self> {
        if let Some(url) = lookup("BASE_URL") {
            self.base_url = url;
        }
        if let Some(ms) = lookup("TEST_TIMEOUT") {
            self.timeout_ms = parse_var("TEST_TIMEOUT", &ms)?;
        }
        if let Some(ms) = lookup("POLL_INTERVAL") {
            self.poll_interval_ms = parse_var("POLL_INTERVAL", &ms)?;
        }
        if let Some(flag) = lookup("HEADLESS") {
            self.headless = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(ProbeError::Config {
                        message: format!("HEADLESS must be a boolean, got '{other}'"),
                    })
                }
            };
        }
        if let Some(path) = lookup("CHROMIUM_PATH") {
            self.chromium_path = Some(path);
        }
        self.validated()
    }

    /// Parse YAML; missing keys take their defaults
    pub fn from_yaml_str(yaml: &str) -> ProbeResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validated()
    }

    /// Load a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> ProbeResult<Self> {
        Self::from_yaml_str(&std::fs::read_to_string(path)?)
    }

    fn validated(self) -> ProbeResult<Self> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ProbeError::Config {
                message: format!(
                    "base_url must be an http(s) origin, got '{}'",
                    self.base_url
                ),
            });
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms > self.timeout_ms {
            return Err(ProbeError::Config {
                message: format!(
                    "poll_interval_ms must be in 1..={}, got {}",
                    self.timeout_ms, self.poll_interval_ms
                ),
            });
        }
        Ok(self)
    }

    /// Absolute URL for a site-relative path
    #[must_use]
    pub fn full_url(&self, path: &str) -> String {
        if path.contains("://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Wait options derived from this configuration
    #[must_use]
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::new()
            .with_timeout(self.timeout_ms)
            .with_poll_interval(self.poll_interval_ms)
    }
}

fn parse_var(name: &str, value: &str) -> ProbeResult<u64> {
    value.trim().parse().map_err(|_| ProbeError::Config {
        message: format!("{name} must be a number of milliseconds, got '{value}'"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    mod env_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = SuiteConfig::default().merge_env(env(&[])).unwrap();
            assert_eq!(config.base_url, "https://example.com");
            assert_eq!(config.timeout_ms, 30_000);
            assert!(config.headless);
        }

        #[test]
        fn test_overrides() {
            let config = SuiteConfig::default()
                .merge_env(env(&[
                    ("BASE_URL", "https://staging.example.com/"),
                    ("TEST_TIMEOUT", "10000"),
                    ("HEADLESS", "false"),
                    ("CHROMIUM_PATH", "/usr/bin/chromium"),
                ]))
                .unwrap();
            assert_eq!(config.timeout_ms, 10_000);
            assert!(!config.headless);
            assert_eq!(config.chromium_path.as_deref(), Some("/usr/bin/chromium"));
            assert_eq!(
                config.full_url("/juku/12/"),
                "https://staging.example.com/juku/12/"
            );
        }

        #[test]
        fn test_bad_values() {
            for vars in [
                [("TEST_TIMEOUT", "soon")],
                [("HEADLESS", "maybe")],
                [("BASE_URL", "example.com")],
                [("POLL_INTERVAL", "0")],
            ] {
                let err = SuiteConfig::default().merge_env(env(&vars)).unwrap_err();
                assert!(matches!(err, ProbeError::Config { .. }), "{vars:?}");
            }
        }
    }

    mod file_tests {
        use super::*;

        #[test]
        fn test_yaml_partial() {
            let yaml = "base_url: http://localhost:8080\ntimeout_ms: 2000\n";
            let config = SuiteConfig::from_yaml_str(yaml).unwrap();
            assert_eq!(config.base_url, "http://localhost:8080");
            assert_eq!(config.timeout_ms, 2_000);
            assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
            assert_eq!(config.wait_options().timeout_ms, 2_000);
        }

        #[test]
        fn test_from_file() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "headless: false\npoll_interval_ms: 20").unwrap();
            let config = SuiteConfig::from_file(file.path()).unwrap();
            assert!(!config.headless);
            assert_eq!(config.poll_interval_ms, 20);
        }

        #[test]
        fn test_invalid_yaml() {
            assert!(matches!(
                SuiteConfig::from_yaml_str("timeout_ms: [1, 2]").unwrap_err(),
                ProbeError::Yaml(_)
            ));
            assert!(matches!(
                SuiteConfig::from_file("/nonexistent/juku.yaml").unwrap_err(),
                ProbeError::Io(_)
            ));
        }

        #[test]
        fn test_full_url() {
            let config = SuiteConfig::default();
            assert_eq!(
                config.full_url("hokkaido/station/"),
                "https://example.com/hokkaido/station/"
            );
            assert_eq!(
                config.full_url("https://other.test/x"),
                "https://other.test/x"
            );
        }
    }
}
