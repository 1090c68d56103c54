//! Bounded polling, the one synchronization primitive.
//!
//! Every controller that issues an interaction and then needs the page to
//! catch up goes through [`poll_until`]. A fixed sleep is never used: the
//! page's scripts finish when they finish, so we re-observe until the
//! expectation holds or the bound elapses, and hand the last observation
//! back to the caller so it can build a typed timeout error.

use crate::result::{ProbeError, ProbeResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (5 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

// =============================================================================
// LOAD STATE
// =============================================================================

/// Document load states, ordered by progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LoadState {
    /// Navigation in flight, document not parsed
    Loading,
    /// `DOMContentLoaded` fired
    DomContentLoaded,
    /// `load` fired
    #[default]
    Load,
}

impl LoadState {
    /// Get the JavaScript event name for this load state
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::DomContentLoaded => "DOMContentLoaded",
            Self::Load => "load",
        }
    }

    /// Map `document.readyState` onto a load state
    #[must_use]
    pub fn from_ready_state(ready_state: &str) -> Self {
        match ready_state {
            "complete" => Self::Load,
            "interactive" => Self::DomContentLoaded,
            _ => Self::Loading,
        }
    }

    /// Whether this state is at least as far along as `target`
    #[must_use]
    pub fn reached(self, target: Self) -> bool {
        self >= target
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.event_name())
    }
}

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// POLLING
// =============================================================================

/// One observation made by a poll probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<T> {
    /// The expectation holds; stop polling
    Satisfied(T),
    /// Not yet; keep the observation for diagnostics
    Pending(T),
}

/// Result of a bounded poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The probe reported satisfaction before the bound elapsed
    Satisfied {
        /// Satisfying observation
        value: T,
        /// Time spent polling
        elapsed: Duration,
        /// Number of probe invocations
        attempts: u32,
    },
    /// The bound elapsed first
    TimedOut {
        /// Last observation before giving up
        last: T,
        /// Time spent polling
        elapsed: Duration,
        /// Number of probe invocations
        attempts: u32,
    },
}

impl<T> PollOutcome<T> {
    /// Whether the poll succeeded
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    /// Convert into a result, building the timeout error from the last observation
    pub fn or_timeout<E>(self, on_timeout: impl FnOnce(T) -> E) -> Result<T, E> {
        match self {
            Self::Satisfied { value, .. } => Ok(value),
            Self::TimedOut { last, .. } => Err(on_timeout(last)),
        }
    }
}

/// Re-run `probe` until it reports [`Observation::Satisfied`] or the timeout elapses.
///
/// The probe always runs at least once. Errors from the probe (stale
/// elements, protocol failures) abort the poll immediately; only
/// "not yet" is retried.
pub async fn poll_until<T, F, Fut>(
    options: &WaitOptions,
    mut probe: F,
) -> ProbeResult<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProbeResult<Observation<T>>>,
{
    let start = Instant::now();
    let deadline = start + options.timeout();
    let mut attempts = 0_u32;

    loop {
        attempts += 1;
        let last = match probe().await? {
            Observation::Satisfied(value) => {
                return Ok(PollOutcome::Satisfied {
                    value,
                    elapsed: start.elapsed(),
                    attempts,
                });
            }
            Observation::Pending(value) => value,
        };

        let now = Instant::now();
        if now >= deadline {
            return Ok(PollOutcome::TimedOut {
                last,
                elapsed: start.elapsed(),
                attempts,
            });
        }
        tokio::time::sleep(options.poll_interval().min(deadline - now)).await;
    }
}

/// Poll a boolean condition, failing with [`ProbeError::Timeout`] on expiry
pub async fn wait_until<F, Fut>(
    options: &WaitOptions,
    waited_for: &str,
    mut condition: F,
) -> ProbeResult<Duration>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProbeResult<bool>>,
{
    let outcome = poll_until(options, || {
        let fut = condition();
        async move {
            Ok(if fut.await? {
                Observation::Satisfied(())
            } else {
                Observation::Pending(())
            })
        }
    })
    .await?;

    match outcome {
        PollOutcome::Satisfied { elapsed, .. } => Ok(elapsed),
        PollOutcome::TimedOut { .. } => Err(ProbeError::Timeout {
            ms: options.timeout_ms,
            waited_for: waited_for.to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    mod load_state_tests {
        use super::*;

        #[test]
        fn test_ordering() {
            let dom_ready = LoadState::DomContentLoaded;
            assert!(LoadState::Load.reached(dom_ready));
            assert!(dom_ready.reached(dom_ready));
            assert!(!LoadState::Loading.reached(dom_ready));
        }

        #[test]
        fn test_from_ready_state() {
            assert_eq!(LoadState::from_ready_state("complete"), LoadState::Load);
            assert_eq!(
                LoadState::from_ready_state("interactive"),
                LoadState::DomContentLoaded
            );
            assert_eq!(LoadState::from_ready_state("loading"), LoadState::Loading);
        }

        #[test]
        fn test_display() {
            assert_eq!(LoadState::DomContentLoaded.to_string(), "DOMContentLoaded");
            assert_eq!(LoadState::default(), LoadState::Load);
        }
    }

    mod wait_options_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let opts = WaitOptions::default();
            assert_eq!(opts.timeout_ms, DEFAULT_WAIT_TIMEOUT_MS);
            assert_eq!(opts.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        }

        #[test]
        fn test_chained() {
            let opts = WaitOptions::new()
                .with_timeout(3000)
                .with_poll_interval(100);
            assert_eq!(opts.timeout(), Duration::from_millis(3000));
            assert_eq!(opts.poll_interval(), Duration::from_millis(100));
        }
    }

    mod poll_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_immediate_success_runs_probe_once() {
            let calls = Arc::new(AtomicU32::new(0));
            let c = calls.clone();
            let outcome = poll_until(&WaitOptions::new(), || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(Observation::Satisfied("done"))
                }
            })
            .await
            .unwrap();

            assert!(outcome.is_satisfied());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_becomes_true_after_a_few_polls() {
            let calls = Arc::new(AtomicU32::new(0));
            let c = calls.clone();
            let outcome = poll_until(&WaitOptions::new().with_poll_interval(10), || {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(if n >= 3 {
                        Observation::Satisfied(n)
                    } else {
                        Observation::Pending(n)
                    })
                }
            })
            .await
            .unwrap();

            match outcome {
                PollOutcome::Satisfied {
                    value, attempts, ..
                } => {
                    assert_eq!(value, 3);
                    assert_eq!(attempts, 3);
                }
                PollOutcome::TimedOut { .. } => panic!("expected success"),
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_timeout_keeps_last_observation() {
            let opts = WaitOptions::new().with_timeout(100).with_poll_interval(10);
            let outcome = poll_until(&opts, || async { Ok(Observation::Pending("stale")) })
                .await
                .unwrap();

            match outcome {
                PollOutcome::TimedOut {
                    last,
                    elapsed,
                    attempts,
                } => {
                    assert_eq!(last, "stale");
                    assert!(elapsed >= Duration::from_millis(100));
                    assert!(attempts >= 10);
                }
                PollOutcome::Satisfied { .. } => panic!("expected timeout"),
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_probe_error_aborts() {
            let result: ProbeResult<PollOutcome<()>> =
                poll_until(&WaitOptions::new(), || async {
                    Err(ProbeError::surface("detached"))
                })
                .await;
            assert!(matches!(result, Err(ProbeError::Surface { .. })));
        }

        #[tokio::test(start_paused = true)]
        async fn test_or_timeout_maps_last() {
            let opts = WaitOptions::new().with_timeout(20).with_poll_interval(5);
            let outcome = poll_until(&opts, || async { Ok(Observation::Pending(7_u32)) })
                .await
                .unwrap();
            let err = outcome.or_timeout(|last| last * 2).unwrap_err();
            assert_eq!(err, 14);
        }
    }

    mod wait_until_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_success() {
            let elapsed = wait_until(&WaitOptions::new(), "always", || async { Ok(true) })
                .await
                .unwrap();
            assert_eq!(elapsed, Duration::ZERO);
        }

        #[tokio::test(start_paused = true)]
        async fn test_timeout_error() {
            let opts = WaitOptions::new().with_timeout(50);
            let err = wait_until(&opts, "never", || async { Ok(false) })
                .await
                .unwrap_err();
            match err {
                ProbeError::Timeout { ms, waited_for } => {
                    assert_eq!(ms, 50);
                    assert_eq!(waited_for, "never");
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}
