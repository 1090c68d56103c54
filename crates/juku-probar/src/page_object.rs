//! Page objects and URL pattern matching.
//!
//! Pages and sections are identified by a URL pattern. After a click that
//! navigates, [`wait_for_page`] polls until the surface shows a matching URL
//! and the document has reached `DOMContentLoaded`.

use std::collections::HashMap;

use tracing::info;

use crate::entity::EntityKind;
use crate::result::{ProbeError, ProbeResult};
use crate::surface::UiSurface;
use crate::wait::{poll_until, LoadState, Observation, WaitOptions};

/// Default page load bound, as for the suite-wide test timeout
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 30_000;

/// A page or component of the site.
///
/// ```ignore
/// struct ReviewList;
///
/// impl PageObject for ReviewList {
///     fn url_pattern(&self) -> &str {
///         "/juku/:juku/review/"
///     }
/// }
/// ```
pub trait PageObject {
    /// URL pattern that matches this page (e.g. `/juku/:juku/`, `/*/station/`)
    fn url_pattern(&self) -> &str;

    /// Bound for the page to load after navigation (in milliseconds)
    fn load_timeout_ms(&self) -> u64 {
        DEFAULT_LOAD_TIMEOUT_MS
    }

    /// Page name for logging
    fn page_name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Matcher for [`Self::url_pattern`]
    fn matcher(&self) -> UrlMatcher {
        UrlMatcher::new(self.url_pattern())
    }
}

/// URL pattern matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlMatcher {
    pattern: String,
    segments: Vec<UrlSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum UrlSegment {
    Literal(String),
    Wildcard,
    Parameter(String),
}

impl UrlMatcher {
    /// Create a new URL matcher from a pattern
    ///
    /// Patterns support:
    /// - Literal segments: `/hokkaido/station`
    /// - Wildcards: `/*/station/`
    /// - Named parameters: `/juku/:juku/class/:class/`
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == "*" {
                    UrlSegment::Wildcard
                } else if let Some(name) = s.strip_prefix(':') {
                    UrlSegment::Parameter(name.to_string())
                } else {
                    UrlSegment::Literal(s.to_string())
                }
            })
            .collect();

        Self {
            pattern: pattern.to_string(),
            segments,
        }
    }

    /// Matcher for an entity's detail page; the id is the `id` parameter and
    /// a parent id, when the kind has one, is named after the parent kind
    #[must_use]
    pub fn for_entity(kind: EntityKind) -> Self {
        let own = kind.template();
        match kind.parent() {
            Some(parent) => {
                let prefix = parent.template().replace(":id", &format!(":{parent}"));
                Self::new(&format!("{}{own}", prefix.trim_end_matches('/')))
            }
            None => Self::new(own),
        }
    }

    /// Check if a URL matches the pattern. Origin, query and fragment are ignored.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        let url_segments = segments(url);

        // Wildcards and parameters each consume exactly one segment
        if url_segments.len() != self.segments.len() {
            return false;
        }

        self.segments
            .iter()
            .zip(&url_segments)
            .all(|(segment, value)| match segment {
                UrlSegment::Literal(lit) => lit == value,
                UrlSegment::Wildcard | UrlSegment::Parameter(_) => true,
            })
    }

    /// Extract parameters from a matching URL; empty when it does not match
    #[must_use]
    pub fn extract_params(&self, url: &str) -> HashMap<String, String> {
        if !self.matches(url) {
            return HashMap::new();
        }
        self.segments
            .iter()
            .zip(segments(url))
            .filter_map(|(segment, value)| match segment {
                UrlSegment::Parameter(name) => Some((name.clone(), value.to_string())),
                _ => None,
            })
            .collect()
    }

    /// Numeric parameter of a matching URL
    #[must_use]
    pub fn id_param(&self, url: &str, name: &str) -> Option<u64> {
        self.extract_params(url).get(name)?.parse().ok()
    }

    /// Pattern source
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl std::fmt::Display for UrlMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.pattern)
    }
}

fn segments(url: &str) -> Vec<&str> {
    let path = url.split_once("://").map_or(url, |(_, rest)| {
        rest.find('/').map_or("", |i| &rest[i..])
    });
    path.split(['?', '#'])
        .next()
        .unwrap_or_default()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

/// Wait until the surface shows a URL matching `matcher` with the document
/// at least at `DOMContentLoaded`; returns the URL parameters
pub async fn wait_for_url(
    surface: &dyn UiSurface,
    matcher: &UrlMatcher,
    options: &WaitOptions,
) -> ProbeResult<HashMap<String, String>> {
    let outcome = poll_until(options, || async {
        let url = surface.current_url().await?;
        let ready = matcher.matches(&url)
            && surface
                .load_state()
                .await?
                .reached(LoadState::DomContentLoaded);
        Ok(if ready {
            Observation::Satisfied(url)
        } else {
            Observation::Pending(url)
        })
    })
    .await?;

    let url = outcome.or_timeout(|last| ProbeError::Timeout {
        ms: options.timeout_ms,
        waited_for: format!("URL matching {matcher} (last: {last})"),
    })?;
    info!(%url, pattern = %matcher, "arrived");
    Ok(matcher.extract_params(&url))
}

/// [`wait_for_url`] for a page object, bounded by its load timeout
pub async fn wait_for_page<P: PageObject + ?Sized>(
    surface: &dyn UiSurface,
    page: &P,
    poll_interval_ms: u64,
) -> ProbeResult<HashMap<String, String>> {
    let options = WaitOptions::new()
        .with_timeout(page.load_timeout_ms())
        .with_poll_interval(poll_interval_ms);
    wait_for_url(surface, &page.matcher(), &options).await
}
