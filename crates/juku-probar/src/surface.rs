//! The rendered surface of the site under test.
//!
//! Every controller receives a `&dyn UiSurface` explicitly; there is no
//! ambient "current page". Two surfaces (two browser tabs, or a mock and a
//! real page) can therefore live side by side in one test.
//!
//! Implementations:
//!
//! - [`crate::mock::MockSurface`]: in-memory document for unit tests
//! - `CdpSurface` (feature `browser`): a Chromium page driven over CDP

use crate::locator::Selector;
use crate::result::ProbeResult;
use crate::wait::LoadState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque handle to one element of the current document.
///
/// Handles are only meaningful to the surface that produced them and only
/// for the document they were produced from; after a navigation the surface
/// reports them as stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementRef(pub String);

impl ElementRef {
    /// Wrap a surface-specific id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The surface-specific id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Query and interaction primitives supplied by the automation runtime.
///
/// Reads never cache: each call observes the document as it is now.
/// Mutation happens only through [`UiSurface::click`] and
/// [`UiSurface::fill`].
#[async_trait]
pub trait UiSurface: std::fmt::Debug + Send + Sync {
    /// All elements matching `selector`, in document order, searched among
    /// the descendants of `scope` (or the whole document)
    async fn query_all(
        &self,
        scope: Option<&ElementRef>,
        selector: &Selector,
    ) -> ProbeResult<Vec<ElementRef>>;

    /// Parent element
    async fn parent(&self, element: &ElementRef) -> ProbeResult<Option<ElementRef>>;

    /// Next element sibling (CSS `+`)
    async fn next_sibling(&self, element: &ElementRef) -> ProbeResult<Option<ElementRef>>;

    /// `textContent` of the element
    async fn text_content(&self, element: &ElementRef) -> ProbeResult<String>;

    /// Attribute value, `None` when absent
    async fn attribute(&self, element: &ElementRef, name: &str) -> ProbeResult<Option<String>>;

    /// Whether the element is rendered and not hidden
    async fn is_visible(&self, element: &ElementRef) -> ProbeResult<bool>;

    /// Checked state of a checkbox or radio
    async fn is_checked(&self, element: &ElementRef) -> ProbeResult<bool>;

    /// Current value of a text input
    async fn input_value(&self, element: &ElementRef) -> ProbeResult<String>;

    /// Click the element
    async fn click(&self, element: &ElementRef) -> ProbeResult<()>;

    /// Replace the value of a text input
    async fn fill(&self, element: &ElementRef, text: &str) -> ProbeResult<()>;

    /// Navigate to an absolute URL
    async fn goto(&self, url: &str) -> ProbeResult<()>;

    /// URL of the current document
    async fn current_url(&self) -> ProbeResult<String>;

    /// Load state of the current document
    async fn load_state(&self) -> ProbeResult<LoadState>;

    /// Whether the element's `class` attribute carries `class` as a token
    async fn has_class(&self, element: &ElementRef, class: &str) -> ProbeResult<bool> {
        Ok(self
            .attribute(element, "class")
            .await?
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class)))
    }
}
