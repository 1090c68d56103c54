//! Locator abstraction for element selection.
//!
//! A [`Locator`] is a description, not a handle: it is resolved against a
//! [`UiSurface`] every time it is used, so it never goes stale across
//! navigations or re-renders.
//!
//! ```ignore
//! let active_cards = Locator::new(".bjc-juku-inner-tab-wrap")
//!     .has(Selector::css(".bjc-posts-experience"))
//!     .first()
//!     .css(".js-tab__content")
//!     .with_class("is-active")
//!     .css(".bjc-post-experience");
//! let refs = active_cards.all(&surface).await?;
//! ```

use std::collections::HashSet;

use crate::result::{ProbeError, ProbeResult};
use crate::surface::{ElementRef, UiSurface};

/// Selector type for locating elements
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// CSS selector (e.g., ".tab__item", "a[href*='/course/']")
    Css(String),
    /// Innermost elements whose text content contains the string
    Text(String),
    /// ARIA role with optional accessible name (exact, whitespace-trimmed)
    Role {
        /// Role name (e.g. "radio", "link")
        role: String,
        /// Accessible name
        name: Option<String>,
    },
    /// Input placeholder text
    Placeholder(String),
    /// Test ID selector (data-testid attribute)
    TestId(String),
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create a text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a role selector with an accessible name
    #[must_use]
    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            name: Some(name.into()),
        }
    }

    /// Create a role selector matching any name
    #[must_use]
    pub fn any_role(role: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            name: None,
        }
    }

    /// Create a placeholder selector
    #[must_use]
    pub fn placeholder(text: impl Into<String>) -> Self {
        Self::Placeholder(text.into())
    }

    /// Create a test ID selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// JavaScript expression evaluating to an array of matches below `root`.
    ///
    /// `root` must be an expression yielding an `Element` or `Document`;
    /// `roleOf` and `nameOf` must be in scope (see the CDP surface prelude).
    #[must_use]
    pub fn to_query_all(&self, root: &str) -> String {
        match self {
            Self::Css(s) => format!("Array.from({root}.querySelectorAll({s:?}))"),
            Self::Text(t) => format!(
                "Array.from({root}.querySelectorAll('*')).filter(el => \
                 (el.textContent || '').includes({t:?}) && \
                 !Array.from(el.children).some(c => (c.textContent || '').includes({t:?})))"
            ),
            Self::Role { role, name: None } => format!(
                "Array.from({root}.querySelectorAll('*')).filter(el => roleOf(el) === {role:?})"
            ),
            Self::Role {
                role,
                name: Some(name),
            } => format!(
                "Array.from({root}.querySelectorAll('*')).filter(el => \
                 roleOf(el) === {role:?} && nameOf(el) === {name:?})"
            ),
            Self::Placeholder(p) => format!(
                "Array.from({root}.querySelectorAll('[placeholder]')).filter(el => \
                 el.getAttribute('placeholder') === {p:?})"
            ),
            Self::TestId(id) => {
                format!("Array.from({root}.querySelectorAll('[data-testid={id:?}]'))")
            }
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Css(s) => write!(f, "{s}"),
            Self::Text(t) => write!(f, "text={t:?}"),
            Self::Role { role, name: None } => write!(f, "role={role}"),
            Self::Role {
                role,
                name: Some(name),
            } => write!(f, "role={role}[name={name:?}]"),
            Self::Placeholder(p) => write!(f, "placeholder={p:?}"),
            Self::TestId(id) => write!(f, "testid={id:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Select(Selector),
    HasText(String),
    HasClass(String),
    Has(Selector),
    Nth(usize),
    NextSibling(Selector),
    Parent,
}

/// A lazily resolved chain of selections and filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    root: Option<ElementRef>,
    steps: Vec<Step>,
}

impl Locator {
    /// Create a new locator with a CSS selector over the whole document
    #[must_use]
    pub fn new(selector: impl Into<String>) -> Self {
        Self::from_selector(Selector::Css(selector.into()))
    }

    /// Create a locator from a selector over the whole document
    #[must_use]
    pub fn from_selector(selector: Selector) -> Self {
        Self {
            root: None,
            steps: vec![Step::Select(selector)],
        }
    }

    /// A locator that resolves to exactly `element`
    #[must_use]
    pub fn root(element: ElementRef) -> Self {
        Self {
            root: Some(element),
            steps: Vec::new(),
        }
    }

    fn push(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Descendants matching `selector`
    #[must_use]
    pub fn locator(self, selector: Selector) -> Self {
        self.push(Step::Select(selector))
    }

    /// Descendants matching a CSS selector
    #[must_use]
    pub fn css(self, selector: impl Into<String>) -> Self {
        self.locator(Selector::Css(selector.into()))
    }

    /// Keep elements whose text content contains `text`
    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.push(Step::HasText(text.into()))
    }

    /// Keep elements carrying `class`
    #[must_use]
    pub fn with_class(self, class: impl Into<String>) -> Self {
        self.push(Step::HasClass(class.into()))
    }

    /// Keep elements with at least one descendant matching `selector`
    #[must_use]
    pub fn has(self, selector: Selector) -> Self {
        self.push(Step::Has(selector))
    }

    /// Keep only the n-th element (0-based)
    #[must_use]
    pub fn nth(self, index: usize) -> Self {
        self.push(Step::Nth(index))
    }

    /// Keep only the first element
    #[must_use]
    pub fn first(self) -> Self {
        self.nth(0)
    }

    /// Next element siblings that match `selector`
    #[must_use]
    pub fn next_sibling(self, selector: Selector) -> Self {
        self.push(Step::NextSibling(selector))
    }

    /// Parent elements
    #[must_use]
    pub fn parent(self) -> Self {
        self.push(Step::Parent)
    }

    /// Resolve every match in document order
    pub async fn all(&self, surface: &dyn UiSurface) -> ProbeResult<Vec<ElementRef>> {
        let mut current: Option<Vec<ElementRef>> = self.root.clone().map(|r| vec![r]);

        for step in &self.steps {
            let els = current.take();
            let next = match step {
                Step::Select(selector) => match els {
                    None => surface.query_all(None, selector).await?,
                    Some(scopes) => {
                        let mut seen = HashSet::new();
                        let mut out = Vec::new();
                        for scope in &scopes {
                            for found in surface.query_all(Some(scope), selector).await? {
                                if seen.insert(found.clone()) {
                                    out.push(found);
                                }
                            }
                        }
                        out
                    }
                },
                Step::HasText(text) => {
                    let mut out = Vec::new();
                    for el in els.unwrap_or_default() {
                        if surface.text_content(&el).await?.contains(text.as_str()) {
                            out.push(el);
                        }
                    }
                    out
                }
                Step::HasClass(class) => {
                    let mut out = Vec::new();
                    for el in els.unwrap_or_default() {
                        if surface.has_class(&el, class).await? {
                            out.push(el);
                        }
                    }
                    out
                }
                Step::Has(selector) => {
                    let mut out = Vec::new();
                    for el in els.unwrap_or_default() {
                        if !surface.query_all(Some(&el), selector).await?.is_empty() {
                            out.push(el);
                        }
                    }
                    out
                }
                Step::Nth(index) => els
                    .unwrap_or_default()
                    .into_iter()
                    .nth(*index)
                    .into_iter()
                    .collect(),
                Step::NextSibling(selector) => {
                    let mut out = Vec::new();
                    for el in els.unwrap_or_default() {
                        let Some(sibling) = surface.next_sibling(&el).await? else {
                            continue;
                        };
                        let parent = surface.parent(&sibling).await?;
                        let candidates = surface.query_all(parent.as_ref(), selector).await?;
                        if candidates.contains(&sibling) {
                            out.push(sibling);
                        }
                    }
                    out
                }
                Step::Parent => {
                    let mut seen = HashSet::new();
                    let mut out = Vec::new();
                    for el in els.unwrap_or_default() {
                        if let Some(parent) = surface.parent(&el).await? {
                            if seen.insert(parent.clone()) {
                                out.push(parent);
                            }
                        }
                    }
                    out
                }
            };
            current = Some(next);
        }

        Ok(current.unwrap_or_default())
    }

    /// First match, if any
    pub async fn first_match(&self, surface: &dyn UiSurface) -> ProbeResult<Option<ElementRef>> {
        Ok(self.all(surface).await?.into_iter().next())
    }

    /// First match, or [`ProbeError::ElementNotFound`]
    pub async fn one(&self, surface: &dyn UiSurface) -> ProbeResult<ElementRef> {
        self.first_match(surface)
            .await?
            .ok_or_else(|| ProbeError::ElementNotFound {
                selector: self.to_string(),
            })
    }

    /// Number of matches
    pub async fn count(&self, surface: &dyn UiSurface) -> ProbeResult<usize> {
        Ok(self.all(surface).await?.len())
    }

    /// Whether the first match exists and is visible
    pub async fn is_visible(&self, surface: &dyn UiSurface) -> ProbeResult<bool> {
        match self.first_match(surface).await? {
            Some(el) => surface.is_visible(&el).await,
            None => Ok(false),
        }
    }

    /// Trimmed text of the first match, empty when nothing matches
    pub async fn text(&self, surface: &dyn UiSurface) -> ProbeResult<String> {
        match self.first_match(surface).await? {
            Some(el) => Ok(surface.text_content(&el).await?.trim().to_string()),
            None => Ok(String::new()),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(root) = &self.root {
            parts.push(format!("<{root}>"));
        }
        for step in &self.steps {
            parts.push(match step {
                Step::Select(s) => s.to_string(),
                Step::HasText(t) => format!(":has-text({t:?})"),
                Step::HasClass(c) => format!(".{c}"),
                Step::Has(s) => format!(":has({s})"),
                Step::Nth(i) => format!(":nth({i})"),
                Step::NextSibling(s) => format!("+ {s}"),
                Step::Parent => "..".to_string(),
            });
        }
        write!(f, "{}", parts.join(" >> "))
    }
}
