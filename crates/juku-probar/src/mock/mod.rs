//! In-memory surface for unit and integration tests.
//!
//! [`MockSurface`] holds a small arena document seeded from a
//! [`MockElement`] tree. It reproduces the parts of a browser the
//! controllers depend on:
//!
//! - CSS-subset queries, implicit ARIA roles and accessible names
//! - native checkbox, radio, label and text-input behaviour on click/fill
//! - link clicks and `goto` routed to registered pages, with load states
//! - page scripts, modelled as click reactions that run after a delay on
//!   tokio's clock (use `#[tokio::test(start_paused = true)]`)
//! - stale references after navigation
//!
//! ```ignore
//! let page = MockSurface::new(MockElement::new("body").child(...));
//! let delay = Duration::from_millis(100);
//! page.install_tab_behavior(".tab__item", ".tab__content-item", "is-active", delay);
//! ```

mod dom;
pub mod fixtures;
mod selector;

pub use dom::{MockDom, MockElement, NodeId};
pub use selector::SelectorList;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::extract::trimmed;
use crate::locator::Selector;
use crate::result::{ProbeError, ProbeResult};
use crate::surface::{ElementRef, UiSurface};
use crate::wait::LoadState;

type Reaction = Arc<dyn Fn(&mut MockDom, NodeId) -> ProbeResult<()> + Send + Sync>;

struct ClickRule {
    selector: String,
    delay: Duration,
    reaction: Reaction,
}

struct Scheduled {
    due: Instant,
    seq: u64,
    target: NodeId,
    reaction: Reaction,
}

struct MockState {
    dom: MockDom,
    generation: u64,
    url: String,
    routes: HashMap<String, MockElement>,
    rules: Vec<ClickRule>,
    scheduled: Vec<Scheduled>,
    seq: u64,
    loaded_at: Instant,
    dom_ready_after: Duration,
    load_after: Duration,
    clicks: usize,
}

/// In-memory [`UiSurface`]
pub struct MockSurface {
    state: Mutex<MockState>,
}

impl std::fmt::Debug for MockSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("MockSurface");
        if let Ok(state) = self.state.lock() {
            s.field("url", &state.url)
                .field("generation", &state.generation)
                .field("pending_reactions", &state.scheduled.len());
        }
        s.finish_non_exhaustive()
    }
}

impl MockSurface {
    /// Surface showing `root` at `about:blank`
    #[must_use]
    pub fn new(root: MockElement) -> Self {
        Self {
            state: Mutex::new(MockState {
                dom: MockDom::build(&root, Vec::new()),
                generation: 0,
                url: "about:blank".to_string(),
                routes: HashMap::new(),
                rules: Vec::new(),
                scheduled: Vec::new(),
                seq: 0,
                loaded_at: Instant::now(),
                dom_ready_after: Duration::ZERO,
                load_after: Duration::ZERO,
                clicks: 0,
            }),
        }
    }

    fn lock(&self) -> ProbeResult<MutexGuard<'_, MockState>> {
        self.state
            .lock()
            .map_err(|_| ProbeError::surface("mock surface lock poisoned"))
    }

    /// Set the current URL without navigating
    pub fn set_url(&self, url: &str) {
        if let Ok(mut state) = self.lock() {
            state.url = url.to_string();
        }
    }

    /// Serve `page` for navigations to `path`
    pub fn route(&self, path: &str, page: MockElement) {
        if let Ok(mut state) = self.lock() {
            state.routes.insert(path.to_string(), page);
        }
    }

    /// Delays after a navigation until `DOMContentLoaded` and `load`
    pub fn set_load_timing(&self, dom_ready: Duration, load: Duration) {
        if let Ok(mut state) = self.lock() {
            state.dom_ready_after = dom_ready;
            state.load_after = load.max(dom_ready);
        }
    }

    /// Elements matching `selector` are only visible while carrying `class`
    pub fn show_only_with_class(&self, selector: &str, class: &str) {
        if let Ok(mut state) = self.lock() {
            state.dom.add_visibility_rule(selector, class);
        }
    }

    /// Run `reaction` `delay` after a click lands on (or inside) an element
    /// matching `selector`; the reaction receives that element
    pub fn on_click<F>(&self, selector: &str, delay: Duration, reaction: F)
    where
        F: Fn(&mut MockDom, NodeId) -> ProbeResult<()> + Send + Sync + 'static,
    {
        if let Ok(mut state) = self.lock() {
            state.rules.push(ClickRule {
                selector: selector.to_string(),
                delay,
                reaction: Arc::new(reaction),
            });
        }
    }

    /// Tab script: a click on a trigger moves `active_class` to it and to the
    /// content at the same index
    pub fn install_tab_behavior(
        &self,
        trigger: &str,
        content: &str,
        active_class: &str,
        delay: Duration,
    ) {
        let trigger_sel = trigger.to_string();
        let content_sel = content.to_string();
        let class = active_class.to_string();
        self.on_click(trigger, delay, move |dom, target| {
            let Some(parent) = dom.parent(target) else {
                return Ok(());
            };
            let siblings: Vec<NodeId> = dom
                .select_within(parent, &trigger_sel)?
                .into_iter()
                .filter(|n| dom.parent(*n) == Some(parent))
                .collect();
            let Some(index) = siblings.iter().position(|n| *n == target) else {
                return Ok(());
            };
            for node in &siblings {
                dom.remove_class(*node, &class);
            }
            dom.add_class(target, &class);

            let mut scope = Some(parent);
            while let Some(anc) = scope {
                let found = dom.select_within(anc, &content_sel)?;
                if let Some(first) = found.first() {
                    let group_parent = dom.parent(*first);
                    let group: Vec<NodeId> = found
                        .into_iter()
                        .filter(|n| dom.parent(*n) == group_parent)
                        .collect();
                    if let Some(active) = group.get(index).copied() {
                        for node in &group {
                            dom.remove_class(*node, &class);
                        }
                        dom.add_class(active, &class);
                    }
                    break;
                }
                scope = dom.parent(anc);
            }
            Ok(())
        });
    }

    /// Accordion script: a click on a trigger toggles `open_class` on the
    /// adjacent target; targets are only visible while open
    pub fn install_accordion_behavior(
        &self,
        trigger: &str,
        target: &str,
        open_class: &str,
        delay: Duration,
    ) {
        self.show_only_with_class(target, open_class);
        let target_sel = target.to_string();
        let class = open_class.to_string();
        self.on_click(trigger, delay, move |dom, clicked| {
            let Some(next) = dom.next_sibling(clicked) else {
                return Ok(());
            };
            let Some(parent) = dom.parent(next) else {
                return Ok(());
            };
            if !dom.select_within(parent, &target_sel)?.contains(&next) {
                return Ok(());
            }
            if dom.has_class(next, &class) {
                dom.remove_class(next, &class);
            } else {
                dom.add_class(next, &class);
            }
            Ok(())
        });
    }

    /// Mutate the document directly, as a script outside the test would
    pub fn mutate<R>(&self, f: impl FnOnce(&mut MockDom) -> R) -> ProbeResult<R> {
        let mut state = self.lock()?;
        Self::settle(&mut state)?;
        Ok(f(&mut state.dom))
    }

    /// Number of clicks delivered so far
    #[must_use]
    pub fn click_count(&self) -> usize {
        self.lock().map_or(0, |s| s.clicks)
    }

    /// Apply every scheduled reaction that is due, in due order
    fn settle(state: &mut MockState) -> ProbeResult<()> {
        let now = Instant::now();
        loop {
            let next = state
                .scheduled
                .iter()
                .enumerate()
                .filter(|(_, s)| s.due <= now)
                .min_by_key(|(_, s)| (s.due, s.seq))
                .map(|(i, _)| i);
            let Some(index) = next else {
                return Ok(());
            };
            let job = state.scheduled.remove(index);
            (job.reaction)(&mut state.dom, job.target)?;
            if state.dom.take_reload_request() {
                Self::reload(state);
            }
        }
    }

    fn reload(state: &mut MockState) {
        state.generation += 1;
        state.loaded_at = Instant::now();
        state.scheduled.clear();
        debug!(url = %state.url, generation = state.generation, "mock reload");
    }

    fn node(state: &MockState, element: &ElementRef) -> ProbeResult<NodeId> {
        let stale = || ProbeError::StaleElement {
            reference: element.to_string(),
        };
        let (generation, node) = element.as_str().split_once(':').ok_or_else(stale)?;
        let generation: u64 = generation.parse().map_err(|_| stale())?;
        let node: NodeId = node.parse().map_err(|_| stale())?;
        if generation != state.generation || !state.dom.contains(node) {
            return Err(stale());
        }
        Ok(node)
    }

    fn reference(state: &MockState, node: NodeId) -> ElementRef {
        ElementRef::new(format!("{}:{node}", state.generation))
    }

    fn navigate(state: &mut MockState, href: &str) -> ProbeResult<()> {
        let url = resolve_url(&state.url, href);
        let page = state
            .routes
            .get(path_of(&url))
            .cloned()
            .ok_or_else(|| ProbeError::Navigation {
                url: url.clone(),
                message: "no route registered".to_string(),
            })?;
        let rules = state.dom.visibility_rules();
        state.dom = MockDom::build(&page, rules);
        state.url = url;
        Self::reload(state);
        Ok(())
    }

    fn matches(dom: &MockDom, node: NodeId, selector: &Selector) -> ProbeResult<bool> {
        Ok(match selector {
            Selector::Css(css) => SelectorList::parse(css)?.matches(dom, node),
            Selector::Text(text) => {
                dom.text_content(node).contains(text.as_str())
                    && !dom
                        .children(node)
                        .iter()
                        .any(|c| dom.text_content(*c).contains(text.as_str()))
            }
            Selector::Role { role, name } => {
                dom.role(node).as_deref() == Some(role.as_str())
                    && name
                        .as_ref()
                        .map_or(true, |n| dom.accessible_name(node) == trimmed(n))
            }
            Selector::Placeholder(p) => dom.attr(node, "placeholder") == Some(p.as_str()),
            Selector::TestId(id) => dom.attr(node, "data-testid") == Some(id.as_str()),
        })
    }

    fn toggle_control(dom: &mut MockDom, node: NodeId) {
        match dom.input_type(node) {
            Some("checkbox") => {
                let checked = dom.is_checked(node);
                dom.set_checked(node, !checked);
            }
            Some("radio") => dom.set_checked(node, true),
            _ => {}
        }
    }
}

#[async_trait]
impl UiSurface for MockSurface {
    async fn query_all(
        &self,
        scope: Option<&ElementRef>,
        selector: &Selector,
    ) -> ProbeResult<Vec<ElementRef>> {
        let mut state = self.lock()?;
        Self::settle(&mut state)?;
        let candidates: Vec<NodeId> = match scope {
            Some(scope) => state.dom.descendants(Self::node(&state, scope)?).collect(),
            None => state.dom.all().collect(),
        };
        let mut out = Vec::new();
        for node in candidates {
            if Self::matches(&state.dom, node, selector)? {
                out.push(Self::reference(&state, node));
            }
        }
        Ok(out)
    }

    async fn parent(&self, element: &ElementRef) -> ProbeResult<Option<ElementRef>> {
        let mut state = self.lock()?;
        Self::settle(&mut state)?;
        let node = Self::node(&state, element)?;
        Ok(state.dom.parent(node).map(|p| Self::reference(&state, p)))
    }

    async fn next_sibling(&self, element: &ElementRef) -> ProbeResult<Option<ElementRef>> {
        let mut state = self.lock()?;
        Self::settle(&mut state)?;
        let node = Self::node(&state, element)?;
        let next = state.dom.next_sibling(node);
        Ok(next.map(|s| Self::reference(&state, s)))
    }

    async fn text_content(&self, element: &ElementRef) -> ProbeResult<String> {
        let mut state = self.lock()?;
        Self::settle(&mut state)?;
        let node = Self::node(&state, element)?;
        Ok(state.dom.text_content(node))
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> ProbeResult<Option<String>> {
        let mut state = self.lock()?;
        Self::settle(&mut state)?;
        let node = Self::node(&state, element)?;
        Ok(state.dom.attr(node, name).map(ToString::to_string))
    }

    async fn is_visible(&self, element: &ElementRef) -> ProbeResult<bool> {
        let mut state = self.lock()?;
        Self::settle(&mut state)?;
        let node = Self::node(&state, element)?;
        state.dom.is_visible(node)
    }

    async fn is_checked(&self, element: &ElementRef) -> ProbeResult<bool> {
        let mut state = self.lock()?;
        Self::settle(&mut state)?;
        let node = Self::node(&state, element)?;
        Ok(state.dom.is_checked(node))
    }

    async fn input_value(&self, element: &ElementRef) -> ProbeResult<String> {
        let mut state = self.lock()?;
        Self::settle(&mut state)?;
        let node = Self::node(&state, element)?;
        Ok(state.dom.value(node).to_string())
    }

    async fn click(&self, element: &ElementRef) -> ProbeResult<()> {
        let mut state = self.lock()?;
        Self::settle(&mut state)?;
        let node = Self::node(&state, element)?;
        if !state.dom.is_visible(node)? {
            return Err(ProbeError::surface(format!(
                "cannot click {element}: element is not visible"
            )));
        }
        state.clicks += 1;

        // Native behaviour first, then page scripts
        let dom = &mut state.dom;
        if dom.tag(node) == "label" {
            if let Some(control) = dom.labeled_control(node) {
                Self::toggle_control(dom, control);
            }
        } else {
            Self::toggle_control(dom, node);
        }

        let mut link = None;
        let mut cur = Some(node);
        while let Some(n) = cur {
            if dom.tag(n) == "a" {
                link = dom
                    .attr(n, "href")
                    .filter(|h| !h.starts_with('#') && !h.starts_with("javascript:"))
                    .map(ToString::to_string);
                break;
            }
            cur = dom.parent(n);
        }
        if let Some(href) = link {
            debug!(%href, "mock link click");
            return Self::navigate(&mut state, &href);
        }

        let now = Instant::now();
        let mut jobs = Vec::new();
        for rule in &state.rules {
            let selector = SelectorList::parse(&rule.selector)?;
            let mut cur = Some(node);
            while let Some(n) = cur {
                if selector.matches(&state.dom, n) {
                    jobs.push((now + rule.delay, n, rule.reaction.clone()));
                    break;
                }
                cur = state.dom.parent(n);
            }
        }
        for (due, target, reaction) in jobs {
            state.seq += 1;
            let seq = state.seq;
            state.scheduled.push(Scheduled {
                due,
                seq,
                target,
                reaction,
            });
        }
        Ok(())
    }

    async fn fill(&self, element: &ElementRef, text: &str) -> ProbeResult<()> {
        let mut state = self.lock()?;
        Self::settle(&mut state)?;
        let node = Self::node(&state, element)?;
        if !state.dom.is_text_control(node) {
            return Err(ProbeError::surface(format!(
                "cannot fill {element}: not a text input"
            )));
        }
        state.dom.set_value(node, text);
        Ok(())
    }

    async fn goto(&self, url: &str) -> ProbeResult<()> {
        let mut state = self.lock()?;
        Self::navigate(&mut state, url)
    }

    async fn current_url(&self) -> ProbeResult<String> {
        Ok(self.lock()?.url.clone())
    }

    async fn load_state(&self) -> ProbeResult<LoadState> {
        let mut state = self.lock()?;
        Self::settle(&mut state)?;
        let elapsed = state.loaded_at.elapsed();
        Ok(if elapsed >= state.load_after {
            LoadState::Load
        } else if elapsed >= state.dom_ready_after {
            LoadState::DomContentLoaded
        } else {
            LoadState::Loading
        })
    }
}

/// Resolve `href` against the origin of `base`
fn resolve_url(base: &str, href: &str) -> String {
    if href.contains("://") {
        return href.to_string();
    }
    match origin(base) {
        Some(origin) if href.starts_with('/') => format!("{origin}{href}"),
        Some(origin) => format!("{origin}/{href}"),
        None => href.to_string(),
    }
}

fn origin(url: &str) -> Option<&str> {
    let (scheme, rest) = url.split_once("://")?;
    let host_len = rest.find('/').unwrap_or(rest.len());
    Some(&url[..scheme.len() + 3 + host_len])
}

fn path_of(url: &str) -> &str {
    let path = origin(url).map_or(url, |o| &url[o.len()..]);
    let path = path.split(['?', '#']).next().unwrap_or_default();
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn page() -> MockSurface {
        MockSurface::new(
            MockElement::new("body")
                .child(MockElement::new("button").class("open").text("開く"))
                .child(MockElement::new("div").id("panel").class("panel"))
                .child(MockElement::new("a").attr("href", "/next/").text("次へ"))
                .child(MockElement::labeled_checkbox("who", "保護者", false))
                .child(
                    MockElement::new("input")
                        .attr("placeholder", "キーワードを入力"),
                ),
        )
    }

    async fn find(page: &MockSurface, selector: Selector) -> Vec<ElementRef> {
        page.query_all(None, &selector).await.unwrap()
    }

    mod url_tests {
        use super::*;

        #[test]
        fn test_resolve() {
            assert_eq!(
                resolve_url("https://example.com/a/", "/b/"),
                "https://example.com/b/"
            );
            assert_eq!(
                resolve_url("https://example.com", "b/"),
                "https://example.com/b/"
            );
            assert_eq!(resolve_url("about:blank", "/b/"), "/b/");
            assert_eq!(path_of("https://example.com/juku/1/?x=1"), "/juku/1/");
            assert_eq!(path_of("https://example.com"), "/");
        }
    }

    mod query_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_selector_kinds() {
            let page = page();
            for selector in [
                Selector::css("button.open"),
                Selector::text("次へ"),
                Selector::role("checkbox", "保護者"),
                Selector::any_role("link"),
                Selector::placeholder("キーワードを入力"),
            ] {
                assert_eq!(find(&page, selector.clone()).await.len(), 1, "{selector}");
            }
            assert!(find(&page, Selector::test_id("x")).await.is_empty());
        }

        #[tokio::test(start_paused = true)]
        async fn test_scope_excludes_self() {
            let page = page();
            let body = find(&page, Selector::css("body")).await;
            let inner = page
                .query_all(Some(&body[0]), &Selector::css("body"))
                .await
                .unwrap();
            assert!(inner.is_empty());
        }
    }

    mod interaction_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_reaction_runs_after_delay() {
            let page = page();
            page.on_click("button.open", Duration::from_millis(100), |dom, _| {
                for node in dom.select("#panel")? {
                    dom.add_class(node, "is-open");
                }
                Ok(())
            });
            let button = find(&page, Selector::css("button")).await;
            page.click(&button[0]).await.unwrap();

            let panel = find(&page, Selector::css("#panel")).await;
            assert!(!page.has_class(&panel[0], "is-open").await.unwrap());
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(page.has_class(&panel[0], "is-open").await.unwrap());
            assert_eq!(page.click_count(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_label_click_toggles_checkbox() {
            let page = page();
            let label = find(&page, Selector::css("label")).await;
            let input = find(&page, Selector::role("checkbox", "保護者")).await;
            page.click(&label[0]).await.unwrap();
            assert!(page.is_checked(&input[0]).await.unwrap());
            page.click(&input[0]).await.unwrap();
            assert!(!page.is_checked(&input[0]).await.unwrap());
        }

        #[tokio::test(start_paused = true)]
        async fn test_fill() {
            let page = page();
            let input = find(&page, Selector::placeholder("キーワードを入力")).await;
            page.fill(&input[0], "英語").await.unwrap();
            assert_eq!(page.input_value(&input[0]).await.unwrap(), "英語");
            let button = find(&page, Selector::css("button")).await;
            assert!(page.fill(&button[0], "x").await.is_err());
        }

        #[tokio::test(start_paused = true)]
        async fn test_hidden_elements_are_not_clickable() {
            let page = page();
            page.show_only_with_class("#panel", "is-open");
            let panel = find(&page, Selector::css("#panel")).await;
            assert!(!page.is_visible(&panel[0]).await.unwrap());
            assert!(page.click(&panel[0]).await.is_err());
        }
    }

    mod navigation_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_link_navigation_and_stale_refs() {
            let page = page();
            page.set_url("https://example.com/");
            let next = MockElement::new("body").child(MockElement::new("h1").text("次"));
            page.route("/next/", next);
            page.set_load_timing(Duration::from_millis(10), Duration::from_millis(30));

            let link = find(&page, Selector::any_role("link")).await;
            page.click(&link[0]).await.unwrap();
            assert_eq!(
                page.current_url().await.unwrap(),
                "https://example.com/next/"
            );
            assert_eq!(page.load_state().await.unwrap(), LoadState::Loading);

            let err = page.text_content(&link[0]).await.unwrap_err();
            assert!(matches!(err, ProbeError::StaleElement { .. }));

            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(
                page.load_state().await.unwrap(),
                LoadState::DomContentLoaded
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(page.load_state().await.unwrap(), LoadState::Load);
        }

        #[tokio::test(start_paused = true)]
        async fn test_unrouted_goto_fails() {
            let page = page();
            let err = page.goto("https://example.com/missing/").await.unwrap_err();
            assert!(matches!(err, ProbeError::Navigation { .. }));
        }

        #[tokio::test(start_paused = true)]
        async fn test_garbage_reference_is_stale() {
            let page = page();
            let garbage = ElementRef::new("nope");
            let err = page.text_content(&garbage).await.unwrap_err();
            assert!(matches!(err, ProbeError::StaleElement { .. }));
        }
    }
}
