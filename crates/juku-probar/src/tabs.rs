//! Tab/accordion state controller.
//!
//! The controller never reports a transitional state: [`TabController::activate`]
//! clicks, then blocks on [`poll_until`] until the surface shows the requested
//! tab as the active one. Every query re-reads the surface.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::extract::trimmed;
use crate::locator::{Locator, Selector};
use crate::result::{ProbeError, ProbeResult};
use crate::surface::{ElementRef, UiSurface};
use crate::wait::{poll_until, Observation, WaitOptions};

/// Class marking the active trigger and content on this site
pub const ACTIVE_CLASS: &str = "is-active";

/// Structure of one tab set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabSpec {
    /// Trigger elements, in display order
    pub triggers: Locator,
    /// Content regions, one per trigger
    pub contents: Option<Locator>,
    /// Class carried by the active trigger and content
    pub active_class: String,
    /// Element inside a trigger that receives the click (link-style tabs)
    pub click_target: Option<Selector>,
}

impl TabSpec {
    /// Tab set with triggers and contents
    #[must_use]
    pub fn new(triggers: Locator, contents: Locator) -> Self {
        Self {
            triggers,
            contents: Some(contents),
            active_class: ACTIVE_CLASS.to_string(),
            click_target: None,
        }
    }

    /// Generic `.tab__list` tabs
    #[must_use]
    pub fn tab_list() -> Self {
        Self::new(
            Locator::new(".tab__list").css("ul").css(".tab__item"),
            Locator::new(".tab__content .tab__content-item"),
        )
    }

    /// Inner tabs of a juku section wrap
    #[must_use]
    pub fn juku_inner(container: Locator) -> Self {
        Self::new(
            container
                .clone()
                .css(".bjc-juku-inner-tab-nav .js-tab__item"),
            container.css(".js-tab__content"),
        )
    }

    /// Juku page navigation: each tab is a link to another page, and the
    /// current page's tab is rendered without a link
    #[must_use]
    pub fn juku_page_nav() -> Self {
        Self {
            triggers: Locator::new(".bjc-juku-tab").css("li"),
            contents: None,
            active_class: ACTIVE_CLASS.to_string(),
            click_target: Some(Selector::any_role("link")),
        }
    }

    /// Set the active class
    #[must_use]
    pub fn with_active_class(mut self, class: impl Into<String>) -> Self {
        self.active_class = class.into();
        self
    }

    /// Set the click target
    #[must_use]
    pub fn with_click_target(mut self, target: Selector) -> Self {
        self.click_target = Some(target);
        self
    }
}

/// Live view of one trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabDescriptor {
    /// Trimmed label
    pub label: String,
    /// Whether the trigger carries the active class
    pub is_active: bool,
}

/// Controller over one tab set on one surface
#[derive(Debug, Clone)]
pub struct TabController<'a> {
    surface: &'a dyn UiSurface,
    spec: TabSpec,
    options: WaitOptions,
}

impl<'a> TabController<'a> {
    /// Create a controller with default wait options
    #[must_use]
    pub fn new(surface: &'a dyn UiSurface, spec: TabSpec) -> Self {
        Self {
            surface,
            spec,
            options: WaitOptions::default(),
        }
    }

    /// Set wait options
    #[must_use]
    pub fn with_options(mut self, options: WaitOptions) -> Self {
        self.options = options;
        self
    }

    /// The tab set structure
    #[must_use]
    pub const fn spec(&self) -> &TabSpec {
        &self.spec
    }

    async fn triggers(&self) -> ProbeResult<Vec<(ElementRef, TabDescriptor)>> {
        let mut out = Vec::new();
        for el in self.spec.triggers.all(self.surface).await? {
            let label = trimmed(&self.surface.text_content(&el).await?);
            let is_active = self.surface.has_class(&el, &self.spec.active_class).await?;
            out.push((el, TabDescriptor { label, is_active }));
        }
        Ok(out)
    }

    /// Trigger for `label`: exact trimmed label first, then contains.
    ///
    /// A blank label never matches.
    async fn find(&self, label: &str) -> ProbeResult<Option<(ElementRef, TabDescriptor)>> {
        let wanted = trimmed(label);
        if wanted.is_empty() {
            return Ok(None);
        }
        let triggers = self.triggers().await?;
        if let Some(pos) = triggers.iter().position(|(_, d)| d.label == wanted) {
            return Ok(Some(triggers[pos].clone()));
        }
        let found = triggers
            .into_iter()
            .find(|(_, d)| d.label.contains(&wanted));
        Ok(found)
    }

    /// Labels of every trigger, in display order
    pub async fn list_labels(&self) -> ProbeResult<Vec<String>> {
        let descriptors = self.descriptors().await?;
        Ok(descriptors.into_iter().map(|d| d.label).collect())
    }

    /// Live descriptors of every trigger
    pub async fn descriptors(&self) -> ProbeResult<Vec<TabDescriptor>> {
        let triggers = self.triggers().await?;
        Ok(triggers.into_iter().map(|(_, d)| d).collect())
    }

    /// Label of the active trigger, if any
    pub async fn active_label(&self) -> ProbeResult<Option<String>> {
        Ok(self
            .triggers()
            .await?
            .into_iter()
            .find(|(_, d)| d.is_active)
            .map(|(_, d)| d.label))
    }

    /// Whether `label` resolves to the active trigger; unknown labels are inactive.
    ///
    /// A blank label is [`ProbeError::TabNotFound`].
    pub async fn is_active(&self, label: &str) -> ProbeResult<bool> {
        if trimmed(label).is_empty() {
            return Err(ProbeError::TabNotFound {
                label: label.to_string(),
                available: self.list_labels().await?,
            });
        }
        Ok(self.find(label).await?.is_some_and(|(_, d)| d.is_active))
    }

    /// Activate `label` and block until the surface reports it active.
    ///
    /// Already active is a no-op.
    pub async fn activate(&self, label: &str) -> ProbeResult<()> {
        let Some((trigger, descriptor)) = self.find(label).await? else {
            return Err(ProbeError::TabNotFound {
                label: label.to_string(),
                available: self.list_labels().await?,
            });
        };
        if descriptor.is_active {
            debug!(label, "tab already active");
            return Ok(());
        }

        let target = match &self.spec.click_target {
            None => trigger,
            Some(selector) => self
                .surface
                .query_all(Some(&trigger), selector)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| ProbeError::TabNotClickable {
                    label: label.to_string(),
                })?,
        };
        self.surface.click(&target).await?;
        debug!(label, resolved = %descriptor.label, "clicked tab");

        let resolved = descriptor.label;
        let outcome = poll_until(&self.options, || async {
            let observed = self.active_label().await?;
            Ok(if observed.as_deref() == Some(resolved.as_str()) {
                Observation::Satisfied(observed)
            } else {
                Observation::Pending(observed)
            })
        })
        .await?;
        debug!(
            label,
            satisfied = outcome.is_satisfied(),
            "tab activation settled"
        );

        outcome
            .or_timeout(|observed| ProbeError::TabActivationTimeout {
                requested: label.to_string(),
                observed,
                timeout_ms: self.options.timeout_ms,
            })
            .map(|_| ())
    }

    /// Activate the trigger at `index` (0-based)
    pub async fn activate_index(&self, index: usize) -> ProbeResult<()> {
        let labels = self.list_labels().await?;
        match labels.get(index) {
            Some(label) => self.activate(label).await,
            None => Err(ProbeError::TabNotFound {
                label: format!("#{index}"),
                available: labels,
            }),
        }
    }

    /// `href` of a link-style tab; `None` for the active tab rendered without a link
    pub async fn tab_link(&self, label: &str) -> ProbeResult<Option<String>> {
        let Some((trigger, descriptor)) = self.find(label).await? else {
            return Err(ProbeError::TabNotFound {
                label: label.to_string(),
                available: self.list_labels().await?,
            });
        };
        let selector = self
            .spec
            .click_target
            .clone()
            .unwrap_or_else(|| Selector::any_role("link"));
        let links = self.surface.query_all(Some(&trigger), &selector).await?;
        match links.first() {
            Some(link) => self.surface.attribute(link, "href").await,
            None if descriptor.is_active => Ok(None),
            None => Err(ProbeError::TabNotClickable {
                label: label.to_string(),
            }),
        }
    }

    /// Locator for the active content region
    pub fn active_content(&self) -> ProbeResult<Locator> {
        self.spec
            .contents
            .clone()
            .map(|contents| contents.with_class(self.spec.active_class.clone()).first())
            .ok_or_else(|| ProbeError::precondition("tab set has no content regions"))
    }

    /// Content scope of `label`, which must already be the active tab
    pub async fn active_scope(&self, label: &str) -> ProbeResult<Locator> {
        if !self.is_active(label).await? {
            let active = self.active_label().await?;
            return Err(ProbeError::precondition(format!(
                "cannot read tab '{label}' while '{}' is active; activate it first",
                active.as_deref().unwrap_or("<none>")
            )));
        }
        self.active_content()
    }
}
