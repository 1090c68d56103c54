//! Station/line resolver over the line accordions of a station search page.
//!
//! Each line is a trigger followed by an adjacent target that holds the
//! line's station links. Only expanded lines are addressable: a collapsed
//! line's stations stay in the document but are never returned.
//!
//! Station lookup is tiered. The first tier with any hit wins:
//!
//! 1. [`MatchTier::ExactText`]: the full rendered text, `"札幌（1721件）"`
//! 2. [`MatchTier::ExactName`]: the name without its count, `"札幌"`
//! 3. [`MatchTier::Contains`]: substring of the rendered text
//!
//! Within a tier, candidates keep document order. A tier with more than one
//! candidate is reported as ambiguous on the [`StationMatch`].

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::extract::{count_annotation, strip_count_annotation, trimmed};
use crate::locator::{Locator, Selector};
use crate::result::{ProbeError, ProbeResult};
use crate::surface::{ElementRef, UiSurface};
use crate::wait::{poll_until, wait_until, Observation, WaitOptions};

/// Class carried by an open accordion target
pub const OPEN_CLASS: &str = "is-open";

/// Structure of the line accordions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccordionSpec {
    /// Line triggers
    pub triggers: Locator,
    /// Target adjacent to each trigger
    pub target: Selector,
    /// Station links within a target
    pub stations: Selector,
    /// Class carried by an open target
    pub open_class: String,
}

impl AccordionSpec {
    /// Station list accordions of the prefecture station search page
    #[must_use]
    pub fn station_lines() -> Self {
        Self {
            triggers: Locator::new(".bjc-search-form--station-list-accordion-trigger"),
            target: Selector::css(".bjc-search-form--station-list-accordion-target"),
            stations: Selector::css(".bjc-form--checkbox--wrap a.search-form"),
            open_class: OPEN_CLASS.to_string(),
        }
    }
}

/// One station link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationDescriptor {
    /// Station name without the count annotation
    pub label: String,
    /// Full rendered text, trimmed
    pub text: String,
    /// Link target
    pub href: Option<String>,
    /// Count from the `（N件）` annotation, 0 when absent
    pub result_count: u64,
}

/// One line and, when expanded, its stations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccordionGroup {
    /// Line label
    pub group_label: String,
    /// Whether the target is open and visible
    pub is_expanded: bool,
    /// Stations; empty while collapsed
    pub children: Vec<StationDescriptor>,
}

/// Tier that produced a station match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchTier {
    /// Full rendered text equals the query
    ExactText,
    /// Name without count annotation equals the query
    ExactName,
    /// Rendered text contains the query
    Contains,
}

/// A resolved station
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationMatch {
    /// The station
    pub station: StationDescriptor,
    /// Line it was found in
    pub group: String,
    /// Tier that matched
    pub tier: MatchTier,
    /// More than one candidate in the winning tier; the first in document
    /// order was taken
    pub ambiguous: bool,
    /// Link element
    pub element: ElementRef,
}

/// A station link and what it shows
type StationRow = (ElementRef, StationDescriptor);

struct Candidate {
    group: String,
    element: ElementRef,
    station: StationDescriptor,
}

/// Resolver bound to one surface
#[derive(Debug, Clone)]
pub struct StationResolver<'a> {
    surface: &'a dyn UiSurface,
    spec: AccordionSpec,
    options: WaitOptions,
}

impl<'a> StationResolver<'a> {
    /// Create a resolver with default wait options
    #[must_use]
    pub fn new(surface: &'a dyn UiSurface, spec: AccordionSpec) -> Self {
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

    async fn lines(&self) -> ProbeResult<Vec<(ElementRef, String)>> {
        let mut out = Vec::new();
        for el in self.spec.triggers.all(self.surface).await? {
            let label = trimmed(&self.surface.text_content(&el).await?);
            out.push((el, label));
        }
        Ok(out)
    }

    async fn find_line(&self, line: &str) -> ProbeResult<(ElementRef, String)> {
        let wanted = trimmed(line);
        let not_found = || ProbeError::ElementNotFound {
            selector: format!("{} >> :has-text({line:?})", self.spec.triggers),
        };
        if wanted.is_empty() {
            return Err(not_found());
        }
        let lines = self.lines().await?;
        if let Some(pos) = lines.iter().position(|(_, l)| *l == wanted) {
            return Ok(lines[pos].clone());
        }
        lines
            .into_iter()
            .find(|(_, l)| l.contains(&wanted))
            .ok_or_else(not_found)
    }

    async fn target_of(&self, trigger: &ElementRef) -> ProbeResult<Option<ElementRef>> {
        Locator::root(trigger.clone())
            .next_sibling(self.spec.target.clone())
            .first_match(self.surface)
            .await
    }

    /// `(open class present, expanded)` for a trigger
    async fn open_state(&self, trigger: &ElementRef) -> ProbeResult<(bool, bool)> {
        let Some(target) = self.target_of(trigger).await? else {
            return Ok((false, false));
        };
        let open = self
            .surface
            .has_class(&target, &self.spec.open_class)
            .await?;
        let visible = open && self.surface.is_visible(&target).await?;
        Ok((open, visible))
    }

    /// Line labels in display order
    pub async fn line_labels(&self) -> ProbeResult<Vec<String>> {
        Ok(self.lines().await?.into_iter().map(|(_, l)| l).collect())
    }

    /// Whether `line` is open and its stations are visible
    pub async fn is_expanded(&self, line: &str) -> ProbeResult<bool> {
        let (trigger, _) = self.find_line(line).await?;
        Ok(self.open_state(&trigger).await?.1)
    }

    /// Open `line` and block until its stations are visible
    pub async fn expand(&self, line: &str) -> ProbeResult<()> {
        let (trigger, label) = self.find_line(line).await?;
        if self.open_state(&trigger).await?.1 {
            debug!(line = %label, "line already expanded");
            return Ok(());
        }
        self.surface.click(&trigger).await?;

        let outcome = poll_until(&self.options, || async {
            let (open, expanded) = self.open_state(&trigger).await?;
            Ok(if expanded {
                Observation::Satisfied(open)
            } else {
                Observation::Pending(open)
            })
        })
        .await?;
        debug!(line = %label, satisfied = outcome.is_satisfied(), "line expansion settled");

        outcome
            .or_timeout(|observed_open| ProbeError::AccordionExpansionTimeout {
                group: line.to_string(),
                timeout_ms: self.options.timeout_ms,
                observed_open,
            })
            .map(|_| ())
    }

    /// Close `line` and block until its stations are hidden
    pub async fn collapse(&self, line: &str) -> ProbeResult<()> {
        let (trigger, label) = self.find_line(line).await?;
        if !self.open_state(&trigger).await?.1 {
            return Ok(());
        }
        self.surface.click(&trigger).await?;
        wait_until(&self.options, &format!("line '{label}' to collapse"), || async {
            Ok(!self.open_state(&trigger).await?.1)
        })
        .await?;
        debug!(line = %label, "line collapsed");
        Ok(())
    }

    async fn read_stations(&self, target: &ElementRef) -> ProbeResult<Vec<StationRow>> {
        let links = self
            .surface
            .query_all(Some(target), &self.spec.stations)
            .await?;
        let mut out = Vec::new();
        for el in links {
            let text = trimmed(&self.surface.text_content(&el).await?);
            let station = StationDescriptor {
                label: strip_count_annotation(&text).to_string(),
                result_count: count_annotation(&text),
                href: self.surface.attribute(&el, "href").await?,
                text,
            };
            out.push((el, station));
        }
        Ok(out)
    }

    async fn expanded_stations(
        &self,
        trigger: &ElementRef,
    ) -> ProbeResult<Option<Vec<StationRow>>> {
        if !self.open_state(trigger).await?.1 {
            return Ok(None);
        }
        match self.target_of(trigger).await? {
            Some(target) => Ok(Some(self.read_stations(&target).await?)),
            None => Ok(None),
        }
    }

    /// Stations of `line`; empty while the line is collapsed
    pub async fn stations_in(&self, line: &str) -> ProbeResult<Vec<StationDescriptor>> {
        let (trigger, _) = self.find_line(line).await?;
        Ok(self
            .expanded_stations(&trigger)
            .await?
            .unwrap_or_default()
            .into_iter()
            .map(|(_, s)| s)
            .collect())
    }

    /// Every line with its expansion state and visible stations
    pub async fn groups(&self) -> ProbeResult<Vec<AccordionGroup>> {
        let mut groups = Vec::new();
        for (trigger, label) in self.lines().await? {
            let stations = self.expanded_stations(&trigger).await?;
            groups.push(AccordionGroup {
                group_label: label,
                is_expanded: stations.is_some(),
                children: stations
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(_, s)| s)
                    .collect(),
            });
        }
        Ok(groups)
    }

    /// Resolve `label` among the stations of expanded lines
    pub async fn resolve_station(&self, label: &str) -> ProbeResult<StationMatch> {
        let wanted = trimmed(label);
        let mut searched = Vec::new();
        let mut candidates = Vec::new();
        for (trigger, group) in self.lines().await? {
            let Some(stations) = self.expanded_stations(&trigger).await? else {
                continue;
            };
            for (element, station) in stations {
                candidates.push(Candidate {
                    group: group.clone(),
                    element,
                    station,
                });
            }
            searched.push(group);
        }
        if wanted.is_empty() {
            return Err(ProbeError::StationNotFound {
                label: label.to_string(),
                searched,
            });
        }

        let tiers: [(MatchTier, fn(&StationDescriptor, &str) -> bool); 3] = [
            (MatchTier::ExactText, |s, w| s.text == w),
            (MatchTier::ExactName, |s, w| s.label == w),
            (MatchTier::Contains, |s, w| s.text.contains(w)),
        ];
        for (tier, accept) in tiers {
            let mut hits = candidates.iter().filter(|c| accept(&c.station, &wanted));
            let Some(first) = hits.next() else {
                continue;
            };
            let others = hits.count();
            if others > 0 {
                warn!(
                    label = %wanted,
                    ?tier,
                    candidates = others + 1,
                    chosen = %first.station.text,
                    "ambiguous station label, taking first in document order"
                );
            }
            debug!(label = %wanted, ?tier, group = %first.group, "station resolved");
            return Ok(StationMatch {
                station: first.station.clone(),
                group: first.group.clone(),
                tier,
                ambiguous: others > 0,
                element: first.element.clone(),
            });
        }

        Err(ProbeError::StationNotFound {
            label: label.to_string(),
            searched,
        })
    }

    /// Resolve `label` and click it
    pub async fn select_station(&self, label: &str) -> ProbeResult<StationMatch> {
        let found = self.resolve_station(label).await?;
        self.surface.click(&found.element).await?;
        Ok(found)
    }
}
