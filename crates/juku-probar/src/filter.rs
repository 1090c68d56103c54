//! Filter aggregator for the review filter modal.
//!
//! A [`FilterSelection`] names only the axes a test cares about. Applying
//! it leaves every other axis as the page had it, so the expected state
//! after an apply is `before.merge(&selection)`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::locator::{Locator, Selector};
use crate::result::{ProbeError, ProbeResult};
use crate::surface::{ElementRef, UiSurface};
use crate::wait::{poll_until, wait_until, LoadState, Observation, WaitOptions};

/// A form option addressed by ARIA role and accessible name
pub trait FormOption: Copy + Ord + Sized {
    /// ARIA role of the control
    const ROLE: &'static str;

    /// Every option in display order
    fn options() -> Vec<Self>;

    /// Accessible name of the control
    fn label(self) -> String;
}

macro_rules! form_option {
    (
        $(#[$meta:meta])*
        $name:ident: $role:literal {
            $($(#[$vmeta:meta])* $variant:ident => $label:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl FormOption for $name {
            const ROLE: &'static str = $role;

            fn options() -> Vec<Self> {
                vec![$(Self::$variant),+]
            }

            fn label(self) -> String {
                match self {
                    $(Self::$variant => $label.to_string(),)+
                }
            }
        }
    };
}

form_option! {
    /// Post date ordering
    DateSort: "radio" {
        /// 新しい順
        New => "新しい順",
        /// 古い順
        Old => "古い順",
    }
}

form_option! {
    /// Evaluation ordering
    EvaluationSort: "radio" {
        /// 高い順
        High => "高い順",
        /// 低い順
        Low => "低い順",
    }
}

form_option! {
    /// Who wrote the review
    RespondentType: "checkbox" {
        /// 保護者
        Parent => "保護者",
        /// 生徒
        Student => "生徒",
    }
}

form_option! {
    /// Purpose of attending
    Purpose: "checkbox" {
        /// 大学受験
        University => "大学受験",
        /// 高校受験
        HighSchool => "高校受験",
        /// 中学受験
        MiddleSchool => "中学受験",
        /// 小学校受験
        Elementary => "小学校受験",
        /// テスト対策
        TestPrep => "テスト対策",
        /// 中高一貫校
        Integrated => "中高一貫校",
        /// 子供英語
        English => "子供英語",
    }
}

/// Star rating, 1 to 5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    /// Validate a star count
    pub fn new(stars: u8) -> ProbeResult<Self> {
        if (1..=5).contains(&stars) {
            Ok(Self(stars))
        } else {
            Err(ProbeError::precondition(format!(
                "rating must be between 1 and 5, got {stars}"
            )))
        }
    }

    /// Star count
    #[must_use]
    pub const fn stars(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = ProbeError;

    fn try_from(stars: u8) -> ProbeResult<Self> {
        Self::new(stars)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

impl FormOption for Rating {
    const ROLE: &'static str = "checkbox";

    fn options() -> Vec<Self> {
        (1..=5).map(Self).collect()
    }

    fn label(self) -> String {
        format!("星{}", self.0)
    }
}

/// Partial selection: `None` axes are not touched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    /// Post date ordering
    pub date_sort: Option<DateSort>,
    /// Evaluation ordering
    pub evaluation_sort: Option<EvaluationSort>,
    /// Exact respondent membership
    pub respondent_types: Option<BTreeSet<RespondentType>>,
    /// Exact purpose membership
    pub purposes: Option<BTreeSet<Purpose>>,
    /// Exact rating membership
    pub ratings: Option<BTreeSet<Rating>>,
    /// Keyword; `Some("")` clears the field
    pub keyword: Option<String>,
}

impl FilterSelection {
    /// Empty selection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set date ordering
    #[must_use]
    pub const fn with_date_sort(mut self, sort: DateSort) -> Self {
        self.date_sort = Some(sort);
        self
    }

    /// Set evaluation ordering
    #[must_use]
    pub const fn with_evaluation_sort(mut self, sort: EvaluationSort) -> Self {
        self.evaluation_sort = Some(sort);
        self
    }

    /// Set respondent types
    #[must_use]
    pub fn with_respondent_types(
        mut self,
        types: impl IntoIterator<Item = RespondentType>,
    ) -> Self {
        self.respondent_types = Some(types.into_iter().collect());
        self
    }

    /// Set purposes
    #[must_use]
    pub fn with_purposes(mut self, purposes: impl IntoIterator<Item = Purpose>) -> Self {
        self.purposes = Some(purposes.into_iter().collect());
        self
    }

    /// Set ratings
    #[must_use]
    pub fn with_ratings(mut self, ratings: impl IntoIterator<Item = Rating>) -> Self {
        self.ratings = Some(ratings.into_iter().collect());
        self
    }

    /// Set keyword
    #[must_use]
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    /// Whether no axis is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// State of every axis as read back from the form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedFilters {
    /// `New` only while its radio is checked
    pub date_sort: DateSort,
    /// `High` only while its radio is checked
    pub evaluation_sort: EvaluationSort,
    /// Checked respondent types
    pub respondent_types: BTreeSet<RespondentType>,
    /// Checked purposes
    pub purposes: BTreeSet<Purpose>,
    /// Checked ratings
    pub ratings: BTreeSet<Rating>,
    /// Keyword field value
    pub keyword: String,
}

impl AppliedFilters {
    /// Expected state after applying `selection` on top of `self`
    #[must_use]
    pub fn merge(&self, selection: &FilterSelection) -> Self {
        Self {
            date_sort: selection.date_sort.unwrap_or(self.date_sort),
            evaluation_sort: selection.evaluation_sort.unwrap_or(self.evaluation_sort),
            respondent_types: selection
                .respondent_types
                .clone()
                .unwrap_or_else(|| self.respondent_types.clone()),
            purposes: selection
                .purposes
                .clone()
                .unwrap_or_else(|| self.purposes.clone()),
            ratings: selection
                .ratings
                .clone()
                .unwrap_or_else(|| self.ratings.clone()),
            keyword: selection
                .keyword
                .clone()
                .unwrap_or_else(|| self.keyword.clone()),
        }
    }
}

impl From<AppliedFilters> for FilterSelection {
    fn from(applied: AppliedFilters) -> Self {
        Self {
            date_sort: Some(applied.date_sort),
            evaluation_sort: Some(applied.evaluation_sort),
            respondent_types: Some(applied.respondent_types),
            purposes: Some(applied.purposes),
            ratings: Some(applied.ratings),
            keyword: Some(applied.keyword),
        }
    }
}

/// Structure of the filter modal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    /// Modal container (CSS)
    pub modal: String,
    /// Class carried by the open modal
    pub open_class: String,
    /// Page button that opens the modal
    pub open_button: Selector,
    /// Buttons inside the modal
    pub close_button: Selector,
    /// Resets every control
    pub clear_button: Selector,
    /// Submits the form
    pub submit_button: Selector,
    /// Keyword text input
    pub keyword: Selector,
}

impl FilterSpec {
    /// Review filter modal of a juku review page
    #[must_use]
    pub fn review_modal() -> Self {
        Self {
            modal: "#modal-1".to_string(),
            open_class: "is-open".to_string(),
            open_button: Selector::role("button", "絞り込み"),
            close_button: Selector::role("button", "close"),
            clear_button: Selector::role("button", "クリア"),
            submit_button: Selector::role("button", "検索する"),
            keyword: Selector::placeholder("キーワードを入力"),
        }
    }
}

/// Filter form bound to one surface
#[derive(Debug, Clone)]
pub struct FilterForm<'a> {
    surface: &'a dyn UiSurface,
    spec: FilterSpec,
    options: WaitOptions,
}

impl<'a> FilterForm<'a> {
    /// Create a form driver with default wait options
    #[must_use]
    pub fn new(surface: &'a dyn UiSurface, spec: FilterSpec) -> Self {
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

    fn modal(&self) -> Locator {
        Locator::new(self.spec.modal.clone())
    }

    async fn control(&self, selector: &Selector) -> ProbeResult<ElementRef> {
        self.modal()
            .locator(selector.clone())
            .first()
            .one(self.surface)
            .await
    }

    /// Whether the modal carries its open class and is visible
    pub async fn is_open(&self) -> ProbeResult<bool> {
        let Some(modal) = self.modal().first_match(self.surface).await? else {
            return Ok(false);
        };
        Ok(self.surface.has_class(&modal, &self.spec.open_class).await?
            && self.surface.is_visible(&modal).await?)
    }

    /// Open the modal and wait until it is shown
    pub async fn open(&self) -> ProbeResult<()> {
        if self.is_open().await? {
            return Ok(());
        }
        let button = Locator::from_selector(self.spec.open_button.clone())
            .first()
            .one(self.surface)
            .await?;
        self.surface.click(&button).await?;
        let elapsed = wait_until(&self.options, "filter modal to open", || self.is_open()).await?;
        debug!(?elapsed, "filter modal open");
        Ok(())
    }

    /// Close the modal without submitting
    pub async fn close(&self) -> ProbeResult<()> {
        if !self.is_open().await? {
            return Ok(());
        }
        let button = self.control(&self.spec.close_button).await?;
        self.surface.click(&button).await?;
        wait_until(&self.options, "filter modal to close", || async {
            Ok(!self.is_open().await?)
        })
        .await?;
        Ok(())
    }

    /// Press the clear button
    pub async fn clear(&self) -> ProbeResult<()> {
        self.open().await?;
        let button = self.control(&self.spec.clear_button).await?;
        self.surface.click(&button).await
    }

    async fn checked<T: FormOption>(&self, option: T) -> ProbeResult<bool> {
        let control = self
            .control(&Selector::role(T::ROLE, option.label()))
            .await?;
        self.surface.is_checked(&control).await
    }

    async fn set_radio<T: FormOption>(&self, option: T) -> ProbeResult<()> {
        let control = self
            .control(&Selector::role(T::ROLE, option.label()))
            .await?;
        if !self.surface.is_checked(&control).await? {
            self.surface.click(&control).await?;
        }
        Ok(())
    }

    async fn set_membership<T: FormOption>(&self, wanted: &BTreeSet<T>) -> ProbeResult<()> {
        for option in T::options() {
            let control = self
                .control(&Selector::role(T::ROLE, option.label()))
                .await?;
            if self.surface.is_checked(&control).await? != wanted.contains(&option) {
                self.surface.click(&control).await?;
            }
        }
        Ok(())
    }

    async fn read_radio<T: FormOption>(&self) -> ProbeResult<Option<T>> {
        for option in T::options() {
            if self.checked(option).await? {
                return Ok(Some(option));
            }
        }
        Ok(None)
    }

    async fn read_membership<T: FormOption>(&self) -> ProbeResult<BTreeSet<T>> {
        let mut set = BTreeSet::new();
        for option in T::options() {
            if self.checked(option).await? {
                set.insert(option);
            }
        }
        Ok(set)
    }

    /// Current state of every axis
    pub async fn read_current(&self) -> ProbeResult<AppliedFilters> {
        let keyword = self.control(&self.spec.keyword).await?;
        Ok(AppliedFilters {
            date_sort: self.read_radio().await?.unwrap_or(DateSort::Old),
            evaluation_sort: self.read_radio().await?.unwrap_or(EvaluationSort::Low),
            respondent_types: self.read_membership().await?,
            purposes: self.read_membership().await?,
            ratings: self.read_membership().await?,
            keyword: self.surface.input_value(&keyword).await?,
        })
    }

    /// Set the provided axes, submit, and wait for the result list to reload
    pub async fn apply(&self, selection: &FilterSelection) -> ProbeResult<()> {
        info!(?selection, "applying review filters");
        self.open().await?;

        if let Some(sort) = selection.date_sort {
            self.set_radio(sort).await?;
        }
        if let Some(sort) = selection.evaluation_sort {
            self.set_radio(sort).await?;
        }
        if let Some(types) = &selection.respondent_types {
            self.set_membership(types).await?;
        }
        if let Some(purposes) = &selection.purposes {
            self.set_membership(purposes).await?;
        }
        if let Some(ratings) = &selection.ratings {
            self.set_membership(ratings).await?;
        }
        if let Some(keyword) = &selection.keyword {
            let input = self.control(&self.spec.keyword).await?;
            self.surface.fill(&input, keyword).await?;
        }

        let submit = self.control(&self.spec.submit_button).await?;
        self.surface.click(&submit).await?;

        let outcome = poll_until(&self.options, || async {
            let open = self.is_open().await?;
            let load = self.surface.load_state().await?;
            let observed = format!("modal open: {open}, load state: {load}");
            Ok(if !open && load.reached(LoadState::DomContentLoaded) {
                Observation::Satisfied(observed)
            } else {
                Observation::Pending(observed)
            })
        })
        .await?;
        debug!(
            satisfied = outcome.is_satisfied(),
            "filter submission settled"
        );

        outcome
            .or_timeout(|observed| ProbeError::FilterApplyTimeout {
                timeout_ms: self.options.timeout_ms,
                observed,
            })
            .map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::mock::{MockDom, MockElement, MockSurface, NodeId};
    use std::time::Duration;

    fn checkboxes<T: FormOption>(name: &str, checked: &[T]) -> Vec<MockElement> {
        T::options()
            .into_iter()
            .map(|o| MockElement::labeled_checkbox(name, &o.label(), checked.contains(&o)))
            .collect()
    }

    pub(crate) fn review_modal_page(submit_works: bool) -> MockSurface {
        let modal = MockElement::new("div")
            .id("modal-1")
            .class("modal")
            .child(
                MockElement::new("button")
                    .class("js-close")
                    .attr("aria-label", "close"),
            )
            .child(MockElement::labeled_radio("date", "新しい順", true))
            .child(MockElement::labeled_radio("date", "古い順", false))
            .child(MockElement::labeled_radio("evaluation", "高い順", true))
            .child(MockElement::labeled_radio("evaluation", "低い順", false))
            .children(checkboxes("respondent", &[RespondentType::Student]))
            .children(checkboxes::<Purpose>("purpose", &[]))
            .children(checkboxes::<Rating>("rating", &[]))
            .child(
                MockElement::new("input")
                    .attr("placeholder", "キーワードを入力"),
            )
            .child(MockElement::new("button").class("js-clear").text("クリア"))
            .child(
                MockElement::new("button")
                    .class("js-submit")
                    .text("検索する"),
            );
        let page = MockSurface::new(
            MockElement::new("body")
                .child(MockElement::new("button").class("js-open").text("絞り込み"))
                .child(modal),
        );
        page.show_only_with_class("#modal-1", "is-open");
        page.set_load_timing(Duration::from_millis(150), Duration::from_millis(400));

        let set_open = |open: bool| {
            move |dom: &mut MockDom, _: NodeId| -> ProbeResult<()> {
                for modal in dom.select("#modal-1")? {
                    if open {
                        dom.add_class(modal, "is-open");
                    } else {
                        dom.remove_class(modal, "is-open");
                    }
                }
                Ok(())
            }
        };
        page.on_click(".js-open", Duration::from_millis(80), set_open(true));
        page.on_click(".js-close", Duration::from_millis(80), set_open(false));
        page.on_click(".js-clear", Duration::ZERO, |dom, _| {
            for input in dom.select("#modal-1 input[type=checkbox]")? {
                dom.set_checked(input, false);
            }
            for input in dom.select("#modal-1 input[placeholder]")? {
                dom.set_value(input, "");
            }
            Ok(())
        });
        if submit_works {
            page.on_click(".js-submit", Duration::from_millis(200), |dom, _| {
                for modal in dom.select("#modal-1")? {
                    dom.remove_class(modal, "is-open");
                }
                dom.begin_reload();
                Ok(())
            });
        }
        page
    }

    mod option_tests {
        use super::*;

        #[test]
        fn test_labels() {
            assert_eq!(DateSort::New.label(), "新しい順");
            assert_eq!(EvaluationSort::Low.label(), "低い順");
            assert_eq!(Purpose::TestPrep.label(), "テスト対策");
            assert_eq!(Rating::new(4).unwrap().label(), "星4");
            assert_eq!(Purpose::options().len(), 7);
            assert_eq!(DateSort::ROLE, "radio");
        }

        #[test]
        fn test_rating_bounds() {
            assert!(Rating::new(0).is_err());
            assert!(Rating::new(6).is_err());
            assert_eq!(Rating::new(5).unwrap().stars(), 5);
            let parsed: Rating = serde_json::from_str("3").unwrap();
            assert_eq!(parsed.stars(), 3);
            assert!(serde_json::from_str::<Rating>("7").is_err());
        }
    }

    mod selection_tests {
        use super::*;

        fn applied() -> AppliedFilters {
            AppliedFilters {
                date_sort: DateSort::New,
                evaluation_sort: EvaluationSort::High,
                respondent_types: BTreeSet::from([RespondentType::Parent]),
                purposes: BTreeSet::new(),
                ratings: BTreeSet::new(),
                keyword: String::new(),
            }
        }

        #[test]
        fn test_merge_only_touches_provided_axes() {
            let selection = FilterSelection::new()
                .with_purposes([Purpose::HighSchool])
                .with_keyword("自習室");
            let merged = applied().merge(&selection);
            assert_eq!(merged.date_sort, DateSort::New);
            assert_eq!(
                merged.respondent_types,
                BTreeSet::from([RespondentType::Parent])
            );
            assert_eq!(merged.purposes, BTreeSet::from([Purpose::HighSchool]));
            assert_eq!(merged.keyword, "自習室");
        }

        #[test]
        fn test_full_selection_replaces_everything() {
            let full = FilterSelection::from(applied());
            let other = AppliedFilters {
                date_sort: DateSort::Old,
                keyword: "x".to_string(),
                ..applied()
            };
            assert_eq!(other.merge(&full), applied());
            assert!(FilterSelection::new().is_empty());
            assert!(!full.is_empty());
        }

        #[test]
        fn test_selection_serde() {
            let selection = FilterSelection::new()
                .with_date_sort(DateSort::Old)
                .with_ratings([Rating::new(5).unwrap()]);
            let json = serde_json::to_string(&selection).unwrap();
            assert!(json.contains("\"old\""));
            let back: FilterSelection = serde_json::from_str(&json).unwrap();
            assert_eq!(back, selection);
        }
    }

    mod form_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_open_and_close() {
            let page = review_modal_page(true);
            let form = FilterForm::new(&page, FilterSpec::review_modal());
            assert!(!form.is_open().await.unwrap());
            form.open().await.unwrap();
            assert!(form.is_open().await.unwrap());
            form.open().await.unwrap();
            assert_eq!(page.click_count(), 1);
            form.close().await.unwrap();
            assert!(!form.is_open().await.unwrap());
        }

        #[tokio::test(start_paused = true)]
        async fn test_apply_merges_with_current_state() {
            let page = review_modal_page(true);
            let form = FilterForm::new(&page, FilterSpec::review_modal());
            let before = form.read_current().await.unwrap();
            assert_eq!(
                before.respondent_types,
                BTreeSet::from([RespondentType::Student])
            );

            let selection = FilterSelection::new()
                .with_evaluation_sort(EvaluationSort::Low)
                .with_respondent_types([RespondentType::Parent])
                .with_purposes([Purpose::University, Purpose::HighSchool])
                .with_ratings([Rating::new(5).unwrap(), Rating::new(4).unwrap()])
                .with_keyword("丁寧");
            form.apply(&selection).await.unwrap();

            assert!(!form.is_open().await.unwrap());
            let after = form.read_current().await.unwrap();
            assert_eq!(after, before.merge(&selection));
            assert_eq!(after.date_sort, DateSort::New);
            assert!(!after.respondent_types.contains(&RespondentType::Student));
        }

        #[tokio::test(start_paused = true)]
        async fn test_apply_waits_for_dom_content_loaded() {
            let page = review_modal_page(true);
            let form = FilterForm::new(&page, FilterSpec::review_modal());
            form.apply(&FilterSelection::new()).await.unwrap();
            let load = page.load_state().await.unwrap();
            assert!(load.reached(LoadState::DomContentLoaded));
        }

        #[tokio::test(start_paused = true)]
        async fn test_apply_timeout_reports_observation() {
            let page = review_modal_page(false);
            let form = FilterForm::new(&page, FilterSpec::review_modal())
                .with_options(WaitOptions::new().with_timeout(500));
            match form.apply(&FilterSelection::new()).await.unwrap_err() {
                ProbeError::FilterApplyTimeout {
                    timeout_ms,
                    observed,
                } => {
                    assert_eq!(timeout_ms, 500);
                    assert!(observed.contains("modal open: true"), "{observed}");
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_clear_resets_checkboxes() {
            let page = review_modal_page(true);
            let form = FilterForm::new(&page, FilterSpec::review_modal());
            form.clear().await.unwrap();
            let state = form.read_current().await.unwrap();
            assert!(state.respondent_types.is_empty());
            assert_eq!(state.keyword, "");
        }
    }
}
