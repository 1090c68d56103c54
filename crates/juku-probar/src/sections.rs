//! Page and section facades.
//!
//! Facades compose the controllers for one page of the site. They own no
//! state beyond their locators: every call re-reads the surface.

use std::marker::PhantomData;

use serde::Serialize;
use tracing::{debug, info};

use crate::card::{
    CardReader, CardSchema, CourseCard, ExperienceCard, InterviewCard, PriceCard, ReviewCard,
};
use crate::config::SuiteConfig;
use crate::entity::EntityKind;
use crate::extract::{extract, trimmed, PatternSpec};
use crate::filter::{AppliedFilters, FilterForm, FilterSelection, FilterSpec};
use crate::locator::{Locator, Selector};
use crate::page_object::{wait_for_url, PageObject, UrlMatcher};
use crate::result::{ProbeError, ProbeResult};
use crate::station::{AccordionSpec, StationMatch, StationResolver};
use crate::surface::UiSurface;
use crate::tabs::{TabController, TabSpec, ACTIVE_CLASS};
use crate::wait::{wait_until, LoadState, WaitOptions};

/// Cards read from one tab
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabCards<T> {
    /// Tab label
    pub label: String,
    /// Cards in document order
    pub cards: Vec<T>,
}

// =============================================================================
// TABBED CARD SECTIONS
// =============================================================================

/// A tab wrap whose content regions hold cards of schema `T`
#[derive(Debug, Clone)]
pub struct TabbedCardSection<'a, T> {
    surface: &'a dyn UiSurface,
    container: Locator,
    tabs: TabController<'a>,
    options: WaitOptions,
    schema: PhantomData<fn() -> T>,
}

impl<'a, T: CardSchema> TabbedCardSection<'a, T> {
    /// Section over the inner tab wrap `container`
    #[must_use]
    pub fn new(surface: &'a dyn UiSurface, container: Locator) -> Self {
        Self {
            surface,
            tabs: TabController::new(surface, TabSpec::juku_inner(container.clone())),
            container,
            options: WaitOptions::default(),
            schema: PhantomData,
        }
    }

    /// Set wait options for tab switches and card navigation
    #[must_use]
    pub fn with_options(mut self, options: WaitOptions) -> Self {
        self.tabs = self.tabs.with_options(options.clone());
        self.options = options;
        self
    }

    /// The section's tab controller
    #[must_use]
    pub const fn tabs(&self) -> &TabController<'a> {
        &self.tabs
    }

    /// Whether the section is rendered
    pub async fn is_visible(&self) -> ProbeResult<bool> {
        self.container.is_visible(self.surface).await
    }

    /// Tab labels in display order
    pub async fn tab_labels(&self) -> ProbeResult<Vec<String>> {
        self.tabs.list_labels().await
    }

    /// Label of the active tab
    pub async fn active_tab(&self) -> ProbeResult<Option<String>> {
        self.tabs.active_label().await
    }

    /// Cards of whichever tab is active
    pub async fn cards(&self) -> ProbeResult<Vec<T>> {
        CardReader::new(self.surface)
            .read_typed(&self.tabs.active_content()?)
            .await
    }

    /// Activate `label` and read its cards
    pub async fn switch_and_read(&self, label: &str) -> ProbeResult<Vec<T>> {
        self.tabs.activate(label).await?;
        CardReader::new(self.surface)
            .read_active_typed(&self.tabs, label)
            .await
    }

    /// Activate every tab in turn and read its cards
    pub async fn read_every_tab(&self) -> ProbeResult<Vec<TabCards<T>>> {
        let mut out = Vec::new();
        for label in self.tab_labels().await? {
            let cards = self.switch_and_read(&label).await?;
            debug!(tab = %label, count = cards.len(), "read tab");
            out.push(TabCards { label, cards });
        }
        Ok(out)
    }

    /// Click the card of the active tab whose entity id is `id` and wait for
    /// its detail page; returns the landing URL
    pub async fn click_card(&self, id: u64) -> ProbeResult<String> {
        let kind = T::entity_kind()
            .ok_or_else(|| ProbeError::precondition("cards of this section carry no entity id"))?;
        let scope = self.tabs.active_content()?;
        let cards: Vec<T> = CardReader::new(self.surface).read_typed(&scope).await?;
        let index = cards
            .iter()
            .position(|c| c.entity_id() == Some(id))
            .ok_or_else(|| ProbeError::ElementNotFound {
                selector: format!("{scope} >> {} >> {kind} {id}", T::card_selector()),
            })?;

        let card = scope
            .locator(T::card_selector())
            .nth(index)
            .one(self.surface)
            .await?;
        self.surface.click(&card).await?;

        let matcher = UrlMatcher::for_entity(kind);
        let landed = wait_for_url(self.surface, &matcher, &self.options).await?;
        let url = self.surface.current_url().await?;
        if landed.get("id").and_then(|v| v.parse::<u64>().ok()) != Some(id) {
            return Err(ProbeError::Navigation {
                url,
                message: format!("expected the page of {kind} {id}"),
            });
        }
        Ok(url)
    }

    /// `href` of the section's "view all" link
    pub async fn view_all_href(&self) -> ProbeResult<Option<String>> {
        let link = self
            .container
            .clone()
            .css(".bjc-juku-link")
            .first_match(self.surface)
            .await?;
        match link {
            Some(link) => self.surface.attribute(&link, "href").await,
            None => Ok(None),
        }
    }
}

fn inner_wrap(posts: &str) -> Locator {
    Locator::new(".bjc-juku-inner-tab-wrap")
        .has(Selector::css(posts))
        .first()
}

/// Exam experiences of a juku page, by exam type
#[must_use]
pub fn experience_section(surface: &dyn UiSurface) -> TabbedCardSection<'_, ExperienceCard> {
    TabbedCardSection::new(surface, inner_wrap(".bjc-posts-experience"))
}

/// Passed-student interviews of a juku page, by exam type
#[must_use]
pub fn interview_section(surface: &dyn UiSurface) -> TabbedCardSection<'_, InterviewCard> {
    TabbedCardSection::new(surface, inner_wrap(".bjc-posts-interview"))
}

/// Courses of a juku page, by exam type
#[must_use]
pub fn course_section(surface: &dyn UiSurface) -> TabbedCardSection<'_, CourseCard> {
    TabbedCardSection::new(surface, inner_wrap(".bjc-posts-course"))
}

// =============================================================================
// JUKU PAGE
// =============================================================================

/// Juku top page
#[derive(Debug, Clone)]
pub struct JukuPage<'a> {
    surface: &'a dyn UiSurface,
    options: WaitOptions,
}

impl PageObject for JukuPage<'_> {
    fn url_pattern(&self) -> &str {
        "/juku/:id/"
    }

    fn load_timeout_ms(&self) -> u64 {
        self.options.timeout_ms
    }
}

impl<'a> JukuPage<'a> {
    /// Facade over the page currently shown by `surface`
    #[must_use]
    pub fn new(surface: &'a dyn UiSurface, options: WaitOptions) -> Self {
        Self { surface, options }
    }

    /// Navigate to juku `id` and wait for the page
    pub async fn open(
        surface: &'a dyn UiSurface,
        config: &SuiteConfig,
        id: u64,
    ) -> ProbeResult<Self> {
        let page = Self::new(surface, config.wait_options());
        let url = config.full_url(&EntityKind::Juku.detail_path(id, None)?);
        info!(%url, "opening juku page");
        surface.goto(&url).await?;
        wait_for_url(surface, &page.matcher(), &page.options).await?;
        Ok(page)
    }

    /// Page navigation tabs (top, courses, reviews, ...)
    #[must_use]
    pub fn nav(&self) -> TabController<'a> {
        TabController::new(self.surface, TabSpec::juku_page_nav())
            .with_options(self.options.clone())
    }

    /// Follow the navigation tab `label`; returns the landing URL.
    ///
    /// The current page's tab is not a link, so following it is a no-op.
    pub async fn follow_nav(&self, label: &str) -> ProbeResult<String> {
        let nav = self.nav();
        let Some(href) = nav.tab_link(label).await? else {
            return self.surface.current_url().await;
        };
        let link = Locator::new(".bjc-juku-tab")
            .css("li")
            .with_text(label)
            .locator(Selector::any_role("link"))
            .one(self.surface)
            .await?;
        self.surface.click(&link).await?;
        wait_for_url(self.surface, &UrlMatcher::new(&href), &self.options).await?;
        self.surface.current_url().await
    }

    /// Experience section
    #[must_use]
    pub fn experiences(&self) -> TabbedCardSection<'a, ExperienceCard> {
        experience_section(self.surface).with_options(self.options.clone())
    }

    /// Interview section
    #[must_use]
    pub fn interviews(&self) -> TabbedCardSection<'a, InterviewCard> {
        interview_section(self.surface).with_options(self.options.clone())
    }

    /// Course section
    #[must_use]
    pub fn courses(&self) -> TabbedCardSection<'a, CourseCard> {
        course_section(self.surface).with_options(self.options.clone())
    }

    /// Price blocks
    pub async fn prices(&self) -> ProbeResult<Vec<PriceCard>> {
        CardReader::new(self.surface)
            .read_typed(&Locator::new(".bjc-juku-price-wrap"))
            .await
    }
}

// =============================================================================
// STATION SEARCH PAGE
// =============================================================================

/// Prefecture station search page
#[derive(Debug, Clone)]
pub struct StationSearchPage<'a> {
    surface: &'a dyn UiSurface,
    resolver: StationResolver<'a>,
    options: WaitOptions,
}

impl PageObject for StationSearchPage<'_> {
    fn url_pattern(&self) -> &str {
        "/*/station/"
    }

    fn load_timeout_ms(&self) -> u64 {
        self.options.timeout_ms
    }
}

impl<'a> StationSearchPage<'a> {
    /// Facade over the page currently shown by `surface`
    #[must_use]
    pub fn new(surface: &'a dyn UiSurface, options: WaitOptions) -> Self {
        Self {
            surface,
            resolver: StationResolver::new(surface, AccordionSpec::station_lines())
                .with_options(options.clone()),
            options,
        }
    }

    /// Navigate to the station search of `prefecture` (e.g. `hokkaido`)
    pub async fn open(
        surface: &'a dyn UiSurface,
        config: &SuiteConfig,
        prefecture: &str,
    ) -> ProbeResult<Self> {
        let page = Self::new(surface, config.wait_options());
        let url = config.full_url(&format!("/{prefecture}/station/"));
        info!(%url, "opening station search");
        surface.goto(&url).await?;
        wait_for_url(surface, &page.matcher(), &page.options).await?;
        Ok(page)
    }

    fn header(&self) -> Locator {
        Locator::new(".bjc-search-header.prefecture")
    }

    /// Header title
    pub async fn title(&self) -> ProbeResult<String> {
        let title = self
            .header()
            .css(".bjc-search-header-title")
            .text(self.surface)
            .await?;
        Ok(trimmed(&title))
    }

    /// `href` of the back link
    pub async fn back_link_href(&self) -> ProbeResult<Option<String>> {
        match self
            .header()
            .css(".bjc-search-history-back a")
            .first_match(self.surface)
            .await?
        {
            Some(link) => self.surface.attribute(&link, "href").await,
            None => Ok(None),
        }
    }

    /// Line accordions
    #[must_use]
    pub const fn resolver(&self) -> &StationResolver<'a> {
        &self.resolver
    }

    /// Type into the station search box
    pub async fn search_station(&self, name: &str) -> ProbeResult<()> {
        let input = Locator::new(".bjc-form--box .bjc-select-box-main")
            .css(".bjc-station-search-box__input")
            .one(self.surface)
            .await?;
        self.surface.fill(&input, name).await
    }

    /// Suggestions offered by the station search box
    pub async fn station_options(&self) -> ProbeResult<Vec<String>> {
        let mut out = Vec::new();
        let options = Locator::new(".bjc-station-search-box__option")
            .all(self.surface)
            .await?;
        for option in options {
            let text = trimmed(&self.surface.text_content(&option).await?);
            if !text.is_empty() {
                out.push(text);
            }
        }
        Ok(out)
    }

    /// Expand `line`, pick `station` among the expanded lines, and wait for
    /// the station's result page
    pub async fn select_line_station(
        &self,
        line: &str,
        station: &str,
    ) -> ProbeResult<StationMatch> {
        let before = self.surface.current_url().await?;
        self.resolver.expand(line).await?;
        let found = self.resolver.select_station(station).await?;
        let waited_for = format!("results of station '{}'", found.station.label);
        wait_until(&self.options, &waited_for, || async {
            let load = self.surface.load_state().await?;
            Ok(self.surface.current_url().await? != before
                && load.reached(LoadState::DomContentLoaded))
        })
        .await?;
        info!(line, station = %found.station.label, tier = ?found.tier, "station selected");
        Ok(found)
    }
}

// =============================================================================
// REVIEW PAGE
// =============================================================================

/// Juku review list with its filter modal
#[derive(Debug, Clone)]
pub struct ReviewPage<'a> {
    surface: &'a dyn UiSurface,
    filter: FilterForm<'a>,
    options: WaitOptions,
}

impl PageObject for ReviewPage<'_> {
    fn url_pattern(&self) -> &str {
        "/juku/:id/review/"
    }

    fn load_timeout_ms(&self) -> u64 {
        self.options.timeout_ms
    }
}

impl<'a> ReviewPage<'a> {
    /// Facade over the page currently shown by `surface`
    #[must_use]
    pub fn new(surface: &'a dyn UiSurface, options: WaitOptions) -> Self {
        Self {
            surface,
            filter: FilterForm::new(surface, FilterSpec::review_modal())
                .with_options(options.clone()),
            options,
        }
    }

    /// Navigate to the reviews of juku `id`
    pub async fn open(
        surface: &'a dyn UiSurface,
        config: &SuiteConfig,
        id: u64,
    ) -> ProbeResult<Self> {
        let page = Self::new(surface, config.wait_options());
        let juku_path = EntityKind::Juku.detail_path(id, None)?;
        let url = config.full_url(&format!("{juku_path}review/"));
        info!(%url, "opening review page");
        surface.goto(&url).await?;
        wait_for_url(surface, &page.matcher(), &page.options).await?;
        Ok(page)
    }

    /// The filter modal
    #[must_use]
    pub const fn filter(&self) -> &FilterForm<'a> {
        &self.filter
    }

    /// Review category tabs; categories are separate pages
    #[must_use]
    pub fn categories(&self) -> TabController<'a> {
        TabController::new(
            self.surface,
            TabSpec {
                triggers: Locator::new("ul.bjc-review-nav-page").css("li"),
                contents: None,
                active_class: ACTIVE_CLASS.to_string(),
                click_target: Some(Selector::any_role("link")),
            },
        )
        .with_options(self.options.clone())
    }

    /// Review cards in document order
    pub async fn reviews(&self) -> ProbeResult<Vec<ReviewCard>> {
        CardReader::new(self.surface)
            .read_typed(&Locator::new("body"))
            .await
    }

    /// Result count shown above the list; 0 when absent
    pub async fn review_count(&self) -> ProbeResult<i64> {
        let text = Locator::new(".bjc-review-search_result--number")
            .text(self.surface)
            .await?;
        Ok(extract(&text, &PatternSpec::int(r"([\d,]+)")?).as_int())
    }

    /// Apply `selection` and return the filter state read back afterwards
    pub async fn apply_filters(&self, selection: &FilterSelection) -> ProbeResult<AppliedFilters> {
        self.filter.apply(selection).await?;
        self.filter.read_current().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::filter::Rating;
    use crate::mock::{fixtures, MockElement};

    mod tabbed_section_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_switch_and_read() {
            let page = fixtures::juku_page();
            let section = experience_section(&page);
            assert!(section.is_visible().await.unwrap());
            assert_eq!(
                section.tab_labels().await.unwrap(),
                vec!["大学受験", "高校受験", "中学受験"]
            );
            assert_eq!(section.cards().await.unwrap().len(), 2);

            let cards = section.switch_and_read("高校受験").await.unwrap();
            assert_eq!(cards.len(), 1);
            assert_eq!(cards[0].id, Some(201));
            assert_eq!(cards[0].year, 2024);
            assert_eq!(cards[0].starting_deviation, 38);
            assert_eq!(
                section.active_tab().await.unwrap().as_deref(),
                Some("高校受験")
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_read_every_tab() {
            let page = fixtures::juku_page();
            let tabs = interview_section(&page).read_every_tab().await.unwrap();
            let counts: Vec<(&str, usize)> = tabs
                .iter()
                .map(|t| (t.label.as_str(), t.cards.len()))
                .collect();
            assert_eq!(counts, vec![("大学受験", 1), ("高校受験", 2)]);
            assert_eq!(tabs[1].cards[1].main_juku, "個別指導アップル");
        }

        #[tokio::test(start_paused = true)]
        async fn test_sections_are_independent() {
            let page = fixtures::juku_page();
            let courses = course_section(&page);
            courses.switch_and_read("中学受験").await.unwrap();
            let experiences = experience_section(&page);
            assert_eq!(
                experiences.active_tab().await.unwrap().as_deref(),
                Some("大学受験")
            );
            assert_eq!(
                courses.view_all_href().await.unwrap().as_deref(),
                Some("/juku/12/course/")
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_click_card_by_id() {
            let page = fixtures::juku_page();
            let section = course_section(&page);
            let url = section.click_card(88).await.unwrap();
            assert_eq!(url, "https://example.com/juku/12/course/88/");
        }

        #[tokio::test(start_paused = true)]
        async fn test_click_missing_card() {
            let page = fixtures::juku_page();
            let err = experience_section(&page).click_card(201).await.unwrap_err();
            assert!(matches!(err, ProbeError::ElementNotFound { .. }));
        }
    }

    mod juku_page_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_prices_and_nav() {
            let page = fixtures::juku_page();
            let juku = JukuPage::new(&page, WaitOptions::default());
            let prices = juku.prices().await.unwrap();
            assert_eq!(prices.len(), 2);
            assert_eq!(prices[0].monthly_cost_amount, Some(25_300));
            assert!(prices[1].is_inquiry_required);

            assert_eq!(
                juku.nav().active_label().await.unwrap().as_deref(),
                Some("塾トップ")
            );
            assert_eq!(
                juku.follow_nav("塾トップ").await.unwrap(),
                "https://example.com/juku/12/"
            );
            let url = juku.follow_nav("口コミ").await.unwrap();
            assert_eq!(url, "https://example.com/juku/12/review/");
        }

        #[tokio::test(start_paused = true)]
        async fn test_open() {
            let page = fixtures::juku_page();
            page.route("/juku/12/", MockElement::new("body"));
            let config = SuiteConfig::default();
            let juku = JukuPage::open(&page, &config, fixtures::JUKU_ID)
                .await
                .unwrap();
            assert!(juku.matcher().matches(&page.current_url().await.unwrap()));
        }
    }

    mod station_page_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_header_and_search_box() {
            let page = fixtures::station_page();
            let search = StationSearchPage::new(&page, WaitOptions::default());
            assert_eq!(search.title().await.unwrap(), "北海道の駅から塾を探す");
            assert_eq!(
                search.back_link_href().await.unwrap().as_deref(),
                Some("/hokkaido/")
            );
            search.search_station("札幌").await.unwrap();
            assert_eq!(
                search.station_options().await.unwrap(),
                vec!["札幌", "新札幌"]
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_line_selection_flow() {
            let page = fixtures::station_page();
            let search = StationSearchPage::new(&page, WaitOptions::default());
            let found = search
                .select_line_station("JR千歳線", "千歳")
                .await
                .unwrap();
            assert_eq!(found.station.result_count, 40);
            assert_eq!(
                page.current_url().await.unwrap(),
                "https://example.com/hokkaido/station/5/"
            );
            assert_eq!(search.title().await.unwrap(), "千歳駅の塾");
        }
    }

    mod review_page_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_count_and_cards() {
            let page = fixtures::review_page();
            let reviews = ReviewPage::new(&page, WaitOptions::default());
            assert_eq!(reviews.review_count().await.unwrap(), 4);
            let cards = reviews.reviews().await.unwrap();
            assert_eq!(cards.len(), 4);
            assert!(cards[2].rating_between(5.0, 5.0));
            let categories = reviews.categories();
            assert_eq!(
                categories.active_label().await.unwrap().as_deref(),
                Some("すべて")
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_apply_filters_updates_count() {
            let page = fixtures::review_page();
            let reviews = ReviewPage::new(&page, WaitOptions::default());
            let selection = FilterSelection::new()
                .with_ratings([Rating::new(4).unwrap(), Rating::new(5).unwrap()]);
            let applied = reviews.apply_filters(&selection).await.unwrap();
            assert_eq!(applied.ratings.len(), 2);
            assert_eq!(reviews.review_count().await.unwrap(), 3);
        }
    }
}
