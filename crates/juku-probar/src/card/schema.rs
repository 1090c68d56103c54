//! Typed card schemas for the site's repeated units.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use super::{CardRecord, Extractor, FieldMap, FieldRegion, FieldSource, FieldSpec};
use crate::entity::EntityKind;
use crate::extract::PatternSpec;
use crate::locator::Selector;
use crate::result::ProbeResult;

/// Markers meaning "ask the juku for the price"
pub const INQUIRY_MARKERS: [&str; 2] = ["要問い合わせ", "お問い合わせ"];

/// A card type with a fixed selector and field map
pub trait CardSchema: Sized {
    /// Selector of one card, relative to the section scope
    fn card_selector() -> Selector;

    /// Field map; fails only on an invalid pattern
    fn field_map() -> ProbeResult<FieldMap>;

    /// Build the typed card from a record produced by [`Self::field_map`]
    fn from_record(record: &CardRecord) -> Self;

    /// Entity kind addressed by the card's link
    fn entity_kind() -> Option<EntityKind> {
        None
    }

    /// Identifier parsed from the card's link
    fn entity_id(&self) -> Option<u64> {
        None
    }
}

/// Card whose entity id equals `id`
#[must_use]
pub fn find_by_id<T: CardSchema>(cards: &[T], id: u64) -> Option<&T> {
    cards.iter().find(|c| c.entity_id() == Some(id))
}

// =============================================================================
// EXPERIENCE
// =============================================================================

/// Exam experience card (`.bjc-post-experience`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceCard {
    /// Link to the detail page
    pub href: String,
    /// Title
    pub title: String,
    /// Exam year (`受験年度：2024年度`), 0 when not shown
    pub year: i64,
    /// Starting deviation (`開始偏差値50`), 0 when not shown
    pub starting_deviation: i64,
    /// Pickup badge
    pub is_pickup: bool,
    /// Icon image source
    pub icon_src: String,
    /// Experience id
    pub id: Option<u64>,
}

impl ExperienceCard {
    /// Whether the exam year is `year`
    #[must_use]
    pub const fn is_year(&self, year: i64) -> bool {
        self.year == year
    }

    /// Whether the starting deviation lies in `range`
    #[must_use]
    pub fn deviation_in(&self, range: &RangeInclusive<i64>) -> bool {
        range.contains(&self.starting_deviation)
    }
}

impl CardSchema for ExperienceCard {
    fn card_selector() -> Selector {
        Selector::css(".bjc-post-experience")
    }

    fn field_map() -> ProbeResult<FieldMap> {
        const META: &str = ".bjc-post-experience-meta";
        Ok(FieldMap::new()
            .field(FieldSpec::href("href"))
            .field(FieldSpec::text("title", ".bjc-post-experience-title"))
            .field(FieldSpec::pattern("year", META, PatternSpec::int(r"受験年度：(\d{4})年度")?))
            .field(FieldSpec::pattern(
                "starting_deviation",
                META,
                PatternSpec::int(r"開始偏差値(\d+)")?,
            ))
            .field(FieldSpec::class_flag("is_pickup", "pickup"))
            .field(FieldSpec::attribute("icon_src", ".bjc-post-experience-icon img", "src"))
            .field(FieldSpec::entity_id("id", EntityKind::Experience)))
    }

    fn from_record(r: &CardRecord) -> Self {
        Self {
            href: r.text("href").to_string(),
            title: r.text("title").to_string(),
            year: r.int("year"),
            starting_deviation: r.int("starting_deviation"),
            is_pickup: r.flag("is_pickup"),
            icon_src: r.text("icon_src").to_string(),
            id: r.id("id"),
        }
    }

    fn entity_kind() -> Option<EntityKind> {
        Some(EntityKind::Experience)
    }

    fn entity_id(&self) -> Option<u64> {
        self.id
    }
}

// =============================================================================
// INTERVIEW
// =============================================================================

/// Passed-student interview card (`.bjc-post-interview`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewCard {
    /// Link to the interview
    pub href: String,
    /// Gender label under the icon
    pub gender: String,
    /// Icon image source
    pub icon_src: String,
    /// Pickup badge
    pub is_pickup: bool,
    /// Speech balloon text
    pub balloon: String,
    /// 進学先
    pub destination: String,
    /// 合格校
    pub passed_schools: String,
    /// メインの塾
    pub main_juku: String,
    /// 併塾
    pub concurrent_juku: String,
    /// Interview id
    pub id: Option<u64>,
}

impl InterviewCard {
    /// Whether the gender label contains `gender`
    #[must_use]
    pub fn is_gender(&self, gender: &str) -> bool {
        self.gender.contains(gender)
    }

    /// Whether `juku` is the main or a concurrent juku
    #[must_use]
    pub fn attended(&self, juku: &str) -> bool {
        self.main_juku.contains(juku) || self.concurrent_juku.contains(juku)
    }
}

fn interview_row(name: &str, needle: &str) -> FieldSpec {
    FieldSpec::labeled(
        name,
        Selector::css(".bjc-post-interview-list li"),
        Selector::css(".bjc-post-interview-list-paragraph.bold"),
        Selector::css(".bjc-post-interview-list-paragraph:not(.bold)"),
        needle,
        Extractor::Trimmed,
    )
}

impl CardSchema for InterviewCard {
    fn card_selector() -> Selector {
        Selector::css(".bjc-post-interview")
    }

    fn field_map() -> ProbeResult<FieldMap> {
        Ok(FieldMap::new()
            .field(FieldSpec::href("href"))
            .field(FieldSpec::text("gender", ".bjc-post-interview-icon span"))
            .field(FieldSpec::attribute("icon_src", ".bjc-post-interview-icon img", "src"))
            .field(FieldSpec::class_flag("is_pickup", "pickup"))
            .field(FieldSpec::text("balloon", ".bjc-post-interview-balloon"))
            .field(interview_row("destination", "進学先"))
            .field(interview_row("passed_schools", "合格校"))
            .field(interview_row("main_juku", "メインの塾"))
            .field(interview_row("concurrent_juku", "併塾"))
            .field(FieldSpec::entity_id("id", EntityKind::Interview)))
    }

    fn from_record(r: &CardRecord) -> Self {
        Self {
            href: r.text("href").to_string(),
            gender: r.text("gender").to_string(),
            icon_src: r.text("icon_src").to_string(),
            is_pickup: r.flag("is_pickup"),
            balloon: r.text("balloon").to_string(),
            destination: r.text("destination").to_string(),
            passed_schools: r.text("passed_schools").to_string(),
            main_juku: r.text("main_juku").to_string(),
            concurrent_juku: r.text("concurrent_juku").to_string(),
            id: r.id("id"),
        }
    }

    fn entity_kind() -> Option<EntityKind> {
        Some(EntityKind::Interview)
    }

    fn entity_id(&self) -> Option<u64> {
        self.id
    }
}

// =============================================================================
// COURSE
// =============================================================================

/// Course card (`.bjc-post-course`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseCard {
    /// Link to the course
    pub href: String,
    /// Title
    pub title: String,
    /// First paragraph
    pub description: String,
    /// Subjects from `《科目：…》`, without `他`
    pub subjects: Vec<String>,
    /// Icon image source
    pub icon_src: String,
    /// Course id
    pub id: Option<u64>,
}

impl CourseCard {
    /// Whether `subject` is listed
    #[must_use]
    pub fn has_subject(&self, subject: &str) -> bool {
        self.subjects.iter().any(|s| s == subject)
    }
}

impl CardSchema for CourseCard {
    fn card_selector() -> Selector {
        Selector::css(".bjc-post-course")
    }

    fn field_map() -> ProbeResult<FieldMap> {
        Ok(FieldMap::new()
            .field(FieldSpec::href("href"))
            .field(FieldSpec::text("title", ".bjc-post-course-title"))
            .field(FieldSpec::text("description", ".bjc-post-course-paragraph"))
            .field(FieldSpec::new(
                "subjects",
                FieldRegion::Within(Selector::css(".bju-line-clamp-3")),
                FieldSource::Text,
                Extractor::SubjectList,
            ))
            .field(FieldSpec::attribute("icon_src", ".bjc-post-course-icon img", "src"))
            .field(FieldSpec::entity_id("id", EntityKind::Course)))
    }

    fn from_record(r: &CardRecord) -> Self {
        Self {
            href: r.text("href").to_string(),
            title: r.text("title").to_string(),
            description: r.text("description").to_string(),
            subjects: r.list("subjects"),
            icon_src: r.text("icon_src").to_string(),
            id: r.id("id"),
        }
    }

    fn entity_kind() -> Option<EntityKind> {
        Some(EntityKind::Course)
    }

    fn entity_id(&self) -> Option<u64> {
        self.id
    }
}

// =============================================================================
// PRICE
// =============================================================================

/// Price block (`.bjc-juku-price`) with its heading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceCard {
    /// Heading above the table
    pub course_title: String,
    /// 初期費用 as rendered
    pub initial_cost: String,
    /// 月額費用 as rendered
    pub monthly_cost: String,
    /// Initial cost in yen
    pub initial_cost_amount: Option<u64>,
    /// Monthly cost in yen
    pub monthly_cost_amount: Option<u64>,
    /// Monthly cost says to ask the juku
    pub is_inquiry_required: bool,
}

fn price_row(name: &str, needle: &str, extractor: Extractor) -> FieldSpec {
    FieldSpec::labeled(
        name,
        Selector::css(".bjc-juku-price-table tr"),
        Selector::css("th"),
        Selector::css("td"),
        needle,
        extractor,
    )
}

impl CardSchema for PriceCard {
    fn card_selector() -> Selector {
        Selector::css(".bjc-juku-price")
    }

    fn field_map() -> ProbeResult<FieldMap> {
        let markers = INQUIRY_MARKERS.iter().map(ToString::to_string).collect();
        Ok(FieldMap::new()
            .field(
                FieldSpec::text("course_title", ".bjc-juku-heading-4")
                    .in_region(FieldRegion::InParent(Selector::css(".bjc-juku-heading-4"))),
            )
            .field(price_row("initial_cost", "初期費用", Extractor::Trimmed))
            .field(price_row("monthly_cost", "月額費用", Extractor::Trimmed))
            .field(price_row("initial_cost_amount", "初期費用", Extractor::Amount))
            .field(price_row("monthly_cost_amount", "月額費用", Extractor::Amount))
            .field(price_row(
                "is_inquiry_required",
                "月額費用",
                Extractor::ContainsAny(markers),
            )))
    }

    fn from_record(r: &CardRecord) -> Self {
        Self {
            course_title: r.text("course_title").to_string(),
            initial_cost: r.text("initial_cost").to_string(),
            monthly_cost: r.text("monthly_cost").to_string(),
            initial_cost_amount: r.amount("initial_cost_amount"),
            monthly_cost_amount: r.amount("monthly_cost_amount"),
            is_inquiry_required: r.flag("is_inquiry_required"),
        }
    }
}

// =============================================================================
// REVIEW
// =============================================================================

/// Review article card (`a.bjc-review-article`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewCard {
    /// Link to the review
    pub href: String,
    /// Header heading
    pub heading: String,
    /// Header title
    pub title: String,
    /// Meta line
    pub meta: String,
    /// Average rating, 0.0 when not shown
    pub rating: f64,
    /// Rating as rendered
    pub rating_text: String,
    /// Attendance period
    pub date: String,
    /// Body
    pub content: String,
}

impl ReviewCard {
    /// Whether the rating lies in `[min, max]`
    #[must_use]
    pub fn rating_between(&self, min: f64, max: f64) -> bool {
        (min..=max).contains(&self.rating)
    }
}

impl CardSchema for ReviewCard {
    fn card_selector() -> Selector {
        Selector::css("a.bjc-review-article")
    }

    fn field_map() -> ProbeResult<FieldMap> {
        const RATING: &str = ".bjc-evaluation-average_number";
        Ok(FieldMap::new()
            .field(FieldSpec::href("href"))
            .field(FieldSpec::text("heading", ".bjc-review-article--header-heading"))
            .field(FieldSpec::text("title", ".bjc-review-article--header-title"))
            .field(FieldSpec::text("meta", ".bjc-review-article--meta-txt"))
            .field(FieldSpec::pattern("rating", RATING, PatternSpec::float(r"(\d+(?:\.\d+)?)")?))
            .field(FieldSpec::text("rating_text", RATING))
            .field(FieldSpec::text("date", ".bjc-evaluation-period"))
            .field(FieldSpec::text("content", ".bjc-review-article--content")))
    }

    fn from_record(r: &CardRecord) -> Self {
        Self {
            href: r.text("href").to_string(),
            heading: r.text("heading").to_string(),
            title: r.text("title").to_string(),
            meta: r.text("meta").to_string(),
            rating: r.float("rating"),
            rating_text: r.text("rating_text").to_string(),
            date: r.text("date").to_string(),
            content: r.text("content").to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::card::CardReader;
    use crate::locator::Locator;
    use crate::mock::{MockElement, MockSurface};

    fn interview(id: u64, pickup: bool, main: &str) -> MockElement {
        let row = |label: &str, value: &str| {
            MockElement::new("li")
                .child(
                    MockElement::new("p")
                        .class("bjc-post-interview-list-paragraph bold")
                        .text(label),
                )
                .child(
                    MockElement::new("p")
                        .class("bjc-post-interview-list-paragraph")
                        .text(value),
                )
        };
        MockElement::new("a")
            .class(if pickup { "bjc-post-interview pickup" } else { "bjc-post-interview" })
            .attr("href", &format!("/passed-interview/{id}/"))
            .child(
                MockElement::new("div")
                    .class("bjc-post-interview-icon")
                    .child(MockElement::new("img").attr("src", "/img/girl.png"))
                    .child(MockElement::new("span").text("女性")),
            )
            .child(
                MockElement::new("p")
                    .class("bjc-post-interview-balloon")
                    .text(" 楽しかった "),
            )
            .child(
                MockElement::new("ul")
                    .class("bjc-post-interview-list")
                    .child(row("進学先", "開成高校"))
                    .child(row("メインの塾", main))
                    .child(row("併塾", "なし")),
            )
    }

    mod interview_tests {
        use super::*;

        #[tokio::test]
        async fn test_labeled_list_fields() {
            let page = MockSurface::new(
                MockElement::new("div")
                    .class("bjc-posts-interview")
                    .child(interview(501, true, "早稲田アカデミー"))
                    .child(interview(502, false, "SAPIX")),
            );
            let cards: Vec<InterviewCard> = CardReader::new(&page)
                .read_typed(&Locator::new(".bjc-posts-interview"))
                .await
                .unwrap();

            assert_eq!(cards.len(), 2);
            let first = &cards[0];
            assert_eq!(first.gender, "女性");
            assert_eq!(first.icon_src, "/img/girl.png");
            assert_eq!(first.balloon, "楽しかった");
            assert_eq!(first.destination, "開成高校");
            assert_eq!(first.passed_schools, "");
            assert_eq!(first.main_juku, "早稲田アカデミー");
            assert_eq!(first.concurrent_juku, "なし");
            assert!(first.is_pickup);
            assert!(first.attended("早稲田"));
            assert!(first.is_gender("女"));
            assert_eq!(
                find_by_id(&cards, 502).map(|c| c.main_juku.as_str()),
                Some("SAPIX")
            );
            assert!(find_by_id(&cards, 999).is_none());
        }
    }

    mod course_tests {
        use super::*;

        #[tokio::test]
        async fn test_subjects_and_id() {
            let page = MockSurface::new(
                MockElement::new("div").class("bjc-posts-course").child(
                    MockElement::new("a")
                        .class("bjc-post-course")
                        .attr("href", "/juku/7/course/88/")
                        .child(
                            MockElement::new("h3")
                                .class("bjc-post-course-title")
                                .text("高校受験コース"),
                        )
                        .child(
                            MockElement::new("p")
                                .class("bjc-post-course-paragraph bju-line-clamp-3")
                                .text("少人数制《科目：英語 / 数学 / 国語 / 他》"),
                        ),
                ),
            );
            let cards: Vec<CourseCard> = CardReader::new(&page)
                .read_typed(&Locator::new(".bjc-posts-course"))
                .await
                .unwrap();
            assert_eq!(cards[0].id, Some(88));
            assert_eq!(cards[0].subjects, vec!["英語", "数学", "国語"]);
            assert!(cards[0].has_subject("数学"));
            assert!(!cards[0].has_subject("他"));
            assert_eq!(cards[0].icon_src, "");
        }
    }

    mod price_tests {
        use super::*;

        fn price_section(monthly: &str) -> MockSurface {
            MockSurface::new(
                MockElement::new("div").class("bjc-juku-price-wrap").child(
                    MockElement::new("div")
                        .child(
                            MockElement::new("h4")
                                .class("bjc-juku-heading-4")
                                .text("集団授業"),
                        )
                        .child(
                            MockElement::new("div").class("bjc-juku-price").child(
                                MockElement::new("table")
                                    .class("bjc-juku-price-table")
                                    .child(
                                        MockElement::new("tr")
                                            .child(MockElement::new("th").text("初期費用"))
                                            .child(MockElement::new("td").text("11,000円")),
                                    )
                                    .child(
                                        MockElement::new("tr")
                                            .child(MockElement::new("th").text("月額費用"))
                                            .child(MockElement::new("td").text(monthly)),
                                    ),
                            ),
                        ),
                ),
            )
        }

        #[tokio::test]
        async fn test_inquiry_required_has_no_amount() {
            let page = price_section("要問い合わせ");
            let cards: Vec<PriceCard> = CardReader::new(&page)
                .read_typed(&Locator::new(".bjc-juku-price-wrap"))
                .await
                .unwrap();
            let price = &cards[0];
            assert_eq!(price.course_title, "集団授業");
            assert_eq!(price.initial_cost_amount, Some(11_000));
            assert!(price.is_inquiry_required);
            assert_eq!(price.monthly_cost_amount, None);
            assert_eq!(price.monthly_cost, "要問い合わせ");
        }

        #[tokio::test]
        async fn test_priced_month() {
            let page = price_section("25,300円（月4回）");
            let cards: Vec<PriceCard> = CardReader::new(&page)
                .read_typed(&Locator::new(".bjc-juku-price-wrap"))
                .await
                .unwrap();
            assert!(!cards[0].is_inquiry_required);
            assert_eq!(cards[0].monthly_cost_amount, Some(25_300));
        }
    }

    mod review_tests {
        use super::*;

        #[tokio::test]
        async fn test_rating_is_decimal() {
            let page = MockSurface::new(
                MockElement::new("main").child(
                    MockElement::new("a")
                        .class("bjc-review-article")
                        .attr("href", "/juku/7/review/3/")
                        .child(
                            MockElement::new("span")
                                .class("bjc-evaluation-average_number")
                                .text(" 4.2 "),
                        )
                        .child(
                            MockElement::new("p")
                                .class("bjc-review-article--content")
                                .text("丁寧"),
                        ),
                ),
            );
            let cards: Vec<ReviewCard> = CardReader::new(&page)
                .read_typed(&Locator::new("main"))
                .await
                .unwrap();
            assert!((cards[0].rating - 4.2).abs() < f64::EPSILON);
            assert_eq!(cards[0].rating_text, "4.2");
            assert!(cards[0].rating_between(4.0, 5.0));
            assert_eq!(cards[0].heading, "");
        }
    }

    #[test]
    fn test_experience_predicates() {
        let card = ExperienceCard {
            href: String::new(),
            title: String::new(),
            year: 2024,
            starting_deviation: 48,
            is_pickup: false,
            icon_src: String::new(),
            id: Some(3),
        };
        assert!(card.is_year(2024));
        assert!(card.deviation_in(&(45..=50)));
        assert!(!card.deviation_in(&(50..=60)));
        assert_eq!(card.entity_id(), Some(3));
        assert_eq!(ExperienceCard::entity_kind(), Some(EntityKind::Experience));
    }
}
