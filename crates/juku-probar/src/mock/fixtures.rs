//! Sample pages of the directory site, scripted like the live pages.
//!
//! Used by the section tests and the integration scenarios. Delays are on
//! tokio's clock, so tests should run with `start_paused = true`.

use std::time::Duration;

use super::{MockDom, MockElement, MockSurface, NodeId};
use crate::extract::{first_amount, trimmed};
use crate::result::ProbeResult;

/// Delay between a tab click and the class swap
pub const TAB_DELAY: Duration = Duration::from_millis(150);
/// Delay between a line click and the accordion opening
pub const ACCORDION_DELAY: Duration = Duration::from_millis(200);
/// Delay for the filter modal to open or close
pub const MODAL_DELAY: Duration = Duration::from_millis(100);
/// Delay between submitting the filter form and the reload
pub const SUBMIT_DELAY: Duration = Duration::from_millis(250);

/// Juku shown by [`juku_page`]
pub const JUKU_ID: u64 = 12;

/// `.bjc-post-experience` card
#[must_use]
pub fn experience_card(
    id: u64,
    title: &str,
    year: u16,
    deviation: u8,
    pickup: bool,
) -> MockElement {
    MockElement::new("a")
        .class(if pickup {
            "bjc-post-experience pickup"
        } else {
            "bjc-post-experience"
        })
        .attr("href", format!("/shingaku/experience/{id}/"))
        .child(
            MockElement::new("div")
                .class("bjc-post-experience-icon")
                .child(
                    MockElement::new("img")
                        .attr("src", format!("/img/experience/{id}.png")),
                ),
        )
        .child(
            MockElement::new("p")
                .class("bjc-post-experience-title")
                .text(title),
        )
        .child(
            MockElement::new("p")
                .class("bjc-post-experience-meta")
                .text(&format!("受験年度：{year}年度　開始偏差値{deviation}")),
        )
}

/// `.bjc-post-interview` card
#[must_use]
pub fn interview_card(id: u64, gender: &str, destination: &str, main_juku: &str) -> MockElement {
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
        .class("bjc-post-interview")
        .attr("href", format!("/passed-interview/{id}/"))
        .child(
            MockElement::new("div")
                .class("bjc-post-interview-icon")
                .child(MockElement::new("img").attr("src", "/img/student.png"))
                .child(MockElement::new("span").text(gender)),
        )
        .child(
            MockElement::new("p")
                .class("bjc-post-interview-balloon")
                .text("先生が親身でした"),
        )
        .child(
            MockElement::new("ul")
                .class("bjc-post-interview-list")
                .child(row("進学先", destination))
                .child(row("メインの塾", main_juku)),
        )
}

/// `.bjc-post-course` card of juku `juku_id`
#[must_use]
pub fn course_card(juku_id: u64, id: u64, title: &str, description: &str) -> MockElement {
    MockElement::new("a")
        .class("bjc-post-course")
        .attr("href", format!("/juku/{juku_id}/course/{id}/"))
        .child(
            MockElement::new("h3")
                .class("bjc-post-course-title")
                .text(title),
        )
        .child(
            MockElement::new("p")
                .class("bjc-post-course-paragraph bju-line-clamp-3")
                .text(description),
        )
}

/// `.bjc-juku-inner-tab-wrap` whose contents hold `posts_class` lists;
/// the first tab starts active
#[must_use]
pub fn inner_tab_wrap(
    posts_class: &str,
    view_all: &str,
    tabs: Vec<(&str, Vec<MockElement>)>,
) -> MockElement {
    let active = |base: &str, i: usize| {
        if i == 0 {
            format!("{base} is-active")
        } else {
            base.to_string()
        }
    };
    let nav = tabs.iter().enumerate().map(|(i, (label, _))| {
        MockElement::new("li")
            .class(&active("js-tab__item", i))
            .text(label)
    });
    let nav = MockElement::new("div")
        .class("bjc-juku-inner-tab-nav")
        .child(MockElement::new("ul").children(nav.collect::<Vec<_>>()));
    let contents = tabs.into_iter().enumerate().map(|(i, (_, cards))| {
        MockElement::new("div")
            .class(&active("js-tab__content", i))
            .child(MockElement::new("div").class(posts_class).children(cards))
    });
    MockElement::new("div")
        .class("bjc-juku-inner-tab-wrap")
        .child(nav)
        .child(
            MockElement::new("div")
                .class("bjc-juku-inner-tab-contents")
                .children(contents),
        )
        .child(
            MockElement::new("a")
                .class("bjc-juku-link")
                .attr("href", view_all)
                .text("もっと見る"),
        )
}

fn price_block(title: &str, initial: &str, monthly: &str) -> MockElement {
    let row = |label: &str, value: &str| {
        MockElement::new("tr")
            .child(MockElement::new("th").text(label))
            .child(MockElement::new("td").text(value))
    };
    MockElement::new("div")
        .child(
            MockElement::new("h4")
                .class("bjc-juku-heading-4")
                .text(title),
        )
        .child(
            MockElement::new("div").class("bjc-juku-price").child(
                MockElement::new("table")
                    .class("bjc-juku-price-table")
                    .child(row("初期費用", initial))
                    .child(row("月額費用", monthly)),
            ),
        )
}

fn detail_page(title: &str) -> MockElement {
    MockElement::new("body").child(MockElement::new("h1").text(title))
}

/// Juku top page at `/juku/12/`: page navigation, experience, interview
/// and course tab wraps, and a price section
#[must_use]
pub fn juku_page() -> MockSurface {
    let juku = JUKU_ID;
    let nav = MockElement::new("ul")
        .class("bjc-juku-tab")
        .child(
            MockElement::new("li")
                .class("is-active")
                .child(MockElement::new("p").text("塾トップ")),
        )
        .child(
            MockElement::new("li").child(
                MockElement::new("a")
                    .attr("href", format!("/juku/{juku}/course/"))
                    .text("コース"),
            ),
        )
        .child(
            MockElement::new("li").child(
                MockElement::new("a")
                    .attr("href", format!("/juku/{juku}/review/"))
                    .text("口コミ"),
            ),
        );

    let experiences = inner_tab_wrap(
        "bjc-posts-experience",
        "/shingaku/experience/",
        vec![
            (
                "大学受験",
                vec![
                    experience_card(101, "早稲田大学に合格", 2024, 45, true),
                    experience_card(102, "東北大学に合格", 2023, 52, false),
                ],
            ),
            (
                "高校受験",
                vec![experience_card(201, "札幌南高校に合格", 2024, 38, false)],
            ),
            ("中学受験", Vec::new()),
        ],
    );
    let interviews = inner_tab_wrap(
        "bjc-posts-interview",
        "/passed-interview/",
        vec![
            (
                "大学受験",
                vec![interview_card(501, "女性", "北海道大学", "練成会")],
            ),
            (
                "高校受験",
                vec![
                    interview_card(502, "男性", "札幌北高校", "練成会"),
                    interview_card(503, "女性", "札幌西高校", "個別指導アップル"),
                ],
            ),
        ],
    );
    let courses = inner_tab_wrap(
        "bjc-posts-course",
        &format!("/juku/{juku}/course/"),
        vec![
            (
                "高校受験",
                vec![course_card(
                    juku,
                    88,
                    "高校受験コース",
                    "少人数制《科目：英語 / 数学 / 国語 / 他》",
                )],
            ),
            (
                "中学受験",
                vec![course_card(juku, 89, "中学受験コース", "《科目：算数 / 国語》")],
            ),
        ],
    );
    let prices = MockElement::new("section")
        .class("bjc-juku-price-wrap")
        .child(price_block("集団授業", "11,000円", "25,300円（月4回）"))
        .child(price_block("個別指導", "要問い合わせ", "要問い合わせ"));

    let page = MockSurface::new(
        MockElement::new("body")
            .child(nav)
            .child(experiences)
            .child(interviews)
            .child(courses)
            .child(prices),
    );
    page.set_url(&format!("https://example.com/juku/{juku}/"));
    for id in [101, 102, 201] {
        page.route(
            &format!("/shingaku/experience/{id}/"),
            detail_page("合格体験記"),
        );
    }
    for id in [501, 502, 503] {
        page.route(
            &format!("/passed-interview/{id}/"),
            detail_page("合格者インタビュー"),
        );
    }
    for id in [88, 89] {
        page.route(
            &format!("/juku/{juku}/course/{id}/"),
            detail_page("コース詳細"),
        );
    }
    page.route(&format!("/juku/{juku}/review/"), review_document());
    page.install_tab_behavior(".js-tab__item", ".js-tab__content", "is-active", TAB_DELAY);
    page
}

/// Stations of [`station_page`], by line: `(name, count, code)`
pub const STATION_LINES: [(&str, &[(&str, u32, u32)]); 3] = [
    (
        "JR函館本線",
        &[("札幌", 1721, 1), ("桑園", 12, 2), ("琴似", 85, 3)],
    ),
    ("JR千歳線", &[("新札幌", 88, 4), ("千歳", 40, 5)]),
    (
        "札幌市営地下鉄南北線",
        &[("さっぽろ", 320, 6), ("大通", 410, 7)],
    ),
];

/// Prefecture station search page at `/hokkaido/station/`
#[must_use]
pub fn station_page() -> MockSurface {
    let header = MockElement::new("div")
        .class("bjc-search-header prefecture")
        .child(
            MockElement::new("div")
                .class("bjc-search-history-back")
                .child(
                    MockElement::new("a")
                        .attr("href", "/hokkaido/")
                        .text("戻る"),
                ),
        )
        .child(
            MockElement::new("h1")
                .class("bjc-search-header-title")
                .text(" 北海道の駅から塾を探す "),
        );

    let search_box = MockElement::new("div").class("bjc-form--box").child(
        MockElement::new("div")
            .class("bjc-select-box-main")
            .child(
                MockElement::new("input")
                    .class("bjc-station-search-box__input"),
            )
            .child(
                MockElement::new("ul")
                    .child(
                        MockElement::new("li")
                            .class("bjc-station-search-box__option")
                            .text("札幌"),
                    )
                    .child(
                        MockElement::new("li")
                            .class("bjc-station-search-box__option")
                            .text("新札幌"),
                    ),
            ),
    );

    let mut lines = MockElement::new("div").class("bjc-search-form--station-list");
    for (line, stations) in STATION_LINES {
        let links = stations.iter().map(|(name, count, code)| {
            MockElement::new("div")
                .class("bjc-form--checkbox--wrap")
                .child(
                    MockElement::new("a")
                        .class("search-form")
                        .attr("href", format!("/hokkaido/station/{code}/"))
                        .text(&format!("{name}（{count}件）")),
                )
        });
        lines = lines
            .child(
                MockElement::new("div")
                    .class("bjc-search-form--station-list-accordion-trigger")
                    .text(line),
            )
            .child(
                MockElement::new("div")
                    .class("bjc-search-form--station-list-accordion-target")
                    .children(links.collect::<Vec<_>>()),
            );
    }

    let page = MockSurface::new(
        MockElement::new("body")
            .child(header)
            .child(search_box)
            .child(lines),
    );
    page.set_url("https://example.com/hokkaido/station/");
    for (_, stations) in STATION_LINES {
        for (name, _, code) in stations {
            page.route(
                &format!("/hokkaido/station/{code}/"),
                MockElement::new("body").child(
                    MockElement::new("div")
                        .class("bjc-search-header prefecture")
                        .child(
                            MockElement::new("h1")
                                .class("bjc-search-header-title")
                                .text(&format!("{name}駅の塾")),
                        ),
                ),
            );
        }
    }
    page.install_accordion_behavior(
        ".bjc-search-form--station-list-accordion-trigger",
        ".bjc-search-form--station-list-accordion-target",
        "is-open",
        ACCORDION_DELAY,
    );
    page
}

/// Reviews of [`review_page`]: `(id, rating, respondent)`
pub const REVIEWS: [(u64, &str, &str); 4] = [
    (31, "4.5", "保護者"),
    (32, "3.0", "生徒"),
    (33, "5.0", "保護者"),
    (34, "4.0", "生徒"),
];

fn review_document() -> MockElement {
    let checkboxes = |name: &str, labels: &[&str]| -> Vec<MockElement> {
        labels
            .iter()
            .map(|l| MockElement::labeled_checkbox(name, l, false))
            .collect()
    };
    let modal = MockElement::new("div")
        .id("modal-1")
        .class("modal")
        .child(MockElement::new("h2").text("絞り込み"))
        .child(
            MockElement::new("button")
                .class("js-modal-close")
                .attr("aria-label", "close"),
        )
        .child(MockElement::labeled_radio("date_sort", "新しい順", true))
        .child(MockElement::labeled_radio("date_sort", "古い順", false))
        .child(MockElement::labeled_radio("evaluation_sort", "高い順", true))
        .child(MockElement::labeled_radio("evaluation_sort", "低い順", false))
        .children(checkboxes("respondent", &["保護者", "生徒"]))
        .children(checkboxes(
            "purpose",
            &[
                "大学受験",
                "高校受験",
                "中学受験",
                "小学校受験",
                "テスト対策",
                "中高一貫校",
                "子供英語",
            ],
        ))
        .children(checkboxes("rating", &["星5", "星4", "星3", "星2", "星1"]))
        .child(
            MockElement::new("input")
                .attr("placeholder", "キーワードを入力"),
        )
        .child(
            MockElement::new("button")
                .class("js-filter-clear")
                .text("クリア"),
        )
        .child(
            MockElement::new("button")
                .class("js-filter-submit")
                .text("検索する"),
        );

    let articles = REVIEWS.iter().map(|(id, rating, respondent)| {
        MockElement::new("a")
            .class("bjc-review-article")
            .attr("href", format!("/juku/{JUKU_ID}/review/{id}/"))
            .child(
                MockElement::new("p")
                    .class("bjc-review-article--header-heading")
                    .text(respondent),
            )
            .child(
                MockElement::new("p")
                    .class("bjc-review-article--header-title")
                    .text("通ってよかった"),
            )
            .child(
                MockElement::new("span")
                    .class("bjc-evaluation-average_number")
                    .text(rating),
            )
            .child(
                MockElement::new("span")
                    .class("bjc-evaluation-period")
                    .text("2024年4月"),
            )
            .child(
                MockElement::new("p")
                    .class("bjc-review-article--content")
                    .text("質問しやすい雰囲気"),
            )
    });

    MockElement::new("body")
        .child(
            MockElement::new("ul")
                .class("bjc-review-nav-page")
                .child(
                    MockElement::new("li")
                        .class("is-active")
                        .child(MockElement::new("p").text("すべて")),
                )
                .child(MockElement::new("li").child(
                    MockElement::new("a")
                        .attr("href", format!("/juku/{JUKU_ID}/review/?category=parent"))
                        .text("保護者"),
                )),
        )
        .child(
            MockElement::new("button")
                .class("js-filter-open")
                .text("絞り込み"),
        )
        .child(modal)
        .child(
            MockElement::new("p")
                .class("bjc-review-search_result--number")
                .text(&format!("{}件", REVIEWS.len())),
        )
        .child(
            MockElement::new("div")
                .class("bjc-juku-inner")
                .children(articles.collect::<Vec<_>>()),
        )
}

fn set_modal(dom: &mut MockDom, open: bool) -> ProbeResult<()> {
    for modal in dom.select("#modal-1")? {
        if open {
            dom.add_class(modal, "is-open");
        } else {
            dom.remove_class(modal, "is-open");
        }
    }
    Ok(())
}

/// Recount reviews against the checked star ratings, as the server would
fn submit_filters(dom: &mut MockDom, _: NodeId) -> ProbeResult<()> {
    let mut stars = Vec::new();
    for input in dom.select("#modal-1 input[name=rating]")? {
        if dom.is_checked(input) {
            stars.extend(first_amount(&dom.accessible_name(input)));
        }
    }
    let mut matching = 0;
    for rating in dom.select(".bjc-review-article .bjc-evaluation-average_number")? {
        let value = first_amount(&trimmed(&dom.text_content(rating))).unwrap_or_default();
        if stars.is_empty() || stars.contains(&value) {
            matching += 1;
        }
    }
    for count in dom.select(".bjc-review-search_result--number")? {
        dom.set_text(count, &format!("{matching}件"));
    }
    set_modal(dom, false)?;
    dom.begin_reload();
    Ok(())
}

fn clear_filters(dom: &mut MockDom, _: NodeId) -> ProbeResult<()> {
    for input in dom.select("#modal-1 input[type=checkbox]")? {
        dom.set_checked(input, false);
    }
    for input in dom.select("#modal-1 input[placeholder]")? {
        dom.set_value(input, "");
    }
    Ok(())
}

/// Juku review page at `/juku/12/review/` with the filter modal
#[must_use]
pub fn review_page() -> MockSurface {
    let page = MockSurface::new(review_document());
    page.set_url(&format!("https://example.com/juku/{JUKU_ID}/review/"));
    page.route(&format!("/juku/{JUKU_ID}/review/"), review_document());
    page.show_only_with_class("#modal-1", "is-open");
    page.set_load_timing(Duration::from_millis(100), Duration::from_millis(300));
    page.on_click(".js-filter-open", MODAL_DELAY, |dom, _| set_modal(dom, true));
    page.on_click(".js-modal-close", MODAL_DELAY, |dom, _| set_modal(dom, false));
    page.on_click(".js-filter-clear", Duration::ZERO, clear_filters);
    page.on_click(".js-filter-submit", SUBMIT_DELAY, submit_filters);
    page
}
