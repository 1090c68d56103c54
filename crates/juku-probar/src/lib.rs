//! juku-probar: UI state sync and structured extraction for directory-site E2E tests
//!
//! The site's interactive parts (inner tab sets, line accordions, the review
//! filter modal) change the DOM asynchronously after a click. This crate
//! wraps each of them in a controller that clicks, then blocks on a bounded
//! poll until the surface shows the requested state, and reads repeated
//! cards into typed records.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Section facades  (JukuPage, StationSearchPage, ReviewPage)   │
//! ├───────────────┬────────────────┬───────────────┬─────────────┤
//! │ TabController │ StationResolver│  FilterForm   │ CardReader  │
//! ├───────────────┴────────────────┴───────────────┴─────────────┤
//! │        poll_until / wait_until        extract (PatternSpec)   │
//! ├──────────────────────────────────────────────────────────────┤
//! │   UiSurface:  MockSurface (tests)  │  CdpSurface (chromium)   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use juku_probar::{experience_section, CdpSurface, JukuPage, SuiteConfig};
//!
//! let config = SuiteConfig::from_env()?;
//! let surface = CdpSurface::launch(&config).await?;
//! let page = JukuPage::open(&surface, &config, 12).await?;
//! let cards = page.experiences().switch_and_read("高校受験").await?;
//! assert!(cards.iter().all(|c| c.year >= 2020));
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

pub mod card;
pub mod config;
pub mod entity;
pub mod extract;
pub mod filter;
pub mod locator;
pub mod logging;
pub mod mock;
pub mod page_object;
pub mod result;
pub mod sections;
pub mod station;
pub mod surface;
pub mod tabs;
pub mod wait;

/// Chromium surface (requires the `browser` feature)
#[cfg(feature = "browser")]
pub mod cdp;

pub use card::{
    find_by_id, CardReader, CardRecord, CardSchema, CourseCard, ExperienceCard, Extractor,
    FieldMap, FieldRegion, FieldSource, FieldSpec, InterviewCard, PriceCard, ReviewCard,
};
#[cfg(feature = "browser")]
pub use cdp::CdpSurface;
pub use config::SuiteConfig;
pub use entity::EntityKind;
pub use extract::{extract, FieldKind, FieldValue, PatternSpec};
pub use filter::{
    AppliedFilters, DateSort, EvaluationSort, FilterForm, FilterSelection, FilterSpec, FormOption,
    Purpose, Rating, RespondentType,
};
pub use locator::{Locator, Selector};
pub use logging::{init_tracing, LogFormat};
pub use mock::{MockElement, MockSurface};
pub use page_object::{wait_for_page, wait_for_url, PageObject, UrlMatcher};
pub use result::{ProbeError, ProbeResult};
pub use sections::{
    course_section, experience_section, interview_section, JukuPage, ReviewPage,
    StationSearchPage, TabCards, TabbedCardSection,
};
pub use station::{
    AccordionGroup, AccordionSpec, MatchTier, StationDescriptor, StationMatch, StationResolver,
};
pub use surface::{ElementRef, UiSurface};
pub use tabs::{TabController, TabDescriptor, TabSpec};
pub use wait::{poll_until, wait_until, LoadState, Observation, PollOutcome, WaitOptions};
