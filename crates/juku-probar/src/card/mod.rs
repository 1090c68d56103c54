//! Card Reader: one structured record per repeated card.
//!
//! A card is any repeated UI unit (experience entry, interview, course,
//! review, price block). A [`FieldMap`] says where each field lives inside
//! a card and how its raw string becomes a [`FieldValue`]. The reader walks
//! cards in document order and never waits; callers that read a tab's
//! content go through [`CardReader::read_active`], which refuses to read a
//! tab that is not the active one.

mod schema;

pub use schema::{
    find_by_id, CardSchema, CourseCard, ExperienceCard, InterviewCard, PriceCard, ReviewCard,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::EntityKind;
use crate::extract::{self, FieldValue, PatternSpec};
use crate::locator::{Locator, Selector};
use crate::result::ProbeResult;
use crate::surface::{ElementRef, UiSurface};
use crate::tabs::TabController;

// =============================================================================
// FIELD MAP
// =============================================================================

/// Where a field is looked up, relative to the card element
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRegion {
    /// The card element itself
    Card,
    /// First descendant of the card matching the selector
    Within(Selector),
    /// First descendant of the card's parent matching the selector
    InParent(Selector),
}

/// Which raw string of the region feeds the extractor
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSource {
    /// `textContent`
    Text,
    /// An attribute value
    Attribute(String),
    /// Value cell of the first row whose label cell contains `needle`
    LabeledRow {
        /// Row selector within the region
        row: Selector,
        /// Label cell within a row
        label: Selector,
        /// Value cell within a row
        value: Selector,
        /// Text the label must contain
        needle: String,
    },
}

/// Raw string -> typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Extractor {
    /// Text with surrounding whitespace trimmed and inner runs collapsed
    Trimmed,
    /// Capture pattern with its own kind
    Pattern(PatternSpec),
    /// First number in the text, separators stripped
    Amount,
    /// Any class token contains the needle
    ClassFlag(String),
    /// Text contains any marker
    ContainsAny(Vec<String>),
    /// `《科目：…》` subject list
    SubjectList,
    /// Entity id from an href
    EntityId(EntityKind),
}

impl Extractor {
    /// Value used when the region or attribute is missing
    #[must_use]
    pub fn absent(&self) -> FieldValue {
        match self {
            Self::Trimmed => FieldValue::Text(String::new()),
            Self::Pattern(spec) => spec.kind().absent(),
            Self::Amount => FieldValue::Amount(None),
            Self::ClassFlag(_) | Self::ContainsAny(_) => FieldValue::Flag(false),
            Self::SubjectList => FieldValue::List(Vec::new()),
            Self::EntityId(_) => FieldValue::Id(None),
        }
    }

    /// Apply to a present raw string
    #[must_use]
    pub fn apply(&self, raw: &str) -> FieldValue {
        match self {
            Self::Trimmed => FieldValue::Text(extract::trimmed(raw)),
            Self::Pattern(spec) => extract::extract(raw, spec),
            Self::Amount => FieldValue::Amount(extract::first_amount(raw)),
            Self::ClassFlag(needle) => FieldValue::Flag(extract::class_flag(raw, needle)),
            Self::ContainsAny(markers) => FieldValue::Flag(extract::contains_any(raw, markers)),
            Self::SubjectList => FieldValue::List(extract::subject_list(raw)),
            Self::EntityId(kind) => FieldValue::Id(kind.extract_id(raw)),
        }
    }
}

/// One named field of a card
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Field name in the record
    pub name: String,
    /// Region lookup
    pub region: FieldRegion,
    /// Raw string source
    pub source: FieldSource,
    /// Coercion
    pub extractor: Extractor,
}

impl FieldSpec {
    /// Create a field spec
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        region: FieldRegion,
        source: FieldSource,
        extractor: Extractor,
    ) -> Self {
        Self {
            name: name.into(),
            region,
            source,
            extractor,
        }
    }

    /// Trimmed text of a sub-element
    #[must_use]
    pub fn text(name: impl Into<String>, css: &str) -> Self {
        Self::new(
            name,
            FieldRegion::Within(Selector::css(css)),
            FieldSource::Text,
            Extractor::Trimmed,
        )
    }

    /// Pattern over the text of a sub-element
    #[must_use]
    pub fn pattern(name: impl Into<String>, css: &str, pattern: PatternSpec) -> Self {
        Self::new(
            name,
            FieldRegion::Within(Selector::css(css)),
            FieldSource::Text,
            Extractor::Pattern(pattern),
        )
    }

    /// Attribute of a sub-element, trimmed
    #[must_use]
    pub fn attribute(name: impl Into<String>, css: &str, attr: &str) -> Self {
        Self::new(
            name,
            FieldRegion::Within(Selector::css(css)),
            FieldSource::Attribute(attr.to_string()),
            Extractor::Trimmed,
        )
    }

    /// The card's own `href`
    #[must_use]
    pub fn href(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldRegion::Card,
            FieldSource::Attribute("href".to_string()),
            Extractor::Trimmed,
        )
    }

    /// Entity id parsed from the card's own `href`
    #[must_use]
    pub fn entity_id(name: impl Into<String>, kind: EntityKind) -> Self {
        Self::new(
            name,
            FieldRegion::Card,
            FieldSource::Attribute("href".to_string()),
            Extractor::EntityId(kind),
        )
    }

    /// Flag set when a class token of the card contains `needle`
    #[must_use]
    pub fn class_flag(name: impl Into<String>, needle: &str) -> Self {
        Self::new(
            name,
            FieldRegion::Card,
            FieldSource::Attribute("class".to_string()),
            Extractor::ClassFlag(needle.to_string()),
        )
    }

    /// Labeled row (`<th>/<td>`, bold label lists) inside the card
    #[must_use]
    pub fn labeled(
        name: impl Into<String>,
        row: Selector,
        label: Selector,
        value: Selector,
        needle: &str,
        extractor: Extractor,
    ) -> Self {
        Self::new(
            name,
            FieldRegion::Card,
            FieldSource::LabeledRow {
                row,
                label,
                value,
                needle: needle.to_string(),
            },
            extractor,
        )
    }

    /// Replace the region
    #[must_use]
    pub fn in_region(mut self, region: FieldRegion) -> Self {
        self.region = region;
        self
    }

    /// Replace the extractor
    #[must_use]
    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }
}

/// Ordered table of field specs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    specs: Vec<FieldSpec>,
}

impl FieldMap {
    /// Empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field
    #[must_use]
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Fields in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> {
        self.specs.iter()
    }

    /// Number of fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the map has no fields
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

// =============================================================================
// CARD RECORD
// =============================================================================

/// Named field values of one card, in field-map order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    /// `(name, value)` pairs
    pub fields: Vec<(String, FieldValue)>,
}

impl CardRecord {
    /// Value of `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }

    /// Text field, `""` when absent
    #[must_use]
    pub fn text(&self, name: &str) -> &str {
        self.get(name).map_or("", FieldValue::as_text)
    }

    /// Integer field, `0` when absent
    #[must_use]
    pub fn int(&self, name: &str) -> i64 {
        self.get(name).map_or(0, FieldValue::as_int)
    }

    /// Amount field
    #[must_use]
    pub fn amount(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(FieldValue::as_amount)
    }

    /// Float field, `0.0` when absent
    #[must_use]
    pub fn float(&self, name: &str) -> f64 {
        self.get(name).map_or(0.0, FieldValue::as_float)
    }

    /// Flag field, `false` when absent
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).is_some_and(FieldValue::as_flag)
    }

    /// List field
    #[must_use]
    pub fn list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(FieldValue::as_list)
            .unwrap_or_default()
            .to_vec()
    }

    /// Identifier field
    #[must_use]
    pub fn id(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(FieldValue::as_id)
    }
}

// =============================================================================
// READER
// =============================================================================

/// Reads cards from a surface
#[derive(Debug, Clone, Copy)]
pub struct CardReader<'a> {
    surface: &'a dyn UiSurface,
}

impl<'a> CardReader<'a> {
    /// Create a reader over `surface`
    #[must_use]
    pub fn new(surface: &'a dyn UiSurface) -> Self {
        Self { surface }
    }

    /// Every card under `scope` matching `card`, in document order.
    ///
    /// An empty or missing container yields an empty vector.
    pub async fn read_all(
        &self,
        scope: &Locator,
        card: &Selector,
        fields: &FieldMap,
    ) -> ProbeResult<Vec<CardRecord>> {
        let cards = scope.clone().locator(card.clone()).all(self.surface).await?;
        let mut records = Vec::with_capacity(cards.len());
        for el in &cards {
            records.push(self.read_card(el, fields).await?);
        }
        debug!(scope = %scope, card = %card, count = records.len(), "read cards");
        Ok(records)
    }

    /// Apply `fields` to one card element
    pub async fn read_card(&self, card: &ElementRef, fields: &FieldMap) -> ProbeResult<CardRecord> {
        let mut record = CardRecord::default();
        for spec in fields.iter() {
            let value = self.read_field(card, spec).await?;
            record.fields.push((spec.name.clone(), value));
        }
        Ok(record)
    }

    /// Typed cards of schema `T` under `scope`
    pub async fn read_typed<T: CardSchema>(&self, scope: &Locator) -> ProbeResult<Vec<T>> {
        let fields = T::field_map()?;
        let records = self.read_all(scope, &T::card_selector(), &fields).await?;
        Ok(records.iter().map(T::from_record).collect())
    }

    /// Cards inside the content region of the active tab `label`.
    ///
    /// Fails with `PreconditionViolated` if `label` is not the active tab;
    /// activate it first.
    pub async fn read_active(
        &self,
        tabs: &TabController<'_>,
        label: &str,
        card: &Selector,
        fields: &FieldMap,
    ) -> ProbeResult<Vec<CardRecord>> {
        let scope = tabs.active_scope(label).await?;
        self.read_all(&scope, card, fields).await
    }

    /// Typed variant of [`CardReader::read_active`]
    pub async fn read_active_typed<T: CardSchema>(
        &self,
        tabs: &TabController<'_>,
        label: &str,
    ) -> ProbeResult<Vec<T>> {
        let scope = tabs.active_scope(label).await?;
        self.read_typed(&scope).await
    }

    async fn read_field(&self, card: &ElementRef, spec: &FieldSpec) -> ProbeResult<FieldValue> {
        let Some(region) = self.resolve_region(card, &spec.region).await? else {
            return Ok(spec.extractor.absent());
        };

        let raw = match &spec.source {
            FieldSource::Text => Some(self.surface.text_content(&region).await?),
            FieldSource::Attribute(name) => self.surface.attribute(&region, name).await?,
            FieldSource::LabeledRow {
                row,
                label,
                value,
                needle,
            } => self.row_value(&region, row, label, value, needle).await?,
        };

        Ok(match raw {
            Some(raw) => spec.extractor.apply(&raw),
            None => spec.extractor.absent(),
        })
    }

    async fn resolve_region(
        &self,
        card: &ElementRef,
        region: &FieldRegion,
    ) -> ProbeResult<Option<ElementRef>> {
        match region {
            FieldRegion::Card => Ok(Some(card.clone())),
            FieldRegion::Within(selector) => Ok(self
                .surface
                .query_all(Some(card), selector)
                .await?
                .into_iter()
                .next()),
            FieldRegion::InParent(selector) => {
                let Some(parent) = self.surface.parent(card).await? else {
                    return Ok(None);
                };
                Ok(self
                    .surface
                    .query_all(Some(&parent), selector)
                    .await?
                    .into_iter()
                    .next())
            }
        }
    }

    async fn row_value(
        &self,
        region: &ElementRef,
        row: &Selector,
        label: &Selector,
        value: &Selector,
        needle: &str,
    ) -> ProbeResult<Option<String>> {
        for row_el in self.surface.query_all(Some(region), row).await? {
            let Some(label_el) = self.first_in(&row_el, label).await? else {
                continue;
            };
            let label_text = self.surface.text_content(&label_el).await?;
            if !label_text.contains(needle) {
                continue;
            }
            return match self.first_in(&row_el, value).await? {
                Some(value_el) => {
                    let text = self.surface.text_content(&value_el).await?;
                    Ok(Some(text.trim().to_string()))
                }
                None => Ok(None),
            };
        }
        Ok(None)
    }

    async fn first_in(
        &self,
        scope: &ElementRef,
        selector: &Selector,
    ) -> ProbeResult<Option<ElementRef>> {
        Ok(self
            .surface
            .query_all(Some(scope), selector)
            .await?
            .into_iter()
            .next())
    }
}
