//! Field extraction from rendered text.
//!
//! Every extractor here is total: a pattern that does not match yields the
//! declared absence value for its kind, never an error. Cards are allowed
//! to omit fields (no pickup badge, no price), and one missing field must
//! not fail the whole read.
//!
//! | Kind     | Absent          |
//! |----------|-----------------|
//! | `Int`    | `Int(0)`        |
//! | `Text`   | `Text("")`      |
//! | `Float`  | `Float(0.0)`    |
//! | `Amount` | `Amount(None)`  |

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::result::{ProbeError, ProbeResult};

/// Thousands separators stripped before numeric coercion
const SEPARATORS: [char; 2] = [',', '，'];

/// Declared type of an extracted field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Signed integer (counts, years, deviations)
    Int,
    /// Whitespace-trimmed string
    Text,
    /// Monetary amount in yen; absence is `None`, not zero
    Amount,
    /// Decimal number (ratings)
    Float,
}

impl FieldKind {
    /// Value reported when nothing matched
    #[must_use]
    pub fn absent(self) -> FieldValue {
        match self {
            Self::Int => FieldValue::Int(0),
            Self::Text => FieldValue::Text(String::new()),
            Self::Amount => FieldValue::Amount(None),
            Self::Float => FieldValue::Float(0.0),
        }
    }

    /// Coerce a captured string into this kind
    #[must_use]
    pub fn coerce(self, captured: Option<&str>) -> FieldValue {
        let Some(raw) = captured else {
            return self.absent();
        };
        match self {
            Self::Text => FieldValue::Text(trimmed(raw)),
            Self::Int => strip_separators(raw)
                .parse::<i64>()
                .map_or_else(|_| self.absent(), FieldValue::Int),
            Self::Amount => FieldValue::Amount(strip_separators(raw).parse::<u64>().ok()),
            Self::Float => strip_separators(raw)
                .parse::<f64>()
                .map_or_else(|_| self.absent(), FieldValue::Float),
        }
    }
}

/// A typed value harvested from a card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Text content
    Text(String),
    /// Integer
    Int(i64),
    /// Optional monetary amount
    Amount(Option<u64>),
    /// Decimal number
    Float(f64),
    /// Boolean derived from class or marker membership
    Flag(bool),
    /// List of strings (subjects)
    List(Vec<String>),
    /// Optional entity identifier parsed from an href
    Id(Option<u64>),
}

impl FieldValue {
    /// Text value, `""` for other variants
    #[must_use]
    pub fn as_text(&self) -> &str {
        match self {
            Self::Text(s) => s,
            _ => "",
        }
    }

    /// Integer value, `0` for other variants
    #[must_use]
    pub const fn as_int(&self) -> i64 {
        match self {
            Self::Int(n) => *n,
            _ => 0,
        }
    }

    /// Amount value, `None` for other variants
    #[must_use]
    pub const fn as_amount(&self) -> Option<u64> {
        match self {
            Self::Amount(a) => *a,
            _ => None,
        }
    }

    /// Float value, `0.0` for other variants
    #[must_use]
    pub const fn as_float(&self) -> f64 {
        match self {
            Self::Float(f) => *f,
            _ => 0.0,
        }
    }

    /// Flag value, `false` for other variants
    #[must_use]
    pub const fn as_flag(&self) -> bool {
        matches!(self, Self::Flag(true))
    }

    /// List value, empty for other variants
    #[must_use]
    pub fn as_list(&self) -> &[String] {
        match self {
            Self::List(items) => items,
            _ => &[],
        }
    }

    /// Identifier value, `None` for other variants
    #[must_use]
    pub const fn as_id(&self) -> Option<u64> {
        match self {
            Self::Id(id) => *id,
            _ => None,
        }
    }
}

/// A compiled capture pattern plus the kind its capture coerces to
#[derive(Debug, Clone)]
pub struct PatternSpec {
    regex: Regex,
    kind: FieldKind,
}

impl PatternSpec {
    /// Compile `pattern`; group 1 is the capture, or the whole match if the
    /// pattern has no groups
    pub fn new(pattern: &str, kind: FieldKind) -> ProbeResult<Self> {
        let regex = Regex::new(pattern).map_err(|e| ProbeError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { regex, kind })
    }

    /// Integer pattern
    pub fn int(pattern: &str) -> ProbeResult<Self> {
        Self::new(pattern, FieldKind::Int)
    }

    /// Text pattern
    pub fn text(pattern: &str) -> ProbeResult<Self> {
        Self::new(pattern, FieldKind::Text)
    }

    /// Amount pattern
    pub fn amount(pattern: &str) -> ProbeResult<Self> {
        Self::new(pattern, FieldKind::Amount)
    }

    /// Float pattern
    pub fn float(pattern: &str) -> ProbeResult<Self> {
        Self::new(pattern, FieldKind::Float)
    }

    /// Declared kind
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Pattern source
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl PartialEq for PatternSpec {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.regex.as_str() == other.regex.as_str()
    }
}

/// Apply `spec` to `raw`, falling back to the kind's absence value
#[must_use]
pub fn extract(raw: &str, spec: &PatternSpec) -> FieldValue {
    let grouped = spec.regex.captures_len() > 1;
    let captured = spec
        .regex
        .captures(raw)
        .and_then(|caps| if grouped { caps.get(1) } else { caps.get(0) })
        .map(|m| m.as_str());
    spec.kind.coerce(captured)
}

/// First run of digits (with separators) in `text`, as an amount
#[must_use]
pub fn first_amount(text: &str) -> Option<u64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let run: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || SEPARATORS.contains(c))
        .filter(char::is_ascii_digit)
        .collect();
    run.parse().ok()
}

/// Whether any whitespace-separated class token contains `needle`
#[must_use]
pub fn class_flag(class_attr: &str, needle: &str) -> bool {
    class_attr
        .split_whitespace()
        .any(|token| token.contains(needle))
}

/// Whether `text` contains any of `markers`
#[must_use]
pub fn contains_any<S: AsRef<str>>(text: &str, markers: &[S]) -> bool {
    markers.iter().any(|m| text.contains(m.as_ref()))
}

/// Collapse runs of whitespace and trim both ends
#[must_use]
pub fn trimmed(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a trailing `（N件）` count annotation off a label.
///
/// Returns the bare name and the count, or `None` if the label carries no
/// well-formed annotation.
fn split_count_annotation(label: &str) -> Option<(&str, u64)> {
    let label = label.trim();
    let body = label.strip_suffix("件）")?;
    let open = body.rfind('（')?;
    let digits = &body[open + '（'.len_utf8()..];
    let is_count_char = |c: char| c.is_ascii_digit() || SEPARATORS.contains(&c);
    if digits.is_empty() || !digits.chars().all(is_count_char) {
        return None;
    }
    let count = strip_separators(digits).parse().ok()?;
    Some((body[..open].trim_end(), count))
}

/// `"札幌（1721件）"` -> `"札幌"`; labels without an annotation are returned trimmed
#[must_use]
pub fn strip_count_annotation(label: &str) -> &str {
    split_count_annotation(label).map_or_else(|| label.trim(), |(name, _)| name)
}

/// `"札幌（1721件）"` -> `1721`; `0` without an annotation
#[must_use]
pub fn count_annotation(label: &str) -> u64 {
    split_count_annotation(label).map_or(0, |(_, count)| count)
}

/// Subjects from a `《科目：英語 / 数学 / 他》` block, without the trailing `他`
#[must_use]
pub fn subject_list(text: &str) -> Vec<String> {
    let Some(start) = text.find("《科目：") else {
        return Vec::new();
    };
    let rest = &text[start + "《科目：".len()..];
    let Some(end) = rest.find('》') else {
        return Vec::new();
    };
    rest[..end]
        .split(" / ")
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "他")
        .map(ToString::to_string)
        .collect()
}

fn strip_separators(raw: &str) -> String {
    raw.chars()
        .filter(|c| !SEPARATORS.contains(c) && !c.is_whitespace())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const META: &str = "受験年度：2024年度 / 開始偏差値50";

    mod pattern_tests {
        use super::*;

        #[test]
        fn test_meta_line() {
            let year = PatternSpec::int(r"受験年度：(\d{4})年度").unwrap();
            let deviation = PatternSpec::int(r"開始偏差値(\d+)").unwrap();
            assert_eq!(extract(META, &year), FieldValue::Int(2024));
            assert_eq!(extract(META, &deviation), FieldValue::Int(50));
        }

        #[test]
        fn test_absence_defaults() {
            let text = "no numbers here";
            assert_eq!(
                extract(text, &PatternSpec::int(r"(\d+)").unwrap()),
                FieldValue::Int(0)
            );
            assert_eq!(
                extract(text, &PatternSpec::text(r"科目：(\S+)").unwrap()),
                FieldValue::Text(String::new())
            );
            assert_eq!(
                extract(text, &PatternSpec::amount(r"([\d,]+)円").unwrap()),
                FieldValue::Amount(None)
            );
            assert_eq!(
                extract(text, &PatternSpec::float(r"(\d+\.\d+)").unwrap()),
                FieldValue::Float(0.0)
            );
        }

        #[test]
        fn test_separators_stripped() {
            let spec = PatternSpec::amount(r"([\d,，]+)円").unwrap();
            assert_eq!(
                extract("月額 11,000円", &spec),
                FieldValue::Amount(Some(11_000))
            );
            assert_eq!(
                extract("月額 1，200円", &spec),
                FieldValue::Amount(Some(1_200))
            );
        }

        #[test]
        fn test_whole_match_without_groups() {
            let spec = PatternSpec::int(r"\d+").unwrap();
            assert_eq!(extract("count: 42 items", &spec), FieldValue::Int(42));
        }

        #[test]
        fn test_unparticipating_group_is_absent() {
            let spec = PatternSpec::int(r"x(\d+)?y").unwrap();
            assert_eq!(extract("xy", &spec), FieldValue::Int(0));
        }

        #[test]
        fn test_overflow_is_absent() {
            let spec = PatternSpec::int(r"(\d+)").unwrap();
            assert_eq!(
                extract("99999999999999999999999", &spec),
                FieldValue::Int(0)
            );
        }

        #[test]
        fn test_invalid_pattern() {
            let err = PatternSpec::int("(unclosed").unwrap_err();
            assert!(
                matches!(err, ProbeError::InvalidPattern { pattern, .. } if pattern == "(unclosed")
            );
        }
    }

    mod helper_tests {
        use super::*;

        #[test]
        fn test_first_amount() {
            assert_eq!(first_amount("11,000円（税込）"), Some(11_000));
            assert_eq!(first_amount("要問い合わせ"), None);
            assert_eq!(first_amount(""), None);
        }

        #[test]
        fn test_flags() {
            assert!(class_flag("bjc-post-experience is-pickup", "pickup"));
            assert!(!class_flag("bjc-post-experience", "pickup"));
            let markers = ["要問い合わせ", "お問い合わせ"];
            assert!(contains_any("要問い合わせ", &markers));
            assert!(!contains_any("11,000円", &["要問い合わせ", "お問い合わせ"]));
        }

        #[test]
        fn test_count_annotation() {
            assert_eq!(strip_count_annotation("札幌（1721件）"), "札幌");
            assert_eq!(count_annotation("札幌（1721件）"), 1721);
            assert_eq!(strip_count_annotation("  札幌駅前 "), "札幌駅前");
            assert_eq!(count_annotation("札幌駅前"), 0);
            assert_eq!(count_annotation("（件）"), 0);
        }

        #[test]
        fn test_subject_list() {
            assert_eq!(
                subject_list("小学生向け《科目：英語 / 数学 / 他》の講座"),
                vec!["英語".to_string(), "数学".to_string()]
            );
            assert!(subject_list("科目なし").is_empty());
            assert!(subject_list("《科目：英語").is_empty());
        }

        #[test]
        fn test_trimmed() {
            assert_eq!(trimmed("  高校受験\n  コース "), "高校受験 コース");
        }

        #[test]
        fn test_accessors_on_other_variants() {
            let v = FieldValue::Flag(true);
            assert_eq!(v.as_text(), "");
            assert_eq!(v.as_int(), 0);
            assert_eq!(v.as_amount(), None);
            assert!(v.as_list().is_empty());
            assert!(v.as_flag());
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_no_digits_means_absent(text in "[^0-9]*") {
                let spec = PatternSpec::int(r"(\d+)").unwrap();
                prop_assert_eq!(extract(&text, &spec), FieldValue::Int(0));
            }

            #[test]
            fn prop_separated_amount_parses(n in 0u64..10_000_000) {
                let rendered = format!("{}円", group_thousands(n));
                prop_assert_eq!(first_amount(&rendered), Some(n));
            }

            #[test]
            fn prop_annotation_round_trip(name in "[ぁ-ん]{1,6}", count in 0u64..100_000) {
                let label = format!("{name}（{count}件）");
                prop_assert_eq!(strip_count_annotation(&label), name.as_str());
                prop_assert_eq!(count_annotation(&label), count);
            }

            #[test]
            fn prop_extract_never_panics(text in ".*") {
                let spec = PatternSpec::amount(r"([\d,]+)").unwrap();
                let _ = extract(&text, &spec);
            }
        }

        fn group_thousands(n: u64) -> String {
            let digits = n.to_string();
            let mut out = String::new();
            for (i, c) in digits.chars().enumerate() {
                if i > 0 && (digits.len() - i) % 3 == 0 {
                    out.push(',');
                }
                out.push(c);
            }
            out
        }
    }
}
