//! Entity identifiers and their URL shapes.
//!
//! Each entity kind owns exactly one path template. The same template is
//! used to pull an id out of a card's `href` and to build the path a test
//! navigates to, so extraction and navigation cannot drift apart.

use serde::{Deserialize, Serialize};

use crate::result::{ProbeError, ProbeResult};

/// Kinds of addressable entity on the site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Exam experience write-up
    Experience,
    /// Passed-student interview
    Interview,
    /// Course of a juku
    Course,
    /// Classroom of a juku
    Classroom,
    /// Juku (tutoring school)
    Juku,
}

impl EntityKind {
    /// Id template, with `:id` marking the identifier segment
    #[must_use]
    pub const fn template(self) -> &'static str {
        match self {
            Self::Experience => "/shingaku/experience/:id/",
            Self::Interview => "/passed-interview/:id/",
            Self::Course => "/course/:id/",
            Self::Classroom => "/class/:id/",
            Self::Juku => "/juku/:id/",
        }
    }

    /// Kind whose path prefixes this one's
    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::Course | Self::Classroom => Some(Self::Juku),
            Self::Experience | Self::Interview | Self::Juku => None,
        }
    }

    /// `href` fragment identifying the entity, usable in `[href*=...]`
    #[must_use]
    pub fn href_fragment(self, id: u64) -> String {
        self.template().replace(":id", &id.to_string())
    }

    /// Site-relative path of the entity's detail page
    pub fn detail_path(self, id: u64, parent_id: Option<u64>) -> ProbeResult<String> {
        match (self.parent(), parent_id) {
            (None, _) => Ok(self.href_fragment(id)),
            (Some(parent), Some(pid)) => Ok(format!(
                "{}{}",
                parent.href_fragment(pid).trim_end_matches('/'),
                self.href_fragment(id)
            )),
            (Some(parent), None) => Err(ProbeError::precondition(format!(
                "{self:?} path requires a {parent:?} id"
            ))),
        }
    }

    /// Identifier embedded in `href`, if the template occurs in it
    #[must_use]
    pub fn extract_id(self, href: &str) -> Option<u64> {
        let segments = path_segments(href);
        let template: Vec<&str> = self
            .template()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        segments.windows(template.len()).find_map(|window| {
            let mut id = None;
            for (seg, tpl) in window.iter().zip(&template) {
                if *tpl == ":id" {
                    if seg.is_empty() || !seg.chars().all(|c| c.is_ascii_digit()) {
                        return None;
                    }
                    id = seg.parse().ok();
                } else if seg != tpl {
                    return None;
                }
            }
            id
        })
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Experience => "experience",
            Self::Interview => "interview",
            Self::Course => "course",
            Self::Classroom => "classroom",
            Self::Juku => "juku",
        };
        f.write_str(name)
    }
}

/// Path segments of an absolute or relative URL, without query and fragment.
///
/// A template ending in `/` only matches a segment that is followed by
/// another `/`, so `/juku/12` does not yield an id but `/juku/12/` does.
fn path_segments(href: &str) -> Vec<&str> {
    let without_scheme = href.split_once("://").map_or(href, |(_, rest)| {
        rest.find('/').map_or("", |i| &rest[i..])
    });
    let path = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if !path.ends_with('/') {
        segments.pop();
    }
    segments
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod extract_tests {
        use super::*;

        #[test]
        fn test_extract_from_card_hrefs() {
            assert_eq!(
                EntityKind::Experience.extract_id("/shingaku/experience/4821/"),
                Some(4821)
            );
            let href = "https://example.com/passed-interview/77/?ref=top";
            assert_eq!(EntityKind::Interview.extract_id(href), Some(77));
            assert_eq!(
                EntityKind::Course.extract_id("/juku/12/course/345/"),
                Some(345)
            );
            assert_eq!(
                EntityKind::Juku.extract_id("/juku/12/course/345/"),
                Some(12)
            );
            assert_eq!(
                EntityKind::Classroom.extract_id("/juku/12/class/9/request/"),
                Some(9)
            );
        }

        #[test]
        fn test_non_matching_hrefs() {
            assert_eq!(EntityKind::Course.extract_id("/juku/12/"), None);
            assert_eq!(
                EntityKind::Interview.extract_id("/passed-interview/abc/"),
                None
            );
            assert_eq!(EntityKind::Experience.extract_id(""), None);
            assert_eq!(EntityKind::Juku.extract_id("/juku/12"), None);
        }
    }

    mod path_tests {
        use super::*;

        #[test]
        fn test_fragments() {
            assert_eq!(EntityKind::Course.href_fragment(5), "/course/5/");
            assert_eq!(
                EntityKind::Interview.href_fragment(8),
                "/passed-interview/8/"
            );
        }

        #[test]
        fn test_detail_paths() {
            assert_eq!(
                EntityKind::Classroom.detail_path(3, Some(10)).unwrap(),
                "/juku/10/class/3/"
            );
            assert_eq!(EntityKind::Juku.detail_path(10, None).unwrap(), "/juku/10/");
            assert!(matches!(
                EntityKind::Course.detail_path(3, None),
                Err(ProbeError::PreconditionViolated { .. })
            ));
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn any_kind() -> impl Strategy<Value = EntityKind> {
            prop_oneof![
                Just(EntityKind::Experience),
                Just(EntityKind::Interview),
                Just(EntityKind::Course),
                Just(EntityKind::Classroom),
                Just(EntityKind::Juku),
            ]
        }

        proptest! {
            #[test]
            fn prop_id_round_trips_through_detail_path(
                kind in any_kind(),
                id in any::<u64>(),
                parent in any::<u64>()
            ) {
                let path = kind.detail_path(id, Some(parent)).unwrap();
                prop_assert_eq!(kind.extract_id(&path), Some(id));
            }

            #[test]
            fn prop_id_round_trips_through_fragment(kind in any_kind(), id in any::<u64>()) {
                let href = format!("https://example.com{}", kind.href_fragment(id));
                prop_assert_eq!(kind.extract_id(&href), Some(id));
            }
        }
    }
}
