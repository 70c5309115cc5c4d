//! Dotted field paths and the patterns effect handlers filter on.

use std::fmt;
use std::str::FromStr;

use crate::error::PatternError;

/// Address of a field inside a form, e.g. `users.0.name`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits on `.`, dropping empty segments.
    pub fn parse(path: &str) -> Self {
        Self::new(path.split('.').filter(|segment| !segment.is_empty()))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        FieldPath::parse(path)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum PatternSegment {
    Exact(String),
    /// `*`: exactly one segment.
    Any,
    /// `**`: any remaining suffix, including none.
    Rest,
}

/// Pattern matched against [`FieldPath`]s.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPattern {
    segments: Vec<PatternSegment>,
}

impl FieldPattern {
    /// Pattern matching exactly `path`.
    pub fn exact(path: &FieldPath) -> Self {
        Self {
            segments: path
                .segments()
                .iter()
                .cloned()
                .map(PatternSegment::Exact)
                .collect(),
        }
    }

    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let raw: Vec<&str> = pattern.split('.').collect();
        let last = raw.len().saturating_sub(1);
        let mut segments = Vec::with_capacity(raw.len());
        for (position, segment) in raw.into_iter().enumerate() {
            let parsed = match segment {
                "" => return Err(PatternError::EmptySegment { position }),
                "*" => PatternSegment::Any,
                "**" if position == last => PatternSegment::Rest,
                "**" => return Err(PatternError::RestNotLast { position }),
                other => PatternSegment::Exact(other.to_owned()),
            };
            segments.push(parsed);
        }
        Ok(Self { segments })
    }

    pub fn matches(&self, path: &FieldPath) -> bool {
        let path = path.segments();
        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                PatternSegment::Rest => return true,
                PatternSegment::Any => {
                    if index >= path.len() {
                        return false;
                    }
                }
                PatternSegment::Exact(expected) => match path.get(index) {
                    Some(actual) if actual == expected => {}
                    _ => return false,
                },
            }
        }
        self.segments.len() == path.len()
    }
}

impl FromStr for FieldPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldPattern::parse(s)
    }
}

impl fmt::Display for FieldPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<&str> = self
            .segments
            .iter()
            .map(|segment| match segment {
                PatternSegment::Exact(name) => name.as_str(),
                PatternSegment::Any => "*",
                PatternSegment::Rest => "**",
            })
            .collect();
        f.write_str(&rendered.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_matches_only_the_same_path() {
        let pattern = FieldPattern::parse("users.0.name").unwrap();
        assert!(pattern.matches(&"users.0.name".into()));
        assert!(!pattern.matches(&"users.0".into()));
        assert!(!pattern.matches(&"users.0.name.first".into()));
    }

    #[test]
    fn star_matches_one_segment() {
        let pattern: FieldPattern = "users.*.name".parse().unwrap();
        assert!(pattern.matches(&"users.3.name".into()));
        assert!(!pattern.matches(&"users.name".into()));
    }

    #[test]
    fn double_star_matches_any_suffix() {
        let pattern: FieldPattern = "users.**".parse().unwrap();
        assert!(pattern.matches(&"users".into()));
        assert!(pattern.matches(&"users.1.address.city".into()));
        assert!(!pattern.matches(&"owners.1".into()));
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        assert_eq!(
            FieldPattern::parse("a..b"),
            Err(PatternError::EmptySegment { position: 1 })
        );
        assert_eq!(
            FieldPattern::parse("a.**.b"),
            Err(PatternError::RestNotLast { position: 1 })
        );
    }

    #[test]
    fn display_round_trips_the_source() {
        assert_eq!(FieldPattern::parse("a.*.**").unwrap().to_string(), "a.*.**");
        assert_eq!(FieldPath::parse("a.b").child("c").to_string(), "a.b.c");
    }
}
