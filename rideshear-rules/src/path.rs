use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RuleError;

/// Fully qualified document location, e.g. `rides/r1/messages/m1`.
///
/// Segments alternate between collection ids and document ids, so a valid
/// document path always has an even, non-zero number of segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    segments: Vec<String>,
}

impl DocumentPath {
    pub fn parse(raw: &str) -> Result<Self, RuleError> {
        let segments = split_segments(raw).map_err(|reason| RuleError::invalid_path(raw, reason))?;

        if segments.is_empty() {
            return Err(RuleError::invalid_path(raw, "path is empty"));
        }
        if segments.len() % 2 != 0 {
            return Err(RuleError::invalid_path(
                raw,
                "document paths need an even number of segments",
            ));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Document identifier (last segment).
    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Collection segments, e.g. `["rides", "r1", "messages"]`.
    pub fn collection_segments(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    pub fn collection_path(&self) -> String {
        self.collection_segments().join("/")
    }

    /// Enclosing document for sub-collection members.
    pub fn parent(&self) -> Option<DocumentPath> {
        if self.segments.len() < 4 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 2].to_vec(),
        })
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl std::str::FromStr for DocumentPath {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DocumentPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DocumentPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DocumentPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Values captured by `{name}` segments while matching a pattern.
pub type PathParams = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    Param(String),
    /// `{name=**}`: one or more trailing segments.
    Rest(String),
}

/// Document path pattern such as `rides/{rideId}/messages/{messageId}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPattern {
    raw: String,
    segments: Vec<PatternSegment>,
}

/// Ordering key for overlapping matches. Larger is more specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    literals: usize,
    bounded: bool,
    depth: usize,
}

impl CollectionPattern {
    pub fn parse(raw: &str) -> Result<Self, RuleError> {
        let parts = split_segments(raw).map_err(|reason| RuleError::invalid_pattern(raw, reason))?;
        if parts.is_empty() {
            return Err(RuleError::invalid_pattern(raw, "pattern is empty"));
        }

        let mut segments = Vec::with_capacity(parts.len());
        let mut names = Vec::new();
        let last = parts.len() - 1;

        for (index, part) in parts.into_iter().enumerate() {
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(inner) => {
                    let (name, rest) = match inner.strip_suffix("=**") {
                        Some(name) => (name, true),
                        None => (inner, false),
                    };
                    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    {
                        return Err(RuleError::invalid_pattern(raw, "malformed parameter name"));
                    }
                    if names.iter().any(|existing| existing == name) {
                        return Err(RuleError::invalid_pattern(raw, "duplicate parameter name"));
                    }
                    names.push(name.to_string());
                    if rest {
                        if index != last {
                            return Err(RuleError::invalid_pattern(
                                raw,
                                "recursive wildcard must be the last segment",
                            ));
                        }
                        PatternSegment::Rest(name.to_string())
                    } else {
                        PatternSegment::Param(name.to_string())
                    }
                }
                None => {
                    if part.contains('{') || part.contains('}') {
                        return Err(RuleError::invalid_pattern(raw, "unbalanced braces"));
                    }
                    PatternSegment::Literal(part)
                }
            };
            segments.push(segment);
        }

        let bounded = !matches!(segments.last(), Some(PatternSegment::Rest(_)));
        if bounded && segments.len() % 2 != 0 {
            return Err(RuleError::invalid_pattern(
                raw,
                "pattern must address documents (even number of segments)",
            ));
        }

        Ok(Self {
            raw: raw.trim().trim_matches('/').to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches a document path, returning captured parameters on success.
    pub fn matches(&self, path: &DocumentPath) -> Option<PathParams> {
        let target = path.segments();
        let mut params = PathParams::new();

        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                PatternSegment::Literal(literal) => {
                    if target.get(index)? != literal {
                        return None;
                    }
                }
                PatternSegment::Param(name) => {
                    params.insert(name.clone(), target.get(index)?.clone());
                }
                PatternSegment::Rest(name) => {
                    let remaining = target.get(index..)?;
                    if remaining.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), remaining.join("/"));
                    return Some(params);
                }
            }
        }

        (target.len() == self.segments.len()).then_some(params)
    }

    pub fn specificity(&self) -> Specificity {
        Specificity {
            literals: self
                .segments
                .iter()
                .filter(|segment| matches!(segment, PatternSegment::Literal(_)))
                .count(),
            bounded: !matches!(self.segments.last(), Some(PatternSegment::Rest(_))),
            depth: self.segments.len(),
        }
    }

    /// Shape with parameter names erased. Two patterns with the same shape
    /// match exactly the same paths.
    pub fn shape(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                PatternSegment::Literal(literal) => literal.as_str(),
                PatternSegment::Param(_) => "{}",
                PatternSegment::Rest(_) => "{**}",
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            PatternSegment::Param(name) | PatternSegment::Rest(name) => Some(name.as_str()),
            PatternSegment::Literal(_) => None,
        })
    }
}

impl fmt::Display for CollectionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for CollectionPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for CollectionPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        CollectionPattern::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Document path with `{param}` placeholders filled from the matched pattern,
/// e.g. `rides/{rideId}` when evaluating `rides/{rideId}/messages/{messageId}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct PathTemplate(String);

impl PathTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter_map(|segment| {
            segment
                .strip_prefix('{')
                .and_then(|segment| segment.strip_suffix('}'))
        })
    }

    /// Substitutes parameters. Returns `None` if a placeholder is unbound or
    /// the result is not a document path.
    pub fn render(&self, params: &PathParams) -> Option<DocumentPath> {
        let mut rendered = Vec::new();
        for segment in self.0.split('/').filter(|segment| !segment.is_empty()) {
            match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => rendered.push(params.get(name)?.as_str()),
                None => rendered.push(segment),
            }
        }
        DocumentPath::parse(&rendered.join("/")).ok()
    }
}

impl From<&str> for PathTemplate {
    fn from(value: &str) -> Self {
        PathTemplate::new(value)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Splits on `/`. Whitespace around the whole string is ignored; inside it,
/// segments may not start or end with whitespace.
fn split_segments(raw: &str) -> Result<Vec<String>, &'static str> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        if segment.is_empty() {
            return Err("empty path segment");
        }
        if segment.trim() != segment {
            return Err("path segment has leading or trailing whitespace");
        }
        segments.push(segment.to_string());
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_nested_document_paths() {
        let path = DocumentPath::parse("/rides/r1/messages/m1").expect("valid path");
        assert_eq!(path.id(), "m1");
        assert_eq!(path.collection_path(), "rides/r1/messages");
        assert_eq!(path.parent().map(|p| p.to_string()), Some("rides/r1".into()));
        assert!(DocumentPath::parse("rides").is_err());
        assert!(DocumentPath::parse("rides//r1").is_err());
    }

    #[test]
    fn display_parses_back_to_the_same_path() {
        for raw in ["/rides/r1/", "  users/user1 ", "rides/r 1/messages/m1"] {
            let path = DocumentPath::parse(raw).unwrap();
            assert_eq!(DocumentPath::parse(&path.to_string()).unwrap(), path);
        }
        assert!(DocumentPath::parse("/ a/b").is_err());
        assert!(DocumentPath::parse("rides/r1 /messages/m1").is_err());
        assert!(CollectionPattern::parse("users/ {userId}").is_err());
        assert_eq!(CollectionPattern::parse(" users/{userId}").unwrap().as_str(), "users/{userId}");
    }

    #[test]
    fn captures_parameters() {
        let pattern = CollectionPattern::parse("rides/{rideId}/messages/{messageId}").unwrap();
        let path = DocumentPath::parse("rides/r1/messages/m1").unwrap();
        let params = pattern.matches(&path).expect("pattern should match");
        assert_eq!(params.get("rideId").map(String::as_str), Some("r1"));
        assert_eq!(params.get("messageId").map(String::as_str), Some("m1"));

        let parent = DocumentPath::parse("rides/r1").unwrap();
        assert!(pattern.matches(&parent).is_none());
    }

    #[test]
    fn recursive_wildcard_is_less_specific() {
        let wildcard = CollectionPattern::parse("rides/{rest=**}").unwrap();
        let exact = CollectionPattern::parse("rides/{rideId}/messages/{messageId}").unwrap();
        let path = DocumentPath::parse("rides/r1/messages/m1").unwrap();

        let captured = wildcard.matches(&path).expect("wildcard should match");
        assert_eq!(captured.get("rest").map(String::as_str), Some("r1/messages/m1"));
        assert!(exact.specificity() > wildcard.specificity());
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert!(CollectionPattern::parse("rides").is_err());
        assert!(CollectionPattern::parse("rides/{id").is_err());
        assert!(CollectionPattern::parse("{a=**}/b").is_err());
        assert!(CollectionPattern::parse("a/{x}/b/{x}").is_err());
    }

    #[test]
    fn renders_templates_from_params() {
        let mut params = PathParams::new();
        params.insert("rideId".into(), "r9".into());
        let template = PathTemplate::from("rides/{rideId}");
        assert_eq!(template.render(&params).map(|p| p.to_string()), Some("rides/r9".into()));
        assert!(PathTemplate::from("rides/{missing}").render(&params).is_none());
    }
}
