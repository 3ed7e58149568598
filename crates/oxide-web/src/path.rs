//! Path pattern matching.

use std::collections::HashSet;

use regex::Regex;

use crate::error::{Result, WebError};
use crate::request::{Method, Methods, PathParams};

/// A segment in a path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A literal string segment.
    Literal(String),
    /// A parameter segment (e.g., {id}).
    Param(String),
    /// `*` anywhere but last: exactly one segment, not bound.
    Wildcard,
    /// `*` or `{*name}` in last position: zero or more remaining segments.
    WildcardTail(Option<String>),
}

/// A compiled path pattern for matching method and path.
#[derive(Debug, Clone)]
pub struct PathPattern {
    /// The normalized pattern string.
    pattern: String,
    /// Parsed segments.
    segments: Vec<PathSegment>,
    /// Methods this pattern answers to.
    methods: Methods,
    /// Compiled regex for matching.
    regex: Regex,
    /// Parameter names in capture order.
    param_names: Vec<String>,
}

impl PathPattern {
    /// Compiles a path template.
    ///
    /// Template syntax:
    /// - `/users` - Literal path
    /// - `/users/{id}` - Path with parameter
    /// - `/users/*/posts` - Any single segment
    /// - `/web/*` - Any remaining segments, including none
    /// - `/files/{*path}` - Remaining segments bound to `path`
    ///
    /// # Example
    ///
    /// ```
    /// use oxide_web::{Method, Methods, PathPattern};
    ///
    /// let pattern =
    ///     PathPattern::compile("/posts/{id}/comments/{comment_id}", Methods::Any).unwrap();
    /// let params = pattern.matches(Method::Get, "/posts/123/comments/456").unwrap();
    /// assert_eq!(params.get("id"), Some("123"));
    /// assert_eq!(params.get("comment_id"), Some("456"));
    /// ```
    pub fn compile(template: &str, methods: Methods) -> Result<Self> {
        let parts: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut param_names = Vec::new();
        let mut seen = HashSet::new();
        let mut regex_str = String::from("^");

        for (i, part) in parts.iter().enumerate() {
            let last = i + 1 == parts.len();
            let segment = parse_segment(template, part, last)?;

            match &segment {
                PathSegment::Literal(s) => {
                    regex_str.push('/');
                    regex_str.push_str(&regex::escape(s));
                }
                PathSegment::Param(name) => {
                    if !seen.insert(name.clone()) {
                        return Err(WebError::invalid_pattern(
                            template,
                            format!("duplicate parameter `{name}`"),
                        ));
                    }
                    param_names.push(name.clone());
                    regex_str.push_str("/([^/]+)");
                }
                PathSegment::Wildcard => regex_str.push_str("/[^/]+"),
                PathSegment::WildcardTail(name) => {
                    if let Some(name) = name {
                        if !seen.insert(name.clone()) {
                            return Err(WebError::invalid_pattern(
                                template,
                                format!("duplicate parameter `{name}`"),
                            ));
                        }
                    }
                    regex_str.push_str("(?:/(.*))?");
                }
            }
            segments.push(segment);
        }

        regex_str.push_str("/?$");

        let regex = Regex::new(&regex_str)
            .map_err(|e| WebError::invalid_pattern(template, e.to_string()))?;

        Ok(Self {
            pattern: render(&segments),
            segments,
            methods,
            regex,
            param_names,
        })
    }

    /// Matches a request method and path.
    ///
    /// Returns the bound parameters when both the method set and the path
    /// match.
    pub fn matches(&self, method: Method, path: &str) -> Option<PathParams> {
        if !self.methods.contains(method) {
            return None;
        }
        self.match_path(path)
    }

    /// Matches a path, ignoring the method set.
    pub fn match_path(&self, path: &str) -> Option<PathParams> {
        let caps = self.regex.captures(path)?;

        let mut params = PathParams::new();

        for (i, name) in self.param_names.iter().enumerate() {
            if let Some(value) = caps.get(i + 1) {
                params.insert(name.clone(), decode_path(value.as_str()));
            }
        }

        if let Some(PathSegment::WildcardTail(name)) = self.segments.last() {
            let tail = decode_path(
                caps.get(self.param_names.len() + 1)
                    .map_or("", |m| m.as_str())
                    .trim_end_matches('/'),
            );
            if let Some(name) = name {
                params.insert(name.clone(), tail.clone());
            }
            params.set_tail(tail);
        }

        Some(params)
    }

    /// Returns the normalized pattern string.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the parsed segments.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Returns the method set.
    pub fn methods(&self) -> &Methods {
        &self.methods
    }

    /// Returns the parameter names.
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// The leading literal segments, up to the first non-literal one.
    pub fn literal_prefix(&self) -> Vec<&str> {
        self.segments
            .iter()
            .map_while(|s| match s {
                PathSegment::Literal(l) => Some(l.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Two patterns share a scope when their literal prefixes are identical.
    pub fn same_scope(&self, other: &Self) -> bool {
        self.literal_prefix() == other.literal_prefix()
    }
}

/// Joins a group prefix and a template with single-slash normalization.
/// Percent-decodes a matched path piece. `+` stays literal in paths.
fn decode_path(raw: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
}

pub(crate) fn join(prefix: &str, template: &str) -> String {
    let joined: Vec<&str> = prefix
        .split('/')
        .chain(template.split('/'))
        .filter(|s| !s.is_empty())
        .collect();
    format!("/{}", joined.join("/"))
}

fn parse_segment(template: &str, part: &str, last: bool) -> Result<PathSegment> {
    if part == "*" {
        return Ok(if last {
            PathSegment::WildcardTail(None)
        } else {
            PathSegment::Wildcard
        });
    }

    if let Some(inner) = part.strip_prefix('{') {
        let name = inner
            .strip_suffix('}')
            .ok_or_else(|| WebError::invalid_pattern(template, "unclosed `{`"))?;

        if let Some(tail) = name.strip_prefix('*') {
            if !last {
                return Err(WebError::invalid_pattern(
                    template,
                    "wildcard tail must be the last segment",
                ));
            }
            check_name(template, tail)?;
            return Ok(PathSegment::WildcardTail(Some(tail.to_string())));
        }

        check_name(template, name)?;
        return Ok(PathSegment::Param(name.to_string()));
    }

    if part.contains(['{', '}']) {
        return Err(WebError::invalid_pattern(
            template,
            format!("unbalanced braces in `{part}`"),
        ));
    }

    Ok(PathSegment::Literal(part.to_string()))
}

fn check_name(template: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['{', '}', '*']) {
        return Err(WebError::invalid_pattern(
            template,
            format!("invalid parameter name `{name}`"),
        ));
    }
    Ok(())
}

fn render(segments: &[PathSegment]) -> String {
    let parts: Vec<String> = segments
        .iter()
        .map(|s| match s {
            PathSegment::Literal(l) => l.clone(),
            PathSegment::Param(name) => format!("{{{name}}}"),
            PathSegment::Wildcard | PathSegment::WildcardTail(None) => "*".to_string(),
            PathSegment::WildcardTail(Some(name)) => format!("{{*{name}}}"),
        })
        .collect();
    format!("/{}", parts.join("/"))
}
