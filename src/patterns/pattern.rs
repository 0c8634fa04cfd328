use super::policies::ParameterPolicy;
use super::precedence::{self, Precedence};
use crate::route_values::{value_to_string, RouteValueDictionary};
use serde_json::Value;
use std::fmt;

/// How a parameter consumes path text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// `{name}`: exactly one segment (or one slice of a complex segment)
    Standard,
    /// `{name?}`: may be absent
    Optional,
    /// `{*name}` / `{**name}`: the rest of the path, possibly empty
    CatchAll,
}

/// A parameter policy as written in a template or supplied by code.
#[derive(Clone)]
pub enum ParameterPolicyReference {
    /// Inline text such as `int` or `regex(^\d+$)`, resolved by a policy factory
    Content(String),
    /// An already-built policy
    Policy(ParameterPolicy),
}

impl fmt::Debug for ParameterPolicyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterPolicyReference::Content(content) => write!(f, "Content({content:?})"),
            ParameterPolicyReference::Policy(policy) => write!(f, "Policy({policy:?})"),
        }
    }
}

/// `{name...}` part of a segment.
#[derive(Debug, Clone)]
pub struct RoutePatternParameterPart {
    pub name: String,
    pub default: Option<Value>,
    pub kind: ParameterKind,
    /// `false` for `{**name}`: slashes in the value are emitted verbatim.
    pub encode_slashes: bool,
    pub policies: Vec<ParameterPolicyReference>,
}

impl RoutePatternParameterPart {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            kind: ParameterKind::Standard,
            encode_slashes: true,
            policies: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.kind == ParameterKind::Optional
    }

    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        self.kind == ParameterKind::CatchAll
    }
}

/// One piece of a path segment.
#[derive(Debug, Clone)]
pub enum RoutePatternPart {
    Literal(String),
    /// A literal that may be dropped along with the optional parameter after it (`.` in `{a}.{b?}`)
    Separator(String),
    Parameter(RoutePatternParameterPart),
}

impl RoutePatternPart {
    #[must_use]
    pub fn as_parameter(&self) -> Option<&RoutePatternParameterPart> {
        match self {
            RoutePatternPart::Parameter(p) => Some(p),
            _ => None,
        }
    }

    /// Literal or separator text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RoutePatternPart::Literal(s) | RoutePatternPart::Separator(s) => Some(s),
            RoutePatternPart::Parameter(_) => None,
        }
    }
}

/// Text between two slashes.
#[derive(Debug, Clone)]
pub struct RoutePatternPathSegment {
    pub parts: Vec<RoutePatternPart>,
}

impl RoutePatternPathSegment {
    #[must_use]
    pub fn new(parts: Vec<RoutePatternPart>) -> Self {
        Self { parts }
    }

    /// A single part (no literal/parameter mixing).
    #[must_use]
    pub fn is_simple(&self) -> bool {
        self.parts.len() == 1
    }

    /// The literal text when the segment is exactly one literal.
    #[must_use]
    pub fn as_literal(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [RoutePatternPart::Literal(text)] => Some(text),
            _ => None,
        }
    }

    /// The parameter when the segment is exactly one parameter.
    #[must_use]
    pub fn as_parameter(&self) -> Option<&RoutePatternParameterPart> {
        match self.parts.as_slice() {
            [RoutePatternPart::Parameter(p)] => Some(p),
            _ => None,
        }
    }

    pub(crate) fn render(&self, out: &mut String) {
        for part in &self.parts {
            match part {
                RoutePatternPart::Literal(text) => {
                    for c in text.chars() {
                        match c {
                            '{' => out.push_str("{{"),
                            '}' => out.push_str("}}"),
                            other => out.push(other),
                        }
                    }
                }
                RoutePatternPart::Separator(text) => out.push_str(text),
                RoutePatternPart::Parameter(p) => {
                    out.push('{');
                    if p.is_catch_all() {
                        out.push_str(if p.encode_slashes { "*" } else { "**" });
                    }
                    out.push_str(&p.name);
                    for policy in &p.policies {
                        if let ParameterPolicyReference::Content(content) = policy {
                            out.push(':');
                            out.push_str(content);
                        }
                    }
                    if p.is_optional() {
                        out.push('?');
                    }
                    if let Some(default) = p.default.as_ref().and_then(value_to_string) {
                        out.push('=');
                        out.push_str(&default);
                    }
                    out.push('}');
                }
            }
        }
    }
}

/// Render segments back into template text, e.g. `Home/{action}/{id?}`.
#[must_use]
pub fn render_segments(segments: &[RoutePatternPathSegment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push('/');
        }
        segment.render(&mut out);
    }
    out
}

/// A parsed and combined route pattern.
///
/// Built by [`super::parse`] or [`super::RoutePatternFactory`]; immutable once built.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    pub(crate) raw_text: Option<String>,
    pub(crate) defaults: RouteValueDictionary,
    pub(crate) parameter_policies: Vec<(String, Vec<ParameterPolicyReference>)>,
    pub(crate) required_values: RouteValueDictionary,
    pub(crate) parameters: Vec<RoutePatternParameterPart>,
    pub(crate) path_segments: Vec<RoutePatternPathSegment>,
}

impl RoutePattern {
    /// The template text this pattern was parsed from, or a rendering of its segments.
    #[must_use]
    pub fn raw_text(&self) -> String {
        match &self.raw_text {
            Some(raw) => raw.clone(),
            None => render_segments(&self.path_segments),
        }
    }

    #[must_use]
    pub fn defaults(&self) -> &RouteValueDictionary {
        &self.defaults
    }

    #[must_use]
    pub fn required_values(&self) -> &RouteValueDictionary {
        &self.required_values
    }

    #[must_use]
    pub fn parameters(&self) -> &[RoutePatternParameterPart] {
        &self.parameters
    }

    #[must_use]
    pub fn path_segments(&self) -> &[RoutePatternPathSegment] {
        &self.path_segments
    }

    #[must_use]
    pub fn parameter_policies(&self) -> &[(String, Vec<ParameterPolicyReference>)] {
        &self.parameter_policies
    }

    #[must_use]
    pub fn get_parameter(&self, name: &str) -> Option<&RoutePatternParameterPart> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Lower sorts first when matching requests.
    #[must_use]
    pub fn inbound_precedence(&self) -> Precedence {
        precedence::compute_inbound(&self.path_segments)
    }

    /// Higher is preferred when generating links.
    #[must_use]
    pub fn outbound_precedence(&self) -> Precedence {
        precedence::compute_outbound(&self.path_segments)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_text())
    }
}
