//! Route template text → [`RoutePattern`].

use super::factory::RoutePatternFactory;
use super::pattern::{
    ParameterKind, ParameterPolicyReference, RoutePattern, RoutePatternParameterPart,
    RoutePatternPart, RoutePatternPathSegment,
};
use crate::error::{Result, RoutingError};
use serde_json::Value;

const INVALID_NAME_CHARS: &[char] = &['{', '}', '/', '?', '*', '=', ':'];

/// Parse a route template such as `{controller=Home}/{action=Index}/{id?}`.
///
/// A leading `~/` or `/` and a single trailing `/` are ignored.
pub fn parse(template: &str) -> Result<RoutePattern> {
    let segments = parse_segments(template)?;
    RoutePatternFactory::pattern(Some(template.to_string()), None, &[], None, segments)
}

pub(crate) fn parse_segments(template: &str) -> Result<Vec<RoutePatternPathSegment>> {
    let mut trimmed = template;
    if let Some(rest) = trimmed.strip_prefix("~/") {
        trimmed = rest;
    } else if let Some(rest) = trimmed.strip_prefix('/') {
        trimmed = rest;
    } else if trimmed.starts_with('~') {
        return Err(RoutingError::template(
            template,
            "a template may only start with '~' when it is followed by '/'",
        ));
    }
    if let Some(rest) = trimmed.strip_suffix('/') {
        trimmed = rest;
    }
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let mut segments = Vec::new();
    let mut parts: Vec<RoutePatternPart> = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '/' => {
                flush_literal(&mut literal, &mut parts);
                if parts.is_empty() {
                    return Err(RoutingError::template(
                        template,
                        "the template contains an empty segment",
                    ));
                }
                segments.push(RoutePatternPathSegment::new(std::mem::take(&mut parts)));
                i += 1;
            }
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '{' => {
                flush_literal(&mut literal, &mut parts);
                let (content, next) = read_parameter(template, &chars, i + 1)?;
                parts.push(RoutePatternPart::Parameter(parse_parameter(
                    template, &content,
                )?));
                i = next;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '}' => {
                return Err(RoutingError::template(
                    template,
                    "unbalanced '}': escape literal braces as '}}'",
                ));
            }
            '?' => {
                return Err(RoutingError::template(
                    template,
                    "'?' is only allowed at the end of a parameter",
                ));
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    flush_literal(&mut literal, &mut parts);
    if parts.is_empty() {
        return Err(RoutingError::template(
            template,
            "the template contains an empty segment",
        ));
    }
    segments.push(RoutePatternPathSegment::new(parts));

    validate(template, &mut segments)?;
    Ok(segments)
}

fn flush_literal(literal: &mut String, parts: &mut Vec<RoutePatternPart>) {
    if !literal.is_empty() {
        parts.push(RoutePatternPart::Literal(std::mem::take(literal)));
    }
}

/// Reads up to the closing `}`; `{{` and `}}` inside a parameter are escapes.
fn read_parameter(template: &str, chars: &[char], mut i: usize) -> Result<(String, usize)> {
    let mut content = String::new();
    loop {
        match chars.get(i) {
            None => {
                return Err(RoutingError::template(
                    template,
                    "unbalanced '{': a parameter is missing its closing '}'",
                ))
            }
            Some('}') if chars.get(i + 1) == Some(&'}') => {
                content.push('}');
                i += 2;
            }
            Some('}') => return Ok((content, i + 1)),
            Some('{') if chars.get(i + 1) == Some(&'{') => {
                content.push('{');
                i += 2;
            }
            Some('{') => {
                return Err(RoutingError::template(
                    template,
                    "unescaped '{' inside a parameter",
                ))
            }
            Some(c) => {
                content.push(*c);
                i += 1;
            }
        }
    }
}

fn parse_parameter(template: &str, content: &str) -> Result<RoutePatternParameterPart> {
    let (kind, encode_slashes, rest) = if let Some(rest) = content.strip_prefix("**") {
        (ParameterKind::CatchAll, false, rest)
    } else if let Some(rest) = content.strip_prefix('*') {
        (ParameterKind::CatchAll, true, rest)
    } else {
        (ParameterKind::Standard, true, content)
    };

    // Split off the default at the first '=' outside constraint arguments.
    let mut depth = 0usize;
    let mut pieces: Vec<&str> = Vec::new();
    let mut piece_start = 0;
    let mut default: Option<&str> = None;
    for (idx, c) in rest.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => {
                pieces.push(&rest[piece_start..idx]);
                piece_start = idx + 1;
            }
            '=' if depth == 0 => {
                pieces.push(&rest[piece_start..idx]);
                default = Some(&rest[idx + 1..]);
                piece_start = rest.len();
                break;
            }
            _ => {}
        }
    }
    if piece_start < rest.len() || (default.is_none() && piece_start == rest.len()) {
        pieces.push(&rest[piece_start..]);
    }

    let mut kind = kind;
    if let Some(last) = pieces.last_mut() {
        let current = *last;
        if let Some(stripped) = current.strip_suffix('?') {
            if default.is_some() {
                return Err(RoutingError::template(
                    template,
                    "an optional parameter cannot have a default value",
                ));
            }
            if kind == ParameterKind::CatchAll {
                return Err(RoutingError::template(
                    template,
                    "a catch-all parameter cannot be marked optional",
                ));
            }
            *last = stripped;
            kind = ParameterKind::Optional;
        }
    }

    let mut pieces = pieces.into_iter();
    let name = pieces.next().unwrap_or_default();
    if name.is_empty() || name.contains(INVALID_NAME_CHARS) {
        return Err(RoutingError::template(
            template,
            format!("'{name}' is not a valid parameter name"),
        ));
    }

    let mut policies = Vec::new();
    for constraint in pieces {
        if constraint.is_empty() {
            return Err(RoutingError::template(
                template,
                format!("parameter '{name}' has an empty constraint"),
            ));
        }
        policies.push(ParameterPolicyReference::Content(constraint.to_string()));
    }

    Ok(RoutePatternParameterPart {
        name: name.to_string(),
        default: default.map(|d| Value::String(d.to_string())),
        kind,
        encode_slashes,
        policies,
    })
}

fn validate(template: &str, segments: &mut [RoutePatternPathSegment]) -> Result<()> {
    let mut names: Vec<String> = Vec::new();
    let last_segment = segments.len().saturating_sub(1);

    for (index, segment) in segments.iter_mut().enumerate() {
        let part_count = segment.parts.len();
        for i in 0..part_count {
            let RoutePatternPart::Parameter(p) = &segment.parts[i] else {
                continue;
            };
            if names.iter().any(|n| n.eq_ignore_ascii_case(&p.name)) {
                return Err(RoutingError::template(
                    template,
                    format!("the parameter '{}' appears more than once", p.name),
                ));
            }
            names.push(p.name.clone());

            if p.is_catch_all() && (index != last_segment || part_count > 1) {
                return Err(RoutingError::template(
                    template,
                    "a catch-all parameter must be alone in the last segment",
                ));
            }
            if i + 1 < part_count && segment.parts[i + 1].as_parameter().is_some() {
                return Err(RoutingError::template(
                    template,
                    "two parameters must be separated by a literal",
                ));
            }
            if p.is_optional() && part_count > 1 {
                if i + 1 != part_count {
                    return Err(RoutingError::template(
                        template,
                        format!("optional parameter '{}' must be last in its segment", p.name),
                    ));
                }
                split_optional_separator(template, &mut segment.parts, i)?;
                break;
            }
        }
    }
    Ok(())
}

/// The literal before an optional parameter in a complex segment becomes a
/// separator: `{a}.{b?}` and `{a}x.{b?}` are legal, `{a}-{b?}` is not.
fn split_optional_separator(
    template: &str,
    parts: &mut Vec<RoutePatternPart>,
    optional_index: usize,
) -> Result<()> {
    let previous = optional_index - 1;
    let text = match &parts[previous] {
        RoutePatternPart::Separator(_) => return Ok(()),
        RoutePatternPart::Literal(text) if text.ends_with('.') => text.clone(),
        _ => {
            return Err(RoutingError::template(
                template,
                "only a period '.' may precede an optional parameter in a complex segment",
            ))
        }
    };
    if text == "." {
        parts[previous] = RoutePatternPart::Separator(text);
    } else {
        let head = text[..text.len() - 1].to_string();
        parts[previous] = RoutePatternPart::Literal(head);
        parts.insert(previous + 1, RoutePatternPart::Separator(".".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(template: &str) -> String {
        match parse(template) {
            Err(RoutingError::InvalidTemplate { reason, .. }) => reason,
            other => panic!("expected a template error for {template:?}, got {other:?}"),
        }
    }

    #[test]
    fn parses_conventional_default_route() {
        let pattern = parse("{controller=Home}/{action=Index}/{id?}").expect("template");
        assert_eq!(pattern.path_segments().len(), 3);
        assert_eq!(pattern.defaults().get_string("controller").as_deref(), Some("Home"));
        assert_eq!(pattern.defaults().get_string("action").as_deref(), Some("Index"));
        assert!(pattern.get_parameter("id").expect("id").is_optional());
        assert!(!pattern.defaults().contains_key("id"));
    }

    #[test]
    fn leading_and_trailing_slashes() {
        assert_eq!(parse("~/a/b/").expect("t").path_segments().len(), 2);
        assert_eq!(parse("/").expect("t").path_segments().len(), 0);
        assert!(err("~a").contains("'~'"));
    }

    #[test]
    fn catch_all_and_constraints() {
        let pattern = parse("files/{**path}").expect("t");
        let path = pattern.get_parameter("path").expect("path");
        assert!(path.is_catch_all());
        assert!(!path.encode_slashes);

        let pattern = parse("items/{id:int:range(1,10)}").expect("t");
        let id = pattern.get_parameter("id").expect("id");
        assert_eq!(id.policies.len(), 2);
    }

    #[test]
    fn regex_constraint_may_contain_separators() {
        let pattern = parse("p/{code:regex(^\\d{{3}}-[a-z]=x$)}").expect("t");
        let code = pattern.get_parameter("code").expect("code");
        match &code.policies[0] {
            ParameterPolicyReference::Content(c) => assert_eq!(c, "regex(^\\d{3}-[a-z]=x$)"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(code.default.is_none());
    }

    #[test]
    fn complex_segments_and_optional_extension() {
        let pattern = parse("{name}.{ext?}").expect("t");
        let parts = &pattern.path_segments()[0].parts;
        assert!(matches!(parts[1], RoutePatternPart::Separator(_)));

        let pattern = parse("{name}v.{ext?}").expect("t");
        let parts = &pattern.path_segments()[0].parts;
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1].as_text(), Some("v"));
        assert!(matches!(parts[2], RoutePatternPart::Separator(_)));
    }

    #[test]
    fn escaped_braces_are_literals() {
        let pattern = parse("a{{b}}").expect("t");
        assert_eq!(pattern.path_segments()[0].as_literal(), Some("a{b}"));
    }

    #[test]
    fn rejects_invalid_templates() {
        assert!(err("a//b").contains("empty segment"));
        assert!(err("{*a}/b").contains("catch-all"));
        assert!(err("a{*b}").contains("catch-all"));
        assert!(err("{a}{b}").contains("separated"));
        assert!(err("{a}/{A}").contains("more than once"));
        assert!(err("{a?=1}").contains("default"));
        assert!(err("{a}-{b?}").contains("period"));
        assert!(err("{a?}.{b}").contains("last"));
        assert!(err("a?b").contains("'?'"));
        assert!(err("{a").contains("unbalanced"));
        assert!(err("a}").contains("unbalanced"));
        assert!(err("{}").contains("not a valid parameter name"));
        assert!(err("{a:}").contains("empty constraint"));
    }
}
