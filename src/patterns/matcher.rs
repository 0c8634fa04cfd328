//! Binds a request path against a [`RoutePattern`], extracting route values.

use super::pattern::{RoutePattern, RoutePatternPart, RoutePatternPathSegment};
use crate::route_values::RouteValueDictionary;
use smallvec::SmallVec;
use std::borrow::Cow;

/// Split a request path into its non-empty segments.
#[inline]
pub(crate) fn path_segments(path: &str) -> SmallVec<[&str; 8]> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn decode(segment: &str) -> Cow<'_, str> {
    if !segment.contains('%') {
        return Cow::Borrowed(segment);
    }
    urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment))
}

/// Try to bind `path` to `pattern`, writing captured values (and defaults)
/// into `values`. `values` is left partially filled on failure.
pub fn try_match(pattern: &RoutePattern, path: &str, values: &mut RouteValueDictionary) -> bool {
    let request = path_segments(path);
    let segments = pattern.path_segments();

    for (i, segment) in segments.iter().enumerate() {
        let Some(raw) = request.get(i) else {
            if !can_be_omitted(pattern, segment) {
                return false;
            }
            continue;
        };
        match segment.parts.as_slice() {
            [RoutePatternPart::Literal(text)] | [RoutePatternPart::Separator(text)] => {
                if !text.eq_ignore_ascii_case(&decode(raw)) {
                    return false;
                }
            }
            [RoutePatternPart::Parameter(p)] if p.is_catch_all() => {
                let rest: Vec<Cow<'_, str>> = request[i..].iter().map(|s| decode(s)).collect();
                values.insert(p.name.clone(), rest.join("/"));
                return finish(pattern, values);
            }
            [RoutePatternPart::Parameter(p)] => {
                values.insert(p.name.clone(), decode(raw).into_owned());
            }
            _ => {
                if !match_complex_segment(segment, &decode(raw), values) {
                    return false;
                }
            }
        }
    }

    if request.len() > segments.len() {
        return false;
    }
    finish(pattern, values)
}

fn finish(pattern: &RoutePattern, values: &mut RouteValueDictionary) -> bool {
    for (key, value) in pattern.defaults().iter() {
        values.try_add(key, value.clone());
    }
    true
}

fn can_be_omitted(pattern: &RoutePattern, segment: &RoutePatternPathSegment) -> bool {
    match segment.as_parameter() {
        Some(p) => p.is_optional() || p.is_catch_all() || pattern.defaults().contains_key(&p.name),
        None => false,
    }
}

/// Match `{a}-{b}.{ext?}` style segments.
pub(crate) fn match_complex_segment(
    segment: &RoutePatternPathSegment,
    request: &str,
    values: &mut RouteValueDictionary,
) -> bool {
    let parts = &segment.parts;
    let optional_tail = parts.len() >= 3
        && parts[parts.len() - 1]
            .as_parameter()
            .is_some_and(|p| p.is_optional())
        && matches!(parts[parts.len() - 2], RoutePatternPart::Separator(_));

    if !optional_tail {
        return match_complex_core(parts, request, values);
    }
    if match_complex_core(parts, request, values) {
        return true;
    }
    // Retry without the separator and the optional parameter, unless the
    // request ends in a dangling separator (`file.`).
    let separator = parts[parts.len() - 2].as_text().unwrap_or_default();
    if request.ends_with(separator) {
        return false;
    }
    match_complex_core(&parts[..parts.len() - 2], request, values)
}

/// Right-to-left scan: each literal is located by its last occurrence and the
/// text between literals is assigned to the parameter in between.
fn match_complex_core(
    parts: &[RoutePatternPart],
    request: &str,
    values: &mut RouteValueDictionary,
) -> bool {
    let lowered = request.to_ascii_lowercase();
    let mut captured: SmallVec<[(&str, String); 4]> = SmallVec::new();
    let mut last_index = request.len();
    let mut pending: Option<&str> = None;
    let mut last_literal: Option<&str> = None;

    for index in (0..parts.len()).rev() {
        let part = &parts[index];
        let mut new_last_index = last_index;

        match part {
            RoutePatternPart::Parameter(p) => pending = Some(p.name.as_str()),
            RoutePatternPart::Literal(text) | RoutePatternPart::Separator(text) => {
                last_literal = Some(text.as_str());
                // A pending parameter needs at least one character.
                let reserve = usize::from(pending.is_some());
                let Some(end) = last_index.checked_sub(reserve) else {
                    return false;
                };
                let mut end = end;
                while end > 0 && !lowered.is_char_boundary(end) {
                    end -= 1;
                }
                let Some(found) = lowered[..end].rfind(&text.to_ascii_lowercase()) else {
                    return false;
                };
                if index == parts.len() - 1 && found + text.len() != request.len() {
                    return false;
                }
                new_last_index = found;
            }
        }

        let literal_after_parameter = last_literal.is_some() && part.as_parameter().is_none();
        if let Some(name) = pending {
            if literal_after_parameter || index == 0 {
                let (start, end) = match last_literal {
                    Some(literal) if !(index == 0 && part.as_parameter().is_some()) => {
                        (new_last_index + literal.len(), last_index)
                    }
                    _ => (0, last_index),
                };
                if start >= end {
                    return false;
                }
                captured.push((name, request[start..end].to_string()));
                pending = None;
                last_literal = None;
            }
        }
        last_index = new_last_index;
    }

    let complete = last_index == 0 || parts.first().is_some_and(|p| p.as_parameter().is_some());
    if complete {
        for (name, value) in captured {
            values.insert(name, value);
        }
    }
    complete
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::parse;

    fn bind(template: &str, path: &str) -> Option<RouteValueDictionary> {
        let pattern = parse(template).expect("template");
        let mut values = RouteValueDictionary::new();
        try_match(&pattern, path, &mut values).then_some(values)
    }

    #[test]
    fn binds_parameters_and_defaults() {
        let values = bind("{controller=Home}/{action=Index}/{id?}", "/Blog").expect("match");
        assert_eq!(values.get_string("controller").as_deref(), Some("Blog"));
        assert_eq!(values.get_string("action").as_deref(), Some("Index"));
        assert!(!values.contains_key("id"));

        let values = bind("{controller=Home}/{action=Index}/{id?}", "/").expect("match");
        assert_eq!(values.get_string("controller").as_deref(), Some("Home"));
    }

    #[test]
    fn literals_are_case_insensitive_and_must_match() {
        assert!(bind("api/users", "/API/Users/").is_some());
        assert!(bind("api/users", "/api/orders").is_none());
        assert!(bind("api/users", "/api/users/1").is_none());
        assert!(bind("api/{id}", "/api").is_none());
    }

    #[test]
    fn catch_all_takes_the_rest() {
        let values = bind("files/{*path}", "/files/a/b%20c/d.txt").expect("match");
        assert_eq!(values.get_string("path").as_deref(), Some("a/b c/d.txt"));
        let values = bind("files/{*path}", "/files").expect("match");
        assert!(!values.contains_key("path"));
    }

    #[test]
    fn complex_segments() {
        let values = bind("{name}.{ext}", "/report.final.pdf").expect("match");
        assert_eq!(values.get_string("name").as_deref(), Some("report.final"));
        assert_eq!(values.get_string("ext").as_deref(), Some("pdf"));

        let values = bind("v{major}-{minor}", "/v1-2").expect("match");
        assert_eq!(values.get_string("major").as_deref(), Some("1"));
        assert_eq!(values.get_string("minor").as_deref(), Some("2"));

        assert!(bind("v{major}-{minor}", "/x1-2").is_none());
        assert!(bind("{name}.{ext}", "/report.").is_none());
    }

    #[test]
    fn optional_extension_may_be_absent() {
        let values = bind("{name}.{ext?}", "/readme").expect("match");
        assert_eq!(values.get_string("name").as_deref(), Some("readme"));
        assert!(!values.contains_key("ext"));

        let values = bind("{name}.{ext?}", "/readme.md").expect("match");
        assert_eq!(values.get_string("ext").as_deref(), Some("md"));

        assert!(bind("{name}.{ext?}", "/readme.").is_none());
    }
}
