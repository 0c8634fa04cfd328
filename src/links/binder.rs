//! Route-value resolution and URL rendering for one route pattern.

use crate::error::Result;
use crate::patterns::{
    resolve_policies, OutboundParameterTransformer, ParameterPolicy, ParameterPolicyFactory,
    RouteConstraint, RouteDirection, RoutePattern, RoutePatternPart,
};
use crate::route_values::{value_to_string, RouteValueDictionary};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Values chosen by [`TemplateBinder::get_values`].
#[derive(Debug, Clone, Default)]
pub struct TemplateValuesResult {
    /// Values that end up in the URL, as path segments or query string.
    pub accepted_values: RouteValueDictionary,
    /// Accepted values plus non-parameter ambient values; what constraints see.
    pub combined_values: RouteValueDictionary,
}

/// A supplied value, with "supplied but empty" kept apart from "not supplied".
#[derive(Debug, Clone)]
enum Slot {
    Missing,
    Empty,
    Value(Value),
}

impl Slot {
    fn explicit(value: Option<&Value>) -> Self {
        match value {
            None => Slot::Missing,
            Some(v) if value_to_string(v).is_none_or(|s| s.is_empty()) => Slot::Empty,
            Some(v) => Slot::Value(v.clone()),
        }
    }

    fn is_supplied(&self) -> bool {
        !matches!(self, Slot::Missing)
    }

    fn as_value(&self) -> Option<&Value> {
        match self {
            Slot::Value(v) => Some(v),
            Slot::Missing | Slot::Empty => None,
        }
    }
}

/// Generates URLs from one [`RoutePattern`].
///
/// Generation runs in two steps. [`get_values`](Self::get_values) decides
/// which explicit, ambient and default values apply; after the caller checks
/// [`try_process_constraints`](Self::try_process_constraints),
/// [`bind_values`](Self::bind_values) renders the path and query string.
///
/// Ambient values (the current request's route values) are copied left to
/// right until the first parameter whose explicit value differs from the
/// ambient one, so linking from `/Products/Details/5` with `action=List`
/// yields `/Products/List` and drops `id`.
pub struct TemplateBinder {
    pattern: Arc<RoutePattern>,
    /// Defaults that are not parameters: explicit values must match them.
    filters: Vec<(String, Value)>,
    constraints: Vec<(String, Arc<dyn RouteConstraint>)>,
    transformers: Vec<(String, Arc<dyn OutboundParameterTransformer>)>,
}

impl TemplateBinder {
    /// Resolves the pattern's policies; an unknown constraint is an error.
    pub fn new(pattern: Arc<RoutePattern>, policy_factory: &dyn ParameterPolicyFactory) -> Result<Self> {
        let mut constraints: Vec<(String, Arc<dyn RouteConstraint>)> = Vec::new();
        let mut transformers: Vec<(String, Arc<dyn OutboundParameterTransformer>)> = Vec::new();
        for (name, policies) in resolve_policies(&pattern, policy_factory)? {
            for policy in policies {
                match policy {
                    ParameterPolicy::Constraint(c) => constraints.push((name.clone(), c)),
                    ParameterPolicy::Transformer(t) => {
                        // First transformer wins.
                        if !transformers.iter().any(|(n, _)| n.eq_ignore_ascii_case(&name)) {
                            transformers.push((name.clone(), t));
                        }
                    }
                }
            }
        }

        let filters = pattern
            .defaults()
            .iter()
            .filter(|(key, _)| pattern.get_parameter(key).is_none())
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();

        Ok(Self {
            pattern,
            filters,
            constraints,
            transformers,
        })
    }

    #[must_use]
    pub fn pattern(&self) -> &Arc<RoutePattern> {
        &self.pattern
    }

    fn defaults(&self) -> &RouteValueDictionary {
        self.pattern.defaults()
    }

    /// Choose the values used to generate a URL, or `None` when a required
    /// parameter has no value or an explicit value contradicts a filter.
    #[must_use]
    pub fn get_values(
        &self,
        ambient: Option<&RouteValueDictionary>,
        values: &RouteValueDictionary,
    ) -> Option<TemplateValuesResult> {
        let ambient_of = |key: &str| ambient.and_then(|a| a.get(key));

        // Ambient values are usable only if the ambient request agrees with
        // every required value that is not a parameter.
        let mut copy_ambient = ambient.is_some();
        if copy_ambient {
            for (key, required) in self.pattern.required_values().iter() {
                if self.pattern.get_parameter(key).is_some() {
                    continue;
                }
                let ambient_value = ambient_of(key);
                if !RouteValueDictionary::values_equal(ambient_value, Some(required)) {
                    copy_ambient = false;
                    break;
                }
                if let Some(value) = values.get(key) {
                    if !RouteValueDictionary::values_equal(Some(value), ambient_value) {
                        copy_ambient = false;
                        break;
                    }
                }
            }
        }

        let mut accepted = RouteValueDictionary::new();
        for parameter in self.pattern.parameters() {
            let key = parameter.name.as_str();
            let mut slot = Slot::explicit(values.get(key));
            let mut ambient_value = None;

            if copy_ambient {
                ambient_value = ambient_of(key);
                if slot.is_supplied()
                    && ambient_value.is_some()
                    && !RouteValueDictionary::values_equal(ambient_value, slot.as_value())
                {
                    copy_ambient = false;
                }
                if !slot.is_supplied() && ambient_value.is_none() && !self.defaults().contains_key(key) {
                    copy_ambient = false;
                }
            }

            // An ambient value equal to a required value is used even when
            // ambient copying has stopped.
            if !copy_ambient && !slot.is_supplied() {
                if let (Some(required), Some(current)) =
                    (self.pattern.required_values().get(key), ambient_of(key))
                {
                    if RouteValueDictionary::values_equal(Some(required), Some(current)) {
                        slot = Slot::explicit(Some(current));
                    }
                }
            }

            match slot {
                Slot::Value(value) => {
                    accepted.insert(key, value);
                }
                _ if copy_ambient && ambient_value.is_some() => {
                    accepted.insert(key, ambient_value.cloned().unwrap_or(Value::Null));
                }
                _ if parameter.is_optional() || parameter.is_catch_all() => {}
                _ => match self.defaults().get(key) {
                    Some(default) => {
                        accepted.insert(key, default.clone());
                    }
                    None => return None,
                },
            }
        }

        for (key, default) in &self.filters {
            let slot = Slot::explicit(values.get(key));
            if !slot.is_supplied() {
                continue;
            }
            if !RouteValueDictionary::values_equal(slot.as_value(), Some(default)) {
                return None;
            }
            accepted.insert(key.as_str(), slot.as_value().cloned().unwrap_or(Value::Null));
        }

        for (key, value) in values.iter() {
            if !self.defaults().contains_key(key) {
                accepted.try_add(key, value.clone());
            }
        }

        let mut combined = accepted.clone();
        if let Some(ambient) = ambient {
            for (key, value) in ambient.iter() {
                let non_empty = value_to_string(value).is_some_and(|v| !v.is_empty());
                if non_empty && self.pattern.get_parameter(key).is_none() && !accepted.contains_key(key) {
                    combined.try_add(key, value.clone());
                }
            }
        }

        Some(TemplateValuesResult {
            accepted_values: accepted,
            combined_values: combined,
        })
    }

    /// Whether every route constraint accepts `combined` for link generation.
    #[must_use]
    pub fn try_process_constraints(&self, combined: &RouteValueDictionary) -> bool {
        for (parameter, constraint) in &self.constraints {
            if !constraint.matches(parameter, combined, RouteDirection::UrlGeneration) {
                debug!(
                    route_pattern = %self.pattern,
                    parameter = %parameter,
                    constraint = constraint.name(),
                    "Route constraint rejected link generation"
                );
                return false;
            }
        }
        true
    }

    /// Render path and query string from accepted values.
    ///
    /// Trailing segments whose value equals the default are left out, extra
    /// values become a query string, and `None` means the values cannot form
    /// a URL (for example a value after an empty segment).
    #[must_use]
    pub fn bind_values(&self, accepted: &RouteValueDictionary) -> Option<String> {
        let mut accepted = accepted.clone();
        for (name, transformer) in &self.transformers {
            if !accepted.contains_key(name) {
                continue;
            }
            let current = accepted.get_string(name).map(|v| v.into_owned());
            let transformed = transformer
                .transform_outbound(current.as_deref())
                .map_or(Value::Null, Value::String);
            accepted.insert(name.as_str(), transformed);
        }

        let mut uri = UriWriter::default();
        for segment in self.pattern.path_segments() {
            for (j, part) in segment.parts.iter().enumerate() {
                match part {
                    RoutePatternPart::Literal(text) | RoutePatternPart::Separator(text) => {
                        if !uri.accept(text, true) {
                            return None;
                        }
                    }
                    RoutePatternPart::Parameter(parameter) => {
                        let value = accepted.remove(&parameter.name);
                        let same_as_default = self
                            .defaults()
                            .get(&parameter.name)
                            .is_some_and(|d| RouteValueDictionary::values_equal(value.as_ref(), Some(d)));
                        let text = value
                            .as_ref()
                            .and_then(value_to_string)
                            .map(|v| v.into_owned())
                            .unwrap_or_default();

                        if same_as_default {
                            if !uri.buffer(&text) {
                                return None;
                            }
                        } else if !uri.accept(&text, parameter.encode_slashes) {
                            // `{name}.{ext?}` without ext: drop the dangling separator.
                            let after_separator =
                                j > 0 && matches!(segment.parts[j - 1], RoutePatternPart::Separator(_));
                            if parameter.is_optional() && after_separator {
                                uri.remove_last_value();
                            } else {
                                return None;
                            }
                        }
                    }
                }
            }
            uri.end_segment();
        }

        let mut path = uri.finish();
        let defaults = self.defaults();
        let mut first = true;
        for (key, value) in accepted.iter() {
            if defaults.contains_key(key) {
                continue;
            }
            match value {
                Value::Array(items) => {
                    for item in items {
                        push_query(&mut path, key, item, &mut first);
                    }
                }
                other => push_query(&mut path, key, other, &mut first),
            }
        }
        Some(path)
    }
}

impl fmt::Debug for TemplateBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateBinder")
            .field("pattern", &self.pattern.raw_text())
            .field("filters", &self.filters)
            .field("constraints", &self.constraints.len())
            .field("transformers", &self.transformers.len())
            .finish()
    }
}

fn push_query(out: &mut String, key: &str, value: &Value, first: &mut bool) {
    let Some(text) = value_to_string(value).filter(|t| !t.is_empty()) else {
        return;
    };
    out.push(if *first { '?' } else { '&' });
    *first = false;
    out.push_str(&urlencoding::encode(key));
    out.push('=');
    out.push_str(&urlencoding::encode(&text));
}

fn encode_into(out: &mut String, text: &str, encode_slashes: bool) {
    if encode_slashes {
        out.push_str(&urlencoding::encode(text));
        return;
    }
    for (i, piece) in text.split('/').enumerate() {
        if i > 0 {
            out.push('/');
        }
        out.push_str(&urlencoding::encode(piece));
    }
}

/// Path writer that holds back default-valued segments until something
/// non-default follows them, so trailing defaults are dropped.
#[derive(Debug, Default)]
struct UriWriter {
    uri: String,
    /// Pending text and whether it still needs encoding.
    pending: Vec<(String, bool)>,
    uri_inside_segment: bool,
    pending_inside_segment: bool,
    /// An empty value was written; nothing may follow it.
    has_empty_segment: bool,
    last_value_offset: Option<usize>,
}

impl UriWriter {
    fn accept(&mut self, value: &str, encode_slashes: bool) -> bool {
        if value.is_empty() {
            if self.uri_inside_segment || self.pending_inside_segment {
                return false;
            }
            self.has_empty_segment = true;
            return true;
        }
        if self.has_empty_segment {
            return false;
        }

        for (text, needs_encoding) in self.pending.drain(..) {
            if needs_encoding {
                encode_into(&mut self.uri, &text, true);
            } else {
                self.uri.push_str(&text);
            }
        }

        if !self.uri_inside_segment && !self.pending_inside_segment && !self.uri.is_empty() {
            self.uri.push('/');
        }
        self.uri_inside_segment = true;
        self.pending_inside_segment = true;
        self.last_value_offset = Some(self.uri.len());

        // A leading slash on the first value is kept as the path's own slash.
        match value.strip_prefix('/') {
            Some(rest) if self.uri.is_empty() => {
                self.uri.push('/');
                encode_into(&mut self.uri, rest, encode_slashes);
            }
            _ => encode_into(&mut self.uri, value, encode_slashes),
        }
        true
    }

    fn buffer(&mut self, value: &str) -> bool {
        if value.is_empty() {
            if self.pending_inside_segment {
                return false;
            }
            self.has_empty_segment = true;
            return true;
        }
        if self.has_empty_segment {
            return false;
        }
        if self.uri_inside_segment {
            return self.accept(value, true);
        }
        if !self.pending_inside_segment {
            if !self.uri.is_empty() || !self.pending.is_empty() {
                self.pending.push(("/".to_string(), false));
            }
            self.pending_inside_segment = true;
        }
        self.pending.push((value.to_string(), true));
        true
    }

    fn remove_last_value(&mut self) {
        if let Some(offset) = self.last_value_offset.take() {
            self.uri.truncate(offset);
        }
    }

    fn end_segment(&mut self) {
        self.uri_inside_segment = false;
        self.pending_inside_segment = false;
    }

    /// The path with a leading `/`; pending defaults are dropped.
    fn finish(self) -> String {
        if self.uri.starts_with('/') {
            self.uri
        } else {
            format!("/{}", self.uri)
        }
    }
}
