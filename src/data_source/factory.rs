//! Action → endpoint expansion.
//!
//! Conventional routes are specialized per action: parameters named after a
//! required route value are replaced by literals, and wherever every
//! remaining segment could be filled from defaults a shorter endpoint is
//! emitted as well. `{controller=Home}/{action=Index}/{id?}` with `Home.Index`
//! produces:
//!
//! | Pattern | Order | Matches | Generates links |
//! |---------|-------|---------|-----------------|
//! | `{controller=Home}/{action=Index}/{id?}` | 1 | no | yes |
//! | `` | 2 | yes | no |
//! | `Home` | 3 | yes | no |
//! | `Home/Index/{id?}` | 4 | yes | no |
//!
//! Attribute routes produce exactly one endpoint.

use super::conventional::ConventionalRouteEntry;
use crate::actions::{ActionConstraintMetadata, ActionDescriptor, FilterDescriptor};
use crate::context::{empty_delegate, RequestDelegate};
use crate::endpoint::{
    ConsumesMetadata, DataTokensMetadata, Endpoint, EndpointConvention, HttpMethodMetadata,
    RouteEndpointBuilder, RouteNameMetadata, RouteValuesAddressMetadata,
    SuppressLinkGenerationMetadata, SuppressMatchingMetadata,
};
use crate::error::Result;
use crate::patterns::{
    parse, render_segments, ParameterPolicy, RoutePatternFactory, RoutePatternPart,
    RoutePatternPathSegment,
};
use crate::route_values::{value_to_string, RouteValueDictionary};
use serde_json::Value;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Builds the delegate an action's endpoints run.
pub type RequestDelegateFactory = Arc<dyn Fn(&ActionDescriptor) -> RequestDelegate + Send + Sync>;

/// Creates endpoints for one action at a time.
#[derive(Clone)]
pub struct ActionEndpointFactory {
    request_delegate_factory: RequestDelegateFactory,
}

/// Link-generation and matching switches for one endpoint.
#[derive(Debug, Clone, Copy, Default)]
struct Suppress {
    link_generation: bool,
    matching: bool,
}

/// Everything shared by the endpoints of one action × one template.
struct EndpointSource<'a> {
    action: &'a Arc<ActionDescriptor>,
    required_values: &'a RouteValueDictionary,
    route_name: Option<&'a str>,
    non_inline_defaults: &'a RouteValueDictionary,
    data_tokens: Option<&'a RouteValueDictionary>,
    conventions: &'a [EndpointConvention],
    route_conventions: &'a [EndpointConvention],
}

impl ActionEndpointFactory {
    #[must_use]
    pub fn new(request_delegate_factory: RequestDelegateFactory) -> Self {
        Self {
            request_delegate_factory,
        }
    }

    /// Append every endpoint `action` yields.
    ///
    /// `required_keys` is the union of route-value keys across all actions;
    /// keys the action does not define are required to be absent.
    /// `route_names` tracks names already attached to an endpoint in this
    /// generation.
    pub fn add_endpoints(
        &self,
        endpoints: &mut Vec<Arc<Endpoint>>,
        route_names: &mut HashSet<String>,
        action: &Arc<ActionDescriptor>,
        routes: &[ConventionalRouteEntry],
        required_keys: &[String],
        conventions: &[EndpointConvention],
    ) -> Result<()> {
        if let Some(info) = &action.attribute_route_info {
            let Some(template) = replace_tokens(&info.template, &action.route_values) else {
                debug!(
                    action = %action.display_name,
                    template = %info.template,
                    "Attribute route token could not be resolved, skipping action"
                );
                return Ok(());
            };
            let pattern = parse(&template)?;
            let empty = RouteValueDictionary::new();
            let source = EndpointSource {
                action,
                required_values: &action.route_values,
                route_name: info.name.as_deref(),
                non_inline_defaults: &empty,
                data_tokens: None,
                conventions,
                route_conventions: &[],
            };
            let suppress = Suppress {
                link_generation: info.suppress_link_generation,
                matching: info.suppress_path_matching,
            };
            let endpoint = self.create_endpoint(
                &source,
                Some(template.clone()),
                pattern.path_segments().to_vec(),
                info.order,
                suppress,
                route_names,
            )?;
            endpoints.push(endpoint);
            return Ok(());
        }

        let mut required = RouteValueDictionary::new();
        for key in required_keys {
            required.insert(key.clone(), action.route_values.get(key).cloned().unwrap_or(Value::Null));
        }

        // Attribute routes default to order 0; conventional endpoints start at 1
        // and keep registration order within the action.
        let mut order = 1;
        for route in routes {
            if !route.is_applicable(&required) {
                continue;
            }
            self.add_conventional(endpoints, route_names, action, route, &required, conventions, &mut order)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn add_conventional(
        &self,
        endpoints: &mut Vec<Arc<Endpoint>>,
        route_names: &mut HashSet<String>,
        action: &Arc<ActionDescriptor>,
        route: &ConventionalRouteEntry,
        required: &RouteValueDictionary,
        conventions: &[EndpointConvention],
        order: &mut i32,
    ) -> Result<()> {
        let resolved = resolve_action_route_values(required, route.merged_defaults());
        let source = EndpointSource {
            action,
            required_values: &resolved,
            route_name: route.route_name.as_deref(),
            non_inline_defaults: &route.non_inline_defaults,
            data_tokens: Some(&route.data_tokens),
            conventions,
            route_conventions: &route.conventions,
        };

        let mut segments = route.pattern.path_segments().to_vec();
        let mut has_link_generation_endpoint = false;
        for i in 0..segments.len() {
            if remaining_segments_use_defaults(i, &resolved, route, &segments) {
                if !has_link_generation_endpoint {
                    let endpoint = self.create_endpoint(
                        &source,
                        None,
                        segments.clone(),
                        next(order),
                        Suppress {
                            link_generation: false,
                            matching: true,
                        },
                        route_names,
                    )?;
                    endpoints.push(endpoint);
                    has_link_generation_endpoint = true;
                }
                let endpoint = self.create_endpoint(
                    &source,
                    None,
                    segments[..i].to_vec(),
                    next(order),
                    Suppress {
                        link_generation: true,
                        matching: false,
                    },
                    route_names,
                )?;
                endpoints.push(endpoint);
            }
            substitute_segment(&mut segments[i], &resolved, route);
        }

        let endpoint = self.create_endpoint(
            &source,
            None,
            segments,
            next(order),
            Suppress {
                link_generation: has_link_generation_endpoint,
                matching: false,
            },
            route_names,
        )?;
        endpoints.push(endpoint);
        Ok(())
    }

    fn create_endpoint(
        &self,
        source: &EndpointSource<'_>,
        raw_text: Option<String>,
        segments: Vec<RoutePatternPathSegment>,
        order: i32,
        suppress: Suppress,
        route_names: &mut HashSet<String>,
    ) -> Result<Arc<Endpoint>> {
        let mut defaults = source.non_inline_defaults.clone();
        ensure_required_values_in_defaults(source.required_values, &mut defaults, &segments);
        let raw_text = raw_text.unwrap_or_else(|| render_segments(&segments));
        let pattern = RoutePatternFactory::pattern(
            Some(raw_text),
            Some(&defaults),
            &[],
            Some(source.required_values),
            segments,
        )?;

        let delegate = (self.request_delegate_factory)(source.action.as_ref());
        let mut builder = RouteEndpointBuilder::new(delegate, pattern, order);
        builder.display_name = Some(source.action.display_name.clone());
        add_action_metadata(&mut builder, source, suppress, route_names);

        for convention in source.conventions.iter().chain(source.route_conventions) {
            convention(&mut builder);
        }
        Ok(Arc::new(builder.build()))
    }
}

impl Default for ActionEndpointFactory {
    fn default() -> Self {
        Self::new(Arc::new(|_: &ActionDescriptor| empty_delegate()))
    }
}

impl fmt::Debug for ActionEndpointFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionEndpointFactory").finish_non_exhaustive()
    }
}

fn next(order: &mut i32) -> i32 {
    let current = *order;
    *order += 1;
    current
}

/// Metadata in ascending precedence: action metadata, the action itself,
/// data tokens, the link-generation address, filters, hoisted constraints,
/// suppression markers, the route name.
fn add_action_metadata(
    builder: &mut RouteEndpointBuilder,
    source: &EndpointSource<'_>,
    suppress: Suppress,
    route_names: &mut HashSet<String>,
) {
    let action = source.action;
    for item in &action.endpoint_metadata {
        builder.add_shared_metadata(Arc::clone(item));
    }
    builder.add_shared_metadata(Arc::clone(action) as Arc<dyn Any + Send + Sync>);

    if let Some(tokens) = source.data_tokens.filter(|t| !t.is_empty()) {
        builder.add_metadata(DataTokensMetadata {
            data_tokens: tokens.clone(),
        });
    }
    builder.add_metadata(RouteValuesAddressMetadata {
        route_name: source.route_name.map(str::to_string),
        required_values: source.required_values.clone(),
    });

    let mut filters: Vec<FilterDescriptor> = action.filter_descriptors.clone();
    FilterDescriptor::sort(&mut filters);
    for filter in filters {
        builder.add_metadata(filter);
    }

    for constraint in &action.action_constraints {
        match constraint {
            ActionConstraintMetadata::HttpMethod(c) => {
                if !has_metadata::<HttpMethodMetadata>(builder) {
                    builder.add_metadata(HttpMethodMetadata::new(c.http_methods.iter().cloned()));
                }
            }
            ActionConstraintMetadata::Consumes(c) => {
                if !has_metadata::<ConsumesMetadata>(builder) {
                    builder.add_metadata(ConsumesMetadata::new(c.content_types.iter().cloned()));
                }
            }
            other => {
                builder.add_metadata(other.clone());
            }
        }
    }

    if suppress.link_generation {
        builder.add_metadata(SuppressLinkGenerationMetadata);
    }
    if suppress.matching {
        builder.add_metadata(SuppressMatchingMetadata);
    }

    // A name addresses one link-generating endpoint; conventional routes
    // reuse their name across actions, so only the first gets the marker.
    if let Some(name) = source.route_name {
        if !suppress.link_generation && route_names.insert(name.to_ascii_lowercase()) {
            builder.add_metadata(RouteNameMetadata {
                route_name: name.to_string(),
            });
        }
    }
}

fn has_metadata<T: Any + Send + Sync>(builder: &RouteEndpointBuilder) -> bool {
    builder.metadata.iter().any(|m| m.is::<T>())
}

/// Adopt the casing of a string default that equals an action value
/// case-insensitively, so `HOME` against `{controller=Home}` yields `Home`.
/// Non-string defaults are left alone.
fn resolve_action_route_values(
    required: &RouteValueDictionary,
    defaults: &RouteValueDictionary,
) -> RouteValueDictionary {
    let mut resolved = required.clone();
    for (key, value) in required.iter() {
        let (Value::String(action_value), Some(Value::String(default))) = (value, defaults.get(key))
        else {
            continue;
        };
        if action_value != default && action_value.eq_ignore_ascii_case(default) {
            resolved.insert(key, default.clone());
        }
    }
    resolved
}

/// Required values become defaults, unless a parameter that survives in the
/// segments declares a different inline default.
fn ensure_required_values_in_defaults(
    required: &RouteValueDictionary,
    defaults: &mut RouteValueDictionary,
    segments: &[RoutePatternPathSegment],
) {
    for (key, value) in required.iter() {
        if value.is_null() {
            continue;
        }
        let conflicting = segments
            .iter()
            .flat_map(|s| s.parts.iter())
            .filter_map(RoutePatternPart::as_parameter)
            .filter(|p| p.name.eq_ignore_ascii_case(key))
            .any(|p| {
                p.default
                    .as_ref()
                    .is_some_and(|d| !RouteValueDictionary::values_equal(Some(d), Some(value)))
            });
        if !conflicting {
            defaults.insert(key, value.clone());
        }
    }
}

/// Whether segments `from..` can all be omitted, with at least one of them
/// omitted because a required value equals its default. A trailing
/// `.{ext?}` counts as omittable.
fn remaining_segments_use_defaults(
    from: usize,
    required: &RouteValueDictionary,
    route: &ConventionalRouteEntry,
    segments: &[RoutePatternPathSegment],
) -> bool {
    let mut used_default = false;
    for segment in &segments[from..] {
        for (j, part) in segment.parts.iter().enumerate() {
            match part {
                RoutePatternPart::Parameter(p) if p.is_optional() || p.is_catch_all() => {}
                RoutePatternPart::Parameter(p) => {
                    let action_value = required.get(&p.name).filter(|v| !v.is_null());
                    let default = route.merged_defaults().get(&p.name);
                    match (action_value, default) {
                        (Some(value), Some(default))
                            if RouteValueDictionary::values_equal(Some(value), Some(default)) =>
                        {
                            used_default = true;
                        }
                        _ => return false,
                    }
                }
                RoutePatternPart::Separator(text) if text == "." => {
                    let extension = segment.parts.get(j + 1).and_then(RoutePatternPart::as_parameter);
                    let is_last = j + 2 == segment.parts.len();
                    if !(is_last && extension.is_some_and(|e| e.is_optional())) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }
    used_default
}

/// Replace parameters that carry a required value with literals, running
/// the parameter's first outbound transformer.
fn substitute_segment(
    segment: &mut RoutePatternPathSegment,
    required: &RouteValueDictionary,
    route: &ConventionalRouteEntry,
) {
    for part in &mut segment.parts {
        let RoutePatternPart::Parameter(parameter) = part else {
            continue;
        };
        // A null value is a known key the action leaves empty; keep the parameter.
        let Some(value) = required.get(&parameter.name).and_then(value_to_string) else {
            continue;
        };
        let literal = route
            .policies_for(&parameter.name)
            .find_map(ParameterPolicy::as_transformer)
            .map_or_else(
                || value.to_string(),
                |t| t.transform_outbound(Some(&*value)).unwrap_or_else(|| value.to_string()),
            );
        *part = RoutePatternPart::Literal(literal);
    }
}

/// Expand `[area]`, `[controller]`, `[action]` (any route value key) in an
/// attribute template. `[[` and `]]` escape brackets. `None` when a token
/// names a missing value or the brackets are unbalanced.
pub fn replace_tokens(template: &str, values: &RouteValueDictionary) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' if chars.peek() == Some(&'[') => {
                chars.next();
                out.push('[');
            }
            ']' if chars.peek() == Some(&']') => {
                chars.next();
                out.push(']');
            }
            '[' => {
                let mut token = String::new();
                loop {
                    match chars.next()? {
                        ']' => break,
                        '[' => return None,
                        other => token.push(other),
                    }
                }
                let value = values.get_string(token.trim()).filter(|v| !v.is_empty())?;
                out.push_str(&value);
            }
            ']' => return None,
            other => out.push(other),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{filter_scope, FilterMetadata};
    use crate::patterns::{DefaultParameterPolicyFactory, OutboundParameterTransformer, ParameterPolicyReference};
    use http::Method;

    fn route(template: &str) -> ConventionalRouteEntry {
        ConventionalRouteEntry::new(
            Some("default"),
            template,
            None,
            &[],
            None,
            &DefaultParameterPolicyFactory::new(),
        )
        .expect("route")
    }

    fn build(action: ActionDescriptor, routes: &[ConventionalRouteEntry]) -> Vec<Arc<Endpoint>> {
        let factory = ActionEndpointFactory::default();
        let mut endpoints = Vec::new();
        let mut names = HashSet::new();
        let keys: Vec<String> = ["area", "controller", "action"].iter().map(|s| s.to_string()).collect();
        factory
            .add_endpoints(&mut endpoints, &mut names, &Arc::new(action), routes, &keys, &[])
            .expect("endpoints");
        endpoints
    }

    fn summary(endpoints: &[Arc<Endpoint>]) -> Vec<(String, i32, bool, bool)> {
        endpoints
            .iter()
            .map(|e| {
                let pattern = e.route_pattern().map(|p| p.raw_text()).unwrap_or_default();
                (
                    pattern,
                    e.order(),
                    e.metadata().contains::<SuppressMatchingMetadata>(),
                    e.metadata().contains::<SuppressLinkGenerationMetadata>(),
                )
            })
            .collect()
    }

    #[test]
    fn optional_trailing_segments_collapse() {
        let endpoints = build(
            ActionDescriptor::new("Home", "Index"),
            &[route("{controller=Home}/{action=Index}/{id?}")],
        );
        assert_eq!(
            summary(&endpoints),
            vec![
                ("{controller=Home}/{action=Index}/{id?}".to_string(), 1, true, false),
                (String::new(), 2, false, true),
                ("Home".to_string(), 3, false, true),
                ("Home/Index/{id?}".to_string(), 4, false, true),
            ]
        );

        let root = &endpoints[1];
        let pattern = root.route_pattern().expect("pattern");
        assert_eq!(pattern.defaults().get_string("controller").as_deref(), Some("Home"));
        assert_eq!(pattern.defaults().get_string("action").as_deref(), Some("Index"));
    }

    #[test]
    fn non_default_actions_get_a_single_endpoint() {
        let endpoints = build(
            ActionDescriptor::new("Products", "List"),
            &[route("{controller=Home}/{action=Index}/{id?}")],
        );
        assert_eq!(
            summary(&endpoints),
            vec![("Products/List/{id?}".to_string(), 1, false, false)]
        );
    }

    #[test]
    fn default_action_on_other_controller_collapses_once() {
        let endpoints = build(
            ActionDescriptor::new("Products", "Index"),
            &[route("{controller=Home}/{action=Index}/{id?}")],
        );
        let patterns: Vec<_> = summary(&endpoints).into_iter().map(|s| s.0).collect();
        assert_eq!(
            patterns,
            vec!["Products/{action=Index}/{id?}", "Products", "Products/Index/{id?}"]
        );
    }

    #[test]
    fn casing_follows_template_defaults() {
        let endpoints = build(
            ActionDescriptor::new("HOME", "index"),
            &[route("{controller=Home}/{action=Index}")],
        );
        let patterns: Vec<_> = summary(&endpoints).into_iter().map(|s| s.0).collect();
        assert_eq!(patterns.last().map(String::as_str), Some("Home/Index"));
    }

    #[test]
    fn optional_extension_counts_as_omittable() {
        let endpoints = build(
            ActionDescriptor::new("Home", "Index"),
            &[route("{controller}/{action=Index}.{ext?}")],
        );
        let patterns: Vec<_> = summary(&endpoints).into_iter().map(|s| s.0).collect();
        assert_eq!(patterns, vec!["Home/{action=Index}.{ext?}", "Home", "Home/Index.{ext?}"]);
    }

    #[test]
    fn inapplicable_routes_are_skipped() {
        let endpoints = build(
            ActionDescriptor::new("Home", "Index").with_area("Admin"),
            &[route("{controller}/{action}")],
        );
        assert!(endpoints.is_empty());
    }

    #[test]
    fn order_continues_across_routes_for_one_action() {
        let endpoints = build(
            ActionDescriptor::new("Blog", "Post"),
            &[route("blog/{controller}/{action}"), route("{controller}/{action}")],
        );
        assert_eq!(
            summary(&endpoints),
            vec![
                ("blog/Blog/Post".to_string(), 1, false, false),
                ("Blog/Post".to_string(), 2, false, false),
            ]
        );
    }

    #[test]
    fn transformer_rewrites_substituted_literals() {
        struct Kebab;
        impl OutboundParameterTransformer for Kebab {
            fn transform_outbound(&self, value: Option<&str>) -> Option<String> {
                value.map(|v| {
                    let mut out = String::new();
                    for (i, c) in v.chars().enumerate() {
                        if c.is_ascii_uppercase() && i > 0 {
                            out.push('-');
                        }
                        out.push(c.to_ascii_lowercase());
                    }
                    out
                })
            }
        }
        let policies = vec![(
            "action".to_string(),
            vec![ParameterPolicyReference::Policy(ParameterPolicy::transformer(Kebab))],
        )];
        let route = ConventionalRouteEntry::new(
            None,
            "{controller}/{action}",
            None,
            &policies,
            None,
            &DefaultParameterPolicyFactory::new(),
        )
        .expect("route");
        let endpoints = build(ActionDescriptor::new("Home", "ShowDetails"), &[route]);
        let patterns: Vec<_> = summary(&endpoints).into_iter().map(|s| s.0).collect();
        assert_eq!(patterns, vec!["Home/show-details"]);
    }

    #[test]
    fn attribute_routes_replace_tokens() {
        let action = ActionDescriptor::new("Products", "Get")
            .with_area("Store")
            .with_attribute_route("[area]/api/[controller]/{id:int}");
        let endpoints = build(action, &[route("{controller}/{action}")]);
        assert_eq!(
            summary(&endpoints),
            vec![("Store/api/Products/{id:int}".to_string(), 0, false, false)]
        );
        let address = endpoints[0]
            .metadata()
            .get_metadata::<RouteValuesAddressMetadata>()
            .expect("address");
        assert_eq!(address.required_values.get_string("action").as_deref(), Some("Get"));
    }

    #[test]
    fn unresolvable_tokens_skip_the_action() {
        let action = ActionDescriptor::new("Products", "Get").with_attribute_route("[area]/items");
        assert!(build(action, &[]).is_empty());
        assert_eq!(replace_tokens("[[literal]]/[controller]", &RouteValueDictionary::from([("controller", "Home")])).as_deref(), Some("[literal]/Home"));
        assert_eq!(replace_tokens("[controller", &RouteValueDictionary::new()), None);
    }

    #[test]
    fn metadata_is_layered_in_precedence_order() {
        struct Audit;
        impl FilterMetadata for Audit {}

        #[derive(Debug, PartialEq)]
        struct Tag(&'static str);

        let action = ActionDescriptor::new("Home", "Save")
            .with_metadata(Tag("action"))
            .with_metadata(HttpMethodMetadata::new([Method::PUT]))
            .with_constraint(ActionConstraintMetadata::http_methods([Method::POST]))
            .with_constraint(ActionConstraintMetadata::consumes(["application/json"]))
            .with_filter(Arc::new(Audit), filter_scope::ACTION);

        let convention: EndpointConvention = Arc::new(|builder: &mut RouteEndpointBuilder| {
            builder.add_metadata(Tag("convention"));
        });
        let factory = ActionEndpointFactory::default();
        let mut endpoints = Vec::new();
        let keys = vec!["controller".to_string(), "action".to_string()];
        factory
            .add_endpoints(
                &mut endpoints,
                &mut HashSet::new(),
                &Arc::new(action),
                &[route("{controller}/{action}")],
                &keys,
                &[convention],
            )
            .expect("endpoints");

        let metadata = endpoints[0].metadata();
        assert_eq!(metadata.get_metadata::<Tag>(), Some(&Tag("convention")));
        // Action-level method metadata already present: the constraint is not hoisted over it.
        assert_eq!(
            metadata.get_metadata::<HttpMethodMetadata>().map(|m| m.http_methods.clone()),
            Some(vec![Method::PUT])
        );
        assert!(metadata.get_metadata::<ConsumesMetadata>().is_some());
        assert!(metadata.get_metadata::<ActionDescriptor>().is_some());
        assert!(metadata.get_metadata::<FilterDescriptor>().is_some());
        assert_eq!(
            metadata.get_metadata::<RouteNameMetadata>().map(|m| m.route_name.as_str()),
            Some("default")
        );
    }
}
