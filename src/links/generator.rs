use super::binder::TemplateBinder;
use crate::config::RouteOptions;
use crate::context::HttpContext;
use crate::data_source::EndpointDataSource;
use crate::endpoint::{Endpoint, RouteValuesAddressMetadata, SuppressLinkGenerationMetadata};
use crate::error::Result;
use crate::patterns::{ParameterPolicyFactory, Precedence};
use crate::route_values::{value_to_string, RouteValueDictionary};
use arc_swap::ArcSwapOption;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a link should point at: a route name, or the route values an
/// endpoint requires, plus the values used to fill its template.
#[derive(Debug, Clone, Default)]
pub struct RouteValuesAddress {
    pub route_name: Option<String>,
    pub explicit_values: RouteValueDictionary,
    /// Route values of the current request.
    pub ambient_values: Option<RouteValueDictionary>,
}

impl RouteValuesAddress {
    #[must_use]
    pub fn new(route_name: Option<&str>, explicit_values: RouteValueDictionary) -> Self {
        Self {
            route_name: route_name.map(str::to_string),
            explicit_values,
            ambient_values: None,
        }
    }

    #[must_use]
    pub fn with_ambient_values(mut self, ambient_values: RouteValueDictionary) -> Self {
        self.ambient_values = Some(ambient_values);
        self
    }
}

/// One endpoint that can generate links.
struct OutboundEntry {
    endpoint: Arc<Endpoint>,
    binder: TemplateBinder,
    route_name: Option<String>,
    required_values: RouteValueDictionary,
    order: i32,
    precedence: Precedence,
}

/// Binders for one endpoint generation, sorted by order then outbound
/// precedence (most specific first).
struct OutboundCache {
    endpoints: Arc<Vec<Arc<Endpoint>>>,
    entries: Vec<OutboundEntry>,
}

/// Generates paths and absolute URIs from route values.
///
/// Only endpoints carrying [`RouteValuesAddressMetadata`] and no
/// [`SuppressLinkGenerationMetadata`] take part. Binders are cached per
/// endpoint generation and rebuilt when the data source publishes a new list.
pub struct LinkGenerator {
    data_source: Arc<dyn EndpointDataSource>,
    policy_factory: Arc<dyn ParameterPolicyFactory>,
    options: RouteOptions,
    cache: ArcSwapOption<OutboundCache>,
}

impl LinkGenerator {
    /// Build a generator over `data_source` and warm its binder cache.
    ///
    /// Fails when the data source cannot build its first endpoint list.
    pub fn new(
        data_source: Arc<dyn EndpointDataSource>,
        policy_factory: Arc<dyn ParameterPolicyFactory>,
        options: RouteOptions,
    ) -> Result<Self> {
        let endpoints = data_source.try_endpoints()?;
        let generator = Self {
            data_source,
            policy_factory,
            options,
            cache: ArcSwapOption::empty(),
        };
        generator
            .cache
            .store(Some(Arc::new(generator.build_cache(endpoints))));
        Ok(generator)
    }

    #[must_use]
    pub fn options(&self) -> RouteOptions {
        self.options
    }

    fn cache(&self) -> Arc<OutboundCache> {
        let endpoints = self.data_source.endpoints();
        if let Some(cache) = self.cache.load_full() {
            if Arc::ptr_eq(&cache.endpoints, &endpoints) {
                return cache;
            }
        }
        let cache = Arc::new(self.build_cache(endpoints));
        self.cache.store(Some(Arc::clone(&cache)));
        cache
    }

    fn build_cache(&self, endpoints: Arc<Vec<Arc<Endpoint>>>) -> OutboundCache {
        let mut entries = Vec::new();
        for endpoint in endpoints.iter() {
            let metadata = endpoint.metadata();
            if metadata.contains::<SuppressLinkGenerationMetadata>() {
                continue;
            }
            let (Some(pattern), Some(address)) = (
                endpoint.route_pattern(),
                metadata.get_metadata::<RouteValuesAddressMetadata>(),
            ) else {
                continue;
            };
            let binder = match TemplateBinder::new(Arc::clone(pattern), self.policy_factory.as_ref()) {
                Ok(binder) => binder,
                Err(err) => {
                    warn!(
                        endpoint = %endpoint.display_name(),
                        error = %err,
                        "Endpoint excluded from link generation"
                    );
                    continue;
                }
            };
            entries.push(OutboundEntry {
                endpoint: Arc::clone(endpoint),
                binder,
                route_name: address.route_name.clone(),
                required_values: address.required_values.clone(),
                order: endpoint.order(),
                precedence: pattern.outbound_precedence(),
            });
        }
        entries.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| b.precedence.cmp(&a.precedence)));
        debug!(
            endpoints = endpoints.len(),
            link_endpoints = entries.len(),
            "Link generation cache rebuilt"
        );
        OutboundCache { endpoints, entries }
    }

    /// Candidate endpoints for `address`, in the order they are tried.
    #[must_use]
    pub fn find_endpoints(&self, address: &RouteValuesAddress) -> Vec<Arc<Endpoint>> {
        let cache = self.cache();
        candidates(&cache, address)
            .into_iter()
            .map(|e| Arc::clone(&e.endpoint))
            .collect()
    }

    /// Path for `address`, prefixed with `path_base`. `None` when no endpoint
    /// can be reached with the supplied and ambient values.
    #[must_use]
    pub fn get_path_by_address(
        &self,
        address: &RouteValuesAddress,
        path_base: &str,
        fragment: Option<&str>,
        options: Option<RouteOptions>,
    ) -> Option<String> {
        let path = self.generate(address)?;
        Some(format_path(&path, path_base, fragment, options.unwrap_or(self.options)))
    }

    /// Absolute URI for `address`. `None` when the host is empty or no
    /// endpoint matches.
    #[must_use]
    pub fn get_uri_by_address(
        &self,
        address: &RouteValuesAddress,
        scheme: &str,
        host: &str,
        path_base: &str,
        fragment: Option<&str>,
        options: Option<RouteOptions>,
    ) -> Option<String> {
        if host.is_empty() {
            return None;
        }
        let path = self.get_path_by_address(address, path_base, fragment, options)?;
        Some(format!("{scheme}://{host}{path}"))
    }

    /// Path using the request's route values as ambient values and its path
    /// base as prefix.
    #[must_use]
    pub fn get_path_by_context(
        &self,
        context: &HttpContext,
        route_name: Option<&str>,
        values: &RouteValueDictionary,
        fragment: Option<&str>,
    ) -> Option<String> {
        let address = RouteValuesAddress::new(route_name, values.clone())
            .with_ambient_values(context.route_values.clone());
        self.get_path_by_address(&address, &context.request.path_base, fragment, None)
    }

    /// First endpoint whose binder accepts the values wins.
    fn generate(&self, address: &RouteValuesAddress) -> Option<String> {
        let cache = self.cache();
        let ambient = address.ambient_values.as_ref();
        for entry in candidates(&cache, address) {
            let Some(result) = entry.binder.get_values(ambient, &address.explicit_values) else {
                continue;
            };
            if !entry.binder.try_process_constraints(&result.combined_values) {
                continue;
            }
            if let Some(path) = entry.binder.bind_values(&result.accepted_values) {
                debug!(
                    route_name = ?address.route_name,
                    endpoint = %entry.endpoint.display_name(),
                    route_pattern = %entry.binder.pattern(),
                    path = %path,
                    "Link generated"
                );
                return Some(path);
            }
        }
        debug!(
            route_name = ?address.route_name,
            values = ?address.explicit_values,
            "No endpoint could generate a link"
        );
        None
    }
}

impl fmt::Debug for LinkGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkGenerator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn candidates<'a>(cache: &'a OutboundCache, address: &RouteValuesAddress) -> Vec<&'a OutboundEntry> {
    let ambient = address.ambient_values.as_ref();
    if let Some(name) = &address.route_name {
        // Every endpoint carrying the name is a candidate; the ones whose
        // required values the supplied values reach are tried first.
        let mut named: Vec<(u8, &OutboundEntry)> = cache
            .entries
            .iter()
            .filter(|e| e.route_name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
            .map(|e| {
                let rank = match match_required(&e.required_values, &address.explicit_values, ambient) {
                    Some(false) => 0,
                    Some(true) => 1,
                    None => 2,
                };
                (rank, e)
            })
            .collect();
        named.sort_by_key(|(rank, _)| *rank);
        return named.into_iter().map(|(_, e)| e).collect();
    }

    let mut matched: Vec<(bool, &OutboundEntry)> = cache
        .entries
        .iter()
        .filter_map(|e| {
            match_required(&e.required_values, &address.explicit_values, ambient).map(|fallback| (fallback, e))
        })
        .collect();
    // Stable: (order, precedence) is kept within each group.
    matched.sort_by_key(|(fallback, _)| *fallback);
    matched.into_iter().map(|(_, e)| e).collect()
}

fn is_empty(value: Option<&Value>) -> bool {
    value.and_then(value_to_string).is_none_or(|v| v.is_empty())
}

/// `Some(is_fallback)` when the supplied values can reach an endpoint with
/// these required values.
///
/// Each required value is compared with the explicit value, or the ambient
/// one when no explicit value is given. A required-empty key only needs the
/// explicit value to be empty; satisfying it while the ambient request has a
/// value makes the match a fallback, tried after every exact match.
fn match_required(
    required: &RouteValueDictionary,
    explicit: &RouteValueDictionary,
    ambient: Option<&RouteValueDictionary>,
) -> Option<bool> {
    let mut fallback = false;
    for (key, required_value) in required.iter() {
        if let Some(value) = explicit.get(key) {
            if !RouteValueDictionary::values_equal(Some(value), Some(required_value)) {
                return None;
            }
            continue;
        }
        let ambient_value = ambient.and_then(|a| a.get(key)).filter(|v| !is_empty(Some(v)));
        if is_empty(Some(required_value)) {
            fallback |= ambient_value.is_some();
        } else if !RouteValueDictionary::values_equal(ambient_value, Some(required_value)) {
            return None;
        }
    }
    Some(fallback)
}

/// Apply [`RouteOptions`], prefix the path base and append the fragment.
fn format_path(path: &str, path_base: &str, fragment: Option<&str>, options: RouteOptions) -> String {
    let (path, query) = path.split_at(path.find('?').unwrap_or(path.len()));
    let mut path = if options.lowercase_urls {
        path.to_lowercase()
    } else {
        path.to_string()
    };
    if options.append_trailing_slash && !path.ends_with('/') {
        path.push('/');
    }

    let mut out = String::with_capacity(path_base.len() + path.len() + query.len());
    out.push_str(path_base.trim_end_matches('/'));
    out.push_str(&path);
    if options.lowercase_urls && options.lowercase_query_strings {
        out.push_str(&query.to_lowercase());
    } else {
        out.push_str(query);
    }
    if let Some(fragment) = fragment.map(|f| f.trim_start_matches('#')).filter(|f| !f.is_empty()) {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionDescriptor, DefaultActionDescriptorCollectionProvider};
    use crate::data_source::{ActionEndpointDataSource, ActionEndpointFactory, ConventionalRouteEntry};
    use crate::patterns::DefaultParameterPolicyFactory;

    fn generator(actions: Vec<ActionDescriptor>, routes: &[(&str, &str)], options: RouteOptions) -> LinkGenerator {
        let provider = Arc::new(DefaultActionDescriptorCollectionProvider::new(actions));
        let data_source = ActionEndpointDataSource::new(provider, ActionEndpointFactory::default());
        for (name, template) in routes {
            let route = ConventionalRouteEntry::new(
                Some(*name),
                template,
                None,
                &[],
                None,
                &DefaultParameterPolicyFactory::new(),
            )
            .expect("route");
            data_source.add_route(route);
        }
        LinkGenerator::new(data_source, Arc::new(DefaultParameterPolicyFactory::new()), options).expect("generator")
    }

    fn values<const N: usize>(pairs: [(&str, &str); N]) -> RouteValueDictionary {
        RouteValueDictionary::from(pairs)
    }

    fn path(generator: &LinkGenerator, address: &RouteValuesAddress) -> Option<String> {
        generator.get_path_by_address(address, "", None, None)
    }

    #[test]
    fn conventional_links_collapse_defaults() {
        let links = generator(
            vec![
                ActionDescriptor::new("Home", "Index"),
                ActionDescriptor::new("Products", "Details"),
            ],
            &[("default", "{controller=Home}/{action=Index}/{id?}")],
            RouteOptions::default(),
        );

        let home = RouteValuesAddress::new(None, values([("controller", "Home"), ("action", "Index")]));
        assert_eq!(path(&links, &home).as_deref(), Some("/"));

        let details = RouteValuesAddress::new(
            None,
            values([("controller", "Products"), ("action", "Details"), ("id", "5")]),
        );
        assert_eq!(path(&links, &details).as_deref(), Some("/Products/Details/5"));
    }

    #[test]
    fn unknown_action_has_no_link() {
        let links = generator(
            vec![ActionDescriptor::new("Home", "Index")],
            &[("default", "{controller}/{action}")],
            RouteOptions::default(),
        );
        let address = RouteValuesAddress::new(None, values([("controller", "Nope"), ("action", "Index")]));
        assert_eq!(path(&links, &address), None);
        assert!(links.find_endpoints(&address).is_empty());
    }

    #[test]
    fn attribute_routes_are_preferred_by_order_and_name_lookup_works() {
        let mut named = ActionDescriptor::new("Orders", "Show").with_attribute_route("orders/{id:int}");
        if let Some(info) = named.attribute_route_info.as_mut() {
            info.name = Some("order".to_string());
        }
        let links = generator(
            vec![named, ActionDescriptor::new("Home", "Index")],
            &[("default", "{controller}/{action}/{id?}")],
            RouteOptions::default(),
        );

        let by_values = RouteValuesAddress::new(
            None,
            values([("controller", "Orders"), ("action", "Show"), ("id", "3")]),
        );
        assert_eq!(path(&links, &by_values).as_deref(), Some("/orders/3"));

        let by_name = RouteValuesAddress::new(Some("ORDER"), values([("id", "9")]));
        assert_eq!(path(&links, &by_name).as_deref(), Some("/orders/9"));

        // Constraint failure: no other endpoint carries the name.
        let bad = RouteValuesAddress::new(Some("order"), values([("id", "x")]));
        assert_eq!(path(&links, &bad), None);
    }

    #[test]
    fn ambient_values_fill_the_controller() {
        let links = generator(
            vec![
                ActionDescriptor::new("Products", "List"),
                ActionDescriptor::new("Products", "Details"),
            ],
            &[("default", "{controller}/{action}/{id?}")],
            RouteOptions::default(),
        );
        let address = RouteValuesAddress::new(None, values([("action", "List")]))
            .with_ambient_values(values([("controller", "Products"), ("action", "Details"), ("id", "5")]));
        assert_eq!(path(&links, &address).as_deref(), Some("/Products/List"));
    }

    #[test]
    fn options_shape_the_result() {
        let links = generator(
            vec![ActionDescriptor::new("Products", "Details")],
            &[("default", "{controller}/{action}/{id?}")],
            RouteOptions {
                lowercase_urls: true,
                lowercase_query_strings: false,
                append_trailing_slash: true,
            },
        );
        let address = RouteValuesAddress::new(
            None,
            values([("controller", "Products"), ("action", "Details"), ("Sort", "Name")]),
        );
        assert_eq!(
            links.get_path_by_address(&address, "/app/", Some("top"), None).as_deref(),
            Some("/app/products/details/?Sort=Name#top")
        );
        assert_eq!(
            links
                .get_uri_by_address(&address, "https", "example.com", "", None, Some(RouteOptions::default()))
                .as_deref(),
            Some("https://example.com/Products/Details?Sort=Name")
        );
        assert_eq!(links.get_uri_by_address(&address, "https", "", "", None, None), None);
    }

    #[test]
    fn required_empty_values_become_fallbacks_under_ambient_area() {
        let required = values([("area", ""), ("controller", "Home")]);
        assert_eq!(match_required(&required, &values([("controller", "Home")]), None), Some(false));
        assert_eq!(
            match_required(
                &required,
                &values([("controller", "Home")]),
                Some(&values([("area", "Admin")]))
            ),
            Some(true)
        );
        assert_eq!(
            match_required(&required, &values([("controller", "Home"), ("area", "Admin")]), None),
            None
        );
    }

    #[test]
    fn cache_follows_endpoint_generations() {
        let provider = Arc::new(DefaultActionDescriptorCollectionProvider::new(vec![
            ActionDescriptor::new("Home", "Index"),
        ]));
        let data_source = ActionEndpointDataSource::new(
            Arc::clone(&provider) as Arc<dyn crate::actions::ActionDescriptorCollectionProvider>,
            ActionEndpointFactory::default(),
        );
        data_source.add_route(
            ConventionalRouteEntry::new(
                Some("default"),
                "{controller}/{action}",
                None,
                &[],
                None,
                &DefaultParameterPolicyFactory::new(),
            )
            .expect("route"),
        );
        let links = LinkGenerator::new(
            data_source,
            Arc::new(DefaultParameterPolicyFactory::new()),
            RouteOptions::default(),
        )
        .expect("generator");
        let address = RouteValuesAddress::new(None, values([("controller", "Blog"), ("action", "Post")]));
        assert_eq!(path(&links, &address), None);

        provider.set_actions(vec![
            ActionDescriptor::new("Home", "Index"),
            ActionDescriptor::new("Blog", "Post"),
        ]);
        assert_eq!(path(&links, &address).as_deref(), Some("/Blog/Post"));
    }

    #[test]
    fn failed_first_build_fails_construction() {
        let provider = Arc::new(DefaultActionDescriptorCollectionProvider::new(vec![
            ActionDescriptor::new("Home", "Index"),
            ActionDescriptor::new("Home", "Broken").with_attribute_route("broken/{id"),
        ]));
        let data_source = ActionEndpointDataSource::new(provider, ActionEndpointFactory::default());
        let result = LinkGenerator::new(
            data_source,
            Arc::new(DefaultParameterPolicyFactory::new()),
            RouteOptions::default(),
        );
        assert!(matches!(result, Err(crate::error::RoutingError::InvalidTemplate { .. })));
    }
}
