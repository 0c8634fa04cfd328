use super::metadata::EndpointMetadataCollection;
use crate::context::{HttpContext, RequestDelegate};
use crate::patterns::RoutePattern;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An immutable routable target.
///
/// Endpoints are built once per data-source generation and shared read-only
/// between concurrent requests.
#[derive(Clone)]
pub struct Endpoint {
    display_name: Option<String>,
    metadata: EndpointMetadataCollection,
    request_delegate: RequestDelegate,
    route: Option<RouteInfo>,
}

#[derive(Clone)]
struct RouteInfo {
    pattern: Arc<RoutePattern>,
    order: i32,
}

impl Endpoint {
    /// A non-routable endpoint (terminal 404/405/415 responses).
    #[must_use]
    pub fn new(
        request_delegate: RequestDelegate,
        metadata: EndpointMetadataCollection,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            display_name: Some(display_name.into()),
            metadata,
            request_delegate,
            route: None,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn metadata(&self) -> &EndpointMetadataCollection {
        &self.metadata
    }

    #[must_use]
    pub fn request_delegate(&self) -> &RequestDelegate {
        &self.request_delegate
    }

    /// The route pattern, for routable endpoints.
    #[must_use]
    pub fn route_pattern(&self) -> Option<&Arc<RoutePattern>> {
        self.route.as_ref().map(|r| &r.pattern)
    }

    /// Ordering key among routable endpoints; lower is tried first.
    #[must_use]
    pub fn order(&self) -> i32 {
        self.route.as_ref().map_or(0, |r| r.order)
    }

    /// Run the endpoint's delegate.
    pub fn invoke(&self, context: &mut HttpContext) -> anyhow::Result<()> {
        (self.request_delegate)(context)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Endpoint");
        s.field("display_name", &self.display_name());
        if let Some(route) = &self.route {
            s.field("pattern", &route.pattern.raw_text())
                .field("order", &route.order);
        }
        s.field("metadata", &self.metadata).finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Mutable staging area for a routable endpoint.
///
/// Conventions receive the builder after all framework metadata has been
/// added and may change anything before [`RouteEndpointBuilder::build`].
pub struct RouteEndpointBuilder {
    pub request_delegate: RequestDelegate,
    pub route_pattern: RoutePattern,
    pub order: i32,
    pub display_name: Option<String>,
    pub metadata: Vec<Arc<dyn Any + Send + Sync>>,
}

impl RouteEndpointBuilder {
    #[must_use]
    pub fn new(request_delegate: RequestDelegate, route_pattern: RoutePattern, order: i32) -> Self {
        Self {
            request_delegate,
            route_pattern,
            order,
            display_name: None,
            metadata: Vec::new(),
        }
    }

    pub fn add_metadata<T: Any + Send + Sync>(&mut self, item: T) -> &mut Self {
        self.metadata.push(Arc::new(item));
        self
    }

    /// Add an already shared item without re-wrapping it.
    pub fn add_shared_metadata(&mut self, item: Arc<dyn Any + Send + Sync>) -> &mut Self {
        self.metadata.push(item);
        self
    }

    #[must_use]
    pub fn build(self) -> Endpoint {
        let display_name = self
            .display_name
            .unwrap_or_else(|| self.route_pattern.raw_text());
        Endpoint {
            display_name: Some(display_name),
            metadata: EndpointMetadataCollection::new(self.metadata),
            request_delegate: self.request_delegate,
            route: Some(RouteInfo {
                pattern: Arc::new(self.route_pattern),
                order: self.order,
            }),
        }
    }
}

impl fmt::Debug for RouteEndpointBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEndpointBuilder")
            .field("pattern", &self.route_pattern.raw_text())
            .field("order", &self.order)
            .field("display_name", &self.display_name)
            .field("metadata", &self.metadata.len())
            .finish()
    }
}

/// Callback that adjusts endpoints as they are built. Runs last.
pub type EndpointConvention = Arc<dyn Fn(&mut RouteEndpointBuilder) + Send + Sync>;
