//! Router facade - hot path for request routing.
//!
//! Request matching runs on every request; the lints below keep accidental
//! string allocations out of it.

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

use super::dfa::{DfaMatcher, EndpointMatch};
use crate::actions::ActionConstraintCache;
use crate::change_token::{on_change, ChangeTokenSubscription};
use crate::context::HttpContext;
use crate::data_source::EndpointDataSource;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::patterns::{DefaultParameterPolicyFactory, ParameterPolicyFactory};
use crate::policy::{
    ActionConstraintMatcherPolicy, ConsumesMatcherPolicy, HttpMethodMatcherPolicy, MatcherPolicy,
};
use arc_swap::ArcSwap;
use http::StatusCode;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Matches above this duration are logged as slow.
const SLOW_MATCH_THRESHOLD: Duration = Duration::from_millis(1);

/// Everything needed to rebuild the matcher for a new endpoint generation.
struct MatcherSource {
    data_source: Arc<dyn EndpointDataSource>,
    policies: Vec<Arc<dyn MatcherPolicy>>,
    policy_factory: Arc<dyn ParameterPolicyFactory>,
}

impl MatcherSource {
    fn build(&self, endpoints: &[Arc<Endpoint>]) -> Result<DfaMatcher> {
        DfaMatcher::new(endpoints, &self.policies, self.policy_factory.as_ref())
    }
}

/// Matches requests against the endpoints of a data source.
///
/// The matcher is immutable and swapped atomically: when the data source
/// publishes a new generation its change token fires and a new matcher is
/// built in the background of that notification. In-flight requests keep the
/// matcher they loaded.
///
/// # Example
///
/// ```rust,ignore
/// let router = Router::with_default_policies(data_source, constraint_cache)?;
/// let mut ctx = HttpContext::new(HttpRequest::new(Method::GET, "/products/42"));
/// router.route(&mut ctx)?;
/// ```
pub struct Router {
    source: Arc<MatcherSource>,
    matcher: Arc<ArcSwap<DfaMatcher>>,
    _subscription: ChangeTokenSubscription,
}

impl Router {
    /// Build a router over `data_source` with an explicit policy list.
    ///
    /// Fails when the data source cannot build its first endpoint list or a
    /// route constraint of the current endpoints cannot be resolved. Later
    /// rebuild failures are logged and keep the previous
    /// matcher.
    pub fn new(
        data_source: Arc<dyn EndpointDataSource>,
        policies: Vec<Arc<dyn MatcherPolicy>>,
        policy_factory: Arc<dyn ParameterPolicyFactory>,
    ) -> Result<Self> {
        let source = Arc::new(MatcherSource {
            data_source,
            policies,
            policy_factory,
        });

        let endpoints = source.data_source.try_endpoints()?;
        let matcher = Arc::new(ArcSwap::from_pointee(source.build(&endpoints)?));
        info!(
            endpoints = endpoints.len(),
            routes_count = matcher.load().route_count(),
            routing_algorithm = "dfa",
            "Routing table loaded"
        );

        let producer = Arc::clone(&source);
        let rebuild_source = Arc::clone(&source);
        let target = Arc::clone(&matcher);
        let subscription = on_change(
            move || producer.data_source.change_token(),
            move || rebuild(&rebuild_source, &target),
        );

        // A generation published before the subscription existed.
        if !Arc::ptr_eq(&endpoints, &source.data_source.endpoints()) {
            rebuild(&source, &matcher);
        }

        Ok(Self {
            source,
            matcher,
            _subscription: subscription,
        })
    }

    /// Router with the built-in policies: HTTP method, content type and action
    /// constraints.
    pub fn with_default_policies(
        data_source: Arc<dyn EndpointDataSource>,
        action_constraints: Arc<ActionConstraintCache>,
    ) -> Result<Self> {
        let policies: Vec<Arc<dyn MatcherPolicy>> = vec![
            Arc::new(HttpMethodMatcherPolicy),
            Arc::new(ConsumesMatcherPolicy),
            Arc::new(ActionConstraintMatcherPolicy::new(action_constraints)),
        ];
        Self::new(
            data_source,
            policies,
            Arc::new(DefaultParameterPolicyFactory::new()),
        )
    }

    /// The matcher for the current endpoint generation.
    #[must_use]
    pub fn matcher(&self) -> Arc<DfaMatcher> {
        self.matcher.load_full()
    }

    /// Endpoints of the current data-source generation.
    #[must_use]
    pub fn endpoints(&self) -> Arc<Vec<Arc<Endpoint>>> {
        self.source.data_source.endpoints()
    }

    /// Log every matchable route pattern, in matching order.
    pub fn dump_routes(&self) {
        let matcher = self.matcher.load();
        info!(count = matcher.route_count(), "Registered routes");
        for pattern in matcher.route_patterns() {
            info!(route_pattern = %pattern, "Route");
        }
    }

    /// Select the endpoint for `context.request`.
    ///
    /// On a match the endpoint and its route values are stored on the
    /// context and `true` is returned. `Err` only for an ambiguous match.
    pub fn match_request(&self, context: &mut HttpContext) -> Result<bool> {
        let request = &context.request;
        debug!(
            method = %request.method,
            path = %request.path,
            algorithm = "dfa",
            "Route match attempt"
        );

        let started = Instant::now();
        let result = self.matcher.load().match_request(request);
        let elapsed = started.elapsed();

        let Some(EndpointMatch { endpoint, values }) = result? else {
            warn!(
                method = %request.method,
                path = %request.path,
                duration_us = elapsed.as_micros() as u64,
                algorithm = "dfa",
                "No route matched"
            );
            return Ok(false);
        };

        let route_pattern = endpoint
            .route_pattern()
            .map(|p| p.raw_text())
            .unwrap_or_default();
        if elapsed > SLOW_MATCH_THRESHOLD {
            warn!(
                method = %request.method,
                path = %request.path,
                endpoint = %endpoint.display_name(),
                route_pattern = %route_pattern,
                route_values = ?values,
                duration_us = elapsed.as_micros() as u64,
                algorithm = "dfa",
                "Slow route matching detected"
            );
        } else {
            info!(
                method = %request.method,
                path = %request.path,
                endpoint = %endpoint.display_name(),
                route_pattern = %route_pattern,
                route_values = ?values,
                duration_us = elapsed.as_micros() as u64,
                algorithm = "dfa",
                "Route matched"
            );
        }

        context.endpoint = Some(endpoint);
        context.route_values = values;
        Ok(true)
    }

    /// Match and invoke the selected endpoint, or answer 404.
    ///
    /// Errors from the endpoint's delegate are returned unchanged.
    pub fn route(&self, context: &mut HttpContext) -> anyhow::Result<()> {
        if !self.match_request(context)? {
            context.response.status = StatusCode::NOT_FOUND;
            return Ok(());
        }
        match context.endpoint.clone() {
            Some(endpoint) => endpoint.invoke(context),
            None => Ok(()),
        }
    }
}

fn rebuild(source: &MatcherSource, target: &ArcSwap<DfaMatcher>) {
    let started = Instant::now();
    let endpoints = source.data_source.endpoints();
    match source.build(&endpoints) {
        Ok(matcher) => {
            let routes = matcher.route_count();
            target.store(Arc::new(matcher));
            info!(
                endpoints = endpoints.len(),
                routes_count = routes,
                duration_us = started.elapsed().as_micros() as u64,
                routing_algorithm = "dfa",
                "Routing table rebuilt"
            );
        }
        Err(err) => error!(
            error = %err,
            "Routing table rebuild failed, keeping previous matcher"
        ),
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("matcher", &self.matcher.load_full())
            .finish_non_exhaustive()
    }
}
