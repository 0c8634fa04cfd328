//! # mvcrouter
//!
//! **mvcrouter** is an endpoint-routing core for MVC-style applications:
//! controllers and actions are turned into endpoints, requests are matched to
//! exactly one endpoint, and route values are turned back into URLs.
//!
//! ## Overview
//!
//! The library is organized into several key modules:
//!
//! - **[`patterns`]** - Route template parsing, precedence and parameter policies
//! - **[`actions`]** - Action descriptors, action constraints and the constraint cache
//! - **[`data_source`]** - Builds endpoints from actions and conventional routes, with change tokens
//! - **[`router`]** - DFA matcher, candidate sets and request dispatch
//! - **[`policy`]** - HTTP-method, content-type and action-constraint matcher policies
//! - **[`media_type`]** - Media type parsing and subset checks
//! - **[`links`]** - Template binding, link generation and URL helpers
//! - **[`config`]** - YAML routing configuration and route options
//! - **[`hot_reload`]** - Live reloading of conventional routes
//! - **[`logging`]** - `tracing` subscriber setup
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant App
//!     participant Router
//!     participant DataSource as ActionEndpointDataSource
//!     participant Matcher as DfaMatcher
//!     participant Policies as Matcher policies
//!     participant Endpoint
//!
//!     App->>Router: route(&mut HttpContext)
//!     Router->>DataSource: endpoints() (rebuilt on change token)
//!     Router->>Matcher: match_request(request)
//!     Matcher->>Matcher: Walk path segments
//!     Matcher->>Policies: HTTP method / content-type jump tables
//!     Matcher->>Matcher: Bind route values, check route constraints
//!     Matcher->>Policies: Action constraint tournament
//!     Matcher-->>Router: EndpointMatch or none
//!
//!     alt No match
//!         Router-->>App: 404 Not Found
//!     end
//!     Router->>Endpoint: invoke(ctx)
//!     Endpoint-->>App: response (405 / 415 endpoints are synthesized)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mvcrouter::actions::{ActionConstraintCache, ActionDescriptor, DefaultActionDescriptorCollectionProvider};
//! use mvcrouter::data_source::{ActionEndpointDataSource, ActionEndpointFactory, ConventionalRouteEntry};
//! use mvcrouter::patterns::DefaultParameterPolicyFactory;
//! use mvcrouter::router::Router;
//!
//! let provider = Arc::new(DefaultActionDescriptorCollectionProvider::new(vec![
//!     ActionDescriptor::new("Home", "Index"),
//!     ActionDescriptor::new("Products", "Details"),
//! ]));
//! let data_source = ActionEndpointDataSource::new(provider.clone(), ActionEndpointFactory::default());
//! data_source.add_route(ConventionalRouteEntry::new(
//!     Some("default"),
//!     "{controller=Home}/{action=Index}/{id?}",
//!     None,
//!     &[],
//!     None,
//!     &DefaultParameterPolicyFactory::new(),
//! )?);
//!
//! let cache = Arc::new(ActionConstraintCache::new(provider, Vec::new()));
//! let router = Router::with_default_policies(data_source, cache)?;
//! let mut ctx = HttpContext::new(HttpRequest::new(Method::GET, "/products/details/5"));
//! router.route(&mut ctx)?;
//! ```
//!
//! ## Logging
//!
//! Everything is reported through `tracing`. Install a subscriber with
//! [`logging::init_logging`] or bring your own.

pub mod actions;
pub mod change_token;
pub mod config;
pub mod context;
pub mod data_source;
pub mod endpoint;
pub mod error;
pub mod hot_reload;
pub mod ids;
pub mod links;
pub mod logging;
pub mod media_type;
pub mod patterns;
pub mod policy;
pub mod route_values;
pub mod router;

pub use config::{load_config, RouteOptions, RoutingConfig};
pub use context::{HttpContext, HttpRequest, HttpResponse};
pub use endpoint::Endpoint;
pub use error::{Result, RoutingError};
pub use links::{LinkGenerator, UrlHelper};
pub use media_type::MediaType;
pub use route_values::RouteValueDictionary;
pub use router::Router;
