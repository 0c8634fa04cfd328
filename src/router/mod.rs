//! # Router Module
//!
//! Matches incoming requests to endpoints and dispatches them.
//!
//! ## Overview
//!
//! The router is responsible for:
//! - Compiling the data source's endpoints into a [`DfaMatcher`]
//! - Walking request paths and narrowing candidates through the matcher policies
//! - Binding route values and picking a single winner
//! - Rebuilding the matcher whenever the data source publishes a new generation
//!
//! ## Architecture
//!
//! Matching is split into two phases:
//!
//! 1. **Compilation**: endpoints are sorted into score buckets and inserted
//!    into a segment trie. Every trie node gets a policy tree (HTTP method,
//!    then content type) whose leaves hold the candidate endpoints.
//!
//! 2. **Matching**: the request path walks the trie without backtracking, the
//!    jump tables pick a leaf, each leaf candidate is bound and constraint
//!    checked into a [`CandidateSet`], the endpoint-selector policies narrow
//!    it, and [`DefaultEndpointSelector`] picks the lowest score.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mvcrouter::router::Router;
//!
//! let router = Router::with_default_policies(data_source, constraint_cache)?;
//! let mut ctx = HttpContext::new(HttpRequest::new(Method::GET, "/products/42"));
//! if router.match_request(&mut ctx)? {
//!     println!("Endpoint: {:?}", ctx.endpoint);
//!     println!("Route values: {:?}", ctx.route_values);
//! }
//! ```

mod candidate;
mod core;
mod dfa;
mod selector;

pub use candidate::{CandidateSet, CandidateState, MAX_INLINE_CANDIDATES};
pub use self::core::Router;
pub use dfa::{DfaMatcher, EndpointMatch};
pub use selector::DefaultEndpointSelector;
