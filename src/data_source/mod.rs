//! # Endpoint Data Source
//!
//! Turns the action model into the endpoint list the matcher consumes and
//! keeps it current.
//!
//! ## Generations
//!
//! Every build produces a generation: the endpoint list, a version and a
//! change token. Generations are swapped in atomically; readers never lock.
//!
//! ```text
//! actions change ──► lock writer ──► build ──► store generation N+1
//!                                               │
//!                                               └─► cancel token N ──► consumers rebuild
//! ```
//!
//! The previous token fires only after the new list is visible, so a consumer
//! reacting to "changed" always reads the newer list.
//!
//! ## Conventional vs attribute routes
//!
//! - Actions with an attribute route get one endpoint from their own
//!   template, after `[area]`/`[controller]`/`[action]` token replacement.
//! - Other actions are expanded against every applicable
//!   [`ConventionalRouteEntry`]; see [`ActionEndpointFactory`] for how optional
//!   trailing segments collapse into extra endpoints.

mod conventional;
mod core;
mod factory;


pub use conventional::ConventionalRouteEntry;
pub use self::core::{ActionEndpointDataSource, EndpointDataSource, StaticEndpointDataSource};
pub use factory::{replace_tokens, ActionEndpointFactory, RequestDelegateFactory};
