//! # Matcher Policies
//!
//! Policies refine the candidates a path match produced.
//!
//! - **Node builders** ([`NodeBuilderPolicy`]) split the endpoints at a trie
//!   node into edges keyed by some request property, then compile a
//!   [`PolicyJumpTable`] that maps a request to one edge without allocating.
//! - **Endpoint selectors** ([`EndpointSelectorPolicy`]) run per request over a
//!   [`CandidateSet`] and flip validity flags.
//!
//! Policies run in ascending [`MatcherPolicy::order`]:
//!
//! | Policy | Order | Kind |
//! |--------|-------|------|
//! | [`HttpMethodMatcherPolicy`] | -1000 | node builder |
//! | [`ConsumesMatcherPolicy`] | -100 | node builder |
//! | [`ActionConstraintMatcherPolicy`] | 100000 | endpoint selector |

mod action_constraint;
mod consumes;
mod http_method;

pub use action_constraint::{
    evaluate_constraints_core, ActionConstraintMatcherPolicy, ConstraintItem, NON_ACTION,
};
pub use consumes::{ConsumesMatcherPolicy, ConsumesPolicyJumpTable, UNSUPPORTED_MEDIA_TYPE_ENDPOINT};
pub use http_method::{
    HttpMethodMatcherPolicy, HttpMethodPolicyJumpTable, METHOD_NOT_SUPPORTED_ENDPOINT,
};

use crate::context::HttpRequest;
use crate::endpoint::Endpoint;
use crate::router::CandidateSet;
use http::Method;
use std::fmt;
use std::sync::Arc;

/// Key of one policy edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyEdgeState {
    /// `None` is the "any method" edge.
    Method(Option<Method>),
    ContentType(String),
    Custom(String),
}

impl fmt::Display for PolicyEdgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyEdgeState::Method(Some(m)) => write!(f, "HTTP: {m}"),
            PolicyEdgeState::Method(None) => f.write_str("HTTP: *"),
            PolicyEdgeState::ContentType(ct) => write!(f, "Content-Type: {ct}"),
            PolicyEdgeState::Custom(s) => f.write_str(s),
        }
    }
}

/// Endpoints reachable through one edge.
#[derive(Debug, Clone)]
pub struct PolicyNodeEdge {
    pub state: PolicyEdgeState,
    pub endpoints: Vec<Arc<Endpoint>>,
}

/// An edge after its endpoints were compiled into a destination index.
#[derive(Debug, Clone)]
pub struct PolicyJumpTableEdge {
    pub state: PolicyEdgeState,
    pub destination: usize,
}

/// Request → destination index.
pub trait PolicyJumpTable: Send + Sync {
    fn get_destination(&self, request: &HttpRequest) -> usize;
}

/// Builds trie-node edges for one request property.
pub trait NodeBuilderPolicy: Send + Sync {
    fn applies_to_endpoints(&self, endpoints: &[Arc<Endpoint>]) -> bool;

    /// Edges in a deterministic order; endpoint order inside an edge follows
    /// the input order.
    fn get_edges(&self, endpoints: &[Arc<Endpoint>]) -> Vec<PolicyNodeEdge>;

    fn build_jump_table(
        &self,
        exit_destination: usize,
        edges: &[PolicyJumpTableEdge],
    ) -> Box<dyn PolicyJumpTable>;
}

/// Narrows a candidate set per request.
pub trait EndpointSelectorPolicy: Send + Sync {
    fn applies_to_endpoints(&self, endpoints: &[Arc<Endpoint>]) -> bool;

    fn apply(&self, request: &HttpRequest, candidates: &mut CandidateSet);
}

/// A policy participating in matching.
pub trait MatcherPolicy: Send + Sync {
    fn order(&self) -> i32;

    fn as_node_builder(&self) -> Option<&dyn NodeBuilderPolicy> {
        None
    }

    fn as_endpoint_selector(&self) -> Option<&dyn EndpointSelectorPolicy> {
        None
    }
}
