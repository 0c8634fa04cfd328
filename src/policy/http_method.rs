//! HTTP-method dispatch.
//!
//! Splits endpoints by [`HttpMethodMetadata`]. When no endpoint at a node
//! accepts every method, the "any" edge holds a 405 endpoint that lists the
//! allowed methods in the `Allow` header.

use super::{
    MatcherPolicy, NodeBuilderPolicy, PolicyEdgeState, PolicyJumpTable, PolicyJumpTableEdge,
    PolicyNodeEdge,
};
use crate::context::{request_delegate, HttpRequest};
use crate::endpoint::{Endpoint, EndpointMetadataCollection, HttpMethodMetadata};
use http::header::{HeaderValue, ALLOW};
use http::{Method, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;

/// Display name of the synthesized rejection endpoint.
pub const METHOD_NOT_SUPPORTED_ENDPOINT: &str = "405 HTTP Method Not Supported";

/// Runs first among the built-in policies.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpMethodMatcherPolicy;

impl HttpMethodMatcherPolicy {
    pub const ORDER: i32 = -1000;

    fn declared(endpoint: &Endpoint) -> &[Method] {
        endpoint
            .metadata()
            .get_metadata::<HttpMethodMetadata>()
            .map(|m| m.http_methods.as_slice())
            .unwrap_or_default()
    }

    fn rejection_endpoint(allowed: &[Method]) -> Arc<Endpoint> {
        let mut names: Vec<&str> = allowed.iter().map(Method::as_str).collect();
        names.sort_unstable();
        names.dedup();
        let allow = names.join(", ");
        let delegate = request_delegate(move |ctx| {
            ctx.response.status = StatusCode::METHOD_NOT_ALLOWED;
            ctx.response.headers.insert(ALLOW, HeaderValue::from_str(&allow)?);
            Ok(())
        });
        Arc::new(Endpoint::new(
            delegate,
            EndpointMetadataCollection::empty(),
            METHOD_NOT_SUPPORTED_ENDPOINT,
        ))
    }
}

impl MatcherPolicy for HttpMethodMatcherPolicy {
    fn order(&self) -> i32 {
        Self::ORDER
    }

    fn as_node_builder(&self) -> Option<&dyn NodeBuilderPolicy> {
        Some(self)
    }
}

impl NodeBuilderPolicy for HttpMethodMatcherPolicy {
    fn applies_to_endpoints(&self, endpoints: &[Arc<Endpoint>]) -> bool {
        endpoints.iter().any(|e| !Self::declared(e).is_empty())
    }

    fn get_edges(&self, endpoints: &[Arc<Endpoint>]) -> Vec<PolicyNodeEdge> {
        let mut edges: Vec<(Option<Method>, Vec<Arc<Endpoint>>)> = Vec::new();
        let mut add_key = |key: Option<&Method>| {
            if !edges.iter().any(|(k, _)| k.as_ref() == key) {
                edges.push((key.cloned(), Vec::new()));
            }
        };
        for endpoint in endpoints {
            let declared = Self::declared(endpoint);
            if declared.is_empty() {
                add_key(None);
            }
            for method in declared {
                add_key(Some(method));
            }
        }

        for endpoint in endpoints {
            let declared = Self::declared(endpoint);
            for (key, members) in &mut edges {
                let accepted = match key {
                    None => declared.is_empty(),
                    Some(method) => declared.is_empty() || declared.contains(method),
                };
                if accepted {
                    members.push(Arc::clone(endpoint));
                }
            }
        }

        if !edges.iter().any(|(k, _)| k.is_none()) {
            let allowed: Vec<Method> = edges.iter().filter_map(|(k, _)| k.clone()).collect();
            edges.push((None, vec![Self::rejection_endpoint(&allowed)]));
        }

        edges
            .into_iter()
            .map(|(key, endpoints)| PolicyNodeEdge {
                state: PolicyEdgeState::Method(key),
                endpoints,
            })
            .collect()
    }

    fn build_jump_table(
        &self,
        exit_destination: usize,
        edges: &[PolicyJumpTableEdge],
    ) -> Box<dyn PolicyJumpTable> {
        let mut destinations = HashMap::with_capacity(edges.len());
        let mut exit = exit_destination;
        for edge in edges {
            match &edge.state {
                PolicyEdgeState::Method(Some(method)) => {
                    destinations.insert(method.clone(), edge.destination);
                }
                PolicyEdgeState::Method(None) => exit = edge.destination,
                _ => {}
            }
        }
        Box::new(HttpMethodPolicyJumpTable { exit, destinations })
    }
}

/// Exact method lookup with an "any method" exit.
#[derive(Debug, Clone)]
pub struct HttpMethodPolicyJumpTable {
    exit: usize,
    destinations: HashMap<Method, usize>,
}

impl PolicyJumpTable for HttpMethodPolicyJumpTable {
    fn get_destination(&self, request: &HttpRequest) -> usize {
        self.destinations
            .get(&request.method)
            .copied()
            .unwrap_or(self.exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{empty_delegate, HttpContext};

    fn endpoint(name: &str, methods: &[Method]) -> Arc<Endpoint> {
        let mut metadata: Vec<Arc<dyn std::any::Any + Send + Sync>> = Vec::new();
        if !methods.is_empty() {
            metadata.push(Arc::new(HttpMethodMetadata::new(methods.iter().cloned())));
        }
        Arc::new(Endpoint::new(
            empty_delegate(),
            EndpointMetadataCollection::new(metadata),
            name,
        ))
    }

    fn compile(endpoints: &[Arc<Endpoint>]) -> (Vec<PolicyNodeEdge>, Box<dyn PolicyJumpTable>) {
        let policy = HttpMethodMatcherPolicy;
        let edges = policy.get_edges(endpoints);
        let jump: Vec<_> = edges
            .iter()
            .enumerate()
            .map(|(i, e)| PolicyJumpTableEdge {
                state: e.state.clone(),
                destination: i,
            })
            .collect();
        let table = policy.build_jump_table(usize::MAX, &jump);
        (edges, table)
    }

    #[test]
    fn unconstrained_endpoints_join_every_edge() {
        let (edges, table) = compile(&[endpoint("get", &[Method::GET]), endpoint("any", &[])]);
        assert_eq!(edges.len(), 2);

        let get = table.get_destination(&HttpRequest::new(Method::GET, "/"));
        let names: Vec<_> = edges[get].endpoints.iter().map(|e| e.display_name()).collect();
        assert_eq!(names, vec!["get", "any"]);

        let delete = table.get_destination(&HttpRequest::new(Method::DELETE, "/"));
        let names: Vec<_> = edges[delete].endpoints.iter().map(|e| e.display_name()).collect();
        assert_eq!(names, vec!["any"]);
    }

    #[test]
    fn rejection_lists_allowed_methods() {
        let (edges, table) = compile(&[
            endpoint("put", &[Method::PUT]),
            endpoint("get", &[Method::GET, Method::PUT]),
        ]);
        let dest = table.get_destination(&HttpRequest::new(Method::PATCH, "/"));
        let rejection = &edges[dest].endpoints[0];
        assert_eq!(rejection.display_name(), METHOD_NOT_SUPPORTED_ENDPOINT);

        let mut ctx = HttpContext::new(HttpRequest::new(Method::PATCH, "/"));
        rejection.invoke(&mut ctx).expect("delegate");
        assert_eq!(ctx.response.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            ctx.response.headers.get(ALLOW).and_then(|v| v.to_str().ok()),
            Some("GET, PUT")
        );
    }
}
