//! Content-type dispatch.
//!
//! Endpoints declaring [`ConsumesMetadata`] are split into one edge per
//! declared media type. A request is routed to the most specific edge its
//! `Content-Type` is a subset of; anything else lands on the `*/*` edge,
//! which holds a 415 endpoint when no endpoint accepts every content type.

use super::{
    MatcherPolicy, NodeBuilderPolicy, PolicyEdgeState, PolicyJumpTable, PolicyJumpTableEdge,
    PolicyNodeEdge,
};
use crate::context::{request_delegate, HttpRequest};
use crate::endpoint::{ConsumesMetadata, Endpoint, EndpointMetadataCollection};
use crate::media_type::MediaType;
use http::StatusCode;
use std::sync::Arc;

const ANY_CONTENT_TYPE: &str = "*/*";

/// Display name of the synthesized rejection endpoint.
pub const UNSUPPORTED_MEDIA_TYPE_ENDPOINT: &str = "415 HTTP Unsupported Media Type";

/// Runs after HTTP-method dispatch and before any fallback policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsumesMatcherPolicy;

impl ConsumesMatcherPolicy {
    pub const ORDER: i32 = -100;

    fn declared(endpoint: &Endpoint) -> &[String] {
        endpoint
            .metadata()
            .get_metadata::<ConsumesMetadata>()
            .map(|m| m.content_types.as_slice())
            .unwrap_or_default()
    }

    fn rejection_endpoint() -> Arc<Endpoint> {
        let delegate = request_delegate(|ctx| {
            ctx.response.status = StatusCode::UNSUPPORTED_MEDIA_TYPE;
            Ok(())
        });
        Arc::new(Endpoint::new(
            delegate,
            EndpointMetadataCollection::empty(),
            UNSUPPORTED_MEDIA_TYPE_ENDPOINT,
        ))
    }
}

impl MatcherPolicy for ConsumesMatcherPolicy {
    fn order(&self) -> i32 {
        Self::ORDER
    }

    fn as_node_builder(&self) -> Option<&dyn NodeBuilderPolicy> {
        Some(self)
    }
}

impl NodeBuilderPolicy for ConsumesMatcherPolicy {
    fn applies_to_endpoints(&self, endpoints: &[Arc<Endpoint>]) -> bool {
        endpoints.iter().any(|e| !Self::declared(e).is_empty())
    }

    fn get_edges(&self, endpoints: &[Arc<Endpoint>]) -> Vec<PolicyNodeEdge> {
        // Every distinct declared media type becomes an edge; endpoints that
        // declare nothing contribute `*/*`.
        let mut edges: Vec<(String, Vec<Arc<Endpoint>>)> = Vec::new();
        let mut add_key = |key: &str| {
            if !edges.iter().any(|(k, _)| k.eq_ignore_ascii_case(key)) {
                edges.push((key.to_string(), Vec::new()));
            }
        };
        for endpoint in endpoints {
            let declared = Self::declared(endpoint);
            if declared.is_empty() {
                add_key(ANY_CONTENT_TYPE);
            }
            for key in declared {
                add_key(key.as_str());
            }
        }

        for endpoint in endpoints {
            let declared = Self::declared(endpoint);
            if declared.is_empty() {
                for (_, members) in &mut edges {
                    members.push(Arc::clone(endpoint));
                }
                continue;
            }
            let declared: Vec<MediaType> = declared.iter().map(|d| MediaType::parse(d)).collect();
            for (key, members) in &mut edges {
                let edge_type = MediaType::parse(key);
                // A request type on this edge is at least as narrow as the key,
                // so the key being a subset of a declaration is sufficient.
                if declared.iter().any(|d| edge_type.is_subset_of(d)) {
                    members.push(Arc::clone(endpoint));
                }
            }
        }

        if !edges.iter().any(|(k, _)| k == ANY_CONTENT_TYPE) {
            edges.push((ANY_CONTENT_TYPE.to_string(), vec![Self::rejection_endpoint()]));
        }

        edges
            .into_iter()
            .map(|(key, endpoints)| PolicyNodeEdge {
                state: PolicyEdgeState::ContentType(key),
                endpoints,
            })
            .collect()
    }

    fn build_jump_table(
        &self,
        exit_destination: usize,
        edges: &[PolicyJumpTableEdge],
    ) -> Box<dyn PolicyJumpTable> {
        let mut ordered: Vec<(MediaType, usize)> = edges
            .iter()
            .filter_map(|edge| match &edge.state {
                PolicyEdgeState::ContentType(ct) => Some((MediaType::parse(ct), edge.destination)),
                _ => None,
            })
            .collect();
        // Stable: equally specific edges keep their edge order.
        ordered.sort_by_key(|(media_type, _)| media_type.specificity());

        let exit = ordered
            .iter()
            .find(|(media_type, _)| media_type.matches_all_types())
            .map_or(exit_destination, |(_, destination)| *destination);

        Box::new(ConsumesPolicyJumpTable {
            exit,
            destinations: ordered,
        })
    }
}

/// Specificity-ordered content-type lookup.
#[derive(Debug, Clone)]
pub struct ConsumesPolicyJumpTable {
    exit: usize,
    destinations: Vec<(MediaType, usize)>,
}

impl PolicyJumpTable for ConsumesPolicyJumpTable {
    fn get_destination(&self, request: &HttpRequest) -> usize {
        let Some(content_type) = request.content_type() else {
            return self.exit;
        };
        let request_type = MediaType::parse(content_type);
        self.destinations
            .iter()
            .find(|(media_type, _)| request_type.is_subset_of(media_type))
            .map_or(self.exit, |(_, destination)| *destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::empty_delegate;
    use http::Method;

    fn endpoint(name: &str, consumes: &[&str]) -> Arc<Endpoint> {
        let mut metadata: Vec<Arc<dyn std::any::Any + Send + Sync>> = Vec::new();
        if !consumes.is_empty() {
            metadata.push(Arc::new(ConsumesMetadata::new(consumes.iter().copied())));
        }
        Arc::new(Endpoint::new(
            empty_delegate(),
            EndpointMetadataCollection::new(metadata),
            name,
        ))
    }

    fn names(edge: &PolicyNodeEdge) -> Vec<&str> {
        edge.endpoints.iter().map(|e| e.display_name()).collect()
    }

    fn edge<'a>(edges: &'a [PolicyNodeEdge], key: &str) -> &'a PolicyNodeEdge {
        edges
            .iter()
            .find(|e| e.state == PolicyEdgeState::ContentType(key.to_string()))
            .expect("edge")
    }

    fn table(endpoints: &[Arc<Endpoint>]) -> (Vec<PolicyNodeEdge>, Box<dyn PolicyJumpTable>) {
        let policy = ConsumesMatcherPolicy;
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

    fn post(content_type: Option<&str>) -> HttpRequest {
        let request = HttpRequest::new(Method::POST, "/");
        match content_type {
            Some(ct) => request.with_content_type(ct),
            None => request,
        }
    }

    #[test]
    fn applies_only_with_declarations() {
        let policy = ConsumesMatcherPolicy;
        assert!(!policy.applies_to_endpoints(&[endpoint("a", &[])]));
        assert!(policy.applies_to_endpoints(&[endpoint("a", &[]), endpoint("b", &["text/plain"])]));
    }

    #[test]
    fn synthesizes_415_when_nobody_accepts_everything() {
        let (edges, _) = table(&[endpoint("json", &["application/json"])]);
        let any: Vec<_> = edges
            .iter()
            .filter(|e| e.state == PolicyEdgeState::ContentType("*/*".to_string()))
            .collect();
        assert_eq!(any.len(), 1);
        assert_eq!(names(any[0]), vec![UNSUPPORTED_MEDIA_TYPE_ENDPOINT]);
    }

    #[test]
    fn unconstrained_endpoints_join_every_edge() {
        let endpoints = [endpoint("json", &["application/json"]), endpoint("any", &[])];
        let (edges, _) = table(&endpoints);
        assert_eq!(edges.len(), 2);
        assert_eq!(names(edge(&edges, "application/json")), vec!["json", "any"]);
        assert_eq!(names(edge(&edges, "*/*")), vec!["any"]);
    }

    #[test]
    fn wildcard_declarations_cover_narrower_edges() {
        let endpoints = [
            endpoint("app", &["application/*"]),
            endpoint("json", &["application/json"]),
        ];
        let (edges, _) = table(&endpoints);
        assert_eq!(names(edge(&edges, "application/*")), vec!["app"]);
        assert_eq!(names(edge(&edges, "application/json")), vec!["app", "json"]);
    }

    #[test]
    fn most_specific_edge_wins() {
        let endpoints = [
            endpoint("app", &["application/*"]),
            endpoint("json", &["application/json"]),
        ];
        let (edges, table) = table(&endpoints);
        let json = edges
            .iter()
            .position(|e| e.state == PolicyEdgeState::ContentType("application/json".to_string()))
            .expect("json edge");
        let app = edges
            .iter()
            .position(|e| e.state == PolicyEdgeState::ContentType("application/*".to_string()))
            .expect("app edge");
        let any = edges
            .iter()
            .position(|e| e.state == PolicyEdgeState::ContentType("*/*".to_string()))
            .expect("any edge");

        assert_eq!(table.get_destination(&post(Some("application/json; charset=utf-8"))), json);
        assert_eq!(table.get_destination(&post(Some("application/xml"))), app);
        assert_eq!(table.get_destination(&post(Some("text/plain"))), any);
        assert_eq!(table.get_destination(&post(None)), any);
    }

    #[test]
    fn suffix_wildcard_routing() {
        let (edges, table) = table(&[endpoint("vendor", &["application/*+json"])]);
        let vendor = edges
            .iter()
            .position(|e| e.state == PolicyEdgeState::ContentType("application/*+json".to_string()))
            .expect("edge");
        assert_eq!(table.get_destination(&post(Some("application/vnd.foo+json"))), vendor);

        let (edges, table) = table_for_json_only();
        let any = edges
            .iter()
            .position(|e| e.state == PolicyEdgeState::ContentType("*/*".to_string()))
            .expect("any");
        assert_eq!(table.get_destination(&post(Some("application/vnd.foo+json"))), any);
        assert_eq!(names(&edges[any]), vec![UNSUPPORTED_MEDIA_TYPE_ENDPOINT]);
    }

    fn table_for_json_only() -> (Vec<PolicyNodeEdge>, Box<dyn PolicyJumpTable>) {
        table(&[endpoint("json", &["application/json"])])
    }
}
