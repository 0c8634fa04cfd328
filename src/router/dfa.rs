//! Segment trie ("DFA") for endpoint matching.
//!
//! The trie is built so that a request walk never backtracks:
//!
//! - Literal children are keyed by the lowercased segment text.
//! - An endpoint whose segment is a parameter is also copied into every
//!   literal sibling, so taking the literal branch cannot lose it.
//! - A catch-all endpoint is copied into every descendant of the node it
//!   starts at, and its own catch-all node loops onto itself.
//!
//! Each node then carries a policy tree built from the node-builder policies
//! (HTTP method, then content type). Per request the matcher walks the path,
//! follows the jump tables to a leaf, binds route values for each leaf
//! candidate, runs the endpoint-selector policies and picks a winner.
//!
//! ```text
//! /products/{id}      root ─ "products" ─ {param} ──► [products/{id}]
//! /{*path}              │         └─ {catch-all} ─► [{*path}]
//!                       └─ {catch-all} (loops) ───► [{*path}]
//! ```

use super::candidate::CandidateSet;
use super::selector::DefaultEndpointSelector;
use crate::context::HttpRequest;
use crate::endpoint::{ConsumesMetadata, Endpoint, HttpMethodMetadata, SuppressMatchingMetadata};
use crate::error::Result;
use crate::patterns::{
    resolve_policies, try_match, ParameterPolicy, ParameterPolicyFactory, Precedence,
    RouteConstraint, RouteDirection, RoutePattern, RoutePatternPathSegment,
};
use crate::policy::{MatcherPolicy, PolicyJumpTable, PolicyJumpTableEdge};
use crate::route_values::RouteValueDictionary;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A routable endpoint after its constraints were resolved.
struct CompiledRoute {
    endpoint: Arc<Endpoint>,
    pattern: Arc<RoutePattern>,
    constraints: Vec<(String, Arc<dyn RouteConstraint>)>,
    score: i32,
}

impl CompiledRoute {
    fn segment(&self, depth: usize) -> SegmentKind<'_> {
        let segments = self.pattern.path_segments();
        match segments.get(depth) {
            Some(segment) => SegmentKind::of(segment),
            // A catch-all keeps consuming below its own depth.
            None => match segments.last().and_then(RoutePatternPathSegment::as_parameter) {
                Some(p) if p.is_catch_all() => SegmentKind::CatchAll,
                _ => SegmentKind::End,
            },
        }
    }

    /// Whether a request may stop at `depth` and still bind.
    fn can_end_at(&self, depth: usize) -> bool {
        let pattern = &self.pattern;
        pattern
            .path_segments()
            .iter()
            .skip(depth)
            .all(|segment| match segment.as_parameter() {
                Some(p) => {
                    p.is_optional() || p.is_catch_all() || pattern.defaults().contains_key(&p.name)
                }
                None => false,
            })
    }

    fn bind(&self, path: &str) -> Option<RouteValueDictionary> {
        let mut values = RouteValueDictionary::new();
        if !try_match(&self.pattern, path, &mut values) {
            return None;
        }
        let accepted = self
            .constraints
            .iter()
            .all(|(key, c)| c.matches(key, &values, RouteDirection::IncomingRequest));
        accepted.then_some(values)
    }
}

enum SegmentKind<'a> {
    Literal(&'a str),
    /// Simple or complex parameter segment; complex ones are checked when binding.
    Parameter,
    CatchAll,
    End,
}

impl<'a> SegmentKind<'a> {
    fn of(segment: &'a RoutePatternPathSegment) -> Self {
        if let Some(text) = segment.as_literal() {
            return SegmentKind::Literal(text);
        }
        match segment.as_parameter() {
            Some(p) if p.is_catch_all() => SegmentKind::CatchAll,
            _ => SegmentKind::Parameter,
        }
    }
}

#[derive(Default)]
struct DfaNode {
    literals: HashMap<String, usize>,
    parameter: Option<usize>,
    catch_all: Option<usize>,
    is_catch_all: bool,
    /// Indexes into `DfaMatcher::routes`.
    matches: Vec<usize>,
    policy: PolicyNode,
}

/// One leaf slot: a route, or a synthesized terminal endpoint with no pattern.
#[derive(Clone)]
struct LeafCandidate {
    endpoint: Arc<Endpoint>,
    route: Option<usize>,
    score: i32,
}

enum PolicyNode {
    Leaf {
        candidates: Vec<LeafCandidate>,
        /// Indexes into `DfaMatcher::policies` of the selectors that apply here.
        selectors: Vec<usize>,
    },
    Branch {
        table: Box<dyn PolicyJumpTable>,
        children: Vec<PolicyNode>,
    },
}

impl Default for PolicyNode {
    fn default() -> Self {
        PolicyNode::Leaf {
            candidates: Vec::new(),
            selectors: Vec::new(),
        }
    }
}

impl PolicyNode {
    fn select(&self, request: &HttpRequest) -> (&[LeafCandidate], &[usize]) {
        let mut node = self;
        loop {
            match node {
                PolicyNode::Leaf {
                    candidates,
                    selectors,
                } => return (candidates.as_slice(), selectors.as_slice()),
                PolicyNode::Branch { table, children } => {
                    match children.get(table.get_destination(request)) {
                        Some(child) => node = child,
                        None => return (&[], &[]),
                    }
                }
            }
        }
    }
}

/// A successful match.
#[derive(Debug, Clone)]
pub struct EndpointMatch {
    pub endpoint: Arc<Endpoint>,
    pub values: RouteValueDictionary,
}

/// Immutable matcher over one endpoint generation.
pub struct DfaMatcher {
    nodes: Vec<DfaNode>,
    routes: Vec<CompiledRoute>,
    policies: Vec<Arc<dyn MatcherPolicy>>,
    selector: DefaultEndpointSelector,
}

impl DfaMatcher {
    /// Build the trie for `endpoints`.
    ///
    /// Endpoints without a route pattern or carrying
    /// [`SuppressMatchingMetadata`] are not matchable and are left out.
    /// Fails when a route constraint cannot be resolved.
    pub fn new(
        endpoints: &[Arc<Endpoint>],
        policies: &[Arc<dyn MatcherPolicy>],
        policy_factory: &dyn ParameterPolicyFactory,
    ) -> Result<Self> {
        let mut policies = policies.to_vec();
        policies.sort_by_key(|p| p.order());

        let routes = compile_routes(endpoints, policy_factory)?;
        let mut matcher = Self {
            nodes: vec![DfaNode::default()],
            routes,
            policies,
            selector: DefaultEndpointSelector,
        };
        matcher.build_trie();
        matcher.build_policies();

        debug!(
            routes = matcher.routes.len(),
            nodes = matcher.nodes.len(),
            "Endpoint matcher built"
        );
        Ok(matcher)
    }

    /// Number of matchable endpoints.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Route patterns in matching order.
    #[must_use]
    pub fn route_patterns(&self) -> Vec<String> {
        self.routes.iter().map(|r| r.pattern.raw_text()).collect()
    }

    /// Match `request` to a single endpoint.
    ///
    /// `Ok(None)` when nothing matched; `Err` only when several endpoints
    /// survived at the winning score.
    pub fn match_request(&self, request: &HttpRequest) -> Result<Option<EndpointMatch>> {
        let Some(node) = self.walk(&request.path) else {
            return Ok(None);
        };
        let (leaf, selectors) = node.policy.select(request);
        if leaf.is_empty() {
            return Ok(None);
        }

        let mut validity = Vec::with_capacity(leaf.len());
        let mut candidates = CandidateSet::new(leaf.iter().map(|candidate| {
            let bound = match candidate.route {
                Some(index) => self.routes[index].bind(&request.path),
                None => Some(RouteValueDictionary::new()),
            };
            validity.push(bound.is_some());
            (
                Arc::clone(&candidate.endpoint),
                bound.unwrap_or_default(),
                candidate.score,
            )
        }));
        for (index, valid) in validity.into_iter().enumerate() {
            candidates.set_validity(index, valid);
        }

        for &index in selectors {
            if candidates.valid_count() == 0 {
                break;
            }
            if let Some(selector) = self.policies[index].as_endpoint_selector() {
                selector.apply(request, &mut candidates);
            }
        }

        Ok(self
            .selector
            .select(&candidates)?
            .and_then(|index| candidates.get(index))
            .map(|winner| EndpointMatch {
                endpoint: Arc::clone(&winner.endpoint),
                values: winner.values.clone(),
            }))
    }

    fn walk(&self, path: &str) -> Option<&DfaNode> {
        let mut current = 0;
        for raw in path.split('/').filter(|s| !s.is_empty()) {
            let node = &self.nodes[current];
            let literal = urlencoding::decode(raw)
                .map(|s| s.to_lowercase())
                .unwrap_or_else(|_| raw.to_lowercase());
            let next = node
                .literals
                .get(&literal)
                .copied()
                .or(node.parameter)
                .or(node.catch_all);
            current = next?;
        }
        self.nodes.get(current)
    }

    fn add_node(&mut self) -> usize {
        self.nodes.push(DfaNode::default());
        self.nodes.len() - 1
    }

    fn catch_all_child(&mut self, parent: usize) -> usize {
        if self.nodes[parent].is_catch_all {
            return parent;
        }
        if let Some(existing) = self.nodes[parent].catch_all {
            return existing;
        }
        let child = self.add_node();
        self.nodes[child].is_catch_all = true;
        self.nodes[child].catch_all = Some(child);
        self.nodes[parent].catch_all = Some(child);
        child
    }

    fn parameter_child(&mut self, parent: usize) -> usize {
        if let Some(existing) = self.nodes[parent].parameter {
            return existing;
        }
        let child = self.add_node();
        self.nodes[parent].parameter = Some(child);
        child
    }

    /// Breadth-first: at each depth create every literal and parameter child
    /// first, then move each route to the nodes it reaches.
    fn build_trie(&mut self) {
        let routes = std::mem::take(&mut self.routes);
        let max_depth = routes
            .iter()
            .map(|r| r.pattern.path_segments().len())
            .max()
            .unwrap_or(0);
        let mut work: Vec<Vec<usize>> = vec![vec![0]; routes.len()];

        for depth in 0..=max_depth + 1 {
            for (route, nodes) in work.iter().enumerate() {
                if routes[route].can_end_at(depth) {
                    for &node in nodes {
                        if !self.nodes[node].matches.contains(&route) {
                            self.nodes[node].matches.push(route);
                        }
                    }
                }
            }

            for (route, nodes) in work.iter().enumerate() {
                let kind = routes[route].segment(depth);
                for &node in nodes {
                    if self.nodes[node].is_catch_all {
                        continue;
                    }
                    match kind {
                        SegmentKind::Literal(text) => {
                            let key = text.to_lowercase();
                            if !self.nodes[node].literals.contains_key(&key) {
                                let child = self.add_node();
                                self.nodes[node].literals.insert(key, child);
                            }
                        }
                        SegmentKind::Parameter => {
                            self.parameter_child(node);
                        }
                        SegmentKind::CatchAll | SegmentKind::End => {}
                    }
                }
            }

            let mut next_work = Vec::with_capacity(work.len());
            for (route, nodes) in work.iter().enumerate() {
                let mut next = Vec::new();
                let kind = routes[route].segment(depth);
                for &node in nodes {
                    match kind {
                        SegmentKind::Literal(text) => {
                            if let Some(&child) = self.nodes[node].literals.get(&text.to_lowercase()) {
                                next.push(child);
                            }
                        }
                        SegmentKind::Parameter => {
                            if let Some(child) = self.nodes[node].parameter {
                                next.push(child);
                            }
                            next.extend(self.nodes[node].literals.values().copied());
                        }
                        SegmentKind::CatchAll => {
                            next.push(self.catch_all_child(node));
                            next.extend(self.nodes[node].parameter);
                            next.extend(self.nodes[node].literals.values().copied());
                        }
                        SegmentKind::End => {}
                    }
                }
                next.sort_unstable();
                next.dedup();
                next_work.push(next);
            }
            work = next_work;
        }

        for node in &mut self.nodes {
            node.matches.sort_by_key(|&route| (routes[route].score, route));
        }
        self.routes = routes;
    }

    fn build_policies(&mut self) {
        let builders: Vec<usize> = (0..self.policies.len())
            .filter(|&i| self.policies[i].as_node_builder().is_some())
            .collect();

        let by_address: HashMap<*const Endpoint, usize> = self
            .routes
            .iter()
            .enumerate()
            .map(|(i, r)| (Arc::as_ptr(&r.endpoint), i))
            .collect();

        for index in 0..self.nodes.len() {
            let endpoints: Vec<Arc<Endpoint>> = self.nodes[index]
                .matches
                .iter()
                .map(|&route| Arc::clone(&self.routes[route].endpoint))
                .collect();
            let policy = self.build_policy_node(endpoints, &builders, &by_address);
            self.nodes[index].policy = policy;
        }
    }

    fn build_policy_node(
        &self,
        endpoints: Vec<Arc<Endpoint>>,
        builders: &[usize],
        by_address: &HashMap<*const Endpoint, usize>,
    ) -> PolicyNode {
        if endpoints.is_empty() {
            return PolicyNode::default();
        }

        for (position, &policy) in builders.iter().enumerate() {
            let Some(builder) = self.policies[policy].as_node_builder() else {
                continue;
            };
            if !builder.applies_to_endpoints(&endpoints) {
                continue;
            }

            let edges = builder.get_edges(&endpoints);
            let rest = &builders[position + 1..];
            let mut children: Vec<PolicyNode> = Vec::with_capacity(edges.len() + 1);
            let mut jump_edges = Vec::with_capacity(edges.len());
            for edge in edges {
                jump_edges.push(PolicyJumpTableEdge {
                    state: edge.state,
                    destination: children.len(),
                });
                children.push(self.build_policy_node(edge.endpoints, rest, by_address));
            }
            let exit = children.len();
            children.push(PolicyNode::default());

            return PolicyNode::Branch {
                table: builder.build_jump_table(exit, &jump_edges),
                children,
            };
        }

        let candidates: Vec<LeafCandidate> = endpoints
            .into_iter()
            .map(|endpoint| {
                let route = by_address.get(&Arc::as_ptr(&endpoint)).copied();
                LeafCandidate {
                    score: route.map_or(0, |r| self.routes[r].score),
                    route,
                    endpoint,
                }
            })
            .collect();
        let routed: Vec<Arc<Endpoint>> = candidates.iter().map(|c| Arc::clone(&c.endpoint)).collect();
        let selectors = (0..self.policies.len())
            .filter(|&i| {
                self.policies[i]
                    .as_endpoint_selector()
                    .is_some_and(|s| s.applies_to_endpoints(&routed))
            })
            .collect();
        PolicyNode::Leaf {
            candidates,
            selectors,
        }
    }
}

/// Endpoints declaring a method or content type sort ahead of those that
/// accept anything, at equal order and precedence.
fn policy_rank(endpoint: &Endpoint) -> (u8, u8) {
    let metadata = endpoint.metadata();
    let methods = metadata
        .get_metadata::<HttpMethodMetadata>()
        .is_some_and(|m| !m.http_methods.is_empty());
    let consumes = metadata
        .get_metadata::<ConsumesMetadata>()
        .is_some_and(|m| !m.content_types.is_empty());
    (u8::from(!methods), u8::from(!consumes))
}

fn compile_routes(
    endpoints: &[Arc<Endpoint>],
    policy_factory: &dyn ParameterPolicyFactory,
) -> Result<Vec<CompiledRoute>> {
    struct Sortable {
        endpoint: Arc<Endpoint>,
        pattern: Arc<RoutePattern>,
        precedence: Precedence,
        raw_text: String,
        rank: (u8, u8),
    }

    let mut sortable: Vec<Sortable> = endpoints
        .iter()
        .filter(|e| !e.metadata().contains::<SuppressMatchingMetadata>())
        .filter_map(|e| {
            let pattern = Arc::clone(e.route_pattern()?);
            Some(Sortable {
                precedence: pattern.inbound_precedence(),
                raw_text: pattern.raw_text(),
                rank: policy_rank(e),
                endpoint: Arc::clone(e),
                pattern,
            })
        })
        .collect();

    let score_key = |s: &Sortable| (s.endpoint.order(), s.precedence.clone(), s.rank);
    sortable.sort_by(|a, b| {
        score_key(a)
            .cmp(&score_key(b))
            .then_with(|| compare_ignore_case(&a.raw_text, &b.raw_text))
    });

    let mut routes = Vec::with_capacity(sortable.len());
    let mut score = 0;
    for (i, entry) in sortable.iter().enumerate() {
        if i > 0 && score_key(&sortable[i - 1]) != score_key(entry) {
            score += 1;
        }
        let constraints = resolve_policies(&entry.pattern, policy_factory)?
            .into_iter()
            .flat_map(|(name, policies)| {
                policies
                    .into_iter()
                    .filter_map(|p| match p {
                        ParameterPolicy::Constraint(c) => Some(c),
                        ParameterPolicy::Transformer(_) => None,
                    })
                    .map(move |c| (name.clone(), c))
            })
            .collect();
        routes.push(CompiledRoute {
            endpoint: Arc::clone(&entry.endpoint),
            pattern: Arc::clone(&entry.pattern),
            constraints,
            score,
        });
    }
    Ok(routes)
}

fn compare_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.chars().map(|c| c.to_ascii_lowercase()))
}

impl fmt::Debug for DfaMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DfaMatcher")
            .field("routes", &self.route_patterns())
            .field("nodes", &self.nodes.len())
            .finish_non_exhaustive()
    }
}
