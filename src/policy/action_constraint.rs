//! Action-constraint tournament.
//!
//! Valid candidates are grouped by score, most specific first. Inside a group
//! constraints are evaluated one order at a time: candidates that carry a
//! constraint at the current order and pass it are preferred over candidates
//! with no constraint at that order, and only when the preferred bucket yields
//! nothing is the other bucket tried. The first group producing a winner ends
//! the search; later groups are never evaluated.

use super::{EndpointSelectorPolicy, MatcherPolicy};
use crate::actions::{
    ActionConstraint, ActionConstraintCache, ActionConstraintContext, ActionConstraintMetadata,
    ActionDescriptor, ActionSelectorCandidate,
};
use crate::context::HttpRequest;
use crate::endpoint::Endpoint;
use crate::route_values::RouteValueDictionary;
use crate::router::CandidateSet;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Stand-in descriptor for matched endpoints that carry constraints but were
/// not produced from an action.
pub static NON_ACTION: Lazy<Arc<ActionDescriptor>> = Lazy::new(|| {
    let mut descriptor = ActionDescriptor::new("", "");
    descriptor.display_name = "non-action".to_string();
    descriptor.route_values = RouteValueDictionary::new();
    Arc::new(descriptor)
});

/// Candidate index paired with its materialized constraints.
pub type ConstraintItem = (usize, ActionSelectorCandidate);

/// Core tournament over one group of candidates.
///
/// `accept` evaluates one constraint for one item, given every candidate
/// still in play. Returns the surviving items, or `None` when no item
/// survives at some order. Items with no constraints above `starting_order`
/// are returned unchanged.
pub fn evaluate_constraints_core<F>(
    items: Vec<ConstraintItem>,
    starting_order: Option<i32>,
    accept: &F,
) -> Option<Vec<ConstraintItem>>
where
    F: Fn(&[ActionSelectorCandidate], &ConstraintItem, &dyn ActionConstraint) -> bool,
{
    let order = items
        .iter()
        .flat_map(|(_, candidate)| candidate.constraints.iter().map(|c| c.order()))
        .filter(|order| starting_order.is_none_or(|start| *order > start))
        .min();
    let Some(order) = order else {
        return Some(items);
    };

    let in_play: Vec<ActionSelectorCandidate> = items.iter().map(|(_, c)| c.clone()).collect();
    let mut with_constraint = Vec::new();
    let mut without_constraint = Vec::new();

    for item in items {
        let mut is_match = true;
        let mut found = false;
        for constraint in item.1.constraints.iter().filter(|c| c.order() == order) {
            found = true;
            if !accept(&in_play, &item, constraint.as_ref()) {
                is_match = false;
                break;
            }
        }
        match (is_match, found) {
            (true, true) => with_constraint.push(item),
            (true, false) => without_constraint.push(item),
            (false, _) => {}
        }
    }

    if !with_constraint.is_empty() {
        if let Some(matches) = evaluate_constraints_core(with_constraint, Some(order), accept) {
            if !matches.is_empty() {
                return Some(matches);
            }
        }
    }

    if without_constraint.is_empty() {
        None
    } else {
        evaluate_constraints_core(without_constraint, Some(order), accept)
    }
}

/// Endpoint selector running user action constraints.
///
/// Skipped entirely when neither the action collection nor any matched
/// non-action endpoint declares a constraint.
pub struct ActionConstraintMatcherPolicy {
    cache: Arc<ActionConstraintCache>,
}

impl ActionConstraintMatcherPolicy {
    pub const ORDER: i32 = 100_000;

    #[must_use]
    pub fn new(cache: Arc<ActionConstraintCache>) -> Self {
        Self { cache }
    }

    /// Whether the engine has anything to evaluate for `endpoints`.
    ///
    /// Recomputed per call so a rebuilt endpoint set without constrained
    /// non-action endpoints turns the engine back off.
    #[must_use]
    pub fn should_run_action_constraints(&self, endpoints: &[Arc<Endpoint>]) -> bool {
        self.cache.has_action_constraints()
            || endpoints.iter().any(|endpoint| Self::has_non_action_constraints(endpoint))
    }

    fn has_non_action_constraints(endpoint: &Endpoint) -> bool {
        !endpoint.metadata().contains::<ActionDescriptor>()
            && Self::non_action_metadata(endpoint).next().is_some()
    }

    fn non_action_metadata(endpoint: &Endpoint) -> impl Iterator<Item = &ActionConstraintMetadata> {
        endpoint
            .metadata()
            .get_ordered_metadata::<ActionConstraintMetadata>()
            .into_iter()
            .filter(|m| !m.is_hoisted())
    }

    fn candidate_for(&self, request: &HttpRequest, endpoint: &Endpoint) -> ActionSelectorCandidate {
        if let Some(action) = endpoint.metadata().get_metadata_arc::<ActionDescriptor>() {
            let constraints = self.cache.get_action_constraints(request, &action);
            return ActionSelectorCandidate { action, constraints };
        }
        let constraints = Self::non_action_metadata(endpoint)
            .filter_map(|metadata| match metadata {
                ActionConstraintMetadata::Custom(c) => Some(Arc::clone(c)),
                ActionConstraintMetadata::Factory(f) => Some(f.create_instance()),
                ActionConstraintMetadata::HttpMethod(_) | ActionConstraintMetadata::Consumes(_) => None,
            })
            .collect();
        ActionSelectorCandidate {
            action: Arc::clone(&NON_ACTION),
            constraints,
        }
    }

    /// Winners of the first score group that produces any.
    fn evaluate_action_constraints(
        &self,
        request: &HttpRequest,
        candidates: &CandidateSet,
    ) -> Option<Vec<ConstraintItem>> {
        let accept = |in_play: &[ActionSelectorCandidate], item: &ConstraintItem, constraint: &dyn ActionConstraint| {
            let empty = RouteValueDictionary::new();
            let route_values = candidates.get(item.0).map_or(&empty, |c| &c.values);
            let context = ActionConstraintContext {
                candidates: in_play,
                current_candidate: &item.1,
                route_values,
                request,
            };
            constraint.accept(&context)
        };

        let count = candidates.len();
        let mut index = 0;
        while index < count {
            let Some(first) = candidates.get(index).filter(|c| c.is_valid()) else {
                index += 1;
                continue;
            };
            let score = first.score;
            let mut items = Vec::new();
            while let Some(candidate) = candidates.get(index).filter(|c| c.score == score) {
                if candidate.is_valid() {
                    items.push((index, self.candidate_for(request, &candidate.endpoint)));
                }
                index += 1;
            }

            if let Some(winners) = evaluate_constraints_core(items, None, &accept) {
                if !winners.is_empty() {
                    trace!(score, winners = winners.len(), "Action constraint group resolved");
                    return Some(winners);
                }
            }
        }
        None
    }
}

impl MatcherPolicy for ActionConstraintMatcherPolicy {
    fn order(&self) -> i32 {
        Self::ORDER
    }

    fn as_endpoint_selector(&self) -> Option<&dyn EndpointSelectorPolicy> {
        Some(self)
    }
}

impl EndpointSelectorPolicy for ActionConstraintMatcherPolicy {
    fn applies_to_endpoints(&self, endpoints: &[Arc<Endpoint>]) -> bool {
        self.should_run_action_constraints(endpoints)
    }

    fn apply(&self, request: &HttpRequest, candidates: &mut CandidateSet) {
        let run = self.cache.has_action_constraints()
            || candidates
                .iter()
                .any(|candidate| Self::has_non_action_constraints(&candidate.endpoint));
        if !run {
            return;
        }
        let winners = self.evaluate_action_constraints(request, candidates);
        candidates.mark_all_invalid();
        for (index, _) in winners.into_iter().flatten() {
            candidates.mark_valid(index);
        }
    }
}

impl fmt::Debug for ActionConstraintMatcherPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionConstraintMatcherPolicy")
            .field("cache", &self.cache)
            .finish()
    }
}
