use crate::endpoint::Endpoint;
use crate::route_values::RouteValueDictionary;
use smallvec::SmallVec;
use std::sync::Arc;

/// Candidates held inline before spilling to the heap.
pub const MAX_INLINE_CANDIDATES: usize = 4;

/// One endpoint's slot during a single request.
#[derive(Debug, Clone)]
pub struct CandidateState {
    pub endpoint: Arc<Endpoint>,
    /// Values extracted for this endpoint only.
    pub values: RouteValueDictionary,
    /// Priority bucket; lower is more specific and wins.
    pub score: i32,
    valid: bool,
}

impl CandidateState {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Per-request, fixed-size set of candidates, sorted by score.
///
/// All candidates start valid. Policies narrow the set by flipping validity
/// flags; the set itself never grows.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    candidates: SmallVec<[CandidateState; MAX_INLINE_CANDIDATES]>,
}

impl CandidateSet {
    #[must_use]
    pub fn new(candidates: impl IntoIterator<Item = (Arc<Endpoint>, RouteValueDictionary, i32)>) -> Self {
        Self {
            candidates: candidates
                .into_iter()
                .map(|(endpoint, values, score)| CandidateState {
                    endpoint,
                    values,
                    score,
                    valid: true,
                })
                .collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&CandidateState> {
        self.candidates.get(index)
    }

    #[inline]
    #[must_use]
    pub fn is_valid_candidate(&self, index: usize) -> bool {
        self.candidates.get(index).is_some_and(|c| c.valid)
    }

    pub fn set_validity(&mut self, index: usize, valid: bool) {
        if let Some(candidate) = self.candidates.get_mut(index) {
            candidate.valid = valid;
        }
    }

    pub fn mark_all_invalid(&mut self) {
        for candidate in &mut self.candidates {
            candidate.valid = false;
        }
    }

    pub fn mark_valid(&mut self, index: usize) {
        self.set_validity(index, true);
    }

    /// Swap the endpoint in a slot, e.g. for a terminal rejection endpoint.
    pub fn replace_endpoint(&mut self, index: usize, endpoint: Arc<Endpoint>, values: RouteValueDictionary) {
        if let Some(candidate) = self.candidates.get_mut(index) {
            candidate.endpoint = endpoint;
            candidate.values = values;
            candidate.valid = true;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CandidateState> {
        self.candidates.iter()
    }

    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.candidates.iter().filter(|c| c.valid).count()
    }
}
