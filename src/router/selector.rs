use super::candidate::CandidateSet;
use crate::error::{Result, RoutingError};

/// Picks the winner after every policy ran: the valid candidate with the
/// lowest score.
///
/// Candidates are sorted by score, so the first valid one decides the
/// winning score. A second valid candidate at that score is an ambiguity.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEndpointSelector;

impl DefaultEndpointSelector {
    /// Index of the winning candidate, `None` when nothing is valid.
    pub fn select(&self, candidates: &CandidateSet) -> Result<Option<usize>> {
        let mut valid = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_valid());

        let Some((winner, first)) = valid.next() else {
            return Ok(None);
        };
        let tied: Vec<String> = valid
            .take_while(|(_, c)| c.score == first.score)
            .map(|(_, c)| c.endpoint.display_name().to_string())
            .collect();
        if tied.is_empty() {
            return Ok(Some(winner));
        }

        let mut endpoints = Vec::with_capacity(tied.len() + 1);
        endpoints.push(first.endpoint.display_name().to_string());
        endpoints.extend(tied);
        Err(RoutingError::AmbiguousMatch { endpoints })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::empty_delegate;
    use crate::endpoint::{Endpoint, EndpointMetadataCollection};
    use crate::route_values::RouteValueDictionary;
    use std::sync::Arc;

    fn set(scores: &[i32]) -> CandidateSet {
        CandidateSet::new(scores.iter().enumerate().map(|(i, &score)| {
            let endpoint = Endpoint::new(empty_delegate(), EndpointMetadataCollection::empty(), format!("e{i}"));
            (Arc::new(endpoint), RouteValueDictionary::new(), score)
        }))
    }

    #[test]
    fn lowest_valid_score_wins() {
        let mut candidates = set(&[0, 1, 1]);
        candidates.set_validity(0, false);
        candidates.set_validity(2, false);
        assert_eq!(DefaultEndpointSelector.select(&candidates), Ok(Some(1)));
    }

    #[test]
    fn tie_at_winning_score_is_ambiguous() {
        let candidates = set(&[0, 0, 1]);
        assert_eq!(
            DefaultEndpointSelector.select(&candidates),
            Err(RoutingError::AmbiguousMatch {
                endpoints: vec!["e0".to_string(), "e1".to_string()]
            })
        );
    }

    #[test]
    fn nothing_valid_is_no_match() {
        let mut candidates = set(&[0]);
        candidates.mark_all_invalid();
        assert_eq!(DefaultEndpointSelector.select(&candidates), Ok(None));
    }
}
