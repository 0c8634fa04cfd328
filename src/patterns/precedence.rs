//! Route precedence: one digit per path segment.
//!
//! A precedence reads like a decimal number whose first digit belongs to the
//! first segment (`Home/{id}` inbound is `1.3`). Missing trailing digits are
//! zero, so `a` (`1`) sorts before `a/b` (`1.1`).

use super::pattern::{RoutePatternPart, RoutePatternPathSegment};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

/// Digit-wise comparable precedence value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Precedence {
    digits: SmallVec<[u8; 8]>,
}

impl Precedence {
    #[must_use]
    pub fn digits(&self) -> &[u8] {
        &self.digits
    }
}

impl Ord for Precedence {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.digits.len().max(other.digits.len());
        for i in 0..len {
            let left = self.digits.get(i).copied().unwrap_or(0);
            let right = other.digits.get(i).copied().unwrap_or(0);
            match left.cmp(&right) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Precedence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Precedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Precedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.digits.split_first() {
            None => f.write_str("0"),
            Some((first, rest)) => {
                write!(f, "{first}")?;
                if !rest.is_empty() {
                    f.write_str(".")?;
                    for d in rest {
                        write!(f, "{d}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

pub(crate) fn compute_inbound(segments: &[RoutePatternPathSegment]) -> Precedence {
    Precedence {
        digits: segments.iter().map(inbound_digit).collect(),
    }
}

pub(crate) fn compute_outbound(segments: &[RoutePatternPathSegment]) -> Precedence {
    Precedence {
        digits: segments.iter().map(outbound_digit).collect(),
    }
}

fn inbound_digit(segment: &RoutePatternPathSegment) -> u8 {
    if segment.parts.len() > 1 {
        return 2;
    }
    match segment.parts.first() {
        Some(RoutePatternPart::Parameter(p)) => {
            let digit = if p.is_catch_all() { 5 } else { 3 };
            if p.policies.is_empty() {
                digit
            } else {
                digit - 1
            }
        }
        _ => 1,
    }
}

fn outbound_digit(segment: &RoutePatternPathSegment) -> u8 {
    if segment.parts.len() > 1 {
        return 4;
    }
    match segment.parts.first() {
        Some(RoutePatternPart::Parameter(p)) => {
            let digit = if p.is_catch_all() { 1 } else { 3 };
            if p.policies.is_empty() {
                digit
            } else {
                digit + 1
            }
        }
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use crate::patterns::parse;

    fn inbound(template: &str) -> String {
        parse(template).expect("template").inbound_precedence().to_string()
    }

    fn outbound(template: &str) -> String {
        parse(template).expect("template").outbound_precedence().to_string()
    }

    #[test]
    fn digits_per_segment_kind() {
        assert_eq!(inbound("Home/{id:int}/{name}/{*rest}"), "1.235");
        assert_eq!(inbound("{a}.{b}"), "2");
        assert_eq!(outbound("Home/{id:int}/{name}/{*rest}"), "5.431");
        assert_eq!(inbound(""), "0");
    }

    #[test]
    fn literal_routes_sort_before_parameters() {
        let literal = crate::patterns::parse("users/me").expect("t").inbound_precedence();
        let param = crate::patterns::parse("users/{id}").expect("t").inbound_precedence();
        let constrained = crate::patterns::parse("users/{id:int}").expect("t").inbound_precedence();
        assert!(literal < constrained);
        assert!(constrained < param);
    }

    #[test]
    fn shorter_pattern_sorts_first_inbound() {
        let short = crate::patterns::parse("a").expect("t").inbound_precedence();
        let long = crate::patterns::parse("a/b").expect("t").inbound_precedence();
        assert!(short < long);
    }
}
