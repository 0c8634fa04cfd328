//! Parameter policies: route constraints and outbound transformers.
//!
//! Inline policy text (`{id:int:min(1)}`) is resolved through a
//! [`ParameterPolicyFactory`]. The default factory knows the usual constraint
//! vocabulary and can be extended by name.

use super::pattern::{ParameterPolicyReference, RoutePatternParameterPart};
use crate::error::{Result, RoutingError};
use crate::route_values::RouteValueDictionary;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Whether a constraint is checked while matching a request or generating a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDirection {
    IncomingRequest,
    UrlGeneration,
}

/// Predicate over one route value.
pub trait RouteConstraint: Send + Sync {
    fn matches(&self, key: &str, values: &RouteValueDictionary, direction: RouteDirection) -> bool;

    /// Name used in logs and debug output.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Rewrites a route value before it is written into a generated URL.
pub trait OutboundParameterTransformer: Send + Sync {
    /// `None` leaves the parameter unresolved.
    fn transform_outbound(&self, value: Option<&str>) -> Option<String>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A resolved parameter policy.
#[derive(Clone)]
pub enum ParameterPolicy {
    Constraint(Arc<dyn RouteConstraint>),
    Transformer(Arc<dyn OutboundParameterTransformer>),
}

impl ParameterPolicy {
    #[must_use]
    pub fn constraint(constraint: impl RouteConstraint + 'static) -> Self {
        ParameterPolicy::Constraint(Arc::new(constraint))
    }

    #[must_use]
    pub fn transformer(transformer: impl OutboundParameterTransformer + 'static) -> Self {
        ParameterPolicy::Transformer(Arc::new(transformer))
    }

    #[must_use]
    pub fn as_constraint(&self) -> Option<&Arc<dyn RouteConstraint>> {
        match self {
            ParameterPolicy::Constraint(c) => Some(c),
            ParameterPolicy::Transformer(_) => None,
        }
    }

    #[must_use]
    pub fn as_transformer(&self) -> Option<&Arc<dyn OutboundParameterTransformer>> {
        match self {
            ParameterPolicy::Transformer(t) => Some(t),
            ParameterPolicy::Constraint(_) => None,
        }
    }
}

impl fmt::Debug for ParameterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterPolicy::Constraint(c) => write!(f, "Constraint({})", c.name()),
            ParameterPolicy::Transformer(t) => write!(f, "Transformer({})", t.name()),
        }
    }
}

/// Turns policy references into policies.
pub trait ParameterPolicyFactory: Send + Sync {
    fn create(
        &self,
        parameter: Option<&RoutePatternParameterPart>,
        reference: &ParameterPolicyReference,
    ) -> Result<ParameterPolicy>;
}

type PolicyBuilder = Arc<dyn Fn(Option<&str>) -> Result<ParameterPolicy> + Send + Sync>;

/// Factory backed by a name → builder map.
///
/// Optional parameters get their constraints wrapped so that an absent value
/// passes.
#[derive(Clone)]
pub struct DefaultParameterPolicyFactory {
    builders: HashMap<String, PolicyBuilder>,
}

impl DefaultParameterPolicyFactory {
    #[must_use]
    pub fn new() -> Self {
        let mut factory = Self {
            builders: HashMap::new(),
        };
        factory.add_policy("int", |_| Ok(ParameterPolicy::constraint(IntRouteConstraint)));
        factory.add_policy("long", |_| Ok(ParameterPolicy::constraint(LongRouteConstraint)));
        factory.add_policy("bool", |_| Ok(ParameterPolicy::constraint(BoolRouteConstraint)));
        factory.add_policy("double", |_| {
            Ok(ParameterPolicy::constraint(DoubleRouteConstraint))
        });
        factory.add_policy("alpha", |_| Ok(ParameterPolicy::constraint(AlphaRouteConstraint)));
        factory.add_policy("required", |_| {
            Ok(ParameterPolicy::constraint(RequiredRouteConstraint))
        });
        factory.add_policy("min", |args| {
            let min = single_integer("min", args)?;
            Ok(ParameterPolicy::constraint(RangeRouteConstraint {
                min: Some(min),
                max: None,
            }))
        });
        factory.add_policy("max", |args| {
            let max = single_integer("max", args)?;
            Ok(ParameterPolicy::constraint(RangeRouteConstraint {
                min: None,
                max: Some(max),
            }))
        });
        factory.add_policy("range", |args| {
            let (min, max) = integer_pair("range", args)?;
            Ok(ParameterPolicy::constraint(RangeRouteConstraint {
                min: Some(min),
                max: Some(max),
            }))
        });
        factory.add_policy("minlength", |args| {
            let min = length_argument("minlength", single_integer("minlength", args)?)?;
            Ok(ParameterPolicy::constraint(LengthRouteConstraint {
                min,
                max: usize::MAX,
            }))
        });
        factory.add_policy("maxlength", |args| {
            let max = length_argument("maxlength", single_integer("maxlength", args)?)?;
            Ok(ParameterPolicy::constraint(LengthRouteConstraint { min: 0, max }))
        });
        factory.add_policy("length", |args| {
            let raw = args.unwrap_or_default();
            let (min, max) = if raw.contains(',') {
                let (a, b) = integer_pair("length", args)?;
                (length_argument("length", a)?, length_argument("length", b)?)
            } else {
                let exact = length_argument("length", single_integer("length", args)?)?;
                (exact, exact)
            };
            if min > max {
                return Err(RoutingError::InvalidConstraintArgument {
                    constraint: "length".to_string(),
                    reason: format!("minimum {min} is greater than maximum {max}"),
                });
            }
            Ok(ParameterPolicy::constraint(LengthRouteConstraint { min, max }))
        });
        factory.add_policy("regex", |args| {
            let pattern = args.ok_or_else(|| RoutingError::InvalidConstraintArgument {
                constraint: "regex".to_string(),
                reason: "a pattern is required".to_string(),
            })?;
            Ok(ParameterPolicy::constraint(RegexRouteConstraint::new(pattern)?))
        });
        factory
    }

    /// Register (or replace) a policy by name. Names are case-insensitive.
    pub fn add_policy<F>(&mut self, name: &str, builder: F)
    where
        F: Fn(Option<&str>) -> Result<ParameterPolicy> + Send + Sync + 'static,
    {
        self.builders
            .insert(name.to_ascii_lowercase(), Arc::new(builder));
    }

    fn resolve_inline(&self, parameter: &str, content: &str) -> Result<ParameterPolicy> {
        let (name, args) = match content.find('(') {
            Some(open) if content.ends_with(')') => {
                (&content[..open], Some(&content[open + 1..content.len() - 1]))
            }
            _ => (content, None),
        };
        let builder = self
            .builders
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| RoutingError::UnknownConstraint {
                parameter: parameter.to_string(),
                reference: content.to_string(),
            })?;
        builder(args)
    }
}

impl Default for DefaultParameterPolicyFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefaultParameterPolicyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.builders.keys().collect();
        names.sort();
        f.debug_struct("DefaultParameterPolicyFactory")
            .field("policies", &names)
            .finish()
    }
}

impl ParameterPolicyFactory for DefaultParameterPolicyFactory {
    fn create(
        &self,
        parameter: Option<&RoutePatternParameterPart>,
        reference: &ParameterPolicyReference,
    ) -> Result<ParameterPolicy> {
        let name = parameter.map(|p| p.name.as_str()).unwrap_or_default();
        let policy = match reference {
            ParameterPolicyReference::Content(content) => self.resolve_inline(name, content)?,
            ParameterPolicyReference::Policy(policy) => policy.clone(),
        };
        match (&policy, parameter) {
            (ParameterPolicy::Constraint(inner), Some(p)) if p.is_optional() => Ok(
                ParameterPolicy::Constraint(Arc::new(OptionalRouteConstraint {
                    inner: Arc::clone(inner),
                })),
            ),
            _ => Ok(policy),
        }
    }
}

fn single_integer(constraint: &str, args: Option<&str>) -> Result<i64> {
    let raw = args.map(str::trim).unwrap_or_default();
    raw.parse::<i64>()
        .map_err(|_| RoutingError::InvalidConstraintArgument {
            constraint: constraint.to_string(),
            reason: format!("'{raw}' is not an integer"),
        })
}

fn integer_pair(constraint: &str, args: Option<&str>) -> Result<(i64, i64)> {
    let raw = args.unwrap_or_default();
    let (a, b) = raw
        .split_once(',')
        .ok_or_else(|| RoutingError::InvalidConstraintArgument {
            constraint: constraint.to_string(),
            reason: format!("expected two arguments, got '{raw}'"),
        })?;
    Ok((
        single_integer(constraint, Some(a))?,
        single_integer(constraint, Some(b))?,
    ))
}

fn length_argument(constraint: &str, value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| RoutingError::InvalidConstraintArgument {
        constraint: constraint.to_string(),
        reason: format!("length {value} must not be negative"),
    })
}

fn route_string(key: &str, values: &RouteValueDictionary) -> Option<String> {
    values.get_string(key).map(|v| v.into_owned())
}

/// Value parses as a 32-bit integer.
#[derive(Debug, Clone, Copy)]
pub struct IntRouteConstraint;

impl RouteConstraint for IntRouteConstraint {
    fn matches(&self, key: &str, values: &RouteValueDictionary, _: RouteDirection) -> bool {
        route_string(key, values).is_some_and(|v| v.parse::<i32>().is_ok())
    }

    fn name(&self) -> &str {
        "int"
    }
}

/// Value parses as a 64-bit integer.
#[derive(Debug, Clone, Copy)]
pub struct LongRouteConstraint;

impl RouteConstraint for LongRouteConstraint {
    fn matches(&self, key: &str, values: &RouteValueDictionary, _: RouteDirection) -> bool {
        route_string(key, values).is_some_and(|v| v.parse::<i64>().is_ok())
    }

    fn name(&self) -> &str {
        "long"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoolRouteConstraint;

impl RouteConstraint for BoolRouteConstraint {
    fn matches(&self, key: &str, values: &RouteValueDictionary, _: RouteDirection) -> bool {
        route_string(key, values)
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false"))
    }

    fn name(&self) -> &str {
        "bool"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DoubleRouteConstraint;

impl RouteConstraint for DoubleRouteConstraint {
    fn matches(&self, key: &str, values: &RouteValueDictionary, _: RouteDirection) -> bool {
        route_string(key, values).is_some_and(|v| v.parse::<f64>().is_ok_and(f64::is_finite))
    }

    fn name(&self) -> &str {
        "double"
    }
}

/// ASCII letters only.
#[derive(Debug, Clone, Copy)]
pub struct AlphaRouteConstraint;

impl RouteConstraint for AlphaRouteConstraint {
    fn matches(&self, key: &str, values: &RouteValueDictionary, _: RouteDirection) -> bool {
        route_string(key, values).is_some_and(|v| v.chars().all(|c| c.is_ascii_alphabetic()))
    }

    fn name(&self) -> &str {
        "alpha"
    }
}

/// Present and non-empty.
#[derive(Debug, Clone, Copy)]
pub struct RequiredRouteConstraint;

impl RouteConstraint for RequiredRouteConstraint {
    fn matches(&self, key: &str, values: &RouteValueDictionary, _: RouteDirection) -> bool {
        route_string(key, values).is_some_and(|v| !v.is_empty())
    }

    fn name(&self) -> &str {
        "required"
    }
}

/// Integer value within optional inclusive bounds (`min`, `max`, `range`).
#[derive(Debug, Clone, Copy)]
pub struct RangeRouteConstraint {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl RouteConstraint for RangeRouteConstraint {
    fn matches(&self, key: &str, values: &RouteValueDictionary, _: RouteDirection) -> bool {
        let Some(value) = route_string(key, values).and_then(|v| v.parse::<i64>().ok()) else {
            return false;
        };
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }

    fn name(&self) -> &str {
        "range"
    }
}

/// Character count within inclusive bounds.
#[derive(Debug, Clone, Copy)]
pub struct LengthRouteConstraint {
    pub min: usize,
    pub max: usize,
}

impl RouteConstraint for LengthRouteConstraint {
    fn matches(&self, key: &str, values: &RouteValueDictionary, _: RouteDirection) -> bool {
        route_string(key, values).is_some_and(|v| {
            let len = v.chars().count();
            len >= self.min && len <= self.max
        })
    }

    fn name(&self) -> &str {
        "length"
    }
}

/// Case-insensitive regular expression. Missing values are tested as `""`.
#[derive(Debug, Clone)]
pub struct RegexRouteConstraint {
    regex: Regex,
}

impl RegexRouteConstraint {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| RoutingError::InvalidConstraintArgument {
                constraint: "regex".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { regex })
    }

    /// Anchored form used for plain-string constraints in route configuration.
    pub fn anchored(pattern: &str) -> Result<Self> {
        Self::new(&format!("^({pattern})$"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl RouteConstraint for RegexRouteConstraint {
    fn matches(&self, key: &str, values: &RouteValueDictionary, _: RouteDirection) -> bool {
        let value = route_string(key, values).unwrap_or_default();
        self.regex.is_match(&value)
    }

    fn name(&self) -> &str {
        "regex"
    }
}

/// Lets an absent optional value through; otherwise defers to the inner constraint.
#[derive(Clone)]
pub struct OptionalRouteConstraint {
    pub inner: Arc<dyn RouteConstraint>,
}

impl RouteConstraint for OptionalRouteConstraint {
    fn matches(&self, key: &str, values: &RouteValueDictionary, direction: RouteDirection) -> bool {
        match values.get_string(key) {
            None => true,
            Some(_) => self.inner.matches(key, values, direction),
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(content: &str, value: &str) -> bool {
        let factory = DefaultParameterPolicyFactory::new();
        let policy = factory
            .create(
                Some(&RoutePatternParameterPart::new("x")),
                &ParameterPolicyReference::Content(content.to_string()),
            )
            .expect("policy");
        let constraint = policy.as_constraint().expect("constraint").clone();
        let values = RouteValueDictionary::from([("x", value)]);
        constraint.matches("x", &values, RouteDirection::IncomingRequest)
    }

    #[test]
    fn numeric_constraints() {
        assert!(check("int", "42"));
        assert!(!check("int", "4.2"));
        assert!(!check("int", "99999999999"));
        assert!(check("long", "99999999999"));
        assert!(check("double", "4.2"));
        assert!(check("min(3)", "3"));
        assert!(!check("min(3)", "2"));
        assert!(check("range(1,5)", "5"));
        assert!(!check("range(1,5)", "6"));
        assert!(!check("max(10)", "abc"));
    }

    #[test]
    fn text_constraints() {
        assert!(check("alpha", "abcXYZ"));
        assert!(!check("alpha", "abc1"));
        assert!(check("bool", "TRUE"));
        assert!(check("length(3)", "abc"));
        assert!(check("length(2,4)", "abcd"));
        assert!(!check("maxlength(2)", "abc"));
        assert!(check("minlength(2)", "ab"));
        assert!(!check("required", ""));
        assert!(check("regex(^[a-z]+-\\d+$)", "ABC-12"));
    }

    #[test]
    fn unknown_and_malformed_constraints_fail_fast() {
        let factory = DefaultParameterPolicyFactory::new();
        let part = RoutePatternParameterPart::new("id");
        let unknown = factory.create(
            Some(&part),
            &ParameterPolicyReference::Content("nope".to_string()),
        );
        assert!(matches!(unknown, Err(RoutingError::UnknownConstraint { .. })));

        let bad = factory.create(
            Some(&part),
            &ParameterPolicyReference::Content("min(x)".to_string()),
        );
        assert!(matches!(bad, Err(RoutingError::InvalidConstraintArgument { .. })));
    }

    #[test]
    fn optional_parameters_accept_missing_values() {
        let factory = DefaultParameterPolicyFactory::new();
        let mut part = RoutePatternParameterPart::new("id");
        part.kind = super::super::pattern::ParameterKind::Optional;
        let policy = factory
            .create(Some(&part), &ParameterPolicyReference::Content("int".to_string()))
            .expect("policy");
        let constraint = policy.as_constraint().expect("constraint").clone();
        let empty = RouteValueDictionary::new();
        assert!(constraint.matches("id", &empty, RouteDirection::IncomingRequest));
        let bad = RouteValueDictionary::from([("id", "x")]);
        assert!(!constraint.matches("id", &bad, RouteDirection::IncomingRequest));
    }

    #[test]
    fn custom_policies_can_be_registered() {
        struct Slugify;
        impl OutboundParameterTransformer for Slugify {
            fn transform_outbound(&self, value: Option<&str>) -> Option<String> {
                value.map(|v| v.to_ascii_lowercase().replace(' ', "-"))
            }
        }

        let mut factory = DefaultParameterPolicyFactory::new();
        factory.add_policy("slugify", |_| Ok(ParameterPolicy::transformer(Slugify)));
        let policy = factory
            .create(None, &ParameterPolicyReference::Content("SLUGIFY".to_string()))
            .expect("policy");
        let transformer = policy.as_transformer().expect("transformer");
        assert_eq!(transformer.transform_outbound(Some("Hello World")).as_deref(), Some("hello-world"));
    }
}
