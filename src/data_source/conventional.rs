use crate::endpoint::EndpointConvention;
use crate::error::Result;
use crate::patterns::{
    resolve_policies, ParameterPolicy, ParameterPolicyFactory, ParameterPolicyReference,
    RouteDirection, RoutePattern, RoutePatternFactory,
};
use crate::route_values::RouteValueDictionary;
use std::fmt;
use std::sync::Arc;

/// A shared template applied to every action it can reach.
///
/// Parsed and resolved when it is registered, so a bad template or an unknown
/// constraint fails at configuration time rather than on the first rebuild.
#[derive(Clone)]
pub struct ConventionalRouteEntry {
    pub route_name: Option<String>,
    pub pattern: Arc<RoutePattern>,
    /// Defaults supplied outside the template text.
    pub non_inline_defaults: RouteValueDictionary,
    pub data_tokens: RouteValueDictionary,
    pub conventions: Vec<EndpointConvention>,
    policies: Vec<(String, Vec<ParameterPolicy>)>,
}

impl ConventionalRouteEntry {
    pub fn new(
        route_name: Option<&str>,
        template: &str,
        defaults: Option<&RouteValueDictionary>,
        constraints: &[(String, Vec<ParameterPolicyReference>)],
        data_tokens: Option<&RouteValueDictionary>,
        policy_factory: &dyn ParameterPolicyFactory,
    ) -> Result<Self> {
        let pattern = RoutePatternFactory::parse(template, defaults, constraints, None)?;
        let policies = resolve_policies(&pattern, policy_factory)?;
        Ok(Self {
            route_name: route_name.map(str::to_string),
            pattern: Arc::new(pattern),
            non_inline_defaults: defaults.cloned().unwrap_or_default(),
            data_tokens: data_tokens.cloned().unwrap_or_default(),
            conventions: Vec::new(),
            policies,
        })
    }

    #[must_use]
    pub fn with_convention(mut self, convention: EndpointConvention) -> Self {
        self.conventions.push(convention);
        self
    }

    /// Inline and explicit defaults together.
    #[must_use]
    pub fn merged_defaults(&self) -> &RouteValueDictionary {
        self.pattern.defaults()
    }

    /// Resolved policies attached to `parameter`, in declaration order.
    pub fn policies_for<'a>(
        &'a self,
        parameter: &'a str,
    ) -> impl Iterator<Item = &'a ParameterPolicy> + 'a {
        self.policies
            .iter()
            .filter(move |(name, _)| name.eq_ignore_ascii_case(parameter))
            .flat_map(|(_, policies)| policies.iter())
    }

    /// Whether `value` for `key` passes every constraint on that parameter.
    #[must_use]
    pub fn meets_constraints(&self, key: &str, value: &str) -> bool {
        let values = RouteValueDictionary::from([(key, value)]);
        self.policies_for(key)
            .filter_map(ParameterPolicy::as_constraint)
            .all(|c| c.matches(key, &values, RouteDirection::UrlGeneration))
    }

    /// Whether an action with `required` route values can be reached through
    /// this template.
    ///
    /// Every required key with a value must be matched by a default (compared
    /// case-insensitively) or by a parameter whose constraints accept it. A
    /// key the action leaves empty must have neither a parameter nor a
    /// non-empty default.
    #[must_use]
    pub fn is_applicable(&self, required: &RouteValueDictionary) -> bool {
        required.iter().all(|(key, value)| {
            let value = crate::route_values::value_to_string(value).filter(|v| !v.trim().is_empty());
            let parameter = self.pattern.get_parameter(key);
            match value {
                None => {
                    parameter.is_none()
                        && self
                            .merged_defaults()
                            .get_string(key)
                            .is_none_or(|d| d.is_empty())
                }
                Some(value) => {
                    let default_matches = self
                        .merged_defaults()
                        .get_string(key)
                        .is_some_and(|d| d.eq_ignore_ascii_case(&value));
                    default_matches || (parameter.is_some() && self.meets_constraints(key, &value))
                }
            }
        })
    }
}

impl fmt::Debug for ConventionalRouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConventionalRouteEntry")
            .field("route_name", &self.route_name)
            .field("pattern", &self.pattern.raw_text())
            .field("data_tokens", &self.data_tokens)
            .field("conventions", &self.conventions.len())
            .finish()
    }
}
