use super::pattern::{
    ParameterPolicyReference, RoutePattern, RoutePatternParameterPart, RoutePatternPart,
    RoutePatternPathSegment,
};
use super::policies::{ParameterPolicy, ParameterPolicyFactory};
use crate::error::{Result, RoutingError};
use crate::route_values::{value_to_string, RouteValueDictionary};

/// Builds [`RoutePattern`]s from parsed segments plus out-of-band defaults,
/// policies and required values.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutePatternFactory;

impl RoutePatternFactory {
    /// Parse `template` and combine it with explicit defaults and policies.
    pub fn parse(
        template: &str,
        defaults: Option<&RouteValueDictionary>,
        parameter_policies: &[(String, Vec<ParameterPolicyReference>)],
        required_values: Option<&RouteValueDictionary>,
    ) -> Result<RoutePattern> {
        let segments = super::parser::parse_segments(template)?;
        Self::pattern(
            Some(template.to_string()),
            defaults,
            parameter_policies,
            required_values,
            segments,
        )
    }

    /// Re-combine an existing pattern with extra defaults, policies and
    /// required values.
    pub fn combine(
        original: &RoutePattern,
        defaults: Option<&RouteValueDictionary>,
        parameter_policies: &[(String, Vec<ParameterPolicyReference>)],
        required_values: Option<&RouteValueDictionary>,
    ) -> Result<RoutePattern> {
        let mut merged_defaults = original.defaults.clone();
        if let Some(extra) = defaults {
            merged_defaults.extend_from(extra);
        }
        // Inline policies already live on the parameters; only carry over the
        // ones that were attached from outside.
        let mut merged_policies: Vec<(String, Vec<ParameterPolicyReference>)> = original
            .parameter_policies
            .iter()
            .filter(|(name, _)| original.get_parameter(name).is_none())
            .cloned()
            .collect();
        merged_policies.extend(parameter_policies.iter().cloned());
        Self::pattern(
            original.raw_text.clone(),
            Some(&merged_defaults),
            &merged_policies,
            required_values,
            original.path_segments.clone(),
        )
    }

    /// Assemble a pattern from segments.
    ///
    /// Inline defaults are merged into `defaults` (a different explicit value
    /// is an error); explicit policies come before inline ones.
    pub fn pattern(
        raw_text: Option<String>,
        defaults: Option<&RouteValueDictionary>,
        parameter_policies: &[(String, Vec<ParameterPolicyReference>)],
        required_values: Option<&RouteValueDictionary>,
        mut segments: Vec<RoutePatternPathSegment>,
    ) -> Result<RoutePattern> {
        let mut updated_defaults = defaults.cloned().unwrap_or_default();
        let mut updated_policies: Vec<(String, Vec<ParameterPolicyReference>)> = Vec::new();
        for (name, refs) in parameter_policies {
            push_policies(&mut updated_policies, name, refs.iter().cloned());
        }

        let mut parameters = Vec::new();
        for segment in &mut segments {
            for part in &mut segment.parts {
                let RoutePatternPart::Parameter(parameter) = part else {
                    continue;
                };
                merge_default(parameter, &mut updated_defaults)?;

                let explicit = updated_policies
                    .iter()
                    .find(|(n, _)| n.eq_ignore_ascii_case(&parameter.name))
                    .map(|(_, refs)| refs.clone())
                    .unwrap_or_default();
                let inline = std::mem::take(&mut parameter.policies);
                push_policies(&mut updated_policies, &parameter.name, inline.iter().cloned());
                let mut combined = explicit;
                combined.extend(inline);
                parameter.policies = combined;

                parameters.push(parameter.clone());
            }
        }

        let pattern = RoutePattern {
            raw_text,
            defaults: updated_defaults,
            parameter_policies: updated_policies,
            required_values: RouteValueDictionary::new(),
            parameters,
            path_segments: segments,
        };
        match required_values {
            Some(required) => Self::with_required_values(pattern, required),
            None => Ok(pattern),
        }
    }

    fn with_required_values(
        mut pattern: RoutePattern,
        required: &RouteValueDictionary,
    ) -> Result<RoutePattern> {
        for (key, value) in required.iter() {
            if pattern.get_parameter(key).is_some() {
                continue;
            }
            let empty = value_to_string(value).is_none_or(|v| v.is_empty());
            if empty {
                continue;
            }
            if !RouteValueDictionary::values_equal(pattern.defaults.get(key), Some(value)) {
                return Err(RoutingError::template(
                    &pattern.raw_text(),
                    format!(
                        "the required value '{key}' is neither a parameter nor a matching default"
                    ),
                ));
            }
        }
        pattern.required_values = required.clone();
        Ok(pattern)
    }
}

fn merge_default(
    parameter: &mut RoutePatternParameterPart,
    defaults: &mut RouteValueDictionary,
) -> Result<()> {
    match (&parameter.default, defaults.get(&parameter.name)) {
        (Some(inline), Some(explicit)) => {
            if !RouteValueDictionary::values_equal(Some(inline), Some(explicit)) {
                return Err(RoutingError::ConflictingDefault {
                    parameter: parameter.name.clone(),
                });
            }
        }
        (Some(inline), None) => {
            defaults.insert(parameter.name.clone(), inline.clone());
        }
        (None, Some(explicit)) => {
            if !parameter.is_optional() {
                parameter.default = Some(explicit.clone());
            }
        }
        (None, None) => {}
    }
    Ok(())
}

fn push_policies(
    policies: &mut Vec<(String, Vec<ParameterPolicyReference>)>,
    name: &str,
    refs: impl Iterator<Item = ParameterPolicyReference>,
) {
    match policies
        .iter_mut()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
    {
        Some((_, existing)) => existing.extend(refs),
        None => policies.push((name.to_string(), refs.collect())),
    }
}

/// Resolve every policy reference of `pattern` into concrete policies.
///
/// Unknown inline constraints surface here, at build time, never per request.
pub fn resolve_policies(
    pattern: &RoutePattern,
    factory: &dyn ParameterPolicyFactory,
) -> Result<Vec<(String, Vec<ParameterPolicy>)>> {
    let mut resolved = Vec::with_capacity(pattern.parameter_policies.len());
    for (name, refs) in &pattern.parameter_policies {
        let parameter = pattern.get_parameter(name);
        let mut policies = Vec::with_capacity(refs.len());
        for reference in refs {
            policies.push(factory.create(parameter, reference)?);
        }
        resolved.push((name.clone(), policies));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::DefaultParameterPolicyFactory;
    use serde_json::json;

    #[test]
    fn explicit_defaults_flow_into_parameters() {
        let defaults = RouteValueDictionary::from([("action", "Index"), ("area", "Admin")]);
        let pattern = RoutePatternFactory::parse("{controller}/{action}", Some(&defaults), &[], None)
            .expect("pattern");
        let action = pattern.get_parameter("action").expect("action");
        assert_eq!(action.default, Some(json!("Index")));
        assert_eq!(pattern.defaults().get_string("area").as_deref(), Some("Admin"));
    }

    #[test]
    fn conflicting_defaults_are_rejected() {
        let defaults = RouteValueDictionary::from([("action", "Other")]);
        let result = RoutePatternFactory::parse("{controller}/{action=Index}", Some(&defaults), &[], None);
        assert_eq!(
            result.err(),
            Some(RoutingError::ConflictingDefault {
                parameter: "action".to_string()
            })
        );

        let same = RouteValueDictionary::from([("action", "index")]);
        assert!(RoutePatternFactory::parse("{controller}/{action=Index}", Some(&same), &[], None).is_ok());
    }

    #[test]
    fn explicit_policies_precede_inline_ones() {
        let explicit = vec![(
            "id".to_string(),
            vec![ParameterPolicyReference::Content("min(1)".to_string())],
        )];
        let pattern = RoutePatternFactory::parse("{id:int}", None, &explicit, None).expect("pattern");
        let id = pattern.get_parameter("id").expect("id");
        let contents: Vec<_> = id
            .policies
            .iter()
            .filter_map(|p| match p {
                ParameterPolicyReference::Content(c) => Some(c.as_str()),
                ParameterPolicyReference::Policy(_) => None,
            })
            .collect();
        assert_eq!(contents, vec!["min(1)", "int"]);

        let resolved = resolve_policies(&pattern, &DefaultParameterPolicyFactory::new()).expect("policies");
        assert_eq!(resolved[0].1.len(), 2);
    }

    #[test]
    fn required_values_must_be_parameters_or_defaults() {
        let defaults = RouteValueDictionary::from([("controller", "Blog")]);
        let ok = RouteValueDictionary::from([("controller", "blog"), ("action", "Read"), ("area", "")]);
        let pattern = RoutePatternFactory::parse("posts/{action}", Some(&defaults), &[], Some(&ok))
            .expect("pattern");
        assert_eq!(pattern.required_values().len(), 3);

        let bad = RouteValueDictionary::from([("controller", "Home")]);
        assert!(RoutePatternFactory::parse("posts/{action}", Some(&defaults), &[], Some(&bad)).is_err());
    }

    #[test]
    fn unknown_inline_constraint_fails_at_resolution() {
        let pattern = RoutePatternFactory::parse("{id:bogus}", None, &[], None).expect("pattern");
        let result = resolve_policies(&pattern, &DefaultParameterPolicyFactory::new());
        assert!(matches!(result, Err(RoutingError::UnknownConstraint { .. })));
    }
}
