//! # Routing Configuration
//!
//! Route options, conventional routes and an optional action manifest,
//! loaded from YAML and overridable from the environment.
//!
//! ## File Format
//!
//! ```yaml
//! options:
//!   lowercase_urls: true
//!   append_trailing_slash: false
//!
//! routes:
//!   - name: default
//!     pattern: "{controller=Home}/{action=Index}/{id?}"
//!     constraints:
//!       id: "\\d+"
//!   - name: blog
//!     pattern: "blog/{*slug}"
//!     defaults: { controller: Blog, action: Article }
//!
//! actions:
//!   - controller: Home
//!     action: Index
//!   - controller: Orders
//!     action: Create
//!     template: "api/[controller]"
//!     methods: [POST]
//!     consumes: [application/json]
//! ```
//!
//! A plain-string constraint is a regular expression that must match the
//! whole value, case-insensitively.
//!
//! ## Environment Variables
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `MVCR_LOWERCASE_URLS` | [`RouteOptions::lowercase_urls`] |
//! | `MVCR_LOWERCASE_QUERY_STRINGS` | [`RouteOptions::lowercase_query_strings`] |
//! | `MVCR_APPEND_TRAILING_SLASH` | [`RouteOptions::append_trailing_slash`] |
//!
//! Accepted values are `1`/`true`/`yes`/`on` and `0`/`false`/`no`/`off`;
//! anything else leaves the setting unchanged.
//!
//! ```rust
//! use mvcrouter::config::RouteOptions;
//!
//! let options = RouteOptions::from_env();
//! println!("lowercase urls: {}", options.lowercase_urls);
//! ```

use crate::actions::{ActionConstraintMetadata, ActionDescriptor, AttributeRouteInfo};
use crate::data_source::ConventionalRouteEntry;
use crate::error::{Result, RoutingError};
use crate::ids::ActionId;
use crate::patterns::policies::RegexRouteConstraint;
use crate::patterns::{ParameterPolicy, ParameterPolicyFactory, ParameterPolicyReference};
use crate::route_values::RouteValueDictionary;
use anyhow::Context;
use http::Method;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::Path;

/// URL shaping applied by link generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouteOptions {
    /// Lowercase the generated path.
    pub lowercase_urls: bool,
    /// Also lowercase the query string; only honored with `lowercase_urls`.
    pub lowercase_query_strings: bool,
    /// Add a trailing `/` to generated paths.
    pub append_trailing_slash: bool,
}

impl RouteOptions {
    /// Defaults with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `MVCR_*` overrides on top of `self`.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str, current: bool| {
            lookup(name)
                .and_then(|v| parse_flag(&v))
                .unwrap_or(current)
        };
        self.lowercase_urls = flag("MVCR_LOWERCASE_URLS", self.lowercase_urls);
        self.lowercase_query_strings =
            flag("MVCR_LOWERCASE_QUERY_STRINGS", self.lowercase_query_strings);
        self.append_trailing_slash = flag("MVCR_APPEND_TRAILING_SLASH", self.append_trailing_slash);
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// One conventional route.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteDefinition {
    #[serde(default)]
    pub name: Option<String>,
    pub pattern: String,
    #[serde(default)]
    pub defaults: RouteValueDictionary,
    /// Parameter name → regular expression.
    #[serde(default)]
    pub constraints: BTreeMap<String, String>,
    #[serde(default)]
    pub data_tokens: RouteValueDictionary,
}

impl RouteDefinition {
    /// Parse the template and resolve its constraints.
    pub fn to_entry(&self, policy_factory: &dyn ParameterPolicyFactory) -> Result<ConventionalRouteEntry> {
        let mut constraints = Vec::with_capacity(self.constraints.len());
        for (parameter, expression) in &self.constraints {
            let constraint = RegexRouteConstraint::anchored(expression)?;
            constraints.push((
                parameter.clone(),
                vec![ParameterPolicyReference::Policy(ParameterPolicy::constraint(constraint))],
            ));
        }
        ConventionalRouteEntry::new(
            self.name.as_deref(),
            &self.pattern,
            Some(&self.defaults),
            &constraints,
            Some(&self.data_tokens),
            policy_factory,
        )
    }
}

/// One entry of the action manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionDefinition {
    /// ULID; generated when absent or invalid.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    pub controller: String,
    pub action: String,
    /// Attribute route template. Conventional routing when absent.
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub consumes: Vec<String>,
}

impl ActionDefinition {
    pub fn to_descriptor(&self) -> Result<ActionDescriptor> {
        let mut action = ActionDescriptor::new(&self.controller, &self.action);
        action.id = ActionId::parse_or_new(self.id.as_deref());
        if let Some(area) = self.area.as_deref().filter(|a| !a.is_empty()) {
            action = action.with_area(area);
        }
        if let Some(template) = &self.template {
            action.attribute_route_info = Some(AttributeRouteInfo {
                template: template.clone(),
                order: self.order,
                name: self.name.clone(),
                ..AttributeRouteInfo::default()
            });
        }
        if !self.methods.is_empty() {
            let methods = self
                .methods
                .iter()
                .map(String::as_str)
                .map(parse_method)
                .collect::<Result<Vec<_>>>()?;
            action = action.with_constraint(ActionConstraintMetadata::http_methods(methods));
        }
        if !self.consumes.is_empty() {
            action = action.with_constraint(ActionConstraintMetadata::consumes(self.consumes.iter().cloned()));
        }
        Ok(action)
    }
}

fn parse_method(text: &str) -> Result<Method> {
    Method::from_bytes(text.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| RoutingError::Configuration(format!("invalid HTTP method '{text}'")))
}

/// Top-level routing document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub options: RouteOptions,
    pub routes: Vec<RouteDefinition>,
    pub actions: Vec<ActionDefinition>,
}

impl RoutingConfig {
    /// Every route, in declaration order. The first bad route fails the lot.
    pub fn conventional_routes(
        &self,
        policy_factory: &dyn ParameterPolicyFactory,
    ) -> Result<Vec<ConventionalRouteEntry>> {
        self.routes.iter().map(|r| r.to_entry(policy_factory)).collect()
    }

    pub fn action_descriptors(&self) -> Result<Vec<ActionDescriptor>> {
        self.actions.iter().map(ActionDefinition::to_descriptor).collect()
    }
}

/// Parse a YAML routing document.
pub fn parse_config(text: &str) -> anyhow::Result<RoutingConfig> {
    let config: RoutingConfig = serde_yaml::from_str(text).context("invalid routing configuration")?;
    Ok(config)
}

/// Read and parse a YAML routing document; environment overrides are applied
/// to its options.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<RoutingConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read routing configuration {}", path.display()))?;
    let mut config =
        parse_config(&text).with_context(|| format!("failed to load {}", path.display()))?;
    config.options = config.options.with_env_overrides();
    Ok(config)
}
