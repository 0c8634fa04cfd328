//! Action constraint capability set.
//!
//! Constraints are user code: any type implementing [`ActionConstraint`] (or
//! an [`ActionConstraintFactory`] producing one) can be attached to an action.
//! The built-in HTTP-method and consumes constraints are hoisted into endpoint
//! metadata so the dedicated matcher policies handle them.

use super::descriptor::ActionDescriptor;
use crate::context::HttpRequest;
use crate::media_type::MediaType;
use crate::route_values::RouteValueDictionary;
use http::Method;
use std::fmt;
use std::sync::Arc;

/// An action together with its materialized constraints.
#[derive(Clone)]
pub struct ActionSelectorCandidate {
    pub action: Arc<ActionDescriptor>,
    pub constraints: Vec<Arc<dyn ActionConstraint>>,
}

impl fmt::Debug for ActionSelectorCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSelectorCandidate")
            .field("action", &self.action.display_name)
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

/// What a constraint sees while it is evaluated.
pub struct ActionConstraintContext<'a> {
    /// Every candidate still in play at this order.
    pub candidates: &'a [ActionSelectorCandidate],
    pub current_candidate: &'a ActionSelectorCandidate,
    /// Route values extracted for the current candidate only.
    pub route_values: &'a RouteValueDictionary,
    pub request: &'a HttpRequest,
}

/// A predicate that can reject an otherwise path-matching action.
///
/// Constraints with a lower order run first and are authoritative. A panic
/// inside `accept` propagates to the caller.
pub trait ActionConstraint: Send + Sync {
    fn order(&self) -> i32;

    fn accept(&self, context: &ActionConstraintContext<'_>) -> bool;

    /// `true` for constraints that select on the request content type.
    fn is_consumes_constraint(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Produces constraint instances, optionally fresh for every request.
pub trait ActionConstraintFactory: Send + Sync {
    /// Reusable instances are created once and cached per action.
    fn is_reusable(&self) -> bool;

    fn create_instance(&self) -> Arc<dyn ActionConstraint>;
}

/// A constraint as declared on an action.
#[derive(Clone)]
pub enum ActionConstraintMetadata {
    HttpMethod(HttpMethodActionConstraint),
    Consumes(ConsumesActionConstraint),
    Custom(Arc<dyn ActionConstraint>),
    Factory(Arc<dyn ActionConstraintFactory>),
}

impl ActionConstraintMetadata {
    #[must_use]
    pub fn custom(constraint: impl ActionConstraint + 'static) -> Self {
        ActionConstraintMetadata::Custom(Arc::new(constraint))
    }

    #[must_use]
    pub fn http_methods(methods: impl IntoIterator<Item = Method>) -> Self {
        ActionConstraintMetadata::HttpMethod(HttpMethodActionConstraint::new(methods))
    }

    #[must_use]
    pub fn consumes<S: Into<String>>(content_types: impl IntoIterator<Item = S>) -> Self {
        ActionConstraintMetadata::Consumes(ConsumesActionConstraint::new(content_types))
    }

    /// Handled by a dedicated matcher policy instead of the constraint engine.
    #[must_use]
    pub fn is_hoisted(&self) -> bool {
        matches!(
            self,
            ActionConstraintMetadata::HttpMethod(_) | ActionConstraintMetadata::Consumes(_)
        )
    }
}

impl fmt::Debug for ActionConstraintMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionConstraintMetadata::HttpMethod(c) => f.debug_tuple("HttpMethod").field(c).finish(),
            ActionConstraintMetadata::Consumes(c) => f.debug_tuple("Consumes").field(c).finish(),
            ActionConstraintMetadata::Custom(c) => write!(f, "Custom({})", c.name()),
            ActionConstraintMetadata::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// Built-in HTTP method constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpMethodActionConstraint {
    pub http_methods: Vec<Method>,
}

impl HttpMethodActionConstraint {
    pub const ORDER: i32 = 100;

    #[must_use]
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            http_methods: methods.into_iter().collect(),
        }
    }
}

impl ActionConstraint for HttpMethodActionConstraint {
    fn order(&self) -> i32 {
        Self::ORDER
    }

    fn accept(&self, context: &ActionConstraintContext<'_>) -> bool {
        self.http_methods.is_empty() || self.http_methods.contains(&context.request.method)
    }

    fn name(&self) -> &str {
        "HttpMethodActionConstraint"
    }
}

/// Built-in request content-type constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumesActionConstraint {
    pub content_types: Vec<String>,
}

impl ConsumesActionConstraint {
    pub const ORDER: i32 = 200;

    #[must_use]
    pub fn new<S: Into<String>>(content_types: impl IntoIterator<Item = S>) -> Self {
        Self {
            content_types: content_types.into_iter().map(Into::into).collect(),
        }
    }

    fn accepts_content_type(&self, request_type: &MediaType) -> bool {
        self.content_types
            .iter()
            .any(|declared| request_type.is_subset_of(&MediaType::parse(declared)))
    }
}

impl ActionConstraint for ConsumesActionConstraint {
    fn order(&self) -> i32 {
        Self::ORDER
    }

    fn accept(&self, context: &ActionConstraintContext<'_>) -> bool {
        let Some(content_type) = context.request.content_type() else {
            // Without a content type prefer candidates that do not care.
            let unconstrained_present = context.candidates.iter().any(|candidate| {
                !candidate
                    .constraints
                    .iter()
                    .any(|c| c.is_consumes_constraint())
            });
            return !unconstrained_present;
        };

        if self.accepts_content_type(&MediaType::parse(content_type)) {
            return true;
        }

        // Only the first candidate probes the others; if nobody can take the
        // content type it accepts so the failure surfaces as a single 415.
        let Some(first) = context.candidates.first() else {
            return false;
        };
        if !Arc::ptr_eq(&first.action, &context.current_candidate.action) {
            return false;
        }
        for candidate in &context.candidates[1..] {
            let probe = ActionConstraintContext {
                candidates: context.candidates,
                current_candidate: candidate,
                route_values: context.route_values,
                request: context.request,
            };
            if candidate.constraints.is_empty()
                || candidate
                    .constraints
                    .iter()
                    .any(|c| c.is_consumes_constraint() && c.accept(&probe))
            {
                return false;
            }
        }
        true
    }

    fn is_consumes_constraint(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "ConsumesActionConstraint"
    }
}

/// One constraint slot while providers run.
#[derive(Clone)]
pub struct ActionConstraintItem {
    pub metadata: ActionConstraintMetadata,
    pub constraint: Option<Arc<dyn ActionConstraint>>,
    pub is_reusable: bool,
}

impl ActionConstraintItem {
    #[must_use]
    pub fn new(metadata: ActionConstraintMetadata) -> Self {
        Self {
            metadata,
            constraint: None,
            is_reusable: false,
        }
    }
}

/// Turns constraint metadata into constraint instances. Providers run in
/// ascending [`ActionConstraintProvider::order`].
pub trait ActionConstraintProvider: Send + Sync {
    fn order(&self) -> i32;

    fn provide(&self, request: &HttpRequest, items: &mut [ActionConstraintItem]);
}

/// Materializes declared constraints and factories.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultActionConstraintProvider;

impl ActionConstraintProvider for DefaultActionConstraintProvider {
    fn order(&self) -> i32 {
        -1000
    }

    fn provide(&self, _request: &HttpRequest, items: &mut [ActionConstraintItem]) {
        for item in items.iter_mut().filter(|i| i.constraint.is_none()) {
            let (constraint, reusable): (Arc<dyn ActionConstraint>, bool) = match &item.metadata {
                ActionConstraintMetadata::HttpMethod(c) => (Arc::new(c.clone()), true),
                ActionConstraintMetadata::Consumes(c) => (Arc::new(c.clone()), true),
                ActionConstraintMetadata::Custom(c) => (Arc::clone(c), true),
                ActionConstraintMetadata::Factory(factory) => {
                    (factory.create_instance(), factory.is_reusable())
                }
            };
            item.constraint = Some(constraint);
            item.is_reusable = reusable;
        }
    }
}
