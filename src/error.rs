//! Error types shared by the routing core.
//!
//! Only programmer-error and configuration-class failures live here. A request
//! that matches nothing is not an error: it is represented by an empty
//! candidate set, `None`, or a terminal 404/405/415 endpoint.

use thiserror::Error;

/// Errors raised while building or evaluating the routing model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// A route template could not be parsed.
    #[error("invalid route template '{template}': {reason}")]
    InvalidTemplate {
        /// The template text as supplied
        template: String,
        /// Why parsing failed
        reason: String,
    },

    /// A parameter declares a default both inline (`{id=5}`) and through the
    /// explicit defaults dictionary.
    #[error(
        "the route parameter '{parameter}' has both an inline default value and an explicit default value specified"
    )]
    ConflictingDefault {
        /// Name of the offending parameter
        parameter: String,
    },

    /// An inline constraint such as `{id:foo}` names nothing in the constraint map.
    #[error("the constraint reference '{reference}' on parameter '{parameter}' could not be resolved")]
    UnknownConstraint {
        /// Parameter the constraint is attached to
        parameter: String,
        /// Raw constraint text
        reference: String,
    },

    /// A known constraint was given arguments it cannot use.
    #[error("invalid argument for constraint '{constraint}': {reason}")]
    InvalidConstraintArgument {
        /// Constraint name
        constraint: String,
        /// Why the argument was rejected
        reason: String,
    },

    /// More than one endpoint survived selection at the winning score.
    #[error("the request matched multiple endpoints: {}", endpoints.join(", "))]
    AmbiguousMatch {
        /// Display names of every endpoint tied at the winning score
        endpoints: Vec<String>,
    },

    /// A configuration document was malformed or inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RoutingError {
    pub(crate) fn template(template: &str, reason: impl Into<String>) -> Self {
        RoutingError::InvalidTemplate {
            template: template.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = RoutingError> = std::result::Result<T, E>;
