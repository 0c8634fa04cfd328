//! # Route Patterns
//!
//! Parsing, combining and binding of route templates such as
//! `{controller=Home}/{action=Index}/{id?}`.
//!
//! ## Pieces
//!
//! - [`parse`] turns template text into a [`RoutePattern`]
//! - [`RoutePatternFactory`] combines a pattern with explicit defaults,
//!   parameter policies and required values
//! - [`Precedence`] orders patterns for matching and link generation
//! - [`policies`] holds route constraints, outbound transformers and the
//!   [`DefaultParameterPolicyFactory`] that resolves inline policy text
//! - [`try_match`] binds a request path to a pattern
//!
//! ## Template Syntax
//!
//! | Form | Meaning |
//! |------|---------|
//! | `users` | literal, case-insensitive |
//! | `{id}` | parameter |
//! | `{id?}` | optional parameter |
//! | `{id=5}` | parameter with default |
//! | `{id:int:min(1)}` | parameter with inline constraints |
//! | `{*path}` / `{**path}` | catch-all (the second form keeps `/` unencoded in links) |
//! | `{name}.{ext?}` | complex segment with optional extension |
//! | `{{` / `}}` | literal braces |

mod factory;
mod matcher;
mod parser;
mod pattern;
pub mod policies;
mod precedence;

pub use factory::{resolve_policies, RoutePatternFactory};
pub use matcher::try_match;
pub use parser::parse;
pub use pattern::{
    render_segments, ParameterKind, ParameterPolicyReference, RoutePattern,
    RoutePatternParameterPart, RoutePatternPart, RoutePatternPathSegment,
};
pub use policies::{
    DefaultParameterPolicyFactory, OutboundParameterTransformer, ParameterPolicy,
    ParameterPolicyFactory, RouteConstraint, RouteDirection,
};
pub use precedence::Precedence;
