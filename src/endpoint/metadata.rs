//! Metadata types read by the matcher policies and link generation.

use crate::route_values::RouteValueDictionary;
use http::Method;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Methods an endpoint accepts. Empty means any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpMethodMetadata {
    pub http_methods: Vec<Method>,
}

impl HttpMethodMetadata {
    #[must_use]
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            http_methods: methods.into_iter().collect(),
        }
    }
}

/// Request content types an endpoint accepts. Empty means any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumesMetadata {
    pub content_types: Vec<String>,
}

impl ConsumesMetadata {
    #[must_use]
    pub fn new<S: Into<String>>(content_types: impl IntoIterator<Item = S>) -> Self {
        Self {
            content_types: content_types.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteNameMetadata {
    pub route_name: String,
}

/// Address used by link generation: the route name (if any) and the route
/// values a caller must supply to reach this endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteValuesAddressMetadata {
    pub route_name: Option<String>,
    pub required_values: RouteValueDictionary,
}

/// Endpoint is never used to generate links.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuppressLinkGenerationMetadata;

/// Endpoint is never matched against request paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuppressMatchingMetadata;

/// Values carried alongside a route but never bound from or written to the URL.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTokensMetadata {
    pub data_tokens: RouteValueDictionary,
}

/// Heterogeneous, ordered annotations attached to an endpoint.
///
/// Lookups for a single item return the last one added, so later metadata
/// overrides earlier metadata of the same type.
#[derive(Clone, Default)]
pub struct EndpointMetadataCollection {
    items: Vec<Arc<dyn Any + Send + Sync>>,
}

impl EndpointMetadataCollection {
    #[must_use]
    pub fn new(items: Vec<Arc<dyn Any + Send + Sync>>) -> Self {
        Self { items }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Any + Send + Sync>> {
        self.items.iter()
    }

    /// Most recently added item of type `T`.
    #[must_use]
    pub fn get_metadata<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.items.iter().rev().find_map(|m| m.downcast_ref::<T>())
    }

    /// Shared handle to the most recently added item of type `T`.
    #[must_use]
    pub fn get_metadata_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.items
            .iter()
            .rev()
            .find_map(|m| Arc::clone(m).downcast::<T>().ok())
    }

    /// Every item of type `T`, in insertion order.
    #[must_use]
    pub fn get_ordered_metadata<T: Any + Send + Sync>(&self) -> Vec<&T> {
        self.items
            .iter()
            .filter_map(|m| m.downcast_ref::<T>())
            .collect()
    }

    #[must_use]
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.items.iter().any(|m| m.is::<T>())
    }
}

impl fmt::Debug for EndpointMetadataCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointMetadataCollection")
            .field("count", &self.items.len())
            .finish()
    }
}
