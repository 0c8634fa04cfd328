//! Endpoints and the metadata attached to them.

mod core;
mod metadata;

pub use core::{Endpoint, EndpointConvention, RouteEndpointBuilder};
pub use metadata::{
    ConsumesMetadata, DataTokensMetadata, EndpointMetadataCollection, HttpMethodMetadata,
    RouteNameMetadata, RouteValuesAddressMetadata, SuppressLinkGenerationMetadata,
    SuppressMatchingMetadata,
};
