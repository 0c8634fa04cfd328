//! Action model: descriptors, their upstream provider, constraints and the
//! constraint cache.

mod cache;
mod constraints;
mod descriptor;

pub use cache::ActionConstraintCache;
pub use constraints::{
    ActionConstraint, ActionConstraintContext, ActionConstraintFactory, ActionConstraintItem,
    ActionConstraintMetadata, ActionConstraintProvider, ActionSelectorCandidate,
    ConsumesActionConstraint, DefaultActionConstraintProvider, HttpMethodActionConstraint,
};
pub use descriptor::{
    filter_scope, ActionDescriptor, ActionDescriptorCollection, ActionDescriptorCollectionProvider,
    AttributeRouteInfo, DefaultActionDescriptorCollectionProvider, FilterDescriptor,
    FilterMetadata,
};
