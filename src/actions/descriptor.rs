use super::constraints::ActionConstraintMetadata;
use crate::change_token::{CancellationTokenSource, ChangeToken};
use crate::ids::ActionId;
use crate::route_values::RouteValueDictionary;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Attribute-route details for an action routed by its own template.
#[derive(Debug, Clone, Default)]
pub struct AttributeRouteInfo {
    /// Template text; may contain `[area]`, `[controller]`, `[action]` tokens.
    pub template: String,
    pub order: i32,
    pub name: Option<String>,
    pub suppress_link_generation: bool,
    pub suppress_path_matching: bool,
}

/// Well-known filter scopes. Lower scopes run first at equal order.
pub mod filter_scope {
    pub const FIRST: i32 = 0;
    pub const GLOBAL: i32 = 10;
    pub const CONTROLLER: i32 = 20;
    pub const ACTION: i32 = 30;
    pub const LAST: i32 = 100;
}

/// Marker capability for filters. Execution lives outside the routing core;
/// only ordering and identity are needed here.
pub trait FilterMetadata: Send + Sync {
    /// Explicit order for ordered filters.
    fn order(&self) -> Option<i32> {
        None
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A filter together with the scope it was declared at.
#[derive(Clone)]
pub struct FilterDescriptor {
    pub filter: Arc<dyn FilterMetadata>,
    pub order: i32,
    pub scope: i32,
}

impl FilterDescriptor {
    #[must_use]
    pub fn new(filter: Arc<dyn FilterMetadata>, scope: i32) -> Self {
        let order = filter.order().unwrap_or(0);
        Self {
            filter,
            order,
            scope,
        }
    }

    /// Stable sort by `(order, scope)`.
    pub fn sort(descriptors: &mut [FilterDescriptor]) {
        descriptors.sort_by_key(|d| (d.order, d.scope));
    }
}

impl fmt::Debug for FilterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterDescriptor")
            .field("filter", &self.filter.name())
            .field("order", &self.order)
            .field("scope", &self.scope)
            .finish()
    }
}

/// One routable action: its required route values, optional attribute route,
/// constraints, metadata and filters.
#[derive(Clone)]
pub struct ActionDescriptor {
    pub id: ActionId,
    pub display_name: String,
    /// Route values the action requires, e.g. `controller=Home, action=Index`.
    pub route_values: RouteValueDictionary,
    pub attribute_route_info: Option<AttributeRouteInfo>,
    pub action_constraints: Vec<ActionConstraintMetadata>,
    /// Copied onto every endpoint created for this action, lowest precedence.
    pub endpoint_metadata: Vec<Arc<dyn Any + Send + Sync>>,
    pub filter_descriptors: Vec<FilterDescriptor>,
}

impl ActionDescriptor {
    /// Conventional action identified by controller and action name.
    #[must_use]
    pub fn new(controller: &str, action: &str) -> Self {
        let route_values = RouteValueDictionary::from([("controller", controller), ("action", action)]);
        Self {
            id: ActionId::new(),
            display_name: format!("{controller}.{action}"),
            route_values,
            attribute_route_info: None,
            action_constraints: Vec::new(),
            endpoint_metadata: Vec::new(),
            filter_descriptors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_area(mut self, area: &str) -> Self {
        self.route_values.insert("area", area);
        self.display_name = format!("{area}.{}", self.display_name);
        self
    }

    #[must_use]
    pub fn with_attribute_route(mut self, template: impl Into<String>) -> Self {
        self.attribute_route_info = Some(AttributeRouteInfo {
            template: template.into(),
            ..AttributeRouteInfo::default()
        });
        self
    }

    #[must_use]
    pub fn with_constraint(mut self, constraint: ActionConstraintMetadata) -> Self {
        self.action_constraints.push(constraint);
        self
    }

    #[must_use]
    pub fn with_metadata<T: Any + Send + Sync>(mut self, item: T) -> Self {
        self.endpoint_metadata.push(Arc::new(item));
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Arc<dyn FilterMetadata>, scope: i32) -> Self {
        self.filter_descriptors.push(FilterDescriptor::new(filter, scope));
        self
    }
}

impl fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("route_values", &self.route_values)
            .field("attribute_route_info", &self.attribute_route_info)
            .field("action_constraints", &self.action_constraints.len())
            .field("filters", &self.filter_descriptors)
            .finish()
    }
}

/// Immutable snapshot of every action plus a version that changes with it.
#[derive(Debug, Clone, Default)]
pub struct ActionDescriptorCollection {
    pub items: Vec<Arc<ActionDescriptor>>,
    pub version: u64,
}

/// Upstream source of actions.
pub trait ActionDescriptorCollectionProvider: Send + Sync {
    fn action_descriptors(&self) -> Arc<ActionDescriptorCollection>;

    /// Fires when [`Self::action_descriptors`] would return a newer collection.
    fn change_token(&self) -> Arc<dyn ChangeToken>;
}

/// In-memory provider whose list can be replaced at runtime.
pub struct DefaultActionDescriptorCollectionProvider {
    current: ArcSwap<ActionDescriptorCollection>,
    token_source: ArcSwap<CancellationTokenSource>,
    write_lock: Mutex<()>,
}

impl DefaultActionDescriptorCollectionProvider {
    #[must_use]
    pub fn new(actions: Vec<ActionDescriptor>) -> Self {
        Self {
            current: ArcSwap::from_pointee(ActionDescriptorCollection {
                items: actions.into_iter().map(Arc::new).collect(),
                version: 0,
            }),
            token_source: ArcSwap::from_pointee(CancellationTokenSource::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Publish a new action list, bump the version and fire the old token.
    pub fn set_actions(&self, actions: Vec<ActionDescriptor>) {
        let previous = {
            let _guard = self.write_lock.lock();
            let version = self.current.load().version + 1;
            self.current.store(Arc::new(ActionDescriptorCollection {
                items: actions.into_iter().map(Arc::new).collect(),
                version,
            }));
            info!(version, "Action descriptor collection replaced");
            self.token_source
                .swap(Arc::new(CancellationTokenSource::new()))
        };
        previous.cancel();
    }
}

impl ActionDescriptorCollectionProvider for DefaultActionDescriptorCollectionProvider {
    fn action_descriptors(&self) -> Arc<ActionDescriptorCollection> {
        self.current.load_full()
    }

    fn change_token(&self) -> Arc<dyn ChangeToken> {
        Arc::new(self.token_source.load().token())
    }
}

impl fmt::Debug for DefaultActionDescriptorCollectionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.current.load();
        f.debug_struct("DefaultActionDescriptorCollectionProvider")
            .field("actions", &current.items.len())
            .field("version", &current.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(i32);
    impl FilterMetadata for Named {
        fn order(&self) -> Option<i32> {
            Some(self.0)
        }
    }

    #[test]
    fn filters_sort_by_order_then_scope() {
        let mut filters = vec![
            FilterDescriptor::new(Arc::new(Named(0)), filter_scope::ACTION),
            FilterDescriptor::new(Arc::new(Named(-1)), filter_scope::ACTION),
            FilterDescriptor::new(Arc::new(Named(0)), filter_scope::GLOBAL),
        ];
        FilterDescriptor::sort(&mut filters);
        let keys: Vec<_> = filters.iter().map(|f| (f.order, f.scope)).collect();
        assert_eq!(keys, vec![(-1, 30), (0, 10), (0, 30)]);
    }

    #[test]
    fn set_actions_bumps_version_and_fires_token() {
        let provider = DefaultActionDescriptorCollectionProvider::new(vec![ActionDescriptor::new("Home", "Index")]);
        let token = provider.change_token();
        let before = provider.action_descriptors();

        provider.set_actions(vec![
            ActionDescriptor::new("Home", "Index"),
            ActionDescriptor::new("Home", "About"),
        ]);

        assert!(token.has_changed());
        assert!(!provider.change_token().has_changed());
        let after = provider.action_descriptors();
        assert_eq!(after.version, before.version + 1);
        assert_eq!(after.items.len(), 2);
    }
}
