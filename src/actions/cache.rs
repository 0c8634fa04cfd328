use super::constraints::{ActionConstraint, ActionConstraintItem, ActionConstraintProvider};
use super::descriptor::{ActionDescriptor, ActionDescriptorCollection, ActionDescriptorCollectionProvider};
use crate::context::HttpRequest;
use crate::ids::ActionId;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

enum CacheEntry {
    /// Every constraint is reusable: hand out the same instances.
    Constraints(Vec<Arc<dyn ActionConstraint>>),
    /// Some constraints must be re-created per request.
    Items(Vec<ActionConstraintItem>),
}

struct InnerCache {
    version: u64,
    has_action_constraints: bool,
    entries: DashMap<ActionId, CacheEntry>,
}

impl InnerCache {
    fn new(actions: &ActionDescriptorCollection) -> Self {
        let has_action_constraints = actions
            .items
            .iter()
            .any(|a| a.action_constraints.iter().any(|c| !c.is_hoisted()));
        Self {
            version: actions.version,
            has_action_constraints,
            entries: DashMap::new(),
        }
    }
}

/// Per-action materialized constraints.
///
/// Reusable constraints are built once per action and shared; the whole cache
/// is dropped when the action collection version changes. HTTP-method and
/// consumes constraints are skipped because their matcher policies already
/// handled them.
pub struct ActionConstraintCache {
    collection_provider: Arc<dyn ActionDescriptorCollectionProvider>,
    providers: Vec<Arc<dyn ActionConstraintProvider>>,
    current: ArcSwap<InnerCache>,
}

impl ActionConstraintCache {
    #[must_use]
    pub fn new(
        collection_provider: Arc<dyn ActionDescriptorCollectionProvider>,
        mut providers: Vec<Arc<dyn ActionConstraintProvider>>,
    ) -> Self {
        providers.sort_by_key(|p| p.order());
        let initial = InnerCache::new(&collection_provider.action_descriptors());
        Self {
            collection_provider,
            providers,
            current: ArcSwap::from_pointee(initial),
        }
    }

    fn current_cache(&self) -> Arc<InnerCache> {
        let cached = self.current.load_full();
        let actions = self.collection_provider.action_descriptors();
        if cached.version == actions.version {
            return cached;
        }
        debug!(
            old_version = cached.version,
            new_version = actions.version,
            "Action constraint cache invalidated"
        );
        let fresh = Arc::new(InnerCache::new(&actions));
        self.current.store(Arc::clone(&fresh));
        fresh
    }

    /// Whether any action in the current collection declares a constraint the
    /// engine has to evaluate.
    #[must_use]
    pub fn has_action_constraints(&self) -> bool {
        self.current_cache().has_action_constraints
    }

    /// Constraints to evaluate for `action`; empty when it has none.
    #[must_use]
    pub fn get_action_constraints(
        &self,
        request: &HttpRequest,
        action: &ActionDescriptor,
    ) -> Vec<Arc<dyn ActionConstraint>> {
        let cache = self.current_cache();

        // Providers must not run under a shard lock.
        let cached = cache.entries.get(&action.id).map(|entry| match entry.value() {
            CacheEntry::Constraints(constraints) => Ok(constraints.clone()),
            CacheEntry::Items(items) => Err(items.clone()),
        });
        match cached {
            Some(Ok(constraints)) => return constraints,
            Some(Err(mut items)) => {
                self.execute_providers(request, &mut items);
                return extract(&items);
            }
            None => {}
        }

        let mut items: Vec<ActionConstraintItem> = action
            .action_constraints
            .iter()
            .filter(|m| !m.is_hoisted())
            .cloned()
            .map(ActionConstraintItem::new)
            .collect();
        if items.is_empty() {
            cache
                .entries
                .insert(action.id, CacheEntry::Constraints(Vec::new()));
            return Vec::new();
        }

        self.execute_providers(request, &mut items);
        let constraints = extract(&items);

        let all_reusable = items.iter().all(|i| i.is_reusable);
        let entry = if all_reusable {
            CacheEntry::Constraints(constraints.clone())
        } else {
            for item in items.iter_mut().filter(|i| !i.is_reusable) {
                item.constraint = None;
            }
            CacheEntry::Items(items)
        };
        cache.entries.entry(action.id).or_insert(entry);
        constraints
    }

    fn execute_providers(&self, request: &HttpRequest, items: &mut [ActionConstraintItem]) {
        for provider in &self.providers {
            provider.provide(request, items);
        }
    }
}

fn extract(items: &[ActionConstraintItem]) -> Vec<Arc<dyn ActionConstraint>> {
    items.iter().filter_map(|i| i.constraint.clone()).collect()
}

impl fmt::Debug for ActionConstraintCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.current.load();
        f.debug_struct("ActionConstraintCache")
            .field("version", &current.version)
            .field("entries", &current.entries.len())
            .field("providers", &self.providers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{
        ActionConstraintContext, ActionConstraintFactory, ActionConstraintMetadata,
        DefaultActionConstraintProvider, DefaultActionDescriptorCollectionProvider,
    };
    use http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Always(i32);
    impl ActionConstraint for Always {
        fn order(&self) -> i32 {
            self.0
        }
        fn accept(&self, _: &ActionConstraintContext<'_>) -> bool {
            true
        }
    }

    struct Counting {
        created: Arc<AtomicUsize>,
        reusable: bool,
    }
    impl ActionConstraintFactory for Counting {
        fn is_reusable(&self) -> bool {
            self.reusable
        }
        fn create_instance(&self) -> Arc<dyn ActionConstraint> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Arc::new(Always(1))
        }
    }

    fn cache_for(actions: Vec<ActionDescriptor>) -> (Arc<DefaultActionDescriptorCollectionProvider>, ActionConstraintCache) {
        let provider = Arc::new(DefaultActionDescriptorCollectionProvider::new(actions));
        let providers: Vec<Arc<dyn ActionConstraintProvider>> = vec![Arc::new(DefaultActionConstraintProvider)];
        let cache = ActionConstraintCache::new(
            Arc::clone(&provider) as Arc<dyn ActionDescriptorCollectionProvider>,
            providers,
        );
        (provider, cache)
    }

    #[test]
    fn hoisted_constraints_do_not_count() {
        let action = ActionDescriptor::new("Home", "Index")
            .with_constraint(ActionConstraintMetadata::http_methods([Method::GET]))
            .with_constraint(ActionConstraintMetadata::consumes(["application/json"]));
        let (_, cache) = cache_for(vec![action.clone()]);
        assert!(!cache.has_action_constraints());
        let request = HttpRequest::new(Method::GET, "/");
        assert!(cache.get_action_constraints(&request, &action).is_empty());
    }

    #[test]
    fn reusable_factories_are_created_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let action = ActionDescriptor::new("Home", "Index").with_constraint(ActionConstraintMetadata::Factory(Arc::new(
            Counting {
                created: Arc::clone(&created),
                reusable: true,
            },
        )));
        let (_, cache) = cache_for(vec![action.clone()]);
        let request = HttpRequest::new(Method::GET, "/");
        assert!(cache.has_action_constraints());
        for _ in 0..3 {
            assert_eq!(cache.get_action_constraints(&request, &action).len(), 1);
        }
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn non_reusable_factories_are_created_per_request() {
        let created = Arc::new(AtomicUsize::new(0));
        let action = ActionDescriptor::new("Home", "Index")
            .with_constraint(ActionConstraintMetadata::custom(Always(0)))
            .with_constraint(ActionConstraintMetadata::Factory(Arc::new(Counting {
                created: Arc::clone(&created),
                reusable: false,
            })));
        let (_, cache) = cache_for(vec![action.clone()]);
        let request = HttpRequest::new(Method::GET, "/");
        for _ in 0..3 {
            assert_eq!(cache.get_action_constraints(&request, &action).len(), 2);
        }
        assert_eq!(created.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn version_change_resets_cache() {
        let action = ActionDescriptor::new("Home", "Index");
        let (provider, cache) = cache_for(vec![action]);
        assert!(!cache.has_action_constraints());

        provider.set_actions(vec![
            ActionDescriptor::new("Home", "Index").with_constraint(ActionConstraintMetadata::custom(Always(3)))
        ]);
        assert!(cache.has_action_constraints());
    }
}
