use super::conventional::ConventionalRouteEntry;
use super::factory::ActionEndpointFactory;
use crate::actions::{ActionDescriptorCollection, ActionDescriptorCollectionProvider};
use crate::change_token::{
    on_change, CancellationChangeToken, CancellationTokenSource, ChangeToken,
    ChangeTokenSubscription,
};
use crate::endpoint::{Endpoint, EndpointConvention};
use crate::error::Result;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{error, info, warn};

/// Anything that publishes a list of endpoints plus a token that fires when
/// the list is superseded.
pub trait EndpointDataSource: Send + Sync {
    fn endpoints(&self) -> Arc<Vec<Arc<Endpoint>>>;

    /// Like [`endpoints`](Self::endpoints), but reports a failed first build
    /// instead of returning an empty list.
    fn try_endpoints(&self) -> Result<Arc<Vec<Arc<Endpoint>>>> {
        Ok(self.endpoints())
    }

    fn change_token(&self) -> Arc<dyn ChangeToken>;
}

/// One published endpoint list. Immutable once stored.
struct Generation {
    endpoints: Arc<Vec<Arc<Endpoint>>>,
    source: CancellationTokenSource,
    token: CancellationChangeToken,
    version: u64,
    actions_version: u64,
}

#[derive(Default)]
struct WriterState {
    routes: Vec<ConventionalRouteEntry>,
    conventions: Vec<EndpointConvention>,
    next_version: u64,
}

/// Endpoints for every action, rebuilt whenever the actions or the
/// conventional routes change.
///
/// Readers load the current generation without locking. Writers serialize on
/// one mutex, build the new list, store it, and only then cancel the previous
/// generation's token: an observer that sees its token fire can always read a
/// newer list.
pub struct ActionEndpointDataSource {
    actions: Arc<dyn ActionDescriptorCollectionProvider>,
    factory: ActionEndpointFactory,
    writer: Mutex<WriterState>,
    current: ArcSwapOption<Generation>,
    /// Fires with the first successful publish.
    initial: CancellationTokenSource,
    _subscription: ChangeTokenSubscription,
}

impl ActionEndpointDataSource {
    /// Create the data source and follow `actions` for changes.
    ///
    /// The first endpoint list is built lazily on first read.
    #[must_use]
    pub fn new(
        actions: Arc<dyn ActionDescriptorCollectionProvider>,
        factory: ActionEndpointFactory,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let producer = Arc::clone(&actions);
            let this = weak.clone();
            let subscription = on_change(
                move || producer.change_token(),
                move || {
                    if let Some(data_source) = this.upgrade() {
                        // Logged by publish.
                        let _ = data_source.update_endpoints();
                    }
                },
            );
            Self {
                actions,
                factory,
                writer: Mutex::new(WriterState::default()),
                current: ArcSwapOption::empty(),
                initial: CancellationTokenSource::new(),
                _subscription: subscription,
            }
        })
    }

    /// Register a conventional route.
    ///
    /// A route whose name is already taken is skipped with a warning. Adding
    /// a route after the first build republishes.
    pub fn add_route(&self, route: ConventionalRouteEntry) {
        let mut writer = self.writer.lock();
        if push_route(&mut writer.routes, route) {
            self.republish(writer);
        }
    }

    /// Replace every conventional route and republish.
    ///
    /// Fails only when this is the first build and it cannot complete.
    pub fn set_routes(&self, routes: Vec<ConventionalRouteEntry>) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.routes.clear();
        for route in routes {
            push_route(&mut writer.routes, route);
        }
        info!(routes = writer.routes.len(), "Conventional routes replaced");
        self.publish(writer).map(drop)
    }

    /// Add a convention applied to every endpoint this data source builds.
    pub fn add_convention(&self, convention: EndpointConvention) {
        let mut writer = self.writer.lock();
        writer.conventions.push(convention);
        self.republish(writer);
    }

    #[must_use]
    pub fn route_count(&self) -> usize {
        self.writer.lock().routes.len()
    }

    /// Version of the current generation; 0 before the first build.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.current.load_full().map_or(0, |g| g.version)
    }

    /// Rebuild from the current action list and conventional routes.
    ///
    /// Fails only when this is the first build and it cannot complete.
    pub fn update_endpoints(&self) -> Result<()> {
        let writer = self.writer.lock();
        self.publish(writer).map(drop)
    }

    /// Republish only once a first generation exists.
    fn republish(&self, writer: parking_lot::MutexGuard<'_, WriterState>) {
        if self.current.load().is_some() {
            // A failed rebuild keeps the previous generation and is logged.
            let _ = self.publish(writer);
        }
    }

    fn current_generation(&self) -> Result<Arc<Generation>> {
        if let Some(generation) = self.current.load_full() {
            return Ok(generation);
        }
        let writer = self.writer.lock();
        if let Some(generation) = self.current.load_full() {
            return Ok(generation);
        }
        self.publish(writer)
    }

    /// Build and store a new generation, then fire the previous token.
    ///
    /// A failed rebuild keeps the previous generation. A failed first build
    /// stores nothing and returns the error; the next read retries.
    fn publish(&self, mut writer: parking_lot::MutexGuard<'_, WriterState>) -> Result<Arc<Generation>> {
        let started = Instant::now();
        let actions = self.actions.action_descriptors();
        let endpoints = match self.build(&actions, &writer) {
            Ok(endpoints) => endpoints,
            Err(err) => {
                if let Some(previous) = self.current.load_full() {
                    error!(
                        error = %err,
                        actions_version = actions.version,
                        "Endpoint rebuild failed, keeping previous endpoints"
                    );
                    return Ok(previous);
                }
                error!(
                    error = %err,
                    actions_version = actions.version,
                    "Initial endpoint build failed"
                );
                return Err(err);
            }
        };

        writer.next_version += 1;
        let source = CancellationTokenSource::new();
        let generation = Arc::new(Generation {
            endpoints: Arc::new(endpoints),
            token: source.token(),
            source,
            version: writer.next_version,
            actions_version: actions.version,
        });
        let previous = self.current.swap(Some(Arc::clone(&generation)));
        drop(writer);

        info!(
            version = generation.version,
            actions_version = generation.actions_version,
            endpoints = generation.endpoints.len(),
            duration_us = started.elapsed().as_micros() as u64,
            "Endpoints published"
        );
        match previous {
            Some(previous) => previous.source.cancel(),
            None => self.initial.cancel(),
        }
        Ok(generation)
    }

    fn build(
        &self,
        actions: &ActionDescriptorCollection,
        writer: &WriterState,
    ) -> Result<Vec<Arc<Endpoint>>> {
        let mut required_keys: Vec<String> = Vec::new();
        for action in &actions.items {
            for key in action.route_values.keys() {
                if !required_keys.iter().any(|k| k.eq_ignore_ascii_case(key)) {
                    required_keys.push(key.to_string());
                }
            }
        }

        let mut endpoints = Vec::new();
        let mut route_names = HashSet::new();
        for action in &actions.items {
            self.factory.add_endpoints(
                &mut endpoints,
                &mut route_names,
                action,
                &writer.routes,
                &required_keys,
                &writer.conventions,
            )?;
        }
        Ok(endpoints)
    }
}

fn push_route(routes: &mut Vec<ConventionalRouteEntry>, route: ConventionalRouteEntry) -> bool {
    if let Some(name) = &route.route_name {
        let taken = routes
            .iter()
            .filter_map(|r| r.route_name.as_deref())
            .any(|existing| existing.eq_ignore_ascii_case(name));
        if taken {
            warn!(route_name = %name, pattern = %route.pattern, "Duplicate conventional route name, skipping route");
            return false;
        }
    }
    routes.push(route);
    true
}

impl EndpointDataSource for ActionEndpointDataSource {
    /// Empty while the first build keeps failing; use
    /// [`try_endpoints`](EndpointDataSource::try_endpoints) to see the error.
    fn endpoints(&self) -> Arc<Vec<Arc<Endpoint>>> {
        self.try_endpoints().unwrap_or_default()
    }

    fn try_endpoints(&self) -> Result<Arc<Vec<Arc<Endpoint>>>> {
        self.current_generation()
            .map(|generation| Arc::clone(&generation.endpoints))
    }

    fn change_token(&self) -> Arc<dyn ChangeToken> {
        match self.current_generation() {
            Ok(generation) => Arc::new(generation.token.clone()),
            Err(_) => Arc::new(self.initial.token()),
        }
    }
}

impl fmt::Debug for ActionEndpointDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.current.load_full();
        f.debug_struct("ActionEndpointDataSource")
            .field("version", &current.as_ref().map(|g| g.version))
            .field("endpoints", &current.as_ref().map(|g| g.endpoints.len()))
            .finish_non_exhaustive()
    }
}

/// Fixed endpoint list, mainly for tests and hand-built routes.
#[derive(Debug, Default)]
pub struct StaticEndpointDataSource {
    endpoints: Arc<Vec<Arc<Endpoint>>>,
    source: CancellationTokenSource,
}

impl StaticEndpointDataSource {
    #[must_use]
    pub fn new(endpoints: Vec<Arc<Endpoint>>) -> Self {
        Self {
            endpoints: Arc::new(endpoints),
            source: CancellationTokenSource::new(),
        }
    }
}

impl EndpointDataSource for StaticEndpointDataSource {
    fn endpoints(&self) -> Arc<Vec<Arc<Endpoint>>> {
        Arc::clone(&self.endpoints)
    }

    fn change_token(&self) -> Arc<dyn ChangeToken> {
        Arc::new(self.source.token())
    }
}
