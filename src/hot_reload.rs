//! # Hot Reload
//!
//! Watches a YAML routing configuration (see [`crate::config`]) and swaps in
//! its conventional routes whenever the file is written.
//!
//! ```rust,ignore
//! use mvcrouter::hot_reload::watch_routes;
//!
//! let watcher = watch_routes("routes.yaml", data_source.clone(), policy_factory, |config| {
//!     // Actions are owned by the application; refresh them here if the
//!     // manifest is used.
//!     if let Ok(actions) = config.action_descriptors() {
//!         provider.set_actions(actions);
//!     }
//! })?;
//! // The watcher stops when dropped.
//! ```
//!
//! A document that fails to read, parse or convert is logged and ignored:
//! the data source keeps publishing its previous generation, and requests
//! keep matching the old routes until a valid file is saved.

use crate::config::{load_config, RoutingConfig};
use crate::data_source::ActionEndpointDataSource;
use crate::patterns::ParameterPolicyFactory;
use anyhow::Context;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Load `path` and replace the data source's conventional routes with its
/// routes. Nothing changes on error.
pub fn reload_routes(
    path: &Path,
    data_source: &ActionEndpointDataSource,
    policy_factory: &dyn ParameterPolicyFactory,
) -> anyhow::Result<RoutingConfig> {
    let config = load_config(path)?;
    let routes = config
        .conventional_routes(policy_factory)
        .with_context(|| format!("invalid route in {}", path.display()))?;
    data_source
        .set_routes(routes)
        .with_context(|| format!("cannot build endpoints for {}", path.display()))?;
    Ok(config)
}

/// Watch a routing configuration file and reload its routes into
/// `data_source` on every modification.
///
/// `on_reload` runs after each successful reload with the parsed document.
pub fn watch_routes<P, F>(
    config_path: P,
    data_source: Arc<ActionEndpointDataSource>,
    policy_factory: Arc<dyn ParameterPolicyFactory>,
    mut on_reload: F,
) -> notify::Result<RecommendedWatcher>
where
    P: AsRef<Path>,
    F: FnMut(&RoutingConfig) + Send + 'static,
{
    let path: PathBuf = config_path.as_ref().to_path_buf();
    let watch_path = path.clone();

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                match reload_routes(&watch_path, &data_source, policy_factory.as_ref()) {
                    Ok(config) => {
                        info!(
                            path = %watch_path.display(),
                            routes = config.routes.len(),
                            version = data_source.version(),
                            "hot-reload: routing configuration applied"
                        );
                        on_reload(&config);
                    }
                    Err(err) => error!(
                        path = %watch_path.display(),
                        error = %format!("{err:#}"),
                        "hot-reload: keeping previous routes"
                    ),
                }
            }
            Err(err) => warn!(error = %err, "hot-reload: watch error"),
        },
        Config::default(),
    )?;

    watcher.watch(&path, RecursiveMode::NonRecursive)?;
    info!(path = %path.display(), "hot-reload: watching routing configuration");
    Ok(watcher)
}
