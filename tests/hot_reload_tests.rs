use http::StatusCode;
use mvcrouter::hot_reload::{reload_routes, watch_routes};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::app::{body, TestApp};
use common::temp_files;

const ROUTES_V1: &str = r#"
routes:
  - name: default
    pattern: "{controller=Home}/{action=Index}"
actions:
  - controller: Home
    action: Index
  - controller: Blog
    action: Post
"#;

const ROUTES_V2: &str = r#"
routes:
  - name: blog
    pattern: "journal/{action=Post}"
    defaults: { controller: Blog }
  - name: default
    pattern: "{controller=Home}/{action=Index}"
"#;

const BROKEN: &str = r#"
routes:
  - name: default
    pattern: "{controller"
"#;

#[test]
fn test_reload_replaces_routes() {
    let app = TestApp::from_yaml(ROUTES_V1);
    assert_eq!(app.get("/journal").response.status, StatusCode::NOT_FOUND);

    let file = temp_files::create_temp_yaml(ROUTES_V2);
    let config = reload_routes(file.path(), &app.data_source, app.policy_factory.as_ref()).expect("reload");
    assert_eq!(config.routes.len(), 2);
    assert_eq!(app.data_source.route_count(), 2);

    assert_eq!(body(&app.get("/journal")), "Blog.Post");
    assert_eq!(body(&app.get("/Blog/Post")), "Blog.Post");
}

#[test]
fn test_invalid_document_keeps_previous_routes() {
    let app = TestApp::from_yaml(ROUTES_V1);
    let version = app.data_source.version();

    let file = temp_files::create_temp_yaml(BROKEN);
    let err = reload_routes(file.path(), &app.data_source, app.policy_factory.as_ref()).expect_err("broken");
    assert!(format!("{err:#}").contains("invalid route"));

    assert_eq!(app.data_source.version(), version);
    assert_eq!(body(&app.get("/Blog/Post")), "Blog.Post");
}

#[test]
fn test_missing_file_is_an_error() {
    let app = TestApp::from_yaml(ROUTES_V1);
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("routes.yaml");
    assert!(reload_routes(&missing, &app.data_source, app.policy_factory.as_ref()).is_err());
}

#[test]
fn test_watch_routes_reload() {
    let app = TestApp::from_yaml(ROUTES_V1);
    let file = temp_files::create_temp_yaml(ROUTES_V1);

    let reloads = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&reloads);
    let watcher = watch_routes(
        file.path(),
        Arc::clone(&app.data_source),
        Arc::clone(&app.policy_factory),
        move |config| {
            if config.routes.iter().any(|r| r.name.as_deref() == Some("blog")) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        },
    )
    .expect("watch_routes");

    // allow watcher thread to start
    std::thread::sleep(Duration::from_millis(100));
    std::fs::write(file.path(), ROUTES_V2).expect("rewrite");

    for _ in 0..40 {
        if reloads.load(Ordering::SeqCst) > 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(reloads.load(Ordering::SeqCst) > 0, "reload callback never ran");
    assert_eq!(body(&app.get("/journal")), "Blog.Post");

    drop(watcher);
}
