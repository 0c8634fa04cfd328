use http::header::HOST;
use http::Method;
use mvcrouter::context::HttpRequest;
use mvcrouter::links::{is_local_url, RouteValuesAddress, UrlActionContext, UrlHelper, UrlRouteContext};
use mvcrouter::route_values::RouteValueDictionary;

mod common;
use common::app::TestApp;

const SITE: &str = r#"
options:
  lowercase_urls: false

routes:
  - name: areas
    pattern: "{area}/{controller=Home}/{action=Index}/{id?}"
  - name: default
    pattern: "{controller=Home}/{action=Index}/{id?}"

actions:
  - controller: Home
    action: Index
  - controller: Home
    action: About
  - controller: Products
    action: List
  - controller: Products
    action: Details
  - area: Admin
    controller: Users
    action: List
  - controller: Orders
    action: Show
    template: "orders/{id:int}"
    name: order
"#;

fn values<const N: usize>(pairs: [(&str, &str); N]) -> RouteValueDictionary {
    RouteValueDictionary::from(pairs)
}

#[test]
fn test_action_link_uses_ambient_controller() {
    let app = TestApp::from_yaml(SITE);
    let ctx = app.get("/Products/Details/5");
    let url = UrlHelper::new(&ctx, &app.links);

    let list = UrlActionContext {
        action: Some("List".to_string()),
        ..UrlActionContext::default()
    };
    assert_eq!(url.action(&list).as_deref(), Some("/Products/List"));

    let other = UrlActionContext::new("Details", "Products").with_values(values([("id", "9")]));
    assert_eq!(url.action(&other).as_deref(), Some("/Products/Details/9"));

    let home = UrlActionContext::new("Index", "Home");
    assert_eq!(url.action(&home).as_deref(), Some("/"));
}

#[test]
fn test_unknown_action_has_no_url() {
    let app = TestApp::from_yaml(SITE);
    let ctx = app.get("/");
    let url = UrlHelper::new(&ctx, &app.links);
    assert_eq!(url.action(&UrlActionContext::new("Missing", "Home")), None);
}

#[test]
fn test_leaving_an_area_prefers_area_less_routes() {
    let app = TestApp::from_yaml(SITE);
    let ctx = app.get("/Admin/Users/List");
    let url = UrlHelper::new(&ctx, &app.links);

    assert_eq!(
        url.action(&UrlActionContext::new("About", "Home")).as_deref(),
        Some("/Home/About")
    );

    let in_area = UrlActionContext {
        action: Some("List".to_string()),
        ..UrlActionContext::default()
    };
    assert_eq!(url.action(&in_area).as_deref(), Some("/Admin/Users/List"));
}

#[test]
fn test_named_attribute_route() {
    let app = TestApp::from_yaml(SITE);
    let ctx = app.get("/");
    let url = UrlHelper::new(&ctx, &app.links);

    let route = UrlRouteContext {
        route_name: Some("order".to_string()),
        values: values([("id", "12")]),
        fragment: Some("items".to_string()),
        ..UrlRouteContext::default()
    };
    assert_eq!(url.route_url(&route).as_deref(), Some("/orders/12#items"));

    let absolute = UrlRouteContext {
        protocol: Some("https".to_string()),
        host: Some("shop.example".to_string()),
        ..route
    };
    assert_eq!(
        url.route_url(&absolute).as_deref(),
        Some("https://shop.example/orders/12#items")
    );
}

#[test]
fn test_link_uses_request_host_and_path_base() {
    let app = TestApp::from_yaml(SITE);
    let mut ctx = app.send(
        HttpRequest::new(Method::GET, "/Products/List")
            .with_header(HOST, "localhost:8080"),
    );
    ctx.request.path_base = "/shop".to_string();
    let url = UrlHelper::new(&ctx, &app.links);

    assert_eq!(
        url.link(None, values([("action", "Details"), ("id", "3")])).as_deref(),
        Some("http://localhost:8080/shop/Products/Details/3")
    );
    assert_eq!(url.content("~/css/site.css").as_deref(), Some("/shop/css/site.css"));
    assert_eq!(url.content("~").as_deref(), Some("/shop"));
    assert_eq!(url.content("/already/rooted").as_deref(), Some("/already/rooted"));
    assert_eq!(url.content(""), None);
}

#[test]
fn test_link_without_host_is_none() {
    let app = TestApp::from_yaml(SITE);
    let ctx = app.get("/Products/List");
    let url = UrlHelper::new(&ctx, &app.links);
    assert_eq!(url.link(None, values([("action", "Details")])), None);
}

#[test]
fn test_generator_options_and_extra_values() {
    let mut config = mvcrouter::config::parse_config(SITE).expect("config");
    config.options.lowercase_urls = true;
    config.options.append_trailing_slash = true;
    let app = TestApp::from_config(&config);

    let address = RouteValuesAddress::new(
        None,
        values([("controller", "Products"), ("action", "List"), ("page", "2"), ("q", "red shoes")]),
    );
    assert_eq!(
        app.links.get_path_by_address(&address, "", None, None).as_deref(),
        Some("/products/list/?page=2&q=red%20shoes")
    );
}

#[test]
fn test_local_url_checks() {
    assert!(is_local_url("/Products/List"));
    assert!(is_local_url("~/Products"));
    assert!(!is_local_url("//evil.example/"));
    assert!(!is_local_url("https://evil.example/"));
}
