//! Outbound routing: turning route values back into URLs.
//!
//! [`TemplateBinder`] fills one route pattern, [`LinkGenerator`] picks the
//! endpoint whose pattern to fill, and [`UrlHelper`] adds the request's
//! ambient values, scheme, host and path base.

mod binder;
mod generator;
mod url_helper;

pub use binder::{TemplateBinder, TemplateValuesResult};
pub use generator::{LinkGenerator, RouteValuesAddress};
pub use url_helper::{is_local_url, UrlActionContext, UrlHelper, UrlRouteContext};
