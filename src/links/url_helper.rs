use super::generator::{LinkGenerator, RouteValuesAddress};
use crate::context::HttpContext;
use crate::route_values::RouteValueDictionary;

/// Arguments for [`UrlHelper::action`].
#[derive(Debug, Clone, Default)]
pub struct UrlActionContext {
    pub action: Option<String>,
    pub controller: Option<String>,
    pub values: RouteValueDictionary,
    /// With `host`, switches the result from a path to an absolute URL.
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub fragment: Option<String>,
}

impl UrlActionContext {
    #[must_use]
    pub fn new(action: &str, controller: &str) -> Self {
        Self {
            action: Some(action.to_string()),
            controller: Some(controller.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_values(mut self, values: RouteValueDictionary) -> Self {
        self.values = values;
        self
    }
}

/// Arguments for [`UrlHelper::route_url`].
#[derive(Debug, Clone, Default)]
pub struct UrlRouteContext {
    pub route_name: Option<String>,
    pub values: RouteValueDictionary,
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub fragment: Option<String>,
}

/// URL building for one request, using its route values as ambient values.
#[derive(Debug, Clone, Copy)]
pub struct UrlHelper<'a> {
    context: &'a HttpContext,
    generator: &'a LinkGenerator,
}

impl<'a> UrlHelper<'a> {
    #[must_use]
    pub fn new(context: &'a HttpContext, generator: &'a LinkGenerator) -> Self {
        Self { context, generator }
    }

    /// URL of a controller action. Missing action or controller names come
    /// from the current request.
    #[must_use]
    pub fn action(&self, action_context: &UrlActionContext) -> Option<String> {
        let mut values = action_context.values.clone();
        let ambient = &self.context.route_values;
        for (key, explicit) in [
            ("action", &action_context.action),
            ("controller", &action_context.controller),
        ] {
            match explicit {
                Some(name) => {
                    values.insert(key, name.as_str());
                }
                None if !values.contains_key(key) => {
                    if let Some(value) = ambient.get(key) {
                        values.insert(key, value.clone());
                    }
                }
                None => {}
            }
        }
        self.generate(
            None,
            values,
            action_context.protocol.as_deref(),
            action_context.host.as_deref(),
            action_context.fragment.as_deref(),
        )
    }

    /// URL from a route name and/or route values.
    #[must_use]
    pub fn route_url(&self, route_context: &UrlRouteContext) -> Option<String> {
        self.generate(
            route_context.route_name.as_deref(),
            route_context.values.clone(),
            route_context.protocol.as_deref(),
            route_context.host.as_deref(),
            route_context.fragment.as_deref(),
        )
    }

    /// Absolute URL on the request's own scheme and host.
    #[must_use]
    pub fn link(&self, route_name: Option<&str>, values: RouteValueDictionary) -> Option<String> {
        let request = &self.context.request;
        let host = request.host()?;
        self.generate(route_name, values, Some(request.scheme.as_str()), Some(host), None)
    }

    /// Expands an application-relative `~/` path against the path base.
    #[must_use]
    pub fn content(&self, content_path: &str) -> Option<String> {
        if content_path.is_empty() {
            return None;
        }
        let path_base = self.context.request.path_base.trim_end_matches('/');
        if content_path == "~" {
            return Some(if path_base.is_empty() {
                "/".to_string()
            } else {
                path_base.to_string()
            });
        }
        match content_path.strip_prefix("~/") {
            Some(rest) => Some(format!("{path_base}/{rest}")),
            None => Some(content_path.to_string()),
        }
    }

    fn generate(
        &self,
        route_name: Option<&str>,
        values: RouteValueDictionary,
        protocol: Option<&str>,
        host: Option<&str>,
        fragment: Option<&str>,
    ) -> Option<String> {
        let request = &self.context.request;
        let address =
            RouteValuesAddress::new(route_name, values).with_ambient_values(self.context.route_values.clone());
        if protocol.is_none() && host.is_none() {
            return self
                .generator
                .get_path_by_address(&address, &request.path_base, fragment, None);
        }
        let scheme = protocol.unwrap_or(request.scheme.as_str());
        let host = host.or_else(|| request.host())?;
        self.generator
            .get_uri_by_address(&address, scheme, host, &request.path_base, fragment, None)
    }
}

/// True for paths that stay on the current application: `/x` or `~/x`, but
/// not `//host`, `/\host` or anything containing control characters.
#[must_use]
pub fn is_local_url(url: &str) -> bool {
    if url.is_empty() || url.chars().any(char::is_control) {
        return false;
    }
    let rest = if let Some(rest) = url.strip_prefix("~/") {
        rest
    } else if let Some(rest) = url.strip_prefix('/') {
        rest
    } else {
        return false;
    };
    !rest.starts_with('/') && !rest.starts_with('\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_urls() {
        for url in ["/", "/home", "~/", "~/home/index", "/a//b"] {
            assert!(is_local_url(url), "{url}");
        }
        for url in ["", "//evil.com", "/\\evil.com", "~//evil.com", "http://x/", "home", "/a\nb", "~"] {
            assert!(!is_local_url(url), "{url:?}");
        }
    }
}
