#![allow(dead_code)]

pub mod temp_files {
    use tempfile::NamedTempFile;

    /// Creates a `.yaml` file that is removed when the handle drops.
    pub fn create_temp_yaml(content: &str) -> NamedTempFile {
        let file = tempfile::Builder::new()
            .prefix("mvcr_test_")
            .suffix(".yaml")
            .tempfile()
            .expect("temp file");
        std::fs::write(file.path(), content).expect("write temp file");
        file
    }
}

pub mod app {
    use http::Method;
    use mvcrouter::actions::{
        ActionConstraintCache, ActionConstraintProvider, ActionDescriptor,
        ActionDescriptorCollectionProvider, DefaultActionConstraintProvider,
        DefaultActionDescriptorCollectionProvider,
    };
    use mvcrouter::config::RoutingConfig;
    use mvcrouter::context::{request_delegate, HttpContext, HttpRequest};
    use mvcrouter::data_source::{ActionEndpointDataSource, ActionEndpointFactory};
    use mvcrouter::links::LinkGenerator;
    use mvcrouter::patterns::{DefaultParameterPolicyFactory, ParameterPolicyFactory};
    use mvcrouter::router::Router;
    use std::sync::Arc;

    /// A fully wired application whose actions answer with their display name.
    pub struct TestApp {
        pub actions: Arc<DefaultActionDescriptorCollectionProvider>,
        pub data_source: Arc<ActionEndpointDataSource>,
        pub policy_factory: Arc<dyn ParameterPolicyFactory>,
        pub router: Router,
        pub links: LinkGenerator,
    }

    impl TestApp {
        pub fn from_yaml(document: &str) -> Self {
            let config = mvcrouter::config::parse_config(document).expect("config");
            Self::from_config(&config)
        }

        pub fn from_config(config: &RoutingConfig) -> Self {
            let policy_factory: Arc<dyn ParameterPolicyFactory> = Arc::new(DefaultParameterPolicyFactory::new());
            let actions = Arc::new(DefaultActionDescriptorCollectionProvider::new(
                config.action_descriptors().expect("actions"),
            ));
            let collection = Arc::clone(&actions) as Arc<dyn ActionDescriptorCollectionProvider>;
            let factory = ActionEndpointFactory::new(Arc::new(|action: &ActionDescriptor| {
                let name = action.display_name.clone();
                request_delegate(move |ctx: &mut HttpContext| {
                    ctx.response.body = name.clone().into_bytes();
                    Ok(())
                })
            }));
            let data_source = ActionEndpointDataSource::new(Arc::clone(&collection), factory);
            data_source.set_routes(
                config
                    .conventional_routes(policy_factory.as_ref())
                    .expect("routes"),
            )
            .expect("endpoints");

            let providers: Vec<Arc<dyn ActionConstraintProvider>> =
                vec![Arc::new(DefaultActionConstraintProvider)];
            let cache = Arc::new(ActionConstraintCache::new(collection, providers));
            let router = Router::with_default_policies(Arc::clone(&data_source) as _, cache).expect("router");
            let links = LinkGenerator::new(
                Arc::clone(&data_source) as _,
                Arc::clone(&policy_factory),
                config.options,
            )
            .expect("links");
            Self {
                actions,
                data_source,
                policy_factory,
                router,
                links,
            }
        }

        pub fn send(&self, request: HttpRequest) -> HttpContext {
            let mut ctx = HttpContext::new(request);
            self.router.route(&mut ctx).expect("route");
            ctx
        }

        pub fn get(&self, path: &str) -> HttpContext {
            self.send(HttpRequest::new(Method::GET, path))
        }
    }

    pub fn body(ctx: &HttpContext) -> &str {
        std::str::from_utf8(&ctx.response.body).unwrap_or_default()
    }
}
