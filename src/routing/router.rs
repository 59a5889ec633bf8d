//! Route table and handler registration.
//!
//! # Responsibilities
//! - Store routes as (method, full path, handler)
//! - Prefix every registered path with the API prefix
//! - Turn the table into an axum router that dispatches under the timeout
//!
//! # Design Decisions
//! - Built once at startup, immutable afterwards
//! - Invalid and duplicate routes are rejected at registration, not at serve
//! - Path parameters use axum's `{name}` syntax

use axum::body::Body;
use axum::extract::RawPathParams;
use axum::http::{Method, Request};
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::{RequestExt, Router};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::http::response::Envelope;
use crate::http::sink::ResponseWriter;
use crate::routing::context::{PathParams, RequestContext};
use crate::routing::dispatcher::Dispatcher;

/// Future returned by a handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Option<Envelope>> + Send + 'static>>;

/// An API endpoint.
///
/// Returning `None` means the handler wrote the response itself through the
/// writer, or failed; if nothing was written the client gets an empty 500.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, writer: ResponseWriter, request: Request<Body>, ctx: RequestContext) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(ResponseWriter, Request<Body>, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Envelope>> + Send + 'static,
{
    fn call(&self, writer: ResponseWriter, request: Request<Body>, ctx: RequestContext) -> HandlerFuture {
        Box::pin((self)(writer, request, ctx))
    }
}

/// Settings shared by every route in a table.
#[derive(Debug, Clone)]
pub struct RouteOptions {
    /// Prepended to each registered path, e.g. `/ddogsvc`.
    pub prefix: String,
    /// Deadline for each request.
    pub timeout: Duration,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("route path {0:?} must start with '/' and capture whole segments as {{name}} or {{*rest}}")]
    InvalidPath(String),

    #[error("route prefix {0:?} must be empty or start with '/' and not end with it")]
    InvalidPrefix(String),

    #[error("route {method} {path} is already registered")]
    Duplicate { method: Method, path: String },

    #[error("route path {path} captures the same segments as {existing}")]
    Conflict { path: String, existing: String },

    #[error("method {0} cannot be routed")]
    UnsupportedMethod(Method),
}

/// Whether axum will accept `path`: a leading `/`, no `:name` or `*name`
/// segments, and captures spanning whole segments with unique names. A
/// `{*rest}` capture is only allowed last.
fn valid_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    let segments: Vec<&str> = rest.split('/').collect();
    let mut names = HashSet::new();

    segments.iter().enumerate().all(|(i, segment)| {
        if segment.starts_with(':') || segment.starts_with('*') {
            return false;
        }
        if !segment.contains(['{', '}']) {
            return true;
        }
        let Some(capture) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
            return false;
        };
        let name = match capture.strip_prefix('*') {
            Some(name) if i + 1 == segments.len() => name,
            Some(_) => return false,
            None => capture,
        };
        !name.is_empty() && !name.contains(['{', '}', '*', '/']) && names.insert(name)
    })
}

/// `path` with capture names erased, so `/a/{id}` and `/a/{name}` compare equal.
fn path_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix('{') {
            Some(capture) if capture.starts_with('*') => "{*}",
            Some(_) => "{}",
            None => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// A registered route.
#[derive(Clone)]
pub struct Route {
    method: Method,
    filter: MethodFilter,
    path: Arc<str>,
    handler: Arc<dyn Handler>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Route {
    /// Build a route for the full `path`, prefix already applied.
    pub fn new<H: Handler>(method: Method, path: &str, handler: H) -> Result<Self, RouteError> {
        if !valid_path(path) {
            return Err(RouteError::InvalidPath(path.to_string()));
        }
        let filter = MethodFilter::try_from(method.clone())
            .map_err(|_| RouteError::UnsupportedMethod(method.clone()))?;
        Ok(Self {
            method,
            filter,
            path: Arc::from(path),
            handler: Arc::new(handler),
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Full path, prefix included.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn path_arc(&self) -> Arc<str> {
        self.path.clone()
    }

    pub(crate) fn handler(&self) -> Arc<dyn Handler> {
        self.handler.clone()
    }
}

/// Ordered collection of routes sharing one prefix and timeout.
#[derive(Debug)]
pub struct RouteTable {
    options: RouteOptions,
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(options: RouteOptions) -> Result<Self, RouteError> {
        let prefix = options.prefix.as_str();
        if !prefix.is_empty() && (!prefix.starts_with('/') || prefix.ends_with('/')) {
            return Err(RouteError::InvalidPrefix(options.prefix));
        }
        Ok(Self {
            options,
            routes: Vec::new(),
        })
    }

    pub fn options(&self) -> &RouteOptions {
        &self.options
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Register `handler` for `method` at `prefix + path`.
    pub fn register<H: Handler>(
        &mut self,
        method: Method,
        path: &str,
        handler: H,
    ) -> Result<&mut Self, RouteError> {
        if !path.starts_with('/') {
            return Err(RouteError::InvalidPath(path.to_string()));
        }
        let full_path = format!("{}{}", self.options.prefix, path);
        let route = Route::new(method, &full_path, handler)?;

        for existing in &self.routes {
            if *existing.path == *full_path {
                if existing.method == route.method {
                    return Err(RouteError::Duplicate {
                        method: route.method,
                        path: full_path,
                    });
                }
            } else if path_shape(&existing.path) == path_shape(&full_path) {
                return Err(RouteError::Conflict {
                    path: full_path,
                    existing: existing.path.to_string(),
                });
            }
        }

        tracing::info!(method = %route.method, path = %full_path, "Route registered");
        self.routes.push(route);
        Ok(self)
    }

    pub fn get<H: Handler>(&mut self, path: &str, handler: H) -> Result<&mut Self, RouteError> {
        self.register(Method::GET, path, handler)
    }

    pub fn post<H: Handler>(&mut self, path: &str, handler: H) -> Result<&mut Self, RouteError> {
        self.register(Method::POST, path, handler)
    }

    pub fn put<H: Handler>(&mut self, path: &str, handler: H) -> Result<&mut Self, RouteError> {
        self.register(Method::PUT, path, handler)
    }

    pub fn patch<H: Handler>(&mut self, path: &str, handler: H) -> Result<&mut Self, RouteError> {
        self.register(Method::PATCH, path, handler)
    }

    pub fn delete<H: Handler>(&mut self, path: &str, handler: H) -> Result<&mut Self, RouteError> {
        self.register(Method::DELETE, path, handler)
    }

    pub fn options_route<H: Handler>(&mut self, path: &str, handler: H) -> Result<&mut Self, RouteError> {
        self.register(Method::OPTIONS, path, handler)
    }

    /// Build the axum router. Every route runs through one shared dispatcher.
    pub fn into_router(self) -> Router {
        let dispatcher = Dispatcher::new(self.options.timeout);
        let mut by_path: BTreeMap<Arc<str>, MethodRouter> = BTreeMap::new();

        for route in self.routes {
            let path = route.path_arc();
            let filter = route.filter;
            let route = Arc::new(route);
            let dispatcher = dispatcher.clone();

            let endpoint = move |mut request: Request<Body>| {
                let dispatcher = dispatcher.clone();
                let route = route.clone();
                async move {
                    let params = match request.extract_parts::<RawPathParams>().await {
                        Ok(raw) => PathParams::from(&raw),
                        Err(e) => {
                            tracing::warn!(path = %route.path(), error = %e, "Path parameters rejected");
                            PathParams::new()
                        }
                    };
                    dispatcher.dispatch(&route, request, params).await
                }
            };

            let method_router = match by_path.remove(&path) {
                Some(existing) => existing.on(filter, endpoint),
                None => on(filter, endpoint),
            };
            by_path.insert(path, method_router);
        }

        by_path
            .into_iter()
            .fold(Router::new(), |router, (path, method_router)| {
                router.route(&path, method_router)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::dispatcher::{DispatchOutcome, RouteTag};
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn table(prefix: &str) -> RouteTable {
        RouteTable::new(RouteOptions {
            prefix: prefix.to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    async fn ok(_w: ResponseWriter, _r: Request<Body>, _c: RequestContext) -> Option<Envelope> {
        Some(Envelope::new().set_data("Succeeded"))
    }

    #[test]
    fn test_register_prefixes_path() {
        let mut table = table("/svc");
        table.get("/accounts", ok).unwrap();
        assert_eq!(table.routes()[0].path(), "/svc/accounts");
        assert_eq!(table.routes()[0].method(), &Method::GET);
    }

    #[test]
    fn test_register_rejects_relative_path() {
        let mut table = table("/svc");
        assert_eq!(
            table.get("accounts", ok).unwrap_err(),
            RouteError::InvalidPath("accounts".to_string())
        );
    }

    #[test]
    fn test_register_rejects_paths_axum_cannot_route() {
        let mut table = table("/svc");
        for path in [
            "/accounts/:id",
            "/files/*rest",
            "/accounts/{id",
            "/accounts/id}",
            "/accounts/{}",
            "/accounts/{id}.json",
            "/{*rest}/tail",
            "/{id}/{id}",
        ] {
            assert_eq!(
                table.get(path, ok).unwrap_err(),
                RouteError::InvalidPath(format!("/svc{path}")),
                "{path}"
            );
        }
        assert!(table.is_empty());

        table.get("/accounts/{id}", ok).unwrap();
        table.get("/files/{*rest}", ok).unwrap();
        let _ = table.into_router();
    }

    #[test]
    fn test_register_rejects_conflicting_captures() {
        let mut table = table("");
        table.get("/customers/{id}", ok).unwrap();
        assert_eq!(
            table.post("/customers/{name}", ok).unwrap_err(),
            RouteError::Conflict {
                path: "/customers/{name}".to_string(),
                existing: "/customers/{id}".to_string(),
            }
        );
        table.post("/customers/{id}", ok).unwrap();
        let _ = table.into_router();
    }

    #[test]
    fn test_route_new_rejects_unroutable_method() {
        let method = Method::from_bytes(b"BREW").unwrap();
        assert_eq!(
            Route::new(method.clone(), "/coffee", ok).unwrap_err(),
            RouteError::UnsupportedMethod(method)
        );
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let mut table = table("");
        table.get("/accounts", ok).unwrap();
        table.post("/accounts", ok).unwrap();
        let err = table.get("/accounts", ok).unwrap_err();
        assert!(matches!(err, RouteError::Duplicate { .. }));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_prefix_validation() {
        let bad = RouteTable::new(RouteOptions {
            prefix: "svc/".to_string(),
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(bad, Err(RouteError::InvalidPrefix(_))));
    }

    #[tokio::test]
    async fn test_router_dispatches_with_tags() {
        let mut table = table("/svc");
        table.get("/accounts", ok).unwrap();
        let app = table.into_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/svc/accounts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.extensions().get::<RouteTag>().map(|t| &*t.0),
            Some("/svc/accounts")
        );
        assert_eq!(
            response.extensions().get::<DispatchOutcome>(),
            Some(&DispatchOutcome::Completed)
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"], "Succeeded");
    }

    #[tokio::test]
    async fn test_router_extracts_path_params() {
        let mut table = table("");
        table
            .get(
                "/customers/{id}",
                |_w: ResponseWriter, _r: Request<Body>, ctx: RequestContext| async move {
                    Some(Envelope::new().set_data(ctx.param("id").map(str::to_string)))
                },
            )
            .unwrap();

        let response = table
            .into_router()
            .oneshot(
                Request::builder()
                    .uri("/customers/c-9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"], "c-9");
    }

    #[tokio::test]
    async fn test_unmatched_path_has_no_tag() {
        let mut table = table("");
        table.get("/accounts", ok).unwrap();

        let response = table
            .into_router()
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.extensions().get::<RouteTag>().is_none());
    }

    #[tokio::test]
    async fn test_methods_share_a_path() {
        let mut table = table("");
        table.get("/accounts", ok).unwrap();
        table
            .delete(
                "/accounts",
                |_w: ResponseWriter, _r: Request<Body>, _c: RequestContext| async {
                    Some(Envelope::new().set_data("deleted"))
                },
            )
            .unwrap();
        let app = table.into_router();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/accounts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(std::str::from_utf8(&body).unwrap().contains("deleted"));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/accounts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
