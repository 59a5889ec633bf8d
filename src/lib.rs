//! ddogsvc: HTTP service whose handlers run under a per-route deadline, with
//! exactly-once responses and per-request timing metrics.

pub mod api;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use config::ServiceConfig;
pub use http::{Envelope, HttpServer, ResponseWriter};
pub use lifecycle::Shutdown;
pub use routing::{RequestContext, RouteTable};
