//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     RouteTable::register(method, path, handler)
//!     → prefix applied, duplicates rejected
//!     → into_router(): one axum MethodRouter per path
//!
//! Per request:
//!     axum match → path params extracted
//!     → dispatcher.rs (deadline race, panic containment)
//!     → single write through the idempotent sink
//!     → response tagged with RouteTag + DispatchOutcome
//! ```
//!
//! # Design Decisions
//! - Routes fixed at startup, immutable at runtime
//! - One timeout per table, applied to every route in it
//! - Handlers see cancellation through `RequestContext`, never forced aborts

pub mod context;
pub mod dispatcher;
pub mod router;

pub use context::{PathParams, RequestContext};
pub use dispatcher::{Abnormal, Completion, DispatchOutcome, Dispatcher, RouteTag, TIMEOUT_BODY};
pub use router::{Handler, HandlerFuture, Route, RouteError, RouteOptions, RouteTable};
