//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, middleware layers)
//!     → request.rs (request ID set and propagated)
//!     → [routing dispatcher runs the handler under its deadline]
//!     → response.rs (envelope encoded, status from code)
//!     → sink.rs (exactly one write reaches the client)
//!     → Send to client
//! ```

pub mod error;
pub mod request;
pub mod response;
pub mod server;
pub mod sink;

pub use error::{DomainError, ErrorChain, MalformedCode, ResponseCode};
pub use request::{RequestIdExt, UuidRequestId, X_REQUEST_ID};
pub use response::{Envelope, ErrorEntry, SendError};
pub use server::HttpServer;
pub use sink::{BufferedStream, IdempotentSink, ResponseStream, ResponseWriter};
