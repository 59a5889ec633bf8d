//! Demo API subsystem.
//!
//! # Data Flow
//! ```text
//! GET {prefix}/accounts | {prefix}/customers
//!     → behaviour.rs (status_code, latency from the query)
//!     → handlers.rs (sleep, then success or domain error envelope)
//!     → dispatcher writes the envelope or the timeout response
//! ```
//!
//! # Design Decisions
//! - `/accounts` ignores cancellation and keeps sleeping past its deadline
//! - `/customers` stops as soon as its context is cancelled

pub mod behaviour;
pub mod handlers;

use crate::routing::{RouteError, RouteTable};
use self::handlers::*;

/// Register the API endpoints on `table`.
pub fn register(table: &mut RouteTable) -> Result<(), RouteError> {
    table
        .get("/accounts", accounts)?
        .get("/customers", customers)?;
    Ok(())
}
