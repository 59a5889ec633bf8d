//! Handlers for the demo endpoints.

use axum::body::Body;
use axum::http::Request;

use crate::api::behaviour::ControlledBehaviour;
use crate::http::error::DomainError;
use crate::http::response::Envelope;
use crate::http::sink::ResponseWriter;
use crate::routing::RequestContext;

pub const SUCCEEDED: &str = "Succeeded";

fn failure(endpoint: &str, err: DomainError, detail: impl std::fmt::Display) -> Envelope {
    Envelope::new()
        .set_error(err)
        .set_message(format!("{endpoint} error - {detail}"))
}

/// `GET /accounts`. Sleeps through the requested latency even after its
/// deadline has passed.
pub async fn accounts(
    _writer: ResponseWriter,
    request: Request<Body>,
    ctx: RequestContext,
) -> Option<Envelope> {
    let behaviour = match ControlledBehaviour::from_uri(request.uri()) {
        Ok(behaviour) => behaviour,
        Err(e) => return Some(failure("Accounts", DomainError::InternalServerError, e)),
    };

    if let Some(latency) = behaviour.latency() {
        tokio::time::sleep(latency).await;
        tracing::info!(
            latency_secs = behaviour.latency_secs,
            cancelled = ctx.is_cancelled(),
            "Latency"
        );
    }

    if let Some(err) = behaviour.error {
        return Some(failure("Accounts", err, err));
    }

    Some(Envelope::new().set_data(SUCCEEDED))
}

/// `GET /customers`. Stops waiting as soon as its context is cancelled.
pub async fn customers(
    _writer: ResponseWriter,
    request: Request<Body>,
    ctx: RequestContext,
) -> Option<Envelope> {
    let behaviour = match ControlledBehaviour::from_uri(request.uri()) {
        Ok(behaviour) => behaviour,
        Err(e) => return Some(failure("Customers", DomainError::InternalServerError, e)),
    };

    if let Some(latency) = behaviour.latency() {
        tokio::select! {
            _ = tokio::time::sleep(latency) => {
                tracing::info!(latency_secs = behaviour.latency_secs, "Latency");
            }
            _ = ctx.cancelled() => {
                tracing::debug!(route = %ctx.route_path(), "Customers cancelled while waiting");
                return Some(Envelope::new().set_error(DomainError::Timeout));
            }
        }
    }

    if let Some(err) = behaviour.error {
        return Some(failure("Customers", err, err));
    }

    Some(Envelope::new().set_data(SUCCEEDED))
}
