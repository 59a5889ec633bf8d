//! Per-request dispatch under a deadline.
//!
//! # State Machine
//! ```text
//! RUNNING ──handler returns envelope──▶ COMPLETED ──┐
//!    │    ──handler panics / no envelope─▶ ABNORMAL ─┼─▶ RESPONDED
//!    └────deadline elapses──────────────▶ TIMED_OUT ─┘
//! ```
//!
//! # Responsibilities
//! - Run the handler on its own task so the deadline watch never blocks
//! - Race handler completion against the route timeout
//! - Contain handler panics and missing envelopes as one abnormal outcome
//! - Write exactly one response through the request's sink
//!
//! # Design Decisions
//! - Handlers are not aborted at the deadline. Their context is cancelled and
//!   whatever they produce afterwards is discarded.
//! - When completion and the deadline land together, either may win; the
//!   sink guarantees only that one of them writes.
//! - Every fallback write checks `written()` first, atomically with the write.

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use futures_util::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::http::request::RequestIdExt;
use crate::http::response::Envelope;
use crate::http::sink::{ResponseStream, ResponseWriter};
use crate::routing::context::{PathParams, RequestContext};
use crate::routing::router::Route;

/// Body sent when the deadline fires first.
pub const TIMEOUT_BODY: &[u8] = b"timeout";

/// Deadline used when `started + timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// How a dispatched request ended. Attached to the response extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler returned an envelope before the deadline.
    Completed,
    /// The deadline fired before the handler finished.
    TimedOut,
    /// The handler panicked or returned no envelope.
    Abnormal,
}

/// Full path of the route that served a response, for metric tagging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTag(pub Arc<str>);

/// Why a handler finished without an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Abnormal {
    /// Returned `None`; the handler may have written the response itself.
    NoEnvelope,
    /// Panicked; the payload message is kept for logging only.
    Panicked { message: String },
}

/// Result of one handler execution.
#[derive(Debug)]
pub enum Completion {
    Envelope(Envelope),
    Abnormal(Abnormal),
}

/// Runs matched routes under a fixed timeout.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Dispatch `request` to `route` and produce the response to send.
    pub async fn dispatch(
        &self,
        route: &Route,
        request: Request<Body>,
        params: PathParams,
    ) -> Response<Body> {
        let started = Instant::now();
        let deadline = started
            .checked_add(self.timeout)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let request_uri = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());
        let request_id = request.request_id().map(str::to_string);

        let ctx = RequestContext::new(route.path_arc(), params, deadline, request_id);
        // Cancels the handler's context however this future ends, including
        // when the client goes away and axum drops it.
        let _cancel_on_exit = ctx.token().clone().drop_guard();

        let writer = ResponseWriter::new();
        let completion = spawn_handler(route, writer.clone(), request, ctx.clone());

        let outcome = tokio::select! {
            result = completion => match result {
                Ok(Completion::Envelope(envelope)) => {
                    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                    send_envelope(&writer, envelope.set_latency(latency_ms), &request_uri, &ctx);
                    DispatchOutcome::Completed
                }
                Ok(Completion::Abnormal(reason)) => {
                    close_abnormal(&writer, &reason, &ctx);
                    DispatchOutcome::Abnormal
                }
                Err(_) => {
                    // Handler task was torn down without reporting back.
                    close_abnormal(&writer, &Abnormal::NoEnvelope, &ctx);
                    DispatchOutcome::Abnormal
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                ctx.cancel();
                write_timeout(&writer, &request_uri, &ctx, self.timeout);
                DispatchOutcome::TimedOut
            }
        };

        let mut response = writer.commit().unwrap_or_else(|| {
            tracing::error!(route = %ctx.route_path(), "Response committed twice");
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        });
        response
            .extensions_mut()
            .insert(RouteTag(route.path_arc()));
        response.extensions_mut().insert(outcome);
        response
    }
}

/// Start the handler on its own task. The receiver yields exactly one
/// completion unless the runtime shuts down first.
fn spawn_handler(
    route: &Route,
    writer: ResponseWriter,
    request: Request<Body>,
    ctx: RequestContext,
) -> oneshot::Receiver<Completion> {
    install_panic_hook();
    let (tx, rx) = oneshot::channel();
    let handler = route.handler();
    let path = route.path_arc();

    tokio::spawn(async move {
        let call = AssertUnwindSafe(async move { handler.call(writer, request, ctx).await });
        let completion = match call.catch_unwind().await {
            Ok(Some(envelope)) => Completion::Envelope(envelope),
            Ok(None) => Completion::Abnormal(Abnormal::NoEnvelope),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                let backtrace = take_panic_backtrace()
                    .unwrap_or_else(|| Backtrace::force_capture().to_string());
                tracing::error!(
                    path = %path,
                    error = %message,
                    backtrace = %backtrace,
                    "Panic in api handler"
                );
                Completion::Abnormal(Abnormal::Panicked { message })
            }
        };

        if tx.send(completion).is_err() {
            tracing::debug!(path = %path, "Handler finished after its deadline, result discarded");
        }
    });

    rx
}

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Record a backtrace at the panic site. `catch_unwind` returns on the thread
/// that panicked, so the handler task picks it up from the thread local.
fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

fn take_panic_backtrace() -> Option<String> {
    PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn send_envelope(writer: &ResponseWriter, envelope: Envelope, request_uri: &str, ctx: &RequestContext) {
    tracing::info!(
        resp_status_code = envelope.status().as_u16(),
        code = %envelope.code(),
        latency = envelope.latency_ms().unwrap_or_default(),
        request_uri = %request_uri,
        request_id = ctx.request_id().unwrap_or("-"),
        log = ?envelope.log_fields(),
        "Request processed"
    );

    match writer.write_if_unwritten(|sink| envelope.send(sink)) {
        Some(Ok(())) => {}
        Some(Err(e)) => {
            tracing::error!(route = %ctx.route_path(), error = %e, "Failed to send envelope");
            close_abnormal(writer, &Abnormal::NoEnvelope, ctx);
        }
        None => {
            tracing::warn!(
                route = %ctx.route_path(),
                "Handler wrote a response and returned an envelope, envelope dropped"
            );
        }
    }
}

fn close_abnormal(writer: &ResponseWriter, reason: &Abnormal, ctx: &RequestContext) {
    let wrote = writer.write_if_unwritten(|sink| {
        sink.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        sink.write(b"")
    });

    if wrote.is_some() {
        tracing::error!(
            route = %ctx.route_path(),
            reason = ?reason,
            "Error nil response from the handler"
        );
    }
}

fn write_timeout(writer: &ResponseWriter, request_uri: &str, ctx: &RequestContext, timeout: Duration) {
    let wrote = writer.write_if_unwritten(|sink| {
        sink.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        sink.write_header(StatusCode::GATEWAY_TIMEOUT);
        sink.write(TIMEOUT_BODY)
    });

    match wrote {
        Some(Err(e)) => tracing::error!(error = %e, "Failed to write timeout response"),
        Some(Ok(_)) => tracing::warn!(
            route = %ctx.route_path(),
            request_uri = %request_uri,
            timeout_secs = timeout.as_secs_f64(),
            "Handler exceeded deadline"
        ),
        None => tracing::warn!(
            route = %ctx.route_path(),
            request_uri = %request_uri,
            "Handler exceeded deadline after writing, keeping its partial response"
        ),
    }
}
