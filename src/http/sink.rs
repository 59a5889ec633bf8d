//! Response streams and the idempotent sink.
//!
//! # Responsibilities
//! - Abstract the writable response stream handlers and the dispatcher share
//! - Record whether anything has been written, exactly once
//! - Turn the buffered writes into the response axum sends
//!
//! # Design Decisions
//! - `IdempotentSink` holds a plain flag and no lock; only one owner at a time
//! - `ResponseWriter` is the handle for the handler task; it serialises access
//!   to the sink because the handler runs on its own task
//! - Writes after the dispatcher commits never reach the client

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

use crate::http::response::{Envelope, SendError};

/// A writable HTTP response.
pub trait ResponseStream: Send {
    /// Headers to send. Changes after `write_header` are ignored by buffered
    /// streams once committed.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Send the status line. Only the first call takes effect.
    fn write_header(&mut self, status: StatusCode);

    /// Append body bytes, implying a 200 if no status was written.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Stream that collects status, headers and body into an axum response.
#[derive(Debug, Default)]
pub struct BufferedStream {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl BufferedStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Build the response. A stream nobody wrote to becomes an empty 200.
    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseStream for BufferedStream {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        match self.status {
            None => self.status = Some(status),
            Some(current) => {
                tracing::debug!(
                    current = %current,
                    ignored = %status,
                    "Superfluous write_header call ignored"
                );
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// Wraps a stream and remembers whether a header or body byte went out.
///
/// The flag is set before delegating and never reset.
#[derive(Debug)]
pub struct IdempotentSink<S> {
    inner: S,
    written: bool,
}

impl<S: ResponseStream> IdempotentSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            written: false,
        }
    }

    /// Whether anything has been written.
    pub fn written(&self) -> bool {
        self.written
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ResponseStream> ResponseStream for IdempotentSink<S> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.written = true;
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written = true;
        self.inner.write(buf)
    }
}

type Slot = Option<IdempotentSink<BufferedStream>>;

/// Handle to the per-request response, given to handlers.
///
/// Cloning yields another handle to the same response. Once the dispatcher
/// has committed the response, writes fail with `BrokenPipe`.
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    slot: Arc<Mutex<Slot>>,
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn committed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "response already committed")
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(IdempotentSink::new(BufferedStream::new())))),
        }
    }

    /// Set a response header. Returns false once the response is committed.
    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) -> bool {
        match self.slot.lock().as_mut() {
            Some(sink) => {
                sink.headers_mut().insert(name, value);
                true
            }
            None => false,
        }
    }

    pub fn write_header(&self, status: StatusCode) {
        match self.slot.lock().as_mut() {
            Some(sink) => sink.write_header(status),
            None => tracing::debug!(status = %status, "Header write after commit dropped"),
        }
    }

    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        match self.slot.lock().as_mut() {
            Some(sink) => sink.write(buf),
            None => Err(committed()),
        }
    }

    /// Send an envelope through this handle.
    pub fn send(&self, envelope: &Envelope) -> Result<(), SendError> {
        match self.slot.lock().as_mut() {
            Some(sink) => envelope.send(sink),
            None => Err(SendError::Io(committed())),
        }
    }

    /// Whether anything has been written. Always true after commit.
    pub fn written(&self) -> bool {
        self.slot.lock().as_ref().map_or(true, IdempotentSink::written)
    }

    /// Whether the dispatcher has taken the response.
    pub fn is_committed(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// Run `write` against the sink only if nothing has been written yet.
    ///
    /// The check and the write happen under one lock, so a racing handler
    /// write lands either entirely before (and `write` is skipped) or after.
    pub(crate) fn write_if_unwritten<T>(
        &self,
        write: impl FnOnce(&mut IdempotentSink<BufferedStream>) -> T,
    ) -> Option<T> {
        let mut slot = self.slot.lock();
        match slot.as_mut() {
            Some(sink) if !sink.written() => Some(write(sink)),
            _ => None,
        }
    }

    /// Take the response out. Later writes through any handle are dropped.
    pub(crate) fn commit(&self) -> Option<Response<Body>> {
        self.slot
            .lock()
            .take()
            .map(|sink| sink.into_inner().into_response())
    }
}
