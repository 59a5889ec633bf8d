//! Response envelope returned by every handler.
//!
//! # Responsibilities
//! - Carry the response code, message, payload and error list
//! - Keep the HTTP status derived from the code at all times
//! - Serialize to the JSON wire format and write it to a response stream
//!
//! # Design Decisions
//! - Builder-style setters taking `self` so envelopes build in one expression
//! - Internal-error text is replaced by a generic message unless overridden
//! - Latency is stamped by the dispatcher, right before sending

use axum::http::{header, HeaderValue, StatusCode};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

use crate::http::error::{code_for, domain_kind, ResponseCode};
use crate::http::sink::ResponseStream;
use crate::routing::context::RequestContext;

/// Text sent in place of any internal error.
pub const GENERIC_INTERNAL_MESSAGE: &str = "Internal Server error";

/// One entry of the `error_message` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    pub error_name: String,
    pub error_description: String,
}

impl ErrorEntry {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error_name: name.into(),
            error_description: description.into(),
        }
    }

    pub fn internal() -> Self {
        Self::new(
            "internal_server_error",
            "The server is unable to complete your request",
        )
    }

    pub fn bad_request() -> Self {
        Self::new("bad_request", "Your request resulted in error")
    }

    pub fn unauthorized() -> Self {
        Self::new("access_denied", "Authorization failed by filter.")
    }
}

/// Failure to put an envelope on the wire.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write envelope: {0}")]
    Io(#[from] std::io::Error),
}

/// The structured response produced by a handler.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    code: ResponseCode,
    #[serde(skip_serializing_if = "String::is_empty")]
    message: String,
    #[serde(rename = "error_message", skip_serializing_if = "Vec::is_empty")]
    errors: Vec<ErrorEntry>,
    #[serde(rename = "error", skip_serializing_if = "String::is_empty")]
    error_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(rename = "latency", serialize_with = "serialize_latency")]
    latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    success: Option<i64>,

    #[serde(skip)]
    status: StatusCode,
    #[serde(skip)]
    error: Option<Arc<dyn StdError + Send + Sync>>,
    #[serde(skip)]
    log: BTreeMap<String, Value>,
    #[serde(skip)]
    context: Option<RequestContext>,
}

impl Serialize for ResponseCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

fn serialize_latency<S: Serializer>(latency: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match latency {
        Some(ms) => serializer.serialize_str(&format!("{ms:.2} ms")),
        None => serializer.serialize_str(""),
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope {
    /// A success envelope with no payload.
    pub fn new() -> Self {
        Self {
            code: ResponseCode::GENERIC_SUCCESS,
            message: String::new(),
            errors: Vec::new(),
            error_text: String::new(),
            data: None,
            latency_ms: None,
            success: None,
            status: StatusCode::OK,
            error: None,
            log: BTreeMap::new(),
            context: None,
        }
    }

    /// Attach the request context the envelope was built under.
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Record `err` and take its code from the error table.
    pub fn set_error<E>(self, err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.apply_error(Arc::new(err), None)
    }

    /// Like `set_error`, but `message` replaces the error text, even for
    /// internal errors.
    pub fn set_error_with_message<E>(self, err: E, message: impl Into<String>) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.apply_error(Arc::new(err), Some(message.into()))
    }

    fn apply_error(mut self, err: Arc<dyn StdError + Send + Sync>, message: Option<String>) -> Self {
        let err_ref: &(dyn StdError + 'static) = err.as_ref();
        self.error_text = match domain_kind(err_ref) {
            Some(kind) => kind.to_string(),
            None => err.to_string(),
        };
        self.set_code(code_for(Some(err_ref)));
        if self.status == StatusCode::INTERNAL_SERVER_ERROR {
            self.error_text = GENERIC_INTERNAL_MESSAGE.to_string();
        }
        if let Some(message) = message {
            self.error_text = message;
        }
        self.error = Some(err);
        self
    }

    fn set_code(&mut self, code: ResponseCode) {
        self.code = code;
        self.status = match code.http_status() {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(error = %e, "Response code escaped startup validation");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
    }

    /// Set the payload. A value that fails to serialize is dropped and logged.
    pub fn set_data<T: Serialize>(mut self, data: T) -> Self {
        match serde_json::to_value(data) {
            Ok(Value::Null) => self.data = None,
            Ok(value) => self.data = Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping envelope payload that failed to serialize");
                self.data = None;
            }
        }
        self
    }

    pub fn set_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Stamp the elapsed handling time in milliseconds.
    pub fn set_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn set_success(mut self, success: i64) -> Self {
        self.success = Some(success);
        self
    }

    /// Add a key/value pair to the server-side log bag. Never serialized.
    pub fn set_log<T: Serialize>(mut self, key: impl Into<String>, value: T) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.log.insert(key.into(), value);
        self
    }

    pub fn append_error(mut self, entry: ErrorEntry) -> Self {
        self.errors.push(entry);
        self
    }

    pub fn code(&self) -> ResponseCode {
        self.code
    }

    /// HTTP status derived from the code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Client-visible error text.
    pub fn error_text(&self) -> &str {
        &self.error_text
    }

    /// The originating error, if any.
    pub fn error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.error.as_deref()
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    pub fn latency_ms(&self) -> Option<f64> {
        self.latency_ms
    }

    pub fn log_fields(&self) -> &BTreeMap<String, Value> {
        &self.log
    }

    pub fn context(&self) -> Option<&RequestContext> {
        self.context.as_ref()
    }

    /// Encode the externally visible fields.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Serialize, set the content type, write the status, then the body.
    pub fn send<S: ResponseStream + ?Sized>(&self, stream: &mut S) -> Result<(), SendError> {
        let body = self.to_json()?;
        stream.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        stream.write_header(self.status);
        stream.write(&body)?;
        Ok(())
    }
}
