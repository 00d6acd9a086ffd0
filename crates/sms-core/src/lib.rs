//! # SMS Core
//!
//! Core traits and types for the smslog inbound SMS pipeline.
//!
//! This crate provides the building blocks shared by the provider, sink and
//! web crates:
//! - [`InboundMessage`], the normalized form of an inbound SMS webhook
//! - [`LogSink`] trait for appending [`LogRecord`]s to a remote table
//! - [`LogSinkHandle`], the process-wide ready/unavailable sink handle
//! - [`matches_stop_keyword`], the rule deciding which messages get recorded
//! - framework-agnostic [`WebhookResponse`] and the error types
//!
//! ## Example
//!
//! ```rust,ignore
//! use sms_core::{matches_stop_keyword, LogSinkHandle};
//!
//! let sink = LogSinkHandle::unavailable("BIGQUERY_DATASET is not set");
//! if matches_stop_keyword("Please STOP") {
//!     // fails fast with SinkError::Config, no network call
//!     let _ = sink.append("+15550001111", "Please STOP").await;
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Errors raised while reading an inbound webhook
#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    /// Malformed or unsupported request payload
    #[error("invalid request: {0}")]
    Invalid(String),
    /// Request authenticity could not be established
    #[error("signature verification failed: {0}")]
    Verification(String),
}

/// Failures that abort webhook processing and change the response status
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("parsing failed: {0}")]
    ParseError(String),
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),
    #[error("rendering failed: {0}")]
    RenderError(String),
}

impl From<SmsError> for WebhookError {
    fn from(e: SmsError) -> Self {
        match e {
            SmsError::Invalid(msg) => WebhookError::ParseError(msg),
            SmsError::Verification(msg) => WebhookError::VerificationFailed(msg),
        }
    }
}

/// HTTP status code for web responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    Ok = 200,
    BadRequest = 400,
    Unauthorized = 401,
    InternalServerError = 500,
}

impl HttpStatus {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

pub const CONTENT_TYPE_XML: &str = "application/xml";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

/// Generic webhook response that can be converted to any framework's response type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: HttpStatus,
    pub body: String,
    pub content_type: String,
}

impl WebhookResponse {
    /// 200 with a rendered markup document.
    pub fn xml(body: String) -> Self {
        Self {
            status: HttpStatus::Ok,
            body,
            content_type: CONTENT_TYPE_XML.to_string(),
        }
    }

    /// Fixed plain-text error body.
    pub fn text(status: HttpStatus, message: &str) -> Self {
        Self {
            status,
            body: message.to_string(),
            content_type: CONTENT_TYPE_TEXT.to_string(),
        }
    }
}

/// Lightweight header representation to avoid tying the core to any HTTP framework.
pub type Headers = Vec<(String, String)>;

/// Case-insensitive lookup of the first header named `name`.
pub fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Normalized inbound SMS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    /// Provider message id, when the provider sent one.
    pub id: Option<String>,
    /// Sender identifier, empty when absent.
    pub from: String,
    pub to: String,
    /// Message text, empty when absent.
    pub text: String,
    /// Every decoded form pair in arrival order.
    pub params: Vec<(String, String)>,
}

/// True when `text` asks to be recorded: it contains "stop" in any letter case.
///
/// Substring based, so "unstoppable" matches too.
pub fn matches_stop_keyword(text: &str) -> bool {
    !text.is_empty() && text.to_lowercase().contains("stop")
}

/// One row appended to the log table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(rename = "from_number")]
    pub sender: String,
    #[serde(rename = "message_body")]
    pub body: String,
}

impl LogRecord {
    /// Stamps the record with the current UTC instant.
    pub fn now(sender: &str, body: &str) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            sender: sender.to_string(),
            body: body.to_string(),
        }
    }
}

/// A rejection reported by the sink for a single row of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// Index of the row within the submitted batch.
    pub index: usize,
    pub reason: String,
    pub location: Option<String>,
    pub message: String,
}

impl RowError {
    /// Reason, location and message without the row index.
    pub fn cause(&self) -> String {
        let mut cause = self.reason.clone();
        if let Some(location) = &self.location {
            cause.push_str(" at ");
            cause.push_str(location);
        }
        if !self.message.is_empty() {
            cause.push_str(": ");
            cause.push_str(&self.message);
        }
        cause
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.index, self.cause())
    }
}

/// Row errors keyed by row index; one row may carry several.
pub fn group_by_row(errors: &[RowError]) -> BTreeMap<usize, Vec<&RowError>> {
    let mut rows: BTreeMap<usize, Vec<&RowError>> = BTreeMap::new();
    for e in errors {
        rows.entry(e.index).or_default().push(e);
    }
    rows
}

/// Errors that can occur while appending to a log sink
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Sink is missing its destination or client; no network call was made
    #[error("log sink not configured: {0}")]
    Config(String),
    /// Transport failure before a response was received
    #[error("http error: {0}")]
    Http(String),
    /// The call as a whole was refused
    #[error("write rejected: {0}")]
    Rejected(String),
    /// The call succeeded but rows were refused individually
    #[error("{} row(s) rejected", group_by_row(.0).len())]
    Rows(Vec<RowError>),
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

impl SinkError {
    pub fn row_errors(&self) -> &[RowError] {
        match self {
            SinkError::Rows(rows) => rows,
            _ => &[],
        }
    }
}

/// Append-only remote table.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Human-readable destination, e.g. "dataset.table".
    fn destination(&self) -> String;

    /// Append exactly one record in exactly one round trip.
    async fn append(&self, record: LogRecord) -> Result<(), SinkError>;
}

/// Process-wide sink handle, decided once at startup.
#[derive(Clone)]
pub enum LogSinkHandle {
    Ready(Arc<dyn LogSink>),
    /// Carries the reason every append will fail with.
    Unavailable(String),
}

impl LogSinkHandle {
    pub fn ready(sink: Arc<dyn LogSink>) -> Self {
        LogSinkHandle::Ready(sink)
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        LogSinkHandle::Unavailable(reason.into())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, LogSinkHandle::Ready(_))
    }

    /// Build a record stamped now and append it, or fail fast when unavailable.
    pub async fn append(&self, sender: &str, body: &str) -> Result<(), SinkError> {
        match self {
            LogSinkHandle::Ready(sink) => sink.append(LogRecord::now(sender, body)).await,
            LogSinkHandle::Unavailable(reason) => Err(SinkError::Config(reason.clone())),
        }
    }
}

impl fmt::Debug for LogSinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSinkHandle::Ready(sink) => f.debug_tuple("Ready").field(&sink.destination()).finish(),
            LogSinkHandle::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

/// What happened to the best-effort log write of one request.
///
/// Never feeds into the response; only reported through tracing.
#[derive(Debug)]
pub enum LogOutcome {
    /// The filter did not match.
    Skipped,
    Recorded,
    Failed(SinkError),
}

impl LogOutcome {
    pub fn attempted(&self) -> bool {
        !matches!(self, LogOutcome::Skipped)
    }
}
