use std::fmt;
use std::time::Duration;

use sms_core::{
    matches_stop_keyword, Headers, HttpStatus, InboundMessage, LogOutcome, LogSinkHandle,
    SinkError, WebhookError, WebhookResponse,
};
use sms_twilio::{build_reply, TwilioWebhook, TwimlError};
use tracing::{debug, error, warn};

pub const PARSE_FAILURE_BODY: &str = "Failed to parse form data";
pub const RENDER_FAILURE_BODY: &str = "Failed to generate TwiML";
pub const SIGNATURE_FAILURE_BODY: &str = "Invalid signature";

pub const DEFAULT_LOG_TIMEOUT: Duration = Duration::from_secs(10);

/// Turns a sender into the reply document.
pub type Renderer = fn(&str) -> Result<String, TwimlError>;

/// The acknowledgement reply for `from`.
pub fn render_twiml(from: &str) -> Result<String, TwimlError> {
    build_reply(from).to_xml()
}

/// Framework-agnostic webhook processor that handles the core SMS logic
///
/// Parse, filter, best-effort log write, reply. Only a malformed payload, a
/// bad signature or a rendering failure changes the response status; log
/// sink failures are reported through tracing and otherwise ignored.
#[derive(Clone)]
pub struct WebhookProcessor {
    hook: TwilioWebhook,
    sink: LogSinkHandle,
    log_timeout: Duration,
    render: Renderer,
}

/// Response plus what happened to the log write.
#[derive(Debug)]
pub struct WebhookOutcome {
    pub response: WebhookResponse,
    pub log: LogOutcome,
}

impl WebhookProcessor {
    pub fn new(sink: LogSinkHandle) -> Self {
        Self {
            hook: TwilioWebhook::new(),
            sink,
            log_timeout: DEFAULT_LOG_TIMEOUT,
            render: render_twiml,
        }
    }

    pub fn with_webhook(mut self, hook: TwilioWebhook) -> Self {
        self.hook = hook;
        self
    }

    /// Upper bound on one log write, independent of the inbound request.
    pub fn with_log_timeout(mut self, log_timeout: Duration) -> Self {
        self.log_timeout = log_timeout;
        self
    }

    pub fn with_renderer(mut self, render: Renderer) -> Self {
        self.render = render;
        self
    }

    pub fn sink(&self) -> &LogSinkHandle {
        &self.sink
    }

    pub fn log_timeout(&self) -> Duration {
        self.log_timeout
    }

    /// Process an incoming webhook request and return a framework-agnostic response
    pub async fn process_webhook(&self, headers: &Headers, body: &[u8]) -> WebhookResponse {
        self.handle(headers, body).await.response
    }

    /// Response for a request whose body could not be read, e.g. one over the size limit.
    pub fn reject_unreadable(&self, reason: impl fmt::Display) -> WebhookResponse {
        self.error_to_response(WebhookError::ParseError(reason.to_string()))
    }

    pub async fn handle(&self, headers: &Headers, body: &[u8]) -> WebhookOutcome {
        let msg = match self.accept(headers, body) {
            Ok(msg) => msg,
            Err(e) => {
                return WebhookOutcome {
                    response: self.error_to_response(e),
                    log: LogOutcome::Skipped,
                }
            }
        };

        let log = self.record(&msg).await;

        let response = match (self.render)(&msg.from) {
            Ok(xml) => WebhookResponse::xml(xml),
            Err(e) => self.error_to_response(WebhookError::RenderError(e.to_string())),
        };
        WebhookOutcome { response, log }
    }

    fn accept(&self, headers: &Headers, body: &[u8]) -> Result<InboundMessage, WebhookError> {
        let msg = self.hook.parse_inbound(headers, body)?;
        self.hook.verify(headers, &msg)?;
        debug!(message_sid = ?msg.id, from = %msg.from, to = %msg.to, "accepted inbound SMS");
        Ok(msg)
    }

    async fn record(&self, msg: &InboundMessage) -> LogOutcome {
        if !matches_stop_keyword(&msg.text) {
            return LogOutcome::Skipped;
        }

        let write = tokio::time::timeout(self.log_timeout, self.sink.append(&msg.from, &msg.text));
        let result = match write.await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(self.log_timeout)),
        };

        match result {
            Ok(()) => LogOutcome::Recorded,
            Err(e) => {
                error!(message_sid = ?msg.id, error = %e, "log sink write failed");
                LogOutcome::Failed(e)
            }
        }
    }

    fn error_to_response(&self, error: WebhookError) -> WebhookResponse {
        match error {
            WebhookError::ParseError(msg) => {
                warn!(error = %msg, "rejecting malformed webhook");
                WebhookResponse::text(HttpStatus::BadRequest, PARSE_FAILURE_BODY)
            }
            WebhookError::VerificationFailed(msg) => {
                warn!(error = %msg, "rejecting unsigned webhook");
                WebhookResponse::text(HttpStatus::Unauthorized, SIGNATURE_FAILURE_BODY)
            }
            WebhookError::RenderError(msg) => {
                error!(error = %msg, "failed to render reply");
                WebhookResponse::text(HttpStatus::InternalServerError, RENDER_FAILURE_BODY)
            }
        }
    }
}

impl fmt::Debug for WebhookProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookProcessor")
            .field("hook", &self.hook)
            .field("sink", &self.sink)
            .field("log_timeout", &self.log_timeout)
            .finish_non_exhaustive()
    }
}

/// Helper trait for framework adapters to convert headers
pub trait HeaderConverter {
    type HeaderType;

    fn to_generic_headers(headers: &Self::HeaderType) -> Headers;
}

/// Helper trait for framework adapters to convert responses
pub trait ResponseConverter {
    type ResponseType;

    fn from_webhook_response(response: WebhookResponse) -> Self::ResponseType;
}
