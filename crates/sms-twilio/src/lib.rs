//! # Twilio
//!
//! Twilio side of the pipeline: decoding inbound SMS webhooks, optional
//! `X-Twilio-Signature` checks, and messaging TwiML replies.
//!
//! ```rust,ignore
//! use sms_twilio::{build_reply, TwilioWebhook};
//!
//! let hook = TwilioWebhook::new();
//! let msg = hook.parse_inbound(&headers, body)?;
//! let xml = build_reply(&msg.from).to_xml()?;
//! ```

pub mod form;
pub mod signature;
pub mod twiml;

pub use form::{first_value, parse_form, FORM_URLENCODED};
pub use signature::{SignatureVerifier, SIGNATURE_HEADER};
pub use twiml::{build_reply, reply_text, Message, MessagingResponse, TwimlError};

use sms_core::{Headers, InboundMessage, SmsError};
use tracing::debug;

/// Inbound Twilio messaging webhook.
#[derive(Debug, Clone, Default)]
pub struct TwilioWebhook {
    verifier: Option<SignatureVerifier>,
}

impl TwilioWebhook {
    /// Accepts requests without checking where they came from.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signature_verification(mut self, verifier: SignatureVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn verifies_signatures(&self) -> bool {
        self.verifier.is_some()
    }

    /// Decode the form payload. `Body` and `From` default to empty strings.
    pub fn parse_inbound(&self, headers: &Headers, body: &[u8]) -> Result<InboundMessage, SmsError> {
        let params = parse_form(headers, body)?;
        let field = |key: &str| first_value(&params, key).unwrap_or_default().to_string();
        let id = first_value(&params, "MessageSid").map(str::to_string);
        let (from, to, text) = (field("From"), field("To"), field("Body"));

        debug!(message_sid = ?id, fields = params.len(), "decoded inbound webhook");
        Ok(InboundMessage {
            id,
            from,
            to,
            text,
            params,
        })
    }

    /// No-op unless signature verification was configured.
    pub fn verify(&self, headers: &Headers, msg: &InboundMessage) -> Result<(), SmsError> {
        match &self.verifier {
            Some(verifier) => verifier.verify(headers, &msg.params),
            None => Ok(()),
        }
    }
}
