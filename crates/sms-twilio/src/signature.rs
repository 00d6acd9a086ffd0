//! `X-Twilio-Signature` request validation.
//!
//! The signature is base64(HMAC-SHA1(auth token, url + sorted key/value pairs)).

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sms_core::{header_value, Headers, SmsError};

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

#[derive(Clone)]
pub struct SignatureVerifier {
    auth_token: String,
    /// Public URL Twilio posts to, exactly as configured in the console.
    url: String,
}

impl SignatureVerifier {
    pub fn new(auth_token: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Expected signature for `params`.
    pub fn sign(&self, params: &[(String, String)]) -> Result<String, SmsError> {
        Ok(STANDARD.encode(self.mac(params)?.finalize().into_bytes()))
    }

    pub fn verify(&self, headers: &Headers, params: &[(String, String)]) -> Result<(), SmsError> {
        let provided = header_value(headers, SIGNATURE_HEADER)
            .ok_or_else(|| SmsError::Verification(format!("missing {} header", SIGNATURE_HEADER)))?;
        let provided = STANDARD
            .decode(provided.trim())
            .map_err(|e| SmsError::Verification(format!("signature is not base64: {}", e)))?;
        self.mac(params)?
            .verify_slice(&provided)
            .map_err(|_| SmsError::Verification("signature mismatch".into()))
    }

    fn mac(&self, params: &[(String, String)]) -> Result<HmacSha1, SmsError> {
        let mut mac = HmacSha1::new_from_slice(self.auth_token.as_bytes())
            .map_err(|e| SmsError::Verification(e.to_string()))?;
        mac.update(self.url.as_bytes());

        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort();
        for (key, value) in sorted {
            mac.update(key.as_bytes());
            mac.update(value.as_bytes());
        }
        Ok(mac)
    }
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("auth_token", &"<redacted>")
            .field("url", &self.url)
            .finish()
    }
}
