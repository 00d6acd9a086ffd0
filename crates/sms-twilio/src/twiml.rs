//! Messaging TwiML documents.

use std::fmt::{self, Write};

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

#[derive(Debug, thiserror::Error)]
pub enum TwimlError {
    #[error("failed to write TwiML: {0}")]
    Format(#[from] fmt::Error),
}

/// `<Message>` verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub body: String,
}

/// `<Response>` document holding messaging verbs in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagingResponse {
    messages: Vec<Message>,
}

impl MessagingResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, body: impl Into<String>) -> Self {
        self.messages.push(Message { body: body.into() });
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn to_xml(&self) -> Result<String, TwimlError> {
        let mut out = String::new();
        self.write_xml(&mut out)?;
        Ok(out)
    }

    pub fn write_xml<W: Write>(&self, out: &mut W) -> Result<(), TwimlError> {
        out.write_str(XML_DECLARATION)?;
        out.write_str("<Response>")?;
        for message in &self.messages {
            out.write_str("<Message>")?;
            escape_text(out, &message.body)?;
            out.write_str("</Message>")?;
        }
        out.write_str("</Response>")?;
        Ok(())
    }
}

/// Reply text acknowledging a message from `from`.
pub fn reply_text(from: &str) -> String {
    format!("Your message from {} has been processed by Go.", from)
}

/// Single-message reply for `from`. The sender is inserted verbatim.
pub fn build_reply(from: &str) -> MessagingResponse {
    MessagingResponse::new().message(reply_text(from))
}

// Characters outside the XML 1.0 Char production become U+FFFD.
fn escape_text<W: Write>(out: &mut W, text: &str) -> fmt::Result {
    for c in text.chars() {
        match c {
            '&' => out.write_str("&amp;")?,
            '<' => out.write_str("&lt;")?,
            '>' => out.write_str("&gt;")?,
            '"' => out.write_str("&#34;")?,
            '\'' => out.write_str("&#39;")?,
            '\t' => out.write_str("&#x9;")?,
            '\n' => out.write_str("&#xA;")?,
            '\r' => out.write_str("&#xD;")?,
            c if is_xml_char(c) => out.write_char(c)?,
            _ => out.write_char('\u{FFFD}')?,
        }
    }
    Ok(())
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}
