//! `application/x-www-form-urlencoded` decoding for Twilio webhooks.
//!
//! Decoding is strict: a stray `%` or a `;` separator rejects the whole
//! payload instead of being passed through literally.

use sms_core::{header_value, Headers, SmsError};
use url::form_urlencoded;

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Decode a form body into its key/value pairs, in arrival order.
///
/// Without a `Content-Type` the body is opaque and no pairs are read; any
/// media type other than a form is refused.
pub fn parse_form(headers: &Headers, body: &[u8]) -> Result<Vec<(String, String)>, SmsError> {
    let Some(content_type) = header_value(headers, "content-type") else {
        return Ok(Vec::new());
    };
    check_content_type(content_type)?;
    validate_encoding(body)?;
    Ok(form_urlencoded::parse(body).into_owned().collect())
}

/// First value submitted for `key`.
pub fn first_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn check_content_type(value: &str) -> Result<(), SmsError> {
    let media_type = value.split(';').next().unwrap_or_default().trim();
    if media_type.is_empty() || !media_type.contains('/') {
        return Err(SmsError::Invalid(format!("malformed content type: {:?}", value)));
    }
    if !media_type.eq_ignore_ascii_case(FORM_URLENCODED) {
        return Err(SmsError::Invalid(format!("unsupported content type: {}", media_type)));
    }
    Ok(())
}

fn validate_encoding(body: &[u8]) -> Result<(), SmsError> {
    let mut i = 0;
    while i < body.len() {
        match body[i] {
            b';' => return Err(SmsError::Invalid("invalid semicolon separator".into())),
            b'%' => match body.get(i + 1..i + 3) {
                Some(&[hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                    i += 3;
                    continue;
                }
                _ => {
                    let end = (i + 3).min(body.len());
                    return Err(SmsError::Invalid(format!(
                        "invalid percent escape {:?}",
                        String::from_utf8_lossy(&body[i..end])
                    )));
                }
            },
            _ => {}
        }
        i += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form_headers() -> Headers {
        vec![("Content-Type".into(), FORM_URLENCODED.into())]
    }

    #[test]
    fn decodes_plus_and_escapes() {
        let params = parse_form(&form_headers(), b"Body=Please+STOP%21&From=%2B15550001111").unwrap();
        assert_eq!(first_value(&params, "Body"), Some("Please STOP!"));
        assert_eq!(first_value(&params, "From"), Some("+15550001111"));
        assert_eq!(first_value(&params, "To"), None);
    }

    #[test]
    fn first_value_wins_for_repeated_keys() {
        let params = parse_form(&form_headers(), b"From=a&From=b").unwrap();
        assert_eq!(first_value(&params, "From"), Some("a"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn empty_body_has_no_pairs() {
        assert!(parse_form(&form_headers(), b"").unwrap().is_empty());
    }

    #[test]
    fn content_type_parameters_are_accepted() {
        let headers = vec![(
            "content-type".to_string(),
            "application/x-www-form-urlencoded; charset=UTF-8".to_string(),
        )];
        assert!(parse_form(&headers, b"Body=hi").is_ok());
    }

    #[test]
    fn missing_content_type_reads_no_pairs() {
        assert!(parse_form(&vec![], b"Body=STOP&From=%2B1").unwrap().is_empty());
        // the body is not inspected at all
        assert!(parse_form(&vec![], b"Body=%zz;x").unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_percent_escapes() {
        for body in [&b"Body=%zz"[..], b"Body=100%", b"Body=%4", b"From=1&Body=%&x=y"] {
            let err = parse_form(&form_headers(), body).unwrap_err();
            assert!(matches!(err, SmsError::Invalid(_)), "{:?}", String::from_utf8_lossy(body));
        }
    }

    #[test]
    fn rejects_semicolon_separator() {
        assert!(parse_form(&form_headers(), b"Body=stop;From=1").is_err());
    }

    #[test]
    fn rejects_other_media_types() {
        let json = vec![("content-type".to_string(), "application/json".to_string())];
        assert!(parse_form(&json, b"Body=stop").is_err());
        let garbage = vec![("content-type".to_string(), ";;".to_string())];
        assert!(parse_form(&garbage, b"Body=stop").is_err());
    }
}
