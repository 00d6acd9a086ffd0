use axum::{
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use sms_core::{Headers, WebhookResponse};
use sms_web_generic::{HeaderConverter, ResponseConverter, WebhookProcessor};

#[derive(Clone)]
pub struct AppState {
    pub processor: WebhookProcessor,
}

impl AppState {
    pub fn new(processor: WebhookProcessor) -> Self {
        Self { processor }
    }
}

/// Axum-specific header converter
pub struct AxumHeaderConverter;

impl HeaderConverter for AxumHeaderConverter {
    type HeaderType = HeaderMap;

    fn to_generic_headers(headers: &Self::HeaderType) -> Headers {
        headers
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }
}

/// Axum-specific response converter
pub struct AxumResponseConverter;

impl ResponseConverter for AxumResponseConverter {
    type ResponseType = Response;

    fn from_webhook_response(response: WebhookResponse) -> Self::ResponseType {
        let status = StatusCode::from_u16(response.status.as_u16())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        (
            status,
            [(header::CONTENT_TYPE, response.content_type)],
            response.body,
        )
            .into_response()
    }
}

/// Handler: POST of a Twilio messaging webhook.
///
/// A body that cannot be buffered (over the size limit, or cut short) is a
/// form parse failure like any other.
pub async fn twilio_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> impl IntoResponse {
    let response = match body {
        Ok(body) => {
            let generic_headers = AxumHeaderConverter::to_generic_headers(&headers);
            state.processor.process_webhook(&generic_headers, &body).await
        }
        Err(rejection) => state.processor.reject_unreadable(rejection.body_text()),
    };
    AxumResponseConverter::from_webhook_response(response)
}

pub async fn healthz() -> &'static str {
    "ok"
}

/// Webhook at `webhook_path`, `GET /healthz`, bodies capped at `max_body_size` bytes.
pub fn router(state: AppState, webhook_path: &str, max_body_size: usize) -> Router {
    Router::new()
        .route(webhook_path, post(twilio_webhook))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(state)
}
