//! Wiring from [`AppConfig`] to a ready-to-serve router.

use std::future::{self, Future};
use std::io;
use std::sync::Arc;

use axum::Router;
use sms_bigquery::BigQueryClient;
use sms_core::LogSinkHandle;
use sms_twilio::{SignatureVerifier, TwilioWebhook};
use sms_web_axum::{router, AppState};
use sms_web_generic::WebhookProcessor;
use tracing::{error, info, warn};

use crate::config::{AppConfig, BigQueryConfig, BIGQUERY_DATASET_ENV, BIGQUERY_TABLE_ENV};

/// Decide once whether BigQuery logging is available.
///
/// Never fails: a missing destination or a client that cannot be built yields
/// an unavailable handle and the service keeps replying to messages.
pub fn build_log_sink(config: &BigQueryConfig) -> LogSinkHandle {
    let nonblank = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
    let (Some(dataset), Some(table)) = (nonblank(&config.dataset), nonblank(&config.table)) else {
        warn!(
            "missing {} or {}; BigQuery logging will fail",
            BIGQUERY_DATASET_ENV, BIGQUERY_TABLE_ENV
        );
        return LogSinkHandle::unavailable(format!(
            "{} or {} is not set",
            BIGQUERY_DATASET_ENV, BIGQUERY_TABLE_ENV
        ));
    };

    let project = nonblank(&config.project).unwrap_or_default();
    match BigQueryClient::new(project, dataset, table) {
        Ok(client) => {
            let client = client
                .with_base_url(config.base_url.clone())
                .with_access_token(config.access_token.clone());
            info!(table = ?client.table(), "BigQuery logging enabled");
            LogSinkHandle::ready(Arc::new(client))
        }
        Err(e) => {
            error!(error = %e, "error initializing BigQuery client");
            LogSinkHandle::unavailable(e.to_string())
        }
    }
}

pub fn build_processor(config: &AppConfig) -> WebhookProcessor {
    let mut hook = TwilioWebhook::new();
    if config.security.verify_signatures {
        if let (Some(token), Some(url)) = (&config.security.auth_token, &config.security.public_url) {
            hook = hook.with_signature_verification(SignatureVerifier::new(token, url));
        }
    } else {
        warn!("inbound webhook signatures are not verified");
    }

    WebhookProcessor::new(build_log_sink(&config.bigquery))
        .with_webhook(hook)
        .with_log_timeout(config.log_timeout())
}

pub fn build_app(config: &AppConfig) -> Router {
    router(
        AppState::new(build_processor(config)),
        &config.server.webhook_path,
        config.security.max_body_size,
    )
}

/// Resolves once `signal` fires.
///
/// If the signal handler cannot be installed the error is logged and this
/// never resolves, so the server keeps serving instead of exiting at once.
pub async fn shutdown_on<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            error!(error = %e, "unable to listen for shutdown signal");
            future::pending::<()>().await;
        }
    }
}
