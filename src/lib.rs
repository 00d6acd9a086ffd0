//! # smslog
//!
//! Twilio SMS webhook that records opt-out style messages to BigQuery and
//! acknowledges every message with a TwiML reply.
//!
//! ## Pipeline
//!
//! 1. decode the `application/x-www-form-urlencoded` webhook (`400` on failure)
//! 2. if `Body` contains "stop" in any letter case, stream one row
//!    (`timestamp`, `from_number`, `message_body`) to BigQuery; failures are
//!    logged and otherwise ignored
//! 3. reply `200 application/xml` with
//!    `Your message from {From} has been processed by Go.`
//!
//! ## Configuration
//!
//! ```rust,ignore
//! use smslog::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! let app = smslog::app::build_app(&config);
//! ```
//!
//! `BIGQUERY_DATASET`, `BIGQUERY_TABLE` and `GCP_PROJECT` select the log
//! table; every other key can be set as `SMSLOG__SECTION__KEY`.

pub mod app;
pub mod config;
pub mod telemetry;

pub use config::*;

/// Common imports for smslog usage
pub mod prelude {
    pub use crate::app::{build_app, build_log_sink, build_processor};
    pub use crate::config::{
        AppConfig, BigQueryConfig, LoggingConfig, SecurityConfig, ServerConfig,
    };
    pub use sms_core::*;
    pub use sms_web_generic::WebhookProcessor;
}
