//! # BigQuery log sink
//!
//! Appends [`LogRecord`]s to a BigQuery table through the streaming
//! `tabledata.insertAll` endpoint, one row per call.
//!
//! The client never retries and never buffers. Rows the service refuses
//! individually come back as [`SinkError::Rows`]; a refused call comes back as
//! [`SinkError::Rejected`].
//!
//! ```rust,ignore
//! use sms_bigquery::BigQueryClient;
//! use sms_core::{LogRecord, LogSink};
//!
//! let client = BigQueryClient::new("my-project", "sms", "opt_outs")?
//!     .with_access_token(Some(token));
//! client.append(LogRecord::now("+15550001111", "STOP")).await?;
//! ```

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sms_core::{group_by_row, LogRecord, LogSink, RowError, SinkError};
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com";

const INSERT_ALL_KIND: &str = "bigquery#tableDataInsertAllRequest";

/// Fully qualified destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

/// BigQuery streaming-insert client bound to one table.
#[derive(Clone)]
pub struct BigQueryClient {
    table: TableRef,
    /// API base URL; override for testing/mocking.
    base_url: String,
    /// Bearer token sent as-is; minting and refreshing it is the caller's job.
    access_token: Option<String>,
    http: reqwest::Client,
}

impl BigQueryClient {
    /// Fails with [`SinkError::Config`] when any identifier is blank.
    pub fn new<S: Into<String>>(project: S, dataset: S, table: S) -> Result<Self, SinkError> {
        let table = TableRef {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        };
        for (name, value) in [
            ("project", &table.project),
            ("dataset", &table.dataset),
            ("table", &table.table),
        ] {
            if value.trim().is_empty() {
                return Err(SinkError::Config(format!("BigQuery {} id is empty", name)));
            }
        }
        Ok(Self {
            table,
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: None,
            http: reqwest::Client::new(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_access_token(mut self, access_token: Option<String>) -> Self {
        self.access_token = access_token.filter(|t| !t.is_empty());
        self
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn insert_all_url(&self) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/datasets/{}/tables/{}/insertAll",
            self.base_url.trim_end_matches('/'),
            self.table.project,
            self.table.dataset,
            self.table.table
        )
    }
}

impl fmt::Debug for BigQueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryClient")
            .field("table", &self.table)
            .field("base_url", &self.base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllRequest<'a> {
    kind: &'static str,
    rows: Vec<InsertRow<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertRow<'a> {
    insert_id: String,
    json: &'a LogRecord,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertErrors>,
}

#[derive(Debug, Deserialize)]
struct InsertErrors {
    index: usize,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    location: Option<String>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

fn row_errors(response: InsertAllResponse) -> Vec<RowError> {
    let mut rows = Vec::new();
    for entry in response.insert_errors {
        if entry.errors.is_empty() {
            rows.push(RowError {
                index: entry.index,
                reason: "unknown".into(),
                location: None,
                message: String::new(),
            });
        }
        for e in entry.errors {
            rows.push(RowError {
                index: entry.index,
                reason: e.reason,
                location: e.location.filter(|l| !l.is_empty()),
                message: e.message,
            });
        }
    }
    rows
}

#[async_trait]
impl LogSink for BigQueryClient {
    fn destination(&self) -> String {
        format!("{}.{}", self.table.dataset, self.table.table)
    }

    async fn append(&self, record: LogRecord) -> Result<(), SinkError> {
        let payload = InsertAllRequest {
            kind: INSERT_ALL_KIND,
            rows: vec![InsertRow {
                insert_id: Uuid::new_v4().to_string(),
                json: &record,
            }],
        };

        let mut req = self.http.post(self.insert_all_url()).json(&payload);
        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.map_err(|e| SinkError::Http(e.to_string()))?;

        let status = res.status();
        let raw = res.text().await.map_err(|e| SinkError::Http(e.to_string()))?;
        if !status.is_success() {
            let detail = serde_json::from_str::<ApiErrorBody>(&raw)
                .ok()
                .map(|b| b.error.message)
                .filter(|m| !m.is_empty())
                .unwrap_or(raw);
            return Err(SinkError::Rejected(format!("HTTP {}: {}", status, detail)));
        }

        let response: InsertAllResponse = if raw.trim().is_empty() {
            InsertAllResponse::default()
        } else {
            serde_json::from_str(&raw)
                .map_err(|e| SinkError::Http(format!("unreadable insertAll response: {}", e)))?
        };

        let rejected = row_errors(response);
        if !rejected.is_empty() {
            for (index, errors) in group_by_row(&rejected) {
                let causes: Vec<String> = errors.iter().map(|e| e.cause()).collect();
                warn!(
                    destination = %self.destination(),
                    row = index,
                    error = %causes.join("; "),
                    "BigQuery row error"
                );
            }
            return Err(SinkError::Rows(rejected));
        }

        info!(destination = %self.destination(), "inserted row into BigQuery");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    const ROUTE: &str = "/bigquery/v2/projects/{project}/datasets/{dataset}/tables/{table}/insertAll";

    type Seen = mpsc::UnboundedReceiver<(HeaderMap, Value)>;

    async fn spawn_mock(status: StatusCode, reply: Value) -> (String, Seen) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new().route(
            ROUTE,
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let tx = tx.clone();
                let reply = reply.clone();
                async move {
                    let _ = tx.send((headers, body));
                    (status, Json(reply))
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), rx)
    }

    fn client(base: &str) -> BigQueryClient {
        BigQueryClient::new("proj", "sms", "opt_outs")
            .unwrap()
            .with_base_url(base)
            .with_access_token(Some("tok".into()))
    }

    #[test]
    fn rejects_blank_identifiers() {
        for (p, d, t) in [("", "d", "t"), ("p", "", "t"), ("p", "d", " ")] {
            assert!(matches!(BigQueryClient::new(p, d, t), Err(SinkError::Config(_))));
        }
    }

    #[test]
    fn builds_insert_all_url() {
        let c = BigQueryClient::new("proj", "sms", "opt_outs").unwrap().with_base_url("http://x/");
        assert_eq!(
            c.insert_all_url(),
            "http://x/bigquery/v2/projects/proj/datasets/sms/tables/opt_outs/insertAll"
        );
        assert_eq!(c.destination(), "sms.opt_outs");
        assert!(!format!("{:?}", c.with_access_token(Some("secret".into()))).contains("secret"));
    }

    #[tokio::test]
    async fn streams_one_row() {
        let (base, mut seen) = spawn_mock(StatusCode::OK, json!({"kind": "bigquery#tableDataInsertAllResponse"})).await;
        client(&base)
            .append(LogRecord::now("+15550001111", "Please STOP"))
            .await
            .unwrap();

        let (headers, body) = seen.recv().await.unwrap();
        assert_eq!(headers["authorization"], "Bearer tok");
        assert_eq!(body["kind"], INSERT_ALL_KIND);
        let rows = body["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0]["insertId"].as_str().unwrap().is_empty());
        assert_eq!(rows[0]["json"]["from_number"], "+15550001111");
        assert_eq!(rows[0]["json"]["message_body"], "Please STOP");
        assert!(rows[0]["json"]["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn every_call_gets_a_fresh_insert_id() {
        let (base, mut seen) = spawn_mock(StatusCode::OK, json!({})).await;
        let c = client(&base);
        c.append(LogRecord::now("+1", "stop")).await.unwrap();
        c.append(LogRecord::now("+1", "stop")).await.unwrap();
        let (_, first) = seen.recv().await.unwrap();
        let (_, second) = seen.recv().await.unwrap();
        assert_ne!(first["rows"][0]["insertId"], second["rows"][0]["insertId"]);
    }

    #[tokio::test]
    async fn surfaces_row_level_errors() {
        let reply = json!({
            "kind": "bigquery#tableDataInsertAllResponse",
            "insertErrors": [{
                "index": 0,
                "errors": [{"reason": "invalid", "location": "timestamp", "debugInfo": "", "message": "no such field"}]
            }]
        });
        let (base, _seen) = spawn_mock(StatusCode::OK, reply).await;
        let err = client(&base).append(LogRecord::now("+1", "STOP")).await.unwrap_err();
        let rows = err.row_errors();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].index, 0);
        assert_eq!(rows[0].reason, "invalid");
        assert_eq!(rows[0].location.as_deref(), Some("timestamp"));
        assert_eq!(rows[0].message, "no such field");
    }

    #[tokio::test]
    async fn several_errors_for_one_row_are_one_rejected_row() {
        let reply = json!({
            "insertErrors": [{
                "index": 0,
                "errors": [
                    {"reason": "invalid", "location": "timestamp", "message": "bad value"},
                    {"reason": "invalid", "location": "from_number", "message": "too long"}
                ]
            }]
        });
        let (base, _seen) = spawn_mock(StatusCode::OK, reply).await;
        let err = client(&base).append(LogRecord::now("+1", "STOP")).await.unwrap_err();
        assert_eq!(err.row_errors().len(), 2);
        assert_eq!(group_by_row(err.row_errors()).len(), 1);
        assert_eq!(err.to_string(), "1 row(s) rejected");
    }

    #[tokio::test]
    async fn call_level_failure_carries_api_message() {
        let reply = json!({"error": {"code": 404, "message": "Not found: Table proj:sms.opt_outs", "status": "NOT_FOUND"}});
        let (base, _seen) = spawn_mock(StatusCode::NOT_FOUND, reply).await;
        match client(&base).append(LogRecord::now("+1", "STOP")).await {
            Err(SinkError::Rejected(detail)) => {
                assert!(detail.contains("404"));
                assert!(detail.contains("Not found: Table"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_http_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = client(&format!("http://{}", addr))
            .append(LogRecord::now("+1", "STOP"))
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Http(_)));
    }

    #[test]
    fn entry_without_details_still_counts() {
        let response: InsertAllResponse =
            serde_json::from_value(json!({"insertErrors": [{"index": 0}]})).unwrap();
        let rows = row_errors(response);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reason, "unknown");
    }
}
