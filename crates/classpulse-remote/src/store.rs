//! REST document store client.
//!
//! The store facade exposes each collection under `/api/{collection}`:
//! `GET /api/{collection}/{id}` for single records (404 when absent) and
//! `GET /api/{collection}?field={f}&value={v}` for equality queries. Records
//! come back untagged, so decoding is driven by the requested kind.

use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;

use classpulse_core::error::StoreError;
use classpulse_core::model::{Record, RecordKind};
use classpulse_core::traits::RecordStore;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// HTTP client for the document store facade.
pub struct RestStore {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl RestStore {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Self {
        let timeout = timeout.unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else {
            StoreError::Unavailable(e.to_string())
        }
    }
}

/// Decode one untagged wire record into the typed union for `kind`.
fn decode_record(
    kind: RecordKind,
    id: &str,
    value: serde_json::Value,
) -> Result<Record, StoreError> {
    let malformed = |e: serde_json::Error| StoreError::Malformed {
        kind,
        id: id.to_string(),
        message: e.to_string(),
    };
    Ok(match kind {
        RecordKind::User => Record::User(serde_json::from_value(value).map_err(malformed)?),
        RecordKind::Enrollment => {
            Record::Enrollment(serde_json::from_value(value).map_err(malformed)?)
        }
        RecordKind::Course => Record::Course(serde_json::from_value(value).map_err(malformed)?),
        RecordKind::Module => Record::Module(serde_json::from_value(value).map_err(malformed)?),
        RecordKind::Assignment => {
            Record::Assignment(serde_json::from_value(value).map_err(malformed)?)
        }
        RecordKind::Progress => Record::Progress(serde_json::from_value(value).map_err(malformed)?),
    })
}

fn record_id(value: &serde_json::Value) -> String {
    value
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or("<no id>")
        .to_string()
}

#[async_trait]
impl RecordStore for RestStore {
    #[instrument(skip(self), fields(collection = kind.collection()))]
    async fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, StoreError> {
        let url = format!("{}/api/{}/{}", self.base_url, kind.collection(), id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status().as_u16();
        if status == 404 {
            return Ok(None);
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable(format!(
                "store returned HTTP {status} for {url}: {body}"
            )));
        }

        let value: serde_json::Value =
            response.json().await.map_err(|e| StoreError::Malformed {
                kind,
                id: id.to_string(),
                message: e.to_string(),
            })?;
        decode_record(kind, id, value).map(Some)
    }

    #[instrument(skip(self), fields(collection = kind.collection()))]
    async fn query(
        &self,
        kind: RecordKind,
        field: &str,
        value: &str,
    ) -> Result<Vec<Record>, StoreError> {
        let url = format!("{}/api/{}", self.base_url, kind.collection());
        let response = self
            .client
            .get(&url)
            .query(&[("field", field), ("value", value)])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable(format!(
                "store returned HTTP {status} for {url}: {body}"
            )));
        }

        let values: Vec<serde_json::Value> =
            response.json().await.map_err(|e| StoreError::Malformed {
                kind,
                id: format!("{field}={value}"),
                message: e.to_string(),
            })?;

        // One undecodable element is dropped with a warning rather than
        // failing the whole query.
        let mut records = Vec::with_capacity(values.len());
        for raw in values {
            let id = record_id(&raw);
            match decode_record(kind, &id, raw) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("skipping undecodable record in query result: {e}"),
            }
        }
        Ok(records)
    }
}
