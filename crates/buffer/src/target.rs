//! Delivery targets for flushed batches.

use crate::error::DeliveryError;
use async_trait::async_trait;
use logship_core::LogEvent;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Endpoint acknowledgement of a delivered batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DeliveryReceipt {
    /// Events persisted
    pub accepted: usize,
    /// Events refused for validation reasons (not retried)
    pub rejected: usize,
}

/// Where a flushed batch goes.
#[async_trait]
pub trait DeliveryTarget: Send + Sync {
    /// Deliver a batch, in order.
    ///
    /// `Ok` means the whole batch was acknowledged. Any error means none of
    /// it was; the buffer keeps the batch unless the error is permanent.
    async fn deliver(&self, batch: &[LogEvent]) -> Result<DeliveryReceipt, DeliveryError>;
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    events: &'a [LogEvent],
    batch_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    client_timestamp: chrono::DateTime<chrono::Utc>,
}

/// Delivers batches to the ingestion endpoint over HTTP.
pub struct HttpTarget {
    client: Client,
    url: String,
    session_id: Option<String>,
}

impl HttpTarget {
    /// Target `url` (e.g. `http://host:8088/api/logs/batch`).
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Network(e.to_string()))?;
        Ok(HttpTarget {
            client,
            url: url.into(),
            session_id: None,
        })
    }

    /// Tag every batch with a session id (builder pattern).
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[async_trait]
impl DeliveryTarget for HttpTarget {
    async fn deliver(&self, batch: &[LogEvent]) -> Result<DeliveryReceipt, DeliveryError> {
        let request = BatchRequest {
            events: batch,
            batch_id: uuid::Uuid::new_v4().to_string(),
            session_id: self.session_id.as_deref(),
            client_timestamp: chrono::Utc::now(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<DeliveryReceipt>()
                .await
                .map_err(|e| DeliveryError::Network(format!("unreadable acknowledgement: {}", e)));
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(DeliveryError::Backpressure { retry_after });
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::post;
    use axum::{Json, Router};
    use logship_core::EventSource;
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/api/logs/batch", addr)
    }

    fn events() -> Vec<LogEvent> {
        vec![LogEvent::builder(EventSource::ClientEvent, "USER_ACTION")
            .build()
            .unwrap()]
    }

    #[tokio::test]
    async fn test_delivers_and_reads_receipt() {
        let router = Router::new().route(
            "/api/logs/batch",
            post(|Json(body): Json<Value>| async move {
                let n = body["events"].as_array().map(|a| a.len()).unwrap_or(0);
                assert_eq!(body["session_id"], "s-1");
                Json(json!({"accepted": n, "rejected": 0, "errors": []}))
            }),
        );
        let url = serve(router).await;
        let target = HttpTarget::new(url, Duration::from_secs(5))
            .unwrap()
            .with_session_id("s-1");

        let receipt = target.deliver(&events()).await.unwrap();
        assert_eq!(receipt, DeliveryReceipt { accepted: 1, rejected: 0 });
    }

    #[tokio::test]
    async fn test_maps_backpressure() {
        let router = Router::new().route(
            "/api/logs/batch",
            post(|| async {
                let mut headers = HeaderMap::new();
                headers.insert("retry-after", "1".parse().unwrap());
                (AxumStatus::TOO_MANY_REQUESTS, headers, Json(json!({"error": "backpressure"})))
            }),
        );
        let url = serve(router).await;
        let target = HttpTarget::new(url, Duration::from_secs(5)).unwrap();
        assert_eq!(
            target.deliver(&events()).await,
            Err(DeliveryError::Backpressure {
                retry_after: Some(Duration::from_secs(1))
            })
        );
    }

    #[tokio::test]
    async fn test_maps_rejection_and_network_errors() {
        let router = Router::new().route(
            "/api/logs/batch",
            post(|| async { (AxumStatus::PAYLOAD_TOO_LARGE, "too many events") }),
        );
        let url = serve(router).await;
        let target = HttpTarget::new(url, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            target.deliver(&events()).await,
            Err(DeliveryError::Rejected { status: 413, .. })
        ));

        // Nothing listens on port 9 of localhost
        let offline = HttpTarget::new("http://127.0.0.1:9/api/logs/batch", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            offline.deliver(&events()).await,
            Err(DeliveryError::Network(_))
        ));
    }
}
