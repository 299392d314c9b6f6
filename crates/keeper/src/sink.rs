use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use neutral_keeper_core::{MetricDatum, MetricDimension, MetricsSink};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct MetricsPayload<'a> {
    namespace: &'a str,
    dimensions: [&'a MetricDimension; 1],
    metrics: &'a [MetricDatum],
    timestamp: i64,
}

/// Posts the end-of-run counters as JSON to a collector endpoint.
#[derive(Debug, Clone)]
pub struct HttpMetricsSink {
    http_client: Client,
    endpoint: String,
    namespace: String,
}

impl HttpMetricsSink {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, namespace: impl Into<String>) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build metrics HTTP client")?;
        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            namespace: namespace.into(),
        })
    }
}

#[async_trait]
impl MetricsSink for HttpMetricsSink {
    async fn publish(&self, dimension: &MetricDimension, data: &[MetricDatum]) -> anyhow::Result<()> {
        let payload = MetricsPayload {
            namespace: &self.namespace,
            dimensions: [dimension],
            metrics: data,
            timestamp: Utc::now().timestamp(),
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to POST metrics to {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Metrics endpoint returned {status}: {body}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neutral_keeper_core::Metrics;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_publishes_full_schema() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/metrics"))
            .and(body_partial_json(serde_json::json!({
                "namespace": "DeltaNeutralKeeper",
                "dimensions": [{"name": "Network", "value": "testnet"}]
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpMetricsSink::new(format!("{}/metrics", server.uri()), "DeltaNeutralKeeper")
            .unwrap();
        let metrics = Metrics::new();
        sink.publish(&MetricDimension::network("testnet"), &metrics.snapshot())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["metrics"].as_array().unwrap().len(), 16);
        assert_eq!(body["metrics"][0]["name"], "positions_total");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("collector down"))
            .mount(&server)
            .await;

        let sink = HttpMetricsSink::new(server.uri(), "DeltaNeutralKeeper").unwrap();
        let err = sink
            .publish(&MetricDimension::network("mainnet"), &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
