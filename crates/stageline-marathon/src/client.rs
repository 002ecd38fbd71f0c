//! HTTP client for the Marathon v2 API.
//!
//! One TCP connection per request, driven through hyper's low-level
//! http1 client with an overall timeout. Marathon deployments are
//! short-lived polls every few seconds; connection reuse buys nothing
//! worth the pool bookkeeping here.

use std::time::Duration;

use anyhow::Context;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tracing::debug;

use stageline_progression::DeploymentActivity;

use crate::types::{AppsPage, ServiceApp};

/// Client for one Marathon endpoint (`host:port`).
#[derive(Debug, Clone)]
pub struct MarathonClient {
    address: String,
    timeout: Duration,
}

impl MarathonClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Deployments currently in flight (`GET /v2/deployments`).
    pub async fn get_deployments(&self) -> anyhow::Result<Vec<DeploymentActivity>> {
        let deployments: Vec<DeploymentActivity> = self.get_json("/v2/deployments").await?;
        debug!(count = deployments.len(), "marathon deployments fetched");
        Ok(deployments)
    }

    /// All service applications (`GET /v2/apps`).
    pub async fn get_apps(&self) -> anyhow::Result<Vec<ServiceApp>> {
        let page: AppsPage = self.get_json("/v2/apps").await?;
        debug!(count = page.apps.len(), "marathon service apps fetched");
        Ok(page.apps)
    }

    /// Perform a GET and deserialize the JSON response body.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let uri = format!("http://{}{path}", self.address);

        let body = tokio::time::timeout(self.timeout, async {
            let stream = tokio::net::TcpStream::connect(&self.address)
                .await
                .with_context(|| format!("connect to marathon at {}", self.address))?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .context("marathon http handshake")?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let req = http::Request::builder()
                .method("GET")
                .uri(uri.as_str())
                .header("host", self.address.as_str())
                .header("accept", "application/json")
                .header("user-agent", "stageline/0.1")
                .body(http_body_util::Empty::<bytes::Bytes>::new())
                .context("build marathon request")?;

            let resp = sender
                .send_request(req)
                .await
                .with_context(|| format!("GET {uri}"))?;

            if !resp.status().is_success() {
                anyhow::bail!("GET {uri} returned {}", resp.status());
            }

            let collected = resp
                .into_body()
                .collect()
                .await
                .with_context(|| format!("read body of {uri}"))?;
            Ok::<bytes::Bytes, anyhow::Error>(collected.to_bytes())
        })
        .await
        .map_err(|_| anyhow::anyhow!("GET {uri} timed out after {:?}", self.timeout))??;

        serde_json::from_slice(&body).with_context(|| format!("decode body of {uri}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployments_response_shape() {
        // The exact shape Marathon returns from /v2/deployments.
        let json = r#"[
            {"id": "97c136bf-5a28-4821-9d94-480d9fbb01c8",
             "version": "2015-09-30T09:09:17.614Z",
             "affectedApps": ["/orders"],
             "steps": [{"actions": [{"action": "ScaleApplication", "app": "/orders"}]}]}
        ]"#;
        let deployments: Vec<DeploymentActivity> = serde_json::from_str(json).unwrap();
        assert_eq!(deployments.len(), 1);
        assert_eq!(deployments[0].id, "97c136bf-5a28-4821-9d94-480d9fbb01c8");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        // Reserved TEST-NET address; the connect must fail fast or time out.
        let client = MarathonClient::new("192.0.2.1:1").with_timeout(Duration::from_millis(200));
        assert!(client.get_deployments().await.is_err());
    }
}
