//! HTTP gateway for the AO network.
//!
//! Spawns and messages go through a signing relay; results are read from a
//! compute unit.

use anyhow::{Context, Result};
use aoform_reconcile::{EvalResult, GatewayError, NetworkGateway, Signer, SpawnRequest, Tag};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;

/// Header carrying the signer address to the relay.
pub const SIGNER_HEADER: &str = "X-Signer-Address";

/// [`NetworkGateway`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    gateway_url: String,
    cu_url: String,
}

#[derive(Debug, Serialize)]
struct SpawnBody<'a> {
    module: &'a str,
    scheduler: &'a str,
    tags: &'a [Tag],
}

#[derive(Debug, Serialize)]
struct MessageBody<'a> {
    process: &'a str,
    data: &'a str,
    tags: &'a [Tag],
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ResultResponse {
    #[serde(rename = "Error", default)]
    error: Option<serde_json::Value>,
    #[serde(rename = "Output", default)]
    output: Option<serde_json::Value>,
}

impl HttpGateway {
    /// Create a gateway from config.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.http_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
            cu_url: config.cu_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        signer: &Signer,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.gateway_url, path);
        let response = self
            .client
            .post(&url)
            .header(SIGNER_HEADER, signer.address())
            .json(body)
            .send()
            .await
            .map_err(request_error)?;

        handle_response(response).await
    }
}

#[async_trait]
impl NetworkGateway for HttpGateway {
    async fn spawn(&self, request: &SpawnRequest, signer: &Signer) -> Result<String, GatewayError> {
        let body = SpawnBody {
            module: &request.module,
            scheduler: &request.scheduler,
            tags: &request.tags,
        };
        let response: IdResponse = self.post("/spawn", &body, signer).await?;
        Ok(response.id)
    }

    async fn send_message(
        &self,
        process_id: &str,
        data: &str,
        tags: &[Tag],
        signer: &Signer,
    ) -> Result<String, GatewayError> {
        let body = MessageBody {
            process: process_id,
            data,
            tags,
        };
        let response: IdResponse = self.post("/message", &body, signer).await?;
        Ok(response.id)
    }

    async fn fetch_result(
        &self,
        process_id: &str,
        message_id: &str,
    ) -> Result<EvalResult, GatewayError> {
        let url = format!("{}/result/{}", self.cu_url, message_id);
        let response = self
            .client
            .get(&url)
            .query(&[("process-id", process_id)])
            .send()
            .await
            .map_err(request_error)?;

        let result: ResultResponse = handle_response(response).await?;
        let error = result.error.and_then(error_details);
        debug!(process_id, message_id, has_error = error.is_some(), "Fetched result");

        Ok(EvalResult {
            error,
            output: result.output,
        })
    }
}

/// Render the `Error` member of a result. Null and empty values mean success.
fn error_details(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.trim().is_empty() => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// A request that never produced a response.
fn request_error(err: reqwest::Error) -> GatewayError {
    if err.is_builder() {
        GatewayError::Rejected(format!("invalid request: {err}"))
    } else {
        GatewayError::Transient(err.to_string())
    }
}

/// Whether a status is worth retrying.
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

async fn handle_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status();

    if status.is_success() {
        return response.json().await.map_err(|e| {
            if e.is_decode() {
                GatewayError::Rejected(format!("failed to parse response: {e}"))
            } else {
                GatewayError::Transient(e.to_string())
            }
        });
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("{} {}", status, body.trim());
    if is_transient_status(status) {
        Err(GatewayError::Transient(message))
    } else {
        Err(GatewayError::Rejected(message))
    }
}
