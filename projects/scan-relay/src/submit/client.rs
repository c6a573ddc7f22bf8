use std::{
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, bail};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::AppConfig;

use super::quantity::Quantity;

pub const SOURCE_TAG: &str = "scanner_app";

/// How a save request is shaped on the wire. The endpoint contract is not
/// ours; all three variants are accepted by the spreadsheet script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Transport {
    /// `GET` with the fields in the query string.
    #[default]
    Get,
    /// `POST` with a JSON batch of items.
    Json,
    /// `POST` with the fields form-encoded.
    Form,
}

impl FromStr for Transport {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "json" => Ok(Self::Json),
            "form" => Ok(Self::Form),
            other => bail!("unknown submit transport: {other}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("could not reach the submission endpoint: {0}")]
    Network(#[from] reqwest::Error),
    #[error("submission endpoint returned HTTP {status}")]
    Status { status: StatusCode, body: String },
    #[error("submission endpoint returned a non-JSON response: {0}")]
    InvalidResponse(String),
    #[error("server rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

impl EndpointResponse {
    fn failure_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.details.clone())
            .unwrap_or_else(|| "unknown server error".to_string())
    }
}

#[derive(Serialize)]
struct SaveParams<'a> {
    operation: &'static str,
    ean: &'a str,
    quantidade: u32,
    timestamp: u64,
    source: &'static str,
}

#[derive(Serialize)]
struct SaveItem<'a> {
    ean: &'a str,
    quantidade: u32,
    timestamp: u64,
}

#[derive(Serialize)]
struct SaveBatch<'a> {
    operation: &'static str,
    source: &'static str,
    items: Vec<SaveItem<'a>>,
}

#[derive(Serialize)]
struct PingParams {
    operation: &'static str,
}

#[derive(Debug, Clone)]
pub struct SubmissionClient {
    endpoint: Url,
    transport: Transport,
    client: Client,
}

impl SubmissionClient {
    pub fn new(endpoint: Url, transport: Transport, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build submission http client")?;
        Ok(Self {
            endpoint,
            transport,
            client,
        })
    }

    /// `None` when no endpoint is configured.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Option<Self>> {
        let Some(endpoint) = config.submit_endpoint.clone() else {
            return Ok(None);
        };
        Self::new(endpoint, config.submit_transport, config.submit_timeout).map(Some)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn save(
        &self,
        code: &str,
        quantity: Quantity,
    ) -> Result<EndpointResponse, SubmitError> {
        let timestamp = unix_millis();
        let request = match self.transport {
            Transport::Get => self.client.get(self.endpoint.clone()).query(&SaveParams {
                operation: "save",
                ean: code,
                quantidade: quantity.get(),
                timestamp,
                source: SOURCE_TAG,
            }),
            Transport::Form => self.client.post(self.endpoint.clone()).form(&SaveParams {
                operation: "save",
                ean: code,
                quantidade: quantity.get(),
                timestamp,
                source: SOURCE_TAG,
            }),
            Transport::Json => self.client.post(self.endpoint.clone()).json(&SaveBatch {
                operation: "save",
                source: SOURCE_TAG,
                items: vec![SaveItem {
                    ean: code,
                    quantidade: quantity.get(),
                    timestamp,
                }],
            }),
        };

        info!(
            "submitting code={code} quantity={quantity} via {:?}",
            self.transport
        );
        let response = request.send().await?;
        read_response(response).await
    }

    /// Checks that the endpoint is reachable and answers with `success`.
    pub async fn ping(&self) -> Result<EndpointResponse, SubmitError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&PingParams { operation: "ping" })
            .send()
            .await?;
        read_response(response).await
    }
}

async fn read_response(response: Response) -> Result<EndpointResponse, SubmitError> {
    let status = response.status();
    let body = response.text().await?;
    debug!("submission endpoint answered status={status} body={body}");
    if !status.is_success() {
        return Err(SubmitError::Status { status, body });
    }

    let parsed: EndpointResponse = serde_json::from_str(&body)
        .map_err(|err| SubmitError::InvalidResponse(err.to_string()))?;
    if !parsed.success {
        return Err(SubmitError::Rejected(parsed.failure_message()));
    }
    Ok(parsed)
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
