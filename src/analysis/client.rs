use std::error::Error as _;
use std::time::Duration;

use log::debug;
use reqwest::Client;

use crate::error::AnalysisError;

use super::{AnalysisRequest, AnalysisResult, Analyzer};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3001";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const ANALYZE_PATH: &str = "/analyze";

/// HTTP client for the analysis service. One request per call, no retry.
#[derive(Clone)]
pub struct AnalysisClient {
    http: Client,
    endpoint: String,
    timeout: Duration,
}

impl AnalysisClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AnalysisError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AnalysisError::Network(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), ANALYZE_PATH),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POST the frame and decode the result. The whole exchange, body
    /// included, is bounded by the configured timeout.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let body = request.to_body();
        let timeout_ms = self.timeout.as_millis() as u64;

        let exchange = async {
            let response = self
                .http
                .post(&self.endpoint)
                .json(&body)
                .send()
                .await
                .map_err(|err| transport_error(err, timeout_ms))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|err| transport_error(err, timeout_ms))?;
            Ok::<_, AnalysisError>((status, text))
        };

        let (status, text) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| AnalysisError::Timeout(timeout_ms))??;

        if !status.is_success() {
            return Err(AnalysisError::Server {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!("analysis response {} ({} bytes)", status, text.len());
        serde_json::from_str(&text).map_err(|err| AnalysisError::InvalidResponse(err.to_string()))
    }
}

impl Analyzer for AnalysisClient {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        AnalysisClient::analyze(self, &request).await
    }
}

fn transport_error(err: reqwest::Error, timeout_ms: u64) -> AnalysisError {
    if err.is_timeout() {
        return AnalysisError::Timeout(timeout_ms);
    }

    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    AnalysisError::Network(message)
}
