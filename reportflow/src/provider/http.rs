//! HTTP analysis provider.

use super::{AnalysisProvider, ProviderResult};
use crate::context::RequestPayload;
use crate::errors::{ConfigError, StageFailureKind};
use crate::registry::StageDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for [`HttpAnalysisProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpProviderConfig {
    /// Base URL; stage calls go to `{base_url}/stages/{stage_id}`.
    pub base_url: String,
    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl HttpProviderConfig {
    /// Creates a configuration for a base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Adds a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Checks that the base URL is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::new(
                "base_url",
                format!("'{url}' is not an http(s) URL"),
            ));
        }
        Ok(())
    }

    /// Returns the endpoint for a stage.
    #[must_use]
    pub fn stage_url(&self, stage_id: &str) -> String {
        format!("{}/stages/{stage_id}", self.base_url.trim().trim_end_matches('/'))
    }
}

/// Posts request payloads as JSON and returns the decoded response body.
#[derive(Debug, Clone)]
pub struct HttpAnalysisProvider {
    client: reqwest::Client,
    config: HttpProviderConfig,
}

impl HttpAnalysisProvider {
    /// Creates a provider with a default client.
    pub fn new(config: HttpProviderConfig) -> Result<Self, ConfigError> {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Creates a provider with a caller-supplied client.
    pub fn with_client(
        client: reqwest::Client,
        config: HttpProviderConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { client, config })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &HttpProviderConfig {
        &self.config
    }
}

#[async_trait]
impl AnalysisProvider for HttpAnalysisProvider {
    async fn invoke(
        &self,
        stage: &StageDefinition,
        payload: &RequestPayload,
        timeout: Duration,
    ) -> ProviderResult {
        let url = self.config.stage_url(&stage.id);
        let mut request = self.client.post(&url).timeout(timeout).json(payload);
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        debug!(stage_id = %stage.id, url = %url, "Calling analysis provider");

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return ProviderResult::timeout(timeout),
            Err(e) => {
                warn!(stage_id = %stage.id, error = %e, "Provider request failed");
                return ProviderResult::failure(StageFailureKind::ProviderError, e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return ProviderResult::failure(
                StageFailureKind::ProviderError,
                format!("provider returned HTTP {}: {body}", status.as_u16()),
            );
        }

        match response.json::<serde_json::Value>().await {
            Ok(data) => ProviderResult::success(data),
            Err(e) if e.is_timeout() => ProviderResult::timeout(timeout),
            Err(e) => ProviderResult::failure(
                StageFailureKind::SchemaMismatch,
                format!("undecodable provider response: {e}"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_url() {
        let config = HttpProviderConfig::new("https://analysis.local/api/");
        assert_eq!(
            config.stage_url("market"),
            "https://analysis.local/api/stages/market"
        );
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let err = HttpAnalysisProvider::new(HttpProviderConfig::new("ftp://nope")).unwrap_err();
        assert_eq!(err.key, "base_url");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_provider_error() {
        let provider = HttpAnalysisProvider::new(
            HttpProviderConfig::new("http://127.0.0.1:9").with_header("x-tenant", "acme"),
        )
        .unwrap();
        let stage = StageDefinition::new("market", "Market", "trends", 1.0);
        let payload = crate::context::ContextAccumulator::build(
            &crate::core::EntityProfile::new("Acme Corp", "software"),
            &stage,
            &[],
        );

        let result = provider.invoke(&stage, &payload, Duration::from_secs(5)).await;
        match result {
            ProviderResult::Failure { kind, .. } => {
                assert!(matches!(
                    kind,
                    StageFailureKind::ProviderError | StageFailureKind::Timeout
                ));
            }
            ProviderResult::Success { .. } => panic!("expected failure"),
        }
    }
}
