//! Upstream health probe backing the online/offline indicator.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::config::Config;

/// Payload of the upstream `/health` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamHealth {
    pub secured: bool,
    pub has_hf_token: bool,
    #[serde(default)]
    pub model: Option<String>,
}

impl UpstreamHealth {
    /// The collaborator contract: online iff both booleans are true.
    pub fn is_online(&self) -> bool {
        self.secured && self.has_hf_token
    }
}

/// Indicator state shown in the status bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthState {
    /// No probe has settled yet.
    Unknown,
    /// Mock mode is active; there is no upstream to probe.
    Mock,
    Online { model: Option<String> },
    Offline,
}

impl HealthState {
    pub fn from_health(health: &UpstreamHealth) -> Self {
        if health.is_online() {
            HealthState::Online {
                model: health.model.clone(),
            }
        } else {
            HealthState::Offline
        }
    }
}

/// Small client for the upstream health endpoint.
#[derive(Clone)]
pub struct HealthClient {
    config: Arc<Config>,
    client: reqwest::Client,
}

impl HealthClient {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self { config, client })
    }

    /// Probe the upstream once.
    pub async fn check(&self) -> Result<UpstreamHealth> {
        let endpoint = self
            .config
            .health_endpoint()
            .ok_or_else(|| anyhow!("upstream health endpoint is not configured"))?;

        let mut builder = self.client.get(&endpoint).header("Accept", "application/json");
        if let Some(key) = &self.config.upstream_api_key {
            builder = builder.header("x-api-key", key);
        }

        let response = builder.send().await.context("failed to reach upstream health service")?;
        if !response.status().is_success() {
            return Err(anyhow!("upstream health returned status {}", response.status()));
        }

        response
            .json::<UpstreamHealth>()
            .await
            .context("invalid upstream health payload")
    }

    /// Probe the upstream and fold the result into an indicator state.
    /// Mock mode short-circuits; probe failures map to offline.
    pub async fn state(&self) -> HealthState {
        if self.config.use_mock_adapter() {
            return HealthState::Mock;
        }
        match self.check().await {
            Ok(health) => HealthState::from_health(&health),
            Err(error) => {
                log::warn!("upstream health probe failed: {error:#}");
                HealthState::Offline
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_requires_both_flags() {
        let payload: UpstreamHealth =
            serde_json::from_str(r#"{"secured": true, "has_hf_token": true, "model": "m"}"#)
                .unwrap();
        assert!(payload.is_online());
        assert_eq!(
            HealthState::from_health(&payload),
            HealthState::Online {
                model: Some("m".to_string())
            }
        );

        let payload: UpstreamHealth =
            serde_json::from_str(r#"{"secured": true, "has_hf_token": false}"#).unwrap();
        assert!(!payload.is_online());
        assert_eq!(HealthState::from_health(&payload), HealthState::Offline);

        let payload: UpstreamHealth =
            serde_json::from_str(r#"{"secured": false, "has_hf_token": true}"#).unwrap();
        assert!(!payload.is_online());
    }

    #[tokio::test]
    async fn mock_mode_reports_mock_state() {
        let client = HealthClient::new(Arc::new(Config::default())).unwrap();
        assert_eq!(client.state().await, HealthState::Mock);
    }
}
