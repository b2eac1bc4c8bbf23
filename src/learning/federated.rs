//! Federated learning uplink: POST anonymized samples to the backend.

use super::{AnonymizedSample, LearningBackend};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const SUBMIT_PATH: &str = "/api/v1/federated/samples";

pub struct FederatedClient {
    client: reqwest::Client,
    base_url: String,
}

impl FederatedClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let base_url = endpoint.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(EngineError::Config("federated endpoint is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .build()?;
        Ok(Self { client, base_url })
    }

    pub fn submit_url(&self) -> String {
        format!("{}{}", self.base_url, SUBMIT_PATH)
    }
}

#[async_trait]
impl LearningBackend for FederatedClient {
    async fn submit(&self, sample: &AnonymizedSample) -> Result<()> {
        let res = self
            .client
            .post(self.submit_url())
            .json(sample)
            .send()
            .await
            .map_err(|e| EngineError::LearningSubmissionFailed(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(EngineError::LearningSubmissionFailed(format!("{} {}", status, text)));
        }
        debug!(threat_type = sample.threat_type.as_str(), "federated sample accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{AssessmentInput, FeatureExtractor};
    use crate::learning::anonymize;
    use crate::policy::{AgeGroup, PolicyTable};
    use crate::protection::ProtectionDomain;
    use crate::risk::{ThreatAssessment, ThreatType};

    #[test]
    fn url_joins_without_double_slash() {
        let c = FederatedClient::new("https://fl.example.org/", Duration::from_secs(3)).unwrap();
        assert_eq!(c.submit_url(), "https://fl.example.org/api/v1/federated/samples");
        assert!(FederatedClient::new("", Duration::from_secs(3)).is_err());
    }

    #[tokio::test]
    async fn unreachable_backend_is_submission_failure() {
        let c = FederatedClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let table = PolicyTable::standard();
        let sample = anonymize(
            &AssessmentInput::new(ProtectionDomain::Network),
            &ThreatAssessment::new(0.3, 0.2, ThreatType::Malware),
            table.get(AgeGroup::Adult),
            &FeatureExtractor::default(),
        );
        let err = c.submit(&sample).await.unwrap_err();
        assert!(matches!(err, EngineError::LearningSubmissionFailed(_)));
    }
}
