use super::protocol::{ShardProgressRequest, ShardProgressResponse, ENDPOINT_SHARD_PROGRESS};
use crate::membership::service::MembershipService;
use crate::membership::types::NodeId;
use crate::snapshots::reducer::ShardProgressReport;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Worker-side client for delivering terminal shard reports to the
/// coordinator.
///
/// Reports may be lost, duplicated, or arrive late; the reducer's no-op
/// checks make redundant deliveries harmless, so this client retries
/// aggressively and the worst outcome of over-delivery is a dropped
/// duplicate.
pub struct ProgressClient {
    membership: Arc<MembershipService>,
    http_client: reqwest::Client,
    attempts: usize,
}

impl ProgressClient {
    pub fn new(membership: Arc<MembershipService>, attempts: usize) -> Self {
        Self {
            membership,
            http_client: reqwest::Client::new(),
            attempts,
        }
    }

    /// Sends a report batch to `coordinator`, retrying transient failures.
    pub async fn report(
        &self,
        coordinator: &NodeId,
        reports: Vec<ShardProgressReport>,
    ) -> Result<bool> {
        let addr = self
            .membership
            .http_addr_of(coordinator)
            .ok_or_else(|| anyhow::anyhow!("Coordinator node not found: {:?}", coordinator))?;

        let payload = ShardProgressRequest { reports };
        let response = self
            .post_with_retry(
                format!("http://{}{}", addr, ENDPOINT_SHARD_PROGRESS),
                &payload,
                Duration::from_millis(500),
            )
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Progress report rejected: {}", response.status());
        }

        let parsed: ShardProgressResponse = response.json().await?;
        Ok(parsed.applied)
    }

    async fn post_with_retry<T: serde::Serialize>(
        &self,
        url: String,
        payload: &T,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..self.attempts {
            let response = self
                .http_client
                .post(url.clone())
                .json(payload)
                .timeout(timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == self.attempts {
                        return Err(anyhow::anyhow!(e));
                    }
                    // Jitter to avoid synchronized retries across workers
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }
}
