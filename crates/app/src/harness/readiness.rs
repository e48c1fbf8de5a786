use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::client::transport_kind;
use crate::config::{ReadinessConfig, Service, ServiceEndpoint};

/// Bounded, fixed-interval retry budget for one health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub attempt_timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::from(&ReadinessConfig::default())
    }
}

impl From<&ReadinessConfig> for ReadinessPolicy {
    fn from(config: &ReadinessConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            interval: config.interval(),
            attempt_timeout: config.attempt_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub service: Service,
    pub url: String,
    pub ready: bool,
    pub attempts: u32,
}

/// Poll `url` until it answers with a success status or the attempts run out.
///
/// Transport errors, per-attempt timeouts and non-success statuses all count as one failed
/// attempt. Never errors; exhaustion is reported as `false` and the caller decides what to do.
pub async fn wait_for_service(http: &reqwest::Client, url: &str, policy: &ReadinessPolicy) -> bool {
    probe(http, url, policy).await.0
}

async fn probe(http: &reqwest::Client, url: &str, policy: &ReadinessPolicy) -> (bool, u32) {
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        let failure = match http.get(url).timeout(policy.attempt_timeout).send().await {
            Ok(response) if response.status().is_success() => {
                info!(%url, attempt, "service ready");
                return (true, attempt);
            }
            Ok(response) => format!("status {}", response.status()),
            Err(err) => format!("{}: {err}", transport_kind(&err)),
        };

        warn!(%url, attempt, max_attempts, reason = %failure, "service not ready");
        if attempt < max_attempts {
            sleep(policy.interval).await;
        }
    }
    (false, max_attempts)
}

/// Probe every endpoint in order. All endpoints are probed even after one fails so the
/// report names every service that never came up.
pub async fn probe_all(
    http: &reqwest::Client,
    endpoints: &[ServiceEndpoint],
    policy: &ReadinessPolicy,
) -> Vec<ProbeResult> {
    let mut results = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        let url = endpoint.health_url();
        let (ready, attempts) = probe(http, &url, policy).await;
        results.push(ProbeResult {
            service: endpoint.service,
            url,
            ready,
            attempts,
        });
    }
    results
}
