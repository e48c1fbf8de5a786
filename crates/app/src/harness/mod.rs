use anyhow::Result;
use chrono::Utc;
use thiserror::Error;
use tracing::{error, info};

use crate::client::{ServiceClient, build_http_client};
use crate::config::{HarnessConfig, Service, ServiceEndpoint};
use crate::report::RunReport;
use crate::scenario::{Scenario, ScenarioRunner};

pub mod readiness;
pub use readiness::{ProbeResult, ReadinessPolicy, probe_all, wait_for_service};

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("services not ready: {}", .services.join(", "))]
    ServicesNotReady {
        services: Vec<String>,
        probes: Vec<ProbeResult>,
    },
}

/// Readiness gate followed by the scenario runner, against one resolved set of endpoints.
pub struct Harness {
    config: HarnessConfig,
    client: ServiceClient,
    probe_http: reqwest::Client,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        let client = ServiceClient::new(&config)?;
        // Probe calls carry their own per-attempt timeout.
        let probe_http = build_http_client(config.readiness.attempt_timeout())?;
        for service in Service::ALL {
            info!(
                service = service.name(),
                url = client.endpoint(service).base_url(),
                "using {service}"
            );
        }
        Ok(Self {
            config,
            client,
            probe_http,
        })
    }

    fn endpoints(&self) -> Vec<ServiceEndpoint> {
        Service::ALL
            .iter()
            .map(|service| self.client.endpoint(*service).clone())
            .collect()
    }

    /// Probe every dependent service; error if any never became healthy.
    pub async fn ensure_services_ready(&self) -> Result<Vec<ProbeResult>, HarnessError> {
        let policy = ReadinessPolicy::from(&self.config.readiness);
        let results = probe_all(&self.probe_http, &self.endpoints(), &policy).await;
        let services: Vec<String> = results
            .iter()
            .filter(|probe| !probe.ready)
            .map(|probe| probe.service.name().to_string())
            .collect();
        if services.is_empty() {
            Ok(results)
        } else {
            Err(HarnessError::ServicesNotReady {
                services,
                probes: results,
            })
        }
    }

    /// Gate on readiness, then run `scenarios` in order. Never returns early once scenarios
    /// have started; every scenario runs to completion including its cleanup.
    pub async fn run(&self, scenarios: &[Scenario]) -> RunReport {
        let started_at = Utc::now();
        let readiness = match self.ensure_services_ready().await {
            Ok(readiness) => readiness,
            Err(err) => {
                error!("{err}; aborting before any scenario runs");
                let aborted = Some(err.to_string());
                let HarnessError::ServicesNotReady { probes, .. } = err;
                return RunReport {
                    started_at,
                    readiness: probes,
                    aborted,
                    scenarios: Vec::new(),
                };
            }
        };

        let runner = ScenarioRunner::new(self.client.clone(), self.config.timeouts.scenario());
        let scenarios = runner.run_all(scenarios).await;
        RunReport {
            started_at,
            readiness,
            aborted: None,
            scenarios,
        }
    }
}
