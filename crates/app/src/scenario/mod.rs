use std::{fmt, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span};

use crate::client::ServiceClient;
use crate::config::Service;
use crate::model::{NewOrder, NewProduct, OrderItem};
use crate::report::{FailureSummary, ScenarioReport};

pub mod lease;
pub use lease::{CleanupRecord, ProductLease, guarded, with_product};

const ORDER_QUANTITY: i64 = 2;

#[derive(Debug, Error)]
pub enum ScenarioFailure {
    #[error("setup failed: {0:#}")]
    Setup(anyhow::Error),
    #[error("assertion failed: {0:#}")]
    Assertion(anyhow::Error),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("panicked: {0}")]
    Panicked(String),
}

impl ScenarioFailure {
    pub fn stage(&self) -> &'static str {
        match self {
            ScenarioFailure::Setup(_) => "setup",
            ScenarioFailure::Assertion(_) => "assertion",
            ScenarioFailure::TimedOut(_) => "timeout",
            ScenarioFailure::Panicked(_) => "panic",
        }
    }
}

/// Result of one scenario body plus whatever cleanup it triggered.
#[derive(Debug)]
pub struct Execution {
    pub outcome: Result<(), ScenarioFailure>,
    pub cleanup: Vec<CleanupRecord>,
}

impl Execution {
    pub fn failed(failure: ScenarioFailure) -> Self {
        Self {
            outcome: Err(failure),
            cleanup: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    Health(Service),
    ProductLifecycle,
    OrderDeductsStock,
}

impl Scenario {
    /// Every scenario, in the order a full run executes them.
    pub fn all() -> Vec<Scenario> {
        vec![
            Scenario::Health(Service::Product),
            Scenario::Health(Service::Order),
            Scenario::ProductLifecycle,
            Scenario::OrderDeductsStock,
        ]
    }

    pub fn name(&self) -> String {
        match self {
            Scenario::Health(service) => format!("{service}-health"),
            Scenario::ProductLifecycle => "product-lifecycle".into(),
            Scenario::OrderDeductsStock => "order-deducts-stock".into(),
        }
    }

    pub fn from_name(name: &str) -> Option<Scenario> {
        Scenario::all().into_iter().find(|s| s.name() == name)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

pub fn lifecycle_product() -> NewProduct {
    NewProduct::new("Test Product", 9.99, 10)
}

pub fn order_product() -> NewProduct {
    NewProduct::new("Order Test Product", 19.99, 5)
}

/// Runs scenarios strictly one after another; a failure never stops the rest.
pub struct ScenarioRunner {
    client: ServiceClient,
    budget: Duration,
}

impl ScenarioRunner {
    pub fn new(client: ServiceClient, budget: Duration) -> Self {
        Self { client, budget }
    }

    pub async fn run_all(&self, scenarios: &[Scenario]) -> Vec<ScenarioReport> {
        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            reports.push(self.run(*scenario).await);
        }
        reports
    }

    pub async fn run(&self, scenario: Scenario) -> ScenarioReport {
        let span = info_span!("scenario", scenario = %scenario);
        let started = Instant::now();
        let execution = self.execute(scenario).instrument(span).await;
        let duration_ms = started.elapsed().as_millis();

        match &execution.outcome {
            Ok(()) => info!(scenario = %scenario, duration_ms, "scenario passed"),
            Err(failure) => error!(
                scenario = %scenario,
                stage = failure.stage(),
                "scenario failed: {failure}"
            ),
        }

        ScenarioReport {
            scenario: scenario.name(),
            passed: execution.outcome.is_ok(),
            failure: execution.outcome.as_ref().err().map(FailureSummary::from),
            cleanup: execution.cleanup,
            duration_ms,
        }
    }

    async fn execute(&self, scenario: Scenario) -> Execution {
        let client = &self.client;
        match scenario {
            Scenario::Health(service) => Execution {
                outcome: guarded(self.budget, Box::pin(check_health(client, service))).await,
                cleanup: Vec::new(),
            },
            Scenario::ProductLifecycle => {
                with_product(client, &lifecycle_product(), self.budget, |lease| {
                    Box::pin(product_lifecycle(lease))
                })
                .await
            }
            Scenario::OrderDeductsStock => {
                with_product(client, &order_product(), self.budget, |lease| {
                    Box::pin(order_deducts_stock(lease))
                })
                .await
            }
        }
    }
}

async fn check_health(client: &ServiceClient, service: Service) -> Result<()> {
    let report = client
        .health(service)
        .await
        .with_context(|| format!("{service} health check failed"))?;
    ensure!(
        report.service == service.name(),
        "health body names service {:?}, expected {:?}",
        report.service,
        service.name()
    );
    Ok(())
}

async fn product_lifecycle(lease: &ProductLease<'_>) -> Result<()> {
    let fetched = lease
        .client()
        .get_product(lease.id())
        .await
        .context("failed to fetch created product")?;
    ensure!(
        fetched.name == lease.attributes().name,
        "fetched name {:?}, expected {:?}",
        fetched.name,
        lease.attributes().name
    );

    // The delete is this scenario's release of its own product. Its result is reported as
    // cleanup and never changes the outcome.
    match lease.release().await {
        Ok(status) => debug!(product_id = %lease.id(), %status, "lifecycle delete answered"),
        Err(err) => debug!(product_id = %lease.id(), "lifecycle delete failed: {err:#}"),
    }
    Ok(())
}

async fn order_deducts_stock(lease: &ProductLease<'_>) -> Result<()> {
    let order = NewOrder {
        user_id: 1,
        shipping_address: "123 Test St".into(),
        items: vec![OrderItem {
            product_id: lease.id().clone(),
            quantity: ORDER_QUANTITY,
            price_at_purchase: lease.attributes().price,
        }],
    };
    let receipt = lease
        .client()
        .create_order(&order)
        .await
        .context("failed to submit order")?;
    ensure!(
        receipt.status == "confirmed",
        "order status {:?}, expected \"confirmed\"",
        receipt.status
    );
    info!(order_id = ?receipt.order_id, product_id = %lease.id(), "order confirmed");

    // The order response must already reflect the deduction; no polling.
    let after = lease
        .client()
        .get_product(lease.id())
        .await
        .context("failed to re-fetch product after order")?;
    let expected = lease.attributes().stock_quantity - ORDER_QUANTITY;
    ensure!(
        after.stock_quantity == expected,
        "stock_quantity after order is {}, expected {expected}",
        after.stock_quantity
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_lookup() {
        for scenario in Scenario::all() {
            assert_eq!(Scenario::from_name(&scenario.name()), Some(scenario));
        }
        assert_eq!(Scenario::Health(Service::Order).name(), "order-service-health");
        assert!(Scenario::from_name("checkout").is_none());
    }

    #[test]
    fn failure_stage_labels() {
        let setup = ScenarioFailure::Setup(anyhow::anyhow!("POST /products returned 500"));
        assert_eq!(setup.stage(), "setup");
        assert!(setup.to_string().contains("returned 500"));
        assert_eq!(
            ScenarioFailure::TimedOut(Duration::from_secs(20)).stage(),
            "timeout"
        );
    }

    #[test]
    fn fixed_products_match_contract() {
        let lifecycle = lifecycle_product();
        assert_eq!(lifecycle.name, "Test Product");
        assert_eq!(lifecycle.description, "Test");
        assert_eq!(lifecycle.stock_quantity, 10);
        let order = order_product();
        assert_eq!(order.stock_quantity - ORDER_QUANTITY, 3);
    }
}
