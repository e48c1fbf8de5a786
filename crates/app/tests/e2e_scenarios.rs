use std::time::Duration;

use shop_stub::{StubFaults, StubServices};
use shopflow_e2e::{Harness, HarnessConfig, Scenario, Service};

fn config_for(stub: &StubServices) -> HarnessConfig {
    let mut config = HarnessConfig::default().with_endpoints(stub.product_url(), stub.order_url());
    config.readiness.max_attempts = 3;
    config.readiness.interval_ms = 10;
    config.timeouts.request_ms = 2_000;
    config.timeouts.scenario_ms = 5_000;
    config
}

#[tokio::test]
async fn full_run_passes_and_leaves_no_products_behind() -> anyhow::Result<()> {
    let stub = StubServices::spawn(StubFaults::default()).await?;
    let harness = Harness::new(config_for(&stub))?;

    let report = harness.run(&Scenario::all()).await;
    assert!(report.passed(), "{}", report.render_summary());
    assert_eq!(report.scenarios.len(), 4);

    let lifecycle = report.scenario("product-lifecycle").expect("lifecycle report");
    assert_eq!(lifecycle.cleanup.len(), 1);
    assert_eq!(lifecycle.cleanup[0].status, Some(204));

    let order = report.scenario("order-deducts-stock").expect("order report");
    assert_eq!(order.cleanup.len(), 1);
    assert!(order.cleanup[0].succeeded());

    assert_eq!(stub.state().product_count(), 0);
    assert_eq!(stub.state().order_count(), 1);
    let deletes = stub.state().all_delete_attempts();
    assert_eq!(deletes.len(), 2);
    assert!(deletes.values().all(|count| *count == 1));

    stub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn health_scenarios_skip_setup_and_cleanup() -> anyhow::Result<()> {
    let stub = StubServices::spawn(StubFaults::default()).await?;
    let harness = Harness::new(config_for(&stub))?;

    let report = harness
        .run(&[
            Scenario::Health(Service::Product),
            Scenario::Health(Service::Order),
        ])
        .await;
    assert!(report.passed());
    assert!(report.scenarios.iter().all(|s| s.cleanup.is_empty()));
    assert_eq!(stub.state().product_count(), 0);

    stub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn missing_stock_deduction_fails_only_the_workflow() -> anyhow::Result<()> {
    let stub = StubServices::spawn(StubFaults {
        skip_stock_deduction: true,
        ..StubFaults::default()
    })
    .await?;
    let harness = Harness::new(config_for(&stub))?;

    let report = harness.run(&Scenario::all()).await;
    assert!(!report.passed());
    assert_eq!(report.failed_count(), 1);

    let order = report.scenario("order-deducts-stock").expect("order report");
    let failure = order.failure.as_ref().expect("order scenario should fail");
    assert_eq!(failure.stage, "assertion");
    assert!(
        failure.message.contains("stock_quantity after order is 5, expected 3"),
        "unexpected message: {}",
        failure.message
    );
    // Cleanup still ran, once.
    assert_eq!(order.cleanup.len(), 1);
    assert!(order.cleanup[0].succeeded());
    assert_eq!(stub.state().delete_attempts(&order.cleanup[0].product_id), 1);
    assert_eq!(stub.state().product_count(), 0);

    stub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn cleanup_failure_does_not_fail_a_passing_scenario() -> anyhow::Result<()> {
    let stub = StubServices::spawn(StubFaults {
        fail_deletes: true,
        ..StubFaults::default()
    })
    .await?;
    let harness = Harness::new(config_for(&stub))?;

    let report = harness.run(&[Scenario::OrderDeductsStock]).await;
    assert!(report.passed(), "{}", report.render_summary());

    let order = &report.scenarios[0];
    assert_eq!(order.cleanup.len(), 1);
    assert_eq!(order.cleanup[0].status, Some(500));
    assert_eq!(order.cleanup_warnings().count(), 1);
    assert_eq!(stub.state().delete_attempts(&order.cleanup[0].product_id), 1);
    assert!(report.render_summary().contains("warning: cleanup of product"));

    stub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn failed_lifecycle_delete_is_a_warning_not_a_failure() -> anyhow::Result<()> {
    let stub = StubServices::spawn(StubFaults {
        fail_deletes: true,
        ..StubFaults::default()
    })
    .await?;
    let harness = Harness::new(config_for(&stub))?;

    let report = harness.run(&[Scenario::ProductLifecycle]).await;
    assert!(report.passed(), "{}", report.render_summary());
    let lifecycle = &report.scenarios[0];
    assert!(lifecycle.failure.is_none());

    // The scenario's own delete was the single attempt; the scope did not retry.
    assert_eq!(lifecycle.cleanup.len(), 1);
    assert_eq!(lifecycle.cleanup[0].status, Some(500));
    assert_eq!(lifecycle.cleanup_warnings().count(), 1);
    assert_eq!(stub.state().delete_attempts(&lifecycle.cleanup[0].product_id), 1);

    let summary = report.render_summary();
    assert!(summary.contains("PASS product-lifecycle"));
    assert!(summary.contains("delete returned 500 Internal Server Error, expected 204 No Content"));

    stub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn request_timeout_fails_the_step_and_still_cleans_up() -> anyhow::Result<()> {
    let stub = StubServices::spawn(StubFaults {
        slow_reads: Duration::from_millis(800),
        ..StubFaults::default()
    })
    .await?;
    let mut config = config_for(&stub);
    config.timeouts.request_ms = 150;
    let harness = Harness::new(config)?;

    let report = harness.run(&[Scenario::ProductLifecycle]).await;
    assert!(!report.passed());
    let lifecycle = &report.scenarios[0];
    let failure = lifecycle.failure.as_ref().expect("lifecycle should fail");
    assert_eq!(failure.stage, "assertion");
    assert!(failure.message.contains("(timeout)"), "{}", failure.message);

    assert_eq!(lifecycle.cleanup.len(), 1);
    assert!(lifecycle.cleanup[0].succeeded());
    assert_eq!(stub.state().delete_attempts(&lifecycle.cleanup[0].product_id), 1);
    assert_eq!(stub.state().product_count(), 0);

    stub.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn setup_failure_skips_cleanup() -> anyhow::Result<()> {
    let stub = StubServices::spawn(StubFaults {
        reject_creates: true,
        ..StubFaults::default()
    })
    .await?;
    let harness = Harness::new(config_for(&stub))?;

    let report = harness.run(&Scenario::all()).await;
    assert_eq!(report.failed_count(), 2);
    for name in ["product-lifecycle", "order-deducts-stock"] {
        let scenario = report.scenario(name).expect("scenario report");
        let failure = scenario.failure.as_ref().expect("setup should fail");
        assert_eq!(failure.stage, "setup");
        assert!(failure.message.contains("500"), "{}", failure.message);
        assert!(scenario.cleanup.is_empty());
    }
    assert!(report.scenario("product-service-health").unwrap().passed);
    assert!(stub.state().all_delete_attempts().is_empty());

    stub.shutdown().await;
    Ok(())
}
