use std::{panic::AssertUnwindSafe, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use futures::{FutureExt, future::LocalBoxFuture};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{info, warn};

use super::{Execution, ScenarioFailure};
use crate::client::ServiceClient;
use crate::model::{NewProduct, ProductId};

/// What happened to a leased product when it was given back.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupRecord {
    pub product_id: String,
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CleanupRecord {
    /// Only a `204 No Content` counts as a clean delete.
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.status == Some(StatusCode::NO_CONTENT.as_u16())
    }
}

enum ReleaseState {
    Held,
    Releasing,
    Released(CleanupRecord),
}

/// A product created for one scenario. Only obtainable through [`with_product`], which
/// issues exactly one delete for it before returning.
pub struct ProductLease<'c> {
    client: &'c ServiceClient,
    id: ProductId,
    attributes: NewProduct,
    state: Mutex<ReleaseState>,
}

impl<'c> ProductLease<'c> {
    pub fn id(&self) -> &ProductId {
        &self.id
    }

    pub fn client(&self) -> &'c ServiceClient {
        self.client
    }

    /// Attributes the product was created with.
    pub fn attributes(&self) -> &NewProduct {
        &self.attributes
    }

    /// Delete the product now and return the status the service answered with.
    ///
    /// The lease is marked released before the request goes out, so an interrupted release is
    /// never retried by the scope. Whatever the service answers ends up in the cleanup record;
    /// a non-204 status is logged as a warning but is not an error here.
    pub async fn release(&self) -> Result<StatusCode> {
        {
            let mut state = self.state.lock();
            if !matches!(*state, ReleaseState::Held) {
                bail!("product {} was already released", self.id);
            }
            *state = ReleaseState::Releasing;
        }

        let result = self.client.delete_product(&self.id).await;
        let record = cleanup_record(&self.id, &result);
        log_cleanup(&record);
        *self.state.lock() = ReleaseState::Released(record);
        result.with_context(|| format!("failed to delete product {}", self.id))
    }

    async fn finish(self) -> CleanupRecord {
        let state = std::mem::replace(&mut *self.state.lock(), ReleaseState::Releasing);
        match state {
            ReleaseState::Released(record) => record,
            ReleaseState::Releasing => {
                warn!(product_id = %self.id, "release was interrupted; not retrying delete");
                CleanupRecord {
                    product_id: self.id.to_string(),
                    status: None,
                    error: Some("release interrupted before a response arrived".into()),
                }
            }
            ReleaseState::Held => {
                let result = self.client.delete_product(&self.id).await;
                let record = cleanup_record(&self.id, &result);
                log_cleanup(&record);
                record
            }
        }
    }
}

fn cleanup_record<E: std::fmt::Display>(
    id: &ProductId,
    result: &std::result::Result<StatusCode, E>,
) -> CleanupRecord {
    match result {
        Ok(status) => CleanupRecord {
            product_id: id.to_string(),
            status: Some(status.as_u16()),
            error: (*status != StatusCode::NO_CONTENT).then(|| {
                format!("delete returned {status}, expected {}", StatusCode::NO_CONTENT)
            }),
        },
        Err(err) => CleanupRecord {
            product_id: id.to_string(),
            status: None,
            error: Some(err.to_string()),
        },
    }
}

fn log_cleanup(record: &CleanupRecord) {
    if record.succeeded() {
        info!(product_id = %record.product_id, status = ?record.status, "cleaned up product");
    } else {
        warn!(
            product_id = %record.product_id,
            status = ?record.status,
            error = ?record.error,
            "cleanup failed for product"
        );
    }
}

/// Create `product`, run `body` against it, then give it back.
///
/// A failed create is a setup failure and nothing is deleted. Otherwise the body runs under
/// `budget` and the product gets exactly one delete attempt afterwards, whether the body
/// passed, returned an error, timed out, or panicked. Cleanup never changes the outcome.
pub async fn with_product<'c, F>(
    client: &'c ServiceClient,
    product: &NewProduct,
    budget: Duration,
    body: F,
) -> Execution
where
    F: for<'a> FnOnce(&'a ProductLease<'c>) -> LocalBoxFuture<'a, Result<()>>,
{
    let id = match create(client, product).await {
        Ok(id) => id,
        Err(err) => return Execution::failed(ScenarioFailure::Setup(err)),
    };
    info!(product_id = %id, name = %product.name, "created test product");

    let lease = ProductLease {
        client,
        id,
        attributes: product.clone(),
        state: Mutex::new(ReleaseState::Held),
    };
    let outcome = guarded(budget, body(&lease)).await;
    let cleanup = lease.finish().await;

    Execution {
        outcome,
        cleanup: vec![cleanup],
    }
}

async fn create(client: &ServiceClient, product: &NewProduct) -> Result<ProductId> {
    let created = client
        .create_product(product)
        .await
        .context("failed to create test product")?;
    let raw = created
        .product_id
        .ok_or_else(|| anyhow!("create response is missing product_id"))?;
    ProductId::from_value(raw.clone())
        .ok_or_else(|| anyhow!("create response has unusable product_id {raw}"))
}

/// Run a scenario body under `budget`, turning errors, timeouts and panics into failures.
pub async fn guarded(
    budget: Duration,
    body: LocalBoxFuture<'_, Result<()>>,
) -> Result<(), ScenarioFailure> {
    match AssertUnwindSafe(timeout(budget, body)).catch_unwind().await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(err))) => Err(ScenarioFailure::Assertion(err)),
        Ok(Err(_elapsed)) => Err(ScenarioFailure::TimedOut(budget)),
        Err(payload) => Err(ScenarioFailure::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".into()
    }
}
