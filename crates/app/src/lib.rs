//! End-to-end harness for the product and order services.
//!
//! A run probes every service's `/health` endpoint, aborts if any never becomes ready, and
//! otherwise executes the scenarios one after another. Products a scenario creates are held
//! through a [`scenario::ProductLease`] and always get exactly one delete attempt.

pub mod client;
pub mod config;
pub mod harness;
pub mod model;
pub mod report;
pub mod scenario;

pub use config::{HarnessConfig, Service, load_config};
pub use harness::Harness;
pub use report::RunReport;
pub use scenario::Scenario;
