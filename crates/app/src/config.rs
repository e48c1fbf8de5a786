use std::{fmt, time::Duration};

use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use once_cell::sync::Lazy;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

static APP_NAME: &str = "shopflow-e2e";
static DEFAULT_CONFIG: Lazy<HarnessConfig> = Lazy::new(HarnessConfig::default);

/// The two services the harness talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Service {
    Product,
    Order,
}

impl Service {
    pub const ALL: [Service; 2] = [Service::Product, Service::Order];

    /// Logical name, also the value the service reports in its `/health` body.
    pub fn name(self) -> &'static str {
        match self {
            Service::Product => "product-service",
            Service::Order => "order-service",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A resolved base URL for one service. Immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub service: Service,
    base_url: String,
    base: Url,
}

impl ServiceEndpoint {
    pub fn new(service: Service, base_url: &str) -> Result<Self, ConfigError> {
        let parsed = Url::parse(base_url).map_err(|err| ConfigError::InvalidUrl {
            service,
            url: base_url.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                service,
                url: base_url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }
        Ok(Self {
            service,
            base_url: base_url.trim_end_matches('/').to_string(),
            base: parsed,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join a path (with leading `/`) onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn health_url(&self) -> String {
        self.url("/health")
    }

    /// Append path segments to the base URL, percent-encoding each one so `/`, `?` and `#`
    /// inside a segment stay part of it.
    pub fn resource_url(&self, segments: &[&str]) -> String {
        let mut url = self.base.clone();
        // http(s) URLs always have a path that can be extended.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.to_string()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base URL for {service} ({url}): {reason}")]
    InvalidUrl {
        service: Service,
        url: String,
        reason: String,
    },
    #[error("config file not found at {0}")]
    MissingFile(Utf8PathBuf),
    #[error("readiness.max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("failed to load shopflow-e2e configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

impl HarnessConfig {
    pub fn endpoint(&self, service: Service) -> Result<ServiceEndpoint, ConfigError> {
        let base = match service {
            Service::Product => &self.endpoints.product_api,
            Service::Order => &self.endpoints.order_api,
        };
        ServiceEndpoint::new(service, base)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for service in Service::ALL {
            self.endpoint(service)?;
        }
        if self.readiness.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }

    /// Point both endpoints at explicit base URLs (used with the stub services).
    pub fn with_endpoints(mut self, product_api: &str, order_api: &str) -> Self {
        self.endpoints.product_api = product_api.to_string();
        self.endpoints.order_api = order_api.to_string();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_product_api")]
    pub product_api: String,
    #[serde(default = "default_order_api")]
    pub order_api: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            product_api: default_product_api(),
            order_api: default_order_api(),
        }
    }
}

fn default_product_api() -> String {
    "http://localhost:8000".into()
}

fn default_order_api() -> String {
    "http://localhost:8001".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

impl ReadinessConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_interval_ms() -> u64 {
    1_000
}

fn default_attempt_timeout_ms() -> u64 {
    2_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Applied to every scenario HTTP call.
    #[serde(default = "default_request_ms")]
    pub request_ms: u64,
    /// Overall budget for one scenario body; cleanup runs outside it.
    #[serde(default = "default_scenario_ms")]
    pub scenario_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_ms: default_request_ms(),
            scenario_ms: default_scenario_ms(),
        }
    }
}

impl TimeoutsConfig {
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn scenario(&self) -> Duration {
        Duration::from_millis(self.scenario_ms)
    }
}

fn default_request_ms() -> u64 {
    5_000
}

fn default_scenario_ms() -> u64 {
    20_000
}

/// Layered load: defaults < TOML file < `SHOPFLOW_*` env < `PRODUCT_API_IP`/`ORDER_API_IP`.
pub fn load_config(explicit_path: Option<&Utf8Path>) -> Result<HarnessConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(DEFAULT_CONFIG.clone()));

    if let Some(path) = explicit_path {
        if !path.exists() {
            return Err(ConfigError::MissingFile(path.to_path_buf()));
        }
        figment = figment.merge(Toml::file(path));
    } else if let Some(path) = resolve_default_config_path() {
        debug!(path = %path, "using config file");
        figment = figment.merge(Toml::file(path));
    } else {
        warn!("no config file found; relying on defaults + env overrides");
    }

    figment = figment
        .merge(Env::prefixed("SHOPFLOW_").split("__"))
        .merge(
            Env::raw()
                .only(&["PRODUCT_API_IP", "ORDER_API_IP"])
                .map(|key| {
                    if key.as_str().eq_ignore_ascii_case("PRODUCT_API_IP") {
                        "endpoints.product_api".into()
                    } else {
                        "endpoints.order_api".into()
                    }
                }),
        );

    let config: HarnessConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}

fn workspace_root() -> &'static Utf8Path {
    static ROOT: Lazy<Utf8PathBuf> = Lazy::new(|| {
        let manifest_dir = Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        manifest_dir
            .parent()
            .and_then(|p| p.parent())
            .map(Utf8PathBuf::from)
            .unwrap_or(manifest_dir)
    });
    ROOT.as_path()
}

fn resolve_default_config_path() -> Option<Utf8PathBuf> {
    let repo_relative = workspace_root().join("config/e2e.toml");
    if repo_relative.exists() {
        return Some(repo_relative);
    }

    if let Some(dirs) = ProjectDirs::from("dev", "Shopflow", APP_NAME)
        && let Ok(path) = Utf8PathBuf::from_path_buf(dirs.config_dir().join("config.toml"))
        && path.exists()
    {
        return Some(path);
    }

    None
}
