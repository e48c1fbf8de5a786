use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::config::{HarnessConfig, Service, ServiceEndpoint};
use crate::model::{
    CreatedProduct, HealthReport, NewOrder, NewProduct, OrderReceipt, ProductId, ProductView,
};

const SNIPPET_LIMIT: usize = 512;

/// Failure of a single contract call, carrying enough context to diagnose without re-running.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("{method} {url} failed ({kind}): {source}")]
    Transport {
        method: Method,
        url: String,
        kind: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {url} returned {status}, expected {expected}; body: {body}")]
    UnexpectedStatus {
        method: Method,
        url: String,
        status: StatusCode,
        expected: StatusCode,
        body: String,
    },
    #[error("{method} {url} returned an unreadable body ({reason}); body: {body}")]
    Decode {
        method: Method,
        url: String,
        reason: String,
        body: String,
    },
}

impl CallError {
    fn transport(method: Method, url: &str, source: reqwest::Error) -> Self {
        CallError::Transport {
            method,
            url: url.to_string(),
            kind: transport_kind(&source),
            source,
        }
    }
}

/// Short classification of a transport failure for reports.
pub fn transport_kind(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_body() || err.is_decode() {
        "body"
    } else if err.is_request() {
        "request"
    } else {
        "transport"
    }
}

/// Typed access to the product and order service contracts.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    product: ServiceEndpoint,
    order: ServiceEndpoint,
}

impl ServiceClient {
    pub fn new(config: &HarnessConfig) -> anyhow::Result<Self> {
        let http = build_http_client(config.timeouts.request())?;
        Ok(Self {
            http,
            product: config.endpoint(Service::Product)?,
            order: config.endpoint(Service::Order)?,
        })
    }

    pub fn endpoint(&self, service: Service) -> &ServiceEndpoint {
        match service {
            Service::Product => &self.product,
            Service::Order => &self.order,
        }
    }

    pub async fn health(&self, service: Service) -> Result<HealthReport, CallError> {
        let url = self.endpoint(service).health_url();
        self.send_expect(Method::GET, &url, self.http.get(&url), StatusCode::OK)
            .await
    }

    pub async fn create_product(&self, product: &NewProduct) -> Result<CreatedProduct, CallError> {
        let url = self.product.url("/products");
        self.send_expect(
            Method::POST,
            &url,
            self.http.post(&url).json(product),
            StatusCode::CREATED,
        )
        .await
    }

    pub async fn get_product(&self, id: &ProductId) -> Result<ProductView, CallError> {
        let url = self.product_url(id);
        self.send_expect(Method::GET, &url, self.http.get(&url), StatusCode::OK)
            .await
    }

    /// Issue the delete and hand back whatever status came back; callers judge it.
    pub async fn delete_product(&self, id: &ProductId) -> Result<StatusCode, CallError> {
        let url = self.product_url(id);
        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|err| CallError::transport(Method::DELETE, &url, err))?;
        let status = response.status();
        debug!(%url, %status, "delete issued");
        Ok(status)
    }

    pub async fn create_order(&self, order: &NewOrder) -> Result<OrderReceipt, CallError> {
        let url = self.order.url("/orders");
        self.send_expect(
            Method::POST,
            &url,
            self.http.post(&url).json(order),
            StatusCode::CREATED,
        )
        .await
    }

    /// `/products/{id}` with the id encoded as a single path segment.
    fn product_url(&self, id: &ProductId) -> String {
        self.product.resource_url(&["products", &id.to_string()])
    }

    async fn send_expect<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        request: RequestBuilder,
        expected: StatusCode,
    ) -> Result<T, CallError> {
        let response = request
            .send()
            .await
            .map_err(|err| CallError::transport(method.clone(), url, err))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| CallError::transport(method.clone(), url, err))?;
        debug!(%method, %url, %status, "response received");

        if status != expected {
            return Err(CallError::UnexpectedStatus {
                method,
                url: url.to_string(),
                status,
                expected,
                body: snippet(&body),
            });
        }

        serde_json::from_str(&body).map_err(|err| CallError::Decode {
            method,
            url: url.to_string(),
            reason: err.to_string(),
            body: snippet(&body),
        })
    }
}

pub fn build_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("shopflow-e2e/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Truncate a response body for error messages without splitting a UTF-8 character.
pub fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= SNIPPET_LIMIT {
        return trimmed.to_string();
    }
    let mut end = SNIPPET_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_keeps_short_bodies() {
        assert_eq!(snippet("  {\"detail\":\"nope\"}\n"), "{\"detail\":\"nope\"}");
    }

    #[test]
    fn snippet_truncates_on_char_boundary() {
        let body = "é".repeat(400);
        let cut = snippet(&body);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= SNIPPET_LIMIT + 3);
        assert!(cut.trim_end_matches("...").chars().all(|c| c == 'é'));
    }

    #[test]
    fn unexpected_status_message_names_everything() {
        let err = CallError::UnexpectedStatus {
            method: Method::POST,
            url: "http://localhost:8001/orders".into(),
            status: StatusCode::CONFLICT,
            expected: StatusCode::CREATED,
            body: "{\"detail\":\"insufficient stock\"}".into(),
        };
        let message = err.to_string();
        assert!(message.contains("POST http://localhost:8001/orders"));
        assert!(message.contains("409"));
        assert!(message.contains("insufficient stock"));
    }
}
