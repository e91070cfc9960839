//! HTTP client for the 1C catalog API.
//!
//! One [`OneCClient`] serves one integration. It keeps a pooled
//! `reqwest::Client` that is opened on first use (or explicitly with
//! [`OneCClient::connect`]) and dropped by [`OneCClient::disconnect`].

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::RwLock;
use std::time::Duration;

use crate::credentials::Credential;
use crate::errors::{OneCError, Result, RetryClass};
use crate::models::{
    HealthResponse, NomenclaturePage, NomenclatureQuery, OrderResult, StockPage, StockQuery,
};
use crate::traits::OneCApi;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of attempts per logical request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const CLIENT_USER_AGENT: &str = concat!("TradeOS/", env!("CARGO_PKG_VERSION"));

/// Retry behaviour for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Base of the exponential backoff: attempt `n` (from 0) waits
    /// `base * 2^n` before the next attempt.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the failed attempt `attempt` (counted from 0).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

/// Connection settings for one 1C endpoint.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub credential: Credential,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, credential: Credential) -> Self {
        Self {
            base_url: base_url.into(),
            credential,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Resilient client for one 1C endpoint.
///
/// # Example
///
/// ```ignore
/// let client = OneCClient::new(ClientConfig::new(
///     "https://erp.example.com/hs/api",
///     Credential::ApiKey { api_key: "key".into() },
/// ))?;
/// let page = client.fetch_nomenclature(NomenclatureQuery { limit: 100, ..Default::default() }).await?;
/// client.disconnect();
/// ```
#[derive(Debug)]
pub struct OneCClient {
    base_url: String,
    headers: HeaderMap,
    timeout: Duration,
    retry: RetryPolicy,
    http: RwLock<Option<reqwest::Client>>,
}

impl OneCClient {
    /// Creates a client. No connection is opened until the first request
    /// or an explicit [`connect`](Self::connect).
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(OneCError::InvalidRequest("Base URL is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        config.credential.apply(&mut headers)?;

        Ok(Self {
            base_url,
            headers,
            timeout: config.timeout,
            retry: RetryPolicy {
                max_attempts: config.retry.max_attempts.max(1),
                ..config.retry
            },
            http: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Opens the connection pool if it is not open yet.
    pub fn connect(&self) -> Result<reqwest::Client> {
        if let Some(client) = self.http.read().ok().and_then(|guard| guard.clone()) {
            return Ok(client);
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(5)
            .default_headers(self.headers.clone())
            .build()
            .map_err(|e| OneCError::InvalidRequest(format!("Failed to initialize HTTP client: {}", e)))?;

        if let Ok(mut guard) = self.http.write() {
            // Another caller may have connected in the meantime.
            let client = guard.get_or_insert(client).clone();
            debug!("[OneC] Connected to {}", self.base_url);
            return Ok(client);
        }
        Ok(client)
    }

    /// Drops the connection pool.
    pub fn disconnect(&self) {
        if let Ok(mut guard) = self.http.write() {
            if guard.take().is_some() {
                debug!("[OneC] Disconnected from {}", self.base_url);
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.http.read().map(|guard| guard.is_some()).unwrap_or(false)
    }

    /// Issues one logical request, retrying transient failures.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<T> {
        let http = self.connect()?;
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;

        loop {
            debug!("[OneC] {} {} (attempt {})", method, url, attempt + 1);
            let outcome = self.attempt(&http, method.clone(), &url, query, body).await;

            let error = match outcome {
                Ok(text) => return decode(&text),
                Err(e) => e,
            };

            if error.retry_class() == RetryClass::Never {
                return Err(error);
            }

            if attempt + 1 >= self.retry.max_attempts {
                warn!(
                    "[OneC] {} {} failed after {} attempt(s): {}",
                    method,
                    url,
                    attempt + 1,
                    error
                );
                let message = match error {
                    OneCError::Transient { message } => message,
                    other => other.to_string(),
                };
                return Err(OneCError::ConnectionFailed {
                    attempts: attempt + 1,
                    message,
                });
            }

            let delay = self.retry.backoff(attempt);
            warn!(
                "[OneC] {} {} attempt {} failed ({}), retrying in {:?}",
                method,
                url,
                attempt + 1,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// One HTTP round trip. Returns the body text of a 2xx answer.
    async fn attempt(
        &self,
        http: &reqwest::Client,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<String> {
        let mut request = http.request(method, url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(OneCError::from_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(OneCError::from_transport)?;

        if !status.is_success() {
            return Err(OneCError::from_status(status.as_u16(), &text));
        }
        Ok(text)
    }
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T> {
    let text = if text.trim().is_empty() { "{}" } else { text };
    serde_json::from_str(text).map_err(|e| {
        OneCError::InvalidResponse(format!(
            "{} - {}",
            e,
            text.chars().take(200).collect::<String>()
        ))
    })
}

#[async_trait]
impl OneCApi for OneCClient {
    async fn fetch_nomenclature(&self, query: NomenclatureQuery) -> Result<NomenclaturePage> {
        let mut params = vec![
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
        ];
        if let Some(since) = query.updated_since {
            params.push(("updated_since", since.to_rfc3339()));
        }
        let page: NomenclaturePage = self
            .request(Method::GET, "/nomenclature", &params, None)
            .await?;
        debug!(
            "[OneC] Fetched {} products (offset {}, has_more {})",
            page.items.len(),
            query.offset,
            page.has_more
        );
        Ok(page)
    }

    async fn fetch_stock(&self, query: StockQuery) -> Result<StockPage> {
        let mut params = Vec::new();
        if !query.product_ids.is_empty() {
            params.push(("product_ids", query.product_ids.join(",")));
        }
        if !query.warehouse_ids.is_empty() {
            params.push(("warehouse_ids", query.warehouse_ids.join(",")));
        }
        let page: StockPage = self.request(Method::GET, "/stock", &params, None).await?;
        debug!("[OneC] Fetched {} stock rows", page.items.len());
        Ok(page)
    }

    async fn health_check(&self) -> bool {
        match self
            .request::<HealthResponse>(Method::GET, "/health", &[], None)
            .await
        {
            Ok(health) => health
                .status
                .map(|s| s.eq_ignore_ascii_case("ok") || s.eq_ignore_ascii_case("healthy"))
                .unwrap_or(true),
            Err(e) => {
                warn!("[OneC] Health check for {} failed: {}", self.base_url, e);
                false
            }
        }
    }

    async fn create_order(&self, order: Value) -> Result<OrderResult> {
        self.request(Method::POST, "/orders", &[], Some(&order)).await
    }

    async fn order_status(&self, order_id: &str) -> Result<Value> {
        let path = format!("/orders/{}/status", order_id);
        self.request(Method::GET, &path, &[], None).await
    }

    async fn close(&self) {
        self.disconnect();
    }
}
