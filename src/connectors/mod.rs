use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::models::{Credential, Platform};
use crate::utils::error::{AppError, AuthFailureKind, ParseFailureKind, Result};

pub mod etsy;
pub mod woocommerce;

pub use etsy::EtsyConnector;
pub use woocommerce::WooCommerceConnector;

/// Raw authorization material handed over by the callback boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthPayload {
    /// One-time authorization code from an OAuth redirect.
    OAuthCode { code: String },
    /// Static key/secret pair for self-hosted platforms.
    ApiKey {
        site_url: String,
        consumer_key: String,
        consumer_secret: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountInfo {
    pub external_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteProduct {
    pub external_id: String,
    pub title: String,
    pub price: Decimal,
    pub currency: String,
    pub url: Option<String>,
    pub image_url: Option<String>,
}

/// One page of a platform catalog. Pagination is forwarded to the caller;
/// connectors never drain the whole catalog eagerly.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductPage {
    pub items: Vec<RemoteProduct>,
    pub page: u32,
    pub page_size: u32,
    pub total: Option<u64>,
    pub has_more: bool,
}

/// Polymorphic client over one e-commerce platform's authentication and
/// product-fetch API. Implementations are selected by platform tag through
/// the [`ConnectorRegistry`].
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    fn platform(&self) -> Platform;

    async fn authenticate(&self, payload: &AuthPayload) -> Result<Credential>;

    async fn fetch_account(&self, credential: &Credential) -> Result<AccountInfo>;

    /// Fetch one zero-based page of the catalog.
    async fn fetch_products(
        &self,
        credential: &Credential,
        page: u32,
        page_size: u32,
    ) -> Result<ProductPage>;

    /// Exchange the refresh credential for a fresh one. Key-based platforms
    /// have nothing to refresh and return the credential unchanged.
    async fn refresh(&self, credential: &Credential) -> Result<Credential>;
}

#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<Platform, Arc<dyn PlatformConnector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self { connectors: HashMap::new() }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(EtsyConnector::new(
            &config.platforms.etsy,
            &config.extractor.user_agent,
            config.extractor.request_timeout,
        )?));
        registry.register(Arc::new(WooCommerceConnector::new(
            &config.extractor.user_agent,
            config.extractor.request_timeout,
            &config.extractor.default_currency,
        )?));
        Ok(registry)
    }

    pub fn register(&mut self, connector: Arc<dyn PlatformConnector>) {
        self.connectors.insert(connector.platform(), connector);
    }

    pub fn get(&self, platform: Platform) -> Result<Arc<dyn PlatformConnector>> {
        self.connectors
            .get(&platform)
            .cloned()
            .ok_or_else(|| AppError::Validation(format!("no connector registered for {}", platform)))
    }
}

/// Map a non-success response to the failure taxonomy: 429 with its
/// Retry-After, 401/403 as auth rejection, everything else as a fetch
/// failure carrying the upstream body.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        429 => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            Err(AppError::RateLimited { retry_after })
        }
        401 | 403 => Err(AppError::Auth(AuthFailureKind::InvalidCredentials)),
        code => {
            let body = response.text().await.ok();
            Err(AppError::Fetch { status: code, body })
        }
    }
}

/// Decode a response body, surfacing malformed payloads as a distinct parse
/// failure instead of a generic error.
pub(crate) fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        tracing::debug!(error = %e, "response body failed to decode");
        AppError::Parse(ParseFailureKind::MalformedResponse)
    })
}

pub(crate) fn build_http_client(user_agent: &str, timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent.to_string())
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))
}
