use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use url::Url;

use crate::connectors::{
    build_http_client, check_status, decode_json, AccountInfo, AuthPayload, PlatformConnector,
    ProductPage, RemoteProduct,
};
use crate::models::{Credential, Platform};
use crate::utils::error::{AppError, AuthFailureKind, Result};

/// Key/secret connector for self-hosted WooCommerce sites. Authentication is
/// a local format check of the consumer key pair; credentials stay valid
/// until revoked on the site, so refresh is a no-op.
pub struct WooCommerceConnector {
    http: reqwest::Client,
    default_currency: String,
}

#[derive(Debug, Deserialize)]
struct SiteIndex {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WooProduct {
    id: u64,
    name: String,
    price: String,
    permalink: Option<String>,
    images: Option<Vec<WooImage>>,
}

#[derive(Debug, Deserialize)]
struct WooImage {
    src: String,
}

impl WooCommerceConnector {
    pub fn new(user_agent: &str, timeout_secs: u64, default_currency: &str) -> Result<Self> {
        Ok(Self {
            http: build_http_client(user_agent, timeout_secs)?,
            default_currency: default_currency.to_string(),
        })
    }

    fn basic_header(credential: &Credential) -> String {
        format!("Basic {}", STANDARD.encode(&credential.access_token))
    }

    fn api_base<'a>(credential: &'a Credential) -> Result<&'a str> {
        credential
            .api_base
            .as_deref()
            .ok_or_else(|| AppError::Validation("credential is missing the site URL".to_string()))
    }

    fn product_to_remote(&self, product: WooProduct) -> Option<RemoteProduct> {
        // Draft products and variable parents come through with an empty
        // price string; they are not observable and get skipped.
        let price = Decimal::from_str(&product.price).ok()?;
        let image_url = product
            .images
            .and_then(|images| images.into_iter().next().map(|i| i.src));

        Some(RemoteProduct {
            external_id: product.id.to_string(),
            title: product.name,
            price,
            currency: self.default_currency.clone(),
            url: product.permalink,
            image_url,
        })
    }
}

fn validate_key_pair(site_url: &str, consumer_key: &str, consumer_secret: &str) -> Result<String> {
    let parsed = Url::parse(site_url)
        .map_err(|_| AppError::Auth(AuthFailureKind::InvalidCredentials))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(AppError::Auth(AuthFailureKind::InvalidCredentials));
    }
    if !consumer_key.starts_with("ck_") || consumer_key.len() < 10 {
        return Err(AppError::Auth(AuthFailureKind::InvalidCredentials));
    }
    if !consumer_secret.starts_with("cs_") || consumer_secret.len() < 10 {
        return Err(AppError::Auth(AuthFailureKind::InvalidCredentials));
    }
    Ok(site_url.trim_end_matches('/').to_string())
}

#[async_trait]
impl PlatformConnector for WooCommerceConnector {
    fn platform(&self) -> Platform {
        Platform::WooCommerce
    }

    /// Local validation only; no network round trip is needed to "log in".
    async fn authenticate(&self, payload: &AuthPayload) -> Result<Credential> {
        let (site_url, consumer_key, consumer_secret) = match payload {
            AuthPayload::ApiKey { site_url, consumer_key, consumer_secret } => {
                (site_url, consumer_key, consumer_secret)
            }
            AuthPayload::OAuthCode { .. } => {
                return Err(AppError::Validation(
                    "woocommerce requires a consumer key/secret pair".to_string(),
                ));
            }
        };

        let site = validate_key_pair(site_url, consumer_key, consumer_secret)?;

        Ok(Credential {
            access_token: format!("{}:{}", consumer_key, consumer_secret),
            refresh_token: None,
            expires_at: None,
            api_base: Some(site),
            account_id: None,
        })
    }

    async fn fetch_account(&self, credential: &Credential) -> Result<AccountInfo> {
        let base = Self::api_base(credential)?;
        let response = self
            .http
            .get(format!("{}/wp-json/", base))
            .header(reqwest::header::AUTHORIZATION, Self::basic_header(credential))
            .send()
            .await?;
        let response = check_status(response).await?;
        let body = response.text().await?;
        let site: SiteIndex = decode_json(&body)?;

        let host = Url::parse(base)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| base.to_string());

        Ok(AccountInfo { external_id: host, display_name: site.name })
    }

    async fn fetch_products(
        &self,
        credential: &Credential,
        page: u32,
        page_size: u32,
    ) -> Result<ProductPage> {
        let base = Self::api_base(credential)?;
        // The platform pages from 1; the zero-based index is mapped here
        let response = self
            .http
            .get(format!("{}/wp-json/wc/v3/products", base))
            .query(&[("page", page + 1), ("per_page", page_size)])
            .header(reqwest::header::AUTHORIZATION, Self::basic_header(credential))
            .send()
            .await?;
        let response = check_status(response).await?;

        let total_pages: Option<u32> = response
            .headers()
            .get("x-wp-totalpages")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let total: Option<u64> = response
            .headers()
            .get("x-wp-total")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let body = response.text().await?;
        let products: Vec<WooProduct> = decode_json(&body)?;

        let fetched = products.len();
        let items: Vec<RemoteProduct> = products
            .into_iter()
            .filter_map(|p| self.product_to_remote(p))
            .collect();

        let has_more = match total_pages {
            Some(pages) => page + 1 < pages,
            None => fetched as u32 == page_size,
        };

        Ok(ProductPage { items, page, page_size, total, has_more })
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        Ok(credential.clone())
    }
}
