use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::config::EtsyConfig;
use crate::connectors::{
    build_http_client, check_status, decode_json, AccountInfo, AuthPayload, PlatformConnector,
    ProductPage, RemoteProduct,
};
use crate::models::{Credential, Platform};
use crate::utils::error::{AppError, AuthFailureKind, ParseFailureKind, Result};

const TOKEN_PATH: &str = "/v3/public/oauth/token";

/// OAuth (authorization-code grant) connector. Access tokens are short-lived
/// and exchanged via the refresh token before expiry.
pub struct EtsyConnector {
    http: reqwest::Client,
    api_base: String,
    client_id: String,
    redirect_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    #[allow(dead_code)]
    user_id: u64,
    shop_id: u64,
}

#[derive(Debug, Deserialize)]
struct ListingsResponse {
    count: u64,
    results: Vec<Listing>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    listing_id: u64,
    title: String,
    url: Option<String>,
    price: ListingPrice,
    images: Option<Vec<ListingImage>>,
}

#[derive(Debug, Deserialize)]
struct ListingPrice {
    amount: i64,
    divisor: i64,
    currency_code: String,
}

#[derive(Debug, Deserialize)]
struct ListingImage {
    url_fullxfull: Option<String>,
}

impl EtsyConnector {
    pub fn new(config: &EtsyConfig, user_agent: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            http: build_http_client(user_agent, timeout_secs)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<Credential> {
        let response = self
            .http
            .post(format!("{}{}", self.api_base, TOKEN_PATH))
            .form(params)
            .send()
            .await?;
        let response = match check_status(response).await {
            Ok(response) => response,
            // The token endpoint reports a rejected grant (bad code, revoked
            // refresh token) as 400 invalid_grant
            Err(AppError::Fetch { status: 400, .. }) => {
                return Err(AppError::Auth(AuthFailureKind::InvalidCredentials));
            }
            Err(err) => return Err(err),
        };
        let body = response.text().await?;
        let token: TokenResponse = decode_json(&body)?;

        Ok(Credential {
            access_token: token.access_token,
            refresh_token: Some(token.refresh_token),
            expires_at: Some(Utc::now() + Duration::seconds(token.expires_in)),
            api_base: None,
            account_id: None,
        })
    }

    fn listing_to_product(listing: Listing) -> Result<RemoteProduct> {
        if listing.price.divisor <= 0 {
            return Err(AppError::Parse(ParseFailureKind::MalformedResponse));
        }
        let price = Decimal::from(listing.price.amount) / Decimal::from(listing.price.divisor);

        let image_url = listing
            .images
            .and_then(|images| images.into_iter().find_map(|i| i.url_fullxfull));

        Ok(RemoteProduct {
            external_id: listing.listing_id.to_string(),
            title: listing.title,
            price,
            currency: listing.price.currency_code,
            url: listing.url,
            image_url,
        })
    }
}

#[async_trait]
impl PlatformConnector for EtsyConnector {
    fn platform(&self) -> Platform {
        Platform::Etsy
    }

    async fn authenticate(&self, payload: &AuthPayload) -> Result<Credential> {
        let code = match payload {
            AuthPayload::OAuthCode { code } => code,
            AuthPayload::ApiKey { .. } => {
                return Err(AppError::Validation(
                    "etsy requires an OAuth authorization code".to_string(),
                ));
            }
        };

        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("client_id", &self.client_id),
            ("redirect_uri", &self.redirect_uri),
            ("code", code),
        ])
        .await
    }

    async fn fetch_account(&self, credential: &Credential) -> Result<AccountInfo> {
        let response = self
            .http
            .get(format!("{}/v3/application/users/me", self.api_base))
            .bearer_auth(&credential.access_token)
            .header("x-api-key", &self.client_id)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body = response.text().await?;
        let me: MeResponse = decode_json(&body)?;

        Ok(AccountInfo {
            external_id: me.shop_id.to_string(),
            display_name: format!("Etsy shop {}", me.shop_id),
        })
    }

    async fn fetch_products(
        &self,
        credential: &Credential,
        page: u32,
        page_size: u32,
    ) -> Result<ProductPage> {
        let shop_id = credential
            .account_id
            .as_deref()
            .ok_or_else(|| AppError::Validation("credential is missing the shop id".to_string()))?;
        let offset = u64::from(page) * u64::from(page_size);

        let response = self
            .http
            .get(format!(
                "{}/v3/application/shops/{}/listings/active",
                self.api_base, shop_id
            ))
            .query(&[("limit", u64::from(page_size)), ("offset", offset)])
            .bearer_auth(&credential.access_token)
            .header("x-api-key", &self.client_id)
            .send()
            .await?;
        let response = check_status(response).await?;
        let body = response.text().await?;
        let listings: ListingsResponse = decode_json(&body)?;

        let fetched = listings.results.len() as u64;
        let items = listings
            .results
            .into_iter()
            .map(Self::listing_to_product)
            .collect::<Result<Vec<_>>>()?;

        Ok(ProductPage {
            items,
            page,
            page_size,
            total: Some(listings.count),
            has_more: offset + fetched < listings.count,
        })
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or(AppError::Auth(AuthFailureKind::InvalidCredentials))?;

        let mut fresh = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("client_id", &self.client_id),
                ("refresh_token", refresh_token),
            ])
            .await?;
        // Keep routing context across the exchange
        fresh.account_id = credential.account_id.clone();
        fresh.api_base = credential.api_base.clone();
        Ok(fresh)
    }
}
