use chrono::Utc;
use rust_decimal::Decimal;
use shopwatch::connectors::{AuthPayload, EtsyConnector, PlatformConnector, WooCommerceConnector};
use shopwatch::models::Credential;
use shopwatch::utils::error::{AppError, ParseFailureKind};
use std::str::FromStr;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::test_config;

fn etsy(server_base: &str) -> EtsyConnector {
    let config = test_config(server_base);
    EtsyConnector::new(&config.platforms.etsy, "ShopWatchTest/0.1", 5).unwrap()
}

fn woo() -> WooCommerceConnector {
    WooCommerceConnector::new("ShopWatchTest/0.1", 5, "USD").unwrap()
}

fn etsy_credential(token: &str) -> Credential {
    Credential {
        access_token: token.to_string(),
        refresh_token: Some("refresh-token".to_string()),
        expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        api_base: None,
        account_id: Some("77".to_string()),
    }
}

fn woo_credential(server_base: &str) -> Credential {
    Credential {
        access_token: "ck_0123456789abcdef:cs_0123456789abcdef".to_string(),
        refresh_token: None,
        expires_at: None,
        api_base: Some(server_base.to_string()),
        account_id: Some("shop.example.com".to_string()),
    }
}

const TOKEN_BODY: &str = r#"{
    "access_token": "new-access-token",
    "refresh_token": "new-refresh-token",
    "expires_in": 3600,
    "token_type": "Bearer"
}"#;

#[tokio::test]
async fn test_etsy_authenticate_exchanges_the_code() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/public/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc123"))
        .and(body_string_contains("client_id=test-client-id"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TOKEN_BODY))
        .expect(1)
        .mount(&server)
        .await;

    let connector = etsy(&server.uri());
    let credential = connector
        .authenticate(&AuthPayload::OAuthCode { code: "abc123".to_string() })
        .await
        .unwrap();

    assert_eq!(credential.access_token, "new-access-token");
    assert_eq!(credential.refresh_token, Some("new-refresh-token".to_string()));
    assert!(credential.expires_at.unwrap() > Utc::now());
}

#[tokio::test]
async fn test_etsy_refresh_exchanges_the_refresh_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/public/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TOKEN_BODY))
        .expect(1)
        .mount(&server)
        .await;

    let connector = etsy(&server.uri());
    let refreshed = connector.refresh(&etsy_credential("old-token")).await.unwrap();

    assert_eq!(refreshed.access_token, "new-access-token");
    // Routing context survives the exchange
    assert_eq!(refreshed.account_id, Some("77".to_string()));
}

#[tokio::test]
async fn test_etsy_rejected_credentials_surface_as_auth_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/application/users/me"))
        .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"error":"invalid_token"}"#))
        .mount(&server)
        .await;

    let connector = etsy(&server.uri());
    let err = connector.fetch_account(&etsy_credential("bad")).await.unwrap_err();

    assert!(matches!(err, AppError::Auth(_)));
}

#[tokio::test]
async fn test_etsy_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/application/shops/77/listings/active"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .mount(&server)
        .await;

    let connector = etsy(&server.uri());
    let err = connector
        .fetch_products(&etsy_credential("tok"), 0, 25)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::RateLimited { retry_after: Some(30) }));
}

#[tokio::test]
async fn test_etsy_malformed_body_is_a_parse_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/application/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"user_id\": "))
        .mount(&server)
        .await;

    let connector = etsy(&server.uri());
    let err = connector.fetch_account(&etsy_credential("tok")).await.unwrap_err();

    assert!(matches!(err, AppError::Parse(ParseFailureKind::MalformedResponse)));
}

#[tokio::test]
async fn test_etsy_listing_page_maps_and_paginates() {
    let server = MockServer::start().await;
    let body = r#"{
        "count": 60,
        "results": [{
            "listing_id": 501,
            "title": "Ceramic Mug",
            "url": "https://example.com/listing/501",
            "price": {"amount": 1999, "divisor": 100, "currency_code": "USD"}
        }]
    }"#;

    Mock::given(method("GET"))
        .and(path("/v3/application/shops/77/listings/active"))
        .and(query_param("limit", "50"))
        .and(query_param("offset", "50"))
        .and(header("authorization", "Bearer tok"))
        .and(header("x-api-key", "test-client-id"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let connector = etsy(&server.uri());
    let page = connector
        .fetch_products(&etsy_credential("tok"), 1, 50)
        .await
        .unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].external_id, "501");
    assert_eq!(page.items[0].price, Decimal::from_str("19.99").unwrap());
    assert_eq!(page.total, Some(60));
    // 50 + 1 fetched < 60: more pages remain
    assert!(page.has_more);
}

#[tokio::test]
async fn test_woo_zero_based_page_maps_to_platform_page_one() {
    let server = MockServer::start().await;
    let body = r#"[{
        "id": 11,
        "name": "Widget",
        "price": "12.50",
        "permalink": "https://shop.example.com/product/widget",
        "images": [{"src": "https://shop.example.com/widget.jpg"}]
    }]"#;

    Mock::given(method("GET"))
        .and(path("/wp-json/wc/v3/products"))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "50"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-wp-total", "1")
                .insert_header("x-wp-totalpages", "1")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let connector = woo();
    let page = connector
        .fetch_products(&woo_credential(&server.uri()), 0, 50)
        .await
        .unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].external_id, "11");
    assert_eq!(page.items[0].price, Decimal::from_str("12.50").unwrap());
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_woo_reports_further_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wp-json/wc/v3/products"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-wp-total", "120")
                .insert_header("x-wp-totalpages", "3")
                .set_body_string("[]"),
        )
        .mount(&server)
        .await;

    let connector = woo();
    let page = connector
        .fetch_products(&woo_credential(&server.uri()), 0, 50)
        .await
        .unwrap();

    assert!(page.has_more);
    assert_eq!(page.total, Some(120));
}

#[tokio::test]
async fn test_woo_account_info_uses_site_host() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wp-json/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"name": "My Woo Shop"}"#),
        )
        .mount(&server)
        .await;

    let connector = woo();
    let account = connector
        .fetch_account(&woo_credential(&server.uri()))
        .await
        .unwrap();

    assert_eq!(account.display_name, "My Woo Shop");
    // Host of the mock server URI
    assert!(server.uri().contains(&account.external_id));
}
