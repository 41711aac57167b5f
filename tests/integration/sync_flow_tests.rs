use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use shopwatch::connectors::AuthPayload;
use shopwatch::models::{
    CompetitorLink, ConnectionStatus, Credential, LinkTarget, NewCompetitorLink, OutcomeKind,
    Platform, SkipReason, StoreUpsert,
};
use shopwatch::orchestrator::CancelToken;
use shopwatch::storage::Storage;
use std::str::FromStr;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::build_engine;

const LISTINGS_BODY: &str = r#"{
    "count": 1,
    "results": [{
        "listing_id": 501,
        "title": "Ceramic Mug",
        "url": "https://example.com/listing/501",
        "price": {"amount": 1999, "divisor": 100, "currency_code": "USD"}
    }]
}"#;

async fn mount_etsy_happy_path(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v3/public/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"access_token": "test-access-token", "refresh_token": "test-refresh-token", "expires_in": 3600, "token_type": "Bearer"}"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v3/application/users/me"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"user_id": 1, "shop_id": 77}"#),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v3/application/shops/77/listings/active"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTINGS_BODY))
        .mount(server)
        .await;
}

async fn seed_platform_link(storage: &dyn Storage, external_id: &str) -> CompetitorLink {
    let link = CompetitorLink::new(NewCompetitorLink {
        product_id: "prod1".to_string(),
        target: LinkTarget::PlatformProduct {
            platform: Platform::Etsy,
            external_id: external_id.to_string(),
        },
        selector: None,
        label: format!("Etsy listing {}", external_id),
    });
    storage.insert_competitor_link(&link).await.unwrap();
    link
}

#[tokio::test]
async fn test_connect_then_sync_records_an_observation() {
    let server = MockServer::start().await;
    mount_etsy_happy_path(&server).await;

    let engine = build_engine(&server.uri()).await;

    // Authorization callback hands over the one-time code
    let store = engine
        .token_manager
        .complete_authorization(
            "user1",
            Platform::Etsy,
            AuthPayload::OAuthCode { code: "abc123".to_string() },
        )
        .await
        .unwrap();

    assert_eq!(store.status, ConnectionStatus::Connected);
    assert_eq!(store.external_account_id, "77");

    let link = seed_platform_link(engine.storage.as_ref(), "501").await;

    let outcome = engine.orchestrator.sync_store(&store, &CancelToken::new()).await;
    match &outcome.outcome {
        OutcomeKind::Succeeded { observation_ids } => assert_eq!(observation_ids.len(), 1),
        other => panic!("expected success, got {:?}", other),
    }

    let history = engine.storage.list_observations(&link.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].price, Decimal::from_str("19.99").unwrap());
    assert_eq!(history[0].currency, "USD");
}

#[tokio::test]
async fn test_expiring_credential_refreshes_before_the_protected_fetch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/public/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"access_token": "refreshed-token", "refresh_token": "next-refresh", "expires_in": 3600, "token_type": "Bearer"}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    // The catalog only answers to the refreshed token, proving the refresh
    // happened before the fetch
    Mock::given(method("GET"))
        .and(path("/v3/application/shops/77/listings/active"))
        .and(header("authorization", "Bearer refreshed-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTINGS_BODY))
        .expect(1)
        .mount(&server)
        .await;

    let engine = build_engine(&server.uri()).await;

    // Seed a store whose token expires inside the refresh margin
    let store = engine
        .storage
        .upsert_store(StoreUpsert {
            owner_id: "user1".to_string(),
            platform: Platform::Etsy,
            external_account_id: "77".to_string(),
            display_name: "Etsy shop 77".to_string(),
            credential: Credential {
                access_token: "stale-token".to_string(),
                refresh_token: Some("refresh-token".to_string()),
                expires_at: Some(Utc::now() + Duration::seconds(60)),
                api_base: None,
                account_id: Some("77".to_string()),
            },
            status: ConnectionStatus::Connected,
        })
        .await
        .unwrap();
    seed_platform_link(engine.storage.as_ref(), "501").await;

    let outcome = engine.orchestrator.sync_store(&store, &CancelToken::new()).await;
    assert!(outcome.succeeded(), "outcome was {:?}", outcome.outcome);

    let reloaded = engine.storage.get_store(&store.id).await.unwrap().unwrap();
    assert_eq!(reloaded.access_credential, "refreshed-token");
    assert_eq!(reloaded.status, ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_revoked_refresh_token_flags_the_store() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/public/oauth/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string(r#"{"error": "invalid_grant"}"#),
        )
        .mount(&server)
        .await;

    let engine = build_engine(&server.uri()).await;

    let store = engine
        .storage
        .upsert_store(StoreUpsert {
            owner_id: "user1".to_string(),
            platform: Platform::Etsy,
            external_account_id: "77".to_string(),
            display_name: "Etsy shop 77".to_string(),
            credential: Credential {
                access_token: "stale-token".to_string(),
                refresh_token: Some("revoked-refresh".to_string()),
                expires_at: Some(Utc::now() + Duration::seconds(60)),
                api_base: None,
                account_id: Some("77".to_string()),
            },
            status: ConnectionStatus::Connected,
        })
        .await
        .unwrap();
    seed_platform_link(engine.storage.as_ref(), "501").await;

    // The refresh attempt fails and escalates into needs_reauth
    let outcome = engine.orchestrator.sync_store(&store, &CancelToken::new()).await;
    assert!(matches!(outcome.outcome, OutcomeKind::Failed { .. }));

    let reloaded = engine.storage.get_store(&store.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, ConnectionStatus::NeedsReauth);

    // Subsequent runs short-circuit without any network call
    let outcome = engine.orchestrator.sync_store(&reloaded, &CancelToken::new()).await;
    assert_eq!(
        outcome.outcome,
        OutcomeKind::Skipped { reason: SkipReason::NeedsReauth }
    );

    // A batch run surfaces the store distinctly instead of failing
    let run = engine.orchestrator.sync_all(&CancelToken::new()).await.unwrap();
    assert_eq!(run.skipped, 1);
    assert_eq!(run.failed, 0);
}

#[tokio::test]
async fn test_mixed_scrape_run_returns_partial_success() {
    let server = MockServer::start().await;

    for i in 0..3 {
        Mock::given(method("GET"))
            .and(path(format!("/competitor/{}", i)))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><div class="price">$12.34</div></body></html>"#,
            ))
            .mount(&server)
            .await;
    }
    for i in 3..5 {
        Mock::given(method("GET"))
            .and(path(format!("/competitor/{}", i)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
    }

    let engine = build_engine(&server.uri()).await;
    for i in 0..5 {
        let link = CompetitorLink::new(NewCompetitorLink {
            product_id: "prod1".to_string(),
            target: LinkTarget::Url {
                url: format!("{}/competitor/{}", server.uri(), i),
            },
            selector: None,
            label: format!("Competitor {}", i),
        });
        engine.storage.insert_competitor_link(&link).await.unwrap();
    }

    let run = engine
        .orchestrator
        .scrape_all(None, &CancelToken::new())
        .await
        .unwrap();

    // Partial failure never raises; the summary carries the split
    assert_eq!(run.total(), 5);
    assert_eq!(run.succeeded, 3);
    assert_eq!(run.failed, 2);
    assert_eq!(run.skipped, 0);

    let links = engine.storage.list_competitor_links(Some("prod1")).await.unwrap();
    let mut recorded = 0;
    for link in &links {
        recorded += engine.storage.list_observations(&link.id).await.unwrap().len();
    }
    assert_eq!(recorded, 3);
}
