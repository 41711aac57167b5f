use rust_decimal::Decimal;
use shopwatch::extractor::{PageExtractor, PriceExtractor};
use shopwatch::utils::error::{AppError, ParseFailureKind};
use std::str::FromStr;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::test_config;

fn extractor(server_base: &str) -> PriceExtractor {
    PriceExtractor::new(test_config(server_base).extractor).unwrap()
}

#[tokio::test]
async fn test_extract_from_live_page() {
    let server = MockServer::start().await;
    let html = r#"
        <html>
            <head>
                <title>Blue Widget | Competitor Shop</title>
                <meta property="og:image" content="https://cdn.example.com/widget.jpg" />
            </head>
            <body>
                <h1>Blue Widget</h1>
                <div class="price">€1.234,56</div>
            </body>
        </html>
    "#;

    Mock::given(method("GET"))
        .and(path("/products/widget"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&server)
        .await;

    let extractor = extractor(&server.uri());
    let result = extractor
        .extract(&format!("{}/products/widget", server.uri()), None)
        .await
        .unwrap();

    assert_eq!(result.price, Decimal::from_str("1234.56").unwrap());
    assert_eq!(result.currency, "EUR");
    assert_eq!(result.title, Some("Blue Widget | Competitor Shop".to_string()));
    assert_eq!(result.image_url, Some("https://cdn.example.com/widget.jpg".to_string()));
}

#[tokio::test]
async fn test_extract_with_selector_override() {
    let server = MockServer::start().await;
    let html = r#"
        <html><body>
            <span class="was">$49.99</span>
            <span class="now">$39.99</span>
        </body></html>
    "#;

    Mock::given(method("GET"))
        .and(path("/sale"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&server)
        .await;

    let extractor = extractor(&server.uri());
    let result = extractor
        .extract(&format!("{}/sale", server.uri()), Some(".now"))
        .await
        .unwrap();

    assert_eq!(result.price, Decimal::from_str("39.99").unwrap());
}

#[tokio::test]
async fn test_404_is_a_fetch_failure_never_a_zero_price() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let extractor = extractor(&server.uri());
    let err = extractor
        .extract(&format!("{}/missing", server.uri()), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Fetch { status: 404, .. }));
}

#[tokio::test]
async fn test_page_without_price_is_a_parse_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body><p>out of stock</p></body></html>"),
        )
        .mount(&server)
        .await;

    let extractor = extractor(&server.uri());
    let err = extractor
        .extract(&format!("{}/empty", server.uri()), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Parse(ParseFailureKind::NoPriceFound)));
}
