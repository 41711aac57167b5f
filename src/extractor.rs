use async_trait::async_trait;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use std::str::FromStr;
use std::time::Duration;

use crate::config::ExtractorConfig;
use crate::utils::error::{AppError, ParseFailureKind, Result};

/// One successful price reading from a public product page.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPrice {
    pub price: Decimal,
    pub currency: String,
    pub title: Option<String>,
    pub image_url: Option<String>,
}

/// Capability seam for page extraction so the orchestrator can be driven
/// with a fake in tests.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    async fn extract(&self, url: &str, selector: Option<&str>) -> Result<ExtractedPrice>;
}

pub struct PriceExtractor {
    http: reqwest::Client,
    config: ExtractorConfig,
    number_regex: Regex,
    currency_symbols: Vec<(&'static str, &'static str)>,
}

impl PriceExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;

        // Longer symbols first so "US$" wins over "$"
        let currency_symbols = vec![
            ("US$", "USD"),
            ("USD", "USD"),
            ("EUR", "EUR"),
            ("GBP", "GBP"),
            ("AUD", "AUD"),
            ("CAD", "CAD"),
            ("JPY", "JPY"),
            ("£", "GBP"),
            ("€", "EUR"),
            ("¥", "JPY"),
            ("₹", "INR"),
        ];

        Ok(Self {
            http,
            config,
            number_regex: Regex::new(r"\d(?:[\d.,\s]*\d)?")
                .map_err(|e| AppError::Internal(format!("invalid number regex: {}", e)))?,
            currency_symbols,
        })
    }

    /// Pure HTML stage: selector resolution, numeric parsing, currency and
    /// metadata heuristics. Split out from the fetch so it can be exercised
    /// on raw documents.
    pub fn extract_from_html(&self, body: &str, selector: Option<&str>) -> Result<ExtractedPrice> {
        let document = Html::parse_document(body);

        let raw = match selector {
            Some(css) => {
                let parsed = Selector::parse(css)
                    .map_err(|e| AppError::Validation(format!("invalid selector '{}': {:?}", css, e)))?;
                first_non_empty(&document, &parsed)
            }
            None => self.config.price_selectors.iter().find_map(|candidate| {
                let parsed = Selector::parse(candidate).ok()?;
                first_non_empty(&document, &parsed)
            }),
        };

        let raw = raw.ok_or(AppError::Parse(ParseFailureKind::NoPriceFound))?;

        let price = self
            .parse_price(&raw)
            .ok_or(AppError::Parse(ParseFailureKind::NoPriceFound))?;

        let currency = self
            .detect_currency(&raw)
            .unwrap_or_else(|| self.config.default_currency.clone());

        Ok(ExtractedPrice {
            price,
            currency,
            title: page_title(&document),
            image_url: og_image(&document),
        })
    }

    /// Parse the first numeric run in the text, tolerating both `1,234.56`
    /// and `1.234,56` styles: everything before the final separator is
    /// treated as grouping and stripped, the final separator becomes `.`.
    pub fn parse_price(&self, text: &str) -> Option<Decimal> {
        let matched = self.number_regex.find(text)?.as_str();
        let compact: String = matched.chars().filter(|c| !c.is_whitespace()).collect();

        let normalized = match compact.rfind(['.', ',']) {
            None => compact,
            Some(last_sep) => {
                let mut out = String::with_capacity(compact.len());
                for (idx, c) in compact.char_indices() {
                    match c {
                        '.' | ',' if idx != last_sep => {} // grouping separator
                        '.' | ',' => out.push('.'),
                        _ => out.push(c),
                    }
                }
                out
            }
        };

        Decimal::from_str(&normalized).ok()
    }

    fn detect_currency(&self, text: &str) -> Option<String> {
        self.currency_symbols
            .iter()
            .find(|(symbol, _)| text.contains(symbol))
            .map(|(_, code)| code.to_string())
            .or_else(|| {
                // Bare "$" is ambiguous; resolve it to the configured default
                text.contains('$').then(|| self.config.default_currency.clone())
            })
    }
}

#[async_trait]
impl PageExtractor for PriceExtractor {
    async fn extract(&self, url: &str, selector: Option<&str>) -> Result<ExtractedPrice> {
        tracing::debug!(url, "fetching competitor page");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Fetch { status: status.as_u16(), body: None });
        }

        let body = response.text().await?;
        self.extract_from_html(&body, selector)
    }
}

/// Text of the first matching element, falling back to its `content`
/// attribute for meta-style tags.
fn first_non_empty(document: &Html, selector: &Selector) -> Option<String> {
    for element in document.select(selector) {
        let text = element.text().collect::<Vec<_>>().join(" ").trim().to_string();
        if !text.is_empty() {
            return Some(text);
        }
        if let Some(content) = element.value().attr("content") {
            let content = content.trim();
            if !content.is_empty() {
                return Some(content.to_string());
            }
        }
    }
    None
}

fn page_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let element = document.select(&selector).next()?;
    let title = element.text().collect::<Vec<_>>().join(" ").trim().to_string();
    (!title.is_empty()).then_some(title)
}

fn og_image(document: &Html) -> Option<String> {
    let selector = Selector::parse(r#"meta[property="og:image"]"#).ok()?;
    let element = document.select(&selector).next()?;
    element.value().attr("content").map(|s| s.trim().to_string())
}
