use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::generate_id;

/// One point-in-time price reading for a competitor link. Append-only: the
/// ingestion path never mutates or deletes rows, so the series per link only
/// grows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceObservation {
    pub id: String,
    pub link_id: String,
    pub price: Decimal,
    pub currency: String,
    pub observed_at: DateTime<Utc>,
}

impl PriceObservation {
    pub fn new(
        link_id: impl Into<String>,
        price: Decimal,
        currency: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id(),
            link_id: link_id.into(),
            price,
            currency: currency.into(),
            observed_at,
        }
    }
}
