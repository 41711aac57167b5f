use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::models::{PriceObservation, Store, StoreUpsert};
use crate::storage::Storage;
use crate::utils::error::{AppError, Result};

/// Turns fetched results into idempotent store upserts and immutable history
/// rows. This is the only path that writes observations, so the append-only
/// guarantee lives here.
#[derive(Clone)]
pub struct ReconciliationWriter {
    storage: Arc<dyn Storage>,
}

impl ReconciliationWriter {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Idempotent on (owner, platform, external account id): running the
    /// same connect flow twice updates the existing row.
    pub async fn upsert_store(&self, upsert: StoreUpsert) -> Result<Store> {
        if upsert.owner_id.is_empty() {
            return Err(AppError::Validation("store owner_id must not be empty".to_string()));
        }
        if upsert.external_account_id.is_empty() {
            return Err(AppError::Validation(
                "store external_account_id must not be empty".to_string(),
            ));
        }

        let store = self.storage.upsert_store(upsert).await?;
        tracing::info!(
            store_id = %store.id,
            platform = %store.platform,
            "store upserted"
        );
        Ok(store)
    }

    /// Always inserts a new row; prior observations are never touched.
    pub async fn record_observation(
        &self,
        link_id: &str,
        price: Decimal,
        currency: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<PriceObservation> {
        if price < Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "observed price must be non-negative, got {}",
                price
            )));
        }

        let observation = PriceObservation::new(link_id, price, currency, observed_at);
        self.storage.record_observation(&observation).await?;

        tracing::debug!(
            link_id,
            price = %observation.price,
            currency = %observation.currency,
            "price observation recorded"
        );
        Ok(observation)
    }
}
