use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::models::{
    CompetitorLink, ConnectionStatus, LinkTarget, PriceObservation, Store, StoreUpsert,
};
use crate::utils::error::{AppError, Result};

/// Storage collaborator consumed by the sync core. The engine only ever
/// talks to this interface; the SQLite implementation below is the concrete
/// collaborator shipped with the binary.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stores eligible for sync reporting: everything not explicitly
    /// disconnected (stores in needs_reauth are included so runs can surface
    /// them distinctly).
    async fn list_connected_stores(&self) -> Result<Vec<Store>>;

    async fn get_store(&self, store_id: &str) -> Result<Option<Store>>;

    /// Idempotent on (owner_id, platform, external_account_id): an existing
    /// row has its credential/expiry/name overwritten in place.
    async fn upsert_store(&self, upsert: StoreUpsert) -> Result<Store>;

    async fn mark_store_needs_reauth(&self, store_id: &str) -> Result<()>;

    async fn list_competitor_links(&self, product_id: Option<&str>) -> Result<Vec<CompetitorLink>>;

    async fn insert_competitor_link(&self, link: &CompetitorLink) -> Result<()>;

    /// Insert-only; the observation history is never updated or deleted.
    async fn record_observation(&self, observation: &PriceObservation) -> Result<()>;

    async fn list_observations(&self, link_id: &str) -> Result<Vec<PriceObservation>>;
}

#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(AppError::Database)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stores (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                external_account_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                access_credential TEXT NOT NULL,
                refresh_credential TEXT,
                credential_expires_at TEXT,
                api_base TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(owner_id, platform, external_account_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS competitor_links (
                id TEXT PRIMARY KEY,
                product_id TEXT NOT NULL,
                target_kind TEXT NOT NULL,
                target_ref TEXT NOT NULL,
                selector TEXT,
                label TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_observations (
                id TEXT PRIMARY KEY,
                link_id TEXT NOT NULL,
                price TEXT NOT NULL,
                currency TEXT NOT NULL,
                observed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn store_from_row(row: &SqliteRow) -> Result<Store> {
    Ok(Store {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        platform: row.try_get("platform")?,
        external_account_id: row.try_get("external_account_id")?,
        display_name: row.try_get("display_name")?,
        access_credential: row.try_get("access_credential")?,
        refresh_credential: row.try_get("refresh_credential")?,
        credential_expires_at: row.try_get("credential_expires_at")?,
        api_base: row.try_get("api_base")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn link_from_row(row: &SqliteRow) -> Result<CompetitorLink> {
    let kind: String = row.try_get("target_kind")?;
    let target_ref: String = row.try_get("target_ref")?;
    let target = LinkTarget::from_columns(&kind, &target_ref)
        .map_err(|e| AppError::Internal(format!("corrupt link target: {}", e)))?;

    Ok(CompetitorLink {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        target,
        selector: row.try_get("selector")?,
        label: row.try_get("label")?,
        created_at: row.try_get("created_at")?,
    })
}

fn observation_from_row(row: &SqliteRow) -> Result<PriceObservation> {
    let price_text: String = row.try_get("price")?;
    let price = Decimal::from_str(&price_text)
        .map_err(|e| AppError::Internal(format!("corrupt price value: {}", e)))?;

    Ok(PriceObservation {
        id: row.try_get("id")?,
        link_id: row.try_get("link_id")?,
        price,
        currency: row.try_get("currency")?,
        observed_at: row.try_get("observed_at")?,
    })
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn list_connected_stores(&self) -> Result<Vec<Store>> {
        let rows = sqlx::query("SELECT * FROM stores WHERE status != ? ORDER BY created_at")
            .bind(ConnectionStatus::Disconnected)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(store_from_row).collect()
    }

    async fn get_store(&self, store_id: &str) -> Result<Option<Store>> {
        let row = sqlx::query("SELECT * FROM stores WHERE id = ?")
            .bind(store_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(store_from_row).transpose()
    }

    async fn upsert_store(&self, upsert: StoreUpsert) -> Result<Store> {
        let candidate = Store::new(upsert);

        sqlx::query(
            r#"
            INSERT INTO stores (
                id, owner_id, platform, external_account_id, display_name,
                access_credential, refresh_credential, credential_expires_at,
                api_base, status, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner_id, platform, external_account_id) DO UPDATE SET
                display_name = excluded.display_name,
                access_credential = excluded.access_credential,
                refresh_credential = excluded.refresh_credential,
                credential_expires_at = excluded.credential_expires_at,
                api_base = excluded.api_base,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&candidate.id)
        .bind(&candidate.owner_id)
        .bind(candidate.platform)
        .bind(&candidate.external_account_id)
        .bind(&candidate.display_name)
        .bind(&candidate.access_credential)
        .bind(&candidate.refresh_credential)
        .bind(candidate.credential_expires_at)
        .bind(&candidate.api_base)
        .bind(candidate.status)
        .bind(candidate.created_at)
        .bind(candidate.updated_at)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT * FROM stores WHERE owner_id = ? AND platform = ? AND external_account_id = ?",
        )
        .bind(&candidate.owner_id)
        .bind(candidate.platform)
        .bind(&candidate.external_account_id)
        .fetch_one(&self.pool)
        .await?;

        store_from_row(&row)
    }

    async fn mark_store_needs_reauth(&self, store_id: &str) -> Result<()> {
        sqlx::query("UPDATE stores SET status = ?, updated_at = ? WHERE id = ?")
            .bind(ConnectionStatus::NeedsReauth)
            .bind(Utc::now())
            .bind(store_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_competitor_links(&self, product_id: Option<&str>) -> Result<Vec<CompetitorLink>> {
        let rows = match product_id {
            Some(product_id) => {
                sqlx::query(
                    "SELECT * FROM competitor_links WHERE product_id = ? ORDER BY created_at",
                )
                .bind(product_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM competitor_links ORDER BY created_at")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(link_from_row).collect()
    }

    async fn insert_competitor_link(&self, link: &CompetitorLink) -> Result<()> {
        let (kind, target_ref) = link.target.to_columns();

        sqlx::query(
            r#"
            INSERT INTO competitor_links (id, product_id, target_kind, target_ref, selector, label, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&link.id)
        .bind(&link.product_id)
        .bind(kind)
        .bind(target_ref)
        .bind(&link.selector)
        .bind(&link.label)
        .bind(link.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_observation(&self, observation: &PriceObservation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_observations (id, link_id, price, currency, observed_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&observation.id)
        .bind(&observation.link_id)
        .bind(observation.price.to_string())
        .bind(&observation.currency)
        .bind(observation.observed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_observations(&self, link_id: &str) -> Result<Vec<PriceObservation>> {
        let rows = sqlx::query(
            "SELECT * FROM price_observations WHERE link_id = ? ORDER BY observed_at",
        )
        .bind(link_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(observation_from_row).collect()
    }
}
