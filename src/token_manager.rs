use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::connectors::{AuthPayload, ConnectorRegistry};
use crate::models::{ConnectionStatus, Credential, Platform, Store, StoreUpsert};
use crate::reconciliation::ReconciliationWriter;
use crate::storage::Storage;
use crate::utils::error::{AppError, AuthFailureKind, Result};

/// Owns the per-store authorization lifecycle: proactive refresh ahead of
/// expiry, escalation of refresh failures into the persistent needs-reauth
/// state, and the authorization-callback entry point.
///
/// Refresh for a given store is serialized on a per-store mutex covering
/// exactly the refresh-and-persist sequence; data fetches never take it.
pub struct TokenManager {
    storage: Arc<dyn Storage>,
    connectors: ConnectorRegistry,
    writer: ReconciliationWriter,
    refresh_margin: Duration,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TokenManager {
    pub fn new(
        storage: Arc<dyn Storage>,
        connectors: ConnectorRegistry,
        writer: ReconciliationWriter,
        refresh_margin_secs: u64,
    ) -> Self {
        Self {
            storage,
            connectors,
            writer,
            refresh_margin: Duration::seconds(refresh_margin_secs as i64),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Authorization callback boundary: exchange the raw authorization input
    /// for a credential, resolve the external account, and upsert the store
    /// as connected. Reconnection lands on the existing row.
    pub async fn complete_authorization(
        &self,
        owner_id: &str,
        platform: Platform,
        payload: AuthPayload,
    ) -> Result<Store> {
        let connector = self.connectors.get(platform)?;

        let credential = connector.authenticate(&payload).await?;
        let account = connector.fetch_account(&credential).await?;
        let credential = credential.with_account_id(&account.external_id);

        tracing::info!(owner_id, platform = %platform, account = %account.external_id, "authorization completed");

        self.writer
            .upsert_store(StoreUpsert {
                owner_id: owner_id.to_string(),
                platform,
                external_account_id: account.external_id,
                display_name: account.display_name,
                credential,
                status: ConnectionStatus::Connected,
            })
            .await
    }

    /// Return a credential guaranteed usable for protected calls, refreshing
    /// first when the stored expiry is within the safety margin. Never
    /// refreshes reactively after a 401: by the time a protected call runs,
    /// the refresh has already happened.
    pub async fn ensure_fresh(&self, store: &Store) -> Result<Credential> {
        match store.status {
            ConnectionStatus::Connected => {}
            ConnectionStatus::NeedsReauth => {
                return Err(AppError::Auth(AuthFailureKind::Revoked));
            }
            ConnectionStatus::Disconnected => {
                return Err(AppError::Validation(format!(
                    "store {} is disconnected",
                    store.id
                )));
            }
        }

        // Key-based platforms have no expiry and nothing to refresh
        if !store.platform.uses_oauth() || !store.expires_within(self.refresh_margin) {
            return Ok(store.credential());
        }

        let lock = self.lock_for(&store.id).await;
        let _guard = lock.lock().await;

        // Re-read under the lock: a concurrent job may have refreshed while
        // this one was waiting
        let current = self
            .storage
            .get_store(&store.id)
            .await?
            .ok_or_else(|| AppError::Validation(format!("store {} no longer exists", store.id)))?;

        if current.status == ConnectionStatus::NeedsReauth {
            return Err(AppError::Auth(AuthFailureKind::Revoked));
        }
        if !current.expires_within(self.refresh_margin) {
            return Ok(current.credential());
        }

        self.refresh_and_persist(&current).await
    }

    async fn refresh_and_persist(&self, store: &Store) -> Result<Credential> {
        let connector = self.connectors.get(store.platform)?;

        tracing::debug!(store_id = %store.id, "refreshing expiring credential");

        match connector.refresh(&store.credential()).await {
            Ok(fresh) => {
                let fresh = fresh.with_account_id(&store.external_account_id);
                self.writer
                    .upsert_store(StoreUpsert {
                        owner_id: store.owner_id.clone(),
                        platform: store.platform,
                        external_account_id: store.external_account_id.clone(),
                        display_name: store.display_name.clone(),
                        credential: fresh.clone(),
                        status: ConnectionStatus::Connected,
                    })
                    .await?;

                tracing::info!(store_id = %store.id, "credential refreshed");
                Ok(fresh)
            }
            Err(err) if err.is_auth() => {
                // The refresh token itself was rejected; automatic recovery
                // is impossible until the user re-authorizes
                tracing::warn!(store_id = %store.id, error = %err, "refresh rejected, store needs re-authorization");
                self.storage.mark_store_needs_reauth(&store.id).await?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    async fn lock_for(&self, store_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(store_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
