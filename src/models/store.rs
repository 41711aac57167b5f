use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{generate_id, ConnectionStatus, Platform};

/// Access credential for a platform API: access token, optional refresh
/// token, optional expiry, plus the routing context some vendors need
/// (self-hosted API base, external account id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Self-hosted platforms (WooCommerce) carry their own endpoint.
    pub api_base: Option<String>,
    /// External account id, filled once the account is known.
    pub account_id: Option<String>,
}

/// A connected external merchant account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Store {
    pub id: String,
    pub owner_id: String,
    pub platform: Platform,
    pub external_account_id: String,
    pub display_name: String,

    // Credential fields, persisted alongside the row
    pub access_credential: String,
    pub refresh_credential: Option<String>,
    pub credential_expires_at: Option<DateTime<Utc>>,
    pub api_base: Option<String>,

    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for the idempotent store upsert. The natural key is
/// (owner_id, platform, external_account_id); everything else is
/// overwritten in place on reconnection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreUpsert {
    pub owner_id: String,
    pub platform: Platform,
    pub external_account_id: String,
    pub display_name: String,
    pub credential: Credential,
    pub status: ConnectionStatus,
}

impl Store {
    pub fn new(upsert: StoreUpsert) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            owner_id: upsert.owner_id,
            platform: upsert.platform,
            external_account_id: upsert.external_account_id,
            display_name: upsert.display_name,
            access_credential: upsert.credential.access_token,
            refresh_credential: upsert.credential.refresh_token,
            credential_expires_at: upsert.credential.expires_at,
            api_base: upsert.credential.api_base,
            status: upsert.status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild the credential from the persisted fields.
    pub fn credential(&self) -> Credential {
        Credential {
            access_token: self.access_credential.clone(),
            refresh_token: self.refresh_credential.clone(),
            expires_at: self.credential_expires_at,
            api_base: self.api_base.clone(),
            account_id: Some(self.external_account_id.clone()),
        }
    }

    /// Whether the credential expires within the given safety margin.
    /// Credentials without an expiry never report as expiring.
    pub fn expires_within(&self, margin: Duration) -> bool {
        match self.credential_expires_at {
            Some(expires_at) => Utc::now() + margin >= expires_at,
            None => false,
        }
    }

    pub fn is_syncable(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

impl Credential {
    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }
}
