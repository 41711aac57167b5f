use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod competitor_link;
pub mod price_observation;
pub mod store;
pub mod sync_run;

// Re-exports for convenience
pub use competitor_link::*;
pub use price_observation::*;
pub use store::*;
pub use sync_run::*;

/// Connected e-commerce platforms, one variant per vendor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum Platform {
    #[sqlx(rename = "etsy")]
    Etsy,
    #[sqlx(rename = "woocommerce")]
    WooCommerce,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Etsy => "etsy",
            Platform::WooCommerce => "woocommerce",
        }
    }

    /// OAuth platforms carry a refresh token and an expiry; key-based
    /// platforms stay valid until revoked externally.
    pub fn uses_oauth(&self) -> bool {
        match self {
            Platform::Etsy => true,
            Platform::WooCommerce => false,
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "etsy" => Ok(Platform::Etsy),
            "woocommerce" => Ok(Platform::WooCommerce),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT")]
pub enum ConnectionStatus {
    #[sqlx(rename = "connected")]
    Connected,
    #[sqlx(rename = "needs_reauth")]
    NeedsReauth,
    #[sqlx(rename = "disconnected")]
    Disconnected,
}

// Helper function to generate UUIDs in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
