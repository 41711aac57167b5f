use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{generate_id, Platform};

/// What a competitor link points at: an arbitrary public product page, or a
/// product inside a connected platform's catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkTarget {
    Url { url: String },
    PlatformProduct { platform: Platform, external_id: String },
}

impl LinkTarget {
    /// Flatten to the (kind, ref) column pair used by storage.
    pub fn to_columns(&self) -> (String, String) {
        match self {
            LinkTarget::Url { url } => ("url".to_string(), url.clone()),
            LinkTarget::PlatformProduct { platform, external_id } => {
                (platform.as_str().to_string(), external_id.clone())
            }
        }
    }

    pub fn from_columns(kind: &str, target_ref: &str) -> Result<Self, String> {
        if kind == "url" {
            return Ok(LinkTarget::Url { url: target_ref.to_string() });
        }
        let platform: Platform = kind.parse()?;
        Ok(LinkTarget::PlatformProduct {
            platform,
            external_id: target_ref.to_string(),
        })
    }
}

/// A tracked external product reference tied to exactly one owned product.
/// Immutable except for the display label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompetitorLink {
    pub id: String,
    pub product_id: String,
    pub target: LinkTarget,
    /// CSS selector override for scraped pages.
    pub selector: Option<String>,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCompetitorLink {
    pub product_id: String,
    pub target: LinkTarget,
    pub selector: Option<String>,
    pub label: String,
}

impl CompetitorLink {
    pub fn new(new_link: NewCompetitorLink) -> Self {
        Self {
            id: generate_id(),
            product_id: new_link.product_id,
            target: new_link.target,
            selector: new_link.selector,
            label: new_link.label,
            created_at: Utc::now(),
        }
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// The platform product id this link tracks, if it is a platform target
    /// on the given platform.
    pub fn platform_product_id(&self, platform: Platform) -> Option<&str> {
        match &self.target {
            LinkTarget::PlatformProduct { platform: p, external_id } if *p == platform => {
                Some(external_id)
            }
            _ => None,
        }
    }
}
