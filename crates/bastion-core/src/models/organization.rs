//! Organization domain model.
//!
//! Organizations are the tenant boundary. Most data and every scoped role
//! assignment is partitioned by organization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An isolated customer scope.
///
/// The `slug` is what tenant detection matches against (subdomain label,
/// path segment or header value). `domain` is an optional custom domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// URL-safe unique identifier (e.g., `acme`).
    pub slug: String,
    /// Custom domain, if the organization has one.
    pub domain: Option<String>,
    /// Arbitrary key-value settings.
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a new organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganization {
    pub name: String,
    pub slug: String,
    pub domain: Option<String>,
    pub settings: Option<serde_json::Value>,
}

/// Fields that can be updated on an existing organization.
///
/// The id and slug are immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateOrganization {
    pub name: Option<String>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub domain: Option<Option<String>>,
    pub settings: Option<serde_json::Value>,
}
