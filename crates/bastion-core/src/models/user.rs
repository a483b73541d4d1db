//! User domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// `None` marks a cross-tenant principal (the super-admin).
    pub organization_id: Option<Uuid>,
    pub email: String,
    pub name: Option<String>,
    /// Opaque credential hash produced by a [`CredentialHasher`].
    ///
    /// [`CredentialHasher`]: crate::capability::CredentialHasher
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub two_factor_enabled: bool,
    /// Stored TOTP secret, only present while 2FA is enabled. Either a
    /// base32 secret or an AES-256-GCM envelope, depending on config.
    #[serde(skip_serializing)]
    pub two_factor_secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// True for principals that do not belong to any organization.
    pub fn is_cross_tenant(&self) -> bool {
        self.organization_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub organization_id: Option<Uuid>,
    pub email: String,
    pub name: Option<String>,
    /// Already hashed; repositories never see plaintext passwords.
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateUser {
    pub email: Option<String>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub name: Option<Option<String>>,
    pub password_hash: Option<String>,
}
