//! Session shapes consumed from the external session store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::permission::Permission;
use super::role::RoleWithPermissions;

/// The authenticated principal as the session store reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub organization_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user: Option<SessionUser>,
}

/// Session user with the computed super-admin flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RbacUser {
    #[serde(flatten)]
    pub user: SessionUser,
    pub is_super_admin: bool,
}

/// Session augmented with the user's roles and flattened permissions.
///
/// For an unauthenticated request this serializes to exactly
/// `{"user":null,"roles":[],"permissions":[]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionWithRbac {
    pub user: Option<RbacUser>,
    pub roles: Vec<RoleWithPermissions>,
    pub permissions: Vec<Permission>,
}

impl SessionWithRbac {
    pub fn anonymous() -> Self {
        Self {
            user: None,
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }
}
