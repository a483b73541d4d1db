//! Role domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::permission::Permission;

/// Slug of the system-wide role that bypasses every scoped check.
pub const SUPER_ADMIN_ROLE: &str = "super-admin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: Uuid,
    /// `None` for system-wide roles.
    pub organization_id: Option<Uuid>,
    /// Unique within the organization scope.
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn is_system_wide(&self) -> bool {
        self.organization_id.is_none()
    }

    pub fn is_super_admin(&self) -> bool {
        self.is_system_wide() && self.slug == SUPER_ADMIN_ROLE
    }
}

/// A role together with the permissions it grants, de-duplicated by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRole {
    pub organization_id: Option<Uuid>,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateRole {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_default: Option<bool>,
}

/// A `UserRole` join record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: Option<Uuid>,
}

/// Returns true if `slug` is a well-formed role slug: lowercase ASCII
/// letters, digits and single hyphens, not starting or ending with `-`.
pub fn is_valid_role_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 64
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_slug_validation() {
        assert!(is_valid_role_slug("admin"));
        assert!(is_valid_role_slug("super-admin"));
        assert!(is_valid_role_slug("tier-2"));
        assert!(!is_valid_role_slug(""));
        assert!(!is_valid_role_slug("-admin"));
        assert!(!is_valid_role_slug("Admin"));
        assert!(!is_valid_role_slug("ad min"));
        assert!(!is_valid_role_slug("a--b"));
    }
}
