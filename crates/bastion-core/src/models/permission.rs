//! Permission domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: Uuid,
    /// Globally unique dotted slug, `resource.action` (e.g. `users.manage`).
    pub slug: String,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePermission {
    pub slug: String,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
}

impl CreatePermission {
    /// Build a permission from its dotted slug. Returns `None` unless the
    /// slug has the `resource.action` shape.
    pub fn from_slug(slug: &str, description: Option<String>) -> Option<Self> {
        let (resource, action) = split_slug(slug)?;
        Some(Self {
            slug: slug.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
            description,
        })
    }
}

/// Split `resource.action` at the first dot. Both halves must be non-empty.
pub fn split_slug(slug: &str) -> Option<(&str, &str)> {
    let (resource, action) = slug.split_once('.')?;
    if resource.is_empty() || action.is_empty() {
        return None;
    }
    Some((resource, action))
}

/// What a permission check asks for: either a slug or a resource/action pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionCheck {
    Slug(String),
    Pair { resource: String, action: String },
}

impl PermissionCheck {
    pub fn pair(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self::Pair {
            resource: resource.into(),
            action: action.into(),
        }
    }

    pub fn matches(&self, permission: &Permission) -> bool {
        match self {
            Self::Slug(slug) => permission.slug == *slug,
            Self::Pair { resource, action } => {
                permission.resource == *resource && permission.action == *action
            }
        }
    }
}

impl std::fmt::Display for PermissionCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slug(slug) => f.write_str(slug),
            Self::Pair { resource, action } => write!(f, "{resource}.{action}"),
        }
    }
}

impl From<&str> for PermissionCheck {
    fn from(slug: &str) -> Self {
        Self::Slug(slug.to_string())
    }
}

impl From<String> for PermissionCheck {
    fn from(slug: String) -> Self {
        Self::Slug(slug)
    }
}

impl From<(&str, &str)> for PermissionCheck {
    fn from((resource, action): (&str, &str)) -> Self {
        Self::pair(resource, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permission(slug: &str) -> Permission {
        let (resource, action) = split_slug(slug).unwrap();
        Permission {
            id: Uuid::new_v4(),
            slug: slug.into(),
            resource: resource.into(),
            action: action.into(),
            description: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn slug_and_pair_checks_match() {
        let p = permission("users.manage");
        assert!(PermissionCheck::from("users.manage").matches(&p));
        assert!(PermissionCheck::from(("users", "manage")).matches(&p));
        assert!(!PermissionCheck::from("users.view").matches(&p));
        assert!(!PermissionCheck::pair("roles", "manage").matches(&p));
    }

    #[test]
    fn split_requires_both_halves() {
        assert_eq!(split_slug("audit.view-all"), Some(("audit", "view-all")));
        assert_eq!(split_slug("nodot"), None);
        assert_eq!(split_slug(".view"), None);
        assert_eq!(split_slug("users."), None);
    }

    #[test]
    fn from_slug_builds_parts() {
        let p = CreatePermission::from_slug("organizations.manage-all", None).unwrap();
        assert_eq!(p.resource, "organizations");
        assert_eq!(p.action, "manage-all");
        assert!(CreatePermission::from_slug("bogus", None).is_none());
    }
}
