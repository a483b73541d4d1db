//! SurrealDB implementation of [`PermissionRepository`].

use bastion_core::error::BastionResult;
use bastion_core::models::permission::{CreatePermission, Permission};
use bastion_core::repository::PermissionRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_uuid};

#[derive(Debug, SurrealValue)]
struct PermissionRow {
    slug: String,
    resource: String,
    action: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct PermissionRowWithId {
    record_id: String,
    slug: String,
    resource: String,
    action: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl PermissionRowWithId {
    fn try_into_permission(self) -> Result<Permission, DbError> {
        Ok(Permission {
            id: parse_uuid("permission", &self.record_id)?,
            slug: self.slug,
            resource: self.resource,
            action: self.action,
            description: self.description,
            created_at: self.created_at,
        })
    }
}

/// SurrealDB implementation of the Permission repository.
pub struct SurrealPermissionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealPermissionRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealPermissionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> PermissionRepository for SurrealPermissionRepository<C> {
    async fn create(&self, input: CreatePermission) -> BastionResult<Permission> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('permission', $id) SET \
                 slug = $slug, resource = $resource, \
                 action = $action, description = $description",
            )
            .bind(("id", id_str.clone()))
            .bind(("slug", input.slug))
            .bind(("resource", input.resource))
            .bind(("action", input.action))
            .bind(("description", input.description))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_check("permission", e))?;

        let rows: Vec<PermissionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "permission".into(),
            id: id_str,
        })?;

        Ok(Permission {
            id,
            slug: row.slug,
            resource: row.resource,
            action: row.action,
            description: row.description,
            created_at: row.created_at,
        })
    }

    async fn get_by_slug(&self, slug: &str) -> BastionResult<Permission> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM permission \
                 WHERE slug = $slug",
            )
            .bind(("slug", slug.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "permission".into(),
            id: format!("slug={slug}"),
        })?;

        Ok(row.try_into_permission()?)
    }

    async fn list(&self) -> BastionResult<Vec<Permission>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM permission ORDER BY slug ASC")
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;

        let permissions = rows
            .into_iter()
            .map(|row| row.try_into_permission())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(permissions)
    }

    async fn grant_to_role(&self, role_id: Uuid, permission_id: Uuid) -> BastionResult<()> {
        let role_id_str = role_id.to_string();
        let perm_id_str = permission_id.to_string();

        let query = format!(
            "IF array::len(SELECT * FROM grants WHERE \
                 in = role:`{role_id_str}` AND out = permission:`{perm_id_str}`) = 0 {{ \
                 RELATE role:`{role_id_str}` -> grants -> permission:`{perm_id_str}`; \
             }};"
        );

        let result = self.db.query(query).await.map_err(DbError::from)?;

        match result.check() {
            Ok(_) => Ok(()),
            Err(e) => match DbError::from_check("grants", e) {
                // Lost a race against an identical grant.
                DbError::Duplicate { .. } => Ok(()),
                other => Err(other.into()),
            },
        }
    }

    async fn revoke_from_role(&self, role_id: Uuid, permission_id: Uuid) -> BastionResult<()> {
        self.db
            .query(
                "DELETE grants WHERE \
                 in = type::record('role', $role_id) AND \
                 out = type::record('permission', $perm_id)",
            )
            .bind(("role_id", role_id.to_string()))
            .bind(("perm_id", permission_id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn get_role_permissions(&self, role_id: Uuid) -> BastionResult<Vec<Permission>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM permission \
                 WHERE id IN (\
                     SELECT VALUE out FROM grants \
                     WHERE in = type::record('role', $role_id)\
                 ) \
                 ORDER BY slug ASC",
            )
            .bind(("role_id", role_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;

        let permissions = rows
            .into_iter()
            .map(|row| row.try_into_permission())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(permissions)
    }
}
