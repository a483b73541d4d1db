//! SurrealDB implementation of [`RoleRepository`].
//!
//! Assignments are `has_role` graph edges from `user` to `role`. The edge
//! table carries a unique `(in, out)` index, so a pair can exist once.

use bastion_core::error::BastionResult;
use bastion_core::models::role::{CreateRole, Role, RoleAssignment, UpdateRole};
use bastion_core::repository::RoleRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_opt_uuid, parse_uuid};

#[derive(Debug, SurrealValue)]
struct RoleRow {
    organization_id: Option<String>,
    slug: String,
    name: String,
    description: Option<String>,
    is_default: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RoleRow {
    fn try_into_role(self, id: Uuid) -> Result<Role, DbError> {
        Ok(Role {
            id,
            organization_id: parse_opt_uuid("organization", self.organization_id.as_deref())?,
            slug: self.slug,
            name: self.name,
            description: self.description,
            is_default: self.is_default,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct RoleRowWithId {
    record_id: String,
    organization_id: Option<String>,
    slug: String,
    name: String,
    description: Option<String>,
    is_default: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RoleRowWithId {
    fn try_into_role(self) -> Result<Role, DbError> {
        let id = parse_uuid("role", &self.record_id)?;
        RoleRow {
            organization_id: self.organization_id,
            slug: self.slug,
            name: self.name,
            description: self.description,
            is_default: self.is_default,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .try_into_role(id)
    }
}

#[derive(Debug, SurrealValue)]
struct AssignmentRow {
    user_id: String,
    role_id: String,
    assigned_at: DateTime<Utc>,
    assigned_by: Option<String>,
}

impl AssignmentRow {
    fn try_into_assignment(self) -> Result<RoleAssignment, DbError> {
        Ok(RoleAssignment {
            user_id: parse_uuid("user", &self.user_id)?,
            role_id: parse_uuid("role", &self.role_id)?,
            assigned_at: self.assigned_at,
            assigned_by: parse_opt_uuid("assigned_by", self.assigned_by.as_deref())?,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// SurrealDB implementation of the Role repository.
pub struct SurrealRoleRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealRoleRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealRoleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn assignment_exists(&self, user_id: &str, role_id: &str) -> Result<bool, DbError> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM has_role \
                 WHERE in = type::record('user', $user_id) \
                 AND out = type::record('role', $role_id) GROUP ALL",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("role_id", role_id.to_string()))
            .await?;
        let rows: Vec<CountRow> = result.take(0)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0) > 0)
    }
}

impl<C: Connection> RoleRepository for SurrealRoleRepository<C> {
    async fn create(&self, input: CreateRole) -> BastionResult<Role> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('role', $id) SET \
                 organization_id = $organization_id, \
                 slug = $slug, name = $name, \
                 description = $description, is_default = $is_default",
            )
            .bind(("id", id_str.clone()))
            .bind((
                "organization_id",
                input.organization_id.map(|o| o.to_string()),
            ))
            .bind(("slug", input.slug))
            .bind(("name", input.name))
            .bind(("description", input.description))
            .bind(("is_default", input.is_default))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::from_check("role", e))?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "role".into(),
            id: id_str,
        })?;

        Ok(row.try_into_role(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> BastionResult<Role> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('role', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "role".into(),
            id: id_str,
        })?;

        Ok(row.try_into_role(id)?)
    }

    async fn get_by_slug(&self, organization_id: Option<Uuid>, slug: &str) -> BastionResult<Role> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM role \
                 WHERE organization_id = $organization_id AND slug = $slug",
            )
            .bind(("organization_id", organization_id.map(|o| o.to_string())))
            .bind(("slug", slug.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "role".into(),
            id: format!("slug={slug}"),
        })?;

        Ok(row.try_into_role()?)
    }

    async fn update(&self, id: Uuid, input: UpdateRole) -> BastionResult<Role> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.description.is_some() {
            sets.push("description = $description");
        }
        if input.is_default.is_some() {
            sets.push("is_default = $is_default");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('role', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));

        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(description) = input.description {
            builder = builder.bind(("description", description));
        }
        if let Some(is_default) = input.is_default {
            builder = builder.bind(("is_default", is_default));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_check("role", e))?;

        let rows: Vec<RoleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "role".into(),
            id: id_str,
        })?;

        Ok(row.try_into_role(id)?)
    }

    async fn list(&self, organization_id: Option<Uuid>) -> BastionResult<Vec<Role>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM role \
                 WHERE organization_id = $organization_id \
                 ORDER BY slug ASC",
            )
            .bind(("organization_id", organization_id.map(|o| o.to_string())))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;

        let roles = rows
            .into_iter()
            .map(|row| row.try_into_role())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(roles)
    }

    async fn assign_to_user(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> BastionResult<bool> {
        let user_id_str = user_id.to_string();
        let role_id_str = role_id.to_string();

        if self.assignment_exists(&user_id_str, &role_id_str).await? {
            return Ok(false);
        }

        let query = format!(
            "RELATE user:`{user_id_str}` -> has_role -> role:`{role_id_str}` \
             SET assigned_by = $assigned_by;"
        );

        let result = self
            .db
            .query(query)
            .bind(("assigned_by", assigned_by.map(|a| a.to_string())))
            .await
            .map_err(DbError::from)?;

        // A concurrent writer may have won the race to the unique pair index.
        match result.check() {
            Ok(_) => Ok(true),
            Err(e) => match DbError::from_check("has_role", e) {
                DbError::Duplicate { .. } => Ok(false),
                other => Err(other.into()),
            },
        }
    }

    async fn unassign_from_user(&self, user_id: Uuid, role_id: Uuid) -> BastionResult<bool> {
        let mut result = self
            .db
            .query(
                "DELETE has_role WHERE \
                 in = type::record('user', $user_id) AND \
                 out = type::record('role', $role_id) \
                 RETURN BEFORE",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("role_id", role_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let deleted: Vec<serde_json::Value> = result.take(0).map_err(DbError::from)?;
        Ok(!deleted.is_empty())
    }

    async fn get_user_roles(
        &self,
        user_id: Uuid,
        organization_id: Option<Uuid>,
    ) -> BastionResult<Vec<Role>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM role \
                 WHERE organization_id = $organization_id \
                 AND id IN (\
                     SELECT VALUE out FROM has_role \
                     WHERE in = type::record('user', $user_id)\
                 ) \
                 ORDER BY slug ASC",
            )
            .bind(("organization_id", organization_id.map(|o| o.to_string())))
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;

        let roles = rows
            .into_iter()
            .map(|row| row.try_into_role())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(roles)
    }

    async fn get_user_assignments(&self, user_id: Uuid) -> BastionResult<Vec<RoleAssignment>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(in) AS user_id, meta::id(out) AS role_id, \
                 assigned_at, assigned_by FROM has_role \
                 WHERE in = type::record('user', $user_id) \
                 ORDER BY assigned_at ASC",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AssignmentRow> = result.take(0).map_err(DbError::from)?;

        let assignments = rows
            .into_iter()
            .map(|row| row.try_into_assignment())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(assignments)
    }
}
