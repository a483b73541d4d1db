//! Schema definitions and migration runner for SurrealDB.
//!
//! Every table is SCHEMAFULL. UUIDs are stored as strings and
//! organization references are `option<string>`, where NONE marks a
//! system-wide row. Join records (`has_role`, `grants`) are graph edges
//! with a unique `(in, out)` index, which gives them composite identity.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1 — initial table definitions
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Organizations (tenant boundary)
-- =======================================================================
DEFINE TABLE organization SCHEMAFULL;
DEFINE FIELD name ON TABLE organization TYPE string;
DEFINE FIELD slug ON TABLE organization TYPE string;
DEFINE FIELD domain ON TABLE organization TYPE option<string>;
DEFINE FIELD settings ON TABLE organization TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD created_at ON TABLE organization TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE organization TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_organization_slug ON TABLE organization \
    COLUMNS slug UNIQUE;

-- =======================================================================
-- Users (organization scope, NONE = cross-tenant)
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD organization_id ON TABLE user TYPE option<string>;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD name ON TABLE user TYPE option<string>;
DEFINE FIELD password_hash ON TABLE user TYPE string;
DEFINE FIELD two_factor_enabled ON TABLE user TYPE bool DEFAULT false;
DEFINE FIELD two_factor_secret ON TABLE user TYPE option<string>;
DEFINE FIELD created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_org_email ON TABLE user \
    COLUMNS organization_id, email UNIQUE;

-- =======================================================================
-- Roles (organization scope, NONE = system-wide)
-- =======================================================================
DEFINE TABLE role SCHEMAFULL;
DEFINE FIELD organization_id ON TABLE role TYPE option<string>;
DEFINE FIELD slug ON TABLE role TYPE string;
DEFINE FIELD name ON TABLE role TYPE string;
DEFINE FIELD description ON TABLE role TYPE option<string>;
DEFINE FIELD is_default ON TABLE role TYPE bool DEFAULT false;
DEFINE FIELD created_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_role_org_slug ON TABLE role \
    COLUMNS organization_id, slug UNIQUE;

-- =======================================================================
-- Permissions (global)
-- =======================================================================
DEFINE TABLE permission SCHEMAFULL;
DEFINE FIELD slug ON TABLE permission TYPE string;
DEFINE FIELD resource ON TABLE permission TYPE string;
DEFINE FIELD action ON TABLE permission TYPE string;
DEFINE FIELD description ON TABLE permission TYPE option<string>;
DEFINE FIELD created_at ON TABLE permission TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_permission_slug ON TABLE permission \
    COLUMNS slug UNIQUE;

-- =======================================================================
-- Recovery codes (per user, single use)
-- =======================================================================
DEFINE TABLE recovery_code SCHEMAFULL;
DEFINE FIELD user_id ON TABLE recovery_code TYPE string;
DEFINE FIELD code ON TABLE recovery_code TYPE string;
DEFINE FIELD used ON TABLE recovery_code TYPE bool DEFAULT false;
DEFINE FIELD used_at ON TABLE recovery_code TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE recovery_code TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_recovery_code_code ON TABLE recovery_code \
    COLUMNS code UNIQUE;
DEFINE INDEX idx_recovery_code_user ON TABLE recovery_code \
    COLUMNS user_id, used;

-- =======================================================================
-- Audit Log (append-only)
-- =======================================================================
DEFINE TABLE audit_log SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD actor_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD organization_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD action ON TABLE audit_log TYPE string;
DEFINE FIELD outcome ON TABLE audit_log TYPE string \
    ASSERT $value IN ['Success', 'Failure', 'Denied'];
DEFINE FIELD metadata ON TABLE audit_log TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD timestamp ON TABLE audit_log TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_org_time ON TABLE audit_log \
    COLUMNS organization_id, timestamp;
DEFINE INDEX idx_audit_actor ON TABLE audit_log \
    COLUMNS actor_id;

-- =======================================================================
-- Graph Edge Tables (join records)
-- =======================================================================

-- User -> Role assignment (UserRole)
DEFINE TABLE has_role TYPE RELATION SCHEMAFULL;
DEFINE FIELD assigned_at ON TABLE has_role TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD assigned_by ON TABLE has_role TYPE option<string>;
DEFINE INDEX idx_has_role_pair ON TABLE has_role \
    COLUMNS in, out UNIQUE;

-- Role -> Permission grants (RolePermission)
DEFINE TABLE grants TYPE RELATION SCHEMAFULL;
DEFINE INDEX idx_grants_pair ON TABLE grants \
    COLUMNS in, out UNIQUE;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Highest applied migration version, 0 on a fresh database.
pub async fn current_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    Ok(records.first().map(|m| m.version).unwrap_or(0))
}

/// Run all pending migrations against the given SurrealDB client.
///
/// Each pending migration and its `_migration` record are applied in one
/// transaction, so a failed migration leaves no partial schema behind.
/// Re-running on an up-to-date database is a no-op.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    let current = current_version(db).await?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );

        let sql = format!(
            "BEGIN TRANSACTION; {} \
             CREATE _migration SET version = $version, name = $name; \
             COMMIT TRANSACTION;",
            migration.sql
        );
        db.query(sql)
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

        info!(version = migration.version, "Migration applied");
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn uniqueness_constraints_are_declared() {
        for index in [
            "idx_organization_slug ON TABLE organization COLUMNS slug UNIQUE",
            "idx_user_org_email ON TABLE user COLUMNS organization_id, email UNIQUE",
            "idx_role_org_slug ON TABLE role COLUMNS organization_id, slug UNIQUE",
            "idx_permission_slug ON TABLE permission COLUMNS slug UNIQUE",
            "idx_recovery_code_code ON TABLE recovery_code COLUMNS code UNIQUE",
            "idx_has_role_pair ON TABLE has_role COLUMNS in, out UNIQUE",
            "idx_grants_pair ON TABLE grants COLUMNS in, out UNIQUE",
        ] {
            assert!(SCHEMA_V1.contains(index), "missing constraint: {index}");
        }
    }
}
