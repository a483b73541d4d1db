//! Bastion Database: the SurrealDB persistence gateway.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Error types ([`DbError`])
//! - Implementations of every `bastion-core` repository trait

mod connection;
mod error;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use repository::{
    SurrealAuditLogRepository, SurrealAuditSink, SurrealOrganizationRepository,
    SurrealPermissionRepository, SurrealRoleRepository, SurrealTwoFactorRepository,
    SurrealUserRepository,
};
pub use schema::{current_version, run_migrations, schema_v1};
