//! Append-only audit log storage, plus an [`AuditSink`] that writes to it
//! in the background.

use bastion_core::capability::AuditSink;
use bastion_core::error::BastionResult;
use bastion_core::models::audit::{AuditEvent, AuditLogEntry, AuditOutcome};
use bastion_core::repository::{AuditLogFilter, AuditLogRepository, PaginatedResult, Pagination};
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::warn;
use uuid::Uuid;

use crate::error::{DbError, parse_opt_uuid, parse_uuid};

#[derive(Debug, SurrealValue)]
struct AuditRowWithId {
    record_id: String,
    actor_id: Option<String>,
    organization_id: Option<String>,
    action: String,
    outcome: String,
    metadata: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl AuditRowWithId {
    fn try_into_entry(self) -> Result<AuditLogEntry, DbError> {
        let outcome = match self.outcome.as_str() {
            "Success" => AuditOutcome::Success,
            "Failure" => AuditOutcome::Failure,
            "Denied" => AuditOutcome::Denied,
            other => return Err(DbError::Decode(format!("unknown audit outcome: {other}"))),
        };
        Ok(AuditLogEntry {
            id: parse_uuid("audit_log", &self.record_id)?,
            actor_id: parse_opt_uuid("actor", self.actor_id.as_deref())?,
            organization_id: parse_opt_uuid("organization", self.organization_id.as_deref())?,
            action: self.action,
            outcome,
            metadata: self.metadata,
            timestamp: self.timestamp,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// SurrealDB implementation of the audit log repository.
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealAuditLogRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn append(&self, input: AuditEvent) -> BastionResult<AuditLogEntry> {
        let id_str = Uuid::new_v4().to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('audit_log', $id) SET \
                 actor_id = $actor_id, organization_id = $organization_id, \
                 action = $action, outcome = $outcome, metadata = $metadata \
                 RETURN meta::id(id) AS record_id, *",
            )
            .bind(("id", id_str.clone()))
            .bind(("actor_id", input.actor_id.map(|a| a.to_string())))
            .bind((
                "organization_id",
                input.organization_id.map(|o| o.to_string()),
            ))
            .bind(("action", input.action))
            .bind(("outcome", input.outcome.as_str()))
            .bind(("metadata", input.metadata))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<AuditRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "audit_log".into(),
            id: id_str,
        })?;

        Ok(row.try_into_entry()?)
    }

    async fn list(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> BastionResult<PaginatedResult<AuditLogEntry>> {
        let mut conditions = Vec::new();
        if filter.actor_id.is_some() {
            conditions.push("actor_id = $actor_id");
        }
        if filter.organization_id.is_some() {
            conditions.push("organization_id = $organization_id");
        }
        if filter.action.is_some() {
            conditions.push("action = $action");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT count() AS total FROM audit_log {where_clause} GROUP ALL; \
             SELECT meta::id(id) AS record_id, * FROM audit_log {where_clause} \
             ORDER BY timestamp DESC LIMIT $limit START $offset;"
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));
        if let Some(actor_id) = filter.actor_id {
            builder = builder.bind(("actor_id", actor_id.to_string()));
        }
        if let Some(organization_id) = filter.organization_id {
            builder = builder.bind(("organization_id", organization_id.to_string()));
        }
        if let Some(action) = filter.action {
            builder = builder.bind(("action", action));
        }

        let mut result = builder.await.map_err(DbError::from)?;

        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let rows: Vec<AuditRowWithId> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(|row| row.try_into_entry())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

/// [`AuditSink`] that appends each event to the audit log on a spawned
/// task. Write failures are logged and otherwise ignored.
pub struct SurrealAuditSink<C: Connection> {
    repo: SurrealAuditLogRepository<C>,
}

impl<C: Connection> Clone for SurrealAuditSink<C> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
        }
    }
}

impl<C: Connection> SurrealAuditSink<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            repo: SurrealAuditLogRepository::new(db),
        }
    }
}

impl<C: Connection> AuditSink for SurrealAuditSink<C> {
    fn emit(&self, event: AuditEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(action = %event.action, "No async runtime, audit event dropped");
            return;
        };

        let repo = self.repo.clone();
        handle.spawn(async move {
            let action = event.action.clone();
            if let Err(e) = repo.append(event).await {
                warn!(action = %action, error = %e, "Failed to persist audit event");
            }
        });
    }
}
