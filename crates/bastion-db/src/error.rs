//! Database-specific error types and conversions.

use bastion_core::error::BastionError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Invalid stored value: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Unique constraint violated on {entity}")]
    Duplicate { entity: String },
}

impl DbError {
    /// Classify a failed statement: unique index violations become
    /// [`DbError::Duplicate`], everything else [`DbError::Query`].
    pub(crate) fn from_check(entity: &str, err: surrealdb::Error) -> Self {
        let msg = err.to_string();
        if msg.contains("already contains") {
            DbError::Duplicate {
                entity: entity.to_string(),
            }
        } else {
            DbError::Query(msg)
        }
    }
}

impl From<DbError> for BastionError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => BastionError::NotFound { entity, id },
            DbError::Duplicate { entity } => BastionError::AlreadyExists { entity },
            other => BastionError::Database(other.to_string()),
        }
    }
}

/// Parse a UUID stored as a string.
pub(crate) fn parse_uuid(field: &str, raw: &str) -> Result<uuid::Uuid, DbError> {
    uuid::Uuid::parse_str(raw).map_err(|e| DbError::Decode(format!("invalid {field} UUID: {e}")))
}

/// Parse an optional UUID stored as an optional string.
pub(crate) fn parse_opt_uuid(
    field: &str,
    raw: Option<&str>,
) -> Result<Option<uuid::Uuid>, DbError> {
    raw.map(|r| parse_uuid(field, r)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_core_not_found() {
        let err: BastionError = DbError::NotFound {
            entity: "role".into(),
            id: "x".into(),
        }
        .into();
        assert!(matches!(err, BastionError::NotFound { .. }));
    }

    #[test]
    fn duplicate_maps_to_already_exists() {
        let err: BastionError = DbError::Duplicate {
            entity: "organization".into(),
        }
        .into();
        assert!(matches!(err, BastionError::AlreadyExists { .. }));
    }

    #[test]
    fn uuid_parsing() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(parse_uuid("user", &id.to_string()).unwrap(), id);
        assert!(parse_uuid("user", "nope").is_err());
        assert_eq!(parse_opt_uuid("org", None).unwrap(), None);
    }
}
