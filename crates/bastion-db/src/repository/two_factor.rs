//! SurrealDB implementation of [`TwoFactorRepository`].
//!
//! The 2FA flag and secret live on the `user` record, recovery codes in
//! the `recovery_code` table. Every write that touches both runs in one
//! transaction.

use bastion_core::error::{BastionError, BastionResult};
use bastion_core::models::recovery_code::{RecoveryCode, TwoFactorState};
use bastion_core::repository::TwoFactorRepository;
use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_uuid};

const GUARD_FAILED: &str = "two-factor target user is missing or not enrolled";

#[derive(Debug, SurrealValue)]
struct StateRow {
    email: String,
    two_factor_enabled: bool,
    two_factor_secret: Option<String>,
}

#[derive(Debug, SurrealValue)]
struct RecoveryCodeRowWithId {
    record_id: String,
    user_id: String,
    code: String,
    used: bool,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl RecoveryCodeRowWithId {
    fn try_into_code(self) -> Result<RecoveryCode, DbError> {
        Ok(RecoveryCode {
            id: parse_uuid("recovery_code", &self.record_id)?,
            user_id: parse_uuid("user", &self.user_id)?,
            code: self.code,
            used: self.used,
            used_at: self.used_at,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// SurrealDB implementation of the two-factor repository.
pub struct SurrealTwoFactorRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> Clone for SurrealTwoFactorRepository<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<C: Connection> SurrealTwoFactorRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Run a transactional script. When the script's guard throws, the
    /// user is looked up again to report `NotFound` or, for scripts that
    /// need 2FA enabled, a validation error.
    async fn run_transaction(
        &self,
        sql: &'static str,
        user_id: Uuid,
        secret: Option<String>,
        codes: Vec<String>,
    ) -> BastionResult<()> {
        let result = self
            .db
            .query(sql)
            .bind(("user_id", user_id.to_string()))
            .bind(("secret", secret))
            .bind(("codes", codes))
            .bind(("missing", GUARD_FAILED))
            .await
            .map_err(DbError::from)?;

        // Statements after a THROW report a generic transaction failure, so
        // the guard's message cannot be relied on to surface first.
        let Err(e) = result.check() else {
            return Ok(());
        };
        match self.get_state(user_id).await {
            Err(BastionError::NotFound { entity, id }) => Err(BastionError::NotFound { entity, id }),
            Ok(state) if !state.enabled && sql == REPLACE_CODES_SQL => {
                Err(BastionError::validation(["two_factor_enabled"]))
            }
            _ => Err(DbError::from_check("recovery_code", e).into()),
        }
    }
}

const ENABLE_SQL: &str = "\
BEGIN TRANSACTION;
LET $user = (UPDATE type::record('user', $user_id) SET \
    two_factor_enabled = true, two_factor_secret = $secret, \
    updated_at = time::now() RETURN AFTER);
IF array::len($user) = 0 { THROW $missing; };
DELETE recovery_code WHERE user_id = $user_id;
FOR $code IN $codes {
    CREATE type::record('recovery_code', <string> rand::uuid::v4()) \
        SET user_id = $user_id, code = $code, used = false;
};
COMMIT TRANSACTION;
";

const DISABLE_SQL: &str = "\
BEGIN TRANSACTION;
LET $user = (UPDATE type::record('user', $user_id) SET \
    two_factor_enabled = false, two_factor_secret = NONE, \
    updated_at = time::now() RETURN AFTER);
IF array::len($user) = 0 { THROW $missing; };
DELETE recovery_code WHERE user_id = $user_id;
COMMIT TRANSACTION;
";

const REPLACE_CODES_SQL: &str = "\
BEGIN TRANSACTION;
LET $user = (SELECT id FROM type::record('user', $user_id) \
    WHERE two_factor_enabled = true);
IF array::len($user) = 0 { THROW $missing; };
DELETE recovery_code WHERE user_id = $user_id AND used = false;
FOR $code IN $codes {
    CREATE type::record('recovery_code', <string> rand::uuid::v4()) \
        SET user_id = $user_id, code = $code, used = false;
};
COMMIT TRANSACTION;
";

impl<C: Connection> TwoFactorRepository for SurrealTwoFactorRepository<C> {
    async fn get_state(&self, user_id: Uuid) -> BastionResult<TwoFactorState> {
        let id_str = user_id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT email, two_factor_enabled, two_factor_secret \
                 FROM type::record('user', $id)",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<StateRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(TwoFactorState {
            user_id,
            email: row.email,
            enabled: row.two_factor_enabled,
            secret: row.two_factor_secret,
        })
    }

    async fn enable(&self, user_id: Uuid, secret: String, codes: Vec<String>) -> BastionResult<()> {
        self.run_transaction(ENABLE_SQL, user_id, Some(secret), codes)
            .await
    }

    async fn disable(&self, user_id: Uuid) -> BastionResult<()> {
        self.run_transaction(DISABLE_SQL, user_id, None, Vec::new())
            .await
    }

    async fn replace_unused_codes(&self, user_id: Uuid, codes: Vec<String>) -> BastionResult<()> {
        self.run_transaction(REPLACE_CODES_SQL, user_id, None, codes)
            .await
    }

    async fn find_unused_code(&self, user_id: Uuid, code: &str) -> BastionResult<Option<RecoveryCode>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM recovery_code \
                 WHERE user_id = $user_id AND code = $code AND used = false \
                 LIMIT 1",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("code", code.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RecoveryCodeRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.try_into_code())
            .transpose()?)
    }

    async fn consume_code(&self, code_id: Uuid) -> BastionResult<bool> {
        // The WHERE guard makes the second of two concurrent consumers a no-op.
        let mut result = self
            .db
            .query(
                "UPDATE type::record('recovery_code', $id) \
                 SET used = true, used_at = time::now() \
                 WHERE used = false \
                 RETURN meta::id(id) AS record_id, *",
            )
            .bind(("id", code_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RecoveryCodeRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(!rows.is_empty())
    }

    async fn count_unused(&self, user_id: Uuid) -> BastionResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM recovery_code \
                 WHERE user_id = $user_id AND used = false GROUP ALL",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    async fn list_codes(&self, user_id: Uuid) -> BastionResult<Vec<RecoveryCode>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM recovery_code \
                 WHERE user_id = $user_id ORDER BY created_at ASC",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RecoveryCodeRowWithId> = result.take(0).map_err(DbError::from)?;

        let codes = rows
            .into_iter()
            .map(|row| row.try_into_code())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(codes)
    }
}
