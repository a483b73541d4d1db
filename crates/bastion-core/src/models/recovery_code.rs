//! Recovery (backup) code domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single-use 2FA fallback credential.
///
/// Once `used` is set the code never matches again; used codes are kept
/// as history and only removed when 2FA is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Persisted 2FA state of a user, as read by the two-factor engine.
#[derive(Debug, Clone)]
pub struct TwoFactorState {
    pub user_id: Uuid,
    pub email: String,
    pub enabled: bool,
    pub secret: Option<String>,
}
