//! Error types for the Bastion system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BastionError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    /// No authenticated principal. The message is fixed and never reveals
    /// whether an account exists.
    #[error("Authentication required")]
    AuthenticationFailed { reason: String },

    /// Permission or role check failed. `message` is user-facing and must
    /// not name the missing permission.
    #[error("{message}")]
    AuthorizationDenied { message: String, status: u16 },

    /// Input rejected. Only field names are carried, never raw values.
    #[error("Validation failed for: {}", fields.join(", "))]
    Validation { fields: Vec<String> },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Tenant not found or invalid")]
    TenantContext,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BastionError {
    /// Authorization failure with the default 403 status.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::AuthorizationDenied {
            message: message.into(),
            status: 403,
        }
    }

    pub fn validation<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Validation {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// HTTP status the outer layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::AlreadyExists { .. } => 409,
            Self::AuthenticationFailed { .. } => 401,
            Self::AuthorizationDenied { status, .. } => *status,
            Self::Validation { .. } | Self::TenantContext => 400,
            Self::RateLimited => 429,
            Self::Configuration(_)
            | Self::Database(_)
            | Self::Crypto(_)
            | Self::Internal(_) => 500,
        }
    }

    /// True for client-side failures (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

pub type BastionResult<T> = Result<T, BastionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_message_is_generic() {
        let err = BastionError::AuthenticationFailed {
            reason: "no user for alice@example.com".into(),
        };
        assert_eq!(err.to_string(), "Authentication required");
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn authorization_status_is_overridable() {
        let err = BastionError::AuthorizationDenied {
            message: "Not here".into(),
            status: 404,
        };
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "Not here");
        assert_eq!(BastionError::forbidden("x").status_code(), 403);
    }

    #[test]
    fn validation_lists_fields_only() {
        let err = BastionError::validation(["code", "role_slug"]);
        assert_eq!(err.to_string(), "Validation failed for: code, role_slug");
        assert!(err.is_client_error());
    }

    #[test]
    fn tenant_context_is_bad_request() {
        let err = BastionError::TenantContext;
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "Tenant not found or invalid");
    }

    #[test]
    fn infrastructure_errors_are_server_side() {
        assert!(!BastionError::Database("down".into()).is_client_error());
        assert_eq!(BastionError::RateLimited.status_code(), 429);
    }
}
