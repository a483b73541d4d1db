//! Auth-layer error types.

use bastion_core::error::BastionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid TOTP secret: {0}")]
    InvalidSecret(String),

    #[error("TOTP provisioning failed: {0}")]
    Provisioning(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<AuthError> for BastionError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Config(msg) => BastionError::Configuration(msg),
            AuthError::InvalidSecret(_)
            | AuthError::Provisioning(_)
            | AuthError::Hashing(_)
            | AuthError::Crypto(_) => BastionError::Crypto(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_stay_configuration() {
        let err: BastionError = AuthError::Config("bad key".into()).into();
        assert!(matches!(err, BastionError::Configuration(ref m) if m == "bad key"));
    }

    #[test]
    fn crypto_errors_are_server_side() {
        let err: BastionError = AuthError::InvalidSecret("not base32".into()).into();
        assert!(matches!(err, BastionError::Crypto(_)));
        assert_eq!(err.status_code(), 500);
    }
}
