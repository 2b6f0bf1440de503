//! Authentication: password verification, login throttling and sessions

pub mod extract;
pub mod password;
pub mod session;

use tracing::{info, warn};

use crate::gateway::{GatewayError, QueryGateway};
use crate::types::UserRecord;

pub use extract::SessionAuth;
pub use password::{hash_password, verify_password};
pub use session::{spawn_session_cleanup, LoginAttempts, Session, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Username and password are required")]
    MissingCredentials,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Too many failed login attempts, try again later")]
    TooManyAttempts,

    #[error("An error occurred during login")]
    Storage(#[from] GatewayError),
}

/// Check a user name and password against the user table.
///
/// Failed attempts count towards the per-name lockout; a success clears it.
/// Unknown names are checked against `decoy_hash` so they cost the same
/// key derivation as known ones.
pub async fn authenticate(
    gateway: &dyn QueryGateway,
    attempts: &LoginAttempts,
    decoy_hash: &str,
    name: &str,
    password: &str,
) -> Result<UserRecord, AuthError> {
    let name = name.trim();
    if name.is_empty() || password.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    if attempts.is_locked(name) {
        warn!(user = %name, "Login refused, too many failures");
        return Err(AuthError::TooManyAttempts);
    }

    let verified = match gateway.find_user(name).await? {
        Some(stored) => verify_password(password, &stored.password_hash).then_some(stored),
        None => {
            verify_password(password, decoy_hash);
            None
        }
    };
    let Some(stored) = verified else {
        attempts.record_failure(name);
        warn!(user = %name, "Login failed");
        return Err(AuthError::InvalidCredentials);
    };

    attempts.clear(name);
    info!(user = %stored.user.name, "Login succeeded");
    Ok(stored.user)
}
