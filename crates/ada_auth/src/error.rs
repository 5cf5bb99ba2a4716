//! Auth manager error types

use thiserror::Error;

/// Internal error taxonomy. The UI layer only ever sees the rendered
/// message string via [`crate::AuthState::error`].
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Connection failed: {0}")]
    Connection(#[from] ada_client::ClientError),

    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Validation(String),

    #[error("Login response did not include a token")]
    MissingToken,

    #[error("Storage error: {0}")]
    Prefs(#[from] ada_prefs::PrefsError),
}
