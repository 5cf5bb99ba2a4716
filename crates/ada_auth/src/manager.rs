//! Login, registration, biometric unlock and logout orchestration.
//!
//! Authentication state is one atomically-overwritten published value;
//! the UI layer subscribes and re-renders on change. Errors of every
//! flavor (connection, rejection, validation) collapse to one
//! human-readable string for display.

use std::sync::Arc;

use ada_client::ServerClient;
use ada_prefs::PrefStore;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{info, warn};
use serde_json::{json, Value};
use tokio::sync::watch;
use uuid::Uuid;

use crate::biometric::BiometricVerifier;
use crate::enrollment::EnrollmentData;
use crate::error::AuthError;

const DEFAULT_LOGIN_ERROR: &str = "Login failed";
const DEFAULT_ENROLL_ERROR: &str = "Enrollment failed";
const SESSION_EXPIRED: &str = "Session expired. Please login with passcode.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
}

/// Published authentication state.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub authenticated: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub user: Option<User>,
}

pub struct AuthManager {
    prefs: Arc<PrefStore>,
    client: Arc<ServerClient>,
    biometric_available: bool,
    state_tx: watch::Sender<AuthState>,
}

impl AuthManager {
    /// Construct and immediately attempt to restore a persisted session.
    pub fn new(prefs: Arc<PrefStore>, client: Arc<ServerClient>, biometric_available: bool) -> Self {
        let (state_tx, _) = watch::channel(AuthState::default());
        let manager = AuthManager {
            prefs,
            client,
            biometric_available,
            state_tx,
        };
        manager.restore_session();
        manager
    }

    pub fn state(&self) -> AuthState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state_tx.borrow().authenticated
    }

    pub fn has_existing_account(&self) -> bool {
        self.prefs.has_existing_account().unwrap_or(false)
    }

    /// True when a previous login enabled biometric unlock on this device.
    pub fn is_biometric_enabled(&self) -> bool {
        self.prefs.biometric_enabled().unwrap_or(false)
    }

    /// Persist a freshly issued device push token and register it with the
    /// server. The registered flag records whether the server accepted it,
    /// so an unregistered token can be retried later.
    pub async fn register_push_token(&self, token: &str) -> Result<bool, AuthError> {
        self.prefs.set_push_token(token)?;
        let accepted = self.client.register_push_token(token).await?;
        self.prefs.set_push_token_registered(accepted)?;
        if accepted {
            info!("push token registered");
        } else {
            warn!("server declined push token registration");
        }
        Ok(accepted)
    }

    /// Login with username and passcode.
    pub async fn login(&self, username: &str, passcode: &str) -> bool {
        self.state_tx.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        match self.try_login(username, passcode).await {
            Ok(user) => {
                info!("login succeeded for {username}");
                self.state_tx.send_modify(|s| {
                    s.loading = false;
                    s.authenticated = true;
                    s.user = Some(user);
                    s.error = None;
                });
                true
            }
            Err(e) => {
                warn!("login failed: {e}");
                self.state_tx.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(e.to_string());
                });
                false
            }
        }
    }

    async fn try_login(&self, username: &str, passcode: &str) -> Result<User, AuthError> {
        let response = self
            .client
            .post(
                "/api/auth/login",
                &json!({ "username": username, "password": passcode }),
            )
            .await?
            .unwrap_or(Value::Null);

        if !is_success(&response) {
            return Err(AuthError::Rejected(server_message(
                &response,
                DEFAULT_LOGIN_ERROR,
            )));
        }

        // Token may arrive at the top level or nested under "data". A
        // success response without one is treated as an error rather than
        // papered over with a placeholder.
        let token = response
            .get("token")
            .and_then(Value::as_str)
            .or_else(|| {
                response
                    .get("data")
                    .and_then(|d| d.get("token"))
                    .and_then(Value::as_str)
            })
            .ok_or(AuthError::MissingToken)?
            .to_string();

        let user_data = response.get("user").or_else(|| response.get("data"));
        let user = self.persist_session(&token, user_data, username)?;
        Ok(user)
    }

    fn persist_session(
        &self,
        token: &str,
        user_data: Option<&Value>,
        username: &str,
    ) -> Result<User, AuthError> {
        let user_id = user_data
            .and_then(|u| u.get("user_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let email = user_data
            .and_then(|u| u.get("email"))
            .and_then(Value::as_str)
            .map(str::to_string);

        self.prefs.set_auth_token(token)?;
        self.prefs.set_username(username)?;
        self.prefs.set_user_id(&user_id)?;
        if let Some(email) = &email {
            self.prefs.set_email(email)?;
        }
        self.prefs.set_has_existing_account(true)?;
        self.prefs.set_biometric_enabled(self.biometric_available)?;

        let push_token = self.prefs.push_token().unwrap_or(None);
        self.client.configure(Some(token.to_string()), push_token);

        Ok(User {
            id: user_id,
            username: username.to_string(),
            email,
        })
    }

    /// Enroll a new account, then establish a session with the same
    /// credentials. Accounts enrolled here get the "user" role.
    pub async fn enroll_user(&self, data: &EnrollmentData) -> bool {
        self.state_tx.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        match self.try_enroll(data).await {
            Ok(()) => self.login(&data.username, &data.passcode).await,
            Err(e) => {
                warn!("enrollment failed: {e}");
                self.state_tx.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(e.to_string());
                });
                false
            }
        }
    }

    async fn try_enroll(&self, data: &EnrollmentData) -> Result<(), AuthError> {
        if !data.is_credentials_valid() {
            return Err(AuthError::Validation(
                "Username must be at least 3 characters and passcodes at least 8 and matching"
                    .to_string(),
            ));
        }
        if !data.agreed_to_terms {
            return Err(AuthError::Validation(
                "Terms must be accepted before enrolling".to_string(),
            ));
        }

        let mut body = json!({
            "username": data.username,
            "password": data.passcode,
            "email": format!("{}@local.ada", data.username),
            "role": "user",
        });
        if let Some(voice) = &data.voice_data {
            body["voice_data"] = Value::String(BASE64.encode(voice));
        }
        if let Some(face) = &data.face_data {
            body["face_data"] = Value::String(BASE64.encode(face));
        }

        let response = self
            .client
            .post("/api/auth/register", &body)
            .await?
            .unwrap_or(Value::Null);

        if !is_success(&response) {
            return Err(AuthError::Rejected(server_message(
                &response,
                DEFAULT_ENROLL_ERROR,
            )));
        }
        Ok(())
    }

    /// Biometric unlock: a verified prompt only unlocks an already
    /// persisted session, it never creates one.
    /// `Ok(true)` unlocked, `Ok(false)` cancelled by the user.
    pub async fn authenticate_with_biometrics(
        &self,
        verifier: &dyn BiometricVerifier,
    ) -> Result<bool, String> {
        if !verifier.verify().await? {
            return Ok(false);
        }
        self.restore_session();
        if self.is_authenticated() {
            Ok(true)
        } else {
            Err(SESSION_EXPIRED.to_string())
        }
    }

    /// Restore a persisted session: both token and username present means
    /// authenticated, with no server round-trip.
    pub fn restore_session(&self) {
        let token = self.prefs.auth_token().unwrap_or(None).unwrap_or_default();
        let username = self.prefs.username().unwrap_or(None).unwrap_or_default();

        if token.is_empty() || username.is_empty() {
            return;
        }

        let user = User {
            id: self.prefs.user_id().unwrap_or(None).unwrap_or_default(),
            username,
            email: self.prefs.email().unwrap_or(None),
        };
        let push_token = self.prefs.push_token().unwrap_or(None);
        self.client.configure(Some(token), push_token);

        self.state_tx.send_modify(|s| {
            s.authenticated = true;
            s.user = Some(user);
        });
    }

    /// Logout: clears persisted auth fields but keeps the username and
    /// account flag for faster re-login.
    pub fn logout(&self) {
        if let Err(e) = self.prefs.clear_auth() {
            warn!("failed to clear persisted auth: {e}");
        }
        let push_token = self.prefs.push_token().unwrap_or(None);
        self.client.configure(None, push_token);
        self.state_tx.send_modify(|s| {
            s.authenticated = false;
            s.user = None;
            s.error = None;
        });
    }

    pub fn clear_error(&self) {
        self.state_tx.send_modify(|s| s.error = None);
    }
}

fn is_success(response: &Value) -> bool {
    response
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn server_message(response: &Value, fallback: &str) -> String {
    response
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}
