//! Secure storage for authentication tokens and user preferences.
//!
//! Values are encrypted at rest (AES-256-GCM per value). There is no
//! in-memory cache: every accessor reads the backing file, so concurrent
//! store handles over the same directory observe each other's writes.

pub mod error;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ada_core::encryption;
use ada_core::paths;

pub use error::{PrefsError, Result};

const KEY_AUTH_TOKEN: &str = "auth_token";
const KEY_USERNAME: &str = "username";
const KEY_USER_ID: &str = "user_id";
const KEY_EMAIL: &str = "email";
const KEY_HAS_ACCOUNT: &str = "has_existing_account";
const KEY_BIOMETRIC_ENABLED: &str = "biometric_enabled";
const KEY_PUSH_TOKEN: &str = "push_token";
const KEY_PUSH_REGISTERED: &str = "push_token_registered";
const KEY_SERVER_URL: &str = "server_url";

pub struct PrefStore {
    prefs_path: PathBuf,
    key: Vec<u8>,
}

impl PrefStore {
    /// Open the store in the default data directory (~/.ada).
    pub fn open_default() -> Result<Self> {
        paths::ensure_ada_dir()?;
        Self::open_at(paths::prefs_path(), paths::prefs_key_path())
    }

    /// Open the store under an explicit directory.
    pub fn open(dir: &Path) -> Result<Self> {
        Self::open_at(dir.join("prefs.json"), dir.join(".prefs_key"))
    }

    fn open_at(prefs_path: PathBuf, key_path: PathBuf) -> Result<Self> {
        let key = encryption::load_or_create_key(&key_path)
            .map_err(|e| PrefsError::Crypto(e.to_string()))?;
        Ok(PrefStore { prefs_path, key })
    }

    // Authentication

    pub fn auth_token(&self) -> Result<Option<String>> {
        self.get(KEY_AUTH_TOKEN)
    }

    pub fn set_auth_token(&self, value: &str) -> Result<()> {
        self.set(KEY_AUTH_TOKEN, value)
    }

    pub fn username(&self) -> Result<Option<String>> {
        self.get(KEY_USERNAME)
    }

    pub fn set_username(&self, value: &str) -> Result<()> {
        self.set(KEY_USERNAME, value)
    }

    pub fn user_id(&self) -> Result<Option<String>> {
        self.get(KEY_USER_ID)
    }

    pub fn set_user_id(&self, value: &str) -> Result<()> {
        self.set(KEY_USER_ID, value)
    }

    pub fn email(&self) -> Result<Option<String>> {
        self.get(KEY_EMAIL)
    }

    pub fn set_email(&self, value: &str) -> Result<()> {
        self.set(KEY_EMAIL, value)
    }

    pub fn has_existing_account(&self) -> Result<bool> {
        self.get_bool(KEY_HAS_ACCOUNT)
    }

    pub fn set_has_existing_account(&self, value: bool) -> Result<()> {
        self.set_bool(KEY_HAS_ACCOUNT, value)
    }

    pub fn biometric_enabled(&self) -> Result<bool> {
        self.get_bool(KEY_BIOMETRIC_ENABLED)
    }

    pub fn set_biometric_enabled(&self, value: bool) -> Result<()> {
        self.set_bool(KEY_BIOMETRIC_ENABLED, value)
    }

    // Push token

    pub fn push_token(&self) -> Result<Option<String>> {
        self.get(KEY_PUSH_TOKEN)
    }

    pub fn set_push_token(&self, value: &str) -> Result<()> {
        self.set(KEY_PUSH_TOKEN, value)
    }

    pub fn push_token_registered(&self) -> Result<bool> {
        self.get_bool(KEY_PUSH_REGISTERED)
    }

    pub fn set_push_token_registered(&self, value: bool) -> Result<()> {
        self.set_bool(KEY_PUSH_REGISTERED, value)
    }

    // Server configuration

    pub fn server_url(&self) -> Result<Option<String>> {
        self.get(KEY_SERVER_URL)
    }

    pub fn set_server_url(&self, value: &str) -> Result<()> {
        self.set(KEY_SERVER_URL, value)
    }

    /// Check if user is logged in: token and username both present.
    pub fn is_logged_in(&self) -> bool {
        let token = self.auth_token().ok().flatten().unwrap_or_default();
        let username = self.username().ok().flatten().unwrap_or_default();
        !token.is_empty() && !username.is_empty()
    }

    /// Clear authentication data (logout).
    /// Username and the account flag are kept for re-login.
    pub fn clear_auth(&self) -> Result<()> {
        let mut map = self.load_map()?;
        map.remove(KEY_AUTH_TOKEN);
        map.remove(KEY_USER_ID);
        self.store_map(&map)
    }

    /// Clear all data (complete reset).
    pub fn clear_all(&self) -> Result<()> {
        if self.prefs_path.exists() {
            std::fs::remove_file(&self.prefs_path)?;
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.load_map()?;
        match map.get(key) {
            Some(encrypted) => {
                let value = encryption::decrypt(&self.key, encrypted)
                    .map_err(|e| PrefsError::Crypto(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.load_map()?;
        let encrypted = encryption::encrypt(&self.key, value)
            .map_err(|e| PrefsError::Crypto(e.to_string()))?;
        map.insert(key.to_string(), encrypted);
        self.store_map(&map)
    }

    fn get_bool(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.as_deref() == Some("true"))
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set(key, if value { "true" } else { "false" })
    }

    fn load_map(&self) -> Result<BTreeMap<String, String>> {
        if !self.prefs_path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.prefs_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn store_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.prefs_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.prefs_path, content)?;
        Ok(())
    }
}
