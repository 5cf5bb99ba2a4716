//! Platform biometric prompt seam.
//!
//! The prompt itself is platform territory; the manager only needs a
//! yes/no verification outcome. A verified outcome does not create a
//! session, it merely unlocks a persisted one.

use async_trait::async_trait;

#[async_trait]
pub trait BiometricVerifier: Send + Sync {
    /// True when the platform is able to prompt at all.
    fn is_available(&self) -> bool;

    /// Run the prompt; `Ok(true)` on a confirmed match, `Ok(false)` when
    /// the user cancelled, `Err` with a displayable message otherwise.
    async fn verify(&self) -> Result<bool, String>;
}

/// Verifier for platforms with no biometric hardware. Never available.
pub struct NoBiometrics;

#[async_trait]
impl BiometricVerifier for NoBiometrics {
    fn is_available(&self) -> bool {
        false
    }

    async fn verify(&self) -> Result<bool, String> {
        Err("Biometric authentication is not available".to_string())
    }
}
