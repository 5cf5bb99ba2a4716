pub mod biometric;
pub mod enrollment;
pub mod error;
pub mod manager;

pub use biometric::BiometricVerifier;
pub use enrollment::EnrollmentData;
pub use error::AuthError;
pub use manager::{AuthManager, AuthState, User};
