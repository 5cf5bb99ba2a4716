//! Draft state of the multi-step registration flow.
//!
//! Transient and in-memory only; discarded after submission.

/// Enrollment form data, including optional biometric sample captures.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentData {
    pub username: String,
    pub passcode: String,
    pub confirm_passcode: String,
    pub voice_data: Option<Vec<u8>>,
    pub face_data: Option<Vec<u8>>,
    pub agreed_to_terms: bool,
}

impl EnrollmentData {
    pub fn is_credentials_valid(&self) -> bool {
        self.username.len() >= 3
            && self.passcode.len() >= 8
            && self.passcode == self.confirm_passcode
    }

    pub fn is_voice_enrolled(&self) -> bool {
        self.voice_data.is_some()
    }

    pub fn is_face_enrolled(&self) -> bool {
        self.face_data.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.is_credentials_valid()
            && self.is_voice_enrolled()
            && self.is_face_enrolled()
            && self.agreed_to_terms
    }
}
