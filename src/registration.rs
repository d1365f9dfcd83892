use std::fmt;

use sha2::{Digest, Sha256};

use crate::backend::BiometricCapability;
use crate::error::RegistrationError;

pub const MIN_PASSWORD_LEN: usize = 6;
const MIN_PHONE_DIGITS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RegistrationStep {
    Personal = 1,
    Contact = 2,
    Academic = 3,
    Security = 4,
}

impl RegistrationStep {
    pub const ALL: [RegistrationStep; 4] = [
        RegistrationStep::Personal,
        RegistrationStep::Contact,
        RegistrationStep::Academic,
        RegistrationStep::Security,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn next(self) -> Option<Self> {
        match self {
            RegistrationStep::Personal => Some(RegistrationStep::Contact),
            RegistrationStep::Contact => Some(RegistrationStep::Academic),
            RegistrationStep::Academic => Some(RegistrationStep::Security),
            RegistrationStep::Security => None,
        }
    }

    pub fn previous(self) -> Option<Self> {
        match self {
            RegistrationStep::Personal => None,
            RegistrationStep::Contact => Some(RegistrationStep::Personal),
            RegistrationStep::Academic => Some(RegistrationStep::Contact),
            RegistrationStep::Security => Some(RegistrationStep::Academic),
        }
    }
}

impl fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RegistrationStep::Personal => "Personal",
            RegistrationStep::Contact => "Contact",
            RegistrationStep::Academic => "Academic",
            RegistrationStep::Security => "Security",
        };
        write!(f, "{} ({}/4)", label, self.number())
    }
}

/// In-memory form state. Never persisted until submission succeeds.
#[derive(Debug, Clone, Default)]
pub struct RegistrationDraft {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub date_of_birth: Option<chrono::NaiveDate>,
    pub gender: Option<String>,
    pub phone: String,
    pub address: String,
    pub city: Option<String>,
    pub college: String,
    pub department: String,
    pub program: Option<String>,
    pub password: String,
    pub confirm_password: String,
}

/// Payload handed to the registration collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub date_of_birth: Option<chrono::NaiveDate>,
    pub gender: Option<String>,
    pub phone: String,
    pub address: String,
    pub city: Option<String>,
    pub college: String,
    pub department: String,
    pub program: Option<String>,
    pub password_hash: String,
}

/// What the UI shows once a registration request has been accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentPrompt {
    OfferPasskeyEnrollment,
    Done,
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((name, tld)) => !name.is_empty() && !tld.is_empty(),
        None => false,
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn is_valid_phone(phone: &str) -> bool {
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    allowed && digits >= MIN_PHONE_DIGITS
}

/// Returns the first problem with the fields owned by `step`, if any.
pub fn validate_step(step: RegistrationStep, draft: &RegistrationDraft) -> Option<String> {
    match step {
        RegistrationStep::Personal => {
            if is_blank(&draft.first_name) || is_blank(&draft.last_name) {
                Some("First and last name are required".to_string())
            } else if is_blank(&draft.email) {
                Some("Email is required".to_string())
            } else if !is_valid_email(&draft.email) {
                Some("Please enter a valid email address".to_string())
            } else {
                None
            }
        }
        RegistrationStep::Contact => {
            if is_blank(&draft.phone) {
                Some("Phone number is required".to_string())
            } else if !is_valid_phone(draft.phone.trim()) {
                Some("Please enter a valid phone number".to_string())
            } else if is_blank(&draft.address) {
                Some("Address is required".to_string())
            } else {
                None
            }
        }
        RegistrationStep::Academic => {
            if is_blank(&draft.college) {
                Some("Please select a college".to_string())
            } else if is_blank(&draft.department) {
                Some("Please select a department".to_string())
            } else {
                None
            }
        }
        RegistrationStep::Security => {
            if draft.password.chars().count() < MIN_PASSWORD_LEN {
                Some(format!(
                    "Password must be at least {} characters",
                    MIN_PASSWORD_LEN
                ))
            } else if draft.password != draft.confirm_password {
                Some("Passwords do not match".to_string())
            } else {
                None
            }
        }
    }
}

pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Linear four-step wizard: no skipping, no branching.
#[derive(Debug, Clone)]
pub struct RegistrationWizard {
    step: RegistrationStep,
    pub draft: RegistrationDraft,
}

impl Default for RegistrationWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationWizard {
    pub fn new() -> Self {
        Self {
            step: RegistrationStep::Personal,
            draft: RegistrationDraft::default(),
        }
    }

    pub fn current(&self) -> RegistrationStep {
        self.step
    }

    /// Moves forward when the current step validates; otherwise stays put and
    /// returns the validation message. Advancing from the last step is a
    /// no-op.
    pub fn advance(&mut self) -> Result<RegistrationStep, RegistrationError> {
        if let Some(message) = validate_step(self.step, &self.draft) {
            return Err(RegistrationError::Invalid(message));
        }
        if let Some(next) = self.step.next() {
            self.step = next;
        }
        Ok(self.step)
    }

    pub fn retreat(&mut self) -> RegistrationStep {
        if let Some(previous) = self.step.previous() {
            self.step = previous;
        }
        self.step
    }

    /// Steps back to the earliest step at or before the current one that
    /// fails validation and returns its message. Stays put when every step
    /// up to here validates.
    pub fn rewind_to_first_invalid(&mut self) -> Option<String> {
        let (target, message) = RegistrationStep::ALL
            .into_iter()
            .take_while(|step| *step <= self.step)
            .find_map(|step| validate_step(step, &self.draft).map(|message| (step, message)))?;
        while self.step > target {
            self.retreat();
        }
        Some(message)
    }

    pub fn submit(&self) -> Result<RegistrationRequest, RegistrationError> {
        if self.step != RegistrationStep::Security {
            return Err(RegistrationError::NotAtFinalStep);
        }
        for step in RegistrationStep::ALL {
            if let Some(message) = validate_step(step, &self.draft) {
                return Err(RegistrationError::Invalid(message));
            }
        }

        let draft = &self.draft;
        Ok(RegistrationRequest {
            first_name: draft.first_name.trim().to_string(),
            last_name: draft.last_name.trim().to_string(),
            email: draft.email.trim().to_lowercase(),
            date_of_birth: draft.date_of_birth,
            gender: optional(&draft.gender),
            phone: draft.phone.trim().to_string(),
            address: draft.address.trim().to_string(),
            city: optional(&draft.city),
            college: draft.college.trim().to_string(),
            department: draft.department.trim().to_string(),
            program: optional(&draft.program),
            password_hash: hash_password(&draft.password),
        })
    }
}

pub fn next_after_submit(capability: &dyn BiometricCapability) -> EnrollmentPrompt {
    if capability.is_supported() && capability.is_available() {
        EnrollmentPrompt::OfferPasskeyEnrollment
    } else {
        EnrollmentPrompt::Done
    }
}
