//! Seams to the hosted services the portal talks to. The Postgres-backed
//! implementations live in `db`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::{GradeComponents, GradeKey, GradeRecord, GradeResult, Session};
use crate::registration::RegistrationRequest;

#[async_trait]
pub trait GradeRepository: Send + Sync {
    /// Upserts one record per key. Concurrent writers are not coordinated;
    /// the last write wins.
    async fn save_grade(
        &self,
        key: &GradeKey,
        components: &GradeComponents,
        result: &GradeResult,
    ) -> anyhow::Result<()>;

    async fn grades_for_student(&self, student_id: Uuid) -> anyhow::Result<Vec<GradeRecord>>;
}

#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    async fn create_registration_request(
        &self,
        request: &RegistrationRequest,
    ) -> anyhow::Result<Uuid>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, AuthError>;
}

/// Advisory device capability report used only to decide whether to offer
/// passkey enrollment.
pub trait BiometricCapability {
    fn is_supported(&self) -> bool;
    fn is_available(&self) -> bool;
}

/// Headless environments have no platform authenticator.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBiometrics;

impl BiometricCapability for NoBiometrics {
    fn is_supported(&self) -> bool {
        false
    }

    fn is_available(&self) -> bool {
        false
    }
}
