use crate::backend::AuthProvider;
use crate::error::{AuthError, LoginError};
use crate::models::{RememberedIdentity, Session};
use crate::remember::RememberMeStore;
use crate::throttle::{AuthThrottle, ThrottleOutcome};

/// Password sign-in gated by the attempt throttle.
pub struct LoginFlow<'a, A: AuthProvider> {
    provider: &'a A,
    throttle: &'a AuthThrottle,
    remember: &'a RememberMeStore,
}

impl<'a, A: AuthProvider> LoginFlow<'a, A> {
    pub fn new(provider: &'a A, throttle: &'a AuthThrottle, remember: &'a RememberMeStore) -> Self {
        Self {
            provider,
            throttle,
            remember,
        }
    }

    pub async fn attempt(
        &self,
        identity: &RememberedIdentity,
        password: &str,
        remember_me: bool,
    ) -> Result<Session, LoginError> {
        let now = self.throttle.now();
        self.throttle.tick(now)?;
        if let Some(remaining) = self.throttle.remaining_time(now)? {
            return Err(LoginError::Locked { remaining });
        }

        match self
            .provider
            .sign_in_with_password(&identity.email, password)
            .await
        {
            Ok(session) => {
                self.throttle.record_success()?;
                self.remember.apply(remember_me, identity)?;
                tracing::info!("Signed in {} as {}", session.email, session.role);
                Ok(session)
            }
            Err(AuthError::Rejected(message)) => match self.throttle.record_failure()? {
                ThrottleOutcome::Open { attempts_remaining } => Err(LoginError::Rejected {
                    message,
                    attempts_remaining,
                }),
                ThrottleOutcome::Locked { until } => Err(LoginError::Locked {
                    remaining: crate::throttle::format_remaining(until - now),
                }),
            },
            Err(e) => {
                tracing::error!("Sign-in could not reach the auth backend: {}", e);
                Err(LoginError::Backend(e))
            }
        }
    }
}
