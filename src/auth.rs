// src/auth.rs
//! Login with bounded retries on top of a [`Handshake`].

use std::time::Duration;

use metrics::counter;
use tracing::{info, warn};

use crate::error::{AuthError, CriticalFailure};
use crate::session::{Credentials, PortalSession};
use crate::sso::Handshake;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(3),
        }
    }
}

pub struct Authenticator {
    handshake: Box<dyn Handshake>,
    credentials: Credentials,
    policy: RetryPolicy,
}

impl Authenticator {
    pub fn new(handshake: Box<dyn Handshake>, credentials: Credentials, policy: RetryPolicy) -> Self {
        Self {
            handshake,
            credentials,
            policy,
        }
    }

    /// Run the handshake up to `max_attempts` times, sleeping `delay` between
    /// attempts (not after the last one). On success the new token replaces
    /// whatever `session` held.
    pub async fn login(&self, session: &mut PortalSession) -> Result<(), CriticalFailure> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last: Option<AuthError> = None;

        for attempt in 1..=max_attempts {
            counter!("tracker_login_attempts_total").increment(1);
            match self.handshake.authenticate(&self.credentials).await {
                Ok(token) => {
                    session.install(token);
                    info!(attempt, "login successful");
                    return Ok(());
                }
                Err(e) => {
                    counter!("tracker_login_failures_total").increment(1);
                    warn!(attempt, max_attempts, error = %e, "login attempt failed");
                    last = Some(e);
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.policy.delay).await;
            }
        }

        Err(CriticalFailure::MaxRetriesExceeded {
            attempts: max_attempts,
            last: last.unwrap_or(AuthError::NoRedirect),
        })
    }
}
