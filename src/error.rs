// src/error.rs
//! Error taxonomy shared by the handshake, the portal client, the snapshot
//! store and the poll loop.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Failures of a single SSO handshake attempt. All of them are retryable by
/// the authenticator.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("SSO login page returned HTTP {0}")]
    LoginPageStatus(StatusCode),

    #[error("SSO login page has no hidden form fields (execution, _eventId, ...)")]
    FormExtractionFailed,

    #[error("SSO gateway did not redirect to the service with a ticket")]
    NoRedirect,

    #[error("SSO ticket is empty")]
    EmptyTicket,

    #[error("portal did not set a session cookie ({stage}/2)")]
    NoSessionCookie { stage: u8 },

    #[error("SSO transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures of an authenticated portal page request.
#[derive(Error, Debug)]
pub enum PortalError {
    /// The portal bounced the request to the login flow (or no session exists yet).
    #[error("not logged in to the portal")]
    NotLoggedIn,

    #[error("could not GET {page} page: HTTP {status}")]
    Status {
        page: &'static str,
        status: StatusCode,
    },

    #[error("portal transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0} not found on portal page")]
    MissingElement(&'static str),
}

/// Persistence faults of the grade snapshot file.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("snapshot I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Why one poll cycle ended early. Only `SessionExpired` changes control flow;
/// everything else is reported and retried next cycle.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("portal session expired")]
    SessionExpired,

    #[error(transparent)]
    Portal(PortalError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("notification dispatch failed: {0:#}")]
    Notify(anyhow::Error),
}

impl From<PortalError> for CycleError {
    fn from(err: PortalError) -> Self {
        match err {
            PortalError::NotLoggedIn => CycleError::SessionExpired,
            other => CycleError::Portal(other),
        }
    }
}

/// Terminal failures: the process cannot make progress and exits non-zero.
#[derive(Error, Debug)]
pub enum CriticalFailure {
    #[error("maximum login attempts exceeded ({attempts}), last error: {last}")]
    MaxRetriesExceeded { attempts: u32, last: AuthError },

    #[error("failed to retrieve user identity slug: {0}")]
    IdentityUnavailable(String),

    #[error("portal rejected the session right after re-login")]
    SessionRejectedAfterRelogin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_logged_in_maps_to_session_expired() {
        let err: CycleError = PortalError::NotLoggedIn.into();
        assert!(matches!(err, CycleError::SessionExpired));

        let err: CycleError = PortalError::MissingElement("grades table").into();
        assert!(matches!(err, CycleError::Portal(_)));
    }

    #[test]
    fn messages_are_human_readable() {
        let err = CriticalFailure::MaxRetriesExceeded {
            attempts: 3,
            last: AuthError::NoSessionCookie { stage: 2 },
        };
        assert_eq!(
            err.to_string(),
            "maximum login attempts exceeded (3), last error: portal did not set a session cookie (2/2)"
        );
    }
}
