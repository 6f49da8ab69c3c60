// src/session.rs
//! Credentials and the portal session store.
//!
//! `PortalSession` is the single owner of the current session token. The
//! authenticator writes it on (re-)login and the portal client reads it when
//! building each request, so a request always carries the latest token.

use std::fmt;

/// SSO username/password. Never logged: `Debug` redacts the password.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opaque portal session identifier.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken(<{} chars>)", self.0.len())
    }
}

#[derive(Debug, Clone)]
pub struct PortalSession {
    cookie_name: String,
    token: Option<SessionToken>,
}

impl PortalSession {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            token: None,
        }
    }

    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Replace the current token. The previous one is dropped.
    pub fn install(&mut self, token: SessionToken) {
        self.token = Some(token);
    }

    /// `Cookie` header value for the current token, if any.
    pub fn cookie_header(&self) -> Option<String> {
        self.token
            .as_ref()
            .map(|t| format!("{}={}", self.cookie_name, t.as_str()))
    }
}
