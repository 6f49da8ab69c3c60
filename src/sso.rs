// src/sso.rs
//! CAS-style ticket exchange: credentials -> ticket -> portal session.
//!
//! 1. GET the SSO login page (`?service=`) and collect its hidden form fields.
//! 2. POST them back with the credentials.
//! 3. Read the `ticket` from the redirect `Location`.
//! 4. GET the portal callback with `?ticket=` (no cookie) -> interim session cookie.
//! 5. GET the callback again with the interim cookie -> operative session cookie.
//!
//! Step 5 is a portal quirk: the interim id does not authorize page requests.

use async_trait::async_trait;
use reqwest::header::{COOKIE, LOCATION};
use reqwest::{Client, Url};
use tracing::debug;

use crate::error::AuthError;
use crate::html;
use crate::http::set_cookie_value;
use crate::session::{Credentials, SessionToken};

/// One credential-to-session exchange. Implementations do not retry.
#[async_trait]
pub trait Handshake: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<SessionToken, AuthError>;
}

#[derive(Debug, Clone)]
pub struct SsoHandshake {
    http: Client,
    login_url: Url,
    service_url: Url,
    cookie_name: String,
}

impl SsoHandshake {
    /// `http` must not follow redirects (see [`crate::http::build_client`]).
    pub fn new(http: Client, login_url: Url, service_url: Url, cookie_name: impl Into<String>) -> Self {
        Self {
            http,
            login_url,
            service_url,
            cookie_name: cookie_name.into(),
        }
    }

    async fn request_ticket(&self, credentials: &Credentials) -> Result<String, AuthError> {
        let service = [("service", self.service_url.as_str())];

        let resp = self
            .http
            .get(self.login_url.clone())
            .query(&service)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::LoginPageStatus(resp.status()));
        }
        let hidden = html::hidden_inputs(&resp.text().await?);
        if hidden.is_empty() {
            return Err(AuthError::FormExtractionFailed);
        }
        debug!(fields = hidden.len(), "SSO login form fetched");

        let mut form = Vec::with_capacity(hidden.len() + 2);
        form.push(("username".to_string(), credentials.username.clone()));
        form.push(("password".to_string(), credentials.password.clone()));
        form.extend(hidden);

        let resp = self
            .http
            .post(self.login_url.clone())
            .query(&service)
            .form(&form)
            .send()
            .await?;

        if !resp.status().is_redirection() {
            return Err(AuthError::NoRedirect);
        }
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::NoRedirect)?;
        let target = self
            .login_url
            .join(location)
            .map_err(|_| AuthError::NoRedirect)?;

        let ticket = target
            .query_pairs()
            .find(|(k, _)| k == "ticket")
            .map(|(_, v)| v.into_owned())
            .ok_or(AuthError::NoRedirect)?;
        if ticket.is_empty() {
            return Err(AuthError::EmptyTicket);
        }
        debug!("SSO ticket issued");
        Ok(ticket)
    }

    async fn exchange_ticket(&self, ticket: &str) -> Result<SessionToken, AuthError> {
        let resp = self
            .http
            .get(self.service_url.clone())
            .query(&[("ticket", ticket)])
            .send()
            .await?;
        let interim = set_cookie_value(resp.headers(), &self.cookie_name)
            .ok_or(AuthError::NoSessionCookie { stage: 1 })?;

        let resp = self
            .http
            .get(self.service_url.clone())
            .header(COOKIE, format!("{}={}", self.cookie_name, interim))
            .send()
            .await?;
        let operative = set_cookie_value(resp.headers(), &self.cookie_name)
            .ok_or(AuthError::NoSessionCookie { stage: 2 })?;

        debug!("portal session established");
        Ok(SessionToken::new(operative))
    }
}

#[async_trait]
impl Handshake for SsoHandshake {
    async fn authenticate(&self, credentials: &Credentials) -> Result<SessionToken, AuthError> {
        let ticket = self.request_ticket(credentials).await?;
        self.exchange_ticket(&ticket).await
    }
}
