// src/portal.rs
//! Authenticated portal pages: identity slug and grades table.

use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::{Client, Url};
use tracing::debug;

use crate::error::PortalError;
use crate::grades::GradeRecord;
use crate::html;
use crate::session::PortalSession;

const PROFILE_PATH: &str = "/utilisateur/mon-profil";

/// Source of grades behind a portal session. The implementor owns the
/// session; the authenticator refreshes it through `session_mut`.
#[async_trait]
pub trait GradePortal: Send + Sync {
    fn session_mut(&mut self) -> &mut PortalSession;

    /// `Ok(None)` when the profile page has no recognizable identity link.
    async fn identity_slug(&self) -> Result<Option<String>, PortalError>;

    async fn fetch_grades(&self, slug: &str) -> Result<Vec<GradeRecord>, PortalError>;
}

pub struct PortalClient {
    http: Client,
    /// `{SERVICE_URL}/{language}`, without trailing slash.
    base: String,
    session: PortalSession,
}

impl PortalClient {
    /// `http` must not follow redirects (see [`crate::http::build_client`]).
    pub fn new(http: Client, service_url: &Url, language: &str, session: PortalSession) -> Self {
        let base = format!(
            "{}/{}",
            service_url.as_str().trim_end_matches('/'),
            language.trim_matches('/')
        );
        Self {
            http,
            base,
            session,
        }
    }

    pub fn session(&self) -> &PortalSession {
        &self.session
    }

    fn page_url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// GET a page with the current session cookie and return its HTML.
    async fn get_page(&self, page: &'static str, path: &str) -> Result<String, PortalError> {
        let cookie = self.session.cookie_header().ok_or(PortalError::NotLoggedIn)?;

        let resp = self
            .http
            .get(self.page_url(path))
            .header(COOKIE, cookie)
            .send()
            .await?;

        let status = resp.status();
        if status.is_redirection() {
            debug!(page, %status, "portal redirected to login");
            return Err(PortalError::NotLoggedIn);
        }
        if !status.is_success() {
            return Err(PortalError::Status { page, status });
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl GradePortal for PortalClient {
    fn session_mut(&mut self) -> &mut PortalSession {
        &mut self.session
    }

    async fn identity_slug(&self) -> Result<Option<String>, PortalError> {
        let body = self.get_page("profile", PROFILE_PATH).await?;
        Ok(html::identity_slug(&body))
    }

    async fn fetch_grades(&self, slug: &str) -> Result<Vec<GradeRecord>, PortalError> {
        let body = self
            .get_page("grades", &format!("/etudiant/profil/{slug}/notes"))
            .await?;
        let rows = html::grade_rows(&body);
        debug!(rows = rows.len(), "grades page parsed");
        Ok(rows)
    }
}
