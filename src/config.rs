// src/config.rs
//! Runtime configuration from the environment (and `.env` in dev).
//! Everything is validated up front; a bad value stops the process before
//! the tracker is built.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::RetryPolicy;
use crate::session::Credentials;
use crate::store::FirstRunPolicy;

pub const ENV_USERNAME: &str = "USERNAME";
pub const ENV_PASSWORD: &str = "PASSWORD";
pub const ENV_CAS_URL: &str = "CAS_URL";
pub const ENV_SERVICE_URL: &str = "SERVICE_URL";
pub const ENV_SERVICE_CAS_PATH: &str = "SERVICE_CAS_PATH";
pub const ENV_SAVE_PATH: &str = "SAVE_PATH";
pub const ENV_DISCORD_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";
pub const ENV_SLACK_WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";
pub const ENV_EMBED_THUMBNAIL_URL: &str = "EMBED_THUMBNAIL_URL";
pub const ENV_TIMEOUT: &str = "TIMEOUT";
pub const ENV_LOGIN_RETRY_MAX: &str = "LOGIN_RETRY_MAX";
pub const ENV_LOGIN_RETRY_DELAY: &str = "LOGIN_RETRY_DELAY";
pub const ENV_USER_AGENT: &str = "USER_AGENT";
pub const ENV_SESSION_COOKIE_NAME: &str = "SESSION_COOKIE_NAME";
pub const ENV_PORTAL_LANGUAGE: &str = "PORTAL_LANGUAGE";
pub const ENV_FIRST_RUN_POLICY: &str = "FIRST_RUN_POLICY";
pub const ENV_HTTP_TIMEOUT: &str = "HTTP_TIMEOUT";

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 4 * 3600;
pub const DEFAULT_LOGIN_RETRY_MAX: u32 = 3;
pub const DEFAULT_LOGIN_RETRY_DELAY_SECS: u64 = 3;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_SESSION_COOKIE_NAME: &str = "PHPSESSID";
pub const DEFAULT_PORTAL_LANGUAGE: &str = "fr";
pub const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub credentials: Credentials,
    /// SSO login endpoint.
    pub cas_url: Url,
    /// Portal root (`SERVICE_URL`).
    pub service_url: Url,
    /// Portal CAS callback: `SERVICE_URL` + `SERVICE_CAS_PATH`.
    pub service_callback_url: Url,
    pub save_path: PathBuf,
    pub discord_webhook_url: Url,
    pub slack_webhook_url: Option<Url>,
    /// Portal logo shown on Discord embeds.
    pub embed_thumbnail_url: Option<Url>,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    pub user_agent: String,
    pub session_cookie_name: String,
    pub portal_language: String,
    pub first_run: FirstRunPolicy,
    pub http_timeout: Duration,
}

impl TrackerConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("missing required setting {key}"));

        let username = required(ENV_USERNAME)?;
        // Passwords may legitimately carry surrounding spaces.
        let password = lookup(ENV_PASSWORD)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("missing required setting {ENV_PASSWORD}"))?;

        let cas_url = parse_url(ENV_CAS_URL, &required(ENV_CAS_URL)?)?;
        let service_raw = required(ENV_SERVICE_URL)?;
        let service_url = parse_url(ENV_SERVICE_URL, &service_raw)?;
        let cas_path = required(ENV_SERVICE_CAS_PATH)?;
        let service_callback_url = parse_url(
            ENV_SERVICE_CAS_PATH,
            &format!("{}{}", service_raw.trim_end_matches('/'), ensure_leading_slash(&cas_path)),
        )?;

        let save_path = PathBuf::from(required(ENV_SAVE_PATH)?);
        let discord_webhook_url = parse_url(ENV_DISCORD_WEBHOOK_URL, &required(ENV_DISCORD_WEBHOOK_URL)?)?;
        let slack_webhook_url = get(ENV_SLACK_WEBHOOK_URL)
            .map(|v| parse_url(ENV_SLACK_WEBHOOK_URL, &v))
            .transpose()?;
        let embed_thumbnail_url = get(ENV_EMBED_THUMBNAIL_URL)
            .map(|v| parse_url(ENV_EMBED_THUMBNAIL_URL, &v))
            .transpose()?;

        let poll_interval = Duration::from_secs(positive(ENV_TIMEOUT, get(ENV_TIMEOUT), DEFAULT_POLL_INTERVAL_SECS)?);
        let max_attempts = positive(ENV_LOGIN_RETRY_MAX, get(ENV_LOGIN_RETRY_MAX), DEFAULT_LOGIN_RETRY_MAX as u64)?;
        let max_attempts = u32::try_from(max_attempts)
            .with_context(|| format!("{ENV_LOGIN_RETRY_MAX} is too large"))?;
        let retry_delay = Duration::from_secs(non_negative(
            ENV_LOGIN_RETRY_DELAY,
            get(ENV_LOGIN_RETRY_DELAY),
            DEFAULT_LOGIN_RETRY_DELAY_SECS,
        )?);
        let http_timeout = Duration::from_secs(positive(ENV_HTTP_TIMEOUT, get(ENV_HTTP_TIMEOUT), DEFAULT_HTTP_TIMEOUT_SECS)?);

        let first_run = match get(ENV_FIRST_RUN_POLICY) {
            Some(v) => v
                .parse::<FirstRunPolicy>()
                .map_err(|e| anyhow!("{ENV_FIRST_RUN_POLICY}: {e}"))?,
            None => FirstRunPolicy::default(),
        };

        let session_cookie_name =
            get(ENV_SESSION_COOKIE_NAME).unwrap_or_else(|| DEFAULT_SESSION_COOKIE_NAME.to_string());
        if session_cookie_name.contains(['=', ';', ' ']) {
            bail!("{ENV_SESSION_COOKIE_NAME} is not a valid cookie name");
        }

        Ok(Self {
            credentials: Credentials::new(username, password),
            cas_url,
            service_url,
            service_callback_url,
            save_path,
            discord_webhook_url,
            slack_webhook_url,
            embed_thumbnail_url,
            poll_interval,
            retry: RetryPolicy {
                max_attempts,
                delay: retry_delay,
            },
            user_agent: get(ENV_USER_AGENT).unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            session_cookie_name,
            portal_language: get(ENV_PORTAL_LANGUAGE)
                .unwrap_or_else(|| DEFAULT_PORTAL_LANGUAGE.to_string()),
            first_run,
            http_timeout,
        })
    }
}

fn ensure_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("{key} is not a valid URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("{key} must be an http(s) URL");
    }
    Ok(url)
}

fn non_negative(key: &str, raw: Option<String>, default: u64) -> Result<u64> {
    match raw {
        Some(v) => v
            .parse::<u64>()
            .with_context(|| format!("{key} must be a whole number of seconds/attempts, got `{v}`")),
        None => Ok(default),
    }
}

fn positive(key: &str, raw: Option<String>, default: u64) -> Result<u64> {
    let v = non_negative(key, raw, default)?;
    if v == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(v)
}
