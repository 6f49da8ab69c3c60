// src/tracker.rs
//! # Poll orchestrator
//! The long-running loop, modelled as an explicit state machine:
//!
//! ```text
//! Starting -> Authenticating(Initial) -> ResolvingIdentity -> Polling
//! Polling  -> Sleeping -> Polling                      (normal cycle, or reported error)
//! Polling  -> Authenticating(SessionExpired) -> Polling (same cycle, no sleep)
//! any login / identity failure -> Failed (terminal)
//! ```
//!
//! One transition runs at a time, so the session and the snapshot file each
//! have a single writer.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::auth::Authenticator;
use crate::config::TrackerConfig;
use crate::error::{CriticalFailure, CycleError, PortalError};
use crate::grades::{self, GradeDiff};
use crate::http;
use crate::notify::{message, Notifier, NotifierMux};
use crate::portal::{GradePortal, PortalClient};
use crate::session::PortalSession;
use crate::sso::SsoHandshake;
use crate::store::{FirstRunPolicy, GradeStore};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("tracker_login_attempts_total", "SSO handshake attempts.");
        describe_counter!("tracker_login_failures_total", "Failed SSO handshake attempts.");
        describe_counter!(
            "tracker_session_expired_total",
            "Portal session expiries detected while polling."
        );
        describe_counter!("tracker_cycles_total", "Poll cycles started.");
        describe_counter!(
            "tracker_cycle_errors_total",
            "Poll cycles aborted by a reported error."
        );
        describe_counter!("tracker_new_grades_total", "Grades announced as new.");
        describe_gauge!(
            "tracker_last_cycle_ts",
            "Unix ts of the last successful poll cycle."
        );
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthReason {
    Initial,
    SessionExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Starting,
    Authenticating(AuthReason),
    ResolvingIdentity,
    Polling,
    Sleeping,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    pub poll_interval: Duration,
    pub first_run: FirstRunPolicy,
}

/// Outcome of one successful poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub fetched: usize,
    pub new: usize,
    pub notified: bool,
    /// The snapshot was created from this fetch without announcing anything.
    pub seeded: bool,
}

pub struct Tracker {
    portal: Box<dyn GradePortal>,
    authenticator: Authenticator,
    store: GradeStore,
    notifier: Arc<dyn Notifier>,
    settings: TrackerSettings,
    state: TrackerState,
    slug: Option<String>,
    resumed_after_relogin: bool,
    last_report: Option<CycleReport>,
    failure: Option<CriticalFailure>,
}

impl Tracker {
    pub fn new(
        portal: Box<dyn GradePortal>,
        authenticator: Authenticator,
        store: GradeStore,
        notifier: Arc<dyn Notifier>,
        settings: TrackerSettings,
    ) -> Self {
        ensure_metrics_described();
        Self {
            portal,
            authenticator,
            store,
            notifier,
            settings,
            state: TrackerState::Starting,
            slug: None,
            resumed_after_relogin: false,
            last_report: None,
            failure: None,
        }
    }

    /// Wire the production collaborators. No network traffic happens here.
    pub fn from_config(cfg: &TrackerConfig) -> anyhow::Result<Self> {
        let client = http::build_client(&cfg.user_agent, cfg.http_timeout)
            .context("building HTTP client")?;

        let handshake = SsoHandshake::new(
            client.clone(),
            cfg.cas_url.clone(),
            cfg.service_callback_url.clone(),
            cfg.session_cookie_name.clone(),
        );
        let authenticator = Authenticator::new(Box::new(handshake), cfg.credentials.clone(), cfg.retry);
        let portal = PortalClient::new(
            client,
            &cfg.service_url,
            &cfg.portal_language,
            PortalSession::new(cfg.session_cookie_name.clone()),
        );
        let notifier = NotifierMux::from_config(cfg);
        info!(channels = ?notifier.channel_names(), "notification channels ready");

        Ok(Self::new(
            Box::new(portal),
            authenticator,
            GradeStore::new(&cfg.save_path),
            Arc::new(notifier),
            TrackerSettings {
                poll_interval: cfg.poll_interval,
                first_run: cfg.first_run,
            },
        ))
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report
    }

    pub fn failure(&self) -> Option<&CriticalFailure> {
        self.failure.as_ref()
    }

    /// Run until a critical failure and return it. There is no success exit.
    pub async fn run(mut self) -> CriticalFailure {
        loop {
            self.advance().await;
            if let Some(failure) = self.failure.take() {
                return failure;
            }
        }
    }

    /// Perform exactly one transition and return the new state.
    pub async fn advance(&mut self) -> TrackerState {
        let next = match self.state {
            TrackerState::Starting => TrackerState::Authenticating(AuthReason::Initial),
            TrackerState::Authenticating(reason) => self.authenticate(reason).await,
            TrackerState::ResolvingIdentity => self.resolve_identity().await,
            TrackerState::Polling => self.poll().await,
            TrackerState::Sleeping => {
                debug!(secs = self.settings.poll_interval.as_secs(), "sleeping until next cycle");
                tokio::time::sleep(self.settings.poll_interval).await;
                TrackerState::Polling
            }
            TrackerState::Failed => TrackerState::Failed,
        };
        debug!(from = ?self.state, to = ?next, "tracker transition");
        self.state = next;
        next
    }

    fn fail(&mut self, failure: CriticalFailure) -> TrackerState {
        error!(error = %failure, "critical failure");
        self.failure = Some(failure);
        TrackerState::Failed
    }

    async fn authenticate(&mut self, reason: AuthReason) -> TrackerState {
        if let Err(e) = self.authenticator.login(self.portal.session_mut()).await {
            if reason == AuthReason::SessionExpired {
                error!("re-login after session expiry failed");
            }
            return self.fail(e);
        }

        if reason == AuthReason::SessionExpired {
            info!("re-login successful, resuming fetch");
            self.resumed_after_relogin = true;
        }
        if self.slug.is_some() {
            TrackerState::Polling
        } else {
            TrackerState::ResolvingIdentity
        }
    }

    async fn resolve_identity(&mut self) -> TrackerState {
        match self.portal.identity_slug().await {
            Ok(Some(slug)) => {
                info!("identity resolved");
                self.slug = Some(slug);
                TrackerState::Polling
            }
            Ok(None) => self.fail(CriticalFailure::IdentityUnavailable(
                "no profile link on the profile page".to_string(),
            )),
            Err(e) => self.fail(CriticalFailure::IdentityUnavailable(e.to_string())),
        }
    }

    async fn poll(&mut self) -> TrackerState {
        counter!("tracker_cycles_total").increment(1);
        match self.poll_cycle().await {
            Ok(report) => {
                self.resumed_after_relogin = false;
                self.last_report = Some(report);
                gauge!("tracker_last_cycle_ts").set(chrono::Utc::now().timestamp() as f64);
                TrackerState::Sleeping
            }
            Err(CycleError::SessionExpired) => {
                counter!("tracker_session_expired_total").increment(1);
                if self.resumed_after_relogin {
                    return self.fail(CriticalFailure::SessionRejectedAfterRelogin);
                }
                warn!("session expired, attempting to re-login");
                TrackerState::Authenticating(AuthReason::SessionExpired)
            }
            Err(e) => {
                self.resumed_after_relogin = false;
                counter!("tracker_cycle_errors_total").increment(1);
                error!(error = %e, "poll cycle failed, keeping previous snapshot");
                self.report_bad_news(&e).await;
                TrackerState::Sleeping
            }
        }
    }

    /// fetch -> load baseline -> diff -> notify -> save. The snapshot is only
    /// written once everything before it succeeded.
    async fn poll_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let slug = self
            .slug
            .clone()
            .ok_or(CycleError::Portal(PortalError::MissingElement("identity slug")))?;

        info!("fetching grades");
        let fresh = self.portal.fetch_grades(&slug).await?;
        let fetched = fresh.len();

        let baseline = match self.store.load_baseline().await? {
            Some(baseline) => baseline,
            None => match self.settings.first_run {
                FirstRunPolicy::NotifyAll => {
                    info!(path = %self.store.path().display(), "no snapshot yet, starting from an empty one");
                    self.store.save(&[]).await?;
                    Vec::new()
                }
                FirstRunPolicy::SeedSilently => {
                    let complete = grades::fingerprint_all(fresh);
                    self.store.save(&complete).await?;
                    info!(
                        path = %self.store.path().display(),
                        grades = fetched,
                        "no snapshot yet, seeded it without announcing"
                    );
                    return Ok(CycleReport {
                        fetched,
                        seeded: true,
                        ..CycleReport::default()
                    });
                }
            },
        };

        let GradeDiff { new, complete } = grades::diff(fresh, &baseline);

        let notified = if new.is_empty() {
            info!(fetched, "no new grades detected");
            false
        } else {
            self.notifier
                .send(&message::new_grades(&new))
                .await
                .map_err(CycleError::Notify)?;
            counter!("tracker_new_grades_total").increment(new.len() as u64);
            info!(fetched, new = new.len(), "new grades announced");
            true
        };

        self.store.save(&complete).await?;

        Ok(CycleReport {
            fetched,
            new: new.len(),
            notified,
            seeded: false,
        })
    }

    async fn report_bad_news(&self, err: &CycleError) {
        if let Err(e) = self.notifier.send(&message::bad_news(&err.to_string())).await {
            warn!(error = %format!("{e:#}"), "could not deliver error alert");
        }
    }
}
