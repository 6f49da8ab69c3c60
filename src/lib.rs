// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod auth;
pub mod config;
pub mod error;
pub mod grades;
pub mod html;
pub mod http;
pub mod notify;
pub mod portal;
pub mod session;
pub mod sso;
pub mod store;
pub mod tracker;

// ---- Re-exports for stable public API ----
pub use crate::config::TrackerConfig;
pub use crate::error::{AuthError, CriticalFailure, CycleError, PortalError, StoreError};
pub use crate::grades::{FingerprintedGrade, GradeRecord, Subject};
pub use crate::notify::{NotificationMessage, Notifier, NotifierMux};
pub use crate::tracker::{Tracker, TrackerState};
