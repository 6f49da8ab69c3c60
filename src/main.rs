//! Grades tracker binary entrypoint.
//! Loads configuration, logs in to the portal and polls for new grades
//! until a critical failure, then exits with status 1.

use grades_tracker::{Tracker, TrackerConfig};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `RUST_LOG` wins; otherwise info for this crate, warn for dependencies.
/// `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("grades_tracker=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() {
    // .env must be loaded before RUST_LOG/LOG_FORMAT are read.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = match TrackerConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %format!("{e:#}"), "invalid configuration");
            std::process::exit(2);
        }
    };
    info!(
        portal = %cfg.service_url,
        save_path = %cfg.save_path.display(),
        poll_secs = cfg.poll_interval.as_secs(),
        max_login_attempts = cfg.retry.max_attempts,
        "starting grades tracker"
    );

    let tracker = match Tracker::from_config(&cfg) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %format!("{e:#}"), "could not build tracker");
            std::process::exit(2);
        }
    };

    let failure = tracker.run().await;
    error!(error = %failure, "tracker stopped");
    std::process::exit(1);
}
