//! Demo that pushes a sample "new grades" message and an error alert through
//! the configured channels, to check webhook URLs without touching the portal.

use chrono::NaiveDate;
use grades_tracker::notify::message;
use grades_tracker::{FingerprintedGrade, GradeRecord, Notifier, NotifierMux, Subject, TrackerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let cfg = TrackerConfig::from_env()?;
    let mux = NotifierMux::from_config(&cfg);

    let sample = FingerprintedGrade::new(GradeRecord {
        subject: Subject {
            short: "R1.01".into(),
            full: Some("Initiation au développement".into()),
        },
        evaluation: "Demo evaluation".into(),
        date: NaiveDate::from_ymd_opt(2024, 1, 15),
        comment: "notify-demo".into(),
        grade: Some(15.5),
        coefficient: Some(2.0),
        id: None,
    });

    mux.send(&message::new_grades(&[sample])).await?;
    tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    mux.send(&message::bad_news("notify-demo: this is only a test")).await?;

    println!("notify-demo done");
    Ok(())
}
