// tests/store_roundtrip.rs
use chrono::NaiveDate;
use grades_tracker::grades::fingerprint_all;
use grades_tracker::store::GradeStore;
use grades_tracker::{FingerprintedGrade, GradeRecord, StoreError, Subject};

fn record(id: &str, grade: Option<f64>) -> GradeRecord {
    GradeRecord {
        subject: Subject {
            short: "R2.03".into(),
            full: None,
        },
        evaluation: format!("Contrôle {id}"),
        date: NaiveDate::from_ymd_opt(2024, 3, 4),
        comment: "RAS".into(),
        grade,
        coefficient: None,
        id: Some(id.into()),
    }
}

fn snapshot() -> Vec<FingerprintedGrade> {
    fingerprint_all(vec![record("1", Some(12.5)), record("2", None)])
}

#[tokio::test]
async fn save_then_load_returns_same_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = GradeStore::new(dir.path().join("grades.json"));

    let x = snapshot();
    store.save(&x).await.expect("save");
    assert_eq!(store.load().await.expect("load"), x);
}

#[tokio::test]
async fn empty_snapshot_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = GradeStore::new(dir.path().join("grades.json"));

    store.save(&[]).await.expect("save");
    assert!(store.load().await.expect("load").is_empty());
    assert_eq!(store.load_baseline().await.unwrap(), Some(Vec::new()));
}

#[tokio::test]
async fn save_creates_parent_dirs_and_overwrites_fully() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/state/grades.json");
    let store = GradeStore::new(&path);

    assert!(!store.exists().await.unwrap());
    assert_eq!(store.load_baseline().await.unwrap(), None);

    store.save(&snapshot()).await.expect("first save");
    let smaller = fingerprint_all(vec![record("3", Some(9.0))]);
    store.save(&smaller).await.expect("second save");

    assert_eq!(store.load().await.unwrap(), smaller);
    assert!(!path.with_file_name("grades.json.tmp").exists());
}

#[tokio::test]
async fn malformed_content_is_reported_as_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grades.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store = GradeStore::new(&path);
    match store.load().await {
        Err(StoreError::Corrupt { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected Corrupt, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_file_is_an_io_error_for_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = GradeStore::new(dir.path().join("absent.json"));
    assert!(matches!(store.load().await, Err(StoreError::Io { .. })));
}
