// src/grades.rs
//! # Grade records, fingerprints and the diff engine
//!
//! A fingerprint is a SHA-256 over a canonical serialization with a fixed
//! field order, so two records with equal values always hash the same no
//! matter how they were built or deserialized.
//!
//! Canonical field order:
//! `subject.short, subject.full, evaluation, date, comment, grade, coefficient, id`

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub short: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full: Option<String>,
}

/// One row of the portal's grades table. `grade`/`coefficient` are `None`
/// while the portal has not published a value; `date` is `None` when the
/// cell could not be parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub subject: Subject,
    pub evaluation: String,
    pub date: Option<NaiveDate>,
    pub comment: String,
    pub grade: Option<f64>,
    pub coefficient: Option<f64>,
    pub id: Option<String>,
}

/// A grade plus its content fingerprint, as persisted in the snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintedGrade {
    #[serde(flatten)]
    pub record: GradeRecord,
    pub fingerprint: String,
}

impl FingerprintedGrade {
    pub fn new(record: GradeRecord) -> Self {
        let fingerprint = fingerprint(&record);
        Self {
            record,
            fingerprint,
        }
    }
}

/// Canonical serialization: a JSON array in the documented field order.
pub fn canonical_form(record: &GradeRecord) -> String {
    serde_json::json!([
        record.subject.short,
        record.subject.full,
        record.evaluation,
        record.date.map(|d| d.format("%Y-%m-%d").to_string()),
        record.comment,
        record.grade,
        record.coefficient,
        record.id,
    ])
    .to_string()
}

/// Hex SHA-256 of the canonical form.
pub fn fingerprint(record: &GradeRecord) -> String {
    let digest = Sha256::digest(canonical_form(record).as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub fn fingerprint_all(records: Vec<GradeRecord>) -> Vec<FingerprintedGrade> {
    records.into_iter().map(FingerprintedGrade::new).collect()
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GradeDiff {
    /// Records whose fingerprint is absent from the baseline, in fresh order.
    pub new: Vec<FingerprintedGrade>,
    /// The whole fresh set, fingerprinted: the next baseline.
    pub complete: Vec<FingerprintedGrade>,
}

impl GradeDiff {
    pub fn has_new(&self) -> bool {
        !self.new.is_empty()
    }
}

/// Set difference by fingerprint: O(n + m) over a hash set of the baseline.
pub fn diff(fresh: Vec<GradeRecord>, baseline: &[FingerprintedGrade]) -> GradeDiff {
    let known: HashSet<&str> = baseline.iter().map(|g| g.fingerprint.as_str()).collect();
    let complete = fingerprint_all(fresh);
    let new = complete
        .iter()
        .filter(|g| !known.contains(g.fingerprint.as_str()))
        .cloned()
        .collect();
    GradeDiff { new, complete }
}
