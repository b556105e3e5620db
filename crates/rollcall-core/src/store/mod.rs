//! Document storage for students, attendance records and classes.
//!
//! `AttendanceStore` is the seam the reconciler talks to. Every method is a
//! single atomic unit: upserts, toggles and counter increments never
//! interleave with other writers.
//!
//! `DocumentStore` keeps all collections in memory and, when opened on a
//! directory, rewrites one JSON file per collection after each mutation.

pub mod document;

use std::collections::BTreeSet;

use thiserror::Error;

use crate::models::{AttendanceRecord, ClassInfo, Presence, RecordKey, Student, StudentRef};

pub use document::{DocumentStore, Snapshot};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Student ID already registered: {0}")]
    DuplicateStudent(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt document: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result of an upsert keyed by (subject, date).
#[derive(Debug, Clone)]
pub struct Upserted {
    pub record: AttendanceRecord,
    pub created: bool,
}

/// Result of applying counter increments for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountOutcome {
    /// Increments were applied and the record is now marked counted
    Applied { present: usize, absent: usize },
    /// The record was already counted; nothing changed
    AlreadyCounted,
}

pub trait AttendanceStore: Send + Sync {
    // ===== Student directory =====

    fn find_student(&self, student_id: &str) -> StoreResult<Option<Student>>;

    /// All students, ordered by external ID
    fn list_students(&self) -> StoreResult<Vec<Student>>;

    fn insert_student(
        &self,
        student_id: &str,
        name: &str,
        guardian_contact: Option<String>,
    ) -> StoreResult<Student>;

    // ===== Attendance records =====

    fn find_record(&self, key: &RecordKey) -> StoreResult<Option<AttendanceRecord>>;

    /// Create the record for `key`, or overwrite its present set.
    fn upsert_record(&self, key: &RecordKey, present: BTreeSet<StudentRef>)
        -> StoreResult<Upserted>;

    /// Add or remove one student. Returns `None` if the record does not exist.
    fn toggle_presence(
        &self,
        key: &RecordKey,
        student: StudentRef,
        presence: Presence,
    ) -> StoreResult<Option<AttendanceRecord>>;

    /// Records for one subject, ordered by date ascending
    fn records_for_subject(&self, subject: &str) -> StoreResult<Vec<AttendanceRecord>>;

    /// Increment counters for the record's present set and for every other
    /// student in `all_students`, then mark the record counted. A record that
    /// is already counted is left untouched. Returns `None` if the record
    /// does not exist.
    fn apply_counts(
        &self,
        key: &RecordKey,
        all_students: &[StudentRef],
    ) -> StoreResult<Option<CountOutcome>>;

    // ===== Classes =====

    fn insert_class(&self, class: ClassInfo) -> StoreResult<()>;

    fn list_classes(&self) -> StoreResult<Vec<ClassInfo>>;
}
