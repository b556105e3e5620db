use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::student::StudentRef;

/// Composite key of an attendance record: one record per subject and day.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub subject: String,
    pub date: NaiveDate,
}

impl RecordKey {
    pub fn new(subject: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            subject: subject.into(),
            date,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.subject, self.date.format("%Y-%m-%d"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub subject: String,
    pub date: NaiveDate,
    #[serde(rename = "presentStudents", default)]
    pub present_students: BTreeSet<StudentRef>,
    /// Set once counters have been applied for this record
    #[serde(default)]
    pub counted: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn new(key: RecordKey, present_students: BTreeSet<StudentRef>) -> Self {
        let now = Utc::now();
        Self {
            subject: key.subject,
            date: key.date,
            present_students,
            counted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.subject.clone(), self.date)
    }

    pub fn is_present(&self, student: StudentRef) -> bool {
        self.present_students.contains(&student)
    }

    /// Replace the present set wholesale (last write wins)
    pub fn overwrite(&mut self, present_students: BTreeSet<StudentRef>) {
        self.present_students = present_students;
        self.updated_at = Utc::now();
    }

    /// Apply a single-student edit. Returns `true` if the set changed.
    pub fn toggle(&mut self, student: StudentRef, presence: Presence) -> bool {
        let changed = match presence {
            Presence::Present => self.present_students.insert(student),
            Presence::Absent => self.present_students.remove(&student),
        };
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[serde(alias = "Present")]
    Present,
    #[serde(alias = "Absent")]
    Absent,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presence::Present => write!(f, "present"),
            Presence::Absent => write!(f, "absent"),
        }
    }
}
