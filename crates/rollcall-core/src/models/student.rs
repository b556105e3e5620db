use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Store-assigned internal reference to a student document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentRef(pub u64);

impl fmt::Display for StudentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Cumulative attendance tallies for one subject.
///
/// Both fields only ever grow, and `attended_classes <= total_classes`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectCounters {
    #[serde(rename = "attendedClasses")]
    pub attended_classes: u32,
    #[serde(rename = "totalClasses")]
    pub total_classes: u32,
}

impl SubjectCounters {
    pub fn record_present(&mut self) {
        self.attended_classes += 1;
        self.total_classes += 1;
    }

    pub fn record_absent(&mut self) {
        self.total_classes += 1;
    }

    /// Attendance as a percentage, or `None` before the first class
    pub fn percentage(&self) -> Option<f64> {
        if self.total_classes == 0 {
            None
        } else {
            Some(f64::from(self.attended_classes) * 100.0 / f64::from(self.total_classes))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    #[serde(rename = "ref")]
    pub key: StudentRef,
    #[serde(rename = "studentID")]
    pub student_id: String,
    pub name: String,
    #[serde(rename = "guardianContact", default)]
    pub guardian_contact: Option<String>,
    #[serde(default)]
    pub subjects: BTreeMap<String, SubjectCounters>,
}

impl Student {
    /// Counters for a subject, zeroed if the student has never been counted in it
    pub fn counters(&self, subject: &str) -> SubjectCounters {
        self.subjects.get(subject).copied().unwrap_or_default()
    }

    pub fn summary(&self) -> StudentSummary {
        StudentSummary {
            student_id: self.student_id.clone(),
            name: self.name.clone(),
        }
    }
}

/// The `{studentID, name}` projection used by listings and registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSummary {
    #[serde(rename = "studentID")]
    pub student_id: String,
    pub name: String,
}
