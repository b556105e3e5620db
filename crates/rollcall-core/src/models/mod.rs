//! Data models for attendance entities.
//!
//! - `Student`, `SubjectCounters`: directory entries with per-subject tallies
//! - `AttendanceRecord`, `RecordKey`: one present set per subject and day
//! - `ClassInfo`: stream/year groupings and the subjects they take

pub mod attendance;
pub mod class;
pub mod student;

pub use attendance::{AttendanceRecord, Presence, RecordKey};
pub use class::ClassInfo;
pub use student::{Student, StudentRef, StudentSummary, SubjectCounters};
