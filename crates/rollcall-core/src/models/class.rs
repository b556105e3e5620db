use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stream/year grouping and the subjects taught to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub stream: String,
    pub year: String,
    pub subjects: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl ClassInfo {
    /// Build a class entry, trimming names and dropping blank subjects.
    /// Returns `None` if the stream, year or subject list ends up empty.
    pub fn new(stream: &str, year: &str, subjects: &[String]) -> Option<Self> {
        let stream = stream.trim();
        let year = year.trim();
        let subjects: Vec<String> = subjects
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if stream.is_empty() || year.is_empty() || subjects.is_empty() {
            return None;
        }

        Some(Self {
            stream: stream.to_string(),
            year: year.to_string(),
            subjects,
            created_at: Utc::now(),
        })
    }
}
