//! Fire-and-forget absence alerts to guardians.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::models::Student;
use crate::notify::Notifier;

#[derive(Clone)]
pub struct AbsenceAlerts {
    notifier: Arc<dyn Notifier>,
}

impl AbsenceAlerts {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Spawn one send per absentee with a guardian contact and return how
    /// many were started. Delivery failures are logged, never returned.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, subject: &str, date: NaiveDate, absentees: &[Student]) -> usize {
        let mut started = 0;
        for student in absentees {
            let Some(contact) = student.guardian_contact.clone() else {
                debug!(student = %student.student_id, "No guardian contact, skipping alert");
                continue;
            };

            let message = absence_message(student, subject, date);
            let notifier = Arc::clone(&self.notifier);
            let student_id = student.student_id.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.send(&contact, &message).await {
                    warn!(student = %student_id, error = %e, "Failed to deliver absence alert");
                }
            });
            started += 1;
        }
        started
    }
}

pub fn absence_message(student: &Student, subject: &str, date: NaiveDate) -> String {
    format!(
        "Attendance alert: {} ({}) was marked absent for {} on {}.",
        student.name, student.student_id, subject, date
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudentRef;
    use crate::notify::NotifyError;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use tokio::sync::mpsc;

    struct RecordingNotifier {
        tx: mpsc::UnboundedSender<(String, String)>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, contact: &str, message: &str) -> Result<(), NotifyError> {
            let _ = self.tx.send((contact.to_string(), message.to_string()));
            if self.fail {
                Err(NotifyError::InvalidContact(contact.to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn student(key: u64, id: &str, name: &str, contact: Option<&str>) -> Student {
        Student {
            key: StudentRef(key),
            student_id: id.to_string(),
            name: name.to_string(),
            guardian_contact: contact.map(str::to_string),
            subjects: BTreeMap::new(),
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
    }

    #[test]
    fn test_absence_message_text() {
        let s = student(1, "C", "Chen", None);
        assert_eq!(
            absence_message(&s, "Math", day()),
            "Attendance alert: Chen (C) was marked absent for Math on 2024-01-10."
        );
    }

    #[tokio::test]
    async fn test_dispatch_skips_students_without_contact() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let alerts = AbsenceAlerts::new(Arc::new(RecordingNotifier { tx, fail: false }));
        let absentees = vec![
            student(1, "A", "Asha", Some("+15550001111")),
            student(2, "B", "Bilal", None),
        ];

        assert_eq!(alerts.dispatch("Math", day(), &absentees), 1);
        let (contact, message) = rx.recv().await.expect("one alert sent");
        assert_eq!(contact, "+15550001111");
        assert!(message.contains("Asha (A)"));
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let alerts = AbsenceAlerts::new(Arc::new(RecordingNotifier { tx, fail: true }));
        let absentees = vec![
            student(1, "A", "Asha", Some("1")),
            student(2, "B", "Bilal", Some("2")),
        ];

        assert_eq!(alerts.dispatch("Math", day(), &absentees), 2);
        let mut contacts = vec![rx.recv().await.unwrap().0, rx.recv().await.unwrap().0];
        contacts.sort();
        assert_eq!(contacts, vec!["1", "2"]);
    }
}
