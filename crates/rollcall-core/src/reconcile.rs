//! Attendance reconciliation.
//!
//! `Reconciler` turns a day's submission into an upserted record, applies the
//! per-student counters exactly once per record, and derives absentees.
//!
//! # Invariants
//! - At most one record exists per (subject, day).
//! - Submissions overwrite the present set; toggles edit it in place.
//! - Counters move only when a record is counted for the first time. The
//!   store checks and sets the record's `counted` flag together with the
//!   increments, so retries and re-submissions never double count.
//! - Toggles never touch counters. `counter_drift` reports the resulting
//!   mismatch by re-deriving counters from the register.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::IdResolution;
use crate::error::{AttendanceError, Result};
use crate::models::{
    AttendanceRecord, Presence, RecordKey, Student, StudentRef, StudentSummary, SubjectCounters,
};
use crate::store::{AttendanceStore, CountOutcome};
use crate::utils::parse_calendar_date;

/// Result of `submit` and `update`.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub record: AttendanceRecord,
    pub absentees: Vec<Student>,
    /// Submitted IDs that matched no student (lenient resolution only)
    pub skipped: Vec<String>,
    pub created: bool,
    pub counts: CountOutcome,
}

impl SubmitOutcome {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }

    /// Whether this call was the one that applied the counters
    pub fn newly_counted(&self) -> bool {
        matches!(self.counts, CountOutcome::Applied { .. })
    }
}

/// Result of a multi-date table edit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub applied: Vec<NaiveDate>,
    /// Date keys left out: unparsable, rejected ID lists, or a second key
    /// for a day already applied in the same batch
    pub skipped_dates: Vec<String>,
    /// Student IDs dropped from applied entries, deduplicated
    pub unknown_ids: Vec<String>,
}

impl BatchOutcome {
    pub fn is_partial(&self) -> bool {
        !self.skipped_dates.is_empty() || !self.unknown_ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterEntry {
    pub date: NaiveDate,
    /// Present students by external ID, sorted
    pub present: Vec<String>,
    pub counted: bool,
}

/// Full date-ordered attendance sheet for one subject.
#[derive(Debug, Clone, Serialize)]
pub struct Register {
    pub subject: String,
    pub students: Vec<StudentSummary>,
    pub entries: Vec<RegisterEntry>,
}

/// A student whose stored counters disagree with the register.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterDrift {
    #[serde(rename = "studentID")]
    pub student_id: String,
    pub stored: SubjectCounters,
    pub derived: SubjectCounters,
}

struct Resolved {
    refs: BTreeSet<StudentRef>,
    unknown: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Upsert,
    UpdateOnly,
}

pub struct Reconciler {
    store: Arc<dyn AttendanceStore>,
    id_resolution: IdResolution,
}

impl Reconciler {
    pub fn new(store: Arc<dyn AttendanceStore>, id_resolution: IdResolution) -> Self {
        Self {
            store,
            id_resolution,
        }
    }

    pub fn id_resolution(&self) -> IdResolution {
        self.id_resolution
    }

    /// Record a day's attendance, creating the record on first submission
    /// and overwriting its present set afterwards.
    pub fn submit(&self, subject: &str, date: &str, present_ids: &[String]) -> Result<SubmitOutcome> {
        self.write(subject, date, present_ids, WriteMode::Upsert)
    }

    /// Overwrite an existing record's present set. Fails with `NotFound`
    /// if nothing was submitted for that subject and day yet.
    pub fn update(&self, subject: &str, date: &str, present_ids: &[String]) -> Result<SubmitOutcome> {
        self.write(subject, date, present_ids, WriteMode::UpdateOnly)
    }

    fn write(
        &self,
        subject: &str,
        date: &str,
        present_ids: &[String],
        mode: WriteMode,
    ) -> Result<SubmitOutcome> {
        let key = record_key(subject, date)?;
        let students = self.store.list_students()?;
        let resolved = self.resolve(&students, present_ids)?;

        if mode == WriteMode::UpdateOnly && self.store.find_record(&key)?.is_none() {
            return Err(AttendanceError::not_found(format!(
                "no attendance record for {}",
                key
            )));
        }

        let upserted = self.store.upsert_record(&key, resolved.refs)?;
        let all_refs: Vec<StudentRef> = students.iter().map(|s| s.key).collect();
        let counts = self.reconcile_counters(&key, &all_refs)?;

        let (record, students) = match counts {
            CountOutcome::Applied { .. } => (
                self.store.find_record(&key)?.unwrap_or(upserted.record),
                self.store.list_students()?,
            ),
            CountOutcome::AlreadyCounted => (upserted.record, students),
        };
        let absentees = absent_from(&record, students);

        info!(
            record = %key,
            created = upserted.created,
            present = record.present_students.len(),
            absent = absentees.len(),
            skipped = resolved.unknown.len(),
            counts = ?counts,
            "Attendance recorded"
        );

        Ok(SubmitOutcome {
            record,
            absentees,
            skipped: resolved.unknown,
            created: upserted.created,
            counts,
        })
    }

    /// Apply the counters for one record: +1 attended and +1 total for each
    /// present student, +1 total for everyone else in `all_students`.
    /// A record that is already counted is left as is.
    pub fn reconcile_counters(
        &self,
        key: &RecordKey,
        all_students: &[StudentRef],
    ) -> Result<CountOutcome> {
        let outcome = self
            .store
            .apply_counts(key, all_students)?
            .ok_or_else(|| AttendanceError::not_found(format!("no attendance record for {}", key)))?;
        if outcome == CountOutcome::AlreadyCounted {
            debug!(record = %key, "Counters already applied");
        }
        Ok(outcome)
    }

    /// Count a stored record against the current student list if that has
    /// not happened yet.
    pub fn finalize(&self, subject: &str, date: &str) -> Result<CountOutcome> {
        let key = record_key(subject, date)?;
        let all_refs: Vec<StudentRef> = self.store.list_students()?.iter().map(|s| s.key).collect();
        self.reconcile_counters(&key, &all_refs)
    }

    /// Mark one student present or absent on an existing record.
    /// Counters are not touched.
    pub fn apply_toggle(
        &self,
        subject: &str,
        date: &str,
        student_id: &str,
        presence: Presence,
    ) -> Result<AttendanceRecord> {
        let key = record_key(subject, date)?;
        let student = self
            .store
            .find_student(student_id.trim())?
            .ok_or_else(|| AttendanceError::not_found(format!("student {}", student_id.trim())))?;

        let record = self
            .store
            .toggle_presence(&key, student.key, presence)?
            .ok_or_else(|| AttendanceError::not_found(format!("no attendance record for {}", key)))?;

        info!(record = %key, student = %student.student_id, presence = %presence, "Attendance toggled");
        Ok(record)
    }

    /// Overwrite present sets for several days at once (the register table
    /// editor). Bad dates and unknown IDs are reported in the outcome; the
    /// remaining entries are applied. Keys are visited in map order, so when
    /// two keys name the same day the first one wins and the other is
    /// skipped. Counters are not touched.
    pub fn apply_batch(
        &self,
        subject: &str,
        updates: &BTreeMap<String, Vec<String>>,
    ) -> Result<BatchOutcome> {
        let subject = normalize_subject(subject)?;
        let students = self.store.list_students()?;
        let mut outcome = BatchOutcome::default();
        let mut seen_days = BTreeSet::new();
        let mut unknown_ids = BTreeSet::new();

        for (date, ids) in updates {
            let Some(day) = parse_calendar_date(date) else {
                outcome.skipped_dates.push(date.clone());
                continue;
            };
            if seen_days.contains(&day) {
                debug!(date = %date, day = %day, "Day already in batch, skipping");
                outcome.skipped_dates.push(date.clone());
                continue;
            }
            let resolved = match self.resolve(&students, ids) {
                Ok(resolved) => resolved,
                Err(AttendanceError::InvalidInput(reason)) => {
                    debug!(date = %day, reason = %reason, "Skipping batch entry");
                    outcome.skipped_dates.push(date.clone());
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.store
                .upsert_record(&RecordKey::new(subject.clone(), day), resolved.refs)?;
            seen_days.insert(day);
            outcome.applied.push(day);
            unknown_ids.extend(resolved.unknown);
        }
        outcome.unknown_ids = unknown_ids.into_iter().collect();

        info!(
            subject = %subject,
            applied = outcome.applied.len(),
            skipped_dates = outcome.skipped_dates.len(),
            unknown_ids = outcome.unknown_ids.len(),
            "Batch attendance update"
        );
        Ok(outcome)
    }

    /// Every record for a subject, oldest first
    pub fn build_register(&self, subject: &str) -> Result<Register> {
        let subject = normalize_subject(subject)?;
        let students = self.store.list_students()?;
        let ids: HashMap<StudentRef, &str> = students
            .iter()
            .map(|s| (s.key, s.student_id.as_str()))
            .collect();

        let entries = self
            .store
            .records_for_subject(&subject)?
            .into_iter()
            .map(|record| {
                let mut present: Vec<String> = record
                    .present_students
                    .iter()
                    .filter_map(|r| ids.get(r).map(|id| id.to_string()))
                    .collect();
                present.sort();
                RegisterEntry {
                    date: record.date,
                    present,
                    counted: record.counted,
                }
            })
            .collect();

        Ok(Register {
            subject,
            students: students.iter().map(Student::summary).collect(),
            entries,
        })
    }

    /// External IDs of a record's present students, sorted
    pub fn present_ids(&self, record: &AttendanceRecord) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_students()?
            .into_iter()
            .filter(|s| record.is_present(s.key))
            .map(|s| s.student_id)
            .collect())
    }

    /// Students not marked present on a stored record, along with the record
    pub fn absentees(&self, subject: &str, date: &str) -> Result<(AttendanceRecord, Vec<Student>)> {
        let key = record_key(subject, date)?;
        let record = self
            .store
            .find_record(&key)?
            .ok_or_else(|| AttendanceError::not_found(format!("no attendance record for {}", key)))?;
        let absent = absent_from(&record, self.store.list_students()?);
        Ok((record, absent))
    }

    /// Counters for a subject rebuilt from its counted records, keyed by
    /// external student ID.
    pub fn derive_counters(&self, subject: &str) -> Result<BTreeMap<String, SubjectCounters>> {
        let subject = normalize_subject(subject)?;
        let students = self.store.list_students()?;
        let records = self.store.records_for_subject(&subject)?;
        Ok(derive(&students, &records))
    }

    /// Students whose stored counters for `subject` differ from the
    /// counters derived from the register.
    pub fn counter_drift(&self, subject: &str) -> Result<Vec<CounterDrift>> {
        let subject = normalize_subject(subject)?;
        let students = self.store.list_students()?;
        let records = self.store.records_for_subject(&subject)?;
        let derived = derive(&students, &records);

        Ok(students
            .iter()
            .filter_map(|student| {
                let stored = student.counters(&subject);
                let derived = derived.get(&student.student_id).copied().unwrap_or_default();
                (stored != derived).then(|| CounterDrift {
                    student_id: student.student_id.clone(),
                    stored,
                    derived,
                })
            })
            .collect())
    }

    fn resolve(&self, students: &[Student], ids: &[String]) -> Result<Resolved> {
        let by_id: HashMap<&str, StudentRef> = students
            .iter()
            .map(|s| (s.student_id.as_str(), s.key))
            .collect();

        let mut wanted = BTreeSet::new();
        for id in ids {
            let id = id.trim();
            if id.is_empty() {
                return Err(AttendanceError::invalid("student ID list contains a blank entry"));
            }
            wanted.insert(id);
        }

        let mut refs = BTreeSet::new();
        let mut unknown = Vec::new();
        for id in wanted {
            match by_id.get(id) {
                Some(key) => {
                    refs.insert(*key);
                }
                None => unknown.push(id.to_string()),
            }
        }

        if self.id_resolution == IdResolution::Strict && !unknown.is_empty() {
            return Err(AttendanceError::invalid(format!(
                "unknown student IDs: {}",
                unknown.join(", ")
            )));
        }
        // An empty list marks everyone absent; a non-empty one must match someone
        if !ids.is_empty() && refs.is_empty() {
            return Err(AttendanceError::invalid(format!(
                "no registered student matches: {}",
                unknown.join(", ")
            )));
        }
        Ok(Resolved { refs, unknown })
    }
}

fn normalize_subject(subject: &str) -> Result<String> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(AttendanceError::invalid("subject is required"));
    }
    Ok(subject.to_string())
}

fn record_key(subject: &str, date: &str) -> Result<RecordKey> {
    let subject = normalize_subject(subject)?;
    let day = parse_calendar_date(date)
        .ok_or_else(|| AttendanceError::invalid(format!("unrecognized date `{}`", date)))?;
    Ok(RecordKey::new(subject, day))
}

fn absent_from(record: &AttendanceRecord, students: Vec<Student>) -> Vec<Student> {
    students
        .into_iter()
        .filter(|s| !record.is_present(s.key))
        .collect()
}

fn derive(students: &[Student], records: &[AttendanceRecord]) -> BTreeMap<String, SubjectCounters> {
    let mut derived: BTreeMap<String, SubjectCounters> = BTreeMap::new();
    for record in records.iter().filter(|r| r.counted) {
        for student in students {
            let counters = derived.entry(student.student_id.clone()).or_default();
            if record.is_present(student.key) {
                counters.record_present();
            } else {
                counters.record_absent();
            }
        }
    }
    derived
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentStore;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn setup(policy: IdResolution) -> (Arc<DocumentStore>, Reconciler) {
        let store = Arc::new(DocumentStore::in_memory());
        for (id, name) in [("A", "Asha"), ("B", "Bilal"), ("C", "Chen")] {
            store
                .insert_student(id, name, Some(format!("+1555000000{}", name.len())))
                .unwrap();
        }
        let reconciler = Reconciler::new(store.clone(), policy);
        (store, reconciler)
    }

    fn counters(store: &DocumentStore, id: &str, subject: &str) -> SubjectCounters {
        store.find_student(id).unwrap().unwrap().counters(subject)
    }

    fn absentee_ids(outcome: &SubmitOutcome) -> Vec<String> {
        outcome.absentees.iter().map(|s| s.student_id.clone()).collect()
    }

    #[test]
    fn test_submit_example_scenario() {
        let (store, reconciler) = setup(IdResolution::Lenient);

        let outcome = reconciler.submit("Math", "2024-01-10", &ids(&["A", "B"])).unwrap();
        assert!(outcome.created);
        assert!(outcome.newly_counted());
        assert_eq!(absentee_ids(&outcome), vec!["C"]);

        let register = reconciler.build_register("Math").unwrap();
        assert_eq!(register.entries.len(), 1);
        assert_eq!(register.entries[0].date, NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
        assert_eq!(register.entries[0].present, vec!["A", "B"]);

        assert_eq!(counters(&store, "A", "Math").attended_classes, 1);
        assert_eq!(counters(&store, "A", "Math").total_classes, 1);
        assert_eq!(counters(&store, "C", "Math").total_classes, 1);
        assert_eq!(counters(&store, "C", "Math").attended_classes, 0);
    }

    #[test]
    fn test_resubmission_does_not_double_count() {
        let (store, reconciler) = setup(IdResolution::Lenient);
        reconciler.submit("Math", "2024-01-10", &ids(&["A", "B"])).unwrap();

        let again = reconciler.submit("Math", "2024-01-10", &ids(&["A", "B"])).unwrap();
        assert!(!again.created);
        assert_eq!(again.counts, CountOutcome::AlreadyCounted);

        assert_eq!(counters(&store, "A", "Math"), SubjectCounters { attended_classes: 1, total_classes: 1 });
        assert_eq!(counters(&store, "C", "Math"), SubjectCounters { attended_classes: 0, total_classes: 1 });
    }

    #[test]
    fn test_resubmission_overwrites_present_set() {
        let (_store, reconciler) = setup(IdResolution::Lenient);
        reconciler.submit("Math", "2024-01-10", &ids(&["A", "B"])).unwrap();
        let outcome = reconciler.submit("Math", "2024-01-10T09:30:00Z", &ids(&["C"])).unwrap();
        assert_eq!(absentee_ids(&outcome), vec!["A", "B"]);

        let register = reconciler.build_register("Math").unwrap();
        assert_eq!(register.entries.len(), 1);
        assert_eq!(register.entries[0].present, vec!["C"]);
    }

    #[test]
    fn test_toggle_edits_set_without_touching_counters() {
        let (store, reconciler) = setup(IdResolution::Lenient);
        reconciler.submit("Math", "2024-01-10", &ids(&["A", "B"])).unwrap();
        let before = counters(&store, "C", "Math");

        let record = reconciler
            .apply_toggle("Math", "2024-01-10", "C", Presence::Present)
            .unwrap();
        assert_eq!(record.present_students.len(), 3);
        assert_eq!(counters(&store, "C", "Math"), before);

        // Toggling again is a no-op
        reconciler.apply_toggle("Math", "2024-01-10", "C", Presence::Present).unwrap();
        let register = reconciler.build_register("Math").unwrap();
        assert_eq!(register.entries[0].present, vec!["A", "B", "C"]);

        reconciler.apply_toggle("Math", "2024-01-10", "A", Presence::Absent).unwrap();
        let register = reconciler.build_register("Math").unwrap();
        assert_eq!(register.entries[0].present, vec!["B", "C"]);
        assert_eq!(counters(&store, "A", "Math").attended_classes, 1);
    }

    #[test]
    fn test_toggle_missing_record_or_student() {
        let (_store, reconciler) = setup(IdResolution::Lenient);
        let err = reconciler
            .apply_toggle("Math", "2024-01-10", "A", Presence::Present)
            .unwrap_err();
        assert!(matches!(err, AttendanceError::NotFound(_)));

        reconciler.submit("Math", "2024-01-10", &ids(&[])).unwrap();
        let err = reconciler
            .apply_toggle("Math", "2024-01-10", "Z", Presence::Present)
            .unwrap_err();
        assert!(matches!(err, AttendanceError::NotFound(_)));
    }

    #[test]
    fn test_invalid_date_touches_nothing() {
        let (store, reconciler) = setup(IdResolution::Lenient);
        let err = reconciler.submit("Math", "10th of never", &ids(&["A"])).unwrap_err();
        assert!(matches!(err, AttendanceError::InvalidInput(_)));
        assert!(store.records_for_subject("Math").unwrap().is_empty());
        assert_eq!(counters(&store, "A", "Math"), SubjectCounters::default());
    }

    #[test]
    fn test_missing_subject_is_invalid() {
        let (_store, reconciler) = setup(IdResolution::Lenient);
        let err = reconciler.submit("  ", "2024-01-10", &ids(&["A"])).unwrap_err();
        assert!(matches!(err, AttendanceError::InvalidInput(_)));
        assert!(matches!(
            reconciler.build_register("").unwrap_err(),
            AttendanceError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_lenient_resolution_skips_unknown_ids() {
        let (store, reconciler) = setup(IdResolution::Lenient);
        let outcome = reconciler
            .submit("Math", "2024-01-10", &ids(&["A", "ghost", "A"]))
            .unwrap();
        assert!(outcome.is_partial());
        assert_eq!(outcome.skipped, vec!["ghost"]);
        assert_eq!(outcome.record.present_students.len(), 1);
        assert_eq!(counters(&store, "A", "Math").attended_classes, 1);
    }

    #[test]
    fn test_ids_matching_nobody_are_rejected_in_both_modes() {
        for policy in [IdResolution::Lenient, IdResolution::Strict] {
            let (store, reconciler) = setup(policy);
            let err = reconciler
                .submit("Math", "2024-01-10", &ids(&["ghost", "phantom"]))
                .unwrap_err();
            assert!(matches!(err, AttendanceError::InvalidInput(_)), "{policy:?}");
            assert!(store.records_for_subject("Math").unwrap().is_empty());
            assert_eq!(counters(&store, "A", "Math"), SubjectCounters::default());
        }
    }

    #[test]
    fn test_strict_resolution_rejects_unknown_ids() {
        let (store, reconciler) = setup(IdResolution::Strict);
        let err = reconciler
            .submit("Math", "2024-01-10", &ids(&["A", "ghost"]))
            .unwrap_err();
        match err {
            AttendanceError::InvalidInput(msg) => assert!(msg.contains("ghost")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.records_for_subject("Math").unwrap().is_empty());
    }

    #[test]
    fn test_blank_id_is_malformed() {
        let (_store, reconciler) = setup(IdResolution::Lenient);
        let err = reconciler.submit("Math", "2024-01-10", &ids(&["A", " "])).unwrap_err();
        assert!(matches!(err, AttendanceError::InvalidInput(_)));
    }

    #[test]
    fn test_empty_present_list_marks_everyone_absent() {
        let (store, reconciler) = setup(IdResolution::Strict);
        let outcome = reconciler.submit("Math", "2024-01-10", &[]).unwrap();
        assert_eq!(absentee_ids(&outcome), vec!["A", "B", "C"]);
        assert_eq!(counters(&store, "B", "Math"), SubjectCounters { attended_classes: 0, total_classes: 1 });
    }

    #[test]
    fn test_update_requires_existing_record() {
        let (store, reconciler) = setup(IdResolution::Lenient);
        let err = reconciler.update("Math", "2024-01-10", &ids(&["A"])).unwrap_err();
        assert!(matches!(err, AttendanceError::NotFound(_)));
        assert!(store.records_for_subject("Math").unwrap().is_empty());

        reconciler.submit("Math", "2024-01-10", &ids(&["A"])).unwrap();
        let outcome = reconciler.update("Math", "2024-01-10", &ids(&["A", "B"])).unwrap();
        assert_eq!(outcome.counts, CountOutcome::AlreadyCounted);
        assert_eq!(absentee_ids(&outcome), vec!["C"]);
    }

    #[test]
    fn test_batch_records_are_finalized_once() {
        let (store, reconciler) = setup(IdResolution::Lenient);
        let mut updates = BTreeMap::new();
        updates.insert("2024-01-11".to_string(), ids(&["A", "nobody"]));
        updates.insert("garbage".to_string(), ids(&["B"]));
        updates.insert("2024-01-12".to_string(), ids(&["B", "C"]));

        let outcome = reconciler.apply_batch("Math", &updates).unwrap();
        assert_eq!(outcome.applied.len(), 2);
        assert!(outcome.is_partial());
        assert_eq!(outcome.skipped_dates, vec!["garbage"]);
        assert_eq!(outcome.unknown_ids, vec!["nobody"]);

        // Batch edits never move counters
        assert_eq!(counters(&store, "A", "Math"), SubjectCounters::default());

        let first = reconciler.finalize("Math", "2024-01-11").unwrap();
        assert_eq!(first, CountOutcome::Applied { present: 1, absent: 2 });
        assert_eq!(reconciler.finalize("Math", "2024-01-11").unwrap(), CountOutcome::AlreadyCounted);
        assert_eq!(counters(&store, "A", "Math"), SubjectCounters { attended_classes: 1, total_classes: 1 });
    }

    #[test]
    fn test_batch_strict_skips_entries_with_unknown_ids() {
        let (store, reconciler) = setup(IdResolution::Strict);
        let mut updates = BTreeMap::new();
        updates.insert("2024-01-11".to_string(), ids(&["A", "nobody"]));
        updates.insert("2024-01-12".to_string(), ids(&["B"]));

        let outcome = reconciler.apply_batch("Math", &updates).unwrap();
        assert_eq!(outcome.applied, vec![NaiveDate::from_ymd_opt(2024, 1, 12).unwrap()]);
        assert_eq!(outcome.skipped_dates, vec!["2024-01-11"]);
        assert!(outcome.unknown_ids.is_empty());
        assert_eq!(store.records_for_subject("Math").unwrap().len(), 1);
    }

    #[test]
    fn test_batch_keys_for_same_day_apply_once() {
        let (store, reconciler) = setup(IdResolution::Lenient);
        let mut updates = BTreeMap::new();
        updates.insert("2024-01-11".to_string(), ids(&["A"]));
        updates.insert("2024-01-11T00:00:00Z".to_string(), ids(&["B", "C"]));

        let outcome = reconciler.apply_batch("Math", &updates).unwrap();
        assert_eq!(outcome.applied, vec![NaiveDate::from_ymd_opt(2024, 1, 11).unwrap()]);
        assert_eq!(outcome.skipped_dates, vec!["2024-01-11T00:00:00Z"]);

        let records = store.records_for_subject("Math").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].present_students.len(), 1);
    }

    #[test]
    fn test_batch_entry_matching_nobody_is_skipped() {
        let (store, reconciler) = setup(IdResolution::Lenient);
        let mut updates = BTreeMap::new();
        updates.insert("2024-01-11".to_string(), ids(&["ghost"]));
        updates.insert("2024-01-12".to_string(), ids(&[]));

        let outcome = reconciler.apply_batch("Math", &updates).unwrap();
        assert_eq!(outcome.applied, vec![NaiveDate::from_ymd_opt(2024, 1, 12).unwrap()]);
        assert_eq!(outcome.skipped_dates, vec!["2024-01-11"]);
        assert_eq!(store.records_for_subject("Math").unwrap().len(), 1);
    }

    #[test]
    fn test_register_is_date_ordered_per_subject() {
        let (_store, reconciler) = setup(IdResolution::Lenient);
        reconciler.submit("Math", "2024-02-01", &ids(&["A"])).unwrap();
        reconciler.submit("Math", "2024-01-15", &ids(&["B"])).unwrap();
        reconciler.submit("Art", "2024-01-01", &ids(&["C"])).unwrap();

        let register = reconciler.build_register("Math").unwrap();
        let dates: Vec<String> = register.entries.iter().map(|e| e.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-01-15", "2024-02-01"]);
        assert_eq!(register.students.len(), 3);
    }

    #[test]
    fn test_absentees_recomputed_on_demand() {
        let (_store, reconciler) = setup(IdResolution::Lenient);
        reconciler.submit("Math", "2024-01-10", &ids(&["A"])).unwrap();
        reconciler.apply_toggle("Math", "2024-01-10", "B", Presence::Present).unwrap();

        let (record, absent) = reconciler.absentees("Math", "2024-01-10T08:00:00Z").unwrap();
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 1, 10).unwrap());
        let absent: Vec<String> = absent
            .into_iter()
            .map(|s| s.student_id)
            .collect();
        assert_eq!(absent, vec!["C"]);
        assert!(matches!(
            reconciler.absentees("Math", "2024-01-11").unwrap_err(),
            AttendanceError::NotFound(_)
        ));
    }

    #[test]
    fn test_counter_drift_reports_toggle_desync() {
        let (_store, reconciler) = setup(IdResolution::Lenient);
        reconciler.submit("Math", "2024-01-10", &ids(&["A", "B"])).unwrap();
        assert!(reconciler.counter_drift("Math").unwrap().is_empty());

        reconciler.apply_toggle("Math", "2024-01-10", "C", Presence::Present).unwrap();
        let drift = reconciler.counter_drift("Math").unwrap();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].student_id, "C");
        assert_eq!(drift[0].stored, SubjectCounters { attended_classes: 0, total_classes: 1 });
        assert_eq!(drift[0].derived, SubjectCounters { attended_classes: 1, total_classes: 1 });

        let derived = reconciler.derive_counters("Math").unwrap();
        assert_eq!(derived["A"], SubjectCounters { attended_classes: 1, total_classes: 1 });
    }

    #[test]
    fn test_concurrent_submissions_count_once() {
        let (store, reconciler) = setup(IdResolution::Lenient);
        let present_sets = [vec!["A"], vec!["B"], vec!["C"], vec!["A", "B"], vec![], vec!["A", "C"]];

        let newly_counted = std::thread::scope(|scope| {
            let handles: Vec<_> = present_sets
                .iter()
                .map(|present| {
                    let reconciler = &reconciler;
                    scope.spawn(move || {
                        reconciler
                            .submit("Math", "2024-01-10", &ids(present))
                            .unwrap()
                            .newly_counted()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|counted| *counted)
                .count()
        });

        assert_eq!(newly_counted, 1);
        assert_eq!(store.records_for_subject("Math").unwrap().len(), 1);
        for id in ["A", "B", "C"] {
            assert_eq!(counters(&store, id, "Math").total_classes, 1, "student {id}");
        }
    }

    #[test]
    fn test_one_record_per_subject_and_day_across_sequences() {
        let (store, reconciler) = setup(IdResolution::Lenient);
        for (date, present) in [
            ("2024-01-10", vec!["A"]),
            ("2024-01-10T18:00:00Z", vec!["B"]),
            ("2024-01-10T23:59:59", vec!["A", "C"]),
            ("2024-01-11", vec![]),
        ] {
            reconciler.submit("Math", date, &ids(&present)).unwrap();
        }
        let records = store.records_for_subject("Math").unwrap();
        assert_eq!(records.len(), 2);
        // Only the first submission per day counted
        assert_eq!(counters(&store, "A", "Math"), SubjectCounters { attended_classes: 1, total_classes: 2 });
    }
}
