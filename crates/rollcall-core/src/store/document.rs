use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{AttendanceStore, CountOutcome, StoreError, StoreResult, Upserted};
use crate::models::{AttendanceRecord, ClassInfo, Presence, RecordKey, Student, StudentRef};

const STUDENTS_FILE: &str = "students";
const ATTENDANCE_FILE: &str = "attendance";
const CLASSES_FILE: &str = "classes";

/// On-disk envelope for one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub data: T,
    #[serde(rename = "savedAt")]
    pub saved_at: DateTime<Utc>,
}

impl<T> Snapshot<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            saved_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
    Students,
    Attendance,
    Classes,
}

impl Collection {
    fn file_name(self) -> &'static str {
        match self {
            Collection::Students => STUDENTS_FILE,
            Collection::Attendance => ATTENDANCE_FILE,
            Collection::Classes => CLASSES_FILE,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Documents {
    students: BTreeMap<StudentRef, Student>,
    by_student_id: HashMap<String, StudentRef>,
    records: BTreeMap<RecordKey, AttendanceRecord>,
    classes: Vec<ClassInfo>,
    next_ref: u64,
}

impl Documents {
    fn from_collections(
        students: Vec<Student>,
        records: Vec<AttendanceRecord>,
        classes: Vec<ClassInfo>,
    ) -> Self {
        let next_ref = students.iter().map(|s| s.key.0 + 1).max().unwrap_or(1);
        let by_student_id = students
            .iter()
            .map(|s| (s.student_id.clone(), s.key))
            .collect();
        Self {
            students: students.into_iter().map(|s| (s.key, s)).collect(),
            by_student_id,
            records: records.into_iter().map(|r| (r.key(), r)).collect(),
            classes,
            next_ref,
        }
    }

    fn subject_range(subject: &str) -> std::ops::RangeInclusive<RecordKey> {
        RecordKey::new(subject, NaiveDate::MIN)..=RecordKey::new(subject, NaiveDate::MAX)
    }
}

/// Mutex-guarded document collections, optionally persisted as JSON files.
pub struct DocumentStore {
    data_dir: Option<PathBuf>,
    docs: Mutex<Documents>,
}

impl DocumentStore {
    /// A store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            docs: Mutex::new(Documents {
                next_ref: 1,
                ..Documents::default()
            }),
        }
    }

    /// Open (or create) a store persisted under `data_dir`
    pub fn open(data_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;

        let students: Vec<Student> = load(&data_dir, Collection::Students)?.unwrap_or_default();
        let records: Vec<AttendanceRecord> =
            load(&data_dir, Collection::Attendance)?.unwrap_or_default();
        let classes: Vec<ClassInfo> = load(&data_dir, Collection::Classes)?.unwrap_or_default();

        info!(
            dir = %data_dir.display(),
            students = students.len(),
            records = records.len(),
            classes = classes.len(),
            "Opened document store"
        );

        Ok(Self {
            docs: Mutex::new(Documents::from_collections(students, records, classes)),
            data_dir: Some(data_dir),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Documents>> {
        self.docs
            .lock()
            .map_err(|_| StoreError::Unavailable("document lock poisoned".to_string()))
    }

    /// Run a mutation and flush the touched collection. If the flush fails,
    /// the in-memory state is restored so memory never runs ahead of disk.
    fn mutate<R>(
        &self,
        collection: Collection,
        f: impl FnOnce(&mut Documents) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let mut docs = self.lock()?;
        let before = self.data_dir.as_ref().map(|_| docs.clone());

        let result = f(&mut *docs)?;

        if let (Some(dir), Some(before)) = (self.data_dir.as_ref(), before) {
            if let Err(e) = flush(dir, &docs, collection) {
                warn!(collection = collection.file_name(), error = %e, "Flush failed, rolling back");
                *docs = before;
                return Err(e);
            }
        }
        Ok(result)
    }
}

fn collection_path(dir: &Path, collection: Collection) -> PathBuf {
    dir.join(format!("{}.json", collection.file_name()))
}

fn load<T: DeserializeOwned>(dir: &Path, collection: Collection) -> StoreResult<Option<T>> {
    let path = collection_path(dir, collection);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)?;
    let snapshot: Snapshot<T> = serde_json::from_str(&contents)?;
    Ok(Some(snapshot.data))
}

fn flush(dir: &Path, docs: &Documents, collection: Collection) -> StoreResult<()> {
    let contents = match collection {
        Collection::Students => {
            let students: Vec<&Student> = docs.students.values().collect();
            serde_json::to_string_pretty(&Snapshot::new(students))?
        }
        Collection::Attendance => {
            let records: Vec<&AttendanceRecord> = docs.records.values().collect();
            serde_json::to_string_pretty(&Snapshot::new(records))?
        }
        Collection::Classes => serde_json::to_string_pretty(&Snapshot::new(&docs.classes))?,
    };

    // Write-then-rename so a crash never leaves a half-written collection
    let path = collection_path(dir, collection);
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, &path)?;
    debug!(collection = collection.file_name(), "Flushed collection");
    Ok(())
}

impl AttendanceStore for DocumentStore {
    fn find_student(&self, student_id: &str) -> StoreResult<Option<Student>> {
        let docs = self.lock()?;
        Ok(docs
            .by_student_id
            .get(student_id)
            .and_then(|key| docs.students.get(key))
            .cloned())
    }

    fn list_students(&self) -> StoreResult<Vec<Student>> {
        let docs = self.lock()?;
        let mut students: Vec<Student> = docs.students.values().cloned().collect();
        students.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        Ok(students)
    }

    fn insert_student(
        &self,
        student_id: &str,
        name: &str,
        guardian_contact: Option<String>,
    ) -> StoreResult<Student> {
        self.mutate(Collection::Students, |docs| {
            if docs.by_student_id.contains_key(student_id) {
                return Err(StoreError::DuplicateStudent(student_id.to_string()));
            }
            let key = StudentRef(docs.next_ref);
            docs.next_ref += 1;

            let student = Student {
                key,
                student_id: student_id.to_string(),
                name: name.to_string(),
                guardian_contact,
                subjects: BTreeMap::new(),
            };
            docs.by_student_id.insert(student.student_id.clone(), key);
            docs.students.insert(key, student.clone());
            Ok(student)
        })
    }

    fn find_record(&self, key: &RecordKey) -> StoreResult<Option<AttendanceRecord>> {
        Ok(self.lock()?.records.get(key).cloned())
    }

    fn upsert_record(
        &self,
        key: &RecordKey,
        present: BTreeSet<StudentRef>,
    ) -> StoreResult<Upserted> {
        self.mutate(Collection::Attendance, |docs| {
            match docs.records.get_mut(key) {
                Some(record) => {
                    record.overwrite(present);
                    Ok(Upserted {
                        record: record.clone(),
                        created: false,
                    })
                }
                None => {
                    let record = AttendanceRecord::new(key.clone(), present);
                    docs.records.insert(key.clone(), record.clone());
                    Ok(Upserted {
                        record,
                        created: true,
                    })
                }
            }
        })
    }

    fn toggle_presence(
        &self,
        key: &RecordKey,
        student: StudentRef,
        presence: Presence,
    ) -> StoreResult<Option<AttendanceRecord>> {
        self.mutate(Collection::Attendance, |docs| {
            Ok(docs.records.get_mut(key).map(|record| {
                record.toggle(student, presence);
                record.clone()
            }))
        })
    }

    fn records_for_subject(&self, subject: &str) -> StoreResult<Vec<AttendanceRecord>> {
        let docs = self.lock()?;
        Ok(docs
            .records
            .range(Documents::subject_range(subject))
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn apply_counts(
        &self,
        key: &RecordKey,
        all_students: &[StudentRef],
    ) -> StoreResult<Option<CountOutcome>> {
        let mut docs = self.lock()?;
        let Some(record) = docs.records.get(key) else {
            return Ok(None);
        };
        if record.counted {
            return Ok(Some(CountOutcome::AlreadyCounted));
        }

        let before = self.data_dir.as_ref().map(|_| docs.clone());
        let present = record.present_students.clone();
        let mut present_count = 0;
        let mut absent_count = 0;

        for student_ref in all_students.iter().chain(present.iter()).collect::<BTreeSet<_>>() {
            let Some(student) = docs.students.get_mut(student_ref) else {
                continue;
            };
            let counters = student.subjects.entry(key.subject.clone()).or_default();
            if present.contains(student_ref) {
                counters.record_present();
                present_count += 1;
            } else {
                counters.record_absent();
                absent_count += 1;
            }
        }

        if let Some(record) = docs.records.get_mut(key) {
            record.counted = true;
        }

        // Counters and the counted flag span two collections. The flag goes
        // to disk first: a crash between the writes can under-count a record
        // but never leave increments next to an uncounted one.
        if let (Some(dir), Some(before)) = (self.data_dir.as_ref(), before) {
            if let Err(e) = flush(dir, &docs, Collection::Attendance) {
                warn!(record = %key, error = %e, "Attendance flush failed, rolling back");
                *docs = before;
                return Err(e);
            }
            if let Err(e) = flush(dir, &docs, Collection::Students) {
                warn!(record = %key, error = %e, "Counter flush failed, rolling back");
                *docs = before;
                if let Err(restore) = flush(dir, &docs, Collection::Attendance) {
                    error!(
                        record = %key,
                        error = %restore,
                        "Failed to restore attendance file; record stays counted on disk without increments"
                    );
                }
                return Err(e);
            }
        }

        Ok(Some(CountOutcome::Applied {
            present: present_count,
            absent: absent_count,
        }))
    }

    fn insert_class(&self, class: ClassInfo) -> StoreResult<()> {
        self.mutate(Collection::Classes, |docs| {
            docs.classes.push(class);
            Ok(())
        })
    }

    fn list_classes(&self) -> StoreResult<Vec<ClassInfo>> {
        Ok(self.lock()?.classes.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
