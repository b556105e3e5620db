//! Student and class registration.

use std::sync::Arc;

use tracing::info;

use crate::error::{AttendanceError, Result};
use crate::models::{ClassInfo, Student};
use crate::store::{AttendanceStore, StoreError};

pub struct Directory {
    store: Arc<dyn AttendanceStore>,
}

impl Directory {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self { store }
    }

    /// All students ordered by external ID
    pub fn list_students(&self) -> Result<Vec<Student>> {
        Ok(self.store.list_students()?)
    }

    pub fn register_student(
        &self,
        student_id: &str,
        name: &str,
        guardian_contact: Option<&str>,
    ) -> Result<Student> {
        let student_id = student_id.trim();
        let name = name.trim();
        if student_id.is_empty() {
            return Err(AttendanceError::invalid("studentID is required"));
        }
        if name.is_empty() {
            return Err(AttendanceError::invalid("name is required"));
        }
        let contact = guardian_contact
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        match self.store.insert_student(student_id, name, contact) {
            Ok(student) => {
                info!(student = %student.student_id, key = %student.key, "Student registered");
                Ok(student)
            }
            Err(StoreError::DuplicateStudent(id)) => Err(AttendanceError::invalid(format!(
                "student ID {} is already registered",
                id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub fn add_class(&self, stream: &str, year: &str, subjects: &[String]) -> Result<ClassInfo> {
        let class = ClassInfo::new(stream, year, subjects).ok_or_else(|| {
            AttendanceError::invalid("stream, year and at least one subject are required")
        })?;
        self.store.insert_class(class.clone())?;
        info!(stream = %class.stream, year = %class.year, subjects = class.subjects.len(), "Class added");
        Ok(class)
    }

    /// Classes in insertion order
    pub fn list_classes(&self) -> Result<Vec<ClassInfo>> {
        Ok(self.store.list_classes()?)
    }
}
