//! Teacher-facing HTTP routes.
//!
//! Handlers are thin: they decode the request, call the reconciler or the
//! directory, and shape the JSON reply.

use std::collections::BTreeMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect};
use axum::routing::{get, post};
use axum::{Json, Router};
use rollcall_core::{Presence, StudentSummary, SubmitOutcome};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::debug;

use crate::error::{ApiError, ROUTE_NOT_FOUND};
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    let teacher = Router::new()
        .route("/students", get(list_students).post(register_student))
        .route("/mark-attendance", post(mark_attendance))
        .route(
            "/update-attendance",
            post(update_attendance_batch).put(update_attendance),
        )
        .route("/toggle-attendance", post(toggle_attendance))
        .route("/attendance-register", get(attendance_register))
        .route("/absentees", get(absentees))
        .route("/attendance-summary", get(attendance_summary))
        .route("/add-class", post(add_class))
        .route("/classes", get(list_classes));

    Router::new()
        .route("/", get(|| async { Redirect::to("/teacher.html") }))
        .nest("/teacher", teacher)
        .fallback(route_not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn route_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "message": ROUTE_NOT_FOUND })))
}

fn status_label(partial: bool) -> &'static str {
    if partial {
        "partial"
    } else {
        "ok"
    }
}

// ===== Students =====

#[derive(Debug, Deserialize)]
struct NewStudent {
    #[serde(rename = "studentID")]
    student_id: String,
    name: String,
    #[serde(rename = "guardianContact", default)]
    guardian_contact: Option<String>,
}

async fn list_students(State(state): State<AppState>) -> ApiResult<Json<Vec<StudentSummary>>> {
    let students = state.directory.list_students()?;
    Ok(Json(students.iter().map(|s| s.summary()).collect()))
}

async fn register_student(
    State(state): State<AppState>,
    payload: Result<Json<NewStudent>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(body) = payload?;
    let student = state.directory.register_student(
        &body.student_id,
        &body.name,
        body.guardian_contact.as_deref(),
    )?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Student registered successfully",
            "student": student.summary(),
        })),
    ))
}

// ===== Attendance =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttendanceSubmission {
    date: String,
    subject: String,
    students_present: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionResponse {
    message: &'static str,
    status: &'static str,
    subject: String,
    date: String,
    students_present: Vec<String>,
    absentees: Vec<StudentSummary>,
    skipped: Vec<String>,
    created: bool,
    counted: bool,
    alerts_queued: usize,
}

fn submission_response(
    state: &AppState,
    message: &'static str,
    outcome: SubmitOutcome,
) -> ApiResult<Json<SubmissionResponse>> {
    let alerts_queued = match (&state.alerts, outcome.newly_counted()) {
        (Some(alerts), true) => {
            alerts.dispatch(&outcome.record.subject, outcome.record.date, &outcome.absentees)
        }
        _ => 0,
    };
    let students_present = state.reconciler.present_ids(&outcome.record)?;

    Ok(Json(SubmissionResponse {
        message,
        status: status_label(outcome.is_partial()),
        subject: outcome.record.subject.clone(),
        date: outcome.record.date.to_string(),
        students_present,
        absentees: outcome.absentees.iter().map(|s| s.summary()).collect(),
        counted: outcome.newly_counted(),
        created: outcome.created,
        skipped: outcome.skipped,
        alerts_queued,
    }))
}

async fn mark_attendance(
    State(state): State<AppState>,
    payload: Result<Json<AttendanceSubmission>, JsonRejection>,
) -> ApiResult<Json<SubmissionResponse>> {
    let Json(body) = payload?;
    let outcome = state
        .reconciler
        .submit(&body.subject, &body.date, &body.students_present)?;
    submission_response(&state, "Attendance marked successfully", outcome)
}

async fn update_attendance(
    State(state): State<AppState>,
    payload: Result<Json<AttendanceSubmission>, JsonRejection>,
) -> ApiResult<Json<SubmissionResponse>> {
    let Json(body) = payload?;
    let outcome = state
        .reconciler
        .update(&body.subject, &body.date, &body.students_present)?;
    submission_response(&state, "Attendance updated successfully", outcome)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdate {
    subject: String,
    attendance_update_map: BTreeMap<String, Vec<String>>,
}

async fn update_attendance_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchUpdate>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = payload?;
    let outcome = state
        .reconciler
        .apply_batch(&body.subject, &body.attendance_update_map)?;
    Ok(Json(json!({
        "message": "Attendance updated successfully",
        "status": status_label(outcome.is_partial()),
        "applied": outcome.applied,
        "skippedDates": outcome.skipped_dates,
        "unknownIDs": outcome.unknown_ids,
    })))
}

#[derive(Debug, Deserialize)]
struct ToggleRequest {
    date: String,
    subject: String,
    #[serde(rename = "studentID")]
    student_id: String,
    status: Presence,
}

async fn toggle_attendance(
    State(state): State<AppState>,
    payload: Result<Json<ToggleRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = payload?;
    let record =
        state
            .reconciler
            .apply_toggle(&body.subject, &body.date, &body.student_id, body.status)?;
    let present = state.reconciler.present_ids(&record)?;
    Ok(Json(json!({
        "message": "Attendance toggled successfully",
        "subject": record.subject,
        "date": record.date,
        "studentsPresent": present,
    })))
}

// ===== Reports =====

#[derive(Debug, Deserialize)]
struct SubjectQuery {
    #[serde(default)]
    subject: String,
}

#[derive(Debug, Deserialize)]
struct DayQuery {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    date: String,
}

async fn attendance_register(
    State(state): State<AppState>,
    query: Result<Query<SubjectQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let register = state.reconciler.build_register(&query.subject)?;
    debug!(subject = %register.subject, entries = register.entries.len(), "Register built");
    Ok(Json(json!({
        "subject": register.subject,
        "students": register.students,
        "attendance": register.entries,
    })))
}

async fn absentees(
    State(state): State<AppState>,
    query: Result<Query<DayQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let (record, absent) = state.reconciler.absentees(&query.subject, &query.date)?;
    let absent: Vec<StudentSummary> = absent.iter().map(|s| s.summary()).collect();
    Ok(Json(json!({
        "subject": record.subject,
        "date": record.date,
        "absentees": absent,
    })))
}

async fn attendance_summary(
    State(state): State<AppState>,
    query: Result<Query<SubjectQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let subject = query.subject.trim();
    let derived = state.reconciler.derive_counters(subject)?;
    let drift = state.reconciler.counter_drift(subject)?;

    let students: Vec<Value> = state
        .directory
        .list_students()?
        .into_iter()
        .map(|s| {
            let counters = s.counters(subject);
            let rederived = derived.get(&s.student_id).copied().unwrap_or_default();
            json!({
                "studentID": s.student_id,
                "name": s.name,
                "attendedClasses": counters.attended_classes,
                "totalClasses": counters.total_classes,
                "percentage": counters.percentage(),
                "derived": rederived,
            })
        })
        .collect();

    Ok(Json(json!({
        "subject": subject,
        "students": students,
        "drift": drift,
    })))
}

// ===== Classes =====

#[derive(Debug, Deserialize)]
struct NewClass {
    stream: String,
    year: String,
    #[serde(default)]
    subjects: Vec<String>,
}

async fn add_class(
    State(state): State<AppState>,
    payload: Result<Json<NewClass>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(body) = payload?;
    let class = state
        .directory
        .add_class(&body.stream, &body.year, &body.subjects)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Class added successfully", "class": class })),
    ))
}

async fn list_classes(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(json!(state.directory.list_classes()?)))
}

// ============================================================================
// Tests
// ============================================================================
