//! Core library for rollcall.
//!
//! Attendance models, the document store, the reconciler that keeps
//! per-student counters in step with the register, and guardian alerts.

pub mod alerts;
pub mod config;
pub mod directory;
pub mod error;
pub mod models;
pub mod notify;
pub mod reconcile;
pub mod store;
pub mod utils;

pub use alerts::AbsenceAlerts;
pub use config::{Config, IdResolution};
pub use directory::Directory;
pub use error::{AttendanceError, Result};
pub use models::*;
pub use notify::{LogNotifier, Notifier, NotifyError, TwilioNotifier};
pub use reconcile::{
    BatchOutcome, CounterDrift, Reconciler, Register, RegisterEntry, SubmitOutcome,
};
pub use store::{AttendanceStore, CountOutcome, DocumentStore, StoreError};
