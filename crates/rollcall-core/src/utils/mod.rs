//! Utility functions for input normalization.

pub mod format;

pub use format::{parse_calendar_date, sanitize_phone, truncate_string};
