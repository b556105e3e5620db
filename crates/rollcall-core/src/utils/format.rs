use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Minimum number of digits accepted as a messaging contact
pub const MIN_PHONE_DIGITS: usize = 10;

/// Parse a date string into a UTC calendar day.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps (converted to UTC before the
/// time of day is dropped) and naive `YYYY-MM-DDTHH:MM:SS` timestamps, which
/// are read as UTC.
pub fn parse_calendar_date(date: &str) -> Option<NaiveDate> {
    let date = date.trim();
    if date.is_empty() {
        return None;
    }

    if let Ok(day) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        return Some(day);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    None
}

/// Strip everything but digits from a phone number.
/// Returns `None` when fewer than 10 digits remain.
pub fn sanitize_phone(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < MIN_PHONE_DIGITS {
        None
    } else {
        Some(digits)
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}
