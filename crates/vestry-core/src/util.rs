//! Shared utility functions used across multiple modules.

/// Current Unix timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Truncate text to at most 180 characters for stored error strings.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}
