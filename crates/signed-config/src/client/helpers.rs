//! Pure helpers: error body parsing (no HTTP, no status logic).

use serde::Deserialize;

/// Error document returned by the config service.
///
/// Expected format: `{"code": 400, "message": "..."}`
#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    message: String,
}

/// Parse a structured error body into `(code, message)`.
pub(crate) fn parse_api_error(body: &str) -> Option<(i64, String)> {
    serde_json::from_str::<ApiError>(body)
        .ok()
        .map(|e| (e.code, e.message))
}
