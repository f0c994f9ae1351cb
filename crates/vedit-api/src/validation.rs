//! Request validation.

use tracing::warn;
use url::Url;

use vedit_models::{
    default_output_name, is_clock_timestamp, sanitize_output_name, AspectRatio, EditKind,
};

use crate::error::{ApiError, ApiResult};

/// Maximum allowed URL length.
pub const MAX_URL_LENGTH: usize = 2048;

/// Reject anything that is not a strict `HH:MM:SS` timestamp.
pub fn validate_timestamps(timestamps: &[&str]) -> ApiResult<()> {
    if timestamps.iter().all(|ts| is_clock_timestamp(ts)) {
        Ok(())
    } else {
        Err(ApiError::bad_request("Invalid timestamp format"))
    }
}

/// Validate a source video URL.
///
/// Only http/https are accepted, plus `file://` when `allow_file` is set.
pub fn validate_input_url(url: &str, allow_file: bool) -> ApiResult<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ApiError::bad_request("URL cannot be empty"));
    }
    if url.len() > MAX_URL_LENGTH {
        return Err(ApiError::bad_request(format!(
            "URL exceeds maximum length of {} characters",
            MAX_URL_LENGTH
        )));
    }

    let parsed =
        Url::parse(url).map_err(|e| ApiError::bad_request(format!("Invalid URL format: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => {
            if parsed.host_str().is_none() {
                return Err(ApiError::bad_request("URL must have a valid host"));
            }
        }
        "file" if allow_file => {}
        scheme => {
            warn!(url = %url, "Rejected input URL scheme");
            return Err(ApiError::bad_request(format!(
                "Invalid protocol '{}'. Only HTTP and HTTPS are allowed.",
                scheme
            )));
        }
    }

    Ok(url.to_string())
}

/// Sanitize a requested output name, or generate one for `kind`.
pub fn resolve_output_name(requested: Option<&str>, kind: EditKind) -> ApiResult<String> {
    match requested.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default_output_name(kind)),
        Some(name) => sanitize_output_name(name)
            .ok_or_else(|| ApiError::bad_request(format!("Invalid output name '{}'", name))),
    }
}

pub fn parse_aspect_ratio(value: &str) -> ApiResult<AspectRatio> {
    value
        .parse()
        .map_err(|e| ApiError::bad_request(format!("Invalid aspect ratio '{}': {}", value, e)))
}

/// Job ids are UUIDs; anything else can't name a job.
pub fn is_valid_job_id(id: &str) -> bool {
    if id.is_empty() || id.len() > 64 {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
