//! HTTP plumbing for PostgREST and Edge Functions: headers, status
//! classification, and `Content-Range` parsing.

use garden_common::TrackingError;

/// Longest error body excerpt kept in `TrackingError::Remote`.
const MAX_ERROR_BODY: usize = 200;

/// Map a non-success HTTP response to a `TrackingError`.
///
/// Rate-limit and quota signals are recognised both by status code and by
/// the wording AI-backed functions put in their error bodies.
pub(crate) fn classify_status(status: u16, body: &str) -> TrackingError {
    let lower = body.to_ascii_lowercase();
    if status == 429 || lower.contains("rate limit") || lower.contains("too many requests") {
        return TrackingError::RateLimited;
    }
    if status == 402 || lower.contains("quota") || lower.contains("credits") {
        return TrackingError::QuotaExceeded;
    }
    let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
    match status {
        401 | 403 => TrackingError::Unauthorized(excerpt),
        _ => TrackingError::Remote {
            status,
            message: excerpt,
        },
    }
}

/// Map a transport failure to a `TrackingError`.
pub(crate) fn network_error(err: reqwest::Error) -> TrackingError {
    if err.is_timeout() {
        TrackingError::Network(format!("request timed out: {err}"))
    } else {
        TrackingError::Network(err.to_string())
    }
}

/// Total row count from a PostgREST `Content-Range` header.
///
/// The header looks like `0-24/3573`, or `*/0` when no rows matched.
pub(crate) fn parse_content_range(header: &str) -> Option<u64> {
    let (_, total) = header.rsplit_once('/')?;
    total.trim().parse().ok()
}
