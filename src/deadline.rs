use std::time::Duration;

use tonic::metadata::MetadataMap;

/// Header carrying the caller's remaining time budget, in gRPC wire format.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

// The wire format allows at most 8 digits.
const MAX_TIMEOUT_DIGITS: usize = 8;

/// Parses a `grpc-timeout` value such as `250m` or `5S`.
///
/// Returns `None` for anything that does not follow the wire format.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || !value.is_ascii() {
        return None;
    }

    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > MAX_TIMEOUT_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    let timeout = match unit {
        "H" => Duration::from_secs(amount.saturating_mul(3600)),
        "M" => Duration::from_secs(amount.saturating_mul(60)),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };

    Some(timeout)
}

/// Remaining budget advertised by the caller, if any.
pub fn from_headers(headers: &http::HeaderMap) -> Option<Duration> {
    headers
        .get(GRPC_TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_grpc_timeout)
}

/// Remaining budget advertised in gRPC metadata, if any.
pub fn from_metadata(metadata: &MetadataMap) -> Option<Duration> {
    metadata
        .get(GRPC_TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_grpc_timeout)
}

/// Deadline for one downstream call: the caller's budget, capped by `limit`.
pub fn bounded(budget: Option<Duration>, limit: Duration) -> Duration {
    budget.map_or(limit, |b| b.min(limit))
}
