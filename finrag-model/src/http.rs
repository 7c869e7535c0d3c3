//! Mapping of HTTP outcomes onto the [`ModelError`] taxonomy.

use std::time::Duration;

use crate::error::ModelError;

/// Classify a non-success HTTP status.
///
/// - `429` is [`ModelError::RateLimited`], carrying `Retry-After` seconds if present
/// - `408` and `5xx` are [`ModelError::BackendUnavailable`]
/// - any other status is [`ModelError::InvalidRequest`]
pub fn classify_status(
    backend: &str,
    status: u16,
    retry_after: Option<&str>,
    detail: String,
) -> ModelError {
    let message = format!("HTTP {status}: {detail}");
    match status {
        429 => ModelError::RateLimited {
            backend: backend.to_string(),
            message,
            retry_after: retry_after
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        408 | 500..=599 => ModelError::BackendUnavailable { backend: backend.to_string(), message },
        _ => ModelError::InvalidRequest { backend: backend.to_string(), message },
    }
}

/// Classify a transport-level failure (connect, timeout, broken body).
#[cfg(any(feature = "openai", feature = "ollama"))]
pub fn classify_transport(backend: &str, err: &reqwest::Error) -> ModelError {
    if err.is_builder() {
        return ModelError::ConfigError(format!("{backend}: {err}"));
    }
    ModelError::BackendUnavailable { backend: backend.to_string(), message: err.to_string() }
}

/// Turn an unsuccessful response into a [`ModelError`], reading its body.
#[cfg(any(feature = "openai", feature = "ollama"))]
pub async fn error_from_response(
    backend: &str,
    response: reqwest::Response,
    extract_detail: fn(&str) -> Option<String>,
) -> ModelError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.unwrap_or_default();
    let detail = extract_detail(&body).unwrap_or(body);
    classify_status(backend, status, retry_after.as_deref(), detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_requests_is_rate_limited_with_hint() {
        let err = classify_status("openai", 429, Some("7"), "quota".into());
        assert!(matches!(
            err,
            ModelError::RateLimited { retry_after: Some(d), .. } if d == Duration::from_secs(7)
        ));
    }

    #[test]
    fn unparseable_retry_after_is_ignored() {
        let err = classify_status("openai", 429, Some("Wed, 21 Oct 2015 07:28:00 GMT"), "".into());
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn server_errors_and_timeouts_are_unavailable() {
        for status in [408, 500, 502, 503, 504] {
            assert!(matches!(
                classify_status("ollama", status, None, "".into()),
                ModelError::BackendUnavailable { .. }
            ));
        }
    }

    #[test]
    fn other_client_errors_are_permanent() {
        for status in [400, 401, 404, 413, 422] {
            let err = classify_status("openai", status, None, "context length exceeded".into());
            assert!(matches!(err, ModelError::InvalidRequest { .. }));
            assert!(!err.is_transient());
        }
    }
}
