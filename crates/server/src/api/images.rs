//! Anomaly detection endpoint.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use gorp_core::Sample;
use gorp_detect::PipelineError;
use tracing::{info, warn};

use crate::state::AppState;

pub const METHOD_HEADER: &str = "x-gorp-method";
pub const ANOMALIES_HEADER: &str = "x-gorp-anomalies";

/// `POST /images`: run detection over a JSON array of `[timestamp, value]`
/// pairs. Returns the plot as PNG unless the client accepts JSON, in which
/// case the full detection is returned.
pub async fn post_images(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, (StatusCode, String)> {
    let samples: Vec<Sample> = serde_json::from_slice(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("decode post err: {e}")))?;

    let detection = state.detector.run(&samples).await.map_err(|e| {
        warn!(error = %e, samples = samples.len(), "detection failed");
        match e {
            PipelineError::Saturated { .. } => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("detection failed: {other}"),
            ),
        }
    })?;

    info!(
        samples = samples.len(),
        method = %detection.method,
        anomalies = detection.anomaly_count(),
        "detection served"
    );

    let summary = [
        (METHOD_HEADER, detection.method.to_string()),
        (ANOMALIES_HEADER, detection.anomaly_count().to_string()),
    ];

    if accepts_json(&headers) {
        Ok((summary, Json(detection)).into_response())
    } else {
        Ok((summary, [(CONTENT_TYPE, "image/png")], detection.png_data).into_response())
    }
}

fn accepts_json(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(is_json_range)
}

/// Whether one `Accept` entry names `application/json` with a non-zero
/// quality.
fn is_json_range(entry: &str) -> bool {
    let mut parts = entry.split(';');
    let media = parts.next().unwrap_or_default().trim();
    if !media.eq_ignore_ascii_case("application/json") {
        return false;
    }
    !parts.any(|param| {
        param.split_once('=').is_some_and(|(key, q)| {
            key.trim().eq_ignore_ascii_case("q") && q.trim().parse::<f32>().is_ok_and(|q| q <= 0.0)
        })
    })
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn json_is_chosen_only_when_accepted() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_json(&headers));

        headers.insert(ACCEPT, HeaderValue::from_static("image/png"));
        assert!(!accepts_json(&headers));

        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html, application/json;q=0.9"),
        );
        assert!(accepts_json(&headers));

        headers.insert(ACCEPT, HeaderValue::from_static("Application/JSON"));
        assert!(accepts_json(&headers));
    }

    #[test]
    fn lookalike_or_refused_json_is_not_json() {
        for accept in [
            "application/json;q=0",
            "application/json; q=0.0",
            "application/json-patch+json",
            "application/jsonl",
            "text/application/json",
        ] {
            let mut headers = HeaderMap::new();
            headers.insert(ACCEPT, HeaderValue::from_str(accept).unwrap());
            assert!(!accepts_json(&headers), "{accept}");
        }
    }
}
