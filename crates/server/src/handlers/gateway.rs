//! Public download and streaming endpoints.
//!
//! | Path                       | Mode                          |
//! |----------------------------|-------------------------------|
//! | `/stream/{token}`          | inline                        |
//! | `/dl/{token}`              | attachment                    |
//! | `/stream?file={token}`     | inline                        |
//! | `/download?file={token}`   | attachment                    |
//! | `/?file={token}&mode=...`  | `mode`, default attachment    |

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::proxy::{CORS_ALLOW_HEADERS, CORS_ALLOW_METHODS, CORS_ALLOW_ORIGIN};
use crate::state::AppState;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use filegate_core::ServeMode;
use filegate_signer::TokenError;

/// Raw query pairs, duplicates included.
type QueryPairs = Result<Query<Vec<(String, String)>>, QueryRejection>;

/// Query parameters accepted by the query-string forms.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GatewayQuery {
    pub file: Option<String>,
    pub mode: Option<String>,
}

impl GatewayQuery {
    /// Keep the first value of each known key; other keys are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "file" if query.file.is_none() => query.file = Some(value),
                "mode" if query.mode.is_none() => query.mode = Some(value),
                _ => {}
            }
        }
        query
    }

    /// Requested mode, or `default` when absent or empty.
    pub fn mode_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.mode
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(default)
    }
}

fn gateway_query(pairs: QueryPairs) -> GatewayQuery {
    match pairs {
        Ok(Query(pairs)) => GatewayQuery::from_pairs(pairs),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "unreadable query string");
            GatewayQuery::default()
        }
    }
}

/// ANY /stream/{token}
pub async fn stream_by_path(
    State(state): State<AppState>,
    Path(token): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    serve(&state, &method, &headers, Some(&token), "inline").await
}

/// ANY /dl/{token}
pub async fn download_by_path(
    State(state): State<AppState>,
    Path(token): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    serve(&state, &method, &headers, Some(&token), "attachment").await
}

/// ANY /stream?file={token}
pub async fn stream_by_query(
    State(state): State<AppState>,
    pairs: QueryPairs,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let query = gateway_query(pairs);
    serve(&state, &method, &headers, query.file.as_deref(), "inline").await
}

/// ANY /download?file={token}
pub async fn download_by_query(
    State(state): State<AppState>,
    pairs: QueryPairs,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let query = gateway_query(pairs);
    serve(&state, &method, &headers, query.file.as_deref(), "attachment").await
}

/// ANY /?file={token}&mode={attachment|inline|stream}
pub async fn serve_by_query(
    State(state): State<AppState>,
    pairs: QueryPairs,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let query = gateway_query(pairs);
    let mode = query.mode_or("attachment");
    serve(&state, &method, &headers, query.file.as_deref(), mode).await
}

/// Fallback for paths no route matches, including `/stream/` and `/dl/` with no token.
pub async fn unmatched() -> ApiError {
    ApiError::MissingParameter("no resource token in request".to_string())
}

async fn serve(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    token: Option<&str>,
    mode: &str,
) -> Response {
    let mode_label = mode
        .parse::<ServeMode>()
        .map(|m| m.as_str())
        .unwrap_or("invalid");

    match dispatch(state, method, headers, token, mode).await {
        Ok(response) => {
            metrics::record_request(mode_label, "ok");
            response
        }
        Err(err) => {
            metrics::record_request(mode_label, err.code());
            tracing::debug!(error = %err, status = err.status_code().as_u16(), "request rejected");
            err.into_response()
        }
    }
}

/// Method check, token decode, routing policy, then the proxy.
async fn dispatch(
    state: &AppState,
    method: &Method,
    headers: &HeaderMap,
    token: Option<&str>,
    mode: &str,
) -> ApiResult<Response> {
    if method == Method::OPTIONS {
        return Ok(preflight());
    }
    if !matches!(*method, Method::GET | Method::POST | Method::HEAD) {
        return Err(ApiError::MethodNotAllowed(method.to_string()));
    }

    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::MissingParameter("file".to_string()))?;

    let resource_id = match state.codec.decode(token) {
        Ok(id) => id,
        Err(TokenError::SignatureMismatch) => {
            metrics::SIGNATURE_MISMATCHES.inc();
            tracing::warn!("token signature mismatch, possible tampering");
            return Err(ApiError::SignatureMismatch);
        }
        Err(e) => return Err(e.into()),
    };

    let routed = state.policy.route(resource_id, mode).await?;

    if method == Method::HEAD {
        return state
            .proxy
            .head(&routed.descriptor, routed.decision.mode);
    }

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());
    let response = state
        .proxy
        .serve(&routed.descriptor, routed.decision.mode, range)
        .await?;

    tracing::info!(
        resource_id,
        mode = %routed.decision.mode,
        status = response.status().as_u16(),
        size = routed.descriptor.size,
        "serving resource"
    );

    let metadata = state.metadata.clone();
    let resource_id = resource_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = metadata.increment_downloads(&resource_id).await {
            tracing::warn!(resource_id = %resource_id, error = %e, "failed to count download");
        }
    });

    Ok(response)
}

/// CORS preflight answer.
fn preflight() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, CORS_ALLOW_ORIGIN),
            (header::ACCESS_CONTROL_ALLOW_METHODS, CORS_ALLOW_METHODS),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, CORS_ALLOW_HEADERS),
            (header::ACCESS_CONTROL_MAX_AGE, "86400"),
        ],
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_first_value_wins() {
        let query = GatewayQuery::from_pairs(pairs(&[
            ("file", "a.1.sig"),
            ("mode", "inline"),
            ("file", "b.2.sig"),
            ("mode", "stream"),
        ]));
        assert_eq!(query.file.as_deref(), Some("a.1.sig"));
        assert_eq!(query.mode.as_deref(), Some("inline"));
    }

    #[test]
    fn test_empty_mode_falls_back_to_default() {
        let query = GatewayQuery::from_pairs(pairs(&[("file", "t"), ("mode", "")]));
        assert_eq!(query.mode_or("attachment"), "attachment");

        let query = GatewayQuery::from_pairs(pairs(&[("file", "t")]));
        assert_eq!(query.mode_or("attachment"), "attachment");

        let query = GatewayQuery::from_pairs(pairs(&[("mode", "stream")]));
        assert_eq!(query.mode_or("attachment"), "stream");
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let query = GatewayQuery::from_pairs(pairs(&[("utm", "x"), ("file", "t")]));
        assert_eq!(
            query,
            GatewayQuery {
                file: Some("t".to_string()),
                mode: None,
            }
        );
    }
}
