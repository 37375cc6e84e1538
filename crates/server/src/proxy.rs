//! Byte-range-forwarding proxy from the upstream to the client.
//!
//! The upstream body is handed to axum chunk by chunk; nothing is buffered
//! beyond a single chunk. Dropping the response body (client disconnect)
//! drops the upstream stream and with it the upstream request.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use filegate_core::{ResourceDescriptor, ServeMode};
use filegate_upstream::{ByteStream, UpstreamProvider};
use futures::{Stream, StreamExt};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_METHODS: &str = "GET, HEAD, POST, OPTIONS";
pub const CORS_ALLOW_HEADERS: &str = "Content-Type, Range";
pub const CACHE_CONTROL: &str = "public, max-age=3600";

/// RFC 5987 `attr-char` minus the alphanumerics.
const FILENAME_STAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Build a Content-Disposition value with an ASCII fallback name and, when
/// needed, the exact UTF-8 name in `filename*`.
pub fn content_disposition(mode: ServeMode, display_name: &str) -> String {
    let fallback: String = display_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    if fallback == display_name {
        format!("{}; filename=\"{fallback}\"", mode.disposition())
    } else {
        format!(
            "{}; filename=\"{fallback}\"; filename*=UTF-8''{}",
            mode.disposition(),
            utf8_percent_encode(display_name, FILENAME_STAR)
        )
    }
}

/// Streams upstream bytes to clients with rewritten headers.
pub struct StreamingProxy {
    upstream: Arc<dyn UpstreamProvider>,
    locator_timeout: Duration,
    connect_timeout: Duration,
    idle_timeout: Duration,
}

impl StreamingProxy {
    pub fn new(
        upstream: Arc<dyn UpstreamProvider>,
        locator_timeout: Duration,
        connect_timeout: Duration,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            upstream,
            locator_timeout,
            connect_timeout,
            idle_timeout,
        }
    }

    /// Headers-only answer built from the descriptor. No upstream call.
    pub fn head(&self, descriptor: &ResourceDescriptor, mode: ServeMode) -> ApiResult<Response> {
        response_headers(Response::builder().status(StatusCode::OK), descriptor, mode)
            .header(header::CONTENT_LENGTH, descriptor.size)
            .body(Body::empty())
            .map_err(|e| ApiError::Internal(format!("failed to build response: {e}")))
    }

    /// Resolve a fresh locator, fetch with `range` forwarded verbatim and
    /// stream the body through.
    pub async fn serve(
        &self,
        descriptor: &ResourceDescriptor,
        mode: ServeMode,
        range: Option<&str>,
    ) -> ApiResult<Response> {
        let started = Instant::now();
        let locator = match tokio::time::timeout(
            self.locator_timeout,
            self.upstream.resolve_locator(descriptor),
        )
        .await
        {
            Ok(Ok(locator)) => locator,
            Ok(Err(e)) => {
                metrics::record_upstream_error("locator");
                tracing::warn!(error = %e, "failed to resolve byte locator");
                return Err(ApiError::upstream(e));
            }
            Err(_) => {
                metrics::record_upstream_error("locator");
                return Err(ApiError::UpstreamUnavailable {
                    status: None,
                    message: "locator resolution timed out".to_string(),
                });
            }
        };
        metrics::UPSTREAM_DURATION
            .with_label_values(&["locator"])
            .observe(started.elapsed().as_secs_f64());

        let started = Instant::now();
        let upstream = match tokio::time::timeout(
            self.connect_timeout,
            self.upstream.fetch_bytes(&locator, range),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                metrics::record_upstream_error("bytes");
                tracing::warn!(error = %e, range = ?range, "upstream byte fetch failed");
                return Err(ApiError::upstream(e));
            }
            Err(_) => {
                metrics::record_upstream_error("bytes");
                return Err(ApiError::UpstreamUnavailable {
                    status: None,
                    message: "upstream byte fetch timed out".to_string(),
                });
            }
        };
        metrics::UPSTREAM_DURATION
            .with_label_values(&["bytes"])
            .observe(started.elapsed().as_secs_f64());

        let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::OK);
        tracing::debug!(
            status = status.as_u16(),
            content_length = ?upstream.content_length,
            content_range = ?upstream.content_range,
            "streaming upstream body"
        );

        let mut builder = response_headers(Response::builder().status(status), descriptor, mode);
        if let Some(len) = upstream.content_length {
            builder = builder.header(header::CONTENT_LENGTH, len);
        }
        if let Some(content_range) = upstream
            .content_range
            .as_deref()
            .and_then(|v| HeaderValue::from_str(v).ok())
        {
            builder = builder.header(header::CONTENT_RANGE, content_range);
        }

        builder
            .body(Body::from_stream(idle_bounded(upstream.body, self.idle_timeout)))
            .map_err(|e| ApiError::Internal(format!("failed to build response: {e}")))
    }
}

/// Headers shared by GET and HEAD responses.
fn response_headers(
    builder: axum::http::response::Builder,
    descriptor: &ResourceDescriptor,
    mode: ServeMode,
) -> axum::http::response::Builder {
    let content_type = HeaderValue::from_str(&descriptor.mime_type)
        .unwrap_or(HeaderValue::from_static(filegate_core::resource::FALLBACK_MIME_TYPE));

    builder
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(mode, &descriptor.display_name),
        )
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, CORS_ALLOW_ORIGIN)
        .header(header::ACCESS_CONTROL_ALLOW_METHODS, CORS_ALLOW_METHODS)
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, CORS_ALLOW_HEADERS)
        .header(header::CACHE_CONTROL, CACHE_CONTROL)
}

/// Ends the stream with an error when the upstream stalls longer than `idle`
/// between two chunks.
fn idle_bounded(
    body: ByteStream,
    idle: Duration,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    futures::stream::unfold(Some(body), move |state| async move {
        let mut body = state?;
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(Ok(chunk))) => {
                metrics::BYTES_STREAMED.inc_by(chunk.len() as u64);
                Some((Ok(chunk), Some(body)))
            }
            Ok(Some(Err(e))) => {
                tracing::warn!(error = %e, "upstream body failed mid-stream");
                Some((Err(std::io::Error::other(e)), None))
            }
            Ok(None) => None,
            Err(_) => {
                tracing::warn!(idle_secs = idle.as_secs(), "upstream body stalled");
                Some((
                    Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "upstream body stalled",
                    )),
                    None,
                ))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use filegate_upstream::UpstreamError;

    #[test]
    fn test_disposition_ascii_name() {
        assert_eq!(
            content_disposition(ServeMode::Attachment, "report.pdf"),
            "attachment; filename=\"report.pdf\""
        );
        assert_eq!(
            content_disposition(ServeMode::Stream, "clip.mp4"),
            "inline; filename=\"clip.mp4\""
        );
    }

    #[test]
    fn test_disposition_escapes_quotes() {
        let value = content_disposition(ServeMode::Inline, "a\"b.txt");
        assert!(value.starts_with("inline; filename=\"a_b.txt\""));
        assert!(value.contains("filename*=UTF-8''a%22b.txt"));
        HeaderValue::from_str(&value).unwrap();
    }

    #[test]
    fn test_disposition_utf8_name() {
        let value = content_disposition(ServeMode::Attachment, "фото 1.jpg");
        assert!(value.contains("filename=\"____ 1.jpg\""));
        assert!(value.contains("filename*=UTF-8''%D1%84%D0%BE%D1%82%D0%BE%201.jpg"));
        HeaderValue::from_str(&value).unwrap();
    }

    #[tokio::test]
    async fn test_idle_bounded_passes_chunks() {
        let body: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok::<_, UpstreamError>(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cd")),
        ]));
        let chunks: Vec<_> = idle_bounded(body, Duration::from_secs(5))
            .collect::<Vec<_>>()
            .await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].as_ref().unwrap(), &Bytes::from_static(b"cd"));
    }

    #[tokio::test]
    async fn test_idle_bounded_times_out_on_stall() {
        let body: ByteStream = Box::pin(
            futures::stream::iter(vec![Ok::<_, UpstreamError>(Bytes::from_static(b"ab"))])
                .chain(futures::stream::pending()),
        );
        let chunks: Vec<_> = idle_bounded(body, Duration::from_millis(20))
            .collect::<Vec<_>>()
            .await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_ok());
        let err = chunks[1].as_ref().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }
}
