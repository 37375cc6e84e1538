//! Single `Range: bytes=...` header parsing for backends that serve bytes themselves.

/// Inclusive byte range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` value for a 206 response.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// The requested range lies entirely outside the object.
#[derive(Debug, PartialEq, Eq)]
pub struct Unsatisfiable;

/// Parse a Range header against an object of `total` bytes.
///
/// Returns `Ok(None)` when the header should be ignored and the whole object
/// served: unknown units, syntax errors and multi-range requests.
pub fn parse_range(header: &str, total: u64) -> Result<Option<ByteRange>, Unsatisfiable> {
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return Ok(None);
    };
    if spec.contains(',') {
        return Ok(None);
    }
    let Some((first, last)) = spec.trim().split_once('-') else {
        return Ok(None);
    };

    let range = match (first.trim(), last.trim()) {
        ("", "") => return Ok(None),
        ("", suffix) => {
            let Ok(suffix) = suffix.parse::<u64>() else {
                return Ok(None);
            };
            if suffix == 0 || total == 0 {
                return Err(Unsatisfiable);
            }
            ByteRange {
                start: total.saturating_sub(suffix),
                end: total - 1,
            }
        }
        (start, end) => {
            let Ok(start) = start.parse::<u64>() else {
                return Ok(None);
            };
            let end = if end.is_empty() {
                u64::MAX
            } else {
                match end.parse::<u64>() {
                    Ok(end) if end >= start => end,
                    _ => return Ok(None),
                }
            };
            if start >= total {
                return Err(Unsatisfiable);
            }
            ByteRange {
                start,
                end: end.min(total - 1),
            }
        }
    };

    Ok(Some(range))
}
