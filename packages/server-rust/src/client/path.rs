//! Outbound URL construction.

use url::Url;

use crate::service::operation::OperationError;

const ID_PLACEHOLDER: &str = "{id}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Id,
}

/// A request path like `/courses/{id}/students` with exactly one `{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// # Errors
    ///
    /// `Configuration` unless the template has exactly one `{id}` segment.
    pub fn parse(template: &str) -> Result<Self, OperationError> {
        let segments: Vec<Segment> = template
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == ID_PLACEHOLDER {
                    Segment::Id
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        let ids = segments.iter().filter(|s| **s == Segment::Id).count();
        if ids != 1 {
            return Err(OperationError::configuration(format!(
                "path template {template:?} must contain exactly one {ID_PLACEHOLDER} segment"
            )));
        }
        Ok(Self { segments })
    }

    /// Appends the template to a copy of `base`, with `id` percent-encoded
    /// as a single segment. `base` itself is never modified.
    ///
    /// # Errors
    ///
    /// `Configuration` when `base` cannot carry a path (e.g. `mailto:`).
    pub fn resolve(&self, base: &Url, id: &str) -> Result<Url, OperationError> {
        let mut url = base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                OperationError::configuration(format!("base URL {base} cannot carry a path"))
            })?;
            path.pop_if_empty();
            for segment in &self.segments {
                match segment {
                    Segment::Literal(s) => path.push(s),
                    Segment::Id => path.push(id),
                };
            }
        }
        Ok(url)
    }
}

/// Parses a peer address, adding `http://` when no scheme is given.
///
/// # Errors
///
/// `Configuration` when the result is not a valid URL.
pub fn normalize_base(raw: &str) -> Result<Url, OperationError> {
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    Url::parse(&with_scheme)
        .map_err(|e| OperationError::configuration(format!("invalid peer URL {raw:?}: {e}")))
}
