//! Domain primitives with validated constructors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use switch_sync_shared::{ErrorCode, ErrorEnvelope};

/// Validation failures for domain primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// `TargetId` is empty after trimming.
    InvalidTargetId {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// `TargetId` contains characters outside `[a-z0-9_-]`.
    TargetIdCharset {
        /// Trimmed id that failed validation.
        input: String,
    },
    /// `RemotePath` is not absolute.
    RelativeRemotePath {
        /// Raw path as provided.
        input: String,
    },
    /// A name used to extend a remote path is empty or contains a separator.
    InvalidRemoteName {
        /// Raw name as provided.
        input: String,
    },
}

impl PrimitiveError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidTargetId { .. } | Self::TargetIdCharset { .. } => {
                ErrorCode::new("domain", "invalid_target_id")
            },
            Self::RelativeRemotePath { .. } => ErrorCode::new("domain", "invalid_remote_path"),
            Self::InvalidRemoteName { .. } => ErrorCode::new("domain", "invalid_remote_name"),
        }
    }
}

impl fmt::Display for PrimitiveError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTargetId { .. } => formatter.write_str("TargetId must be non-empty"),
            Self::TargetIdCharset { .. } => {
                formatter.write_str("TargetId must match /^[a-z0-9_-]+$/")
            },
            Self::RelativeRemotePath { .. } => {
                formatter.write_str("RemotePath must start with '/'")
            },
            Self::InvalidRemoteName { .. } => {
                formatter.write_str("remote entry name must be non-empty and contain no '/'")
            },
        }
    }
}

impl std::error::Error for PrimitiveError {}

impl From<PrimitiveError> for ErrorEnvelope {
    fn from(error: PrimitiveError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());
        match error {
            PrimitiveError::InvalidTargetId { input_length } => {
                envelope.with_metadata("input_length", input_length.to_string())
            },
            PrimitiveError::TargetIdCharset { input }
            | PrimitiveError::RelativeRemotePath { input }
            | PrimitiveError::InvalidRemoteName { input } => envelope.with_metadata("input", input),
        }
    }
}

/// Stable identifier for one sync target (`screenshots`, `files-1`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(Box<str>);

impl TargetId {
    /// Parse a target id; trims and rejects empty input.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PrimitiveError::InvalidTargetId {
                input_length: raw.len(),
            });
        }
        let valid = trimmed
            .bytes()
            .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || matches!(byte, b'_' | b'-'));
        if !valid {
            return Err(PrimitiveError::TargetIdCharset {
                input: trimmed.to_owned(),
            });
        }
        Ok(Self(trimmed.into()))
    }

    /// Id of the album screenshots target.
    #[must_use]
    pub fn screenshots() -> Self {
        Self("screenshots".into())
    }

    /// Id of the n-th (1-based) file-sync target.
    #[must_use]
    pub fn file_sync(index: usize) -> Self {
        Self(format!("files-{index}").into_boxed_str())
    }

    /// Borrow as string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Absolute, normalized path on the remote server.
///
/// Always starts with `/`, never ends with `/` (except the root itself), and
/// never contains empty segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemotePath(Box<str>);

impl RemotePath {
    /// The server root.
    #[must_use]
    pub fn root() -> Self {
        Self("/".into())
    }

    /// Parse and normalize an absolute remote path.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref().trim();
        if !raw.starts_with('/') {
            return Err(PrimitiveError::RelativeRemotePath {
                input: raw.to_owned(),
            });
        }
        let segments: Vec<&str> = raw.split('/').filter(|segment| !segment.is_empty()).collect();
        if segments.is_empty() {
            return Ok(Self::root());
        }
        Ok(Self(format!("/{}", segments.join("/")).into_boxed_str()))
    }

    /// Append one listing name. Names with separators are reduced to their last segment.
    pub fn join(&self, name: &str) -> Result<Self, PrimitiveError> {
        let name = name.trim_end_matches('/');
        let segment = name.rsplit('/').next().unwrap_or(name);
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(PrimitiveError::InvalidRemoteName {
                input: name.to_owned(),
            });
        }
        if self.is_root() {
            Ok(Self(format!("/{segment}").into_boxed_str()))
        } else {
            Ok(Self(format!("{}/{segment}", self.0).into_boxed_str()))
        }
    }

    /// Returns true for `/`.
    #[must_use]
    pub fn is_root(&self) -> bool {
        &*self.0 == "/"
    }

    /// Final segment, or `/` for the root.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().filter(|name| !name.is_empty()).unwrap_or("/")
    }

    /// Segments of this path below `root`, or `None` when not contained in it.
    #[must_use]
    pub fn relative_segments(&self, root: &Self) -> Option<Vec<&str>> {
        let rest = if root.is_root() {
            self.0.strip_prefix('/')?
        } else {
            self.0.strip_prefix(&*root.0)?.strip_prefix('/')?
        };
        Some(rest.split('/').filter(|segment| !segment.is_empty()).collect())
    }

    /// Borrow as string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<String> for RemotePath {
    type Error = PrimitiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RemotePath> for String {
    fn from(value: RemotePath) -> Self {
        value.0.into_string()
    }
}

/// Join remote-derived segments under a local root, dropping anything that
/// could escape it (`..`, `.`, drive prefixes, absolute components).
#[must_use]
pub fn contained_local_path<'a>(root: &Path, segments: impl IntoIterator<Item = &'a str>) -> PathBuf {
    let mut path = root.to_path_buf();
    for segment in segments {
        for component in Path::new(segment).components() {
            if let Component::Normal(part) = component {
                path.push(part);
            }
        }
    }
    path
}
