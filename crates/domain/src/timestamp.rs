//! Timestamp codec.
//!
//! Two representations meet here: the remote server's modify-time reply
//! (`YYYYMMDDhhmmss`, UTC) and the capture time the console embeds at the
//! front of album file names. Both collapse into [`FileTimestamp`], a
//! second-resolution point in time that compares directly against local mtimes.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use switch_sync_shared::{ErrorCode, ErrorEnvelope};

/// Default rendering pattern for renamed screenshots.
pub const DEFAULT_SCREENSHOT_PATTERN: &str = "%Y-%m-%d_%H-%M-%S";

/// Width of the `.bmp` capture prefix `YYYY-MM-DD_hh-mm-ss`.
const BMP_PREFIX_LEN: usize = 19;

/// Width of the seconds part of a dense capture prefix.
const DENSE_SECONDS_LEN: usize = 14;

/// Longest dense prefix: seconds plus six fractional digits.
const DENSE_MAX_LEN: usize = 20;

/// Point in time with second resolution, stored as UTC epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTimestamp(i64);

impl FileTimestamp {
    /// Build from UTC epoch seconds.
    #[must_use]
    pub const fn from_unix_seconds(seconds: i64) -> Self {
        Self(seconds)
    }

    /// Return UTC epoch seconds.
    #[must_use]
    pub const fn unix_seconds(self) -> i64 {
        self.0
    }

    /// Build from a wall-clock value interpreted as UTC.
    #[must_use]
    pub fn from_naive_utc(value: NaiveDateTime) -> Self {
        Self(value.and_utc().timestamp())
    }

    /// Truncate a filesystem time to whole seconds.
    #[must_use]
    pub fn from_system_time(value: SystemTime) -> Self {
        let seconds = match value.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
            Err(before) => {
                let duration = before.duration();
                let whole = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
                // Floor toward negative infinity for sub-second remainders.
                if duration.subsec_nanos() > 0 {
                    -whole - 1
                } else {
                    -whole
                }
            },
        };
        Self(seconds)
    }

    /// Convert to a filesystem time.
    #[must_use]
    pub fn to_system_time(self) -> SystemTime {
        let magnitude = Duration::from_secs(self.0.unsigned_abs());
        if self.0 >= 0 {
            UNIX_EPOCH + magnitude
        } else {
            UNIX_EPOCH - magnitude
        }
    }

    /// Convert to a UTC wall-clock value, if representable.
    #[must_use]
    pub fn to_naive_utc(self) -> Option<NaiveDateTime> {
        DateTime::from_timestamp(self.0, 0).map(|value| value.naive_utc())
    }
}

impl fmt::Display for FileTimestamp {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_naive_utc() {
            Some(value) => write!(formatter, "{}Z", value.format("%Y-%m-%dT%H:%M:%S")),
            None => write!(formatter, "@{}", self.0),
        }
    }
}

/// Timestamp parsing and formatting failures. All of them are non-fatal to a pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampParseError {
    /// The server returned nothing usable.
    #[error("modify-time response is empty")]
    EmptyProtocol,
    /// The server reply is not a `YYYYMMDDhhmmss` value.
    #[error("modify-time response is malformed: {raw}")]
    InvalidProtocol {
        /// Raw reply as received.
        raw: String,
    },
    /// The file name does not begin with a recognised capture timestamp.
    #[error("file name carries no capture timestamp: {file_name}")]
    InvalidEmbedded {
        /// Base name that failed to parse.
        file_name: String,
    },
    /// The rendering pattern contains an unknown specifier.
    #[error("invalid timestamp pattern: {pattern}")]
    InvalidPattern {
        /// Offending pattern.
        pattern: String,
    },
    /// The timestamp cannot be represented as a calendar date.
    #[error("timestamp out of range: {seconds}")]
    OutOfRange {
        /// Epoch seconds.
        seconds: i64,
    },
}

impl TimestampParseError {
    fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::EmptyProtocol | Self::InvalidProtocol { .. } => "invalid_protocol",
            Self::InvalidEmbedded { .. } => "invalid_embedded",
            Self::InvalidPattern { .. } => "invalid_pattern",
            Self::OutOfRange { .. } => "out_of_range",
        };
        ErrorCode::new("timestamp", code)
    }
}

impl From<TimestampParseError> for ErrorEnvelope {
    fn from(error: TimestampParseError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());
        match error {
            TimestampParseError::EmptyProtocol => envelope,
            TimestampParseError::InvalidProtocol { raw } => envelope.with_metadata("raw", raw),
            TimestampParseError::InvalidEmbedded { file_name } => {
                envelope.with_metadata("fileName", file_name)
            },
            TimestampParseError::InvalidPattern { pattern } => {
                envelope.with_metadata("pattern", pattern)
            },
            TimestampParseError::OutOfRange { seconds } => {
                envelope.with_metadata("seconds", seconds.to_string())
            },
        }
    }
}

/// Parse a modify-time reply.
///
/// Accepts either the bare value (`20240102030405`) or the full reply line
/// (`213 20240102030405`). An RFC 3659 fractional suffix is ignored.
pub fn parse_protocol_timestamp(raw: &str) -> Result<FileTimestamp, TimestampParseError> {
    let token = raw
        .split_whitespace()
        .last()
        .ok_or(TimestampParseError::EmptyProtocol)?;
    let invalid = || TimestampParseError::InvalidProtocol {
        raw: raw.trim().to_owned(),
    };

    let (seconds_part, fraction) = match token.split_once('.') {
        Some((seconds_part, fraction)) => (seconds_part, Some(fraction)),
        None => (token, None),
    };
    if fraction.is_some_and(|fraction| fraction.is_empty() || !all_digits(fraction)) {
        return Err(invalid());
    }
    if seconds_part.len() != DENSE_SECONDS_LEN || !all_digits(seconds_part) {
        return Err(invalid());
    }

    compact_datetime(seconds_part, 0)
        .map(FileTimestamp::from_naive_utc)
        .ok_or_else(invalid)
}

/// Parse the capture timestamp embedded at the front of an album file name.
///
/// `.bmp` captures start with `YYYY-MM-DD_hh-mm-ss`. Everything else starts
/// with `YYYYMMDDhhmmss` followed by up to six fractional digits, terminated
/// by the first `-`.
pub fn parse_embedded_timestamp(file_name: &str) -> Result<FileTimestamp, TimestampParseError> {
    let base = base_name(file_name);
    let (stem, extension) = split_extension(base);
    let invalid = || TimestampParseError::InvalidEmbedded {
        file_name: base.to_owned(),
    };

    let parsed = if extension.eq_ignore_ascii_case(".bmp") {
        parse_bmp_prefix(stem)
    } else {
        parse_dense_prefix(stem)
    };

    parsed.map(FileTimestamp::from_naive_utc).ok_or_else(invalid)
}

/// Render a timestamp with a strftime pattern.
pub fn format_timestamp(ts: FileTimestamp, pattern: &str) -> Result<String, TimestampParseError> {
    validate_timestamp_pattern(pattern)?;
    let value = ts.to_naive_utc().ok_or(TimestampParseError::OutOfRange {
        seconds: ts.unix_seconds(),
    })?;

    let mut rendered = String::new();
    write!(rendered, "{}", value.format(pattern)).map_err(|_| {
        TimestampParseError::InvalidPattern {
            pattern: pattern.to_owned(),
        }
    })?;
    Ok(rendered)
}

/// Reject patterns that cannot render a capture time.
///
/// Besides unknown or dangling specifiers this catches offset and zone
/// specifiers (`%z`, `%Z`), which parse but have nothing to render for a
/// naive UTC time.
pub fn validate_timestamp_pattern(pattern: &str) -> Result<(), TimestampParseError> {
    let invalid = || TimestampParseError::InvalidPattern {
        pattern: pattern.to_owned(),
    };
    if pattern.trim().is_empty()
        || StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
    {
        return Err(invalid());
    }

    let sample = NaiveDate::from_ymd_opt(2024, 1, 2)
        .and_then(|date| date.and_hms_opt(3, 4, 5))
        .ok_or_else(invalid)?;
    let mut rendered = String::new();
    write!(rendered, "{}", sample.format(pattern)).map_err(|_| invalid())
}

/// Final path segment of a remote or local name.
#[must_use]
pub fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Split `name.ext` into (`name`, `.ext`). Leading dots do not start an extension.
#[must_use]
pub fn split_extension(name: &str) -> (&str, &str) {
    let leading = name.len() - name.trim_start_matches('.').len();
    match name.rfind('.') {
        Some(index) if index > leading => name.split_at(index),
        _ => (name, ""),
    }
}

fn parse_bmp_prefix(stem: &str) -> Option<NaiveDateTime> {
    let prefix = stem.get(..BMP_PREFIX_LEN)?;
    let rest = stem.get(BMP_PREFIX_LEN..)?;
    if !(rest.is_empty() || rest.starts_with('-')) {
        return None;
    }

    let bytes = prefix.as_bytes();
    let separators = [(4, b'-'), (7, b'-'), (10, b'_'), (13, b'-'), (16, b'-')];
    if separators
        .iter()
        .any(|(index, expected)| bytes.get(*index) != Some(expected))
    {
        return None;
    }

    let compact: String = prefix.chars().filter(char::is_ascii_digit).collect();
    if compact.len() != DENSE_SECONDS_LEN {
        return None;
    }
    compact_datetime(&compact, 0)
}

fn parse_dense_prefix(stem: &str) -> Option<NaiveDateTime> {
    let prefix = stem.split('-').next()?;
    if prefix.len() <= DENSE_SECONDS_LEN || prefix.len() > DENSE_MAX_LEN || !all_digits(prefix) {
        return None;
    }

    let fraction = prefix.get(DENSE_SECONDS_LEN..)?;
    let padded = format!("{fraction:0<6}");
    let micros = padded.parse::<u32>().ok()?;
    compact_datetime(prefix.get(..DENSE_SECONDS_LEN)?, micros)
}

/// Build a date-time from exactly fourteen ASCII digits `YYYYMMDDhhmmss`.
fn compact_datetime(digits: &str, micros: u32) -> Option<NaiveDateTime> {
    let field = |start: usize, len: usize| -> Option<u32> { digits.get(start..start + len)?.parse().ok() };

    let year = i32::try_from(field(0, 4)?).ok()?;
    NaiveDate::from_ymd_opt(year, field(4, 2)?, field(6, 2)?)?.and_hms_micro_opt(
        field(8, 2)?,
        field(10, 2)?,
        field(12, 2)?,
        micros,
    )
}

fn all_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|byte| byte.is_ascii_digit())
}
