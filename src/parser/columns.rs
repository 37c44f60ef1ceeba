//! Header detection and column resolution.

use super::config::ColumnMapping;
use super::error::{FormatError, ParseResult};
use super::fields::parse_timestamp;
use super::format::JMETER_DEFAULT_HEADER;
use once_cell::sync::Lazy;
use std::collections::HashSet;

const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "ts", "time", "start"];
const LABEL_ALIASES: &[&str] = &["label", "name", "sampler"];
const ELAPSED_ALIASES: &[&str] = &["elapsed", "duration", "elapsed_ms", "latency_ms"];
const STATUS_ALIASES: &[&str] = &["success", "status", "result", "outcome"];
const BYTES_ALIASES: &[&str] = &["bytes", "size", "response_bytes"];
const RESPONSE_CODE_ALIASES: &[&str] = &["responsecode", "code", "status_code", "http_code"];

/// Every JMeter result column name, lowercased.
static JMETER_COLUMNS: Lazy<HashSet<String>> = Lazy::new(|| {
    [
        "timestamp",
        "elapsed",
        "label",
        "responsecode",
        "responsemessage",
        "threadname",
        "datatype",
        "success",
        "failuremessage",
        "bytes",
        "sentbytes",
        "grpthreads",
        "allthreads",
        "url",
        "filename",
        "latency",
        "connect",
        "encoding",
        "samplecount",
        "errorcount",
        "hostname",
        "idletime",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
});

/// Every name the default mapping can resolve, lowercased.
static KNOWN_COLUMNS: Lazy<HashSet<String>> = Lazy::new(|| {
    let mut known: HashSet<String> = JMETER_COLUMNS.clone();
    for aliases in [
        TIMESTAMP_ALIASES,
        LABEL_ALIASES,
        ELAPSED_ALIASES,
        STATUS_ALIASES,
        BYTES_ALIASES,
        RESPONSE_CODE_ALIASES,
    ] {
        known.extend(aliases.iter().map(|s| s.to_string()));
    }
    known
});

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

fn count_recognized(fields: &[String], known: &HashSet<String>) -> (usize, usize) {
    let recognized = fields.iter().filter(|f| known.contains(&normalize(f))).count();
    (recognized, fields.len())
}

/// Whether a row reads as a header row: every column is known, or at
/// least three are.
pub fn is_header_row(fields: &[String]) -> bool {
    let (recognized, total) = count_recognized(fields, &KNOWN_COLUMNS);
    recognized > 0 && (recognized == total || recognized >= 3)
}

/// Whether a row reads as a JMeter header row.
pub fn looks_like_jmeter_header(fields: &[String]) -> bool {
    let (recognized, total) = count_recognized(fields, &JMETER_COLUMNS);
    recognized >= 3 && (recognized == total || total - recognized < recognized)
}

/// Whether a headerless row has JMeter's default 12-column layout.
///
/// The timestamp may be epoch milliseconds or a formatted date, since
/// JMeter can be configured to write either.
pub fn matches_jmeter_default_row(fields: &[String]) -> bool {
    fields.len() == JMETER_DEFAULT_HEADER.len()
        && parse_timestamp(&fields[0]).is_ok()
        && is_integer(&fields[1])
        && is_boolean(&fields[7])
        && is_integer(&fields[8])
        && is_integer(&fields[9])
        && is_integer(&fields[10])
        && is_integer(&fields[11])
}

fn is_integer(text: &str) -> bool {
    let text = text.trim();
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_boolean(text: &str) -> bool {
    let text = text.trim();
    text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false")
}

/// Column indexes the reader pulls values from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub timestamp: usize,
    pub label: usize,
    pub elapsed: usize,
    pub status: Option<usize>,
    pub bytes: Option<usize>,
    pub response_code: Option<usize>,
}

impl ResolvedColumns {
    /// Resolve the mapping against a header (real or assumed).
    pub fn resolve(header: &[String], mapping: &ColumnMapping) -> ParseResult<Self> {
        let names: Vec<String> = header.iter().map(|h| normalize(h)).collect();

        let timestamp = required(&names, mapping.timestamp_column.as_deref(), TIMESTAMP_ALIASES, "timestamp")?;
        let label = required(&names, mapping.label_column.as_deref(), LABEL_ALIASES, "label")?;
        let elapsed = required(&names, mapping.elapsed_column.as_deref(), ELAPSED_ALIASES, "elapsed")?;
        let status = optional(&names, mapping.status_column.as_deref(), STATUS_ALIASES)?;
        let bytes = optional(&names, mapping.bytes_column.as_deref(), BYTES_ALIASES)?;
        let response_code = optional(
            &names,
            mapping.response_code_column.as_deref(),
            RESPONSE_CODE_ALIASES,
        )?;

        Ok(Self {
            timestamp,
            label,
            elapsed,
            status,
            bytes,
            response_code,
        })
    }

    /// Number of columns a row needs to carry every mapped value.
    pub fn min_width(&self) -> usize {
        [
            Some(self.timestamp),
            Some(self.label),
            Some(self.elapsed),
            self.status,
            self.bytes,
            self.response_code,
        ]
        .iter()
        .flatten()
        .max()
        .map(|idx| idx + 1)
        .unwrap_or(0)
    }
}

fn required(
    names: &[String],
    configured: Option<&str>,
    aliases: &[&str],
    what: &str,
) -> ParseResult<usize> {
    match optional(names, configured, aliases)? {
        Some(idx) => Ok(idx),
        None => Err(FormatError::missing_column(format!(
            "no {} column (tried {})",
            what,
            configured.map(|c| vec![c]).unwrap_or_else(|| aliases.to_vec()).join(", ")
        ))),
    }
}

/// A configured name must exist; a purely numeric name is a zero-based index.
fn optional(names: &[String], configured: Option<&str>, aliases: &[&str]) -> ParseResult<Option<usize>> {
    if let Some(column) = configured {
        let wanted = normalize(column);
        if let Some(idx) = names.iter().position(|n| *n == wanted) {
            return Ok(Some(idx));
        }
        if let Ok(idx) = wanted.parse::<usize>() {
            return Ok(Some(idx));
        }
        return Err(FormatError::missing_column(column.to_string()));
    }
    Ok(aliases
        .iter()
        .find_map(|alias| names.iter().position(|n| n == alias)))
}
