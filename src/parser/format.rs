//! Recognized raw log layouts.
//!
//! The set of formats is closed: each variant maps to a static
//! [`FormatProfile`] describing its delimiter and the column layout to assume
//! when the input has no header row.

use super::columns;
use super::fields::split_fields;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Raw log layouts the parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JMeter CSV results (JTL)
    Jtl,
    /// Generic comma (or declared delimiter) separated values
    Csv,
    /// Tab separated values
    Tsv,
}

/// Static description of one format.
#[derive(Debug)]
pub struct FormatProfile {
    pub format: LogFormat,
    pub delimiter: char,
    /// Column names assumed when there is no header row
    pub default_header: &'static [&'static str],
}

/// Header JMeter writes by default (and omits in some remote-mode runs).
pub const JMETER_DEFAULT_HEADER: &[&str] = &[
    "timeStamp",
    "elapsed",
    "label",
    "responseCode",
    "responseMessage",
    "threadName",
    "dataType",
    "success",
    "bytes",
    "grpThreads",
    "allThreads",
    "Latency",
];

/// Positional layout for generic delimited logs without a header.
pub const GENERIC_DEFAULT_HEADER: &[&str] = &["timestamp", "label", "elapsed", "status", "bytes"];

static JTL_PROFILE: FormatProfile = FormatProfile {
    format: LogFormat::Jtl,
    delimiter: ',',
    default_header: JMETER_DEFAULT_HEADER,
};

static CSV_PROFILE: FormatProfile = FormatProfile {
    format: LogFormat::Csv,
    delimiter: ',',
    default_header: GENERIC_DEFAULT_HEADER,
};

static TSV_PROFILE: FormatProfile = FormatProfile {
    format: LogFormat::Tsv,
    delimiter: '\t',
    default_header: GENERIC_DEFAULT_HEADER,
};

const CANDIDATE_DELIMITERS: &[char] = &[',', '\t', ';', '|'];

impl LogFormat {
    pub fn profile(self) -> &'static FormatProfile {
        match self {
            LogFormat::Jtl => &JTL_PROFILE,
            LogFormat::Csv => &CSV_PROFILE,
            LogFormat::Tsv => &TSV_PROFILE,
        }
    }

    /// Guess the format and delimiter from the first non-blank line.
    pub fn sniff(first_line: &str) -> (LogFormat, char) {
        let delimiter = sniff_delimiter(first_line);
        if delimiter == '\t' {
            return (LogFormat::Tsv, '\t');
        }
        if delimiter == ',' {
            if let Ok(fields) = split_fields(first_line, ',') {
                if columns::looks_like_jmeter_header(&fields)
                    || columns::matches_jmeter_default_row(&fields)
                {
                    return (LogFormat::Jtl, ',');
                }
            }
        }
        (LogFormat::Csv, delimiter)
    }
}

/// Most frequent candidate delimiter outside quotes, comma on ties or none.
fn sniff_delimiter(line: &str) -> char {
    let mut counts = [0usize; 4];
    let mut in_quotes = false;
    for c in line.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if !in_quotes {
            if let Some(idx) = CANDIDATE_DELIMITERS.iter().position(|d| *d == c) {
                counts[idx] += 1;
            }
        }
    }
    let mut best = 0;
    for idx in 1..counts.len() {
        if counts[idx] > counts[best] {
            best = idx;
        }
    }
    CANDIDATE_DELIMITERS[best]
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogFormat::Jtl => "jtl",
            LogFormat::Csv => "csv",
            LogFormat::Tsv => "tsv",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jtl" | "jmeter" => Ok(LogFormat::Jtl),
            "csv" => Ok(LogFormat::Csv),
            "tsv" => Ok(LogFormat::Tsv),
            other => Err(format!("Unknown log format: {}", other)),
        }
    }
}
