//! Streaming row reader.
//!
//! [`SampleReader`] pulls one line at a time from any `BufRead`, so memory use
//! is bounded by the longest line rather than the input size. Each data line
//! yields either a [`Sample`] or a [`RowError`]; the aggregate outcome
//! (including the error-ratio check) is available from [`SampleReader::finish`].

use super::columns::{is_header_row, ResolvedColumns};
use super::config::ParserConfig;
use super::error::{FormatError, ParseResult, RowError};
use super::fields::{parse_i64, parse_status, parse_timestamp, parse_u64, split_fields};
use super::format::LogFormat;
use crate::sample::Sample;
use std::io::{self, BufRead};

/// Outcome of a full pass over one input.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseReport {
    pub format: LogFormat,
    pub delimiter: char,
    pub has_header: bool,
    pub rows_parsed: u64,
    pub rows_failed: u64,
    /// Rows where at least one numeric field was clamped
    pub clamped_rows: u64,
    /// Malformed rows in line order, capped at `maxReportedRowErrors`
    pub row_errors: Vec<RowError>,
    pub min_timestamp_ms: Option<i64>,
    pub max_timestamp_ms: Option<i64>,
}

impl ParseReport {
    fn new(format: LogFormat, delimiter: char, has_header: bool) -> Self {
        Self {
            format,
            delimiter,
            has_header,
            rows_parsed: 0,
            rows_failed: 0,
            clamped_rows: 0,
            row_errors: Vec::new(),
            min_timestamp_ms: None,
            max_timestamp_ms: None,
        }
    }

    pub fn total_rows(&self) -> u64 {
        self.rows_parsed + self.rows_failed
    }

    /// Share of malformed rows, `0.0` for empty input.
    pub fn error_ratio(&self) -> f64 {
        match self.total_rows() {
            0 => 0.0,
            total => self.rows_failed as f64 / total as f64,
        }
    }

    /// Fails when strictly more than `max_error_ratio` of the rows failed.
    pub fn check_error_ratio(&self, max_error_ratio: f64) -> ParseResult<()> {
        let ratio = self.error_ratio();
        if ratio > max_error_ratio {
            return Err(FormatError::ErrorThresholdExceeded {
                failed: self.rows_failed,
                total: self.total_rows(),
                ratio: ratio * 100.0,
                threshold: max_error_ratio * 100.0,
            });
        }
        Ok(())
    }
}

/// Lazy sequence of samples over a line-oriented input.
pub struct SampleReader<R> {
    input: R,
    config: ParserConfig,
    columns: Option<ResolvedColumns>,
    /// First data line, read while sniffing
    pending: Option<(u64, Vec<u8>)>,
    physical_line: u64,
    /// Physical line of the header row, 0 when there is none
    header_line: u64,
    report: ParseReport,
    io_error: Option<io::Error>,
    exhausted: bool,
}

impl<R: BufRead> SampleReader<R> {
    /// Read up to the first non-blank line and settle format, delimiter,
    /// header and column mapping.
    pub fn new(mut input: R, config: ParserConfig) -> ParseResult<Self> {
        config.validate()?;

        let mut physical_line = 0;
        let first = loop {
            let mut buf = Vec::new();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break None;
            }
            physical_line += 1;
            trim_line_ending(&mut buf);
            if physical_line == 1 && buf.starts_with(UTF8_BOM) {
                buf.drain(..UTF8_BOM.len());
            }
            if !buf.iter().all(u8::is_ascii_whitespace) {
                break Some(buf);
            }
        };

        let Some(first) = first else {
            let format = config.format.unwrap_or(LogFormat::Csv);
            let delimiter = config.delimiter.unwrap_or(format.profile().delimiter);
            let has_header = config.has_header.unwrap_or(false);
            return Ok(Self {
                input,
                config,
                columns: None,
                pending: None,
                physical_line,
                header_line: 0,
                report: ParseReport::new(format, delimiter, has_header),
                io_error: None,
                exhausted: true,
            });
        };

        let first_text = String::from_utf8_lossy(&first).into_owned();
        let (sniffed_format, sniffed_delimiter) = LogFormat::sniff(&first_text);
        let format = config.format.unwrap_or(sniffed_format);
        let delimiter = match (config.delimiter, config.format) {
            (Some(d), _) => d,
            (None, Some(declared)) if declared != LogFormat::Csv => declared.profile().delimiter,
            (None, _) => sniffed_delimiter,
        };

        let first_fields = split_fields(&first_text, delimiter);
        let has_header = match config.has_header {
            Some(declared) => declared,
            None => first_fields.as_deref().map(is_header_row).unwrap_or(false),
        };

        let (columns, header_line, pending) = if has_header {
            let header = first_fields.map_err(FormatError::malformed_header)?;
            let columns = ResolvedColumns::resolve(&header, &config.columns)?;
            if header.len() < columns.min_width() {
                return Err(FormatError::ColumnCount {
                    expected: columns.min_width(),
                    found: header.len(),
                });
            }
            (columns, physical_line, None)
        } else {
            let profile_header = format.profile().default_header;
            let width = first_fields
                .as_ref()
                .map(Vec::len)
                .unwrap_or(profile_header.len());
            let default_header: Vec<String> = profile_header
                .iter()
                .take(width)
                .map(|s| s.to_string())
                .collect();
            let columns = ResolvedColumns::resolve(&default_header, &config.columns)?;
            if width < columns.min_width() {
                return Err(FormatError::ColumnCount {
                    expected: columns.min_width(),
                    found: width,
                });
            }
            (columns, 0, Some((physical_line, first)))
        };

        Ok(Self {
            input,
            config,
            columns: Some(columns),
            pending,
            physical_line,
            header_line,
            report: ParseReport::new(format, delimiter, has_header),
            io_error: None,
            exhausted: false,
        })
    }

    pub fn format(&self) -> LogFormat {
        self.report.format
    }

    pub fn delimiter(&self) -> char {
        self.report.delimiter
    }

    pub fn has_header(&self) -> bool {
        self.report.has_header
    }

    /// Drain whatever is left and apply the error-ratio threshold.
    pub fn finish(self) -> ParseResult<ParseReport> {
        let max_error_ratio = self.config.max_error_ratio;
        let report = self.into_report()?;
        report.check_error_ratio(max_error_ratio)?;
        Ok(report)
    }

    /// Drain whatever is left without applying the threshold.
    pub fn into_report(mut self) -> ParseResult<ParseReport> {
        for _ in self.by_ref() {}
        if let Some(e) = self.io_error.take() {
            return Err(FormatError::Io(e));
        }
        Ok(self.report)
    }

    fn next_raw_line(&mut self) -> Option<(u64, Vec<u8>)> {
        if let Some(pending) = self.pending.take() {
            return Some(pending);
        }
        let mut buf = Vec::new();
        match self.input.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => {
                self.physical_line += 1;
                trim_line_ending(&mut buf);
                Some((self.physical_line, buf))
            }
            Err(e) => {
                self.io_error = Some(e);
                None
            }
        }
    }

    fn decode_row(&self, columns: &ResolvedColumns, text: &str) -> Result<Sample, String> {
        let fields = split_fields(text, self.report.delimiter)?;
        if fields.len() < columns.min_width() {
            return Err(format!(
                "expected at least {} columns, found {}",
                columns.min_width(),
                fields.len()
            ));
        }

        let timestamp = parse_timestamp(&fields[columns.timestamp]).map_err(|e| format!("timestamp: {}", e))?;

        let label = fields[columns.label].trim();
        if label.is_empty() {
            return Err("label: empty value".to_string());
        }

        let raw_elapsed = parse_i64(&fields[columns.elapsed]).map_err(|e| format!("elapsed: {}", e))?;
        let sentinel_hit = self.config.elapsed_failure_sentinel == Some(raw_elapsed.value) && !raw_elapsed.clamped;
        let elapsed_ms = if sentinel_hit {
            0
        } else if raw_elapsed.value < 0 {
            return Err(format!("elapsed: {} is negative", raw_elapsed.value));
        } else {
            raw_elapsed.value as u64
        };

        let success = match columns.status {
            Some(idx) => parse_status(&fields[idx]).map_err(|e| format!("status: {}", e))?,
            None => !sentinel_hit,
        };

        let mut clamped = timestamp.clamped || raw_elapsed.clamped;
        let mut sample = Sample::new(timestamp.value, label, elapsed_ms, success);

        if let Some(idx) = columns.bytes {
            let raw = fields[idx].trim();
            if !raw.is_empty() {
                let bytes = parse_u64(raw).map_err(|e| format!("bytes: {}", e))?;
                clamped |= bytes.clamped;
                sample = sample.with_bytes(bytes.value);
            }
        }
        if let Some(idx) = columns.response_code {
            let code = fields[idx].trim();
            if !code.is_empty() {
                sample = sample.with_response_code(code);
            }
        }
        sample.clamped = clamped;
        Ok(sample)
    }

    fn record_error(&mut self, error: RowError) {
        crate::log_parser_debug!("Skipping row: {}", error);
        self.report.rows_failed += 1;
        if self.report.row_errors.len() < self.config.max_reported_row_errors {
            self.report.row_errors.push(error);
        } else if self.report.rows_failed == self.config.max_reported_row_errors as u64 + 1 {
            crate::log_parser_warn!(
                "More than {} malformed rows; further row errors are counted but not kept",
                self.config.max_reported_row_errors
            );
        }
    }

    fn record_sample(&mut self, sample: &Sample) {
        let report = &mut self.report;
        report.rows_parsed += 1;
        if sample.clamped {
            report.clamped_rows += 1;
        }
        report.min_timestamp_ms = Some(
            report
                .min_timestamp_ms
                .map_or(sample.timestamp_ms, |t| t.min(sample.timestamp_ms)),
        );
        report.max_timestamp_ms = Some(
            report
                .max_timestamp_ms
                .map_or(sample.timestamp_ms, |t| t.max(sample.timestamp_ms)),
        );
    }
}

impl<R: BufRead> Iterator for SampleReader<R> {
    type Item = Result<Sample, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let columns = self.columns.clone()?;
        loop {
            let Some((physical, raw)) = self.next_raw_line() else {
                self.exhausted = true;
                return None;
            };
            if raw.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let line = physical - self.header_line;

            let decoded = match std::str::from_utf8(&raw) {
                Ok(text) => self.decode_row(&columns, text),
                Err(e) => Err(format!("invalid UTF-8 at byte {}", e.valid_up_to())),
            };
            return Some(match decoded {
                Ok(sample) => {
                    self.record_sample(&sample);
                    Ok(sample)
                }
                Err(reason) => {
                    let error = RowError::new(line, reason);
                    self.record_error(error.clone());
                    Err(error)
                }
            });
        }
    }
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

fn trim_line_ending(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
}
