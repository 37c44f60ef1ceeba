use super::error::{FormatError, ParseResult};
use super::format::LogFormat;
use serde::{Deserialize, Serialize};

/// Which raw columns feed which `Sample` fields.
///
/// Unset entries fall back to well-known column names. A configured name
/// that is all digits is also accepted as a zero-based column index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnMapping {
    pub timestamp_column: Option<String>,
    pub label_column: Option<String>,
    pub elapsed_column: Option<String>,
    pub status_column: Option<String>,
    pub bytes_column: Option<String>,
    pub response_code_column: Option<String>,
}

/// Options controlling how raw content becomes samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParserConfig {
    #[serde(flatten)]
    pub columns: ColumnMapping,
    /// Field delimiter; sniffed from the first line when unset
    pub delimiter: Option<char>,
    /// Whether the first line is a header; detected when unset
    pub has_header: Option<bool>,
    /// Input format; sniffed when unset
    pub format: Option<LogFormat>,
    /// Largest tolerated share of malformed rows, in `0.0..=1.0`
    pub max_error_ratio: f64,
    /// Elapsed value JMeter writes for samples that never completed
    pub elapsed_failure_sentinel: Option<i64>,
    /// How many row errors are kept on the log record
    pub max_reported_row_errors: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            columns: ColumnMapping::default(),
            delimiter: None,
            has_header: None,
            format: None,
            max_error_ratio: 0.5,
            elapsed_failure_sentinel: Some(-1),
            max_reported_row_errors: 1000,
        }
    }
}

impl ParserConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = Some(has_header);
        self
    }

    pub fn with_columns(mut self, columns: ColumnMapping) -> Self {
        self.columns = columns;
        self
    }

    pub fn validate(&self) -> ParseResult<()> {
        if !(0.0..=1.0).contains(&self.max_error_ratio) {
            return Err(FormatError::invalid_config(format!(
                "maxErrorRatio must be between 0 and 1, got {}",
                self.max_error_ratio
            )));
        }
        if let Some(d) = self.delimiter {
            if d == '"' || d == '\n' || d == '\r' {
                return Err(FormatError::invalid_config(format!(
                    "{:?} cannot be used as a delimiter",
                    d
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ParserConfig::default();
        assert_eq!(config.max_error_ratio, 0.5);
        assert_eq!(config.elapsed_failure_sentinel, Some(-1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_camel_case_options() {
        let json = r#"{
            "timestampColumn": "when",
            "elapsedColumn": "took",
            "delimiter": ";",
            "hasHeader": true,
            "format": "csv",
            "maxErrorRatio": 0.1
        }"#;
        let config: ParserConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.columns.timestamp_column.as_deref(), Some("when"));
        assert_eq!(config.columns.elapsed_column.as_deref(), Some("took"));
        assert_eq!(config.delimiter, Some(';'));
        assert_eq!(config.has_header, Some(true));
        assert_eq!(config.format, Some(LogFormat::Csv));
        assert_eq!(config.max_error_ratio, 0.1);
        assert_eq!(config.max_reported_row_errors, 1000);
    }

    #[test]
    fn test_invalid_ratio_rejected() {
        let config = ParserConfig {
            max_error_ratio: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FormatError::InvalidConfig(_))));
    }
}
