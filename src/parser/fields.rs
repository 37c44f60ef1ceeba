//! Field-level helpers: splitting a line and decoding individual values.

use chrono::{DateTime, NaiveDateTime};

/// Split one line on `delimiter`, honoring double-quoted fields.
///
/// Inside quotes the delimiter is literal and `""` is an escaped quote.
/// Quoted fields never span lines.
pub fn split_fields(line: &str, delimiter: char) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' && current.trim().is_empty() {
            current.clear();
            in_quotes = true;
        } else if c == delimiter {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(current);
    Ok(fields)
}

/// An integer decoded from a field, clamped on overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded<T> {
    pub value: T,
    pub clamped: bool,
}

/// Parse a signed integer, saturating at the `i64` bounds.
pub fn parse_i64(text: &str) -> Result<Decoded<i64>, String> {
    use std::num::IntErrorKind;

    let text = text.trim();
    match text.parse::<i64>() {
        Ok(value) => Ok(Decoded {
            value,
            clamped: false,
        }),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Ok(Decoded {
                value: i64::MAX,
                clamped: true,
            }),
            IntErrorKind::NegOverflow => Ok(Decoded {
                value: i64::MIN,
                clamped: true,
            }),
            IntErrorKind::Empty => Err("empty value".to_string()),
            _ => Err(format!("'{}' is not an integer", text)),
        },
    }
}

/// Parse a non-negative integer, saturating at `u64::MAX`.
pub fn parse_u64(text: &str) -> Result<Decoded<u64>, String> {
    let decoded = parse_i64(text)?;
    if decoded.value < 0 {
        return Err(format!("'{}' is negative", text.trim()));
    }
    if decoded.clamped {
        // Past i64::MAX; see whether it still fits in u64.
        return Ok(match text.trim().trim_start_matches('+').parse::<u64>() {
            Ok(value) => Decoded {
                value,
                clamped: false,
            },
            Err(_) => Decoded {
                value: u64::MAX,
                clamped: true,
            },
        });
    }
    Ok(Decoded {
        value: decoded.value as u64,
        clamped: false,
    })
}

/// Decode a success/status field.
///
/// Accepts the usual truthy/falsy tokens, case-insensitive.
pub fn parse_status(text: &str) -> Result<bool, String> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "ok" | "pass" | "passed" | "success" | "1" => Ok(true),
        "false" | "ko" | "fail" | "failed" | "failure" | "error" | "0" => Ok(false),
        "" => Err("empty status".to_string()),
        other => Err(format!("unrecognized status '{}'", other)),
    }
}

const DATETIME_FORMATS: &[&str] = &["%Y/%m/%d %H:%M:%S%.3f", "%Y-%m-%d %H:%M:%S%.3f", "%Y-%m-%d %H:%M:%S"];

/// Decode a timestamp as epoch milliseconds.
///
/// Integers are taken as-is; otherwise RFC 3339 and the date layouts JMeter
/// can be configured to write are tried (naive times are read as UTC).
pub fn parse_timestamp(text: &str) -> Result<Decoded<i64>, String> {
    let trimmed = text.trim();
    if let Ok(decoded) = parse_i64(trimmed) {
        return Ok(decoded);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(Decoded {
            value: dt.timestamp_millis(),
            clamped: false,
        });
    }
    for layout in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, layout) {
            return Ok(Decoded {
                value: naive.and_utc().timestamp_millis(),
                clamped: false,
            });
        }
    }
    if trimmed.is_empty() {
        Err("empty timestamp".to_string())
    } else {
        Err(format!("'{}' is not a timestamp", trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_and_quoted() {
        assert_eq!(split_fields("a,b,c", ',').unwrap(), vec!["a", "b", "c"]);
        assert_eq!(
            split_fields("1,\"GET /a, b\",3", ',').unwrap(),
            vec!["1", "GET /a, b", "3"]
        );
        assert_eq!(
            split_fields("\"say \"\"hi\"\"\",x", ',').unwrap(),
            vec!["say \"hi\"", "x"]
        );
        assert_eq!(split_fields("a,,", ',').unwrap(), vec!["a", "", ""]);
    }

    #[test]
    fn test_split_unterminated_quote() {
        assert!(split_fields("1,\"open", ',').is_err());
    }

    #[test]
    fn test_integer_overflow_is_clamped() {
        let d = parse_i64("99999999999999999999").unwrap();
        assert_eq!(d.value, i64::MAX);
        assert!(d.clamped);

        let d = parse_i64("-99999999999999999999").unwrap();
        assert_eq!(d.value, i64::MIN);
        assert!(d.clamped);

        let d = parse_u64("18446744073709551615").unwrap();
        assert_eq!(d.value, u64::MAX);
        assert!(!d.clamped);

        let d = parse_u64("18446744073709551616").unwrap();
        assert_eq!(d.value, u64::MAX);
        assert!(d.clamped);
    }

    #[test]
    fn test_integer_rejects_garbage() {
        assert!(parse_i64("badnum").is_err());
        assert!(parse_i64("").is_err());
        assert!(parse_u64("-5").is_err());
    }

    #[test]
    fn test_status_tokens() {
        for token in ["true", "OK", "Pass", "1", "success"] {
            assert_eq!(parse_status(token), Ok(true), "{}", token);
        }
        for token in ["false", "KO", "FAIL", "0", "error"] {
            assert_eq!(parse_status(token), Ok(false), "{}", token);
        }
        assert!(parse_status("maybe").is_err());
    }

    #[test]
    fn test_timestamp_layouts() {
        assert_eq!(parse_timestamp("1500000000000").unwrap().value, 1_500_000_000_000);
        assert_eq!(
            parse_timestamp("1970-01-01T00:00:01Z").unwrap().value,
            1000
        );
        assert_eq!(
            parse_timestamp("1970/01/01 00:00:02.500").unwrap().value,
            2500
        );
        assert!(parse_timestamp("yesterday").is_err());
    }
}
