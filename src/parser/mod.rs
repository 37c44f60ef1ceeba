//! # Parser
//!
//! Turns raw uploaded bytes into a lazy sequence of [`Sample`]s.
//!
//! ## Components
//!
//! * `format` - the closed set of recognized layouts and content sniffing
//! * `columns` - header detection and column resolution
//! * `fields` - field splitting and value decoding
//! * `reader` - the streaming [`SampleReader`]
//! * `config` - [`ParserConfig`] and [`ColumnMapping`]
//! * `error` - [`FormatError`] (fatal) and [`RowError`] (per row)
//!
//! A [`SampleParser`] keeps the raw bytes, so the sequence can be restarted
//! from the beginning by opening a new reader.

pub mod columns;
pub mod config;
pub mod error;
pub mod fields;
pub mod format;
pub mod reader;

pub use config::{ColumnMapping, ParserConfig};
pub use error::{FormatError, ParseResult, RowError};
pub use format::{FormatProfile, LogFormat};
pub use reader::{ParseReport, SampleReader};

use crate::sample::Sample;
use std::io::Cursor;
use std::sync::Arc;

/// Raw content plus the options to read it with.
#[derive(Debug, Clone)]
pub struct SampleParser {
    content: Arc<[u8]>,
    config: ParserConfig,
}

impl SampleParser {
    pub fn new(content: impl Into<Arc<[u8]>>, config: ParserConfig) -> Self {
        Self {
            content: content.into(),
            config,
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Start a fresh pass over the content.
    pub fn open(&self) -> ParseResult<SampleReader<Cursor<Arc<[u8]>>>> {
        SampleReader::new(Cursor::new(Arc::clone(&self.content)), self.config.clone())
    }

    /// Collect every valid sample in input order.
    pub fn parse_all(&self) -> ParseResult<(Vec<Sample>, ParseReport)> {
        let mut reader = self.open()?;
        let samples: Vec<Sample> = reader.by_ref().filter_map(Result::ok).collect();
        let report = reader.finish()?;
        Ok((samples, report))
    }
}
