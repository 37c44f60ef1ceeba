//! Feature-specific logging targets and macros
//!
//! Every component logs under its own target so output can be filtered with
//! `RUST_LOG`, e.g. `RUST_LOG=perflog::parser=debug`.

/// Components that log under their own target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFeature {
    Parser,
    Aggregator,
    Selector,
    Store,
    Ingestion,
}

impl LogFeature {
    /// Get the target string for this feature
    pub fn target(&self) -> &'static str {
        match self {
            LogFeature::Parser => "perflog::parser",
            LogFeature::Aggregator => "perflog::aggregator",
            LogFeature::Selector => "perflog::selector",
            LogFeature::Store => "perflog::store",
            LogFeature::Ingestion => "perflog::ingestion",
        }
    }
}

// Ingestion pipeline
#[macro_export]
macro_rules! log_ingestion_debug {
    ($($arg:tt)*) => {
        log::debug!(target: "perflog::ingestion", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_ingestion_info {
    ($($arg:tt)*) => {
        log::info!(target: "perflog::ingestion", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_ingestion_warn {
    ($($arg:tt)*) => {
        log::warn!(target: "perflog::ingestion", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_ingestion_error {
    ($($arg:tt)*) => {
        log::error!(target: "perflog::ingestion", $($arg)*)
    };
}

// Parser
#[macro_export]
macro_rules! log_parser_debug {
    ($($arg:tt)*) => {
        log::debug!(target: "perflog::parser", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_parser_warn {
    ($($arg:tt)*) => {
        log::warn!(target: "perflog::parser", $($arg)*)
    };
}

// Aggregator
#[macro_export]
macro_rules! log_aggregator_debug {
    ($($arg:tt)*) => {
        log::debug!(target: "perflog::aggregator", $($arg)*)
    };
}

// Selector
#[macro_export]
macro_rules! log_selector_debug {
    ($($arg:tt)*) => {
        log::debug!(target: "perflog::selector", $($arg)*)
    };
}

// Store
#[macro_export]
macro_rules! log_store_debug {
    ($($arg:tt)*) => {
        log::debug!(target: "perflog::store", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_store_info {
    ($($arg:tt)*) => {
        log::info!(target: "perflog::store", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_store_error {
    ($($arg:tt)*) => {
        log::error!(target: "perflog::store", $($arg)*)
    };
}

/// Logs how long an operation took when finished.
pub struct PerformanceTimer {
    start: std::time::Instant,
    feature: LogFeature,
    operation: String,
}

impl PerformanceTimer {
    pub fn new(feature: LogFeature, operation: impl Into<String>) -> Self {
        let operation = operation.into();
        log::debug!(target: feature.target(), "Starting timed operation: {}", operation);
        Self {
            start: std::time::Instant::now(),
            feature,
            operation,
        }
    }

    pub fn finish(self) -> std::time::Duration {
        let duration = self.start.elapsed();
        log::info!(
            target: self.feature.target(),
            "Operation '{}' completed in {:?}",
            self.operation,
            duration
        );
        duration
    }
}
