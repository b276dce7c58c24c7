//! Logging setup for crane tools.
//!
//! Output format is controlled via `CRANE_LOG_FORMAT`:
//! - `json` - Structured JSON output
//! - `pretty` - Human-readable colored output (default for TTY)
//! - `compact` - Compact single-line format
//!
//! The filter comes from `CRANE_LOG_LEVEL`, then `RUST_LOG`, then `info`.
//!
//! # Example
//!
//! ```ignore
//! use crane_pipelines::observability::{TracingConfig, init_tracing};
//!
//! let _guard = init_tracing(TracingConfig::from_env())?;
//! ```

mod config;
mod tracing_setup;

pub use config::{LogFormat, TracingConfig, TracingConfigBuilder};
pub use tracing_setup::{TracingGuard, init_tracing};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.log_format(), LogFormat::Compact);
        assert!(!config.include_location());
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::builder()
            .log_format(LogFormat::Json)
            .log_filter("debug,kube=warn")
            .include_location(true)
            .build();

        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.log_filter(), "debug,kube=warn");
        assert!(config.include_location());
        assert!(config.include_target());
    }

    #[test]
    fn test_verbosity_filter() {
        assert_eq!(TracingConfig::verbosity_filter(0), "warn");
        assert_eq!(TracingConfig::verbosity_filter(1), "info");
        assert_eq!(TracingConfig::verbosity_filter(2), "debug");
        assert_eq!(TracingConfig::verbosity_filter(7), "trace");
    }

    #[test]
    fn test_unknown_format_falls_back() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("fancy".parse::<LogFormat>(), Ok(LogFormat::Compact));
    }
}
