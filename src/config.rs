//! File configuration for the command-line tool.
//!
//! ```toml
//! [streaming]
//! memory_budget_bytes = 268435456
//!
//! [execution]
//! max_threads = 8
//! accumulator_memory_limit = 1048576
//!
//! [statistics]
//! enable_second_order = true
//! ```

use crate::accumulators::StatisticsConfig;
use crate::core::error::TilestreamResult;
use crate::execution::{ExecutionOptions, StreamingConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Thread settings of `[execution]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Worker threads per division; 0 uses every core.
    pub max_threads: usize,
    /// Fewest lines a thread partition may hold.
    pub min_lines_per_thread: u64,
    /// Byte cap for the per-thread partial results of an accumulator.
    pub accumulator_memory_limit: Option<usize>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_threads: 0,
            min_lines_per_thread: 1,
            accumulator_memory_limit: None,
        }
    }
}

impl ExecutionConfig {
    /// Engine options carrying these settings.
    pub fn to_options(&self) -> ExecutionOptions {
        let options = ExecutionOptions::new()
            .with_max_threads(self.max_threads)
            .with_min_lines_per_thread(self.min_lines_per_thread);
        match self.accumulator_memory_limit {
            Some(limit) => options.with_accumulator_memory_limit(limit),
            None => options,
        }
    }
}

/// Whole configuration file. Every table is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// `[streaming]`
    pub streaming: StreamingConfig,
    /// `[execution]`
    pub execution: ExecutionConfig,
    /// `[statistics]`
    pub statistics: StatisticsConfig,
}

impl AppConfig {
    /// Parse TOML text.
    pub fn from_toml(text: &str) -> TilestreamResult<Self> {
        let config: AppConfig = toml::from_str(text)?;
        config.streaming.mode()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> TilestreamResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{ConfigurationError, TilestreamError};
    use crate::execution::StreamingMode;
    use std::io::Write;

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[streaming]\nlines_per_division = 64\n\n[execution]\nmax_threads = 3\n\n[statistics]\nenable_second_order = true"
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.streaming.mode().unwrap(), StreamingMode::Lines { lines: 64 });
        assert_eq!(config.execution.max_threads, 3);
        assert_eq!(config.execution.min_lines_per_thread, 1);
        assert!(config.statistics.enable_second_order);
        assert!(config.statistics.enable_minmax);

        let options = config.execution.to_options();
        assert_eq!(options.max_threads, 3);
        assert_eq!(options.accumulator_memory_limit, None);
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(AppConfig::from_toml("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_conflicting_modes_rejected() {
        let result = AppConfig::from_toml("[streaming]\ntile_size = 256\ndivision_count = 4\n");
        assert!(matches!(
            result,
            Err(TilestreamError::Configuration(ConfigurationError::ConflictingStreamingModes { .. }))
        ));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            AppConfig::from_toml("[execution]\nthreads = 2\n"),
            Err(TilestreamError::ConfigFile(_))
        ));
        assert!(matches!(
            AppConfig::load("/nonexistent/tilestream.toml"),
            Err(TilestreamError::Io(_))
        ));
    }
}
