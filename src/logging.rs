// src/logging.rs
//! `env_logger` setup shared by the demo binary and embedding applications.

use log::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter; `RUST_LOG` still overrides it.
    pub level: LevelFilter,
    /// Millisecond timestamps on every line.
    pub timestamps: bool,
    /// Print the emitting module path.
    pub module_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: if cfg!(debug_assertions) {
                LevelFilter::Debug
            } else {
                LevelFilter::Warn
            },
            timestamps: true,
            module_targets: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }
}

/// Install the global logger. Returns `false` if a logger was already set.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.level).format_target(config.module_targets);
    if config.timestamps {
        builder.format_timestamp_millis();
    } else {
        builder.format_timestamp(None);
    }
    builder.parse_default_env().try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_noop() {
        let config = LoggingConfig::default().with_level(LevelFilter::Trace);
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
