//! Terminal logging for the relay process.
use crate::config::Config;
use log::{LevelFilter, SetLoggerError};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// HTTP and WebSocket stack modules, silenced unless running at TRACE.
const DEPENDENCY_MODULES: &[&str] = &["tower", "tracing", "hyper", "axum", "tungstenite"];

pub struct Logger;

impl Logger {
    /// Installs the global terminal logger at the configured level.
    ///
    /// Lines carry an RFC3339 timestamp and, from DEBUG down, the name of the
    /// runtime worker thread that logged them, since every worker shares one relay.
    pub fn init_logger(config: &Config) -> Result<(), SetLoggerError> {
        let level = config.log_level_filter;
        TermLogger::init(
            level,
            Self::build_log_config(level),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        )
    }

    fn shows_dependency_logs(level: LevelFilter) -> bool {
        level == LevelFilter::Trace
    }

    fn build_log_config(level: LevelFilter) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder
            .set_time_format_rfc3339()
            .set_thread_level(LevelFilter::Debug)
            .set_target_level(LevelFilter::Error);

        if !Self::shows_dependency_logs(level) {
            for module in DEPENDENCY_MODULES {
                builder.add_filter_ignore_str(module);
            }
        }

        builder.build()
    }
}
