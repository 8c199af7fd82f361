use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use relay::RelayConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Origin value that allows responses to be read from any origin.
pub const ANY_ORIGIN: &str = "*";

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that are allowed to receive server responses,
    /// or "*" to allow any origin.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = ANY_ORIGIN
    )]
    pub allowed_origins: Vec<String>,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "0.0.0.0")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 3000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Seconds an undelivered record is kept before the expiry sweep removes it
    #[arg(long, env, default_value_t = 30)]
    pub record_ttl_secs: u64,

    /// Seconds between two expiry sweeps
    #[arg(long, env, default_value_t = 25)]
    pub sweep_interval_secs: u64,

    /// Seconds a device poll (GET /getData) is held open waiting for a record
    #[arg(long, env, default_value_t = 20)]
    pub poll_timeout_secs: u64,

    /// Seconds an undelivered frontend record is kept
    #[arg(long, env, default_value_t = 30)]
    pub frontend_ttl_secs: u64,

    /// Seconds a frontend poll (GET /getFrontendData) is held open
    #[arg(long, env, default_value_t = 5)]
    pub frontend_poll_timeout_secs: u64,

    /// Seconds a new push connection has to identify itself with its client key
    #[arg(long, env, default_value_t = 10)]
    pub push_handshake_timeout_secs: u64,

    /// Maximum accepted request body size in bytes
    #[arg(long, env, default_value_t = 2_048_576)]
    pub body_limit_bytes: usize,

    /// Requests allowed per client IP per minute, 0 disables rate limiting
    #[arg(long, env, default_value_t = 20)]
    pub rate_limit_per_minute: u32,

    /// Directory of static files served for any path not handled by the API
    #[arg(long, env, default_value = "public")]
    pub static_dir: PathBuf,

    /// Number of runtime worker threads, defaults to one per CPU core
    #[arg(long, env)]
    pub worker_threads: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn interface(&self) -> &str {
        self.interface.as_deref().unwrap_or("0.0.0.0")
    }

    /// Whether CORS should allow any origin rather than the listed ones.
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == ANY_ORIGIN)
    }

    pub fn push_handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.push_handshake_timeout_secs)
    }

    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limit_per_minute > 0
    }

    /// Timing parameters for the relay, taken from this configuration.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            record_ttl: Duration::from_secs(self.record_ttl_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            poll_timeout: Duration::from_secs(self.poll_timeout_secs),
            frontend_ttl: Duration::from_secs(self.frontend_ttl_secs),
            frontend_poll_timeout: Duration::from_secs(self.frontend_poll_timeout_secs),
        }
    }
}
