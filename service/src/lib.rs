use config::Config;
use log::info;
use relay::Relay;
use std::sync::Arc;

pub mod config;
pub mod logging;
pub mod system_stats;

/// Builds the process-wide relay from the configured timings.
pub fn init_relay(config: &Config) -> Arc<Relay> {
    let relay_config = config.relay_config();
    info!(
        "Relay config: record_ttl={}s, sweep_interval={}s, poll_timeout={}s, \
         frontend_ttl={}s, frontend_poll_timeout={}s",
        relay_config.record_ttl.as_secs(),
        relay_config.sweep_interval.as_secs(),
        relay_config.poll_timeout.as_secs(),
        relay_config.frontend_ttl.as_secs(),
        relay_config.frontend_poll_timeout.as_secs(),
    );

    Arc::new(Relay::new(relay_config))
}

// Service-level state shared by every handler.
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub config: Config,
}

impl AppState {
    pub fn new(app_config: Config, relay: &Arc<Relay>) -> Self {
        Self {
            relay: Arc::clone(relay),
            config: app_config,
        }
    }

    pub fn relay_ref(&self) -> &Relay {
        self.relay.as_ref()
    }
}
