use log::*;
use service::{config::Config, logging::Logger, AppState};

fn main() -> std::io::Result<()> {
    let config = Config::new();
    Logger::init_logger(&config).map_err(std::io::Error::other)?;

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Some(worker_threads) = config.worker_threads.filter(|threads| *threads > 0) {
        runtime.worker_threads(worker_threads);
    }
    let runtime = runtime.build()?;

    runtime.block_on(async move {
        info!("Starting up...");

        let relay = service::init_relay(&config);
        let sweeper = relay::sweeper::spawn(relay.clone());

        let result = web::init_server(AppState::new(config, &relay)).await;

        sweeper.abort();
        info!("Server stopped");
        result
    })
}
