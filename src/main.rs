use tokio_util::sync::CancellationToken;

mod api;
mod broadcast;
mod config;
mod models;
mod supervisor;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}

#[tokio::main]
async fn main() -> ! {
    init_logging();

    let config = config::StreamConfig::from_env();
    log::info!(
        "camwatch starting: {}x{}x{} @ {} fps, detector '{}'",
        config.width,
        config.height,
        config.channels,
        config.frame_rate,
        config.detector
    );

    let supervisor = supervisor::Supervisor::new(config.clone());
    if config.eager_start {
        supervisor.ensure_started().await;
    }

    let cancel = CancellationToken::new();
    api::start_api_server(
        api::AppState {
            config,
            supervisor: supervisor.clone(),
        },
        cancel.clone(),
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
        }
    }

    supervisor.shutdown().await;
    std::process::exit(0);
}
