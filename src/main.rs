use std::sync::Arc;

use activity_monitor::api::{self, ApiState};
use activity_monitor::services::orchestrator::{Monitor, Sensors};
use activity_monitor::utils::config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = config::load_from_env()?;
    log::info!(
        "[Main] Starting activity monitor (camera: {}, classifier: {})",
        settings.camera_url.as_deref().unwrap_or("none"),
        settings.classifier_url.as_deref().unwrap_or("none")
    );

    let sensors = Sensors::desktop(&settings);
    let host = settings.host.clone();
    let port = settings.web_port;

    let mut monitor = Monitor::new(settings, sensors)?;
    monitor.start()?;

    let state = Arc::new(ApiState::new(monitor.handles()));
    let served = api::serve(state, &host, port, api::shutdown_signal()).await;
    if let Err(e) = &served {
        log::error!("[Main] {:#}", e);
    }

    let stats = monitor.stop().await;
    log::info!(
        "[Main] Stopped after {:.2}h of computer time",
        stats.total_computer_time_hours
    );
    served
}
