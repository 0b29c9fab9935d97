mod config;
mod dashboard;
mod display;
mod homie;
mod models;
mod query;
mod rest_server;
mod service_utils;
mod session;

use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::display::SharedDisplay;
use crate::rest_server::{run_rest_server, DashboardHandle};
use crate::service_utils::{handle_shutdown, run_dashboard};
use crate::session::MqttSession;
use std::env;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load configuration
    let config = match Config::from_env(env::args().nth(1)) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Error loading configuration: {}", e);
            return;
        }
    };

    let display = SharedDisplay::new();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let session = MqttSession::new(
        &config.client_id_prefix,
        Duration::from_secs(config.mqtt_keep_alive_secs),
        events_tx,
    );

    // A missing broker address is terminal: the message is shown and nothing else runs.
    let dashboard = match Dashboard::initialize(&config.dashboard_url, session, display.clone()) {
        Ok(dashboard) => dashboard,
        Err(e) => {
            error!("Dashboard halted: {}", e);
            return;
        }
    };

    match dashboard.params().device.as_deref() {
        Some(device) => info!("Controlling device '{}'", device),
        None => info!("No device configured, controls are disabled"),
    }

    let (actions_tx, actions_rx) = mpsc::unbounded_channel();
    let handle = DashboardHandle {
        display,
        devices: dashboard.devices(),
        actions: actions_tx,
    };
    let rest_api_task = tokio::spawn(run_rest_server(handle));

    run_dashboard(dashboard, events_rx, actions_rx, handle_shutdown()).await;

    rest_api_task.abort();
    let _ = rest_api_task.await;
    info!("All services shut down successfully.");
}
