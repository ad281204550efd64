use cloud_demo_service::config::ServiceConfig;
use cloud_demo_service::services::init_metrics;
use cloud_demo_service::startup::Application;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize metrics recorder (must be before any metrics are recorded)
    init_metrics();

    // OTLP export is opt-in; logs always go to stdout as JSON
    let otlp_endpoint = std::env::var("OTLP_ENDPOINT").ok();
    init_tracing("cloud-demo-service", "info", otlp_endpoint.as_deref());

    let config = ServiceConfig::load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to start application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    tracing::info!(port = app.port(), "cloud-demo-service started");

    app.run_until_stopped().await
}
