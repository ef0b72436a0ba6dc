use anyhow::Result;
use heatlink::config::Config;
use heatlink::registry::DriverRegistry;
use heatlink::service::PollService;
use heatlink::sink::JsonLinesSink;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    heatlink::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Heatlink {} starting up", env!("APP_VERSION"));

    let registry = DriverRegistry::builtin();
    let driver = registry.for_config(&config)?;
    info!(
        "Using driver {} ({}) for {}",
        driver.display_name, driver.protocol, config.device.host
    );

    let poller = driver.build_poller(&config);
    info!("Catalog holds {} sensors", poller.catalog().len());

    let sink = JsonLinesSink::new(tokio::io::stdout());
    let (service, handle) =
        PollService::new(poller, Box::new(sink), config.polling.interval());
    let service_task = tokio::spawn(service.run());

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
    let _ = handle.shutdown();

    match service_task.await {
        Ok(poller) => {
            match serde_json::to_string(&poller.health()) {
                Ok(health) => info!("Final health: {}", health),
                Err(e) => error!("Failed to serialize health snapshot: {}", e),
            }
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("Poll service failed: {}", e)),
    }
}
