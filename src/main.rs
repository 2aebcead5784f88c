use std::path::PathBuf;

use anyhow::Context;
use config::{Config, DEFAULT_CONFIG_FILE};
use coordinator::Coordinator;
use db::SqliteSender;
use sender::Sender;
use sensor::{Sampler, Sensor};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use tokio::time::MissedTickBehavior;

mod config;
mod coordinator;
mod db;
mod measurement;
mod mh_z19c;
mod ring_buffer;
mod sender;
mod sensor;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), anyhow::Error> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = Config::load(&config_path)?;

    TermLogger::init(
        config.log_level_filter()?,
        ConfigBuilder::new()
            .set_time_format_rfc3339()
            .set_time_offset_to_local()
            .map_err(|_| anyhow::anyhow!("Failed to set time offset to local"))?
            .build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;

    if let Err(e) = run(config).await {
        log::error!("{e:#}");
    }

    Ok(())
}

pub async fn run(config: Config) -> Result<(), anyhow::Error> {
    let mut sensor = Sensor::new(&config.sensors).context("Failed to initialize sensors")?;
    sensor.init()?;

    let sender = SqliteSender::new(&config.database);
    let mut coordinator = Coordinator::new(sender, config.buffer_capacity)
        .context("Failed to allocate offline buffer")?;

    sample_loop(&mut sensor, &mut coordinator, &config).await;

    let lost = coordinator.shutdown();
    log::info!(
        "Stopped with {lost} undelivered measurements; {:?}",
        coordinator.stats()
    );

    Ok(())
}

/// Runs one sampling/delivery cycle per tick until Ctrl+C.
async fn sample_loop<S: Sender>(
    sampler: &mut impl Sampler,
    coordinator: &mut Coordinator<S>,
    config: &Config,
) {
    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcome = coordinator.handle(sampler.sample());
                log::debug!("{outcome:?}, {} pending", coordinator.pending());
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    log::error!("Failed to wait for Ctrl+C signal: {e}");
                }
                break;
            }
        }
    }
}
