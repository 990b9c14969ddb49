use anyhow::{Context, Result};
use clap::Parser;

use httpserver::{
    config::{Arguments, ServerConfig},
    FileServer,
};

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let config = ServerConfig::from(Arguments::parse());
    let server = FileServer::from_config(&config)
        .with_context(|| format!("Failed to start server on {}", config.addr))?;

    // SIGINT, SIGTERM and SIGHUP all start the drain.
    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || {
        log::warn!("Received termination signal");
        shutdown.trigger();
    })
    .context("Failed to install signal handler")?;

    server.run().context("Server stopped with an error")?;
    log::info!("Shut down cleanly");
    Ok(())
}
