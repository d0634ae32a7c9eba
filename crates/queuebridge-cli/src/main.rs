//! queuebridge daemon entry point.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use queuebridge_jenkins::JenkinsClient;
use queuebridge_mapper::QueueToBuildMapper;

mod config;
mod handler;
mod messages;
mod ws;

#[derive(Parser)]
#[command(name = "queuebridge")]
#[command(about = "Bridges launch-build/get-status requests to a Jenkins build queue", long_about = None)]
struct Args {
    /// Websocket URL of the request server
    #[arg(long = "server", env = "QUEUEBRIDGE_SERVER")]
    server: String,

    /// Name this bridge registers under
    #[arg(long, env = "QUEUEBRIDGE_NAME")]
    name: String,

    /// API key authorizing the request-server connection
    #[arg(long = "apikey", env = "QUEUEBRIDGE_APIKEY")]
    api_key: String,

    /// Path to the JSON config file with the CI server credentials
    #[arg(long, env = "QUEUEBRIDGE_CONFIG")]
    config: String,

    /// Directory holding the persisted id-mapping files
    #[arg(long, default_value = "mapping")]
    mappings_dir: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!(
        name = %args.name,
        version = env!("CARGO_PKG_VERSION"),
        "queuebridge starting"
    );

    let config = config::load(&args.config)?;

    let client = Arc::new(JenkinsClient::new(
        &config.url,
        &config.user,
        &config.password,
    )?);
    if !client.check_connection().await {
        anyhow::bail!(
            "unable to contact CI server '{}' with the configured credentials",
            config.url
        );
    }

    let storage_file =
        queuebridge_mapper::paths::mappings_file(Path::new(&args.mappings_dir), &config.url);
    // If the store cannot be created, fail at startup, not later.
    ensure_storage_file(&storage_file)?;

    let mapper = QueueToBuildMapper::new(client.clone(), &storage_file);
    mapper.start().await?;

    let handler = Arc::new(handler::RequestHandler::new(client, mapper.clone()));
    let result = ws::run(
        ws::WsOptions {
            server_url: args.server,
            plug_type: "ciPlug".to_string(),
            name: args.name,
            api_key: args.api_key,
        },
        handler,
    )
    .await;

    mapper.stop();
    result
}

fn ensure_storage_file(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create mappings directory '{}'", parent.display()))?;
    }
    fs::File::create(path)
        .with_context(|| format!("failed to create mapping store '{}'", path.display()))?;
    Ok(())
}
