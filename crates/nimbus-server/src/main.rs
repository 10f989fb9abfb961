use clap::Parser;

use nimbus_server::logging::{LoggingConfig, init_logging};
use nimbus_server::{Cli, Configuration, execute, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Must be kept alive until exit so buffered file output is flushed
    let _logging_guard = init_logging(&LoggingConfig::from_env())?;

    let configuration = Configuration::load(&cli.config, cli.inventory.as_deref())?;
    let context = startup::build_context(&configuration).await?;

    let result = execute(&context, cli.command, &mut std::io::stdout().lock()).await;

    if let Err(e) = context.registry.shutdown_all().await {
        tracing::warn!("Backend shutdown failed: {}", e);
    }
    if let Err(e) = &result {
        tracing::error!("Command failed: {:#}", e);
    }
    result
}
