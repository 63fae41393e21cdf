//! `gatehouse` binary: env config, logging, bind, serve.

use std::process::ExitCode;
use std::sync::Arc;

use gatehouse::{Error, GatewayConfig, MetricsRegistry, Server, app, logging};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            // No subscriber yet; stderr is all there is.
            eprintln!("gatehouse: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(config.log_format) {
        eprintln!("gatehouse: {e}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "gatehouse terminated");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: GatewayConfig) -> Result<(), Error> {
    tracing::info!(
        service = %config.service_name,
        version = %config.version,
        port = config.port,
        "starting"
    );

    let registry = Arc::new(MetricsRegistry::new());
    let gateway = app::build(&config, registry)?;

    Server::bind(config.listen_addr())
        .await?
        .read_timeout(config.read_timeout)
        .write_timeout(config.write_timeout)
        .idle_timeout(config.idle_timeout)
        .max_body_bytes(config.max_body_bytes)
        .serve(gateway)
        .await
}
