//! Entrypoint: load config, wire the orchestrator, serve the ingress HTTP
//! surface, and shut down cleanly on SIGINT (spec §5, §6 exit codes).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use af_core::SystemClock;
use af_daemon::{routes, AppState, Config};
use af_engine::{Orchestrator, RegisterAgentSpec};
use af_transport::HttpAgentTransport;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "af-daemon", about = "Desktop UI-automation job dispatch orchestrator")]
struct Args {
    /// Path to a TOML config file using the flat dotted keys from spec §6.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "configuration error");
            return ExitCode::from(2);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "unrecoverable startup failure");
            ExitCode::from(1)
        }
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn run(config: Config) -> Result<(), BoxError> {
    let clock = SystemClock;
    let engine_config = config.to_engine_config();
    let transport = Arc::new(HttpAgentTransport::with_config(
        clock.clone(),
        engine_config.scheduler_send_timeout,
        config.transport_circuit_failures,
        engine_config.transport_circuit_cooldown,
    ));
    let provisioner = Arc::new(af_daemon::provisioning::NullSessionProvisioner);

    let orchestrator = Orchestrator::new(engine_config, clock, transport, provisioner);
    orchestrator.start();

    for i in 0..config.default_agent_count {
        let name = format!("default-agent-{i}");
        let user = format!("agent-{i}");
        orchestrator
            .register_agent(RegisterAgentSpec { name, user, capabilities: None })
            .await
            .map_err(|err| -> BoxError { format!("failed to register default agent {i}: {err}").into() })?;
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!(address = %config.bind_address, "af-daemon listening");

    let app = routes::build_router(AppState::new(orchestrator.clone()));
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    orchestrator.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, draining");
}
