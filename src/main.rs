// src/main.rs

use axum::serve;
use farmguard_gateway::cli::{Cli, Commands, KeyCommands};
use farmguard_gateway::{
    build_app, config::environment::EnvironmentConfig, setup_configuration, AppConfig, AppError,
    AppState, BlacklistSweeper, KeyManager,
};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = ?e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!(signal = "Ctrl+C", "Received signal. Initiating graceful shutdown...") },
        () = terminate => { info!(signal = "Terminate", "Received signal. Initiating graceful shutdown...") },
    }
}

fn init_tracing(cli: &Cli) {
    let env_filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if cli.no_json {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse_args();
    init_tracing(&cli);

    let config = setup_configuration(cli.config.clone())
        .and_then(|mut config| cli.apply_overrides(&mut config).map(|()| config))
        .map_err(|e| {
            eprintln!("Configuration error: {e}");
            e
        })?;

    match cli.command() {
        Commands::Serve => serve_forever(config).await,
        Commands::Config { verbose } => {
            print_config_summary(&config, verbose);
            Ok(())
        }
        Commands::Keys { action } => run_key_command(config, action).await,
    }
}

async fn serve_forever(config: AppConfig) -> Result<(), AppError> {
    let (app, state) = build_app(config)?;
    let sweeper = BlacklistSweeper::start(
        state.key_manager.clone(),
        state.config.key_policy.sweep_interval(),
    );

    let host = state.config.server.host.clone();
    let port = state.config.server.port;
    let listener = TcpListener::bind((host.as_str(), port)).await.map_err(|e| {
        error!(server.host = %host, server.port = port, error = ?e, "Failed to bind to address");
        AppError::from(e)
    })?;
    info!(server.host = %host, server.port = port, "Server listening");

    let result = serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = ?e, "Server run loop encountered an error");
            AppError::from(e)
        });

    sweeper.shutdown().await;
    result?;
    info!("Server shut down gracefully");
    Ok(())
}

fn print_config_summary(config: &AppConfig, verbose: bool) {
    println!("Configuration is valid.");
    println!("  server: {}:{}", config.server.host, config.server.port);
    println!(
        "  admin token: {}",
        if config.server.admin_token.is_some() { "configured" } else { "not configured" }
    );
    println!(
        "  key policy: {} failures, {}s blacklist, {}s sweep",
        config.key_policy.failure_threshold,
        config.key_policy.blacklist_duration_secs,
        config.key_policy.sweep_interval_secs
    );
    println!(
        "  services: {} ({} keys)",
        config.services.len(),
        config.total_keys()
    );

    if verbose {
        for service in &config.services {
            let probe = service.probe.as_ref().map_or("none", |p| p.url.as_str());
            println!(
                "    - {}: {} key(s), probe: {probe}",
                service.name,
                service.all_keys().len()
            );
        }
        let overrides = EnvironmentConfig::from_env().override_summary();
        if !overrides.is_empty() {
            println!("  environment overrides: {}", overrides.join(", "));
        }
    }
}

async fn run_key_command(config: AppConfig, action: KeyCommands) -> Result<(), AppError> {
    let output = match action {
        KeyCommands::Status => {
            let key_manager = KeyManager::from_config(&config);
            serde_json::to_string_pretty(&key_manager.status())?
        }
        KeyCommands::Validate => {
            let state = AppState::new(config)?;
            serde_json::to_string_pretty(&state.prober.validate_all_keys().await)?
        }
    };
    println!("{output}");
    Ok(())
}
