//! Main entry point for the genrelay service.
//!
//! Responsibilities:
//! - Handle basic CLI commands (`run`, `init`, `status`, `generate`).
//! - Initialize logging and tracing.
//! - Load application configuration and credentials.
//! - Establish shared infrastructure (database, registry, adapters).
//! - Start the Axum web server and expose HTTP routes.

use std::{env, net::SocketAddr, process, sync::Arc};

use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genrelay::{
    adapters::AdapterSet,
    config::{AppConfig, Credentials},
    database,
    error::AppError,
    health::HealthTracker,
    models::{RoutePreferences, SimpleRequest, Worker},
    orchestrator::{ExecutionStore, Orchestrator},
    registry::Registry,
    router::SimpleRouter,
    routes::{api_router, AppState},
    tier::TierClassifier,
    usage::UsageLogger,
    workflow::WorkflowEngine,
};

enum CliCommand {
    Run,
    Help,
    Version,
    Init,
    Status(StatusOptions),
    Generate(GenerateOptions),
}

#[derive(Default, Clone, Debug)]
struct StatusOptions {
    provider: Option<String>,
}

#[derive(Default, Clone, Debug)]
struct GenerateOptions {
    worker: Option<String>,
    prompt: Option<String>,
    provider: Option<String>,
    model: Option<String>,
    stream: bool,
}

#[tokio::main]
async fn main() {
    let command = match parse_cli_command() {
        Ok(cmd) => cmd,
        Err(err) => {
            eprintln!("genrelay: {err}");
            print_help();
            process::exit(2);
        }
    };

    match command {
        CliCommand::Help => print_help(),
        CliCommand::Version => print_version(),
        CliCommand::Init => {
            if let Err(err) = handle_init().await {
                eprintln!("genrelay: init failed: {err}");
                process::exit(1);
            }
        }
        CliCommand::Status(options) => {
            if let Err(err) = handle_status(options.provider.as_deref()).await {
                eprintln!("genrelay: status failed: {err}");
                process::exit(1);
            }
        }
        CliCommand::Generate(options) => {
            if let Err(err) = handle_generate(options).await {
                eprintln!("genrelay: generate failed: {err}");
                process::exit(1);
            }
        }
        CliCommand::Run => {
            init_tracing();
            if let Err(err) = run_server().await {
                error!(error = %err, "Fatal error");
                process::exit(1);
            }
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn parse_cli_command() -> Result<CliCommand, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        return Ok(CliCommand::Run);
    };

    match command.as_str() {
        "run" | "serve" => Ok(CliCommand::Run),
        "help" | "--help" | "-h" => Ok(CliCommand::Help),
        "version" | "--version" | "-V" => Ok(CliCommand::Version),
        "init" => Ok(CliCommand::Init),
        "status" => Ok(CliCommand::Status(parse_status_options(&args[1..])?)),
        "generate" => Ok(CliCommand::Generate(parse_generate_options(&args[1..])?)),
        other => Err(format!("unknown command: {other}")),
    }
}

fn parse_status_options(args: &[String]) -> Result<StatusOptions, String> {
    let mut options = StatusOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--provider" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--provider requires a provider id".to_string())?;
                options.provider = Some(value.clone());
            }
            other => return Err(format!("Unknown status option '{other}'")),
        }
    }
    Ok(options)
}

fn parse_generate_options(args: &[String]) -> Result<GenerateOptions, String> {
    let mut options = GenerateOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--worker" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--worker requires a worker id".to_string())?;
                options.worker = Some(value.clone());
            }
            "--prompt" | "-p" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--prompt requires a value".to_string())?;
                options.prompt = Some(value.clone());
            }
            "--provider" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--provider requires a provider id".to_string())?;
                options.provider = Some(value.clone());
            }
            "--model" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--model requires a catalog model id".to_string())?;
                options.model = Some(value.clone());
            }
            "--stream" => {
                options.stream = true;
            }
            other => return Err(format!("Unknown generate option '{other}'")),
        }
    }
    Ok(options)
}

fn print_help() {
    println!(
        "genrelay {} - multi-provider generation routing service

USAGE:
    genrelay [COMMAND]

COMMANDS:
    run                 Start the HTTP service (default)
    init                Create the database schema and seed the catalog
    status              Show per-provider health
        --provider <id>     Limit to one provider
    generate            Route a single generation from the CLI
        --worker <id>       Worker (default text-gen)
        --prompt <text>     The prompt
        --provider <id>     Preferred provider
        --model <id>        Preferred catalog model
        --stream            Stream text deltas
    help                Show this help
    version             Show the version",
        env!("CARGO_PKG_VERSION")
    );
}

fn print_version() {
    println!("genrelay {}", env!("CARGO_PKG_VERSION"));
}

struct Services {
    registry: Registry,
    router: SimpleRouter,
    engine: WorkflowEngine,
    orchestrator: Orchestrator,
    config: AppConfig,
}

/// Builds the full service graph from configuration.
async fn build_services() -> Result<Services, AppError> {
    let config = AppConfig::load()
        .map_err(|err| AppError::ConfigError(format!("Failed to load configuration: {err}")))?;

    let pool = Arc::new(database::init_db(&config.database.url).await?);
    database::ensure_schema(&pool).await?;

    let credentials = Credentials::from_env();
    let registry = Registry::new(
        Arc::clone(&pool),
        credentials,
        config.gateway.clone(),
        config.routing.failure_threshold,
    );
    registry.seed_defaults().await?;

    let usage = UsageLogger::new(Arc::clone(&pool));
    let health = HealthTracker::new(registry.clone(), config.routing.quota_cooldown_minutes);
    let classifier = TierClassifier::new(
        config.queue.stats_url.clone(),
        config.routing.queue_depth_threshold,
    )?;
    let adapters = AdapterSet::defaults()?;

    let router = SimpleRouter::new(
        registry.clone(),
        adapters,
        health,
        Some(usage),
        classifier,
    );
    let engine = WorkflowEngine::new(router.clone());
    let orchestrator = Orchestrator::new(
        router.clone(),
        registry.clone(),
        ExecutionStore::new(),
        config.routing.clone(),
        config.callback.clone(),
    )?;

    Ok(Services {
        registry,
        router,
        engine,
        orchestrator,
        config,
    })
}

async fn run_server() -> Result<(), AppError> {
    let services = build_services().await?;

    let state = AppState::new(
        Arc::new(services.orchestrator),
        Arc::new(services.router),
        Arc::new(services.engine),
        services.registry,
        services.config.callback.passphrase.clone(),
    );
    let app = api_router(state);

    let addr: SocketAddr = format!(
        "{}:{}",
        services.config.server.host, services.config.server.port
    )
    .parse()
    .map_err(|err| AppError::ConfigError(format!("Invalid bind address: {err}")))?;

    info!(%addr, "Starting genrelay");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::ConfigError(format!("Failed to bind {addr}: {err}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|err| AppError::NetworkError(err.to_string()))?;

    Ok(())
}

async fn handle_init() -> Result<(), AppError> {
    let services = build_services().await?;
    let workflows = services.registry.list_workflows().await?;
    println!("genrelay: schema ready, catalog seeded");
    println!("genrelay: {} workflow definitions available", workflows.len());
    Ok(())
}

async fn handle_status(provider: Option<&str>) -> Result<(), AppError> {
    let services = build_services().await?;

    let mut shown = Vec::new();
    for worker in Worker::all() {
        for record in services.registry.get_providers_for_worker(worker).await? {
            if shown.iter().any(|id| id == &record.id) {
                continue;
            }
            if let Some(filter) = provider {
                if record.id != filter {
                    continue;
                }
            }
            let status = services.registry.get_status(&record.id).await?;
            let state = if status.is_exhausted(chrono::Utc::now()) {
                "exhausted"
            } else if status.healthy {
                "healthy"
            } else {
                "unhealthy"
            };
            println!(
                "{:<12} {:<10} failures={} last_success={}",
                record.id,
                state,
                status.consecutive_failures,
                status
                    .last_success_at
                    .map_or_else(|| "never".to_string(), |at| at.to_rfc3339()),
            );
            shown.push(record.id);
        }
    }

    if shown.is_empty() {
        println!("genrelay: no providers matched");
    }
    Ok(())
}

async fn handle_generate(options: GenerateOptions) -> Result<(), AppError> {
    let worker = options
        .worker
        .as_deref()
        .map_or(Some(Worker::TextGen), Worker::from_id)
        .ok_or_else(|| AppError::Validation("Unknown worker".into()))?;
    let prompt = options
        .prompt
        .ok_or_else(|| AppError::Validation("--prompt is required".into()))?;

    let services = build_services().await?;
    let request = SimpleRequest {
        worker,
        prompt,
        options: Default::default(),
        constraints: Default::default(),
        preferences: RoutePreferences {
            provider: options.provider,
            model: options.model,
        },
        request_id: None,
    };

    if options.stream {
        let (tx, mut rx) = mpsc::channel(32);
        let router = services.router.clone();
        let streaming = tokio::spawn(async move { router.route_stream(&request, tx).await });

        while let Some(delta) = rx.recv().await {
            if delta.done {
                println!();
            } else {
                print!("{}", delta.text);
            }
        }

        let response = streaming
            .await
            .map_err(|err| AppError::ApiError(format!("Stream task failed: {err}")))??;
        if !response.success {
            return Err(AppError::AllProvidersFailed(
                response.error.unwrap_or_default(),
            ));
        }
    } else {
        let response = services.router.route(&request).await?;
        println!("{}", serde_json::to_string_pretty(&response).unwrap_or_default());
        if !response.success {
            process::exit(1);
        }
    }

    Ok(())
}
