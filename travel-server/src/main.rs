use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};
use travel_core::llm::OllamaClient;
use travel_core::TravelConfig;

use travel_server::http::HttpState;
use travel_server::orchestrator::Orchestrator;
use travel_server::subsystems::travel::TravelService;
use travel_server::subsystems::Stores;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "travel.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = match TravelConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Lazy: the API keeps answering from templates and STM while Postgres is down.
    let pool = match travel_core::db::create_lazy_pool(&config.database) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Invalid database configuration: {}", e);
            std::process::exit(1);
        }
    };
    let stm = travel_core::stm::connect_store(&config.memory).await;
    let ollama = Arc::new(OllamaClient::new(config.ollama.clone())?);

    if args.health {
        let mut healthy = true;

        match travel_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }

        match travel_core::db::missing_tables(&pool).await {
            Ok(missing) if missing.is_empty() => println!("✅ Memory schema present"),
            Ok(missing) => {
                healthy = false;
                println!("❌ Missing tables: {}", missing.join(", "));
            }
            Err(e) => {
                healthy = false;
                println!("❌ Schema check failed: {}", e);
            }
        }

        match stm.ping().await {
            Ok(()) => println!("✅ Short-term memory: {}", stm.name()),
            Err(e) => {
                healthy = false;
                println!("❌ Short-term memory ({}) failed: {}", stm.name(), e);
            }
        }

        let status = ollama.status().await;
        if status.available {
            println!("✅ Ollama at {} (model {})", status.base_url, status.model);
        } else {
            // Not fatal: every persona has canned responses.
            println!(
                "❌ Ollama unreachable at {}: {}",
                status.base_url,
                status.error.unwrap_or_default()
            );
        }

        if !healthy {
            std::process::exit(1);
        }
        println!("✅ Travel assistant health check passed");
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    let retention_pool = pool.clone();
    let retention_store = stm.clone();
    let retention_config = config.retention.clone();
    let retention_shutdown = tx.subscribe();
    tokio::spawn(async move {
        travel_server::subsystems::retention::run_retention_loop(
            retention_pool,
            retention_store,
            retention_config,
            retention_shutdown,
        )
        .await;
    });

    let http_handle = if config.http.enabled {
        let orchestrator = Orchestrator::new(ollama.clone(), config.ollama.clone(), &config.routing);
        let service = TravelService::new(Stores::new(pool, stm), config.clone(), orchestrator);
        let state = HttpState { service, ollama };
        let http_config = config.http.clone();
        let http_shutdown = tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) =
                travel_server::http::start_http_server(state, http_config, http_shutdown).await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        }))
    } else {
        tracing::warn!("HTTP API disabled; only background retention is running");
        None
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());

    if let Some(handle) = http_handle {
        let _ = handle.await;
    }

    Ok(())
}
