//! Multi-arch test harness - Main entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpServer};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use multiarch_harness_lib::api;
use multiarch_harness_lib::config::{Config, StoreBackend};
use multiarch_harness_lib::db::DbPool;
use multiarch_harness_lib::middleware::RequestLogger;
use multiarch_harness_lib::runner::{DockerExecutor, Runner, RunnerConfig, TargetExecutor};
use multiarch_harness_lib::store::{DatabaseStore, JobStore, MemoryStore};

/// Perform health check (for Docker healthcheck).
async fn health_check() -> bool {
    // Simple check - just verify we can load config
    Config::from_env().is_ok()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        if health_check().await {
            std::process::exit(0);
        } else {
            std::process::exit(1);
        }
    }

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Multi-Arch Test Harness");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    // Build the job store
    let store: Arc<dyn JobStore> = match config.store_backend {
        StoreBackend::Database => {
            let pool = DbPool::new(&config)
                .await
                .expect("Failed to initialize database");
            info!("Database connection established");

            pool.run_migrations()
                .await
                .expect("Failed to run migrations");
            info!("Database migrations complete");

            Arc::new(DatabaseStore::new(pool))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; jobs are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    info!("Store backend: {}", config.store_backend);

    // Build the dispatcher
    let executor: Arc<dyn TargetExecutor> = Arc::new(DockerExecutor::new(&config.docker_bin));
    let runner = Runner::new(
        Arc::clone(&store),
        executor,
        RunnerConfig::from_config(&config),
    );
    info!(
        "Runner ready (image prefix: {}, default timeout: {:?})",
        config.runner_image, config.default_timeout
    );

    // Prepare shared state
    let bind_address = config.bind_address();
    let is_development = config.is_development();
    let store_data: web::Data<dyn JobStore> = web::Data::from(store);
    let runner_data = web::Data::new(runner);

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!(
            "Starting server at http://{} ({} workers)",
            bind_address, cpus
        );
        cpus
    };

    // Start HTTP server
    let server = HttpServer::new(move || {
        // Configure CORS
        let cors = if is_development {
            // Permissive CORS for development
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
                .max_age(3600)
        } else {
            // Restrictive CORS for production (same-origin only)
            Cors::default()
                .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
                .max_age(3600)
        };

        App::new()
            // Add CORS middleware (must be before other middleware)
            .wrap(cors)
            // Add request logging middleware
            .wrap(RequestLogger)
            // Add shared state
            .app_data(store_data.clone())
            .app_data(runner_data.clone())
            // Configure API routes
            .service(
                web::scope("/api/v1")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_job_routes),
            )
            // Swagger UI
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", api::ApiDoc::openapi()),
            )
    });

    // Set worker count
    server
        .workers(worker_count)
        .bind(&bind_address)?
        .run()
        .await
}
