use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use spycats::api;
use spycats::app::App;
use spycats::breeds::{BreedCatalog, BreedSource, StaticBreeds, TheCatApi};
use spycats::cli::Cli;
use spycats::db;
use spycats::error::AppError;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spycats=info")),
        )
        .init();

    let db_path = db::absolute_path(&cli.db_path)?;
    db::ensure_parent_dir(&db_path)?;
    let conn = db::connect(&db_path).await?;
    db::ensure_schema(&conn).await?;

    let source: Arc<dyn BreedSource> = match &cli.breeds_file {
        Some(path) => {
            info!(path = %path.display(), "Using local breed catalog");
            Arc::new(StaticBreeds::from_file(path)?)
        }
        None => {
            let api = TheCatApi::new(&cli.breeds_url, cli.breed_timeout())?;
            info!(url = %api.breeds_url(), "Using remote breed catalog");
            Arc::new(api)
        }
    };
    let catalog = Arc::new(BreedCatalog::new(source, cli.breed_cache_ttl()));
    let app = Arc::new(App::new(conn, catalog));

    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    info!(
        "spycats v{} listening on http://{}",
        env!("CARGO_PKG_VERSION"),
        cli.bind
    );
    info!(database = %db_path.display(), "Database ready");

    axum::serve(listener, api::router(app))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}
