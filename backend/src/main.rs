use std::sync::Arc;

use anyhow::Result;
use backend::axum_http::http_serve;
use backend::config::config_loader;
use domain::value_objects::product_catalog::ProductCatalog;
use infra::db::postgres::postgres_connection;
use providers::{
    ProviderRegistry, ReceiptClient,
    apple::{AppleEnvironment, AppleReceiptClient},
    google::GoogleReceiptClient,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("Backend exited with error: {}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let dotenvy_env = config_loader::load()?;
    info!("ENV has been loaded");

    let stage = config_loader::get_stage();
    info!(stage = %stage, "Stage resolved");

    let postgres_pool = postgres_connection::establish_connection(&dotenvy_env.database.url)?;
    info!("Postgres connection has been established");

    let catalog = Arc::new(ProductCatalog::with_defaults());
    info!(products = catalog.len(), "Product catalog loaded");

    let apple_primary = if stage.is_production() {
        AppleEnvironment::Production
    } else {
        AppleEnvironment::Sandbox
    };
    let apple_client =
        AppleReceiptClient::new(dotenvy_env.apple_iap.shared_secret.clone(), apple_primary)?;

    // Missing Play credentials refuse startup in production and disable the
    // client everywhere else.
    let google_client = GoogleReceiptClient::new(
        dotenvy_env.google_iap.package_name.clone(),
        dotenvy_env.google_iap.service_account_json.as_deref(),
        stage.is_production(),
    )?;

    let provider_registry = Arc::new(ProviderRegistry::new(
        Some(Arc::new(apple_client) as Arc<dyn ReceiptClient>),
        google_client.map(|client| Arc::new(client) as Arc<dyn ReceiptClient>),
    ));

    http_serve::start(
        Arc::new(dotenvy_env),
        Arc::new(postgres_pool),
        catalog,
        provider_registry,
    )
    .await?;

    Ok(())
}
