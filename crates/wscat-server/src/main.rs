mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use wscat_catalog::{build_sources, CatalogQueryService, OverrideCache, SyncOptions, SyncOrchestrator};
use wscat_db::{CatalogStore, PgCatalogStore};

use crate::{
    api::{build_app, AppState},
    middleware::RateLimitState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(wscat_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool = wscat_db::connect_pool_from_config(&config).await?;
    wscat_db::run_migrations(&pool).await?;
    let store: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(pool));

    let policy = wscat_core::load_merge_policy(&config.policy_path)?;
    let (catalog_source, stock_source) = build_sources(&config)?;
    let orchestrator = SyncOrchestrator::new(
        Arc::clone(&store),
        catalog_source,
        stock_source,
        policy,
        SyncOptions::from_config(&config),
    );
    orchestrator.reap_stale_runs().await?;

    let overrides = Arc::new(OverrideCache::new(&config.override_feed_path));
    overrides.refresh_if_stale().await;
    let catalog = CatalogQueryService::from_config(Arc::clone(&store), Arc::clone(&overrides), &config);

    let _scheduler =
        scheduler::build_scheduler(orchestrator.clone(), Arc::clone(&overrides), &config).await?;

    let app = build_app(
        AppState {
            store,
            catalog,
            sync: orchestrator,
        },
        RateLimitState::per_minute(config.rate_limit_per_minute),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "wscat-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
