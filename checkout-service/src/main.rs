use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use checkout_service::{
    build_router, AppState, CheckoutConfig, InMemoryPaymentStatusStore, MidtransClient, PaymentStatusStore,
    PgPaymentStatusStore,
};
use common_observability::CheckoutMetrics;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = CheckoutConfig::from_env()?;
    info!(
        mode = config.midtrans.mode.as_str(),
        server_key = %config.midtrans.masked_server_key(),
        client_key = %config.midtrans.masked_client_key(),
        snap_base_url = %config.midtrans.snap_base_url,
        "Gateway configuration loaded"
    );
    if !config.midtrans.is_configured() {
        warn!("MIDTRANS_SERVER_KEY / MIDTRANS_CLIENT_KEY are not set; transaction creation will be refused until they are");
    }

    let metrics = Arc::new(CheckoutMetrics::new().context("failed to register metrics")?);
    let gateway = MidtransClient::new(config.midtrans.clone())?.with_metrics(metrics.clone());

    let store: Arc<dyn PaymentStatusStore> = match config.database_url.as_deref() {
        Some(url) => {
            let store = PgPaymentStatusStore::connect(url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            info!("Payment statuses persisted to Postgres");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set; payment statuses are kept in memory only");
            Arc::new(InMemoryPaymentStatusStore::new())
        }
    };

    let addr = SocketAddr::new(config.host, config.port);
    let state = AppState::new(config, Arc::new(gateway), store, metrics);
    let app = build_router(state);

    info!(%addr, "starting checkout-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
