//! Storefront order desk - HTTP service

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_orders::api::{router, AppState};
use storefront_orders::client::HttpPaymentGateway;
use storefront_orders::config::{Config, Seed};
use storefront_orders::desk::OrderDesk;
use storefront_orders::publisher::{EventPublisher, LogPublisher, NatsPublisher};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let publisher: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match NatsPublisher::connect(url).await {
            Ok(nats) => Arc::new(nats),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events will only be logged");
                Arc::new(LogPublisher)
            }
        },
        None => Arc::new(LogPublisher),
    };

    let mut desk = OrderDesk::new(config.desk, publisher);
    if let Some(url) = &config.payment_gateway_url {
        desk = desk.with_payment_gateway(Arc::new(HttpPaymentGateway::new(url.clone(), config.fetch_timeout)?));
    }
    if let Some(path) = &config.seed_file {
        let seed = Seed::load(path)?;
        tracing::info!(products = seed.products.len(), warehouses = seed.warehouses.len(), "seed loaded");
        for product in seed.products {
            desk.register_product(product).await;
        }
        for warehouse in seed.warehouses {
            desk.register_warehouse(warehouse).await;
        }
    }

    let app = router(AppState::new(Arc::new(desk), config.tokens));
    tracing::info!("🚀 Storefront order desk listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
