//! Binary entry point: configuration, wiring, graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use dispatch_console::adapters::cache::{InMemoryCallCache, RedisCallCache};
use dispatch_console::adapters::cad::HttpCadClient;
use dispatch_console::adapters::http::{router, AppState};
use dispatch_console::adapters::relay::{DashboardEventHandler, EventBroker, RelayConsumer};
use dispatch_console::adapters::websocket::BroadcastHub;
use dispatch_console::application::Poller;
use dispatch_console::config::{AppConfig, CacheBackend, ServerConfig};
use dispatch_console::domain::ingress::WebhookVerifier;
use dispatch_console::ports::{CadClient, CallCache, EventSink};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config.server, config.is_production());

    let cache: Arc<dyn CallCache> = match config.cache.backend {
        CacheBackend::Memory => Arc::new(InMemoryCallCache::new()),
        CacheBackend::Redis => {
            let url = config
                .cache
                .redis_url
                .as_deref()
                .expect("validated: redis backend has a URL");
            Arc::new(RedisCallCache::connect(url).await?)
        }
    };

    let broker = EventBroker::new(config.relay.broker_config());
    let supervisor_handle =
        Arc::clone(&broker).spawn_supervisor(config.relay.reconnect_policy());
    let hub = Arc::new(BroadcastHub::new());

    let handler = Arc::new(DashboardEventHandler::new(
        Arc::clone(&cache),
        Arc::clone(&hub),
        config.cache.call_ttl(),
    ));
    let consumer_handle = RelayConsumer::new(Arc::clone(&broker), handler).spawn();

    let cad: Arc<dyn CadClient> = Arc::new(HttpCadClient::new(
        &config.cad.base_url,
        config.cad.api_key.clone(),
        config.cad.request_timeout(),
    )?);
    let poller = Arc::new(Poller::new(
        cad,
        Arc::clone(&cache),
        Arc::clone(&broker) as Arc<dyn EventSink>,
        config.poller.poll_interval(),
        config.cache.call_ttl(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller_handle = Arc::clone(&poller).spawn(shutdown_rx);

    let verifier = Arc::new(WebhookVerifier::new(
        config.webhook.secret.expose_secret().clone(),
    ));
    let state = AppState {
        cache: Arc::clone(&cache),
        broker: Arc::clone(&broker),
        hub: Arc::clone(&hub),
        poller,
        verifier,
        recent_limit: config.server.hydration_limit,
        heartbeat_interval: Duration::from_secs(config.server.ws_heartbeat_secs),
    };
    let app = router(
        state,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let addr = config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "dispatch console listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Shutdown order matters: stop producing, drain the relay, close the
    // dashboards, release the cache last.
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
    let _ = poller_handle.await;
    broker.close();
    let _ = consumer_handle.await;
    let _ = supervisor_handle.await;
    hub.close_all().await;
    cache.close().await;
    tracing::info!("shutdown complete");

    Ok(())
}

fn init_tracing(server: &ServerConfig, production: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(server.log_level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if production {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
