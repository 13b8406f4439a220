use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courier::app::auth::AuthService;
use courier::app::notifications::NotificationService;
use courier::app::push_subscriptions::PushSubscriptionService;
use courier::app::realtime::SubscriptionRegistry;
use courier::config::AppConfig;
use courier::infra::db::Db;
use courier::infra::notification_store::PgNotificationStore;
use courier::infra::push::PushGatewayClient;
use courier::infra::push_subscription_store::PgPushSubscriptionStore;
use courier::{http, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    db.migrate().await?;

    let shutdown = CancellationToken::new();
    let registry = Arc::new(SubscriptionRegistry::new(config.realtime.queue_capacity));
    let push_store = Arc::new(PgPushSubscriptionStore::new(db.clone()));

    let notifications = NotificationService::new(
        Arc::new(PgNotificationStore::new(db.clone())),
        push_store.clone(),
        Arc::new(PushGatewayClient::new(&config)?),
        Arc::clone(&registry),
        &config.realtime,
        shutdown.child_token(),
    );

    let state = AppState {
        notifications: notifications.clone(),
        push_subscriptions: PushSubscriptionService::new(push_store),
        auth: AuthService::new(config.paseto_access_key),
        admin_token: config.admin_token.clone(),
        heartbeat_interval: config.realtime.heartbeat_interval,
    };

    let reaper = tokio::spawn(jobs::connection_reaper::run(
        Arc::clone(&registry),
        config.realtime.reap_interval,
        config.realtime.idle_timeout,
        shutdown.clone(),
    ));

    let app: Router = http::router(state).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    tracing::info!("listening on {}", config.http_addr);

    let streams = notifications.clone();
    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // open streams never finish on their own; end them so the server can drain
            let closed = streams.shutdown();
            tracing::info!(closed, "closed live streams");
            serve_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(err) = reaper.await {
        tracing::error!(error = ?err, "connection reaper task failed");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
