use std::sync::Arc;
use std::time::Duration;

use socketioxide::SocketIo;

use courier_notification::config::AppConfig;
use courier_notification::events::dead_letters::RabbitDeadLetters;
use courier_notification::events::publisher::{RabbitAuditSink, RabbitDeliveryQueue};
use courier_notification::events::subscriber;
use courier_notification::services::audit::{AuditLogger, AuditWriter};
use courier_notification::services::channels::HttpChannelSender;
use courier_notification::services::dispatcher::FanOutDispatcher;
use courier_notification::services::processor::DeliveryProcessor;
use courier_notification::services::push::LivePushEmitter;
use courier_notification::services::registry::RedisConnectionRegistry;
use courier_notification::services::retention;
use courier_notification::services::transition::TransitionEngine;
use courier_notification::socket::gateway::SocketIoPushGateway;
use courier_notification::socket::handlers;
use courier_notification::store::{PgActiveNotificationStore, PgNotificationLogStore};
use courier_notification::{router, AppState, SERVICE_NAME};
use courier_shared::clients::db::create_pool;
use courier_shared::clients::email::EmailClient;
use courier_shared::clients::rabbitmq::RabbitMQClient;
use courier_shared::clients::redis::RedisClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    courier_shared::middleware::init_tracing(SERVICE_NAME);

    let config = AppConfig::load()?;
    let port = config.port;

    // Set JWT_SECRET env var for the auth extractor middleware
    std::env::set_var("JWT_SECRET", &config.jwt_secret);

    let metrics_handle = courier_shared::middleware::init_metrics()?;

    let pool = create_pool(&config.database_url)?;
    let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url).await?;
    let redis = RedisClient::connect(&config.redis_url).await?;

    // Build Socket.IO layer first; the push gateway emits through it
    let (sio_layer, io) = SocketIo::builder().build_layer();

    let active = Arc::new(PgActiveNotificationStore::new(pool.clone()));
    let logs = Arc::new(PgNotificationLogStore::new(pool));
    let registry = Arc::new(RedisConnectionRegistry::new(redis, config.connection_ttl_secs));
    let push = LivePushEmitter::new(registry.clone(), Arc::new(SocketIoPushGateway::new(io.clone())));

    let http_client = reqwest::Client::new();
    let email = EmailClient::new(
        http_client.clone(),
        &config.resend_api_key,
        &config.email_from,
        &config.email_from_name,
    );

    let state = Arc::new(AppState {
        dispatcher: FanOutDispatcher::new(Arc::new(RabbitDeliveryQueue::new(rabbitmq.clone()))),
        transitions: TransitionEngine::new(
            active.clone(),
            push.clone(),
            AuditLogger::new(Arc::new(RabbitAuditSink::new(rabbitmq.clone()))),
        ),
        processor: DeliveryProcessor::new(
            active.clone(),
            logs.clone(),
            Arc::new(HttpChannelSender::new(email, http_client)),
            push,
            config.log_ttl(),
        ),
        audit_writer: AuditWriter::new(logs.clone(), config.log_ttl()),
        registry,
        active,
        logs,
        dead_letters: Arc::new(RabbitDeadLetters::new(rabbitmq.clone())),
        metrics_handle: Some(metrics_handle),
        config,
    });

    io.ns("/", {
        let state = state.clone();
        move |socket: socketioxide::extract::SocketRef| {
            let state = state.clone();
            async move {
                handlers::on_connect_with_state(socket, state).await;
            }
        }
    });

    // Spawn delivery record consumer
    let delivery_state = state.clone();
    let delivery_rabbitmq = rabbitmq.clone();
    tokio::spawn(async move {
        if let Err(e) = subscriber::listen_delivery_records(delivery_rabbitmq, delivery_state).await {
            tracing::error!(error = %e, "delivery record subscriber failed");
        }
    });

    // Spawn audit log consumer
    let audit_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = subscriber::listen_audit_events(rabbitmq, audit_state).await {
            tracing::error!(error = %e, "audit event subscriber failed");
        }
    });

    // Spawn log expiry
    tokio::spawn(retention::run_purge_loop(
        state.logs.clone(),
        Duration::from_secs(state.config.log_purge_interval_secs),
    ));

    let app = router(state.clone()).layer(sio_layer);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "courier-notification starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
