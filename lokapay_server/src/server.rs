use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use lokapay_engine::{
    db_types::Transaction,
    events::{webhook_event_type, EventHandlers, EventHooks, EventProducers, PaymentClosedEvent, PaymentSettledEvent},
    ReconcilerApi,
    SqliteDatabase,
    WebhookDispatcher,
};
use payment_gateways::PaymentFacade;

use crate::{
    callback_routes::{KiospayCallbackRoute, ManualCallbackRoute, SnapCallbackRoute, UniversalCallbackRoute},
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    middleware::ApiTokenMiddlewareFactory,
    retry_worker::{start_retention_worker, start_retry_worker},
    routes::{
        health,
        payment_methods,
        CancelPaymentRoute,
        CreatePaymentRoute,
        CustomerBalanceRoute,
        EmitEventRoute,
        EventDeliveriesRoute,
        PaymentRoute,
        PaymentStatusRoute,
        PaymentsRoute,
    },
};

/// How many undelivered hook events may queue up before an emitting reconciliation awaits.
const HOOK_BUFFER_SIZE: usize = 25;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    SqliteDatabase::create_database_if_missing(&config.database_url)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    info!("🚀️ Database is ready at {}", config.database_url);

    let dispatcher = WebhookDispatcher::new(db.clone(), config.dispatcher.clone());
    let handlers = EventHandlers::new(HOOK_BUFFER_SIZE, build_webhook_bridge(dispatcher));
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let _retry_worker = start_retry_worker(db.clone(), config.dispatcher.clone(), config.retry_sweep_interval);
    let _retention_worker = start_retention_worker(db.clone(), producers.clone(), config.event_retention);

    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(ServerError::from)
}

/// Connects the payment engine's settlement hooks to the webhook dispatcher: every applied
/// transition comes out the other side as a `payment.*` event to the subscribed endpoints.
fn build_webhook_bridge(dispatcher: WebhookDispatcher<SqliteDatabase>) -> EventHooks {
    let dispatcher = Arc::new(dispatcher);
    let mut hooks = EventHooks::default();
    let settled_dispatcher = Arc::clone(&dispatcher);
    hooks.on_payment_settled(move |ev: PaymentSettledEvent| {
        let dispatcher = Arc::clone(&settled_dispatcher);
        Box::pin(async move {
            emit_transaction_event(&dispatcher, "payment.completed", &ev.transaction).await;
        })
    });
    hooks.on_payment_closed(move |ev: PaymentClosedEvent| {
        let dispatcher = Arc::clone(&dispatcher);
        Box::pin(async move {
            match webhook_event_type(ev.status) {
                Some(event_type) => emit_transaction_event(&dispatcher, event_type, &ev.transaction).await,
                None => warn!("📬️ A close event fired for [{}] with non-terminal status. Nothing sent.", ev.transaction.tx_id),
            }
        })
    });
    hooks
}

async fn emit_transaction_event(
    dispatcher: &WebhookDispatcher<SqliteDatabase>,
    event_type: &str,
    transaction: &Transaction,
) {
    match serde_json::to_value(transaction) {
        Ok(data) => {
            if let Err(e) = dispatcher.emit(event_type, data).await {
                error!("📬️ Could not dispatch the {event_type} webhook for [{}]. {e}", transaction.tx_id);
            }
        },
        Err(e) => error!("📬️ Could not serialize [{}] for the {event_type} webhook. {e}", transaction.tx_id),
    }
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let facade = PaymentFacade::new(&config.gateways).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    // One facade for all workers; it only holds configuration, parsed keys and an HTTP client.
    let facade = web::Data::new(facade);
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let reconciler = ReconcilerApi::new(db.clone(), producers.clone())
            .with_amount_tolerance(config.gateways.defaults.amount_tolerance);
        let dispatcher = WebhookDispatcher::new(db.clone(), config.dispatcher.clone());
        let options = ServerOptions::from_config(&config);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("lkp::access_log"))
            .app_data(facade.clone())
            .app_data(web::Data::new(reconciler))
            .app_data(web::Data::new(dispatcher))
            .app_data(web::Data::new(options));
        // Routes that require the API key
        let api_scope = web::scope("/api")
            .wrap(ApiTokenMiddlewareFactory::new(config.api_key.clone()))
            .service(CreatePaymentRoute::<SqliteDatabase>::new())
            .service(PaymentsRoute::<SqliteDatabase>::new())
            .service(PaymentRoute::<SqliteDatabase>::new())
            .service(PaymentStatusRoute::<SqliteDatabase>::new())
            .service(CancelPaymentRoute::<SqliteDatabase>::new())
            .service(payment_methods)
            .service(EmitEventRoute::<SqliteDatabase>::new())
            .service(EventDeliveriesRoute::<SqliteDatabase>::new())
            .service(CustomerBalanceRoute::<SqliteDatabase>::new());
        // Callback routes authenticate at the adapter level and always acknowledge
        let callback_scope = web::scope("/callback")
            .service(SnapCallbackRoute::<SqliteDatabase>::new())
            .service(KiospayCallbackRoute::<SqliteDatabase>::new())
            .service(ManualCallbackRoute::<SqliteDatabase>::new())
            .service(UniversalCallbackRoute::<SqliteDatabase>::new());
        app.service(health).service(api_scope).service(callback_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
