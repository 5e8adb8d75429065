//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause
//! that worker to stop processing new requests. All provider and database calls in here are async for that reason;
//! never add blocking I/O to a handler.

use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use lokapay_common::TxId;
use lokapay_engine::{
    db_types::NewTransaction,
    traits::{DeliveryManagement, TransactionManagement},
    ReconcilerApi,
    TransactionFilter,
    WebhookDispatcher,
};
use payment_gateways::PaymentFacade;

use crate::{
    data_objects::{
        CreatePaymentParams,
        EmitEventParams,
        EmitEventResponse,
        GatewayQuery,
        PaymentCreatedResponse,
        StatusRefreshResponse,
        TransactionQuery,
    },
    errors::ServerError,
    helpers::payment_request_for,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(create_payment => Post "/payments" impl TransactionManagement);
/// Route handler for the payment creation endpoint.
///
/// The payment is created against the active gateway (or the one named in the optional `gateway`
/// field) first, and recorded locally afterwards with the provider reference and expiry the
/// provider answered with. Replaying a create for an already-recorded `tx_id` does not insert a
/// second row; the stored record is returned alongside the fresh provider result.
pub async fn create_payment<B: TransactionManagement>(
    body: web::Json<CreatePaymentParams>,
    api: web::Data<ReconcilerApi<B>>,
    facade: web::Data<PaymentFacade>,
) -> Result<HttpResponse, ServerError> {
    let CreatePaymentParams { request, gateway } = body.into_inner();
    debug!("💻️ POST create payment {} for customer {}", request.tx_id, request.customer_id);
    let created = facade.create_payment(request.clone(), gateway.as_deref()).await?;
    let mut new_tx = NewTransaction::new(
        request.tx_id.clone(),
        request.customer_id.clone(),
        request.amount,
        request.method.kind(),
        created.gateway.to_string(),
    )
    .with_expires_at(created.result.expires_at);
    if let Some(provider_ref) = &created.result.provider_ref {
        new_tx = new_tx.with_provider_ref(provider_ref.clone());
    }
    let (transaction, inserted) = api.record_new_transaction(new_tx).await.map_err(|e| {
        debug!("💻️ Could not record new transaction. {e}");
        ServerError::from(e)
    })?;
    if !inserted {
        warn!("💻️ Transaction {} already existed. Returning the stored record.", transaction.tx_id);
    }
    let response =
        PaymentCreatedResponse { gateway: created.gateway.to_string(), transaction, payment: created.result };
    Ok(HttpResponse::Ok().json(response))
}

route!(payments => Get "/payments" impl TransactionManagement);
/// Route handler for the transaction listing endpoint. Most recent first; see
/// [`TransactionQuery`] for the filters.
pub async fn payments<B: TransactionManagement>(
    query: web::Query<TransactionQuery>,
    api: web::Data<ReconcilerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let filter = TransactionFilter::from(query.into_inner());
    debug!("💻️ GET payments [{filter}]");
    let transactions = api.search_transactions(filter).await.map_err(|e| {
        debug!("💻️ Could not search transactions. {e}");
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(transactions))
}

route!(payment => Get "/payments/{tx_id}" impl TransactionManagement);
pub async fn payment<B: TransactionManagement>(
    path: web::Path<String>,
    api: web::Data<ReconcilerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let tx_id = TxId::from(path.into_inner());
    debug!("💻️ GET payment {tx_id}");
    let transaction = api.require_transaction(&tx_id).await.map_err(ServerError::from)?;
    Ok(HttpResponse::Ok().json(transaction))
}

route!(payment_status => Get "/payments/{tx_id}/status" impl TransactionManagement);
/// Route handler for the live status refresh endpoint.
///
/// Polls the provider for the current payment status and feeds the answer through the same
/// reconciliation path a callback takes, so a terminal answer observed here flips the local
/// record (and fires the matching webhook) exactly the way a callback would have.
pub async fn payment_status<B: TransactionManagement>(
    path: web::Path<String>,
    api: web::Data<ReconcilerApi<B>>,
    facade: web::Data<PaymentFacade>,
) -> Result<HttpResponse, ServerError> {
    let tx_id = TxId::from(path.into_inner());
    debug!("💻️ GET status refresh for {tx_id}");
    let transaction = api.require_transaction(&tx_id).await.map_err(ServerError::from)?;
    let request = payment_request_for(&transaction);
    let provider_status =
        facade.check_status(&transaction.gateway, &request, transaction.provider_ref.as_deref()).await?;
    let outcome = api.reconcile_status(&tx_id, provider_status).await.map_err(|e| {
        debug!("💻️ Could not reconcile polled status for {tx_id}. {e}");
        ServerError::from(e)
    })?;
    if outcome.is_applied() {
        info!("💻️ Status poll moved {tx_id} to {provider_status}");
    }
    let transaction = api.require_transaction(&tx_id).await.map_err(ServerError::from)?;
    Ok(HttpResponse::Ok().json(StatusRefreshResponse { provider_status, transaction }))
}

route!(cancel_payment => Post "/payments/{tx_id}/cancel" impl TransactionManagement);
/// Route handler for the cancellation endpoint.
///
/// The provider-side cancel runs first; only when it succeeds is the local record flipped
/// `pending → cancelled` (which emits the `payment.cancelled` webhook). A transaction that has
/// already reached a terminal state is rejected before any provider call is made.
pub async fn cancel_payment<B: TransactionManagement>(
    path: web::Path<String>,
    api: web::Data<ReconcilerApi<B>>,
    facade: web::Data<PaymentFacade>,
) -> Result<HttpResponse, ServerError> {
    let tx_id = TxId::from(path.into_inner());
    debug!("💻️ POST cancel payment {tx_id}");
    let transaction = api.require_transaction(&tx_id).await.map_err(ServerError::from)?;
    if transaction.status.is_terminal() {
        return Err(ServerError::ValidationError(format!(
            "Transaction {tx_id} is already {} and cannot be cancelled",
            transaction.status
        )));
    }
    let request = payment_request_for(&transaction);
    facade.cancel(&transaction.gateway, &request, transaction.provider_ref.as_deref()).await?;
    match api.cancel_transaction(&tx_id).await.map_err(ServerError::from)? {
        Some(cancelled) => Ok(HttpResponse::Ok().json(cancelled)),
        // A callback settled or closed the transaction while the provider call was in flight.
        None => {
            let transaction = api.require_transaction(&tx_id).await.map_err(ServerError::from)?;
            Err(ServerError::ValidationError(format!(
                "Transaction {tx_id} reached {} before the cancellation could be recorded",
                transaction.status
            )))
        },
    }
}

//----------------------------------------------   Methods  ----------------------------------------------------
#[get("/payment-methods")]
pub async fn payment_methods(
    query: web::Query<GatewayQuery>,
    facade: web::Data<PaymentFacade>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET payment methods");
    let methods = facade.list_methods(query.gateway.as_deref())?;
    Ok(HttpResponse::Ok().json(methods))
}

//----------------------------------------------   Events  ----------------------------------------------------
route!(emit_event => Post "/events" impl DeliveryManagement);
/// Route handler for the event emission endpoint.
///
/// Emits an arbitrary webhook event (`user.verified` and friends) to every subscribed endpoint.
/// The response carries the delivery rows as they stand after the immediate first attempt.
pub async fn emit_event<B: DeliveryManagement>(
    body: web::Json<EmitEventParams>,
    dispatcher: web::Data<WebhookDispatcher<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = body.into_inner();
    if params.event.trim().is_empty() {
        return Err(ServerError::ValidationError("The event type must not be empty".to_string()));
    }
    debug!("💻️ POST emit event {}", params.event);
    let deliveries = dispatcher.emit(&params.event, params.data).await.map_err(|e| {
        debug!("💻️ Could not emit event {}. {e}", params.event);
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(EmitEventResponse { event: params.event, deliveries }))
}

route!(event_deliveries => Get "/events/{event_id}/deliveries" impl DeliveryManagement);
/// Route handler for the delivery audit endpoint: every delivery row created for an emitted
/// event, oldest first.
pub async fn event_deliveries<B: DeliveryManagement>(
    path: web::Path<String>,
    dispatcher: web::Data<WebhookDispatcher<B>>,
) -> Result<HttpResponse, ServerError> {
    let event_id = path.into_inner();
    debug!("💻️ GET deliveries for event {event_id}");
    let deliveries = dispatcher.deliveries_for_event(&event_id).await.map_err(|e| {
        debug!("💻️ Could not fetch deliveries for event {event_id}. {e}");
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(deliveries))
}

//----------------------------------------------   Balance  ----------------------------------------------------
route!(customer_balance => Get "/customers/{customer_id}/balance" impl TransactionManagement);
/// Route handler for the account balance endpoint. 404 when the customer has never been
/// credited.
pub async fn customer_balance<B: TransactionManagement>(
    path: web::Path<String>,
    api: web::Data<ReconcilerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let customer_id = path.into_inner();
    debug!("💻️ GET balance for customer {customer_id}");
    let balance = api.fetch_customer_balance(&customer_id).await.map_err(|e| {
        debug!("💻️ Could not fetch balance for {customer_id}. {e}");
        ServerError::from(e)
    })?;
    match balance {
        Some(balance) => Ok(HttpResponse::Ok().json(balance)),
        None => Err(ServerError::NoRecordFound(format!("No account exists for customer {customer_id}"))),
    }
}
