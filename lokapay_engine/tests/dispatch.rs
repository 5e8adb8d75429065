//! Dispatcher tests against a real HTTP receiver: signing, bookkeeping after good and bad
//! responses, the retry sweep, and the settled-hook-to-webhook bridge.

use std::sync::{
    atomic::{AtomicU16, Ordering},
    Arc,
    Mutex,
};

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use chrono::{Duration, Utc};
use futures_util::FutureExt;
use log::*;
use lokapay_common::{MethodKind, Rupiah, TxId};
use lokapay_engine::{
    db_types::{DeliveryStatus, NewTransaction},
    events::{EventHandlers, EventHooks},
    lpe_api::dispatch_api::{EVENT_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER},
    test_utils::prepare_env::new_test_database,
    DeliveryManagement,
    DispatcherConfig,
    ReconcilerApi,
    RetryPolicy,
    SqliteDatabase,
    SubscriberEndpoint,
    TransactionManagement,
    WebhookDispatcher,
};
use payment_gateways::{signing::verify_payload, CallbackStatus, CanonicalCallbackEvent};
use serde_json::{json, Value};
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::runtime::Runtime;

const SECRET: &str = "whsec_test_secret";

#[derive(Debug, Clone)]
struct Hit {
    signature: String,
    timestamp: String,
    event: String,
    body: String,
}

/// Shared state for the throwaway receiver: what it saw, and what status it should answer with.
#[derive(Clone)]
struct Receiver {
    hits: Arc<Mutex<Vec<Hit>>>,
    respond_with: Arc<AtomicU16>,
}

impl Receiver {
    fn new(status: u16) -> Self {
        Self { hits: Arc::new(Mutex::new(Vec::new())), respond_with: Arc::new(AtomicU16::new(status)) }
    }

    fn respond_with(&self, status: u16) {
        self.respond_with.store(status, Ordering::Relaxed);
    }

    fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }
}

async fn receive(req: HttpRequest, body: web::Bytes, state: web::Data<Receiver>) -> HttpResponse {
    let header = |name: &str| {
        req.headers().get(name).and_then(|v| v.to_str().ok()).unwrap_or_default().to_string()
    };
    let hit = Hit {
        signature: header(SIGNATURE_HEADER),
        timestamp: header(TIMESTAMP_HEADER),
        event: header(EVENT_HEADER),
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    debug!("📭️ Receiver got event {} ({} bytes)", hit.event, hit.body.len());
    state.hits.lock().unwrap().push(hit);
    let status = state.respond_with.load(Ordering::Relaxed);
    HttpResponse::build(actix_web::http::StatusCode::from_u16(status).unwrap()).finish()
}

/// Binds the receiver on a random high port and returns its webhook URL.
async fn spawn_receiver(state: Receiver) -> String {
    let port = 20000 + rand::random::<u16>() % 10_000;
    let server = HttpServer::new(move || {
        App::new().app_data(web::Data::new(state.clone())).route("/hooks", web::post().to(receive))
    })
    .bind(("127.0.0.1", port))
    .expect("Could not bind test receiver")
    .workers(1)
    .run();
    tokio::spawn(server);
    format!("http://127.0.0.1:{port}/hooks")
}

fn config_for(url: &str) -> DispatcherConfig {
    DispatcherConfig::default().with_endpoint(SubscriberEndpoint::new(url, SECRET))
}

async fn tear_down(db: SqliteDatabase) {
    let url = db.url().to_string();
    drop(db);
    Sqlite::drop_database(&url).await.ok();
}

#[test]
fn deliveries_are_signed_and_bookkept() {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let receiver = Receiver::new(200);
        let url = spawn_receiver(receiver.clone()).await;
        let db = new_test_database().await;
        let dispatcher = WebhookDispatcher::new(db.clone(), config_for(&url));

        let rows = dispatcher.emit("payment.completed", json!({"tx_id": "tx-2001", "amount": 100_000})).await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.status, DeliveryStatus::Delivered);
        assert_eq!(row.attempt_count, 1);
        assert_eq!(row.last_status, Some(200));
        assert!(row.next_retry_at.is_none());

        let hits = receiver.hits();
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        // The receiver can authenticate the delivery with nothing but the shared secret.
        let ts: i64 = hit.timestamp.parse().unwrap();
        verify_payload(SECRET, ts, &hit.body, &hit.signature).unwrap();
        assert_eq!(hit.event, row.event_id);

        let payload: Value = serde_json::from_str(&hit.body).unwrap();
        assert_eq!(payload["event"], "payment.completed");
        assert_eq!(payload["event_id"], row.event_id.as_str());
        assert_eq!(payload["data"]["tx_id"], "tx-2001");
        tear_down(db).await;
    });
}

#[test]
fn a_rejected_delivery_is_rescheduled() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let receiver = Receiver::new(500);
        let url = spawn_receiver(receiver.clone()).await;
        let db = new_test_database().await;
        let dispatcher = WebhookDispatcher::new(db.clone(), config_for(&url));

        let before = Utc::now();
        let rows = dispatcher.emit("user.verified", json!({"user_id": "u-17"})).await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.status, DeliveryStatus::Pending);
        assert_eq!(row.attempt_count, 1);
        assert_eq!(row.last_status, Some(500));
        assert_eq!(row.last_error.as_deref(), Some("endpoint answered HTTP 500"));

        // First retry lands on the first entry of the default backoff table.
        let scheduled = row.next_retry_at.expect("a retry must be scheduled");
        let offset = (scheduled - before).num_seconds();
        assert!((58..=65).contains(&offset), "retry scheduled {offset}s out");
        tear_down(db).await;
    });
}

#[test]
fn events_without_subscribers_create_no_deliveries() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let receiver = Receiver::new(200);
        let url = spawn_receiver(receiver.clone()).await;
        let db = new_test_database().await;
        let config = DispatcherConfig::default()
            .with_endpoint(SubscriberEndpoint::new(&url, SECRET).with_events(["payment.completed"]))
            .with_endpoint(SubscriberEndpoint::new("https://disabled.example/wh", SECRET).disabled());
        let dispatcher = WebhookDispatcher::new(db.clone(), config);

        let rows = dispatcher.emit("payment.expired", json!({"tx_id": "tx-2002"})).await.unwrap();
        assert!(rows.is_empty());
        assert!(receiver.hits().is_empty());
        tear_down(db).await;
    });
}

#[test]
fn the_sweep_redelivers_due_rows() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let receiver = Receiver::new(500);
        let url = spawn_receiver(receiver.clone()).await;
        let db = new_test_database().await;
        let dispatcher = WebhookDispatcher::new(db.clone(), config_for(&url));

        let rows = dispatcher.emit("payment.completed", json!({"tx_id": "tx-2003"})).await.unwrap();
        let row = &rows[0];
        assert_eq!(row.status, DeliveryStatus::Pending);

        // Nothing is due yet; the scheduled retry is a minute out.
        assert_eq!(dispatcher.process_due_retries(Utc::now()).await.unwrap(), 0);

        // Pull the schedule into the past, then let the endpoint recover.
        db.mark_retrying(row.id, row.attempt_count, Some(500), "endpoint answered HTTP 500", Utc::now() - Duration::seconds(1))
            .await
            .unwrap()
            .unwrap();
        receiver.respond_with(200);

        assert_eq!(dispatcher.process_due_retries(Utc::now()).await.unwrap(), 1);
        let row = db.fetch_delivery(row.id).await.unwrap().unwrap();
        assert_eq!(row.status, DeliveryStatus::Delivered);
        assert_eq!(row.attempt_count, 3);
        assert_eq!(row.last_status, Some(200));
        assert_eq!(receiver.hits().len(), 2);
        tear_down(db).await;
    });
}

#[test]
fn rows_for_unconfigured_endpoints_are_abandoned() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let receiver = Receiver::new(500);
        let url = spawn_receiver(receiver.clone()).await;
        let db = new_test_database().await;
        let dispatcher = WebhookDispatcher::new(db.clone(), config_for(&url));

        let rows = dispatcher.emit("payment.failed", json!({"tx_id": "tx-2004"})).await.unwrap();
        let row = &rows[0];
        db.mark_retrying(row.id, row.attempt_count, Some(500), "endpoint answered HTTP 500", Utc::now() - Duration::seconds(1))
            .await
            .unwrap()
            .unwrap();

        // The subscriber has since been removed from the configuration.
        let sweeper = WebhookDispatcher::new(db.clone(), DispatcherConfig::default());
        assert_eq!(sweeper.process_due_retries(Utc::now()).await.unwrap(), 1);

        let row = db.fetch_delivery(row.id).await.unwrap().unwrap();
        assert_eq!(row.status, DeliveryStatus::Failed);
        assert_eq!(row.attempt_count, 2);
        assert_eq!(row.last_error.as_deref(), Some("endpoint is no longer configured"));
        assert!(row.next_retry_at.is_none());
        tear_down(db).await;
    });
}

#[test]
fn retries_exhaust_into_permanent_failure() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let receiver = Receiver::new(503);
        let url = spawn_receiver(receiver.clone()).await;
        let db = new_test_database().await;
        let config = DispatcherConfig {
            endpoints: vec![SubscriberEndpoint::new(&url, SECRET)],
            policy: RetryPolicy { max_attempts: 3, delays: vec![Duration::seconds(60)] },
            ..DispatcherConfig::default()
        };
        let dispatcher = WebhookDispatcher::new(db.clone(), config);

        let rows = dispatcher.emit("payment.cancelled", json!({"tx_id": "tx-2005"})).await.unwrap();
        let mut row = rows[0].clone();
        for expected_attempts in 2..=3 {
            db.mark_retrying(row.id, row.attempt_count, Some(503), "endpoint answered HTTP 503", Utc::now() - Duration::seconds(1))
                .await
                .unwrap()
                .unwrap();
            // mark_retrying burned one attempt slot; the sweep makes the next real attempt.
            dispatcher.process_due_retries(Utc::now()).await.unwrap();
            row = db.fetch_delivery(row.id).await.unwrap().unwrap();
            info!("📬️ After sweep: {row}");
            if row.status == DeliveryStatus::Failed {
                break;
            }
            assert!(row.attempt_count >= expected_attempts);
        }
        let row = db.fetch_delivery(row.id).await.unwrap().unwrap();
        assert_eq!(row.status, DeliveryStatus::Failed);
        assert!(row.next_retry_at.is_none());
        assert!(row.attempt_count >= row.max_attempts);
        tear_down(db).await;
    });
}

#[test]
fn settled_payments_become_webhooks() {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let receiver = Receiver::new(200);
        let url = spawn_receiver(receiver.clone()).await;
        let db = new_test_database().await;
        let dispatcher = Arc::new(WebhookDispatcher::new(db.clone(), config_for(&url)));

        // The same bridge the server installs: a settled payment turns into a
        // `payment.completed` webhook carrying the transaction record.
        let mut hooks = EventHooks::default();
        let hook_dispatcher = Arc::clone(&dispatcher);
        hooks.on_payment_settled(move |ev| {
            let dispatcher = Arc::clone(&hook_dispatcher);
            async move {
                let data = serde_json::to_value(&ev.transaction).unwrap_or_default();
                if let Err(e) = dispatcher.emit("payment.completed", data).await {
                    warn!("📬️ Could not emit settlement webhook: {e}");
                }
            }
            .boxed()
        });
        let handlers = EventHandlers::new(10, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;

        let api = ReconcilerApi::new(db.clone(), producers);
        let tx = NewTransaction::new(
            TxId::from("tx-2006"),
            "alice".into(),
            Rupiah::new(150_000),
            MethodKind::VirtualAccount,
            "snap".into(),
        );
        api.record_new_transaction(tx).await.unwrap();
        let event = CanonicalCallbackEvent {
            tx_id: TxId::from("tx-2006"),
            provider_ref: Some("VA-2006".into()),
            status: CallbackStatus::Success,
            paid_amount: Some(Rupiah::new(150_000)),
            channel: Some("BRI".into()),
            reference: None,
            paid_at: Some(Utc::now()),
            event_key: "evt-2006".into(),
            raw: json!({}),
        };
        api.process_event("snap", event).await.unwrap();

        // The webhook goes out on the handler task; wait for it.
        let mut deadline = 40;
        while receiver.hits().is_empty() && deadline > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            deadline -= 1;
        }
        let hits = receiver.hits();
        assert_eq!(hits.len(), 1, "the settlement webhook never arrived");
        let payload: Value = serde_json::from_str(&hits[0].body).unwrap();
        assert_eq!(payload["event"], "payment.completed");
        assert_eq!(payload["data"]["tx_id"], "tx-2006");
        assert_eq!(payload["data"]["status"], "success");
        tear_down(db).await;
    });
}
