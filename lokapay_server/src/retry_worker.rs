use chrono::{Duration, Utc};
use lokapay_engine::{events::EventProducers, DispatcherConfig, ReconcilerApi, SqliteDatabase, WebhookDispatcher};
use log::*;
use tokio::task::JoinHandle;

/// Starts the webhook retry sweep. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_retry_worker(db: SqliteDatabase, config: DispatcherConfig, sweep_interval: Duration) -> JoinHandle<()> {
    let tick = std::time::Duration::from_secs(sweep_interval.num_seconds().max(1) as u64);
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(tick);
        let dispatcher = WebhookDispatcher::new(db, config);
        info!("🕰️ Webhook retry worker started (sweeping every {} s)", tick.as_secs());
        loop {
            timer.tick().await;
            debug!("🕰️ Running webhook retry sweep");
            match dispatcher.process_due_retries(Utc::now()).await {
                Ok(0) => trace!("🕰️ No deliveries were due"),
                Ok(n) => info!("🕰️ Retry sweep handled {n} due deliveries"),
                Err(e) => error!("🕰️ Error running webhook retry sweep: {e}"),
            }
        }
    })
}

/// Starts the callback-event retention job. Dedupe records for inbound callbacks only need to
/// live as long as a provider can replay them; everything older is purged once an hour.
pub fn start_retention_worker(db: SqliteDatabase, producers: EventProducers, retention: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(3600));
        let api = ReconcilerApi::new(db, producers);
        info!("🕰️ Callback event retention worker started (retaining {} days)", retention.num_days());
        loop {
            timer.tick().await;
            debug!("🕰️ Running callback event retention job");
            match api.purge_old_callback_events(retention).await {
                Ok(0) => trace!("🕰️ No callback events were old enough to purge"),
                Ok(n) => info!("🕰️ Purged {n} callback events older than {} days", retention.num_days()),
                Err(e) => error!("🕰️ Error running callback event retention job: {e}"),
            }
        }
    })
}
