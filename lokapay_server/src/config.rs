use std::env;

use chrono::Duration;
use log::*;
use lokapay_common::Secret;
use lokapay_engine::DispatcherConfig;
use payment_gateways::GatewaysConfig;

const DEFAULT_LKP_HOST: &str = "127.0.0.1";
const DEFAULT_LKP_PORT: u16 = 8360;
const DEFAULT_RETRY_SWEEP_INTERVAL: Duration = Duration::seconds(60);
const DEFAULT_EVENT_RETENTION: Duration = Duration::days(30);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The static key guarding the `/api` scope. When unset, the internal API accepts every
    /// request, so only leave it unset behind a trusted network boundary.
    pub api_key: Option<Secret<String>>,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// How often the webhook retry sweep scans for due deliveries.
    pub retry_sweep_interval: Duration,
    /// How long inbound callback dedupe records are kept before the cleanup job purges them.
    /// Must comfortably exceed the longest provider replay window.
    pub event_retention: Duration,
    /// Payment provider adapter configuration (active gateway, credentials, defaults).
    pub gateways: GatewaysConfig,
    /// Outbound webhook subscriber endpoints and retry policy.
    pub dispatcher: DispatcherConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_LKP_HOST.to_string(),
            port: DEFAULT_LKP_PORT,
            database_url: String::default(),
            api_key: None,
            use_x_forwarded_for: false,
            use_forwarded: false,
            retry_sweep_interval: DEFAULT_RETRY_SWEEP_INTERVAL,
            event_retention: DEFAULT_EVENT_RETENTION,
            gateways: GatewaysConfig::default(),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("LKP_HOST").ok().unwrap_or_else(|| DEFAULT_LKP_HOST.into());
        let port = env::var("LKP_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for LKP_PORT. {e} Using the default, {DEFAULT_LKP_PORT}, instead."
                    );
                    DEFAULT_LKP_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_LKP_PORT);
        let database_url = env::var("LKP_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ LKP_DATABASE_URL is not set. Please set it to the URL for the Lokapay database.");
            String::default()
        });
        let api_key = match env::var("LKP_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Some(Secret::new(key)),
            _ => {
                warn!(
                    "🚨️ LKP_API_KEY is not set. The internal API under /api will accept unauthenticated requests. Do \
                     not run a production instance like this unless something upstream handles authentication."
                );
                None
            },
        };
        let use_x_forwarded_for =
            env::var("LKP_USE_X_FORWARDED_FOR").map(|s| &s == "1" || &s == "true").unwrap_or(false);
        let use_forwarded = env::var("LKP_USE_FORWARDED").map(|s| &s == "1" || &s == "true").unwrap_or(false);
        let (retry_sweep_interval, event_retention) = configure_worker_timings();
        let gateways = GatewaysConfig::from_env_or_default();
        let dispatcher = DispatcherConfig::from_env_or_default();
        Self {
            host,
            port,
            database_url,
            api_key,
            use_x_forwarded_for,
            use_forwarded,
            retry_sweep_interval,
            event_retention,
            gateways,
            dispatcher,
        }
    }
}

fn configure_worker_timings() -> (Duration, Duration) {
    let retry_sweep_interval = env::var("LKP_RETRY_SWEEP_INTERVAL")
        .map_err(|_| {
            info!(
                "🪛️ LKP_RETRY_SWEEP_INTERVAL is not set. Using the default value of {} s.",
                DEFAULT_RETRY_SWEEP_INTERVAL.num_seconds()
            )
        })
        .and_then(|s| {
            s.parse::<i64>()
                .map(Duration::seconds)
                .map_err(|e| warn!("🪛️ Invalid configuration value for LKP_RETRY_SWEEP_INTERVAL. {e}"))
        })
        .ok()
        .unwrap_or(DEFAULT_RETRY_SWEEP_INTERVAL);
    let event_retention = env::var("LKP_EVENT_RETENTION_DAYS")
        .map_err(|_| {
            info!(
                "🪛️ LKP_EVENT_RETENTION_DAYS is not set. Using the default value of {} days.",
                DEFAULT_EVENT_RETENTION.num_days()
            )
        })
        .and_then(|s| {
            s.parse::<i64>()
                .map(Duration::days)
                .map_err(|e| warn!("🪛️ Invalid configuration value for LKP_EVENT_RETENTION_DAYS. {e}"))
        })
        .ok()
        .unwrap_or(DEFAULT_EVENT_RETENTION);
    (retry_sweep_interval, event_retention)
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that is used to configure the server's behaviour. Generally we try to keep this
/// as small as possible, and exclude secrets to avoid passing sensitive information around the system.
#[derive(Clone, Copy, Debug)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}
