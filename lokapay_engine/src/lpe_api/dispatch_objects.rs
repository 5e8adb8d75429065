use std::{env, fmt::Display, str::FromStr, time::Duration as StdDuration};

use chrono::Duration;
use log::warn;
use lokapay_common::Secret;
use serde::{Deserialize, Deserializer};

pub const DEFAULT_MAX_ATTEMPTS: i64 = 5;
pub const DEFAULT_RETRY_DELAYS: [i64; 4] = [60, 300, 1800, 7200];
pub const DEFAULT_DELIVERY_TIMEOUT_SECONDS: u64 = 30;

//--------------------------------------  SubscriberEndpoint  --------------------------------------------------------

/// A webhook subscriber, as configured in the `LKP_WEBHOOK_ENDPOINTS` JSON array.
///
/// ```json
/// [{"url": "https://example.com/hooks", "secret": "whsec_abc", "events": ["payment.completed"]}]
/// ```
///
/// An empty (or omitted) `events` list subscribes the endpoint to every event type.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberEndpoint {
    pub url: String,
    /// Shared HMAC secret for signing payloads delivered to this endpoint.
    #[serde(deserialize_with = "secret_string")]
    pub secret: Secret<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub events: Vec<String>,
}

impl SubscriberEndpoint {
    pub fn new(url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { url: url.into(), secret: Secret::new(secret.into()), enabled: true, events: Vec::new() }
    }

    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = events.into_iter().map(Into::into).collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.events.is_empty() || self.events.iter().any(|e| e == event_type)
    }
}

fn secret_string<'de, D>(deserializer: D) -> Result<Secret<String>, D::Error>
where D: Deserializer<'de> {
    String::deserialize(deserializer).map(Secret::new)
}

fn enabled_by_default() -> bool {
    true
}

//--------------------------------------     RetryPolicy      --------------------------------------------------------

/// How often and how long a failing delivery is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of delivery attempts, the immediate one included.
    pub max_attempts: i64,
    /// Backoff table. The entry at `attempt_count - 1` spaces the next attempt; the last entry
    /// is reused when the attempt history outruns the table.
    pub delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delays: DEFAULT_RETRY_DELAYS.iter().map(|s| Duration::seconds(*s)).collect(),
        }
    }
}

impl RetryPolicy {
    /// The wait before the next attempt, given the number of attempts already made.
    pub fn delay_for(&self, attempts_made: i64) -> Duration {
        if self.delays.is_empty() {
            return Duration::seconds(DEFAULT_RETRY_DELAYS[0]);
        }
        let index = attempts_made.saturating_sub(1).max(0) as usize;
        self.delays[index.min(self.delays.len() - 1)]
    }
}

//--------------------------------------   DispatcherConfig   --------------------------------------------------------

/// Configuration for the webhook dispatcher: who to notify, how to back off, and how long to
/// wait on each attempt.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub endpoints: Vec<SubscriberEndpoint>,
    pub policy: RetryPolicy,
    /// Hard deadline on every outbound delivery attempt.
    pub timeout: StdDuration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            policy: RetryPolicy::default(),
            timeout: StdDuration::from_secs(DEFAULT_DELIVERY_TIMEOUT_SECONDS),
        }
    }
}

impl DispatcherConfig {
    pub fn from_env_or_default() -> Self {
        let endpoints = match env::var("LKP_WEBHOOK_ENDPOINTS") {
            Ok(json) => match serde_json::from_str::<Vec<SubscriberEndpoint>>(&json) {
                Ok(endpoints) => endpoints,
                Err(e) => {
                    warn!("🪛️ LKP_WEBHOOK_ENDPOINTS could not be parsed ({e}). No webhooks will be delivered.");
                    Vec::new()
                },
            },
            Err(_) => {
                warn!("🪛️ LKP_WEBHOOK_ENDPOINTS is not set. No webhooks will be delivered.");
                Vec::new()
            },
        };
        let max_attempts = env_parse_or("LKP_WEBHOOK_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS);
        let delays = retry_delays_from_env();
        let timeout = StdDuration::from_secs(env_parse_or("LKP_WEBHOOK_TIMEOUT", DEFAULT_DELIVERY_TIMEOUT_SECONDS));
        Self { endpoints, policy: RetryPolicy { max_attempts, delays }, timeout }
    }

    pub fn with_endpoint(mut self, endpoint: SubscriberEndpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// The configured endpoint a stored delivery row points at, if it is still configured.
    pub fn endpoint_for_url(&self, url: &str) -> Option<&SubscriberEndpoint> {
        self.endpoints.iter().find(|ep| ep.url == url)
    }

    /// Enabled endpoints subscribed to the given event type.
    pub fn endpoints_for_event(&self, event_type: &str) -> Vec<&SubscriberEndpoint> {
        self.endpoints.iter().filter(|ep| ep.enabled && ep.subscribes_to(event_type)).collect()
    }
}

/// `LKP_WEBHOOK_RETRY_DELAYS` is a comma-separated list of seconds, e.g. `60,300,1800,7200`.
/// Invalid entries are skipped with a warning; an empty result falls back to the default table.
fn retry_delays_from_env() -> Vec<Duration> {
    let Ok(csv) = env::var("LKP_WEBHOOK_RETRY_DELAYS") else {
        return RetryPolicy::default().delays;
    };
    let delays = csv
        .split(',')
        .filter_map(|entry| match entry.trim().parse::<i64>() {
            Ok(secs) if secs > 0 => Some(Duration::seconds(secs)),
            _ => {
                warn!("🪛️ Ignoring invalid entry in LKP_WEBHOOK_RETRY_DELAYS: '{entry}'");
                None
            },
        })
        .collect::<Vec<Duration>>();
    if delays.is_empty() {
        warn!("🪛️ LKP_WEBHOOK_RETRY_DELAYS contained no usable entries. Using the default backoff table.");
        return RetryPolicy::default().delays;
    }
    delays
}

fn env_parse_or<T>(var: &str, default: T) -> T
where T: FromStr + Display {
    match env::var(var) {
        Ok(v) => v.parse::<T>().unwrap_or_else(|_| {
            warn!("🪛️ {var} ('{v}') could not be parsed. Using the default, {default}.");
            default
        }),
        Err(_) => default,
    }
}
