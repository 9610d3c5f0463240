use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result, bail};

use crate::{
    poller::{DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL},
    proximity::DEFAULT_PROXIMITY_THRESHOLD_M,
};

/// Tracker behaviour knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Radius within which a key point counts as reached, in meters.
    pub proximity_threshold_m: f64,

    /// Let a start through when the purchase gate cannot be reached.
    pub allow_start_when_gate_unavailable: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            proximity_threshold_m: DEFAULT_PROXIMITY_THRESHOLD_M,
            allow_start_when_gate_unavailable: false,
        }
    }
}

impl TrackerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn proximity_threshold_m(mut self, meters: f64) -> Self {
        self.proximity_threshold_m = meters;
        self
    }

    pub fn allow_start_when_gate_unavailable(mut self, allow: bool) -> Self {
        self.allow_start_when_gate_unavailable = allow;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseBackend {
    /// Entitlements come from this process's own cart.
    Local,
    /// Entitlements come from a remote cart service.
    Http { base_url: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub tracker: TrackerConfig,
    pub purchase_backend: PurchaseBackend,
    pub http_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let bind_addr = var("TOUR_BIND_ADDR", "127.0.0.1:8080")
            .parse::<SocketAddr>()
            .context("TOUR_BIND_ADDR must be a valid host:port")?;

        let proximity_threshold_m = var(
            "TOUR_PROXIMITY_METERS",
            &DEFAULT_PROXIMITY_THRESHOLD_M.to_string(),
        )
        .parse::<f64>()
        .context("TOUR_PROXIMITY_METERS must be a number")?;
        if !proximity_threshold_m.is_finite() || proximity_threshold_m <= 0.0 {
            bail!("TOUR_PROXIMITY_METERS must be positive, got {proximity_threshold_m}");
        }

        let http_timeout = http_timeout(&lookup)?;

        let allow_start = parse_bool(&var("TOUR_ALLOW_START_WHEN_GATE_UNAVAILABLE", "false"))
            .context("TOUR_ALLOW_START_WHEN_GATE_UNAVAILABLE must be true or false")?;

        let purchase_backend = match var("TOUR_PURCHASE_BACKEND", "local").as_str() {
            "local" => PurchaseBackend::Local,
            "http" => {
                let base_url = lookup("TOUR_CART_SERVICE_URL")
                    .context("TOUR_CART_SERVICE_URL is required when TOUR_PURCHASE_BACKEND=http")?;
                PurchaseBackend::Http { base_url }
            }
            other => bail!("TOUR_PURCHASE_BACKEND must be local or http, got {other}"),
        };

        Ok(Self {
            bind_addr,
            tracker: TrackerConfig::new()
                .proximity_threshold_m(proximity_threshold_m)
                .allow_start_when_gate_unavailable(allow_start),
            purchase_backend,
            http_timeout,
        })
    }
}

/// Settings of the `track` client: where the service runs and how often the
/// position is reported.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingConfig {
    pub server_url: String,
    pub poll_interval: Duration,
    pub http_timeout: Duration,
}

impl TrackingConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let server_url =
            lookup("TOUR_SERVER_URL").unwrap_or_else(|| "http://127.0.0.1:8080".to_string());

        let poll_secs = match lookup("TOUR_POLL_INTERVAL_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .context("TOUR_POLL_INTERVAL_SECS must be u64")?,
            None => DEFAULT_POLL_INTERVAL.as_secs(),
        };
        let poll_interval = Duration::from_secs(poll_secs);
        if poll_interval < MIN_POLL_INTERVAL {
            bail!("TOUR_POLL_INTERVAL_SECS must be at least {}", MIN_POLL_INTERVAL.as_secs());
        }

        Ok(Self {
            server_url,
            poll_interval,
            http_timeout: http_timeout(&lookup)?,
        })
    }

    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

fn http_timeout(lookup: &impl Fn(&str) -> Option<String>) -> Result<Duration> {
    let millis = match lookup("TOUR_HTTP_TIMEOUT_MS") {
        Some(raw) => raw
            .parse::<u64>()
            .context("TOUR_HTTP_TIMEOUT_MS must be u64")?,
        None => 5000,
    };
    Ok(Duration::from_millis(millis))
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => bail!("not a boolean: {other}"),
    }
}
