use std::env;

use chrono::Duration;
use log::*;
use storefront_common::{parse_boolean_flag, Secret};

const DEFAULT_SFS_HOST: &str = "127.0.0.1";
const DEFAULT_SFS_PORT: u16 = 8360;
const DEFAULT_IDENTITY_HEADER: &str = "x-verified-user-id";
const DEFAULT_STUCK_ORDER_TIMEOUT: Duration = Duration::hours(2);
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_DISPATCHER_BATCH_SIZE: usize = 20;
const DEFAULT_DISPATCHER_POLL_SECS: u64 = 5;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The header the fronting identity-aware proxy injects with the verified, opaque user id. The server trusts
    /// this value and never re-derives identity itself.
    pub identity_header: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address for access logging,
    /// rather than the connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address for access logging.
    pub use_forwarded: bool,
    /// How long an online order may sit in `AwaitingPayment` before the reconciliation sweep asks the provider
    /// what happened to it.
    pub stuck_order_timeout: Duration,
    /// How often the reconciliation sweep runs.
    pub sweep_interval_secs: u64,
    /// Outbox dispatcher tuning.
    pub dispatcher_batch_size: usize,
    pub dispatcher_poll_secs: u64,
    /// Hosted payment provider configuration.
    pub provider: ProviderConfig,
}

#[derive(Clone, Debug, Default)]
pub struct ProviderConfig {
    /// Base URL of the provider's REST API, e.g. "https://api.payments.example.com".
    pub api_url: String,
    /// The API secret used as a bearer token on outbound calls.
    pub secret_key: Secret<String>,
    /// The shared secret the provider signs webhook bodies with.
    pub webhook_secret: Secret<String>,
    /// When false, webhook signature checks are skipped. **DANGER**: only ever disable this in local development.
    pub signature_checks: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SFS_HOST.to_string(),
            port: DEFAULT_SFS_PORT,
            database_url: String::default(),
            identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            stuck_order_timeout: DEFAULT_STUCK_ORDER_TIMEOUT,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            dispatcher_batch_size: DEFAULT_DISPATCHER_BATCH_SIZE,
            dispatcher_poll_secs: DEFAULT_DISPATCHER_POLL_SECS,
            provider: ProviderConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SFS_HOST").ok().unwrap_or_else(|| DEFAULT_SFS_HOST.into());
        let port = env::var("SFS_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for SFS_PORT. {e} Using the default, {DEFAULT_SFS_PORT}, \
                         instead."
                    );
                    DEFAULT_SFS_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_SFS_PORT);
        let database_url = env::var("SFS_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SFS_DATABASE_URL is not set. Please set it to the URL for the storefront database.");
            String::default()
        });
        let identity_header =
            env::var("SFS_IDENTITY_HEADER").ok().unwrap_or_else(|| DEFAULT_IDENTITY_HEADER.to_string());
        let use_x_forwarded_for = parse_boolean_flag(env::var("SFS_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("SFS_USE_FORWARDED").ok(), false);
        let stuck_order_timeout = env::var("SFS_STUCK_ORDER_TIMEOUT_MINUTES")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Duration::minutes)
            .unwrap_or(DEFAULT_STUCK_ORDER_TIMEOUT);
        let sweep_interval_secs = env::var("SFS_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
        let dispatcher_batch_size = env::var("SFS_DISPATCHER_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_DISPATCHER_BATCH_SIZE);
        let dispatcher_poll_secs = env::var("SFS_DISPATCHER_POLL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_DISPATCHER_POLL_SECS);
        let provider = ProviderConfig::from_env_or_defaults();
        Self {
            host,
            port,
            database_url,
            identity_header,
            use_x_forwarded_for,
            use_forwarded,
            stuck_order_timeout,
            sweep_interval_secs,
            dispatcher_batch_size,
            dispatcher_poll_secs,
            provider,
        }
    }
}

impl ProviderConfig {
    pub fn from_env_or_defaults() -> Self {
        let api_url = env::var("SFS_PROVIDER_API_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SFS_PROVIDER_API_URL is not set. Please set it to your payment provider's API base URL.");
            String::default()
        });
        let secret_key = env::var("SFS_PROVIDER_SECRET_KEY").ok().unwrap_or_else(|| {
            error!("🪛️ SFS_PROVIDER_SECRET_KEY is not set. Outbound provider calls will be rejected.");
            String::default()
        });
        let webhook_secret = env::var("SFS_PROVIDER_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ SFS_PROVIDER_WEBHOOK_SECRET is not set. Please set it to the webhook signing secret from your \
                 payment provider's dashboard."
            );
            String::default()
        });
        let signature_checks = parse_boolean_flag(env::var("SFS_PROVIDER_SIGNATURE_CHECKS").ok(), true);
        if !signature_checks {
            warn!("🪛️ Webhook signature checks are DISABLED. Unverified payloads will be processed. Never run like \
                   this in production.");
        }
        Self {
            api_url,
            secret_key: Secret::new(secret_key),
            webhook_secret: Secret::new(webhook_secret),
            signature_checks,
        }
    }
}
