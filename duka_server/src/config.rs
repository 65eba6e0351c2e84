use std::{env, net::IpAddr, time::Duration};

use duka_common::helpers::{parse_boolean_flag, parse_seconds};
use duka_engine::{PaymentConfig, ReconcilerConfig, SelectionPolicy};
use log::*;
use mpesa_tools::MpesaConfig;

const DEFAULT_DUKA_HOST: &str = "127.0.0.1";
const DEFAULT_DUKA_PORT: u16 = 8370;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/duka_store.db";
const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_RECONCILE_GRACE_PERIOD: Duration = Duration::from_secs(300);
const DEFAULT_RECONCILE_MAX_ATTEMPTS: i64 = 6;
const DEFAULT_PAYMENT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_STATUS_QUERY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_PAYMENT_RETRIES: i64 = 3;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// If supplied, requests against the /mpesa endpoints are only accepted from these addresses.
    pub callback_whitelist: Option<Vec<IpAddr>>,
    /// Time between reconciliation sweeps
    pub reconcile_interval: Duration,
    pub reconciler: ReconcilerConfig,
    pub payments: PaymentConfig,
    pub selection_policy: SelectionPolicy,
    pub mpesa: MpesaConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DUKA_HOST.to_string(),
            port: DEFAULT_DUKA_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            callback_whitelist: None,
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            reconciler: ReconcilerConfig {
                grace_period: DEFAULT_RECONCILE_GRACE_PERIOD,
                max_sweep_attempts: DEFAULT_RECONCILE_MAX_ATTEMPTS,
                query_timeout: DEFAULT_STATUS_QUERY_TIMEOUT,
            },
            payments: PaymentConfig {
                initiation_timeout: DEFAULT_PAYMENT_TIMEOUT,
                max_retries: DEFAULT_MAX_PAYMENT_RETRIES,
            },
            selection_policy: SelectionPolicy::default(),
            mpesa: MpesaConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("DUKA_HOST").ok().unwrap_or_else(|| DEFAULT_DUKA_HOST.into());
        let port = env::var("DUKA_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for DUKA_PORT. {e} Using the default, {DEFAULT_DUKA_PORT}, \
                         instead."
                    );
                    DEFAULT_DUKA_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_DUKA_PORT);
        let database_url = env::var("DUKA_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ DUKA_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("DUKA_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("DUKA_USE_FORWARDED").ok(), false);
        let callback_whitelist = configure_whitelist(env::var("DUKA_CALLBACK_IP_WHITELIST").ok());
        let reconcile_interval = seconds_from_env("DUKA_RECONCILE_INTERVAL", DEFAULT_RECONCILE_INTERVAL);
        let reconciler = ReconcilerConfig {
            grace_period: seconds_from_env("DUKA_RECONCILE_GRACE_PERIOD", DEFAULT_RECONCILE_GRACE_PERIOD),
            max_sweep_attempts: count_from_env("DUKA_RECONCILE_MAX_ATTEMPTS", DEFAULT_RECONCILE_MAX_ATTEMPTS),
            query_timeout: seconds_from_env("DUKA_STATUS_QUERY_TIMEOUT", DEFAULT_STATUS_QUERY_TIMEOUT),
        };
        let payments = PaymentConfig {
            initiation_timeout: seconds_from_env("DUKA_PAYMENT_TIMEOUT", DEFAULT_PAYMENT_TIMEOUT),
            max_retries: count_from_env("DUKA_MAX_PAYMENT_RETRIES", DEFAULT_MAX_PAYMENT_RETRIES),
        };
        let allow_split = parse_boolean_flag(env::var("DUKA_ALLOW_SPLIT_ALLOCATION").ok(), true);
        if !allow_split {
            info!("🪛️ Split allocation is disabled. Each order line must be covered by a single warehouse.");
        }
        let mpesa = MpesaConfig::new_from_env_or_default();
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            use_forwarded,
            callback_whitelist,
            reconcile_interval,
            reconciler,
            payments,
            selection_policy: SelectionPolicy { allow_split },
            mpesa,
        }
    }
}

fn seconds_from_env(name: &str, default: Duration) -> Duration {
    match env::var(name) {
        Err(_) => {
            info!("🪛️ {name} is not set. Using the default value of {}s.", default.as_secs());
            default
        },
        Ok(s) => parse_seconds(&s).unwrap_or_else(|| {
            let default = default.as_secs();
            warn!("🪛️ Invalid configuration value for {name}: '{s}'. Using the default of {default}s.");
            Duration::from_secs(default)
        }),
    }
}

fn count_from_env(name: &str, default: i64) -> i64 {
    match env::var(name).map(|s| (s.trim().parse::<i64>(), s)) {
        Err(_) => {
            info!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
        Ok((Ok(v), _)) if v >= 0 => v,
        Ok((_, s)) => {
            warn!("🪛️ Invalid configuration value for {name}: '{s}'. Using the default of {default}.");
            default
        },
    }
}

/// Parses a comma-separated IP whitelist. "none", "false" and "0" explicitly disable it. Invalid entries are skipped.
pub fn configure_whitelist(value: Option<String>) -> Option<Vec<IpAddr>> {
    let whitelist = value.and_then(|s| {
        if ["none", "false", "0", ""].contains(&s.trim().to_lowercase().as_str()) {
            info!(
                "🪛️ The M-Pesa callback IP whitelist is disabled. If this is not what you want, set \
                 DUKA_CALLBACK_IP_WHITELIST to a comma-separated list of IP addresses to enable it."
            );
            return None;
        }
        let ip_addrs = s
            .split(',')
            .map(str::trim)
            .filter_map(|s| {
                s.parse()
                    .map_err(|e| warn!("🪛️ Ignoring invalid IP address ({s}) in DUKA_CALLBACK_IP_WHITELIST: {e}"))
                    .ok()
            })
            .collect::<Vec<IpAddr>>();
        Some(ip_addrs)
    });
    match &whitelist {
        Some(whitelist) if whitelist.is_empty() => {
            warn!(
                "🚨️ The M-Pesa callback IP whitelist was configured, but is empty. The server will run, but won't \
                 accept any payment notifications."
            );
        },
        None => {
            info!("🪛️ No M-Pesa callback IP whitelist is set. Notifications are accepted from any address.");
        },
        Some(v) => {
            let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
            info!("🪛️ M-Pesa callback IP whitelist: {addrs}");
        },
    }
    whitelist
}
