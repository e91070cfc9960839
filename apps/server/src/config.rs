use std::{net::SocketAddr, time::Duration};

/// Server configuration read from `TS_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: String,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    pub scheduler_enabled: bool,
    pub nomenclature_interval: Duration,
    pub stock_interval: Duration,
    pub health_check_interval: Duration,
    pub ws_ping_interval: Duration,
    pub sync_log_retention_days: i64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}='{}'", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(env_or(key, default).max(1))
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let listen_addr = env_or(
            "TS_LISTEN_ADDR",
            SocketAddr::from(([0, 0, 0, 0], 8080)),
        );
        let db_path = std::env::var("TS_DB_PATH").unwrap_or_else(|_| "./db/tradeos.db".into());
        let cors_allow = std::env::var("TS_CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let timeout_ms: u64 = env_or("TS_REQUEST_TIMEOUT_MS", 30_000);

        Self {
            listen_addr,
            db_path,
            cors_allow,
            request_timeout: Duration::from_millis(timeout_ms),
            scheduler_enabled: env_or("TS_SCHEDULER_ENABLED", true),
            nomenclature_interval: secs("TS_SYNC_NOMENCLATURE_INTERVAL_SECS", 3600),
            stock_interval: secs("TS_SYNC_STOCK_INTERVAL_SECS", 900),
            health_check_interval: secs("TS_HEALTH_CHECK_INTERVAL_SECS", 300),
            ws_ping_interval: secs("TS_WS_PING_INTERVAL_SECS", 20),
            sync_log_retention_days: env_or("TS_SYNC_LOG_RETENTION_DAYS", 30_i64).max(1),
        }
    }
}
