use std::env;
use std::time::Duration;

pub struct Config {
    pub port: u16,
    pub key_manager_url: String,
    pub backend_url: String,
    pub protected_prefixes: Vec<String>,
    pub cors_origins: Vec<String>,
    pub max_payload_bytes: usize,
    pub key_manager_timeout: Duration,
    pub backend_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            key_manager_url: env::var("KEY_MANAGER_URL")
                .unwrap_or_else(|_| "http://localhost:8004".to_string()),
            backend_url: env::var("BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:5000/generate".to_string()),
            protected_prefixes: split_list(
                &env::var("PROTECTED_PREFIXES").unwrap_or_else(|_| "/api/generate".to_string()),
            ),
            cors_origins: split_list(
                &env::var("CORS_ORIGINS").unwrap_or_else(|_| {
                    "http://localhost:3000,http://localhost:8004".to_string()
                }),
            ),
            max_payload_bytes: env::var("MAX_PAYLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(26_214_400), // 25 MiB
            key_manager_timeout: seconds("KEY_MANAGER_TIMEOUT_SECS", 10),
            backend_timeout: seconds("BACKEND_TIMEOUT_SECS", 300),
        }
    }
}

fn seconds(var: &str, default: u64) -> Duration {
    Duration::from_secs(
        env::var(var)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
