//! Environment-driven configuration (SPEC_FULL.md §A.2). The protocol core
//! takes no configuration of its own beyond the CORS setter (spec.md §6);
//! everything here is ambient server wiring.

use std::env;

pub struct ServerConfig {
    pub bind_addr: String,
    pub log_level: String,
    pub bind_path: String,
    pub test_path: String,
    pub host_prefixes: Vec<String>,
    pub cors_origin_regex: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned()),
            bind_path: env::var("BC_BIND_PATH").unwrap_or_else(|_| "bind".to_owned()),
            test_path: env::var("BC_TEST_PATH").unwrap_or_else(|_| "test".to_owned()),
            host_prefixes: env::var("BC_HOST_PREFIXES")
                .ok()
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            cors_origin_regex: env::var("BC_CORS_ORIGIN_REGEX").ok(),
        }
    }
}
