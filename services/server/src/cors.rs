//! Cross-domain configuration: an origin regex plus a list of host prefixes
//! for sharded cross-domain clients (spec.md §6).

use axum::http::{HeaderMap, HeaderValue};
use rand::seq::SliceRandom;
use regex::Regex;

pub struct CorsConfig {
    origin_regex: Option<Regex>,
    host_prefixes: Vec<String>,
}

impl CorsConfig {
    pub fn new(origin_regex_source: Option<&str>, host_prefixes: Vec<String>) -> Result<Self, regex::Error> {
        let origin_regex = origin_regex_source.map(Regex::new).transpose()?;
        Ok(Self { origin_regex, host_prefixes })
    }

    pub fn matches(&self, origin: &str) -> bool {
        self.origin_regex
            .as_ref()
            .is_some_and(|re| re.is_match(origin))
    }

    /// A randomly chosen prefix from the configured set, or empty if none
    /// are configured (spec.md §4.6 test sub-handler, §4.3 initial array).
    pub fn random_host_prefix(&self) -> String {
        self.host_prefixes
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default()
    }

    /// Echoes `Access-Control-Allow-Origin`/`-Credentials` when `origin`
    /// matches the configured regex. A no-op otherwise.
    pub fn apply_headers(&self, origin: Option<&str>, headers: &mut HeaderMap) {
        let Some(origin) = origin else { return };
        if !self.matches(origin) {
            return;
        }
        if let Ok(value) = HeaderValue::from_str(origin) {
            headers.insert("Access-Control-Allow-Origin", value);
            headers.insert("Access-Control-Allow-Credentials", HeaderValue::from_static("true"));
        }
    }
}
