//! Environment-driven configuration.
//!
//! Every knob has a default; nothing requires a config file. CLI flags
//! override individual values after loading.

use crate::automation::EngineTimings;
use crate::detection::provider::ProviderSettings;
use crate::scheduler::SchedulerConfig;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_UPLOAD_DIR: &str = "./uploads";
const DEFAULT_BROWSER_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_CONCURRENT: usize = 3;
const DEFAULT_POLL_SECS: u64 = 30;
const DEFAULT_RETRY_COOLDOWN_SECS: u64 = 3600;
const DEFAULT_PACING_MIN_SECS: u64 = 30;
const DEFAULT_PACING_MAX_SECS: u64 = 90;
const DEFAULT_ERROR_BACKOFF_SECS: u64 = 60;

/// Full agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub providers: ProviderSettings,
    pub browser_headless: bool,
    pub browser_timeout_ms: u64,
    pub chromium_path: Option<PathBuf>,
    pub demo_mode: bool,
    pub upload_dir: PathBuf,
    pub db_path: PathBuf,
    pub scheduler: SchedulerConfig,
    pub timings: EngineTimings,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        let upload_dir = PathBuf::from(
            read_env_string("UPLOAD_DIR")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string()),
        );
        let db_path = read_env_string("LISTING_DB_PATH")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| upload_dir.join("listing-agent.db"));

        let browser_timeout_ms = read_env_u64("BROWSER_TIMEOUT", DEFAULT_BROWSER_TIMEOUT_MS);

        let pacing_min = read_env_u64("LISTING_PACING_MIN_SECS", DEFAULT_PACING_MIN_SECS);
        let pacing_max = read_env_u64("LISTING_PACING_MAX_SECS", DEFAULT_PACING_MAX_SECS)
            .max(pacing_min);

        let scheduler = SchedulerConfig {
            max_concurrent: read_env_usize("MAX_CONCURRENT_SUBMISSIONS", DEFAULT_MAX_CONCURRENT)
                .max(1),
            poll_interval: Duration::from_secs(
                read_env_u64("LISTING_POLL_SECS", DEFAULT_POLL_SECS).max(1),
            ),
            retry_cooldown: Duration::from_secs(read_env_u64(
                "LISTING_RETRY_COOLDOWN_SECS",
                DEFAULT_RETRY_COOLDOWN_SECS,
            )),
            pacing_min: Duration::from_secs(pacing_min),
            pacing_max: Duration::from_secs(pacing_max),
            error_backoff: Duration::from_secs(read_env_u64(
                "LISTING_ERROR_BACKOFF_SECS",
                DEFAULT_ERROR_BACKOFF_SECS,
            )),
        };

        let timings = EngineTimings {
            navigation_timeout: Duration::from_millis(browser_timeout_ms),
            ..EngineTimings::default()
        };

        Self {
            providers: ProviderSettings::from_env(),
            browser_headless: read_env_bool("BROWSER_HEADLESS", true),
            browser_timeout_ms,
            chromium_path: read_env_string("LISTING_CHROMIUM_PATH")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            demo_mode: read_env_bool("DEMO_MODE", false),
            upload_dir,
            db_path,
            scheduler,
            timings,
        }
    }

    /// Path of the JSONL activity log.
    pub fn activity_log_path(&self) -> PathBuf {
        self.upload_dir.join("activity.jsonl")
    }
}

pub(crate) fn read_env_u64(name: &str, default_value: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_value)
}

pub(crate) fn read_env_usize(name: &str, default_value: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default_value)
}

pub(crate) fn read_env_bool(name: &str, default_value: bool) -> bool {
    match read_env_string(name) {
        Some(v) => parse_bool(&v).unwrap_or(default_value),
        None => default_value,
    }
}

pub(crate) fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" yes "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_unset_env_uses_defaults() {
        assert_eq!(read_env_u64("LISTING_TEST_SURELY_UNSET_U64", 7), 7);
        assert_eq!(read_env_usize("LISTING_TEST_SURELY_UNSET_USIZE", 3), 3);
        assert!(read_env_bool("LISTING_TEST_SURELY_UNSET_BOOL", true));
    }
}
