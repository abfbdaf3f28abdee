use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

const ENV_PREFIX: &str = "CATALOGUE";
const CONFIG_FILE: &str = "catalogue";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub courses_path: PathBuf,
    pub programs_path: PathBuf,
    pub processed_path: PathBuf,
    pub fetch: FetchSettings,
    pub llm: LlmSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub concurrency: usize,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub endpoint: String,
    pub concurrency: usize,
    pub retry_attempts: u32,
    pub initial_retry_delay_secs: u64,
    pub request_timeout_secs: u64,
    pub checkpoint_every: usize,
    pub prompt_template: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: "https://coursecatalogue.mcgill.ca".into(),
            courses_path: "data/courses_raw.json".into(),
            programs_path: "data/programs.json".into(),
            processed_path: "data/courses_processed.json".into(),
            fetch: FetchSettings::default(),
            llm: LlmSettings::default(),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            concurrency: 10,
            max_retries: 3,
            base_backoff_ms: 2000,
            timeout_secs: 30,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        LlmSettings {
            model: "gemini-2.0-flash".into(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".into(),
            concurrency: 14,
            retry_attempts: 3,
            initial_retry_delay_secs: 5,
            request_timeout_secs: 60,
            checkpoint_every: 25,
            prompt_template: None,
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LlmSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Settings {
    /// Defaults, then `catalogue.toml` if present, then `CATALOGUE_*` env vars
    /// (`__` separates nested keys, e.g. `CATALOGUE_LLM__CONCURRENCY`).
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        let mut settings: Settings = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        settings.llm.concurrency = settings.llm.concurrency.max(1);
        settings.llm.retry_attempts = settings.llm.retry_attempts.max(1);
        settings.llm.checkpoint_every = settings.llm.checkpoint_every.max(1);
        settings.fetch.concurrency = settings.fetch.concurrency.max(1);
        Ok(settings)
    }
}

/// Secret keys are read straight from the environment, never from files.
pub fn api_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|k| !k.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.llm.concurrency, 14);
        assert_eq!(s.llm.retry_attempts, 3);
        assert_eq!(s.llm.checkpoint_every, 25);
        assert_eq!(s.llm.request_timeout(), Duration::from_secs(60));
        assert_eq!(s.fetch.concurrency, 10);
        assert_eq!(s.courses_path, PathBuf::from("data/courses_raw.json"));
    }

    #[test]
    fn partial_sources_keep_defaults() {
        let cfg = Config::builder()
            .set_override("llm.model", "gemini-2.5-flash")
            .unwrap()
            .set_override("fetch.concurrency", 4)
            .unwrap()
            .build()
            .unwrap();
        let s: Settings = cfg.try_deserialize().unwrap();
        assert_eq!(s.llm.model, "gemini-2.5-flash");
        assert_eq!(s.llm.retry_attempts, 3);
        assert_eq!(s.fetch.concurrency, 4);
        assert_eq!(s.base_url, "https://coursecatalogue.mcgill.ca");
    }
}
