//! Daemon configuration
//!
//! Layered with the `config` crate: built-in defaults, then the config file
//! (`BOOKGEN_CONFIG` or `~/.bookgen/bookgen.toml`, optional), then
//! `BOOKGEN_*` environment variables with `__` between sections,
//! e.g. `BOOKGEN_RPC__PORT=9800`.

use anyhow::{Context, Result};
use bookgen_core::application::RecoveryMode;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "~/.bookgen/bookgen.toml";
const ENV_PREFIX: &str = "BOOKGEN";

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    pub database: DatabaseConfig,
    pub rpc: RpcConfig,
    pub scheduler: SchedulerSection,
    pub generator: GeneratorSection,
    pub output: OutputConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    pub default_concurrency: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub attempt_timeout_ms: u64,
    /// "resume" or "fail"
    pub recovery: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorSection {
    pub endpoints: Vec<String>,
    pub models: Vec<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub api_version: String,
    pub cost_per_1k_tokens: f64,
    pub requests_per_minute: u32,
    pub burst: u32,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub dir: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplatesConfig {
    /// Extra templates (TOML), merged over the built-in catalog
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// "pretty" or "json"
    pub format: String,
}

impl DaemonConfig {
    /// Load from the default sources.
    pub fn load() -> Result<Self> {
        let path = std::env::var("BOOKGEN_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Some(Path::new(&expand(&path))))
    }

    /// Load with an explicit config file (missing file is not an error).
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("database.path", "~/.bookgen/bookgen.db")?
            .set_default("rpc.host", "127.0.0.1")?
            .set_default("rpc.port", 9737)?
            .set_default("scheduler.default_concurrency", 10)?
            .set_default("scheduler.max_retries", 3)?
            .set_default("scheduler.retry_delay_ms", 2000)?
            .set_default("scheduler.attempt_timeout_ms", 120_000)?
            .set_default("scheduler.recovery", "resume")?
            .set_default(
                "generator.endpoints",
                vec![bookgen_infra_system::http_generator::DEFAULT_ENDPOINT],
            )?
            .set_default(
                "generator.models",
                vec![bookgen_infra_system::http_generator::DEFAULT_MODEL],
            )?
            .set_default("generator.api_key_env", "ANTHROPIC_API_KEY")?
            .set_default(
                "generator.api_version",
                bookgen_infra_system::http_generator::DEFAULT_API_VERSION,
            )?
            .set_default("generator.cost_per_1k_tokens", 0.0)?
            .set_default("generator.requests_per_minute", 50)?
            .set_default("generator.burst", 10)?
            .set_default("generator.request_timeout_ms", 120_000)?
            .set_default("output.dir", "~/.bookgen/books")?
            .set_default("log.format", "pretty")?;

        if let Some(file) = file {
            builder = builder.add_source(File::from(file).required(false));
        }

        let config: DaemonConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("generator.endpoints")
                    .with_list_parse_key("generator.models")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.recovery_mode()?;
        if self.generator.endpoints.is_empty() || self.generator.models.is_empty() {
            anyhow::bail!("generator.endpoints and generator.models must not be empty");
        }
        if !matches!(self.log.format.as_str(), "pretty" | "json") {
            anyhow::bail!("log.format must be 'pretty' or 'json' (got '{}')", self.log.format);
        }
        Ok(())
    }

    pub fn recovery_mode(&self) -> Result<RecoveryMode> {
        match self.scheduler.recovery.as_str() {
            "resume" => Ok(RecoveryMode::Resume),
            "fail" => Ok(RecoveryMode::Fail),
            other => anyhow::bail!("scheduler.recovery must be 'resume' or 'fail' (got '{}')", other),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(expand(&self.database.path))
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(expand(&self.output.dir))
    }

    pub fn templates_path(&self) -> Option<PathBuf> {
        self.templates.path.as_deref().map(|p| PathBuf::from(expand(p)))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.scheduler.retry_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.scheduler.attempt_timeout_ms)
    }

    /// API key from the configured environment variable, if set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.generator.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }
}

fn expand(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}
