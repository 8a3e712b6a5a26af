//! Loader for adverify configuration with YAML + environment overlays.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults (every section is optional)
//! 2. a YAML/TOML/JSON file (`with_file` / `with_optional_file`)
//! 3. `ADVERIFY__SECTION__KEY` environment variables, e.g.
//!    `ADVERIFY__LLM__MODEL=gemini-1.5-pro`
//!
//! After merging, any string containing `$VAR` or `${VAR}` is expanded from
//! the process environment, so secrets can stay out of the file:
//!
//! ```yaml
//! llm:
//!   provider: gemini
//!   api_key: "${GEMINI_API_KEY}"
//! scrape:
//!   timeout_secs: 10
//! verify:
//!   max_source_chars: 30000
//! log:
//!   format: json
//! ```
use adverify_common::observability::{LogConfig, LogFormat};
use adverify_common::{
    BROWSER_USER_AGENT, DEFAULT_MAX_SOURCE_CHARS, DEFAULT_SCRAPE_TIMEOUT_SECS, GEMINI_ENDPOINT,
    LlmConfig,
};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const ENV_PREFIX: &str = "ADVERIFY";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AdverifyConfig {
    pub version: Option<String>,
    pub llm: LlmSettings,
    pub scrape: ScrapeSettings,
    pub verify: VerifySettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: Provider,
    pub api_key: Option<String>,
    /// Fixed model id; when unset the provider catalog is consulted.
    pub model: Option<String>,
    pub endpoint: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: Provider::Gemini,
            api_key: None,
            model: None,
            endpoint: GEMINI_ENDPOINT.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}

impl LlmSettings {
    /// Runtime provider config. A missing key becomes an empty string and is
    /// rejected later as missing input.
    pub fn to_llm_config(&self) -> LlmConfig {
        match self.provider {
            Provider::Gemini => LlmConfig::Gemini {
                api_key: self.api_key.clone().unwrap_or_default(),
                model: self.model.clone(),
                base_url: (self.endpoint != GEMINI_ENDPOINT).then(|| self.endpoint.clone()),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScrapeSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SCRAPE_TIMEOUT_SECS,
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }
}

impl ScrapeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VerifySettings {
    pub max_source_chars: usize,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            max_source_chars: DEFAULT_MAX_SOURCE_CHARS,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub format: LogFormat,
    pub filter: String,
    pub dir: Option<PathBuf>,
    pub stderr: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            filter: "info".to_string(),
            dir: None,
            stderr: false,
        }
    }
}

impl LogSettings {
    pub fn to_log_config(&self, app_name: &'static str) -> LogConfig {
        LogConfig {
            app_name,
            log_dir: self.dir.clone(),
            emit_stderr: self.stderr,
            format: self.format,
            default_filter: self.filter.clone(),
        }
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) if s.contains('$') => {
            let mut cur = std::mem::take(s);
            for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                let expanded = match shellexpand::env(&cur) {
                    Ok(cow) => cow.into_owned(),
                    Err(_) => break,
                };
                if expanded == cur {
                    break;
                }
                cur = expanded;
            }
            *s = cur;
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hiding the `config` crate wiring (file + env overrides).
pub struct AdverifyConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for AdverifyConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AdverifyConfigLoader {
    /// Start from defaults; `ADVERIFY__` env overrides are always applied last.
    ///
    /// ```
    /// use adverify_config::AdverifyConfigLoader;
    ///
    /// let config = AdverifyConfigLoader::new().load().expect("defaults load");
    /// assert_eq!(config.verify.max_source_chars, 30_000);
    /// assert_eq!(config.scrape.timeout_secs, 10);
    /// assert!(config.llm.model.is_none());
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a config file that must exist; format is inferred from the suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a config file that is skipped when absent.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use adverify_config::AdverifyConfigLoader;
    ///
    /// let cfg = AdverifyConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// version: "test"
    /// llm:
    ///   model: "gemini-1.5-flash"
    /// verify:
    ///   max_source_chars: 500
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.version.as_deref(), Some("test"));
    /// assert_eq!(cfg.llm.model.as_deref(), Some("gemini-1.5-flash"));
    /// assert_eq!(cfg.verify.max_source_chars, 500);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Merge all sources, expand `${VAR}` placeholders, and deserialize.
    ///
    /// ```
    /// use adverify_config::AdverifyConfigLoader;
    /// use adverify_common::LlmConfig;
    ///
    /// unsafe { std::env::set_var("DOCTEST_GEMINI_KEY", "injected-from-env"); }
    ///
    /// let config = AdverifyConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// llm:
    ///   provider: gemini
    ///   api_key: "${DOCTEST_GEMINI_KEY}"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// match config.llm.to_llm_config() {
    ///     LlmConfig::Gemini { api_key, model, base_url } => {
    ///         assert_eq!(api_key, "injected-from-env");
    ///         assert!(model.is_none());
    ///         assert!(base_url.is_none());
    ///     }
    ///     other => panic!("unexpected {other:?}"),
    /// }
    ///
    /// unsafe { std::env::remove_var("DOCTEST_GEMINI_KEY"); }
    /// ```
    pub fn load(self) -> Result<AdverifyConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))
    }
}
