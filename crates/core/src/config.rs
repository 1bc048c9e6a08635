use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::premium::{default_gst_rate, DEFAULT_SUM_INSURED};

pub const DEFAULT_REGISTRY_PATH: &str = "media/premium_workbooks/premium_workbooks_registry.json";
pub const DEFAULT_COLLECTIONS_ROOT: &str = "media/output/chroma_db";
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
const MAX_ITERATIONS_LIMIT: u32 = 50;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub premium: PremiumConfig,
    pub retrieval: RetrievalConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub api_version: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_iterations: u32,
}

#[derive(Clone, Debug)]
pub struct PremiumConfig {
    pub registry_path: PathBuf,
    pub gst_rate: Decimal,
    pub default_sum_insured: u64,
}

#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    pub collections_root: PathBuf,
    pub default_product: Option<String>,
    pub default_k: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    #[serde(rename = "ollama")]
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::AzureOpenAi => "azure_openai",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub max_iterations: Option<u32>,
    pub registry_path: Option<PathBuf>,
    pub collections_root: Option<PathBuf>,
    pub default_product: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                api_version: None,
                timeout_secs: 60,
                max_retries: 2,
            },
            agent: AgentConfig { max_iterations: DEFAULT_MAX_ITERATIONS },
            premium: PremiumConfig {
                registry_path: PathBuf::from(DEFAULT_REGISTRY_PATH),
                gst_rate: default_gst_rate(),
                default_sum_insured: DEFAULT_SUM_INSURED,
            },
            retrieval: RetrievalConfig {
                collections_root: PathBuf::from(DEFAULT_COLLECTIONS_ROOT),
                default_product: None,
                default_k: 5,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "azure_openai" | "azure" => Ok(Self::AzureOpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|azure_openai|ollama)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("premia.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(api_version) = llm.api_version {
                self.llm.api_version = Some(api_version);
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_iterations) = agent.max_iterations {
                self.agent.max_iterations = max_iterations;
            }
        }

        if let Some(premium) = patch.premium {
            if let Some(registry_path) = premium.registry_path {
                self.premium.registry_path = registry_path;
            }
            if let Some(gst_rate) = premium.gst_rate {
                self.premium.gst_rate = decimal_from_float("premium.gst_rate", gst_rate)?;
            }
            if let Some(default_sum_insured) = premium.default_sum_insured {
                self.premium.default_sum_insured = default_sum_insured;
            }
        }

        if let Some(retrieval) = patch.retrieval {
            if let Some(collections_root) = retrieval.collections_root {
                self.retrieval.collections_root = collections_root;
            }
            if let Some(default_product) = retrieval.default_product {
                self.retrieval.default_product = Some(default_product);
            }
            if let Some(default_k) = retrieval.default_k {
                self.retrieval.default_k = default_k;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PREMIA_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("PREMIA_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PREMIA_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("PREMIA_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("PREMIA_LLM_API_VERSION") {
            self.llm.api_version = Some(value);
        }
        if let Some(value) = read_env("PREMIA_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("PREMIA_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PREMIA_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_env("PREMIA_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("PREMIA_AGENT_MAX_ITERATIONS") {
            self.agent.max_iterations = parse_env("PREMIA_AGENT_MAX_ITERATIONS", &value)?;
        }

        if let Some(value) = read_env("PREMIA_PREMIUM_REGISTRY_PATH") {
            self.premium.registry_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("PREMIA_PREMIUM_GST_RATE") {
            self.premium.gst_rate = parse_env("PREMIA_PREMIUM_GST_RATE", &value)?;
        }
        if let Some(value) = read_env("PREMIA_PREMIUM_DEFAULT_SUM_INSURED") {
            self.premium.default_sum_insured =
                parse_env("PREMIA_PREMIUM_DEFAULT_SUM_INSURED", &value)?;
        }

        if let Some(value) = read_env("PREMIA_RETRIEVAL_COLLECTIONS_ROOT") {
            self.retrieval.collections_root = PathBuf::from(value);
        }
        if let Some(value) = read_env("PREMIA_RETRIEVAL_DEFAULT_PRODUCT") {
            self.retrieval.default_product = Some(value);
        }
        if let Some(value) = read_env("PREMIA_RETRIEVAL_DEFAULT_K") {
            self.retrieval.default_k = parse_env("PREMIA_RETRIEVAL_DEFAULT_K", &value)?;
        }

        let log_level = read_env("PREMIA_LOGGING_LEVEL").or_else(|| read_env("PREMIA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PREMIA_LOGGING_FORMAT").or_else(|| read_env("PREMIA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(max_iterations) = overrides.max_iterations {
            self.agent.max_iterations = max_iterations;
        }
        if let Some(registry_path) = overrides.registry_path {
            self.premium.registry_path = registry_path;
        }
        if let Some(collections_root) = overrides.collections_root {
            self.retrieval.collections_root = collections_root;
        }
        if let Some(default_product) = overrides.default_product {
            self.retrieval.default_product = Some(default_product);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_premium(&self.premium)?;
        validate_retrieval(&self.retrieval)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("premia.toml"), PathBuf::from("config/premia.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    let missing_key =
        llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
    let missing_base_url =
        llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);

    match llm.provider {
        LlmProvider::OpenAi => {
            if missing_key {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::AzureOpenAi => {
            if missing_key || missing_base_url {
                return Err(ConfigError::Validation(
                    "llm.api_key and llm.base_url (the Azure endpoint) are required for the azure_openai provider"
                        .to_string(),
                ));
            }
            let missing_version =
                llm.api_version.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing_version {
                return Err(ConfigError::Validation(
                    "llm.api_version is required for the azure_openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            if missing_base_url {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_iterations == 0 || agent.max_iterations > MAX_ITERATIONS_LIMIT {
        return Err(ConfigError::Validation(format!(
            "agent.max_iterations must be in range 1..={MAX_ITERATIONS_LIMIT}"
        )));
    }
    Ok(())
}

fn validate_premium(premium: &PremiumConfig) -> Result<(), ConfigError> {
    if premium.gst_rate.is_sign_negative() || premium.gst_rate > Decimal::ONE {
        return Err(ConfigError::Validation(
            "premium.gst_rate must be a fraction in range 0..=1 (e.g. 0.18)".to_string(),
        ));
    }
    if premium.default_sum_insured == 0 {
        return Err(ConfigError::Validation(
            "premium.default_sum_insured must be greater than zero".to_string(),
        ));
    }
    if premium.registry_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("premium.registry_path must not be empty".to_string()));
    }
    Ok(())
}

fn validate_retrieval(retrieval: &RetrievalConfig) -> Result<(), ConfigError> {
    if retrieval.default_k == 0 {
        return Err(ConfigError::Validation(
            "retrieval.default_k must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn decimal_from_float(key: &str, value: f64) -> Result<Decimal, ConfigError> {
    Decimal::from_str(&value.to_string())
        .map_err(|_| ConfigError::Validation(format!("{key} must be a decimal number")))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    premium: Option<PremiumPatch>,
    retrieval: Option<RetrievalPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    api_version: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_iterations: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct PremiumPatch {
    registry_path: Option<PathBuf>,
    gst_rate: Option<f64>,
    default_sum_insured: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrievalPatch {
    collections_root: Option<PathBuf>,
    default_product: Option<String>,
    default_k: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
