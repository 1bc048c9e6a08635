use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use premia_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run(options: LoadOptions) -> String {
    let explicit_path = options.config_path.clone();
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(explicit_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let unset = || "<unset>".to_string();

    let fields: Vec<(&str, String, Vec<&str>)> = vec![
        ("llm.provider", config.llm.provider.as_str().to_string(), vec!["PREMIA_LLM_PROVIDER"]),
        ("llm.model", config.llm.model.clone(), vec!["PREMIA_LLM_MODEL"]),
        ("llm.base_url", config.llm.base_url.clone().unwrap_or_else(unset), vec!["PREMIA_LLM_BASE_URL"]),
        (
            "llm.api_version",
            config.llm.api_version.clone().unwrap_or_else(unset),
            vec!["PREMIA_LLM_API_VERSION"],
        ),
        ("llm.api_key", api_key, vec!["PREMIA_LLM_API_KEY"]),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string(), vec!["PREMIA_LLM_TIMEOUT_SECS"]),
        ("llm.max_retries", config.llm.max_retries.to_string(), vec!["PREMIA_LLM_MAX_RETRIES"]),
        (
            "agent.max_iterations",
            config.agent.max_iterations.to_string(),
            vec!["PREMIA_AGENT_MAX_ITERATIONS"],
        ),
        (
            "premium.registry_path",
            config.premium.registry_path.display().to_string(),
            vec!["PREMIA_PREMIUM_REGISTRY_PATH"],
        ),
        ("premium.gst_rate", config.premium.gst_rate.to_string(), vec!["PREMIA_PREMIUM_GST_RATE"]),
        (
            "premium.default_sum_insured",
            config.premium.default_sum_insured.to_string(),
            vec!["PREMIA_PREMIUM_DEFAULT_SUM_INSURED"],
        ),
        (
            "retrieval.collections_root",
            config.retrieval.collections_root.display().to_string(),
            vec!["PREMIA_RETRIEVAL_COLLECTIONS_ROOT"],
        ),
        (
            "retrieval.default_product",
            config.retrieval.default_product.clone().unwrap_or_else(unset),
            vec!["PREMIA_RETRIEVAL_DEFAULT_PRODUCT"],
        ),
        ("retrieval.default_k", config.retrieval.default_k.to_string(), vec!["PREMIA_RETRIEVAL_DEFAULT_K"]),
        ("logging.level", config.logging.level.clone(), vec!["PREMIA_LOGGING_LEVEL", "PREMIA_LOG_LEVEL"]),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            vec!["PREMIA_LOGGING_FORMAT", "PREMIA_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in fields {
        lines.push(render_line(key, &value, source(key, &env_keys)));
    }
    lines.join("\n")
}

fn detect_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then_some(path);
    }

    [PathBuf::from("premia.toml"), PathBuf::from("config/premia.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a short key prefix such as `sk` so operators can tell keys apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
