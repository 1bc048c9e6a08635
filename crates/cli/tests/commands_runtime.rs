use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use premia_agent::{ChatMessage, LlmClient};
use premia_cli::commands::ask::{self, AskArgs};
use premia_cli::commands::quote::{self, QuoteArgs};
use premia_cli::commands::{config, doctor, products};
use premia_core::config::{AppConfig, LoadOptions};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn quote_prices_individual_member_with_gst() {
    with_env(&[], || {
        let fixture = Fixture::new("");
        let result = quote::run(fixture.options(), &quote_args("Activ Assure", &[35], Some("5L")));

        assert_eq!(result.exit_code, 0, "expected successful quote: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "quote");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["product"], "ActivAssure");
        assert_eq!(payload["data"]["quote"]["policy_type"], "individual");
        assert_eq!(payload["data"]["quote"]["total_premium"], "8126.66");
        assert_eq!(payload["data"]["quote"]["members"][0]["age_band"], "26-35");
    });
}

#[test]
fn quote_reports_unknown_product_class() {
    with_env(&[], || {
        let fixture = Fixture::new("");
        let result = quote::run(fixture.options(), &quote_args("Zeta Shield", &[35], None));

        assert_eq!(result.exit_code, 1);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "unknown_product");
        assert!(payload["message"].as_str().unwrap_or_default().contains("ActivAssure"));
    });
}

#[test]
fn quote_rejects_unparseable_sum_insured() {
    with_env(&[], || {
        let fixture = Fixture::new("");
        let result = quote::run(fixture.options(), &quote_args("ActivAssure", &[35], Some("plenty")));

        assert_eq!(result.exit_code, 1);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

#[test]
fn quote_returns_config_failure_for_invalid_env() {
    with_env(&[("PREMIA_AGENT_MAX_ITERATIONS", "0")], || {
        let fixture = Fixture::new("");
        let result = quote::run(fixture.options(), &quote_args("ActivAssure", &[35], None));

        assert_eq!(result.exit_code, 2, "expected config validation failure code");
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn products_lists_rate_tables_and_collections() {
    with_env(&[], || {
        let fixture = Fixture::new("");
        let result = products::run(fixture.options());

        assert_eq!(result.exit_code, 0);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["rate_tables"], serde_json::json!(["ActivAssure"]));
        assert_eq!(payload["data"]["documents"], serde_json::json!(["ActivAssure"]));
        assert!(payload["data"].get("registry_error").is_none());
    });
}

#[test]
fn ask_runs_reasoning_loop_with_scripted_model() {
    with_env(&[], || {
        let fixture = Fixture::new("");
        let config = AppConfig::load(fixture.options()).expect("config loads");
        let args = AskArgs {
            query: "Premium for a 35 year old on ActivAssure?".to_string(),
            product: Some("ActivAssure".to_string()),
            max_iterations: None,
        };
        let model = ScriptedModel::from(vec![
            "Thought: price it\nAction: premium_calculator\nAction Input: {\"policy_name\": \"ActivAssure\", \"members\": [35]}".to_string(),
            "Thought: done\nAction: finish\nAction Input: {\"answer\": \"₹8,126.66 per year\"}".to_string(),
        ]);

        let result = ask::run_with_client(&config, &args, model);

        assert_eq!(result.exit_code, 0, "expected successful run: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["message"], "₹8,126.66 per year");
        assert_eq!(payload["data"]["status"], "finished");
        assert_eq!(payload["data"]["tools_used"], serde_json::json!(["premium_calculator"]));
        assert_eq!(payload["data"]["classification"]["intent"], "PREMIUM_CALCULATION");
        assert_eq!(payload["data"]["inferred_intent"], "PREMIUM_CALCULATION");
    });
}

#[test]
fn ask_reports_unreadable_collection_as_retrieval_failure() {
    with_env(&[], || {
        let fixture = Fixture::new("");
        fs::write(fixture.root().join("collections").join("ActivAssure").join("chunks.json"), "not json")
            .expect("overwrite chunks");
        let config = AppConfig::load(fixture.options()).expect("config loads");
        let args = AskArgs { query: "Is maternity covered?".to_string(), product: None, max_iterations: None };

        let result = ask::run_with_client(&config, &args, ScriptedModel::from(Vec::<String>::new()));

        assert_eq!(result.exit_code, 1);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "retrieval_unavailable");
        assert!(payload["message"].as_str().unwrap_or_default().contains("could not parse collection data"));
    });
}

#[test]
fn doctor_passes_with_complete_fixture() {
    with_env(&[], || {
        let fixture = Fixture::new("");
        let report: Value =
            serde_json::from_str(&doctor::run(fixture.options(), true)).expect("doctor emits JSON");

        assert_eq!(report["overall_status"], "pass", "report: {report}");
        let names: Vec<&str> =
            report["checks"].as_array().into_iter().flatten().filter_map(|check| check["name"].as_str()).collect();
        assert_eq!(
            names,
            vec![
                "config_validation",
                "llm_endpoint",
                "premium_registry",
                "premium_workbooks",
                "document_collections"
            ]
        );
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_fails() {
    with_env(&[("PREMIA_LLM_PROVIDER", "openai")], || {
        let fixture = Fixture::new("");
        let report: Value =
            serde_json::from_str(&doctor::run(fixture.options(), true)).expect("doctor emits JSON");

        assert_eq!(report["overall_status"], "fail");
        assert_eq!(report["checks"][0]["status"], "fail");
        assert_eq!(report["checks"][1]["status"], "skipped");
    });
}

#[test]
fn config_redacts_api_key_and_attributes_sources() {
    with_env(&[("PREMIA_LLM_MODEL", "gpt-4o-mini")], || {
        let fixture = Fixture::new("[llm]\nprovider = \"openai\"\napi_key = \"sk-test-123\"\n");
        let output = config::run(fixture.options());

        assert!(output.contains("- llm.api_key = sk-*** (source: file ("), "output: {output}");
        assert!(output.contains("- llm.model = gpt-4o-mini (source: env (PREMIA_LLM_MODEL))"));
        assert!(output.contains("- agent.max_iterations = 10 (source: default)"));
        assert!(!output.contains("sk-test-123"));
    });
}

struct ScriptedModel(Mutex<Vec<String>>);

impl From<Vec<String>> for ScriptedModel {
    fn from(replies: Vec<String>) -> Self {
        let mut replies = replies;
        replies.reverse();
        Self(Mutex::new(replies))
    }
}

#[async_trait]
impl LlmClient for ScriptedModel {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        self.0.lock().expect("lock").pop().ok_or_else(|| anyhow::anyhow!("script exhausted"))
    }
}

/// Registry, workbook, one document collection and a `premia.toml` pointing
/// at them, all inside a temp dir.
struct Fixture {
    dir: TempDir,
    config_path: PathBuf,
}

impl Fixture {
    fn new(extra_toml: &str) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();
        fs::write(
            root.join("activ_assure.json"),
            r#"{"sheets": [{"name": "Individual", "columns": ["5L", "10L"], "rows": [
                {"age_band": "26-35", "premiums": {"5L": "6887", "10L": "9350"}}
            ]}]}"#,
        )
        .expect("write workbook");
        fs::write(
            root.join("registry.json"),
            r#"{"ActivAssure": {"excel_path": "activ_assure.json"}}"#,
        )
        .expect("write registry");
        let collection = root.join("collections").join("ActivAssure");
        fs::create_dir_all(&collection).expect("create collection");
        fs::write(
            collection.join("chunks.json"),
            r#"[{"content": "Room rent is capped at a single private room", "metadata": {"source": "brochure.pdf"}}]"#,
        )
        .expect("write chunks");

        let config_path = root.join("premia.toml");
        let toml = format!(
            "{extra_toml}\n[premium]\nregistry_path = \"{}\"\ngst_rate = 0.18\n\n[retrieval]\ncollections_root = \"{}\"\ndefault_product = \"ActivAssure\"\n",
            toml_path(&root.join("registry.json")),
            toml_path(&root.join("collections")),
        );
        fs::write(&config_path, toml).expect("write config");

        Self { dir, config_path }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn options(&self) -> LoadOptions {
        LoadOptions { config_path: Some(self.config_path.clone()), require_file: true, ..LoadOptions::default() }
    }
}

fn toml_path(path: &Path) -> String {
    path.display().to_string().replace('\\', "\\\\")
}

fn quote_args(product: &str, ages: &[u32], sum_insured: Option<&str>) -> QuoteArgs {
    QuoteArgs {
        product: product.to_string(),
        policy_type: "individual".to_string(),
        ages: ages.to_vec(),
        sum_insured: sum_insured.map(str::to_string),
        adults: None,
        children: None,
        eldest_age: None,
        no_gst: false,
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let keys = [
        "PREMIA_LLM_PROVIDER",
        "PREMIA_LLM_API_KEY",
        "PREMIA_LLM_BASE_URL",
        "PREMIA_LLM_MODEL",
        "PREMIA_LLM_API_VERSION",
        "PREMIA_LLM_TIMEOUT_SECS",
        "PREMIA_LLM_MAX_RETRIES",
        "PREMIA_AGENT_MAX_ITERATIONS",
        "PREMIA_PREMIUM_REGISTRY_PATH",
        "PREMIA_PREMIUM_GST_RATE",
        "PREMIA_PREMIUM_DEFAULT_SUM_INSURED",
        "PREMIA_RETRIEVAL_COLLECTIONS_ROOT",
        "PREMIA_RETRIEVAL_DEFAULT_PRODUCT",
        "PREMIA_RETRIEVAL_DEFAULT_K",
        "PREMIA_LOGGING_LEVEL",
        "PREMIA_LOGGING_FORMAT",
        "PREMIA_LOG_LEVEL",
        "PREMIA_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
