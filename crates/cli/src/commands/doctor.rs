use premia_agent::llm::chat_endpoint;
use premia_core::config::{AppConfig, LoadOptions};
use premia_core::premium::catalog::PremiumCatalog;
use premia_core::retrieval::CollectionCatalog;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DEPENDENT_CHECKS: [&str; 4] =
    ["llm_endpoint", "premium_registry", "premium_workbooks", "document_collections"];

pub fn run(options: LoadOptions, json_output: bool) -> String {
    let report = build_report(options);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_llm_endpoint(&config));
            checks.extend(check_premium_tables(&config));
            checks.push(check_collections(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in DEPENDENT_CHECKS {
                checks.push(DoctorCheck::skipped(name, "skipped because configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_endpoint(config: &AppConfig) -> DoctorCheck {
    match chat_endpoint(&config.llm) {
        Ok(endpoint) => DoctorCheck::pass(
            "llm_endpoint",
            format!("{} model `{}` at {endpoint}", config.llm.provider.as_str(), config.llm.model),
        ),
        Err(error) => DoctorCheck::fail("llm_endpoint", format!("{error:#}")),
    }
}

/// Registry readability, then a load of every registered workbook.
fn check_premium_tables(config: &AppConfig) -> [DoctorCheck; 2] {
    let catalog = PremiumCatalog::new(&config.premium.registry_path);
    let products = match catalog.product_names() {
        Ok(products) => products,
        Err(error) => {
            return [
                DoctorCheck::fail("premium_registry", error.to_string()),
                DoctorCheck::skipped("premium_workbooks", "skipped because the registry did not load"),
            ];
        }
    };

    let registry = DoctorCheck::pass(
        "premium_registry",
        format!("{} products registered in `{}`", products.len(), config.premium.registry_path.display()),
    );

    let failures: Vec<String> = products
        .iter()
        .filter_map(|product| catalog.engine_for(product).err().map(|error| format!("{product}: {error}")))
        .collect();
    let workbooks = if failures.is_empty() {
        DoctorCheck::pass("premium_workbooks", format!("{} workbooks loaded", products.len()))
    } else {
        DoctorCheck::fail("premium_workbooks", failures.join("; "))
    };

    [registry, workbooks]
}

fn check_collections(config: &AppConfig) -> DoctorCheck {
    let root = &config.retrieval.collections_root;
    if !root.is_dir() {
        return DoctorCheck::fail(
            "document_collections",
            format!("collections root `{}` does not exist; run document ingestion", root.display()),
        );
    }

    let products = CollectionCatalog::new(root, config.retrieval.default_product.clone()).product_names();
    if let Some(default) = &config.retrieval.default_product {
        if !products.contains(default) {
            return DoctorCheck::fail(
                "document_collections",
                format!("default product `{default}` has no collection under `{}`", root.display()),
            );
        }
    }
    DoctorCheck::pass("document_collections", format!("{} product collections found", products.len()))
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
