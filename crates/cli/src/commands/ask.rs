use std::sync::Arc;

use clap::Args;
use premia_agent::{
    standard_registry, LlmClient, LlmReasoner, OpenAiCompatibleClient, ReasoningLoop, RunOutcome,
    RunStatus, ToolContext, ToolDependencies,
};
use premia_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use premia_core::errors::ApplicationError;
use premia_core::premium::catalog::PremiumCatalog;
use premia_core::retrieval::{CollectionCatalog, InMemoryDocumentStore};

use super::{load_config, CommandResult, EXIT_COMMAND_FAILED, EXIT_CONFIG_INVALID};

#[derive(Debug, Clone, Args)]
pub struct AskArgs {
    #[arg(help = "Question for the assistant")]
    pub query: String,
    #[arg(long, help = "Product the conversation is about")]
    pub product: Option<String>,
    #[arg(long, help = "Cap on reasoning iterations for this query")]
    pub max_iterations: Option<u32>,
}

pub fn run(mut options: LoadOptions, args: &AskArgs) -> CommandResult {
    if args.max_iterations.is_some() {
        options.overrides =
            ConfigOverrides { max_iterations: args.max_iterations, ..options.overrides };
    }
    let config = match load_config("ask", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let client = match OpenAiCompatibleClient::from_config(&config.llm) {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                format!("{error:#}"),
                EXIT_CONFIG_INVALID,
            )
        }
    };

    run_with_client(&config, args, client)
}

/// Runs the query with an explicit chat client on a single-threaded runtime.
pub fn run_with_client<C: LlmClient>(config: &AppConfig, args: &AskArgs, client: C) -> CommandResult {
    let deps = match tool_dependencies(config) {
        Ok(deps) => deps,
        Err(result) => return result,
    };
    let agent = ReasoningLoop::new(LlmReasoner::new(client), standard_registry(deps))
        .with_max_iterations(config.agent.max_iterations);
    let context = ToolContext { selected_product: args.product.clone(), ..ToolContext::default() };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                EXIT_COMMAND_FAILED,
            )
        }
    };
    let outcome: RunOutcome = runtime.block_on(agent.run(&args.query, &context, None));

    let message = outcome.final_answer.clone();
    let data = serde_json::to_value(&outcome).ok();
    if outcome.success {
        CommandResult::success_with_data("ask", message, data)
    } else {
        let error_class = match outcome.status {
            RunStatus::MaxIterationsReached => "max_iterations_reached",
            _ => "reasoning_failed",
        };
        CommandResult::failure_with_data("ask", error_class, message, EXIT_COMMAND_FAILED, data)
    }
}

fn tool_dependencies(config: &AppConfig) -> Result<ToolDependencies, CommandResult> {
    let store = InMemoryDocumentStore::load_from_root(&config.retrieval.collections_root)
        .map_err(|error| {
            let error = ApplicationError::from(error);
            CommandResult::failure(
                "ask",
                error.error_class(),
                format!("{error}. {}", error.user_message()),
                EXIT_COMMAND_FAILED,
            )
        })?;
    let catalog =
        PremiumCatalog::new(&config.premium.registry_path).with_gst_rate(config.premium.gst_rate);

    Ok(ToolDependencies {
        catalog: Arc::new(catalog),
        store: Arc::new(store),
        collections: CollectionCatalog::new(
            &config.retrieval.collections_root,
            config.retrieval.default_product.clone(),
        ),
        default_sum_insured: config.premium.default_sum_insured,
        default_k: config.retrieval.default_k,
    })
}
