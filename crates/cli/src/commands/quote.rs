use clap::Args;
use premia_core::config::{AppConfig, LoadOptions};
use premia_core::errors::ApplicationError;
use premia_core::premium::catalog::PremiumCatalog;
use premia_core::premium::rate_table::parse_sum_insured;
use premia_core::premium::{Member, PolicyType, PremiumQuote, PremiumRequest};
use serde_json::json;
use tracing::info;

use super::{load_config, CommandResult, EXIT_COMMAND_FAILED};

#[derive(Debug, Clone, Args)]
pub struct QuoteArgs {
    #[arg(long, help = "Product name as registered, matched loosely (e.g. \"Activ Assure\")")]
    pub product: String,
    #[arg(long, default_value = "individual", help = "individual or family_floater")]
    pub policy_type: String,
    #[arg(long = "age", help = "Member age; repeat for each member")]
    pub ages: Vec<u32>,
    #[arg(long, help = "Sum insured in rupees or lakhs (e.g. 500000 or 5L)")]
    pub sum_insured: Option<String>,
    #[arg(long, help = "Adults on a family floater, overriding the age split")]
    pub adults: Option<u32>,
    #[arg(long, help = "Children on a family floater, overriding the age split")]
    pub children: Option<u32>,
    #[arg(long, help = "Eldest age on a family floater when no ages are given")]
    pub eldest_age: Option<u32>,
    #[arg(long, help = "Leave GST out of the total")]
    pub no_gst: bool,
}

pub fn run(options: LoadOptions, args: &QuoteArgs) -> CommandResult {
    let config = match load_config("quote", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    match price(&config, args) {
        Ok((product, quote)) => {
            let message = format!(
                "{product}: total premium {} ({})",
                premia_core::premium::format_amount(quote.total_premium()),
                quote.policy_type()
            );
            let data = serde_json::to_value(&quote)
                .ok()
                .map(|quote| json!({ "product": product, "quote": quote }));
            CommandResult::success_with_data("quote", message, data)
        }
        Err(error) => CommandResult::failure(
            "quote",
            error.error_class(),
            format!("{error}. {}", error.user_message()),
            EXIT_COMMAND_FAILED,
        ),
    }
}

fn price(config: &AppConfig, args: &QuoteArgs) -> Result<(String, PremiumQuote), ApplicationError> {
    let policy_type: PolicyType = args.policy_type.parse()?;
    let sum_insured = match args.sum_insured.as_deref() {
        Some(raw) => parse_sum_insured(raw)?,
        None => config.premium.default_sum_insured,
    };

    let request = PremiumRequest {
        policy_type,
        members: args.ages.iter().copied().map(Member::aged).collect(),
        num_adults: args.adults,
        num_children: args.children,
        eldest_age: args.eldest_age,
        sum_insured,
        include_gst: !args.no_gst,
    };

    let catalog =
        PremiumCatalog::new(&config.premium.registry_path).with_gst_rate(config.premium.gst_rate);
    let (product, engine) = catalog.engine_for(&args.product)?;
    let quote = engine.calculate(&request)?;
    info!(
        event_name = "cli.quote.priced",
        product = %product,
        policy_type = %policy_type,
        sum_insured,
        total = %quote.total_premium(),
        "quote computed"
    );
    Ok((product, quote))
}
