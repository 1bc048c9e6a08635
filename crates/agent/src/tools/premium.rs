use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use premia_core::premium::catalog::PremiumCatalog;
use premia_core::premium::{Member, PolicyType, PremiumQuote, PremiumRequest};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{parse_input, price_product, resolve_sum_insured, rupees, MemberInput, Tool, ToolContext};

#[derive(Debug, Deserialize)]
struct PremiumInput {
    policy_name: Option<String>,
    policy_type: Option<String>,
    #[serde(default)]
    members: Vec<MemberInput>,
    sum_insured: Option<Value>,
    num_adults: Option<u32>,
    num_children: Option<u32>,
    eldest_age: Option<u32>,
    include_gst: Option<bool>,
}

pub struct PremiumCalculatorTool {
    catalog: Arc<PremiumCatalog>,
    default_sum_insured: u64,
}

impl PremiumCalculatorTool {
    pub fn new(catalog: Arc<PremiumCatalog>, default_sum_insured: u64) -> Self {
        Self { catalog, default_sum_insured }
    }

    fn calculate(&self, input: PremiumInput) -> String {
        let Some(policy_name) = input.policy_name.filter(|name| !name.trim().is_empty()) else {
            return "Error: policy_name is required".to_string();
        };
        if input.members.is_empty() {
            return "Error: members list is required with age information".to_string();
        }

        let policy_type = match input.policy_type.as_deref() {
            None => PolicyType::Individual,
            Some(raw) => match raw.parse::<PolicyType>() {
                Ok(policy_type) => policy_type,
                Err(error) => return format!("Error: {error}"),
            },
        };
        let sum_insured = match resolve_sum_insured(input.sum_insured.as_ref(), self.default_sum_insured) {
            Ok(amount) => amount,
            Err(observation) => return observation,
        };

        let request = PremiumRequest {
            policy_type,
            members: input.members.into_iter().map(Member::from).collect(),
            num_adults: input.num_adults,
            num_children: input.num_children,
            eldest_age: input.eldest_age,
            sum_insured,
            include_gst: input.include_gst.unwrap_or(true),
        };

        match price_product(&self.catalog, policy_name.trim(), &request) {
            Ok((product, quote)) => {
                info!(
                    event_name = "tool.premium_calculator.priced",
                    product = %product,
                    policy_type = %policy_type,
                    sum_insured,
                    total = %quote.total_premium(),
                    "premium calculated"
                );
                describe_quote(&product, &quote)
            }
            Err(observation) => observation,
        }
    }
}

#[async_trait]
impl Tool for PremiumCalculatorTool {
    fn name(&self) -> &'static str {
        "premium_calculator"
    }

    fn description(&self) -> &'static str {
        "Calculate the annual premium for a product from its rate tables. Input: {\"policy_name\": \"<product>\", \"policy_type\": \"individual\" | \"family_floater\", \"members\": [{\"age\": 35}], \"sum_insured\": 500000 or \"5L\", optional \"num_adults\", \"num_children\", \"include_gst\"}"
    }

    async fn execute(&self, input: &str, _context: &ToolContext) -> Result<String> {
        match parse_input::<PremiumInput>(input) {
            Ok(input) => Ok(self.calculate(input)),
            Err(observation) => Ok(observation),
        }
    }
}

fn describe_quote(product: &str, quote: &PremiumQuote) -> String {
    let mut observation = format!(
        "Premium calculated for {product}: {} annually. Base premium: {}, GST: {}",
        rupees(quote.total_premium()),
        rupees(quote.gross_premium()),
        rupees(quote.gst_amount()),
    );

    match quote {
        PremiumQuote::Individual(individual) => {
            let issues: Vec<String> = individual
                .members
                .iter()
                .filter_map(|member| {
                    member.error.as_ref().map(|error| format!("member {} ({error})", member.member))
                })
                .collect();
            if !issues.is_empty() {
                observation.push_str(&format!(". Not priced: {}", issues.join(", ")));
            }
        }
        PremiumQuote::FamilyFloater(floater) => {
            observation.push_str(&format!(
                ". Sheet: {}, eldest age {}, sum insured column {}",
                floater.sheet, floater.eldest_age, floater.column
            ));
        }
    }

    observation
}
