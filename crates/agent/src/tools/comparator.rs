use std::cmp::Ordering;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use premia_core::premium::catalog::PremiumCatalog;
use premia_core::premium::{Member, PolicyType, PremiumRequest};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{parse_input, price_product, resolve_sum_insured, rupees, MemberInput, Tool, ToolContext};

#[derive(Debug, Deserialize)]
struct CompareInput {
    policy1: Option<String>,
    policy2: Option<String>,
    #[serde(default)]
    members: Vec<MemberInput>,
    sum_insured: Option<Value>,
    policy_type: Option<String>,
}

pub struct PolicyComparatorTool {
    catalog: Arc<PremiumCatalog>,
    default_sum_insured: u64,
}

impl PolicyComparatorTool {
    pub fn new(catalog: Arc<PremiumCatalog>, default_sum_insured: u64) -> Self {
        Self { catalog, default_sum_insured }
    }

    fn compare(&self, input: CompareInput) -> String {
        let names = (
            input.policy1.filter(|name| !name.trim().is_empty()),
            input.policy2.filter(|name| !name.trim().is_empty()),
        );
        let (Some(first), Some(second)) = names else {
            return "Error: Both policy1 and policy2 are required".to_string();
        };
        if input.members.is_empty() {
            return "Error: members list is required for comparison".to_string();
        }

        let members: Vec<Member> = input.members.into_iter().map(Member::from).collect();
        let policy_type = match input.policy_type.as_deref() {
            Some(raw) => match raw.parse::<PolicyType>() {
                Ok(policy_type) => policy_type,
                Err(error) => return format!("Error: {error}"),
            },
            None if members.len() == 1 => PolicyType::Individual,
            None => PolicyType::FamilyFloater,
        };
        let sum_insured = match resolve_sum_insured(input.sum_insured.as_ref(), self.default_sum_insured) {
            Ok(amount) => amount,
            Err(observation) => return observation,
        };

        let mut request = PremiumRequest::individual(members, sum_insured);
        request.policy_type = policy_type;

        let first_quote = price_product(&self.catalog, first.trim(), &request);
        let second_quote = price_product(&self.catalog, second.trim(), &request);

        match (first_quote, second_quote) {
            (Ok((first_key, first_quote)), Ok((second_key, second_quote))) => {
                let first_total = first_quote.total_premium();
                let second_total = second_quote.total_premium();
                info!(
                    event_name = "tool.policy_comparator.compared",
                    first = %first_key,
                    second = %second_key,
                    policy_type = %policy_type,
                    sum_insured,
                    "policies compared"
                );

                let verdict = match first_total.cmp(&second_total) {
                    Ordering::Less => format!(
                        "{first_key} is cheaper by {}",
                        rupees(second_total - first_total)
                    ),
                    Ordering::Greater => format!(
                        "{second_key} is cheaper by {}",
                        rupees(first_total - second_total)
                    ),
                    Ordering::Equal => "Both cost the same".to_string(),
                };
                format!(
                    "Comparison: {first_key} costs {} vs {second_key} costs {}. {verdict}",
                    rupees(first_total),
                    rupees(second_total),
                )
            }
            (first_result, second_result) => {
                let failures: Vec<String> = [(first.trim(), first_result), (second.trim(), second_result)]
                    .into_iter()
                    .filter_map(|(name, result)| result.err().map(|error| format!("{name}: {error}")))
                    .collect();
                format!("Error comparing policies: {}", failures.join("; "))
            }
        }
    }
}

#[async_trait]
impl Tool for PolicyComparatorTool {
    fn name(&self) -> &'static str {
        "policy_comparator"
    }

    fn description(&self) -> &'static str {
        "Compare the premium of two products for the same members. Input: {\"policy1\": \"<product>\", \"policy2\": \"<product>\", \"members\": [{\"age\": 35}], \"sum_insured\": 500000 or \"5L\"}"
    }

    async fn execute(&self, input: &str, _context: &ToolContext) -> Result<String> {
        match parse_input::<CompareInput>(input) {
            Ok(input) => Ok(self.compare(input)),
            Err(observation) => Ok(observation),
        }
    }
}
