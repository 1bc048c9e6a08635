pub mod age_band;
pub mod catalog;
pub mod rate_table;
pub mod registry;
pub mod workbook;

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::PremiumError;
use crate::premium::workbook::Workbook;

pub const INDIVIDUAL_SHEET: &str = "Individual";
pub const ADULT_AGE_THRESHOLD: u32 = 18;
pub const DEFAULT_SUM_INSURED: u64 = 500_000;

pub fn default_gst_rate() -> Decimal {
    Decimal::new(18, 2)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

impl Member {
    pub fn aged(age: u32) -> Self {
        Self { age: Some(age), relation: None }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    #[default]
    Individual,
    FamilyFloater,
}

impl PolicyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::FamilyFloater => "family_floater",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyType {
    type Err = PremiumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "individual" => Ok(Self::Individual),
            "family_floater" => Ok(Self::FamilyFloater),
            _ => Err(PremiumError::UnknownPolicyType(value.trim().to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumRequest {
    #[serde(default)]
    pub policy_type: PolicyType,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub num_adults: Option<u32>,
    #[serde(default)]
    pub num_children: Option<u32>,
    #[serde(default)]
    pub eldest_age: Option<u32>,
    #[serde(default = "default_sum_insured")]
    pub sum_insured: u64,
    #[serde(default = "default_include_gst")]
    pub include_gst: bool,
}

fn default_sum_insured() -> u64 {
    DEFAULT_SUM_INSURED
}

fn default_include_gst() -> bool {
    true
}

impl PremiumRequest {
    pub fn individual(members: Vec<Member>, sum_insured: u64) -> Self {
        Self {
            policy_type: PolicyType::Individual,
            members,
            num_adults: None,
            num_children: None,
            eldest_age: None,
            sum_insured,
            include_gst: true,
        }
    }

    pub fn family_floater(members: Vec<Member>, sum_insured: u64) -> Self {
        Self { policy_type: PolicyType::FamilyFloater, ..Self::individual(members, sum_insured) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPremium {
    pub member: usize,
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    pub age_band: Option<String>,
    pub column: Option<String>,
    pub premium: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualQuote {
    pub sheet: String,
    pub sum_insured: u64,
    pub members: Vec<MemberPremium>,
    pub gross_premium: Decimal,
    pub gst_rate: Decimal,
    pub gst_amount: Decimal,
    pub total_premium: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyFloaterQuote {
    pub sheet: String,
    pub num_adults: u32,
    pub num_children: u32,
    pub eldest_age: u32,
    pub age_band: String,
    pub column: String,
    pub sum_insured: u64,
    pub gross_premium: Decimal,
    pub gst_rate: Decimal,
    pub gst_amount: Decimal,
    pub total_premium: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy_type", rename_all = "snake_case")]
pub enum PremiumQuote {
    Individual(IndividualQuote),
    FamilyFloater(FamilyFloaterQuote),
}

impl PremiumQuote {
    pub fn policy_type(&self) -> PolicyType {
        match self {
            Self::Individual(_) => PolicyType::Individual,
            Self::FamilyFloater(_) => PolicyType::FamilyFloater,
        }
    }

    pub fn gross_premium(&self) -> Decimal {
        match self {
            Self::Individual(quote) => quote.gross_premium,
            Self::FamilyFloater(quote) => quote.gross_premium,
        }
    }

    pub fn gst_amount(&self) -> Decimal {
        match self {
            Self::Individual(quote) => quote.gst_amount,
            Self::FamilyFloater(quote) => quote.gst_amount,
        }
    }

    pub fn total_premium(&self) -> Decimal {
        match self {
            Self::Individual(quote) => quote.total_premium,
            Self::FamilyFloater(quote) => quote.total_premium,
        }
    }
}

struct GstBreakdown {
    rate: Decimal,
    amount: Decimal,
    total: Decimal,
}

/// Prices requests against one product's workbook.
#[derive(Clone, Debug)]
pub struct PremiumEngine {
    workbook: Workbook,
    gst_rate: Decimal,
}

impl PremiumEngine {
    pub fn new(workbook: Workbook) -> Self {
        Self { workbook, gst_rate: default_gst_rate() }
    }

    pub fn with_gst_rate(mut self, gst_rate: Decimal) -> Self {
        self.gst_rate = gst_rate;
        self
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    pub fn gst_rate(&self) -> Decimal {
        self.gst_rate
    }

    /// Prices each member independently from the "Individual" sheet. Members
    /// without an age or without a matching rate get a zero entry carrying the
    /// reason; the batch is never aborted.
    pub fn calculate_individual(
        &self,
        members: &[Member],
        sum_insured: u64,
        include_gst: bool,
    ) -> Result<IndividualQuote, PremiumError> {
        if members.is_empty() {
            return Err(PremiumError::NoMembers);
        }
        let sheet = self.sheet(INDIVIDUAL_SHEET)?;

        let mut breakdown = Vec::with_capacity(members.len());
        for (index, member) in members.iter().enumerate() {
            let mut entry = MemberPremium {
                member: index + 1,
                age: member.age,
                relation: member.relation.clone(),
                age_band: None,
                column: None,
                premium: Decimal::ZERO,
                error: None,
            };

            match member.age {
                None => entry.error = Some("Age not provided".to_string()),
                Some(age) => match sheet.lookup(age, sum_insured) {
                    Some(cell) => {
                        entry.age_band = Some(cell.age_band);
                        entry.column = Some(cell.column);
                        entry.premium = cell.premium;
                    }
                    None => {
                        warn!(
                            event_name = "premium.individual.not_found",
                            age,
                            sum_insured,
                            "premium not found for member"
                        );
                        entry.error = Some("Premium not found".to_string());
                    }
                },
            }
            breakdown.push(entry);
        }

        let gross: Decimal = breakdown.iter().map(|entry| entry.premium).sum();
        let gst = self.apply_gst(gross, include_gst);
        info!(
            event_name = "premium.individual.calculated",
            members = breakdown.len(),
            sum_insured,
            gross = %gross,
            total = %gst.total,
            "individual premium calculated"
        );

        Ok(IndividualQuote {
            sheet: sheet.name.clone(),
            sum_insured,
            members: breakdown,
            gross_premium: gross,
            gst_rate: gst.rate,
            gst_amount: gst.amount,
            total_premium: gst.total,
        })
    }

    pub fn calculate_family_floater(
        &self,
        num_adults: u32,
        num_children: u32,
        eldest_age: u32,
        sum_insured: u64,
        include_gst: bool,
    ) -> Result<FamilyFloaterQuote, PremiumError> {
        let sheet_name = floater_sheet_name(num_adults, num_children)?;
        let sheet = self.sheet(&sheet_name)?;

        let cell = sheet.lookup(eldest_age, sum_insured).ok_or_else(|| {
            warn!(
                event_name = "premium.floater.not_found",
                sheet = %sheet_name,
                eldest_age,
                sum_insured,
                "family floater premium not found"
            );
            PremiumError::PremiumNotFound { age: eldest_age, sum_insured, sheet: sheet_name.clone() }
        })?;

        let gst = self.apply_gst(cell.premium, include_gst);
        info!(
            event_name = "premium.floater.calculated",
            sheet = %sheet_name,
            eldest_age,
            sum_insured,
            gross = %cell.premium,
            total = %gst.total,
            "family floater premium calculated"
        );

        Ok(FamilyFloaterQuote {
            sheet: sheet_name,
            num_adults,
            num_children,
            eldest_age,
            age_band: cell.age_band,
            column: cell.column,
            sum_insured,
            gross_premium: cell.premium,
            gst_rate: gst.rate,
            gst_amount: gst.amount,
            total_premium: gst.total,
        })
    }

    pub fn calculate(&self, request: &PremiumRequest) -> Result<PremiumQuote, PremiumError> {
        match request.policy_type {
            PolicyType::Individual => self
                .calculate_individual(&request.members, request.sum_insured, request.include_gst)
                .map(PremiumQuote::Individual),
            PolicyType::FamilyFloater => {
                let (num_adults, num_children, eldest_age) = floater_composition(request)?;
                self.calculate_family_floater(
                    num_adults,
                    num_children,
                    eldest_age,
                    request.sum_insured,
                    request.include_gst,
                )
                .map(PremiumQuote::FamilyFloater)
            }
        }
    }

    fn sheet(&self, name: &str) -> Result<&rate_table::RateTable, PremiumError> {
        self.workbook.sheet(name).ok_or_else(|| PremiumError::SheetNotFound {
            sheet: name.to_string(),
            available: self.workbook.sheet_names(),
        })
    }

    fn apply_gst(&self, gross: Decimal, include_gst: bool) -> GstBreakdown {
        if !include_gst {
            return GstBreakdown { rate: Decimal::ZERO, amount: Decimal::ZERO, total: gross };
        }
        let amount = gross * self.gst_rate;
        GstBreakdown { rate: self.gst_rate, amount, total: gross + amount }
    }
}

/// Explicit counts win; otherwise the composition comes from member ages with
/// members under 18 (or without an age) counted as children.
fn floater_composition(request: &PremiumRequest) -> Result<(u32, u32, u32), PremiumError> {
    if let (Some(num_adults), Some(num_children)) = (request.num_adults, request.num_children) {
        let eldest_age = request
            .eldest_age
            .or_else(|| request.members.iter().filter_map(|member| member.age).max())
            .ok_or(PremiumError::MissingEldestAge)?;
        return Ok((num_adults, num_children, eldest_age));
    }

    if request.members.is_empty() {
        return Err(PremiumError::MissingEldestAge);
    }

    let ages: Vec<u32> = request.members.iter().map(|member| member.age.unwrap_or(0)).collect();
    let adults: Vec<u32> = ages.iter().copied().filter(|age| *age >= ADULT_AGE_THRESHOLD).collect();
    let num_adults = u32::try_from(adults.len()).unwrap_or(u32::MAX);
    let num_children = u32::try_from(ages.len() - adults.len()).unwrap_or(u32::MAX);
    let eldest_age = request
        .eldest_age
        .unwrap_or_else(|| adults.iter().copied().max().unwrap_or(ADULT_AGE_THRESHOLD));

    info!(
        event_name = "premium.floater.composition_detected",
        num_adults,
        num_children,
        eldest_age,
        "derived family composition from members"
    );
    Ok((num_adults, num_children, eldest_age))
}

/// Sheet holding rates for a family composition, e.g. "2 Adults + 1 Child".
pub fn floater_sheet_name(num_adults: u32, num_children: u32) -> Result<String, PremiumError> {
    let adults = match num_adults {
        1 => "1 Adult",
        2 => "2 Adults",
        _ => return Err(PremiumError::UnsupportedComposition { num_adults, num_children }),
    };

    Ok(match (num_adults, num_children) {
        (1, 0) => INDIVIDUAL_SHEET.to_string(),
        (_, 0) => adults.to_string(),
        (_, 1) => format!("{adults} + 1 Child"),
        (_, children) => format!("{adults} + {children} Children"),
    })
}

/// Renders an amount with two decimals and thousands separators ("8,126.66").
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let rendered = format!("{:.2}", rounded.abs());
    let (whole, fraction) = rendered.split_once('.').unwrap_or((rendered.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{sign}{grouped}.{fraction}")
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        floater_sheet_name, format_amount, Member, PolicyType, PremiumEngine, PremiumQuote,
        PremiumRequest,
    };
    use crate::errors::PremiumError;
    use crate::premium::rate_table::{RateRow, RateTable};
    use crate::premium::workbook::Workbook;

    fn lakh_columns() -> Vec<String> {
        vec!["5L".to_string(), "10L".to_string()]
    }

    fn engine() -> PremiumEngine {
        let individual = RateTable::new("Individual", lakh_columns())
            .with_row(
                RateRow::new("18-25")
                    .with_premium("5L", Decimal::new(5400, 0))
                    .with_premium("10L", Decimal::new(7900, 0)),
            )
            .with_row(
                RateRow::new("26-35")
                    .with_premium("5L", Decimal::new(6887, 0))
                    .with_premium("10L", Decimal::new(9350, 0)),
            )
            .with_row(RateRow::new("36-45").with_premium("5L", Decimal::new(8120, 0)));
        let floater = RateTable::new("2 Adults + 1 Child", lakh_columns())
            .with_row(RateRow::new("36-45").with_premium("10L", Decimal::new(21450, 0)));
        let couple = RateTable::new("2 Adults", lakh_columns())
            .with_row(RateRow::new("26-35").with_premium("5L", Decimal::new(11200, 0)));

        PremiumEngine::new(Workbook::new(vec![individual, floater, couple]))
    }

    #[test]
    fn individual_quote_applies_gst() {
        let quote = engine()
            .calculate_individual(&[Member::aged(35)], 500_000, true)
            .expect("quote should price");

        assert_eq!(quote.gross_premium, Decimal::new(6887, 0));
        assert_eq!(quote.gst_amount, Decimal::new(123966, 2));
        assert_eq!(quote.total_premium, Decimal::new(812666, 2));
        assert_eq!(quote.members[0].age_band.as_deref(), Some("26-35"));
        assert_eq!(quote.members[0].column.as_deref(), Some("5L"));
    }

    #[test]
    fn gst_identities_hold_with_and_without_gst() {
        let engine = engine();
        let members = [Member::aged(22), Member::aged(40)];

        let with_gst = engine.calculate_individual(&members, 500_000, true).expect("priced");
        assert_eq!(with_gst.total_premium, with_gst.gross_premium + with_gst.gst_amount);
        assert_eq!(with_gst.gst_amount, with_gst.gross_premium * with_gst.gst_rate);

        let without_gst = engine.calculate_individual(&members, 500_000, false).expect("priced");
        assert_eq!(without_gst.gst_amount, Decimal::ZERO);
        assert_eq!(without_gst.gst_rate, Decimal::ZERO);
        assert_eq!(without_gst.total_premium, without_gst.gross_premium);
    }

    #[test]
    fn individual_batch_records_member_failures() {
        let members = [
            Member::aged(30),
            Member { age: None, relation: Some("spouse".to_string()) },
            Member::aged(90),
        ];

        let quote = engine().calculate_individual(&members, 500_000, false).expect("priced");

        assert_eq!(quote.members.len(), 3);
        assert_eq!(quote.members[1].error.as_deref(), Some("Age not provided"));
        assert_eq!(quote.members[2].error.as_deref(), Some("Premium not found"));
        assert_eq!(quote.members[2].premium, Decimal::ZERO);
        assert_eq!(quote.gross_premium, Decimal::new(6887, 0));
    }

    #[test]
    fn individual_without_members_is_rejected() {
        assert_eq!(engine().calculate_individual(&[], 500_000, true), Err(PremiumError::NoMembers));
    }

    #[test]
    fn floater_auto_detects_composition_from_members() {
        let request = PremiumRequest::family_floater(
            vec![Member::aged(35), Member::aged(40), Member::aged(7)],
            1_000_000,
        );

        let quote = engine().calculate(&request).expect("floater should price");

        let PremiumQuote::FamilyFloater(floater) = quote else {
            panic!("expected family floater quote");
        };
        assert_eq!(floater.sheet, "2 Adults + 1 Child");
        assert_eq!(floater.eldest_age, 40);
        assert_eq!(floater.num_adults, 2);
        assert_eq!(floater.num_children, 1);
        assert_eq!(floater.gross_premium, Decimal::new(21450, 0));
    }

    #[test]
    fn floater_explicit_counts_need_an_eldest_age() {
        let mut request = PremiumRequest::family_floater(Vec::new(), 500_000);
        request.num_adults = Some(2);
        request.num_children = Some(0);

        assert_eq!(engine().calculate(&request), Err(PremiumError::MissingEldestAge));

        request.eldest_age = Some(30);
        let quote = engine().calculate(&request).expect("explicit eldest age prices");
        assert_eq!(quote.gross_premium(), Decimal::new(11200, 0));
        assert_eq!(quote.policy_type(), PolicyType::FamilyFloater);
    }

    #[test]
    fn floater_reports_missing_sheet_and_missing_rate() {
        let engine = engine();

        let missing_sheet = engine.calculate_family_floater(2, 3, 40, 500_000, true);
        assert!(matches!(
            missing_sheet,
            Err(PremiumError::SheetNotFound { ref sheet, .. }) if sheet == "2 Adults + 3 Children"
        ));

        let missing_rate = engine.calculate_family_floater(2, 1, 60, 500_000, true);
        assert_eq!(
            missing_rate,
            Err(PremiumError::PremiumNotFound {
                age: 60,
                sum_insured: 500_000,
                sheet: "2 Adults + 1 Child".to_string()
            })
        );
    }

    #[test]
    fn sheet_names_follow_composition() {
        assert_eq!(floater_sheet_name(1, 0).as_deref(), Ok("Individual"));
        assert_eq!(floater_sheet_name(2, 0).as_deref(), Ok("2 Adults"));
        assert_eq!(floater_sheet_name(1, 1).as_deref(), Ok("1 Adult + 1 Child"));
        assert_eq!(floater_sheet_name(1, 3).as_deref(), Ok("1 Adult + 3 Children"));
        assert_eq!(floater_sheet_name(2, 1).as_deref(), Ok("2 Adults + 1 Child"));
        assert_eq!(floater_sheet_name(2, 4).as_deref(), Ok("2 Adults + 4 Children"));
        assert_eq!(
            floater_sheet_name(3, 1),
            Err(PremiumError::UnsupportedComposition { num_adults: 3, num_children: 1 })
        );
        assert!(floater_sheet_name(0, 2).is_err());
    }

    #[test]
    fn policy_type_parses_known_values_only() {
        assert_eq!("Individual".parse::<PolicyType>(), Ok(PolicyType::Individual));
        assert_eq!(" family_floater ".parse::<PolicyType>(), Ok(PolicyType::FamilyFloater));
        assert_eq!(
            "group".parse::<PolicyType>(),
            Err(PremiumError::UnknownPolicyType("group".to_string()))
        );
    }

    #[test]
    fn amounts_render_with_grouping() {
        assert_eq!(format_amount(Decimal::new(812666, 2)), "8,126.66");
        assert_eq!(format_amount(Decimal::new(6887, 0)), "6,887.00");
        assert_eq!(format_amount(Decimal::new(1_234_567_895, 3)), "1,234,567.90");
        assert_eq!(format_amount(Decimal::new(999, 0)), "999.00");
        assert_eq!(format_amount(Decimal::ZERO), "0.00");
    }

    #[test]
    fn quote_serializes_with_policy_type_tag() {
        let quote = engine()
            .calculate(&PremiumRequest::individual(vec![Member::aged(35)], 500_000))
            .expect("priced");

        let json = serde_json::to_value(&quote).expect("serializable");
        assert_eq!(json["policy_type"], "individual");
        assert_eq!(json["total_premium"], "8126.66");
    }
}
