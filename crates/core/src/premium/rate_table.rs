use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ParseError;
use crate::premium::age_band::{detect_format, find_matching_row};

pub const AGE_BAND_COLUMN: &str = "Age Band";
const LAKH: i64 = 100_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRow {
    pub age_band: String,
    #[serde(default)]
    pub premiums: BTreeMap<String, Decimal>,
}

impl RateRow {
    pub fn new(age_band: impl Into<String>) -> Self {
        Self { age_band: age_band.into(), premiums: BTreeMap::new() }
    }

    pub fn with_premium(mut self, column: impl Into<String>, premium: Decimal) -> Self {
        self.premiums.insert(column.into(), premium);
        self
    }
}

/// One sheet of a premium workbook. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    pub name: String,
    #[serde(default = "default_age_column")]
    pub age_column: String,
    pub columns: Vec<String>,
    pub rows: Vec<RateRow>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumCell {
    pub age_band: String,
    pub column: String,
    pub premium: Decimal,
}

fn default_age_column() -> String {
    AGE_BAND_COLUMN.to_string()
}

impl RateTable {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self { name: name.into(), age_column: default_age_column(), columns, rows: Vec::new() }
    }

    pub fn with_row(mut self, row: RateRow) -> Self {
        self.rows.push(row);
        self
    }

    pub fn age_labels(&self) -> Vec<&str> {
        self.rows.iter().map(|row| row.age_band.as_str()).collect()
    }

    /// Picks the sum-insured column for `target` using the ceiling rule:
    /// the exact amount if present, else the next higher amount, else the
    /// highest available amount.
    pub fn resolve_column(&self, target: u64) -> Option<&str> {
        let mut parsed: Vec<(u64, &str)> = self
            .columns
            .iter()
            .filter(|column| !column.eq_ignore_ascii_case(&self.age_column))
            .filter_map(|column| parse_sum_insured(column).ok().map(|value| (value, column.as_str())))
            .collect();
        if parsed.is_empty() {
            return None;
        }
        parsed.sort_by_key(|(value, _)| *value);

        if let Some((_, column)) = parsed.iter().find(|(value, _)| *value == target) {
            return Some(column);
        }

        if let Some((value, column)) = parsed.iter().find(|(value, _)| *value > target) {
            info!(
                event_name = "premium.column.ceiling",
                sheet = %self.name,
                requested = target,
                resolved = *value,
                column = %column,
                "sum insured not in table, using next higher column"
            );
            return Some(column);
        }

        let (value, column) = parsed[parsed.len() - 1];
        info!(
            event_name = "premium.column.highest",
            sheet = %self.name,
            requested = target,
            resolved = value,
            column = %column,
            "sum insured above every column, using highest"
        );
        Some(column)
    }

    pub fn lookup(&self, age: u32, sum_insured: u64) -> Option<PremiumCell> {
        let labels = self.age_labels();
        debug!(
            event_name = "premium.sheet.age_format",
            sheet = %self.name,
            format = %detect_format(&labels),
            "detected age format"
        );

        let Some(row_index) = find_matching_row(&labels, age) else {
            debug!(
                event_name = "premium.lookup.no_row",
                sheet = %self.name,
                age,
                "no age band matched"
            );
            return None;
        };
        let row = &self.rows[row_index];
        let column = self.resolve_column(sum_insured)?;

        match row.premiums.get(column) {
            Some(premium) => Some(PremiumCell {
                age_band: row.age_band.clone(),
                column: column.to_string(),
                premium: *premium,
            }),
            None => {
                debug!(
                    event_name = "premium.lookup.blank_cell",
                    sheet = %self.name,
                    age_band = %row.age_band,
                    column = %column,
                    "rate cell is blank"
                );
                None
            }
        }
    }
}

/// Parses sum-insured labels such as "5L", "10 Lakh", "7.5 LAC", "5,00,000"
/// or "500000" into rupees. Fractional rupees are truncated.
pub fn parse_sum_insured(label: &str) -> Result<u64, ParseError> {
    let normalized: String =
        label.to_uppercase().chars().filter(|ch| *ch != ',' && !ch.is_whitespace()).collect();
    let invalid = || ParseError::SumInsured(label.trim().to_string());

    let amount = if let Some(captures) = lakh_pattern().captures(&normalized) {
        let lakhs: Decimal = captures[1].parse().map_err(|_| invalid())?;
        lakhs.checked_mul(Decimal::from(LAKH)).ok_or_else(invalid)?
    } else {
        normalized.parse::<Decimal>().map_err(|_| invalid())?
    };

    if amount.is_sign_negative() {
        return Err(invalid());
    }
    amount.trunc().to_u64().ok_or_else(invalid)
}

fn lakh_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+\.?\d*)L").expect("valid regex"))
}
