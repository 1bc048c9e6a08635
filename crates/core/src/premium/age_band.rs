use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::ParseError;

const DAYS_PER_YEAR: u32 = 365;
const FORMAT_SAMPLE_SIZE: usize = 5;

/// Age interval in whole years. `upper == None` is open-ended (`age >= lower`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgeBand {
    pub lower: u32,
    pub upper: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeFormat {
    Exact,
    Bands,
    Unknown,
}

impl AgeFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Bands => "bands",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AgeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AgeBand {
    pub fn exact(age: u32) -> Self {
        Self { lower: age, upper: Some(age) }
    }

    pub fn range(lower: u32, upper: u32) -> Self {
        Self { lower, upper: Some(upper) }
    }

    pub fn open(lower: u32) -> Self {
        Self { lower, upper: None }
    }

    pub fn is_exact(&self) -> bool {
        self.upper == Some(self.lower)
    }

    pub fn contains(&self, age: u32) -> bool {
        match self.upper {
            None => age >= self.lower,
            Some(upper) => self.lower <= age && age <= upper,
        }
    }

    /// Parses a rate-table row label.
    ///
    /// Accepted forms, tried in order: infant day counts ("91 days",
    /// "91-180 days"), open-ended bands ("76+", "> 75", ">= 76"), ranges
    /// ("18-25") and single ages ("35").
    pub fn parse(label: &str) -> Result<Self, ParseError> {
        let trimmed = label.trim();
        let lowered = trimmed.to_ascii_lowercase();

        if lowered.contains("day") {
            if let Some(captures) = day_pattern().captures(&lowered) {
                let lower_days = parse_number(label, &captures[1])?;
                let upper_days = match captures.get(2) {
                    Some(upper) => parse_number(label, upper.as_str())?,
                    None => lower_days,
                };
                let band = checked_range(label, lower_days / DAYS_PER_YEAR, upper_days / DAYS_PER_YEAR)?;
                debug!(
                    event_name = "premium.age_band.days_converted",
                    label = %trimmed,
                    lower_days,
                    upper_days,
                    lower_years = band.lower,
                    "converted day-based age band to years"
                );
                return Ok(band);
            }
        }

        if trimmed.contains('+') || trimmed.contains('>') {
            if let Some(number) = first_number_pattern().find(trimmed) {
                let mut lower = parse_number(label, number.as_str())?;
                let strictly_greater =
                    trimmed.contains('>') && !trimmed.contains(">=") && !trimmed.contains('+');
                if strictly_greater {
                    lower = lower.saturating_add(1);
                }
                return Ok(Self::open(lower));
            }
        }

        if let Some(captures) = range_pattern().captures(trimmed) {
            let lower = parse_number(label, &captures[1])?;
            let upper = parse_number(label, &captures[2])?;
            return checked_range(label, lower, upper);
        }

        if exact_pattern().is_match(trimmed) {
            return Ok(Self::exact(parse_number(label, trimmed)?));
        }

        Err(ParseError::AgeBand(trimmed.to_string()))
    }
}

impl FromStr for AgeBand {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upper {
            None => write!(f, "{}+", self.lower),
            Some(upper) if upper == self.lower => write!(f, "{}", self.lower),
            Some(upper) => write!(f, "{}-{}", self.lower, upper),
        }
    }
}

/// Finds the row whose label matches `age`.
///
/// Exact single-age rows win over containing bands, so tables that mix
/// "one row per age" with coarser bands resolve to the precise row.
pub fn find_matching_row<S: AsRef<str>>(labels: &[S], age: u32) -> Option<usize> {
    let exact = labels.iter().position(|label| {
        AgeBand::parse(label.as_ref()).map(|band| band.is_exact() && band.lower == age).unwrap_or(false)
    });
    if exact.is_some() {
        return exact;
    }

    for (index, label) in labels.iter().enumerate() {
        match AgeBand::parse(label.as_ref()) {
            Ok(band) if band.contains(age) => return Some(index),
            Ok(_) => {}
            Err(error) => {
                warn!(
                    event_name = "premium.age_band.unparseable",
                    label = %label.as_ref(),
                    error = %error,
                    "skipping unparseable age band"
                );
            }
        }
    }

    None
}

/// Samples the first rows to tell "one row per age" sheets from banded ones.
pub fn detect_format<S: AsRef<str>>(labels: &[S]) -> AgeFormat {
    let (exact_count, range_count) = labels
        .iter()
        .take(FORMAT_SAMPLE_SIZE)
        .filter_map(|label| AgeBand::parse(label.as_ref()).ok())
        .fold((0usize, 0usize), |(exact, range), band| {
            if band.is_exact() {
                (exact + 1, range)
            } else {
                (exact, range + 1)
            }
        });

    if exact_count == 0 && range_count == 0 {
        AgeFormat::Unknown
    } else if exact_count > range_count {
        AgeFormat::Exact
    } else {
        AgeFormat::Bands
    }
}

fn checked_range(label: &str, lower: u32, upper: u32) -> Result<AgeBand, ParseError> {
    if lower > upper {
        return Err(ParseError::InvertedAgeBand { label: label.trim().to_string(), lower, upper });
    }
    Ok(AgeBand::range(lower, upper))
}

fn parse_number(label: &str, digits: &str) -> Result<u32, ParseError> {
    digits.parse::<u32>().map_err(|_| ParseError::AgeBand(label.trim().to_string()))
}

fn day_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)\s*-?\s*(\d+)?\s*days?").expect("valid regex"))
}

fn first_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+").expect("valid regex"))
}

fn range_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)\s*-\s*(\d+)").expect("valid regex"))
}

fn exact_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+$").expect("valid regex"))
}
