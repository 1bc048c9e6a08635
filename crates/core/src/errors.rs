use thiserror::Error;

use crate::config::ConfigError;
use crate::premium::catalog::CatalogError;
use crate::retrieval::RetrievalError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("cannot parse age band `{0}`")]
    AgeBand(String),
    #[error("age band `{label}` has lower bound {lower} above upper bound {upper}")]
    InvertedAgeBand { label: String, lower: u32, upper: u32 },
    #[error("cannot parse sum insured `{0}`")]
    SumInsured(String),
}

/// Lookup misses and invalid requests from the premium engine.
///
/// Display strings are part of the observation text the reasoning loop feeds
/// back to the model, so they stay stable.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PremiumError {
    #[error("No members provided")]
    NoMembers,
    #[error("Unsupported composition: {num_adults} adults, {num_children} children")]
    UnsupportedComposition { num_adults: u32, num_children: u32 },
    #[error("Sheet '{sheet}' not found in workbook. Available sheets: [{}]", .available.join(", "))]
    SheetNotFound { sheet: String, available: Vec<String> },
    #[error("Premium not found for age {age}, sum insured {sum_insured} in sheet {sheet}")]
    PremiumNotFound { age: u32, sum_insured: u64, sheet: String },
    #[error("Must provide members or eldest_age for family floater")]
    MissingEldestAge,
    #[error("Unknown policy_type: {0}. Use 'individual' or 'family_floater'")]
    UnknownPolicyType(String),
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Premium(#[from] PremiumError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

impl ApplicationError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Parse(_) => "invalid_input",
            Self::Premium(_) => "premium_lookup",
            Self::Catalog(CatalogError::UnknownProduct { .. }) => "unknown_product",
            Self::Catalog(_) => "rate_table_unavailable",
            Self::Retrieval(_) => "retrieval_unavailable",
            Self::Configuration(_) => "config_validation",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Parse(_) | Self::Premium(_) => {
                "The premium request could not be priced. Check ages, composition and sum insured."
            }
            Self::Catalog(CatalogError::UnknownProduct { .. }) => {
                "No premium rate table is registered for that product."
            }
            Self::Catalog(_) | Self::Retrieval(_) => {
                "Product data is not available yet. Run ingestion for this product first."
            }
            Self::Configuration(_) => "The assistant is misconfigured. Check premia.toml.",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::config::ConfigError;
    use crate::errors::{ApplicationError, ParseError, PremiumError};
    use crate::premium::catalog::CatalogError;
    use crate::retrieval::RetrievalError;

    #[test]
    fn sheet_not_found_lists_available_sheets() {
        let error = PremiumError::SheetNotFound {
            sheet: "2 Adults + 3 Children".to_owned(),
            available: vec!["Individual".to_owned(), "2 Adults".to_owned()],
        };

        assert_eq!(
            error.to_string(),
            "Sheet '2 Adults + 3 Children' not found in workbook. Available sheets: [Individual, 2 Adults]"
        );
    }

    #[test]
    fn premium_error_maps_to_premium_lookup_class() {
        let error = ApplicationError::from(PremiumError::NoMembers);

        assert_eq!(error.error_class(), "premium_lookup");
        assert!(error.user_message().contains("could not be priced"));
    }

    #[test]
    fn unknown_product_has_dedicated_class() {
        let error = ApplicationError::from(CatalogError::UnknownProduct {
            requested: "Zeta".to_owned(),
            available: vec!["ActivAssure".to_owned()],
        });

        assert_eq!(error.error_class(), "unknown_product");
    }

    #[test]
    fn parse_error_maps_to_invalid_input() {
        let error = ApplicationError::from(ParseError::SumInsured("abc".to_owned()));

        assert_eq!(error.error_class(), "invalid_input");
        assert_eq!(error.to_string(), "cannot parse sum insured `abc`");
    }

    #[test]
    fn config_and_retrieval_failures_keep_their_source_text() {
        let config = ApplicationError::from(ConfigError::Validation("agent.max_iterations must be >= 1".to_owned()));
        assert_eq!(config.error_class(), "config_validation");
        assert_eq!(config.to_string(), "configuration validation failed: agent.max_iterations must be >= 1");

        let retrieval = ApplicationError::from(RetrievalError::CollectionNotFound(PathBuf::from("data/ActivFit")));
        assert_eq!(retrieval.error_class(), "retrieval_unavailable");
        assert!(retrieval.user_message().contains("Run ingestion"));
    }
}
