pub mod config;
pub mod errors;
pub mod premium;
pub mod retrieval;

pub use config::{AppConfig, ConfigError, LoadOptions};
pub use errors::{ApplicationError, ParseError, PremiumError};
pub use premium::age_band::{detect_format, find_matching_row, AgeBand, AgeFormat};
pub use premium::catalog::{CatalogError, PremiumCatalog};
pub use premium::rate_table::{parse_sum_insured, PremiumCell, RateRow, RateTable};
pub use premium::registry::{match_product, RateTableRegistry, RegistryEntry, RegistryError};
pub use premium::workbook::{FileWorkbookLoader, Workbook, WorkbookError, WorkbookLoader};
pub use premium::{
    floater_sheet_name, format_amount, FamilyFloaterQuote, IndividualQuote, Member, MemberPremium,
    PolicyType, PremiumEngine, PremiumQuote, PremiumRequest,
};
pub use retrieval::{
    detect_product, CollectionCatalog, DocumentQuery, DocumentStore, InMemoryDocumentStore,
    RetrievalError, RetrievedDocument, StoredDocument,
};
