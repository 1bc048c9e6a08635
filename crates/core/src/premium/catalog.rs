use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;

use crate::premium::registry::{RateTableRegistry, RegistryError};
use crate::premium::workbook::{FileWorkbookLoader, WorkbookError, WorkbookLoader};
use crate::premium::{default_gst_rate, PremiumEngine};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("no premium chart found for `{requested}`. Available products: {}", .available.join(", "))]
    UnknownProduct { requested: String, available: Vec<String> },
    #[error("could not load premium workbook for `{product}`: {source}")]
    Workbook { product: String, source: WorkbookError },
}

/// Resolves product names through the registry file and keeps one engine per
/// product. The registry is re-read on every resolution so newly ingested
/// products show up without a restart; loaded workbooks stay cached.
pub struct PremiumCatalog<L = FileWorkbookLoader> {
    registry_path: PathBuf,
    loader: L,
    gst_rate: Decimal,
    engines: Mutex<HashMap<String, Arc<PremiumEngine>>>,
}

impl PremiumCatalog<FileWorkbookLoader> {
    pub fn new(registry_path: impl Into<PathBuf>) -> Self {
        Self::with_loader(registry_path, FileWorkbookLoader)
    }
}

impl<L: WorkbookLoader> PremiumCatalog<L> {
    pub fn with_loader(registry_path: impl Into<PathBuf>, loader: L) -> Self {
        Self {
            registry_path: registry_path.into(),
            loader,
            gst_rate: default_gst_rate(),
            engines: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_gst_rate(mut self, gst_rate: Decimal) -> Self {
        self.gst_rate = gst_rate;
        self
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    pub fn registry(&self) -> Result<RateTableRegistry, CatalogError> {
        Ok(RateTableRegistry::load(&self.registry_path)?)
    }

    pub fn product_names(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self.registry()?.product_names())
    }

    /// Returns the registry key `requested` resolves to.
    pub fn resolve(&self, requested: &str) -> Result<String, CatalogError> {
        let registry = self.registry()?;
        registry.resolve(requested).map(|(key, _)| key.to_string()).ok_or_else(|| {
            CatalogError::UnknownProduct {
                requested: requested.to_string(),
                available: registry.product_names(),
            }
        })
    }

    /// Resolves `requested` and returns its engine, loading the workbook on
    /// first use.
    pub fn engine_for(&self, requested: &str) -> Result<(String, Arc<PremiumEngine>), CatalogError> {
        let registry = self.registry()?;
        let Some((key, entry)) = registry.resolve(requested) else {
            return Err(CatalogError::UnknownProduct {
                requested: requested.to_string(),
                available: registry.product_names(),
            });
        };

        if let Some(engine) = self.engines().get(key) {
            return Ok((key.to_string(), Arc::clone(engine)));
        }

        let workbook = self
            .loader
            .load(&entry.excel_path)
            .map_err(|source| CatalogError::Workbook { product: key.to_string(), source })?;
        let engine = Arc::new(PremiumEngine::new(workbook).with_gst_rate(self.gst_rate));
        info!(
            event_name = "premium.catalog.engine_loaded",
            product = %key,
            requested,
            path = %entry.excel_path.display(),
            "loaded premium engine"
        );

        let engine = Arc::clone(self.engines().entry(key.to_string()).or_insert(engine));
        Ok((key.to_string(), engine))
    }

    pub fn clear_cache(&self) {
        self.engines().clear();
    }

    fn engines(&self) -> MutexGuard<'_, HashMap<String, Arc<PremiumEngine>>> {
        match self.engines.lock() {
            Ok(engines) => engines,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
