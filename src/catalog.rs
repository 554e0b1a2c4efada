// src/catalog.rs
use crate::error::AppError;
use log::info;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

pub const TICKERS_FILE: &str = "tickers.csv";
pub const LOGOS_FILE: &str = "logo.csv";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerEntry {
    pub company: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogoEntry {
    pub company: String,
    pub logo: String,
}

/// Symbol and logo reference data, read from two headerless CSV files.
#[derive(Debug, Default)]
pub struct TickerCatalog {
    tickers: Vec<TickerEntry>,
    logos: Vec<LogoEntry>,
}

impl TickerCatalog {
    #[cfg(test)]
    pub fn new(tickers: Vec<TickerEntry>, logos: Vec<LogoEntry>) -> Self {
        Self { tickers, logos }
    }

    pub fn load(dir: &Path) -> Result<Self, AppError> {
        let tickers = read_pairs(&dir.join(TICKERS_FILE))?
            .into_iter()
            .map(|(company, symbol)| TickerEntry { company, symbol })
            .collect::<Vec<_>>();
        let logos = read_pairs(&dir.join(LOGOS_FILE))?
            .into_iter()
            .map(|(company, logo)| LogoEntry { company, logo })
            .collect::<Vec<_>>();
        info!(
            "Loaded {} tickers and {} logos from {}",
            tickers.len(),
            logos.len(),
            dir.display()
        );
        Ok(Self { tickers, logos })
    }

    #[cfg(test)]
    pub fn tickers(&self) -> &[TickerEntry] {
        &self.tickers
    }

    pub fn full_name(&self, stock_symbol: &str) -> Option<&TickerEntry> {
        if stock_symbol.is_empty() {
            return None;
        }
        let symbol = stock_symbol.to_uppercase();
        self.tickers.iter().find(|t| t.symbol == symbol)
    }

    pub fn contains(&self, stock_symbol: &str) -> bool {
        self.full_name(stock_symbol).is_some()
    }

    /// Logo rows are keyed by symbol; rows keyed by company name are accepted
    /// as a fallback.
    pub fn logo_url(&self, stock_symbol: &str) -> Option<&str> {
        if stock_symbol.is_empty() {
            return None;
        }
        let symbol = stock_symbol.to_uppercase();
        self.logos
            .iter()
            .find(|l| l.company == symbol)
            .or_else(|| {
                let company = &self.full_name(&symbol)?.company;
                self.logos.iter().find(|l| &l.company == company)
            })
            .map(|l| l.logo.as_str())
    }
}

fn read_pairs(path: &Path) -> Result<Vec<(String, String)>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::Catalog(format!("{} not found: {}", path.display(), e)))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut pairs = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() < 2 {
            continue;
        }
        pairs.push((record[0].trim().to_string(), record[1].trim().to_string()));
    }
    Ok(pairs)
}

/// Loads the catalog on first use and keeps it until `clear` is called.
pub struct CatalogCache {
    dir: PathBuf,
    cached: RwLock<Option<Arc<TickerCatalog>>>,
}

impl CatalogCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cached: RwLock::new(None),
        }
    }

    #[cfg(test)]
    pub fn preloaded(catalog: TickerCatalog) -> Self {
        Self {
            dir: PathBuf::new(),
            cached: RwLock::new(Some(Arc::new(catalog))),
        }
    }

    pub fn get(&self) -> Result<Arc<TickerCatalog>, AppError> {
        if let Some(catalog) = self.read_cached()? {
            return Ok(catalog);
        }
        let mut slot = self
            .cached
            .write()
            .map_err(|_| AppError::Catalog("catalog lock poisoned".into()))?;
        if let Some(catalog) = slot.as_ref() {
            return Ok(catalog.clone());
        }
        let catalog = Arc::new(TickerCatalog::load(&self.dir)?);
        *slot = Some(catalog.clone());
        Ok(catalog)
    }

    #[allow(dead_code)]
    pub fn clear(&self) {
        if let Ok(mut slot) = self.cached.write() {
            *slot = None;
        }
    }

    fn read_cached(&self) -> Result<Option<Arc<TickerCatalog>>, AppError> {
        let slot = self
            .cached
            .read()
            .map_err(|_| AppError::Catalog("catalog lock poisoned".into()))?;
        Ok(slot.clone())
    }
}

#[cfg(test)]
pub(crate) fn sample_catalog() -> TickerCatalog {
    TickerCatalog::new(
        vec![
            TickerEntry {
                company: "Apple Inc.".into(),
                symbol: "AAPL".into(),
            },
            TickerEntry {
                company: "Microsoft Corporation".into(),
                symbol: "MSFT".into(),
            },
            TickerEntry {
                company: "NVIDIA Corporation".into(),
                symbol: "NVDA".into(),
            },
        ],
        vec![
            LogoEntry {
                company: "AAPL".into(),
                logo: "https://logo.clearbit.com/apple.com".into(),
            },
            LogoEntry {
                company: "Microsoft Corporation".into(),
                logo: "https://logo.clearbit.com/microsoft.com".into(),
            },
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_files(dir: &Path, tickers: &str, logos: &str) {
        fs::write(dir.join(TICKERS_FILE), tickers).unwrap();
        fs::write(dir.join(LOGOS_FILE), logos).unwrap();
    }

    #[test]
    fn load_trims_fields_and_skips_short_rows() {
        let dir = tempfile::tempdir().unwrap();
        write_files(
            dir.path(),
            " Apple Inc. , AAPL \nlonely\nTesla Inc.,TSLA,extra\n",
            "AAPL,https://logo.clearbit.com/apple.com\n",
        );

        let catalog = TickerCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.tickers().len(), 2);
        assert_eq!(catalog.full_name("aapl").unwrap().company, "Apple Inc.");
        assert_eq!(catalog.full_name("TSLA").unwrap().company, "Tesla Inc.");
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(TICKERS_FILE), "Apple Inc.,AAPL\n").unwrap();

        let err = TickerCatalog::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains(LOGOS_FILE));
    }

    #[test]
    fn lookups_are_case_insensitive_and_reject_empty() {
        let catalog = sample_catalog();
        assert!(catalog.contains("nvda"));
        assert!(!catalog.contains("ZZZZ"));
        assert!(catalog.full_name("").is_none());
        assert!(catalog.logo_url("").is_none());
    }

    #[test]
    fn logo_by_symbol_then_company() {
        let catalog = sample_catalog();
        assert_eq!(
            catalog.logo_url("aapl"),
            Some("https://logo.clearbit.com/apple.com")
        );
        assert_eq!(
            catalog.logo_url("MSFT"),
            Some("https://logo.clearbit.com/microsoft.com")
        );
        assert_eq!(catalog.logo_url("NVDA"), None);
    }

    #[test]
    fn cache_loads_once_until_cleared() {
        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path(), "Apple Inc.,AAPL\n", "");
        let cache = CatalogCache::new(dir.path());

        let first = cache.get().unwrap();
        write_files(dir.path(), "Apple Inc.,AAPL\nTesla Inc.,TSLA\n", "");
        let second = cache.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!second.contains("TSLA"));

        cache.clear();
        assert!(cache.get().unwrap().contains("TSLA"));
    }
}
