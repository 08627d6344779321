//! Flat-file CSV caches for market data.
//!
//! Files are written once and served from then on; nothing here expires.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Market, PriceRow};
use crate::infra::weight_store::WEIGHT_CACHE_FILENAME;

pub const MARKETS_FILENAME: &str = "markets_db.csv";
const PRICES_DIR: &str = "cache";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache csv error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct CommodityRow {
    commodity: String,
}

/// Location of every cache file under one data directory.
#[derive(Clone, Debug)]
pub struct FlatFileCache {
    root: PathBuf,
}

impl FlatFileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn markets_path(&self) -> PathBuf {
        self.root.join(MARKETS_FILENAME)
    }

    pub fn weights_path(&self) -> PathBuf {
        self.root.join(WEIGHT_CACHE_FILENAME)
    }

    pub fn commodities_path(&self, slug_id: &str) -> PathBuf {
        self.root
            .join(format!("commodities_list{}.csv", file_name_part(slug_id)))
    }

    pub fn prices_path(
        &self,
        market_name: &str,
        commodity: &str,
        start_year: i32,
        end_year: i32,
    ) -> PathBuf {
        self.root.join(PRICES_DIR).join(format!(
            "{}_{}_{start_year}-{end_year}.csv",
            file_name_part(market_name),
            file_name_part(commodity)
        ))
    }

    pub fn load_markets(&self) -> Result<Option<Vec<Market>>, CacheError> {
        read_rows(&self.markets_path(), "markets")
    }

    pub fn save_markets(&self, markets: &[Market]) -> Result<(), CacheError> {
        write_rows(&self.markets_path(), markets, "markets")
    }

    pub fn load_price_rows(&self, path: &Path) -> Result<Option<Vec<PriceRow>>, CacheError> {
        read_rows(path, "prices")
    }

    pub fn save_price_rows(&self, path: &Path, rows: &[PriceRow]) -> Result<(), CacheError> {
        write_rows(path, rows, "prices")
    }

    pub fn load_commodities(&self, slug_id: &str) -> Result<Option<Vec<String>>, CacheError> {
        let rows: Option<Vec<CommodityRow>> =
            read_rows(&self.commodities_path(slug_id), "commodities")?;
        Ok(rows.map(|rows| rows.into_iter().map(|row| row.commodity).collect()))
    }

    pub fn save_commodities(&self, slug_id: &str, commodities: &[String]) -> Result<(), CacheError> {
        let rows: Vec<CommodityRow> = commodities
            .iter()
            .map(|commodity| CommodityRow {
                commodity: commodity.clone(),
            })
            .collect();
        write_rows(&self.commodities_path(slug_id), &rows, "commodities")
    }
}

/// Whitespace runs become `_`; path separators become `-`.
fn file_name_part(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .replace(['/', '\\'], "-")
}

fn read_rows<T: DeserializeOwned>(path: &Path, label: &str) -> Result<Option<Vec<T>>, CacheError> {
    if !path.exists() {
        tracing::debug!("[cache] No {label} cache found at {}", path.display());
        return Ok(None);
    }

    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<Result<Vec<T>, _>>()?;
    tracing::info!(
        "[cache] Loaded {} {label} rows from {}",
        rows.len(),
        path.display()
    );
    Ok(Some(rows))
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T], label: &str) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    tracing::info!(
        "[cache] Saved {} {label} rows to {}",
        rows.len(),
        path.display()
    );
    Ok(())
}
