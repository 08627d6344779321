//! Read-only reference tables used by the weight resolver.
//!
//! Both tables ship embedded in the binary and can be replaced by CSV files on disk.

use std::{collections::HashMap, io::Read, path::Path};

use thiserror::Error;

use crate::domain::{
    CommodityWeightRule, NetWeight, NetWeightSource, Pounds, WeightRuleSource,
};
use crate::util::assets::{load_asset, NET_WEIGHTS_ASSET, WEIGHT_RULES_ASSET};

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("reference table io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("reference table csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("embedded reference table {0} is missing")]
    MissingAsset(&'static str),
}

fn read_rows<T, R>(reader: R) -> Result<Vec<T>, ReferenceError>
where
    T: serde::de::DeserializeOwned,
    R: Read,
{
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let rows = reader.deserialize().collect::<Result<Vec<T>, _>>()?;
    Ok(rows)
}

fn read_embedded<T>(asset: &'static str) -> Result<Vec<T>, ReferenceError>
where
    T: serde::de::DeserializeOwned,
{
    let data = load_asset(asset).ok_or(ReferenceError::MissingAsset(asset))?;
    read_rows(&data[..])
}

/// Commodity weight rules keyed by commodity.
#[derive(Clone, Debug, Default)]
pub struct WeightRules {
    by_commodity: HashMap<String, Vec<CommodityWeightRule>>,
}

impl WeightRules {
    pub fn from_rules(rules: Vec<CommodityWeightRule>) -> Self {
        let mut by_commodity: HashMap<String, Vec<CommodityWeightRule>> = HashMap::new();
        for rule in rules {
            by_commodity
                .entry(rule.commodity.clone())
                .or_default()
                .push(rule);
        }
        Self { by_commodity }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ReferenceError> {
        Ok(Self::from_rules(read_rows(reader)?))
    }

    pub fn from_path(path: &Path) -> Result<Self, ReferenceError> {
        let rules = Self::from_reader(std::fs::File::open(path)?)?;
        tracing::info!(
            "[reference] Loaded weight rules for {} commodities from {}",
            rules.len(),
            path.display()
        );
        Ok(rules)
    }

    pub fn embedded() -> Result<Self, ReferenceError> {
        Ok(Self::from_rules(read_embedded(WEIGHT_RULES_ASSET)?))
    }

    /// Number of commodities with at least one rule.
    pub fn len(&self) -> usize {
        self.by_commodity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_commodity.is_empty()
    }
}

impl WeightRuleSource for WeightRules {
    fn covers(&self, commodity: &str) -> bool {
        self.by_commodity.contains_key(commodity)
    }

    /// An exact variety rule beats the commodity-wide one.
    fn reference_commodity(&self, commodity: &str, variety: &str) -> Option<&str> {
        let rules = self.by_commodity.get(commodity)?;
        rules
            .iter()
            .find(|rule| rule.variety == variety)
            .or_else(|| rules.iter().find(|rule| rule.is_wildcard()))
            .map(|rule| rule.reference_commodity.as_str())
    }
}

/// Net weights keyed by (reference commodity, package description).
#[derive(Clone, Debug, Default)]
pub struct NetWeightTable {
    weights: HashMap<(String, String), Pounds>,
}

impl NetWeightTable {
    /// Later duplicates of a key are ignored.
    pub fn from_rows(rows: Vec<NetWeight>) -> Self {
        let mut weights = HashMap::new();
        for row in rows {
            if !row.pounds.is_finite() || row.pounds < 0.0 {
                tracing::warn!(
                    "[reference] Skipping net weight {} for {} / {}",
                    row.pounds,
                    row.reference_commodity,
                    row.package
                );
                continue;
            }
            weights
                .entry((row.reference_commodity, row.package))
                .or_insert(row.pounds.trunc() as Pounds);
        }
        Self { weights }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ReferenceError> {
        Ok(Self::from_rows(read_rows(reader)?))
    }

    pub fn from_path(path: &Path) -> Result<Self, ReferenceError> {
        let table = Self::from_reader(std::fs::File::open(path)?)?;
        tracing::info!(
            "[reference] Loaded {} net weights from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn embedded() -> Result<Self, ReferenceError> {
        Ok(Self::from_rows(read_embedded(NET_WEIGHTS_ASSET)?))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

impl NetWeightSource for NetWeightTable {
    fn net_weight(&self, reference_commodity: &str, package: &str) -> Option<Pounds> {
        self.weights
            .get(&(reference_commodity.to_string(), package.to_string()))
            .copied()
    }
}
