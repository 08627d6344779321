use serde::{Deserialize, Serialize};

/// Whole pounds per package.
pub type Pounds = u32;

/// Numeric market identifier used by the Market News API ("slug id").
pub type SlugId = String;

/// A terminal market as stored in the market directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub slug_id: SlugId,
    pub market_name: String,
}

/// Report descriptor as listed by the `reports` endpoint.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ReportDescriptor {
    pub slug_id: SlugId,
    pub report_title: String,
    pub markets: Vec<String>,
    pub market_types: Vec<String>,
}

/// One price line of a terminal market report.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceRow {
    pub report_date: Option<String>,
    pub slug_id: Option<String>,
    pub commodity: Option<String>,
    pub variety: Option<String>,
    pub package: Option<String>,
    pub item_size: Option<String>,
    pub properties: Option<String>,
    pub grade: Option<String>,
    pub organic: Option<String>,
    pub origin: Option<String>,
    pub low_price: Option<f64>,
    pub high_price: Option<f64>,
    pub unit_sales: Option<String>,
}

/// Maps a (commodity, variety) to the commodity name used by the net weight table.
///
/// A variety of `*` (or an empty variety) applies to every variety of the commodity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommodityWeightRule {
    pub commodity: String,
    pub variety: String,
    pub reference_commodity: String,
}

impl CommodityWeightRule {
    pub fn is_wildcard(&self) -> bool {
        let variety = self.variety.trim();
        variety.is_empty() || variety == "*"
    }
}

/// One row of the net weight reference table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetWeight {
    pub reference_commodity: String,
    pub package: String,
    /// Published weight; fractional pounds are truncated on lookup.
    pub pounds: f64,
}

/// Lookup key of the persisted package weight cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageKey {
    pub commodity: String,
    pub variety: String,
    pub package: String,
}

impl PackageKey {
    pub fn new(commodity: &str, variety: &str, package: &str) -> Self {
        Self {
            commodity: commodity.to_string(),
            variety: variety.to_string(),
            package: package.to_string(),
        }
    }
}

/// A resolved (or unresolvable) package weight, persisted across runs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageWeightEntry {
    pub commodity: String,
    pub variety: String,
    pub package: String,
    pub pounds: Option<Pounds>,
}

impl PackageWeightEntry {
    pub fn new(key: PackageKey, pounds: Option<Pounds>) -> Self {
        Self {
            commodity: key.commodity,
            variety: key.variety,
            package: key.package,
            pounds,
        }
    }

    pub fn key(&self) -> PackageKey {
        PackageKey::new(&self.commodity, &self.variety, &self.package)
    }
}
