use thiserror::Error;

use super::entities::{Market, ReportDescriptor};

const TERMINAL_MARKET_TYPE: &str = "Terminal";

/// Report-title fragments and the category suffix they map to, checked in order.
const CATEGORY_SUFFIXES: &[(&[&str], &str)] = &[
    (&["Fruit"], "fruits"),
    (&["Nuts"], "nuts"),
    (&["Vegetables", "Vegetable"], "vegetables"),
    (&["Onions and Potatoes"], "onions and potatoes"),
    (&["Herbs"], "herbs"),
    (&["Tropical F&V"], "tropical f&v"),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarketError {
    #[error("{0:?} is not a known market name")]
    UnknownMarket(String),
    #[error("{0:?} is not a known slug id")]
    UnknownSlug(String),
}

/// Short market name such as `Atlanta fruits` for a terminal market report.
///
/// Falls back to the report title when no category matches.
pub fn market_display_name(market: &str, report_title: &str) -> String {
    let city = market.replace("Terminal Market", "");
    let city = city.trim();

    CATEGORY_SUFFIXES
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| report_title.contains(needle)))
        .map(|(_, suffix)| {
            if city.is_empty() {
                suffix.to_string()
            } else {
                format!("{city} {suffix}")
            }
        })
        .unwrap_or_else(|| report_title.to_string())
}

/// Keeps terminal market reports and names them.
pub fn terminal_markets(reports: &[ReportDescriptor]) -> Vec<Market> {
    reports
        .iter()
        .filter(|report| {
            report
                .market_types
                .first()
                .is_some_and(|kind| kind == TERMINAL_MARKET_TYPE)
        })
        .map(|report| Market {
            slug_id: report.slug_id.clone(),
            market_name: market_display_name(
                report.markets.first().map(String::as_str).unwrap_or(""),
                &report.report_title,
            ),
        })
        .collect()
}

/// Two-way slug id / market name lookup.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarketDirectory {
    markets: Vec<Market>,
}

impl MarketDirectory {
    pub fn new(markets: Vec<Market>) -> Self {
        Self { markets }
    }

    pub fn markets(&self) -> &[Market] {
        &self.markets
    }

    pub fn slug_id(&self, market_name: &str) -> Result<&str, MarketError> {
        self.markets
            .iter()
            .find(|market| market.market_name == market_name)
            .map(|market| market.slug_id.as_str())
            .ok_or_else(|| MarketError::UnknownMarket(market_name.to_string()))
    }

    pub fn market_name(&self, slug_id: &str) -> Result<&str, MarketError> {
        self.markets
            .iter()
            .find(|market| market.slug_id == slug_id)
            .map(|market| market.market_name.as_str())
            .ok_or_else(|| MarketError::UnknownSlug(slug_id.to_string()))
    }
}
