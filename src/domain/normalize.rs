use std::collections::BTreeSet;

use super::entities::{Pounds, PriceRow};
use super::weights::PackageWeights;

/// A price row with its package weight and per-pound prices attached.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedPrice {
    pub row: PriceRow,
    pub pounds: Option<Pounds>,
    pub low_price_per_lb: Option<f64>,
    pub high_price_per_lb: Option<f64>,
}

/// Variety key used for rows that report no variety.
pub fn variety_key(row: &PriceRow) -> &str {
    row.variety.as_deref().unwrap_or("")
}

/// Distinct varieties and packages present in `rows`, ready for weight resolution.
pub fn weight_inputs(rows: &[PriceRow]) -> (BTreeSet<String>, BTreeSet<String>) {
    let varieties = rows
        .iter()
        .filter(|row| row.package.is_some())
        .map(|row| variety_key(row).to_string())
        .collect();
    let packages = rows
        .iter()
        .filter_map(|row| row.package.clone())
        .collect();
    (varieties, packages)
}

pub fn normalize_rows(rows: Vec<PriceRow>, weights: &PackageWeights) -> Vec<NormalizedPrice> {
    rows.into_iter()
        .map(|row| {
            let pounds = row.package.as_ref().and_then(|package| {
                weights
                    .get(&(variety_key(&row).to_string(), package.clone()))
                    .copied()
                    .flatten()
            });
            let per_lb = |price: Option<f64>| match (price, pounds) {
                (Some(price), Some(pounds)) if pounds > 0 => Some(price / f64::from(pounds)),
                _ => None,
            };
            NormalizedPrice {
                low_price_per_lb: per_lb(row.low_price),
                high_price_per_lb: per_lb(row.high_price),
                pounds,
                row,
            }
        })
        .collect()
}
