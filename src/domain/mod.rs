//! Domain logic for market prices and package weights lives here.

pub mod entities;
pub mod markets;
pub mod normalize;
pub mod weights;

pub use entities::{
    CommodityWeightRule, Market, NetWeight, PackageKey, PackageWeightEntry, Pounds, PriceRow,
    ReportDescriptor, SlugId,
};
pub use markets::{market_display_name, terminal_markets, MarketDirectory, MarketError};
pub use normalize::{normalize_rows, weight_inputs, NormalizedPrice};
pub use weights::{
    parse_embedded_unit, NetWeightSource, NullPolicy, PackageWeightStore, PackageWeights,
    ResolveError, Resolution, Strategy, StoreError, Unit, WeightResolver, WeightRuleSource,
    WeightSource, DEFAULT_CHAIN,
};
