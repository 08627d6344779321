//! Package weight resolution.
//!
//! Every (variety, package) pair runs through an ordered chain of strategies and
//! the first strategy that produces an answer wins. A call always ends by
//! rewriting the persisted cache with the merged, de-duplicated entries.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::entities::{PackageKey, PackageWeightEntry, Pounds};

/// Read-only (commodity, variety) -> reference commodity lookup.
pub trait WeightRuleSource {
    /// True when at least one rule exists for the commodity.
    fn covers(&self, commodity: &str) -> bool;
    fn reference_commodity(&self, commodity: &str, variety: &str) -> Option<&str>;
}

/// Read-only (reference commodity, package) -> pounds lookup.
pub trait NetWeightSource {
    fn net_weight(&self, reference_commodity: &str, package: &str) -> Option<Pounds>;
}

/// Durable package weight cache. Reads and writes always cover the whole mapping.
pub trait PackageWeightStore {
    fn load(&self) -> Result<Vec<PackageWeightEntry>, StoreError>;
    /// Replaces the stored mapping with `entries`.
    fn save_all(&mut self, entries: &[PackageWeightEntry]) -> Result<(), StoreError>;
}

impl<T: WeightRuleSource + ?Sized> WeightRuleSource for &T {
    fn covers(&self, commodity: &str) -> bool {
        (**self).covers(commodity)
    }

    fn reference_commodity(&self, commodity: &str, variety: &str) -> Option<&str> {
        (**self).reference_commodity(commodity, variety)
    }
}

impl<T: NetWeightSource + ?Sized> NetWeightSource for &T {
    fn net_weight(&self, reference_commodity: &str, package: &str) -> Option<Pounds> {
        (**self).net_weight(reference_commodity, package)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("weight store io error: {0}")]
    Io(#[from] std::io::Error),
    /// Failure specific to the storage backend (encoding, format).
    #[error("weight store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("missing input: {0}")]
    MissingInput(&'static str),
    #[error("malformed package descriptor {descriptor:?}: expected a whole number before {unit:?}")]
    MalformedPackageDescriptor {
        descriptor: String,
        unit: &'static str,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a cached null entry means on later lookups.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    /// A cached null is final, like any other cached weight.
    #[default]
    Sticky,
    /// Cached nulls are skipped and the pair is resolved again.
    Retry,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
    Pound,
    Kilogram,
}

impl Unit {
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Pound => "lb",
            Unit::Kilogram => "kg",
        }
    }

    /// Accepts the bare symbol and its plural, ignoring ASCII case.
    fn matches(self, word: &str) -> bool {
        let word = word.to_ascii_lowercase();
        word == self.symbol() || word.strip_suffix('s') == Some(self.symbol())
    }

    /// Converts a whole count of this unit to pounds, truncating (1 kg = 2.2 lb).
    pub fn to_pounds(self, count: u32) -> Pounds {
        match self {
            Unit::Pound => count,
            Unit::Kilogram => {
                let pounds = u64::from(count) * 22 / 10;
                pounds.min(u64::from(Pounds::MAX)) as Pounds
            }
        }
    }
}

/// One step of the resolution chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    CacheHit,
    EmbeddedUnit(Unit),
    ReferenceTable,
}

pub const DEFAULT_CHAIN: [Strategy; 4] = [
    Strategy::CacheHit,
    Strategy::EmbeddedUnit(Unit::Pound),
    Strategy::EmbeddedUnit(Unit::Kilogram),
    Strategy::ReferenceTable,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightSource {
    Cache,
    EmbeddedUnit(Unit),
    ReferenceTable,
    Unresolved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub pounds: Option<Pounds>,
    pub source: WeightSource,
}

/// Resolved weights keyed by (variety, package).
pub type PackageWeights = BTreeMap<(String, String), Option<Pounds>>;

/// Finds the whole-number count written in front of `unit` in a package descriptor.
///
/// Both `25 lb carton` and `25lb carton` are recognised. Words that merely contain
/// the symbol (`bulb`) are not unit tokens.
pub fn parse_embedded_unit(descriptor: &str, unit: Unit) -> Result<Option<Pounds>, ResolveError> {
    let words: Vec<&str> = descriptor.split_whitespace().collect();

    for (idx, raw) in words.iter().enumerate() {
        let word = raw.trim_matches(|c: char| !c.is_ascii_alphanumeric());

        if unit.matches(word) {
            let count = idx
                .checked_sub(1)
                .map(|prev| words[prev].trim_matches(|c: char| !c.is_ascii_alphanumeric()))
                .unwrap_or("");
            return parse_count(count, descriptor, unit).map(Some);
        }

        if let Some(count) = glued_count(word, unit) {
            return parse_count(count, descriptor, unit).map(Some);
        }
    }

    Ok(None)
}

fn glued_count(word: &str, unit: Unit) -> Option<&str> {
    let split = word.find(|c: char| !c.is_ascii_digit())?;
    if split == 0 {
        return None;
    }
    let (digits, rest) = word.split_at(split);
    unit.matches(rest).then_some(digits)
}

fn parse_count(count: &str, descriptor: &str, unit: Unit) -> Result<Pounds, ResolveError> {
    count
        .parse::<u32>()
        .map(|value| unit.to_pounds(value))
        .map_err(|_| ResolveError::MalformedPackageDescriptor {
            descriptor: descriptor.to_string(),
            unit: unit.symbol(),
        })
}

/// In-memory view of the persisted cache for one resolve call.
#[derive(Debug, Default)]
pub struct CacheIndex {
    weights: HashMap<PackageKey, Option<Pounds>>,
}

impl CacheIndex {
    /// When a key appears more than once, the first known weight wins over nulls.
    pub fn from_entries(entries: &[PackageWeightEntry]) -> Self {
        let mut weights: HashMap<PackageKey, Option<Pounds>> = HashMap::new();
        for entry in entries {
            let slot = weights.entry(entry.key()).or_insert(entry.pounds);
            if slot.is_none() {
                *slot = entry.pounds;
            }
        }
        Self { weights }
    }

    pub fn get(&self, key: &PackageKey) -> Option<Option<Pounds>> {
        self.weights.get(key).copied()
    }
}

/// Appends `fresh` to `existing`, dropping rows that are exact duplicates.
pub fn merge_entries(
    existing: Vec<PackageWeightEntry>,
    fresh: Vec<PackageWeightEntry>,
) -> Vec<PackageWeightEntry> {
    let mut seen = HashSet::new();
    existing
        .into_iter()
        .chain(fresh)
        .filter(|entry| seen.insert(entry.clone()))
        .collect()
}

pub struct WeightResolver<R, N> {
    rules: R,
    net_weights: N,
    chain: Vec<Strategy>,
    null_policy: NullPolicy,
}

impl<R, N> WeightResolver<R, N>
where
    R: WeightRuleSource,
    N: NetWeightSource,
{
    pub fn new(rules: R, net_weights: N) -> Self {
        Self {
            rules,
            net_weights,
            chain: DEFAULT_CHAIN.to_vec(),
            null_policy: NullPolicy::default(),
        }
    }

    pub fn with_null_policy(mut self, null_policy: NullPolicy) -> Self {
        self.null_policy = null_policy;
        self
    }

    pub fn with_chain(mut self, chain: Vec<Strategy>) -> Self {
        self.chain = chain;
        self
    }

    pub fn null_policy(&self) -> NullPolicy {
        self.null_policy
    }

    /// Resolves every (variety, package) combination for `commodity`.
    ///
    /// Returns `Ok(None)` when the commodity has no weight rules at all; the store
    /// is left untouched in that case. Otherwise the store is rewritten with any
    /// newly resolved entries, nulls included.
    pub fn resolve<S, V, P>(
        &self,
        store: &mut S,
        commodity: &str,
        varieties: V,
        packages: P,
    ) -> Result<Option<PackageWeights>, ResolveError>
    where
        S: PackageWeightStore + ?Sized,
        V: IntoIterator,
        V::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let commodity = commodity.trim();
        if commodity.is_empty() {
            return Err(ResolveError::MissingInput("commodity"));
        }
        let varieties: BTreeSet<String> = varieties
            .into_iter()
            .map(|variety| variety.as_ref().to_string())
            .collect();
        if varieties.is_empty() {
            return Err(ResolveError::MissingInput("varieties"));
        }
        let packages: BTreeSet<String> = packages
            .into_iter()
            .map(|package| package.as_ref().to_string())
            .collect();
        if packages.is_empty() {
            return Err(ResolveError::MissingInput("packages"));
        }

        if !self.rules.covers(commodity) {
            warn!(
                "[weights] No weight rules for commodity {commodity:?}; populate the commodity weight rules table first"
            );
            return Ok(None);
        }

        let existing = store.load()?;
        let cache = CacheIndex::from_entries(&existing);

        let mut weights = PackageWeights::new();
        let mut fresh = Vec::new();

        for variety in &varieties {
            for package in &packages {
                let key = PackageKey::new(commodity, variety, package);
                let resolution = self.resolve_pair(&cache, &key)?;
                debug!(
                    "[weights] {commodity} / {variety} / {package}: {:?} via {:?}",
                    resolution.pounds, resolution.source
                );
                if resolution.source != WeightSource::Cache {
                    fresh.push(PackageWeightEntry::new(key, resolution.pounds));
                }
                weights.insert((variety.clone(), package.clone()), resolution.pounds);
            }
        }

        let before = existing.len();
        let merged = merge_entries(existing, fresh);
        store.save_all(&merged)?;

        let unresolved = weights.values().filter(|pounds| pounds.is_none()).count();
        info!(
            "[weights] Resolved {} pairs for {commodity} ({unresolved} unresolved, {} new cache rows)",
            weights.len(),
            merged.len().saturating_sub(before)
        );

        Ok(Some(weights))
    }

    /// Runs the strategy chain for a single key.
    pub fn resolve_pair(
        &self,
        cache: &CacheIndex,
        key: &PackageKey,
    ) -> Result<Resolution, ResolveError> {
        for strategy in &self.chain {
            if let Some(resolution) = self.attempt(*strategy, cache, key)? {
                return Ok(resolution);
            }
        }

        Ok(Resolution {
            pounds: None,
            source: WeightSource::Unresolved,
        })
    }

    /// Applies one strategy; `Ok(None)` passes the key on to the next strategy.
    pub fn attempt(
        &self,
        strategy: Strategy,
        cache: &CacheIndex,
        key: &PackageKey,
    ) -> Result<Option<Resolution>, ResolveError> {
        match strategy {
            Strategy::CacheHit => Ok(cache
                .get(key)
                .filter(|pounds| pounds.is_some() || self.null_policy == NullPolicy::Sticky)
                .map(|pounds| Resolution {
                    pounds,
                    source: WeightSource::Cache,
                })),
            Strategy::EmbeddedUnit(unit) => {
                Ok(parse_embedded_unit(&key.package, unit)?.map(|pounds| Resolution {
                    pounds: Some(pounds),
                    source: WeightSource::EmbeddedUnit(unit),
                }))
            }
            Strategy::ReferenceTable => Ok(self.reference_weight(key).map(|pounds| Resolution {
                pounds: Some(pounds),
                source: WeightSource::ReferenceTable,
            })),
        }
    }

    fn reference_weight(&self, key: &PackageKey) -> Option<Pounds> {
        let reference = self
            .rules
            .reference_commodity(&key.commodity, &key.variety)?;
        self.net_weights.net_weight(reference, &key.package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{CommodityWeightRule, NetWeight};
    use crate::infra::reference::{NetWeightTable, WeightRules};
    use crate::infra::weight_store::MemoryWeightStore;

    fn rules() -> WeightRules {
        WeightRules::from_rules(vec![
            CommodityWeightRule {
                commodity: "Tomatoes".into(),
                variety: "Roma".into(),
                reference_commodity: "Tomatoes".into(),
            },
            CommodityWeightRule {
                commodity: "Tomatoes".into(),
                variety: "Cherry".into(),
                reference_commodity: "Tomatoes, cherry".into(),
            },
        ])
    }

    fn net_weights(pounds: f64) -> NetWeightTable {
        NetWeightTable::from_rows(vec![NetWeight {
            reference_commodity: "Tomatoes".into(),
            package: "cartons 2 layer".into(),
            pounds,
        }])
    }

    fn resolver() -> WeightResolver<WeightRules, NetWeightTable> {
        WeightResolver::new(rules(), net_weights(20.0))
    }

    fn one(weights: &PackageWeights, variety: &str, package: &str) -> Option<Pounds> {
        weights[&(variety.to_string(), package.to_string())]
    }

    #[test]
    fn pounds_are_read_from_the_descriptor() {
        assert_eq!(parse_embedded_unit("25 lb carton", Unit::Pound).unwrap(), Some(25));
        assert_eq!(parse_embedded_unit("cartons 15 lbs loose", Unit::Pound).unwrap(), Some(15));
        assert_eq!(parse_embedded_unit("40lb sacks", Unit::Pound).unwrap(), Some(40));
        assert_eq!(parse_embedded_unit("cartons 2 layer", Unit::Pound).unwrap(), None);
    }

    #[test]
    fn kilograms_convert_and_truncate() {
        assert_eq!(parse_embedded_unit("10 kg box", Unit::Kilogram).unwrap(), Some(22));
        assert_eq!(parse_embedded_unit("3 kg flats", Unit::Kilogram).unwrap(), Some(6));
        assert_eq!(parse_embedded_unit("5 kg", Unit::Kilogram).unwrap(), Some(11));
        for count in 0..200u32 {
            let expected = (f64::from(count) * 2.2 + 1e-9).floor() as u32;
            assert_eq!(Unit::Kilogram.to_pounds(count), expected, "count {count}");
        }
    }

    #[test]
    fn words_containing_the_symbol_are_not_units() {
        assert_eq!(parse_embedded_unit("bulb onions sacks", Unit::Pound).unwrap(), None);
        assert_eq!(parse_embedded_unit("bkg crates", Unit::Kilogram).unwrap(), None);
    }

    #[test]
    fn unit_without_a_whole_number_is_malformed() {
        let err = parse_embedded_unit("half lb bags", Unit::Pound).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::MalformedPackageDescriptor { unit: "lb", .. }
        ));
        assert!(parse_embedded_unit("lb cartons", Unit::Pound).is_err());
        assert!(parse_embedded_unit("1.5 kg tray", Unit::Kilogram).is_err());
    }

    #[test]
    fn pound_token_wins_over_metric() {
        let mut store = MemoryWeightStore::default();
        let weights = resolver()
            .resolve(&mut store, "Tomatoes", ["Roma"], ["10 kg 25 lb cartons"])
            .unwrap()
            .unwrap();
        assert_eq!(one(&weights, "Roma", "10 kg 25 lb cartons"), Some(25));
    }

    #[test]
    fn resolves_documented_examples() {
        let mut store = MemoryWeightStore::default();
        let resolver = resolver();

        let weights = resolver
            .resolve(&mut store, "Tomatoes", ["Roma"], ["25 lb carton"])
            .unwrap()
            .unwrap();
        assert_eq!(weights.len(), 1);
        assert_eq!(one(&weights, "Roma", "25 lb carton"), Some(25));

        let weights = resolver
            .resolve(&mut store, "Tomatoes", ["Roma"], ["10 kg box"])
            .unwrap()
            .unwrap();
        assert_eq!(one(&weights, "Roma", "10 kg box"), Some(22));
    }

    #[test]
    fn reference_table_is_the_last_resort() {
        let mut store = MemoryWeightStore::default();
        let weights = resolver()
            .resolve(&mut store, "Tomatoes", ["Roma", "Cherry"], ["cartons 2 layer"])
            .unwrap()
            .unwrap();
        assert_eq!(one(&weights, "Roma", "cartons 2 layer"), Some(20));
        // Cherry maps to a reference commodity with no such package.
        assert_eq!(one(&weights, "Cherry", "cartons 2 layer"), None);
    }

    #[test]
    fn unresolved_pairs_are_persisted_as_null() {
        let mut store = MemoryWeightStore::default();
        let weights = resolver()
            .resolve(&mut store, "Tomatoes", ["Roma"], ["bushel baskets"])
            .unwrap()
            .unwrap();
        assert_eq!(one(&weights, "Roma", "bushel baskets"), None);
        assert_eq!(
            store.entries(),
            &[PackageWeightEntry {
                commodity: "Tomatoes".into(),
                variety: "Roma".into(),
                package: "bushel baskets".into(),
                pounds: None,
            }]
        );
    }

    #[test]
    fn repeated_calls_are_idempotent() {
        let mut store = MemoryWeightStore::default();
        let resolver = resolver();
        let packages = ["25 lb carton", "cartons 2 layer", "bushel baskets"];

        let first = resolver
            .resolve(&mut store, "Tomatoes", ["Roma", "Cherry"], packages)
            .unwrap();
        let rows_after_first = store.entries().to_vec();
        let second = resolver
            .resolve(&mut store, "Tomatoes", ["Roma", "Cherry"], packages)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.entries(), rows_after_first.as_slice());
        assert_eq!(rows_after_first.len(), 6);
        assert_eq!(store.saves(), 2);
    }

    #[test]
    fn cached_weights_survive_reference_changes() {
        let mut store = MemoryWeightStore::default();
        WeightResolver::new(rules(), net_weights(20.0))
            .resolve(&mut store, "Tomatoes", ["Roma"], ["cartons 2 layer", "flats"])
            .unwrap();

        let updated = WeightResolver::new(
            rules(),
            NetWeightTable::from_rows(vec![
                NetWeight {
                    reference_commodity: "Tomatoes".into(),
                    package: "cartons 2 layer".into(),
                    pounds: 30.0,
                },
                NetWeight {
                    reference_commodity: "Tomatoes".into(),
                    package: "flats".into(),
                    pounds: 18.0,
                },
            ]),
        );
        let weights = updated
            .resolve(&mut store, "Tomatoes", ["Roma"], ["cartons 2 layer", "flats"])
            .unwrap()
            .unwrap();

        assert_eq!(one(&weights, "Roma", "cartons 2 layer"), Some(20));
        // The null recorded on the first call sticks.
        assert_eq!(one(&weights, "Roma", "flats"), None);
    }

    #[test]
    fn retry_policy_re_resolves_cached_nulls() {
        let mut store = MemoryWeightStore::default();
        WeightResolver::new(rules(), net_weights(20.0))
            .resolve(&mut store, "Tomatoes", ["Roma"], ["flats"])
            .unwrap();

        let improved = WeightResolver::new(
            rules(),
            NetWeightTable::from_rows(vec![NetWeight {
                reference_commodity: "Tomatoes".into(),
                package: "flats".into(),
                pounds: 18.0,
            }]),
        )
        .with_null_policy(NullPolicy::Retry);

        let weights = improved
            .resolve(&mut store, "Tomatoes", ["Roma"], ["flats"])
            .unwrap()
            .unwrap();
        assert_eq!(one(&weights, "Roma", "flats"), Some(18));

        // The old null row stays; the resolved row is appended after it.
        let pounds: Vec<_> = store.entries().iter().map(|entry| entry.pounds).collect();
        assert_eq!(pounds, vec![None, Some(18)]);

        // Once a weight exists it is served from the cache under either policy.
        let sticky = WeightResolver::new(rules(), net_weights(20.0));
        let weights = sticky
            .resolve(&mut store, "Tomatoes", ["Roma"], ["flats"])
            .unwrap()
            .unwrap();
        assert_eq!(one(&weights, "Roma", "flats"), Some(18));
    }

    #[test]
    fn unknown_commodity_returns_no_data() {
        let mut store = MemoryWeightStore::default();
        let result = resolver()
            .resolve(&mut store, "Kumquats", ["Nagami"], ["10 lb cartons"])
            .unwrap();
        assert!(result.is_none());
        assert!(store.entries().is_empty());
        assert_eq!(store.saves(), 0);
    }

    #[test]
    fn malformed_descriptor_fails_the_call_without_writing() {
        let mut store = MemoryWeightStore::default();
        let err = resolver()
            .resolve(&mut store, "Tomatoes", ["Roma"], ["cartons 2 layer", "x lb bags"])
            .unwrap_err();
        assert!(matches!(err, ResolveError::MalformedPackageDescriptor { .. }));
        assert_eq!(store.saves(), 0);
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let mut store = MemoryWeightStore::default();
        let no_varieties: [&str; 0] = [];
        assert!(matches!(
            resolver().resolve(&mut store, " ", ["Roma"], ["25 lb carton"]),
            Err(ResolveError::MissingInput("commodity"))
        ));
        assert!(matches!(
            resolver().resolve(&mut store, "Tomatoes", no_varieties, ["25 lb carton"]),
            Err(ResolveError::MissingInput("varieties"))
        ));
    }

    #[test]
    fn each_strategy_can_be_tried_alone() {
        let resolver = resolver();
        let key = PackageKey::new("Tomatoes", "Roma", "cartons 2 layer");
        let cache = CacheIndex::from_entries(&[PackageWeightEntry::new(key.clone(), Some(19))]);

        assert_eq!(
            resolver.attempt(Strategy::CacheHit, &cache, &key).unwrap(),
            Some(Resolution {
                pounds: Some(19),
                source: WeightSource::Cache
            })
        );
        assert_eq!(
            resolver
                .attempt(Strategy::EmbeddedUnit(Unit::Pound), &cache, &key)
                .unwrap(),
            None
        );
        assert_eq!(
            resolver
                .attempt(Strategy::ReferenceTable, &CacheIndex::default(), &key)
                .unwrap(),
            Some(Resolution {
                pounds: Some(20),
                source: WeightSource::ReferenceTable
            })
        );
    }

    #[test]
    fn custom_chain_skips_the_cache() {
        let resolver = resolver().with_chain(vec![Strategy::ReferenceTable]);
        let key = PackageKey::new("Tomatoes", "Roma", "cartons 2 layer");
        let cache = CacheIndex::from_entries(&[PackageWeightEntry::new(key.clone(), Some(19))]);
        let resolution = resolver.resolve_pair(&cache, &key).unwrap();
        assert_eq!(resolution.pounds, Some(20));
        assert_eq!(resolution.source, WeightSource::ReferenceTable);
    }

    #[test]
    fn merge_drops_exact_duplicates_only() {
        let key = PackageKey::new("Tomatoes", "Roma", "flats");
        let existing = vec![
            PackageWeightEntry::new(key.clone(), None),
            PackageWeightEntry::new(key.clone(), None),
        ];
        let fresh = vec![
            PackageWeightEntry::new(key.clone(), None),
            PackageWeightEntry::new(key.clone(), Some(18)),
        ];
        let merged = merge_entries(existing, fresh);
        assert_eq!(
            merged,
            vec![
                PackageWeightEntry::new(key.clone(), None),
                PackageWeightEntry::new(key, Some(18)),
            ]
        );
    }
}
