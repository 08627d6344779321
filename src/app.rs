//! Wires settings, the MARS client, the flat-file caches and the weight resolver.

use std::collections::BTreeSet;

use thiserror::Error;
use time::OffsetDateTime;

use crate::{
    domain::{
        normalize_rows, terminal_markets, weight_inputs, MarketDirectory, MarketError,
        NormalizedPrice, PackageWeights, PriceRow, ResolveError, WeightResolver,
    },
    infra::{
        CacheError, CsvWeightStore, FlatFileCache, MarsClient, MarsClientError, NetWeightTable,
        ReferenceError, ReportQuery, WeightRules,
    },
    util::settings::Settings,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Client(#[from] MarsClientError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Market(#[from] MarketError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error("either a slug id or a market name is required")]
    MissingMarket,
    #[error("end year {end} is before start year {start}")]
    InvalidYearRange { start: i32, end: i32 },
}

/// How a caller names a terminal market.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarketRef<'a> {
    Slug(&'a str),
    Name(&'a str),
}

impl<'a> MarketRef<'a> {
    /// The slug id wins when both are given.
    pub fn from_parts(slug_id: Option<&'a str>, market_name: Option<&'a str>) -> Result<Self, AppError> {
        match (slug_id, market_name) {
            (Some(slug), Some(name)) => {
                tracing::warn!(
                    "[markets] Both slug id {slug} and market name {name:?} given; using the slug id"
                );
                Ok(MarketRef::Slug(slug))
            }
            (Some(slug), None) => Ok(MarketRef::Slug(slug)),
            (None, Some(name)) => Ok(MarketRef::Name(name)),
            (None, None) => Err(AppError::MissingMarket),
        }
    }
}

pub struct MarketNews {
    settings: Settings,
    client: Option<MarsClient>,
    cache: FlatFileCache,
    rules: WeightRules,
    net_weights: NetWeightTable,
}

impl MarketNews {
    /// Without an API key only cached data can be served.
    pub fn new(settings: Settings, api_key: Option<String>) -> Result<Self, AppError> {
        let client = api_key
            .map(|key| MarsClient::with_base_url(&settings.base_url, key))
            .transpose()?;
        let rules = match &settings.rules_path {
            Some(path) => WeightRules::from_path(path)?,
            None => WeightRules::embedded()?,
        };
        let net_weights = match &settings.net_weights_path {
            Some(path) => NetWeightTable::from_path(path)?,
            None => NetWeightTable::embedded()?,
        };
        let cache = FlatFileCache::new(settings.data_dir());

        Ok(Self {
            settings,
            client,
            cache,
            rules,
            net_weights,
        })
    }

    pub fn cache(&self) -> &FlatFileCache {
        &self.cache
    }

    fn client(&self) -> Result<&MarsClient, AppError> {
        self.client
            .as_ref()
            .ok_or(AppError::Client(MarsClientError::MissingApiKey))
    }

    /// Terminal market directory; fetched once, then served from `markets_db.csv`.
    pub async fn markets(&self) -> Result<MarketDirectory, AppError> {
        if let Some(markets) = self.cache.load_markets()? {
            return Ok(MarketDirectory::new(markets));
        }

        let reports = self.client()?.get_reports().await?;
        let markets = terminal_markets(&reports);
        tracing::info!(
            "[markets] {} of {} reports are terminal markets",
            markets.len(),
            reports.len()
        );
        self.cache.save_markets(&markets)?;
        Ok(MarketDirectory::new(markets))
    }

    pub async fn slug_id(&self, market_name: &str) -> Result<String, AppError> {
        let directory = self.markets().await?;
        Ok(directory.slug_id(market_name)?.to_string())
    }

    pub async fn market_name(&self, slug_id: &str) -> Result<String, AppError> {
        let directory = self.markets().await?;
        Ok(directory.market_name(slug_id)?.to_string())
    }

    async fn resolve_slug(&self, market: MarketRef<'_>) -> Result<String, AppError> {
        match market {
            MarketRef::Slug(slug) => Ok(slug.to_string()),
            MarketRef::Name(name) => self.slug_id(name).await,
        }
    }

    /// Price rows of `commodity` at one market for whole calendar years.
    pub async fn prices(
        &self,
        commodity: &str,
        market: MarketRef<'_>,
        start_year: i32,
        end_year: Option<i32>,
    ) -> Result<Vec<PriceRow>, AppError> {
        let query = ReportQuery::new(Some(commodity), start_year, end_year);
        if query.end_year < query.start_year {
            return Err(AppError::InvalidYearRange {
                start: query.start_year,
                end: query.end_year,
            });
        }

        let slug_id = self.resolve_slug(market).await?;
        let market_name = self.market_name(&slug_id).await?;
        let path = self
            .cache
            .prices_path(&market_name, commodity, query.start_year, query.end_year);
        if let Some(rows) = self.cache.load_price_rows(&path)? {
            return Ok(rows);
        }

        let rows = self.client()?.get_report_rows(&slug_id, &query).await?;
        self.cache.save_price_rows(&path, &rows)?;
        Ok(rows)
    }

    /// Commodities traded at a market, taken from the latest full calendar year.
    pub async fn commodities(&self, market: MarketRef<'_>) -> Result<Vec<String>, AppError> {
        let slug_id = self.resolve_slug(market).await?;
        if let Some(commodities) = self.cache.load_commodities(&slug_id)? {
            return Ok(commodities);
        }

        let last_full_year = OffsetDateTime::now_utc().year() - 1;
        let query = ReportQuery::new(None, last_full_year, None);
        let rows = self.client()?.get_report_rows(&slug_id, &query).await?;
        let commodities: Vec<String> = rows
            .into_iter()
            .filter_map(|row| row.commodity)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        self.cache.save_commodities(&slug_id, &commodities)?;
        Ok(commodities)
    }

    pub fn resolver(&self) -> WeightResolver<&WeightRules, &NetWeightTable> {
        WeightResolver::new(&self.rules, &self.net_weights).with_null_policy(self.settings.null_policy)
    }

    pub fn weight_store(&self) -> CsvWeightStore {
        CsvWeightStore::new(self.cache.weights_path())
    }

    /// Runs the resolver against the on-disk weight cache.
    pub fn resolve_weights<V, P>(
        &self,
        commodity: &str,
        varieties: V,
        packages: P,
    ) -> Result<Option<PackageWeights>, AppError>
    where
        V: IntoIterator,
        V::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let mut store = self.weight_store();
        Ok(self
            .resolver()
            .resolve(&mut store, commodity, varieties, packages)?)
    }

    /// Price rows with per-pound prices; rows without a known weight keep `None`.
    pub async fn normalized_prices(
        &self,
        commodity: &str,
        market: MarketRef<'_>,
        start_year: i32,
        end_year: Option<i32>,
    ) -> Result<Vec<NormalizedPrice>, AppError> {
        let rows = self.prices(commodity, market, start_year, end_year).await?;
        let (varieties, packages) = weight_inputs(&rows);

        let weights = if varieties.is_empty() || packages.is_empty() {
            PackageWeights::new()
        } else {
            self.resolve_weights(commodity, &varieties, &packages)?
                .unwrap_or_default()
        };

        Ok(normalize_rows(rows, &weights))
    }
}
