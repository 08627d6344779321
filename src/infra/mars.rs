//! Thin asynchronous client for the USDA AMS Market News (MARS) API v1.2.
//!
//! - Authenticates with HTTP basic auth: the API key is the username, the password is empty.
//! - Lists reports and pulls the detail rows of a terminal market report.

use reqwest::{Client, Url};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{PriceRow, ReportDescriptor};
use crate::util::settings::DEFAULT_BASE_URL;
use crate::util::version::user_agent;

/// Section holding the price lines when a report is requested with `allSections=true`.
const DETAIL_SECTION: &str = "Report Detail";

#[derive(Debug, Error)]
pub enum MarsClientError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("api error: {0}")]
    Api(String),
    #[error("report response has no detail section")]
    MissingSection,
    #[error("no API key configured; set USDA_MARS_API_KEY or pass --api-key")]
    MissingApiKey,
}

/// Filter for a report request covering whole calendar years.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportQuery {
    pub commodity: Option<String>,
    pub start_year: i32,
    pub end_year: i32,
}

impl ReportQuery {
    /// `end_year` defaults to `start_year`.
    pub fn new(commodity: Option<&str>, start_year: i32, end_year: Option<i32>) -> Self {
        Self {
            commodity: commodity.map(str::to_string),
            start_year,
            end_year: end_year.unwrap_or(start_year),
        }
    }

    pub fn date_range(&self) -> String {
        format!("01/01/{}:12/31/{}", self.start_year, self.end_year)
    }

    /// Value of the `q` parameter, e.g. `commodity=Tomatoes;report_begin_date=01/01/2020:12/31/2020;`.
    pub fn filter(&self) -> String {
        let mut filter = String::new();
        if let Some(commodity) = &self.commodity {
            filter.push_str(&format!("commodity={commodity};"));
        }
        filter.push_str(&format!("report_begin_date={};", self.date_range()));
        filter
    }
}

#[derive(Clone)]
pub struct MarsClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl MarsClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, MarsClientError> {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(base: &str, api_key: impl Into<String>) -> Result<Self, MarsClientError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(MarsClientError::MissingApiKey);
        }
        let base_url = if base.ends_with('/') {
            Url::parse(base)?
        } else {
            Url::parse(&format!("{base}/"))?
        };
        let http = Client::builder().user_agent(user_agent()).build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    /// Every report the API publishes, terminal markets included.
    pub async fn get_reports(&self) -> Result<Vec<ReportDescriptor>, MarsClientError> {
        let url = self.reports_url()?;
        tracing::info!("[mars] Requesting report list from {url}");
        let raw = self.fetch_json(url).await?;
        let reports = parse_reports(raw)?;
        tracing::info!("[mars] Received {} report descriptors", reports.len());
        Ok(reports)
    }

    /// Detail rows of the report published under `slug_id`.
    pub async fn get_report_rows(
        &self,
        slug_id: &str,
        query: &ReportQuery,
    ) -> Result<Vec<PriceRow>, MarsClientError> {
        let url = self.report_url(slug_id, query)?;
        tracing::info!("[mars] Requesting report {slug_id} from {url}");
        let raw = self.fetch_json(url).await?;
        let rows = parse_report_rows(raw)?;
        tracing::info!(
            "[mars] Parsed {} rows for report {slug_id} ({})",
            rows.len(),
            query.date_range()
        );
        Ok(rows)
    }

    fn reports_url(&self) -> Result<Url, url::ParseError> {
        self.base_url.join("reports")
    }

    fn report_url(&self, slug_id: &str, query: &ReportQuery) -> Result<Url, url::ParseError> {
        let mut url = self.base_url.join(&format!("reports/{}", slug_id.trim()))?;
        let filter = query.filter().replace('&', "%26");
        url.set_query(Some(&format!("q={filter}&allSections=true")));
        Ok(url)
    }

    async fn fetch_json(&self, url: Url) -> Result<Value, MarsClientError> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.api_key, Some(""))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<Value>().await?)
    }
}

fn api_error(value: &Value) -> Option<MarsClientError> {
    let object = value.as_object()?;
    let message = object
        .get("message")
        .or_else(|| object.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("unexpected response shape");
    Some(MarsClientError::Api(message.to_string()))
}

fn parse_reports(value: Value) -> Result<Vec<ReportDescriptor>, MarsClientError> {
    if let Some(err) = api_error(&value) {
        return Err(err);
    }
    let reports = serde_json::from_value::<Vec<ReportDescriptorDto>>(value)?;
    Ok(reports.into_iter().map(ReportDescriptor::from).collect())
}

/// Picks the detail section by name, falling back to the second section.
fn parse_report_rows(value: Value) -> Result<Vec<PriceRow>, MarsClientError> {
    if let Some(err) = api_error(&value) {
        return Err(err);
    }
    let sections = value.as_array().ok_or(MarsClientError::MissingSection)?;
    let section = sections
        .iter()
        .find(|section| {
            section
                .get("reportSection")
                .and_then(Value::as_str)
                .is_some_and(|name| name == DETAIL_SECTION)
        })
        .or_else(|| sections.get(1))
        .ok_or(MarsClientError::MissingSection)?;
    let results = section
        .get("results")
        .cloned()
        .ok_or(MarsClientError::MissingSection)?;

    let rows = serde_json::from_value::<Vec<PriceRowDto>>(results)?;
    Ok(rows.into_iter().map(PriceRow::from).collect())
}

#[derive(Debug, Deserialize)]
struct ReportDescriptorDto {
    #[serde(deserialize_with = "string_from_json")]
    slug_id: String,
    #[serde(default)]
    report_title: Option<String>,
    #[serde(default)]
    markets: Option<Vec<String>>,
    #[serde(default)]
    market_types: Option<Vec<String>>,
}

impl From<ReportDescriptorDto> for ReportDescriptor {
    fn from(dto: ReportDescriptorDto) -> Self {
        Self {
            slug_id: dto.slug_id,
            report_title: dto.report_title.unwrap_or_default(),
            markets: dto.markets.unwrap_or_default(),
            market_types: dto.market_types.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PriceRowDto {
    #[serde(default, deserialize_with = "lenient_string")]
    report_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    slug_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    commodity: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    variety: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    package: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    item_size: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    properties: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    grade: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    organic: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    origin: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    low_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    high_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    unit_sales: Option<String>,
}

impl From<PriceRowDto> for PriceRow {
    fn from(dto: PriceRowDto) -> Self {
        Self {
            report_date: dto.report_date,
            slug_id: dto.slug_id,
            commodity: dto.commodity,
            variety: dto.variety,
            package: dto.package,
            item_size: dto.item_size,
            properties: dto.properties,
            grade: dto.grade,
            organic: dto.organic,
            origin: dto.origin,
            low_price: dto.low_price,
            high_price: dto.high_price,
            unit_sales: dto.unit_sales,
        }
    }
}

/// Strings, numbers and booleans as text; blanks and nulls as `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::Bool(flag)) => Some(flag.to_string()),
        _ => None,
    })
}

/// Numbers or numeric strings; anything else is `None`.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn string_from_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrNumber;

    impl<'de> serde::de::Visitor<'de> for StringOrNumber {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or number")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}
