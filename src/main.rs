use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use mmn_prices::{
    domain::{NormalizedPrice, NullPolicy},
    util::{
        settings::{load_settings, save_settings, settings_file, Settings},
        version::{version_label, APP_NAME},
    },
    AppError, MarketNews, MarketRef,
};

#[derive(Parser)]
#[command(name = "mmn")]
#[command(about = APP_NAME, long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    /// MARS API key; defaults to $USDA_MARS_API_KEY
    #[arg(long, global = true, value_name = "KEY")]
    api_key: Option<String>,

    /// Directory holding the flat-file caches
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List terminal markets and their slug ids
    Markets,

    /// Look up the slug id of a market name
    Slug { market_name: String },

    /// Look up the market name of a slug id
    Market { slug_id: String },

    /// Print price rows for a commodity as CSV
    Prices(PriceArgs),

    /// List commodities traded at a market
    Commodities(MarketArgs),

    /// Resolve package weights in pounds
    #[command(alias = "w")]
    Weights(WeightArgs),

    /// Print price rows with per-pound prices as CSV
    #[command(alias = "n")]
    Normalize(PriceArgs),

    /// Show or update persisted settings
    Config(ConfigArgs),
}

#[derive(Args)]
struct MarketArgs {
    /// Numeric market id
    #[arg(long)]
    slug_id: Option<String>,

    /// Market name as listed by `mmn markets`
    #[arg(long)]
    market_name: Option<String>,
}

impl MarketArgs {
    fn market_ref(&self) -> Result<MarketRef<'_>, AppError> {
        MarketRef::from_parts(self.slug_id.as_deref(), self.market_name.as_deref())
    }
}

#[derive(Args)]
struct PriceArgs {
    commodity: String,

    #[command(flatten)]
    market: MarketArgs,

    #[arg(long)]
    start_year: i32,

    /// Defaults to the start year
    #[arg(long)]
    end_year: Option<i32>,
}

#[derive(Args)]
struct WeightArgs {
    commodity: String,

    #[arg(long = "variety", required = true)]
    varieties: Vec<String>,

    #[arg(long = "package", required = true)]
    packages: Vec<String>,

    #[arg(long, value_enum)]
    null_policy: Option<NullPolicyArg>,
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long)]
    base_url: Option<String>,

    /// Persisted root of the flat-file caches
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    #[arg(long, value_enum)]
    null_policy: Option<NullPolicyArg>,

    /// Commodity weight rules CSV replacing the built-in table
    #[arg(long)]
    rules_path: Option<PathBuf>,

    /// Net weight table CSV replacing the built-in table
    #[arg(long)]
    net_weights_path: Option<PathBuf>,

    /// Persist the resulting settings
    #[arg(long)]
    save: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum NullPolicyArg {
    /// Unresolved packages stay unresolved once cached
    Sticky,
    /// Unresolved packages are looked up again on every run
    Retry,
}

impl From<NullPolicyArg> for NullPolicy {
    fn from(value: NullPolicyArg) -> Self {
        match value {
            NullPolicyArg::Sticky => NullPolicy::Sticky,
            NullPolicyArg::Retry => NullPolicy::Retry,
        }
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);
    tracing::debug!("{APP_NAME} {}", version_label());

    let mut settings = load_settings().unwrap_or_default();

    // Runs on the stored settings alone so a bad value can always be repaired.
    if let Commands::Config(args) = &cli.command {
        return configure(settings, args);
    }

    if let Some(dir) = &cli.data_dir {
        settings.data_dir = Some(dir.clone());
    }

    if let Commands::Weights(WeightArgs {
        null_policy: Some(policy),
        ..
    }) = &cli.command
    {
        settings.null_policy = (*policy).into();
    }

    let api_key = cli.api_key.clone().or_else(Settings::api_key_from_env);
    let news = MarketNews::new(settings, api_key)?;

    match &cli.command {
        Commands::Markets => {
            let directory = news.markets().await?;
            for market in directory.markets() {
                println!("{}\t{}", market.slug_id, market.market_name);
            }
        }
        Commands::Slug { market_name } => println!("{}", news.slug_id(market_name).await?),
        Commands::Market { slug_id } => println!("{}", news.market_name(slug_id).await?),
        Commands::Prices(args) => {
            let rows = news
                .prices(
                    &args.commodity,
                    args.market.market_ref()?,
                    args.start_year,
                    args.end_year,
                )
                .await?;
            let mut writer = csv::Writer::from_writer(io::stdout().lock());
            for row in &rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        Commands::Commodities(args) => {
            for commodity in news.commodities(args.market_ref()?).await? {
                println!("{commodity}");
            }
        }
        Commands::Weights(args) => {
            match news.resolve_weights(&args.commodity, &args.varieties, &args.packages)? {
                Some(weights) => {
                    for ((variety, package), pounds) in &weights {
                        let pounds = pounds.map_or_else(|| "-".to_string(), |p| p.to_string());
                        println!("{variety}\t{package}\t{pounds}");
                    }
                }
                None => eprintln!(
                    "No weight rules for {:?}; add it to the commodity weight rules table",
                    args.commodity
                ),
            }
        }
        Commands::Normalize(args) => {
            let prices = news
                .normalized_prices(
                    &args.commodity,
                    args.market.market_ref()?,
                    args.start_year,
                    args.end_year,
                )
                .await?;
            write_normalized(&prices)?;
        }
        // Handled before the facade is built.
        Commands::Config(_) => {}
    }

    Ok(())
}

fn configure(mut settings: Settings, args: &ConfigArgs) -> Result<()> {
    if let Some(base_url) = &args.base_url {
        settings.base_url = base_url.clone();
    }
    if let Some(dir) = &args.cache_dir {
        settings.data_dir = Some(dir.clone());
    }
    if let Some(policy) = args.null_policy {
        settings.null_policy = policy.into();
    }
    if let Some(path) = &args.rules_path {
        settings.rules_path = Some(path.clone());
    }
    if let Some(path) = &args.net_weights_path {
        settings.net_weights_path = Some(path.clone());
    }

    println!("{}", serde_json::to_string_pretty(&settings)?);
    if args.save {
        let path = save_settings(&settings).context("failed to save settings")?;
        eprintln!("Saved settings to {}", path.display());
    } else {
        if let Err(err) = settings.validate() {
            tracing::warn!("[settings] {err}");
        }
        if let Some(path) = settings_file() {
            eprintln!("Settings file: {}", path.display());
        }
    }
    Ok(())
}

fn cell<T: ToString>(value: Option<T>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

fn write_normalized(prices: &[NormalizedPrice]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout().lock());
    writer.write_record([
        "report_date",
        "commodity",
        "variety",
        "package",
        "pounds",
        "low_price",
        "high_price",
        "low_price_per_lb",
        "high_price_per_lb",
    ])?;
    for price in prices {
        let row = &price.row;
        writer.write_record([
            cell(row.report_date.as_deref()),
            cell(row.commodity.as_deref()),
            cell(row.variety.as_deref()),
            cell(row.package.as_deref()),
            cell(price.pounds),
            cell(row.low_price),
            cell(row.high_price),
            cell(price.low_price_per_lb.map(|value| format!("{value:.4}"))),
            cell(price.high_price_per_lb.map(|value| format!("{value:.4}"))),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
