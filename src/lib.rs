//! USDA Market News terminal-market prices with package weight normalization.

pub mod app;
pub mod domain;
pub mod infra;
pub mod util;

pub use app::{AppError, MarketNews, MarketRef};
