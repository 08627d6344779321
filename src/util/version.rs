pub const APP_NAME: &str = "USDA Market News Prices";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_TAG: Option<&str> = option_env!("GIT_TAG");

pub fn version_label() -> String {
    if let Some(tag) = GIT_TAG {
        tag.to_string()
    } else {
        format!("v{}", APP_VERSION)
    }
}

/// User agent sent with every Market News API request.
pub fn user_agent() -> String {
    format!("mmn-prices/{}", version_label())
}
